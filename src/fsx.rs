//! Cross-platform filesystem wrapper.
//!
//! `std::fs` is re-exported so call-sites can import `crate::fsx as fs` and
//! keep using the familiar names. On top of that this module adds the plain
//! file and directory primitives the archive code relies on: creating files
//! together with their parent directories, exact permission bits, recursive
//! copies and temporary files. Every helper reports the offending path in
//! its error.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tempfile::{NamedTempFile, TempDir};

use crate::error::{FileboxError, Result};

pub use std::fs::*;

/// Default permission bits for files created without an explicit mode.
pub const DEFAULT_FILE_MODE: u32 = 0o666;

#[cfg(unix)]
/// Set POSIX permission bits on Unix.
pub fn set_unix_permissions(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
/// No-op off Unix: POSIX permission bits are not preserved.
pub fn set_unix_permissions(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

/// Permission bits of `metadata`, or a sensible default where the platform has none.
pub fn mode_of(metadata: &Metadata) -> u32 {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o7777
    }
    #[cfg(not(unix))]
    {
        if metadata.is_dir() {
            0o755
        } else if metadata.permissions().readonly() {
            0o444
        } else {
            0o644
        }
    }
}

/// Creates `path` (truncating it if present), creating missing parent directories first.
pub fn create_file(path: impl AsRef<Path>) -> Result<File> {
    create_file_with(path.as_ref(), None)
}

/// Like [`create_file`], and the resulting file carries exactly `mode`.
pub fn create_file_mode(path: impl AsRef<Path>, mode: u32) -> Result<File> {
    create_file_with(path.as_ref(), Some(mode))
}

fn create_file_with(path: &Path, mode: Option<u32>) -> Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            create_dir_all(parent).map_err(|e| FileboxError::io(e, parent))?;
        }
    }

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode.unwrap_or(DEFAULT_FILE_MODE));
    }
    let file = options.open(path).map_err(|e| FileboxError::io(e, path))?;

    // The umask trims the creation mode; stored archive modes must survive intact.
    if let Some(mode) = mode {
        set_unix_permissions(path, mode).map_err(|e| FileboxError::io(e, path))?;
    }
    Ok(file)
}

/// Creates each directory; the parent of every directory must already exist.
pub fn mkdir<P: AsRef<Path>>(dirs: &[P]) -> Result<()> {
    for dir in dirs {
        let dir = dir.as_ref();
        create_dir(dir).map_err(|e| FileboxError::io(e, dir))?;
    }
    Ok(())
}

/// Creates each directory together with all of its missing ancestors.
pub fn mkdir_all<P: AsRef<Path>>(dirs: &[P]) -> Result<()> {
    for dir in dirs {
        let dir = dir.as_ref();
        create_dir_all(dir).map_err(|e| FileboxError::io(e, dir))?;
    }
    Ok(())
}

pub fn is_exist(path: impl AsRef<Path>) -> bool {
    metadata(path).is_ok()
}

pub fn is_dir(path: impl AsRef<Path>) -> bool {
    metadata(path).map(|m| m.is_dir()).unwrap_or(false)
}

/// True if `path` itself is a symbolic link (the link is not followed).
pub fn is_link(path: impl AsRef<Path>) -> bool {
    symlink_metadata(path).map(|m| m.file_type().is_symlink()).unwrap_or(false)
}

/// Removes `path` if it is a symbolic link. The link target is never touched.
pub fn unlink_symlink(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if is_link(path) {
        remove_file(path).map_err(|e| FileboxError::io(e, path))?;
    }
    Ok(())
}

/// Size of a regular file; 0 for directories, special files and missing paths.
pub fn file_size(path: impl AsRef<Path>) -> u64 {
    match metadata(path) {
        Ok(m) if m.is_file() => m.len(),
        _ => 0,
    }
}

pub fn mtime(path: impl AsRef<Path>) -> Option<SystemTime> {
    metadata(path).and_then(|m| m.modified()).ok()
}

/// Truncates a file to zero length.
pub fn clear_file(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if is_dir(path) {
        return Err(FileboxError::io(
            io::Error::new(io::ErrorKind::InvalidInput, "the path is a directory, not a single file"),
            path,
        ));
    }
    let file = OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(path)
        .map_err(|e| FileboxError::io(e, path))?;
    file.set_len(0).map_err(|e| FileboxError::io(e, path))
}

/// Copies the content of `src` into `dst`, creating or truncating `dst` and its parents.
pub fn copy_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> Result<u64> {
    let (src, dst) = (src.as_ref(), dst.as_ref());
    let mut reader = File::open(src).map_err(|e| FileboxError::io(e, src))?;
    let mut writer = create_file(dst)?;
    let copied = io::copy(&mut reader, &mut writer).map_err(|e| FileboxError::io(e, dst))?;
    writer.flush().map_err(|e| FileboxError::io(e, dst))?;
    Ok(copied)
}

/// Recursively copies the directory `src` to `dst`.
pub fn copy_dir(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> Result<()> {
    let (src, dst) = (src.as_ref(), dst.as_ref());
    create_dir_all(dst).map_err(|e| FileboxError::io(e, dst))?;
    for entry in read_dir(src).map_err(|e| FileboxError::io(e, src))? {
        let entry = entry.map_err(|e| FileboxError::io(e, src))?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let kind = entry.file_type().map_err(|e| FileboxError::io(e, &from))?;
        if kind.is_dir() {
            copy_dir(&from, &to)?;
        } else {
            copy_file(&from, &to)?;
        }
    }
    Ok(())
}

/// Full paths of the direct children of `dir`, in directory-listing order.
pub fn read_dir_full_names(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    read_dir(dir)
        .map_err(|e| FileboxError::io(e, dir))?
        .map(|entry| entry.map(|e| e.path()).map_err(|e| FileboxError::io(e, dir)))
        .collect()
}

/// A temporary file inside `dir`. It is removed when the handle is dropped
/// unless it is persisted with [`NamedTempFile::keep`].
pub fn create_temp_file(dir: impl AsRef<Path>, prefix: &str) -> Result<NamedTempFile> {
    let dir = dir.as_ref();
    tempfile::Builder::new()
        .prefix(prefix)
        .tempfile_in(dir)
        .map_err(|e| FileboxError::io(e, dir))
}

/// A temporary directory inside `dir`, recursively removed on drop.
pub fn mkdir_temp(dir: impl AsRef<Path>, prefix: &str) -> Result<TempDir> {
    let dir = dir.as_ref();
    tempfile::Builder::new()
        .prefix(prefix)
        .tempdir_in(dir)
        .map_err(|e| FileboxError::io(e, dir))
}

#[cfg(unix)]
pub fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
pub fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}
