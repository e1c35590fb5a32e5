//! Two-phase replace used by the append operations.
//!
//! Neither zip nor tar.gz is edited in place. An append builds a complete new
//! archive in a temporary file and only then copies it over the original:
//!
//! 1. [`TempArchive::create`] next to the other temporary files,
//! 2. write the old entries and the new sources into it and close every stream,
//! 3. [`TempArchive::commit`] copies it over the target and removes it.
//!
//! Dropping a `TempArchive` before `commit` removes the temporary file, so a
//! failed append leaves the original archive untouched. The copy in step 3 is
//! a plain byte copy, not a rename: a crash in the middle of it can corrupt the
//! original. If the copy itself fails, the temporary archive is kept and its
//! path is reported in [`FileboxError::Replace`].
//!
//! An atomic rename would close that window where temp file and target share
//! a filesystem; that is not assumed here.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{FileboxError, Result};
use crate::fsx::{self as fs, File, OpenOptions};

const TEMP_PREFIX: &str = "filebox-append";

/// A temporary archive that will replace `target` on commit.
pub struct TempArchive {
    temp: NamedTempFile,
    target: PathBuf,
}

impl TempArchive {
    pub fn create(dir: &Path, target: &Path) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| FileboxError::io(e, dir))?;
        let temp = fs::create_temp_file(dir, TEMP_PREFIX)?;
        debug!(temp = %temp.path().display(), target = %target.display(), "staging archive");
        Ok(Self { temp, target: target.to_path_buf() })
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    /// A write handle on the temporary archive.
    pub fn handle(&self) -> Result<File> {
        self.temp.as_file().try_clone().map_err(|e| FileboxError::io(e, self.temp.path()))
    }

    /// Copies the temporary archive over the target, then removes it.
    pub fn commit(self) -> Result<()> {
        match overwrite(self.temp.path(), &self.target) {
            Ok(bytes) => {
                debug!(target = %self.target.display(), bytes, "replaced archive");
                let temp_path = self.temp.path().to_path_buf();
                self.temp.close().map_err(|e| FileboxError::io(e, temp_path))
            }
            Err(source) => {
                let target = self.target;
                let temp = match self.temp.keep() {
                    Ok((_, path)) => path,
                    Err(persist) => persist.file.path().to_path_buf(),
                };
                warn!(temp = %temp.display(), target = %target.display(), "replace failed, keeping temporary archive");
                Err(FileboxError::Replace { source, temp, target })
            }
        }
    }
}

/// Byte copy keeping `dst`'s own permissions.
fn overwrite(src: &Path, dst: &Path) -> io::Result<u64> {
    let mut reader = File::open(src)?;
    let mut writer = OpenOptions::new().write(true).create(true).truncate(true).open(dst)?;
    let copied = io::copy(&mut reader, &mut writer)?;
    writer.sync_all()?;
    Ok(copied)
}

/// Every source must exist and be a regular file, a directory or a symlink.
/// Runs before any temporary file is created.
pub fn validate_sources<P: AsRef<Path>>(sources: &[P]) -> Result<()> {
    for src in sources {
        let src = src.as_ref();
        let metadata = fs::symlink_metadata(src).map_err(|e| FileboxError::io(e, src))?;
        let file_type = metadata.file_type();
        if !(file_type.is_file() || file_type.is_dir() || file_type.is_symlink()) {
            return Err(FileboxError::NotRegularFile { path: src.to_path_buf() });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn commit_replaces_target_and_removes_temp() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let target = dir.path().join("archive.bin");
        fs::write(&target, b"old content that is longer")?;

        let temp = TempArchive::create(&dir.path().join("tmp"), &target)?;
        let temp_path = temp.path().to_path_buf();
        temp.handle()?.write_all(b"new")?;
        temp.commit()?;

        assert_eq!(fs::read(&target)?, b"new");
        assert!(!temp_path.exists());
        Ok(())
    }

    #[test]
    fn dropped_temp_archive_leaves_target_alone() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let target = dir.path().join("archive.bin");
        fs::write(&target, b"original")?;
        let temp = TempArchive::create(dir.path(), &target)?;
        let temp_path = temp.path().to_path_buf();
        temp.handle()?.write_all(b"half written")?;
        drop(temp);
        assert_eq!(fs::read(&target)?, b"original");
        assert!(!temp_path.exists());
        Ok(())
    }

    #[test]
    fn failed_replace_keeps_temp() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        // The target's parent does not exist, so the copy cannot open it.
        let target = dir.path().join("missing/archive.bin");
        let temp = TempArchive::create(dir.path(), &target)?;
        temp.handle()?.write_all(b"payload")?;

        match temp.commit() {
            Err(FileboxError::Replace { temp, .. }) => {
                assert_eq!(fs::read(&temp)?, b"payload");
                fs::remove_file(temp)?;
            }
            other => panic!("expected replace error, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn validate_rejects_missing_sources() {
        let err = validate_sources(&["/no/such/source"]).unwrap_err();
        assert!(matches!(err, FileboxError::Io { .. }));
    }
}
