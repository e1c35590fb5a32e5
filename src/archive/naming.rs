//! Archive entry names.
//!
//! Two naming schemes exist and are deliberately different:
//!
//! - [`RootRelative`] (create): names are relative to the walk root, so an
//!   archive of `home/` holds `home`'s contents without a `home/` prefix.
//!   A lone file is stored under its base name.
//! - [`OuterLayer`] (append): the base name of the walk root is kept, so
//!   appending directory `bob` adds `bob/...` next to what is already there.

use std::path::{Component, Path, PathBuf};

use tracing::warn;

use super::{EntryHeader, WalkEvent};
use crate::error::{FileboxError, Result};
use crate::fsx::{self as fs, Metadata};

/// Drops a leading drive letter, turns backslashes into slashes, removes `./`
/// prefixes and collapses repeated slashes.
/// Example: `C:\\user\\.\\appdata` becomes `/user/appdata`.
pub fn normalize_name(name: &str) -> String {
    if name.is_empty() {
        return String::new();
    }
    let bytes = name.as_bytes();
    let without_drive = if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        &name[2..]
    } else {
        name
    };
    let slashed = without_drive.replace('\\', "/");

    let mut out = String::with_capacity(slashed.len());
    for (i, part) in slashed.split('/').enumerate() {
        if part == "." || (part.is_empty() && i > 0) {
            continue;
        }
        if i > 0 && !(out.is_empty() || out.ends_with('/')) {
            out.push('/');
        }
        if part.is_empty() {
            // leading slash
            out.push('/');
        } else {
            out.push_str(part);
        }
    }
    if slashed.ends_with('/') && !out.ends_with('/') {
        out.push('/');
    }
    out
}

/// `/`-joined path of `path` relative to `root`; `"."` when they are equal.
pub fn relative_name(root: &Path, path: &Path) -> Result<String> {
    let rel = path.strip_prefix(root).map_err(|_| FileboxError::StripPrefix {
        prefix: root.to_path_buf(),
        path: path.to_path_buf(),
    })?;
    let parts: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        Ok(".".to_string())
    } else {
        Ok(normalize_name(&parts.join("/")))
    }
}

/// Base name of `path`. Paths like `.` or `dir/..` are resolved first.
pub fn base_name(path: &Path) -> Option<String> {
    if let Some(name) = path.file_name() {
        return Some(name.to_string_lossy().into_owned());
    }
    let resolved: PathBuf = path.canonicalize().ok()?;
    resolved.file_name().map(|n| n.to_string_lossy().into_owned())
}

/// Where an entry called `name` lands under `dest`.
///
/// Leading slashes, drive letters and `.` components are dropped. A `..`
/// component is refused, and so is a path below `dest` that passes through
/// a symlink (one extracted earlier from the same archive, say). An entry
/// naming the archive root maps to `dest`.
pub fn entry_destination(dest: &Path, name: &str) -> Result<PathBuf> {
    let normalized = normalize_name(name);
    let parts: Vec<&str> = normalized.split('/').filter(|p| !p.is_empty() && *p != ".").collect();
    if parts.contains(&"..") {
        return Err(FileboxError::UnsafeEntryName { name: name.to_string() });
    }

    let mut out = dest.to_path_buf();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 && fs::is_link(&out) {
            return Err(FileboxError::UnsafeEntryName { name: name.to_string() });
        }
        out.push(part);
    }
    Ok(out)
}

fn is_irregular(metadata: &Metadata) -> bool {
    let file_type = metadata.file_type();
    !(file_type.is_file() || file_type.is_dir() || file_type.is_symlink())
}

/// Header builder for archive creation: names relative to the walk root.
///
/// FIFOs, sockets and device nodes are left out with a warning.
#[derive(Debug, Default, Clone, Copy)]
pub struct RootRelative;

impl super::HeaderBuilder for RootRelative {
    fn build(&self, event: WalkEvent<'_>) -> Result<Option<EntryHeader>> {
        let metadata = event.metadata?;
        if is_irregular(&metadata) {
            warn!(path = %event.path.display(), "skipping irregular file");
            return Ok(None);
        }

        let rel = relative_name(event.root, &event.path)?;
        let name = if rel != "." {
            rel
        } else if metadata.is_dir() {
            "/".to_string()
        } else {
            base_name(&event.path).unwrap_or(rel)
        };
        EntryHeader::from_metadata(name, &event.path, &metadata).map(Some)
    }
}

/// Header builder for append: keeps the base name of the walk root.
///
/// FIFOs, sockets and device nodes are rejected with `NotRegularFile`.
#[derive(Debug, Default, Clone, Copy)]
pub struct OuterLayer;

impl super::HeaderBuilder for OuterLayer {
    fn build(&self, event: WalkEvent<'_>) -> Result<Option<EntryHeader>> {
        let metadata = event.metadata?;
        if is_irregular(&metadata) {
            return Err(FileboxError::NotRegularFile { path: event.path });
        }

        let name = if event.root_metadata.is_dir() {
            let rel = relative_name(event.root, &event.path)?;
            match base_name(event.root) {
                Some(base) if rel == "." => base,
                Some(base) => format!("{base}/{rel}"),
                // A filesystem root has no base name to keep.
                None if rel == "." => "/".to_string(),
                None => rel,
            }
        } else {
            base_name(&event.path).unwrap_or_else(|| relative_name(event.root, &event.path).unwrap_or_default())
        };
        EntryHeader::from_metadata(name, &event.path, &metadata).map(Some)
    }
}
