//! Depth-first filesystem walk feeding the header stage.

use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::{FileboxError, Result};
use crate::fsx::{self as fs, Metadata};

/// One visited filesystem node.
///
/// `metadata` carries the walk failure for this node instead of its stat
/// info; a header builder must hand that error back rather than build a
/// header from it.
#[derive(Debug)]
pub struct WalkEvent<'a> {
    /// The path the walk started from.
    pub root: &'a Path,
    /// Stat info of `root` (a symlink root is not followed).
    pub root_metadata: &'a Metadata,
    /// The node being visited.
    pub path: PathBuf,
    /// Stat info of `path` (symlinks not followed), or the walk error.
    pub metadata: Result<Metadata>,
}

impl WalkEvent<'_> {
    /// Stat info of the node, or the walk error that replaced it.
    pub fn into_metadata(self) -> Result<Metadata> {
        self.metadata
    }
}

/// Walks `root`, calling `visit` for `root` itself and then for every
/// descendant, parents before children. Symlinks, including a symlink
/// `root`, are visited as leaves.
///
/// The first error returned by `visit` stops the walk and is returned.
pub fn walk<F>(root: &Path, mut visit: F) -> Result<()>
where
    F: FnMut(WalkEvent<'_>) -> Result<()>,
{
    let root_metadata = fs::symlink_metadata(root).map_err(|e| FileboxError::io(e, root))?;
    debug!(root = %root.display(), "walking");

    for item in WalkDir::new(root).follow_links(false).follow_root_links(false) {
        let event = match item {
            Ok(entry) => {
                let metadata = entry.metadata().map_err(FileboxError::from);
                WalkEvent {
                    root,
                    root_metadata: &root_metadata,
                    path: entry.into_path(),
                    metadata,
                }
            }
            Err(err) => WalkEvent {
                root,
                root_metadata: &root_metadata,
                path: err.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf()),
                metadata: Err(err.into()),
            },
        };
        visit(event)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parents_come_before_children() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::create_dir_all(dir.path().join("a/b"))?;
        fs::write(dir.path().join("a/b/f.txt"), b"x")?;
        fs::write(dir.path().join("top.txt"), b"y")?;

        let mut seen = Vec::new();
        walk(dir.path(), |event| {
            assert_eq!(event.root, dir.path());
            assert!(event.root_metadata.is_dir());
            seen.push(event.path.clone());
            event.into_metadata().map(|_| ())
        })?;

        assert_eq!(seen[0], dir.path());
        assert_eq!(seen.len(), 5);
        let pos = |p: &str| seen.iter().position(|s| s == &dir.path().join(p)).unwrap();
        assert!(pos("a") < pos("a/b"));
        assert!(pos("a/b") < pos("a/b/f.txt"));
        Ok(())
    }

    #[test]
    fn single_file_yields_one_event() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let file = dir.path().join("log.txt");
        fs::write(&file, b"x")?;
        let mut count = 0;
        walk(&file, |event| {
            count += 1;
            assert_eq!(event.path, file);
            Ok(())
        })?;
        assert_eq!(count, 1);
        Ok(())
    }

    #[test]
    fn missing_root_fails_before_visiting() {
        let mut visited = false;
        let res = walk(Path::new("/no/such/root"), |_| {
            visited = true;
            Ok(())
        });
        assert!(matches!(res, Err(FileboxError::Io { .. })));
        assert!(!visited);
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_not_followed() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::create_dir(dir.path().join("real"))?;
        fs::write(dir.path().join("real/f.txt"), b"x")?;
        fs::symlink(&dir.path().join("real"), &dir.path().join("link"))?;

        let mut kinds = Vec::new();
        walk(dir.path(), |event| {
            let path = event.path.clone();
            let meta = event.into_metadata()?;
            kinds.push((path, meta.file_type().is_symlink()));
            Ok(())
        })?;
        assert_eq!(kinds.len(), 4);
        assert!(kinds.iter().any(|(p, link)| p.ends_with("link") && *link));
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn dangling_root_link_is_a_leaf() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let link = dir.path().join("dangling");
        fs::symlink(Path::new("nowhere"), &link)?;
        let mut seen = Vec::new();
        walk(&link, |event| {
            assert!(event.root_metadata.file_type().is_symlink());
            seen.push(event.path.clone());
            event.into_metadata().map(|_| ())
        })?;
        assert_eq!(seen, vec![link]);
        Ok(())
    }
}
