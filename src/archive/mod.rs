//! # Archive Subsystem
//!
//! Creation, extraction and in-place append for zip and tar.gz archives.
//!
//! Every archive operation runs the same pipeline:
//!
//! 1. [`walk`] visits the source tree depth-first and yields one [`WalkEvent`] per node.
//! 2. A [`HeaderBuilder`] maps the event to an [`EntryHeader`] (or skips it).
//! 3. An [`EntryWriter`] frames the header into the container and streams the
//!    content through a caller-owned [`CopyBuffer`].
//!
//! Both stages are traits, so callers can filter entries, rename them or change
//! compression settings without touching the walking or framing code. The
//! defaults live in [`naming`] (header builders), [`zip`] and [`tgz`] (writers).

use std::fmt;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::debug;

use crate::error::{FileboxError, Result};
use crate::fsx::{self as fs, File, Metadata};

pub mod append;
pub mod naming;
pub mod tgz;
pub mod walk;
pub mod zip;

pub use naming::{OuterLayer, RootRelative};
pub use walk::{walk, WalkEvent};

/// Default size of the content copy buffer.
pub const COPY_BUF_SIZE: usize = 32 * 1024;

/// The kind of node an archive entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
}

/// Format-neutral description of one archive entry, written before its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryHeader {
    /// Archive-relative name, `/`-separated. Directories end with `/`.
    pub name: String,
    /// Permission bits (`0o7777` mask).
    pub mode: u32,
    /// Uncompressed content size; 0 for directories and symlinks.
    pub size: u64,
    pub mtime: SystemTime,
    pub kind: EntryKind,
    /// Target of a symlink entry.
    pub link_target: Option<PathBuf>,
}

impl EntryHeader {
    /// Builds a header for the node at `path` described by `metadata` (not following symlinks).
    pub fn from_metadata(name: String, path: &Path, metadata: &Metadata) -> Result<Self> {
        let file_type = metadata.file_type();
        let (kind, size, link_target) = if file_type.is_symlink() {
            let target = fs::read_link(path).map_err(|e| FileboxError::io(e, path))?;
            (EntryKind::Symlink, 0, Some(target))
        } else if file_type.is_dir() {
            (EntryKind::Dir, 0, None)
        } else {
            (EntryKind::File, metadata.len(), None)
        };
        let name = match kind {
            EntryKind::Dir if !name.ends_with('/') => format!("{name}/"),
            _ => name,
        };
        Ok(Self {
            name,
            mode: fs::mode_of(metadata),
            size,
            mtime: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            kind,
            link_target,
        })
    }

    /// The marker for a directory walk root. It maps onto the extraction
    /// directory itself and carries no content.
    pub fn is_root_marker(&self) -> bool {
        self.kind == EntryKind::Dir && self.name.trim_matches('/').is_empty()
    }
}

/// A failed copy, telling apart the side that failed.
#[derive(Debug)]
pub enum CopyError {
    Read(io::Error),
    Write(io::Error),
}

impl fmt::Display for CopyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CopyError::Read(e) => write!(f, "read failed: {e}"),
            CopyError::Write(e) => write!(f, "write failed: {e}"),
        }
    }
}

impl std::error::Error for CopyError {}

impl From<CopyError> for io::Error {
    fn from(err: CopyError) -> Self {
        match err {
            CopyError::Read(e) | CopyError::Write(e) => e,
        }
    }
}

/// Reusable byte buffer for streaming entry content.
///
/// One buffer serves a whole operation; concurrent operations each need their own.
pub struct CopyBuffer {
    buf: Vec<u8>,
}

impl Default for CopyBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl CopyBuffer {
    pub fn new() -> Self {
        Self::with_capacity(COPY_BUF_SIZE)
    }

    pub fn with_capacity(size: usize) -> Self {
        Self { buf: vec![0u8; size.max(1)] }
    }

    /// Copies everything `reader` yields into `writer`, returning the byte count.
    pub fn copy<R, W>(&mut self, reader: &mut R, writer: &mut W) -> Result<u64, CopyError>
    where
        R: Read + ?Sized,
        W: Write + ?Sized,
    {
        let mut copied: u64 = 0;
        loop {
            let n = match reader.read(&mut self.buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(CopyError::Read(e)),
            };
            writer.write_all(&self.buf[..n]).map_err(CopyError::Write)?;
            copied += n as u64;
        }
        Ok(copied)
    }
}

/// Stage 1: turns a walk event into an entry header.
///
/// Returning `Ok(None)` leaves the node out of the archive. An event carrying
/// a walk error must yield that error.
pub trait HeaderBuilder {
    fn build(&self, event: WalkEvent<'_>) -> Result<Option<EntryHeader>>;
}

impl<F> HeaderBuilder for F
where
    F: Fn(WalkEvent<'_>) -> Result<Option<EntryHeader>>,
{
    fn build(&self, event: WalkEvent<'_>) -> Result<Option<EntryHeader>> {
        self(event)
    }
}

/// Stage 2: writes one entry (header, then content for regular files) into
/// the container `A`.
pub trait EntryWriter<A: ?Sized> {
    fn write_entry(
        &self,
        archive: &mut A,
        header: &EntryHeader,
        content: &mut dyn Read,
        buf: &mut CopyBuffer,
    ) -> Result<()>;
}

/// Walks `src` and runs every node through `builder` and `writer` into `archive`.
pub fn archive_tree<A, B, W>(
    archive: &mut A,
    src: &Path,
    builder: &B,
    writer: &W,
    buf: &mut CopyBuffer,
) -> Result<()>
where
    A: ?Sized,
    B: HeaderBuilder + ?Sized,
    W: EntryWriter<A> + ?Sized,
{
    walk(src, |event| {
        let path = event.path.clone();
        let Some(header) = builder.build(event)? else {
            return Ok(());
        };
        debug!(entry = %header.name, kind = ?header.kind, size = header.size, "adding entry");
        if header.kind == EntryKind::File {
            let mut file = File::open(&path).map_err(|e| FileboxError::io(e, &path))?;
            writer.write_entry(archive, &header, &mut file, buf)
        } else {
            writer.write_entry(archive, &header, &mut io::empty(), buf)
        }
    })
}

/// Container formats supported by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGzip,
}

impl ArchiveFormat {
    /// Sniffs the magic bytes of `path`. `Ok(None)` means neither format matched.
    pub fn detect(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        let mut file = File::open(path).map_err(|e| FileboxError::io(e, path))?;
        let mut magic = [0u8; 4];
        let mut filled = 0;
        while filled < magic.len() {
            match file.read(&mut magic[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(FileboxError::io(e, path)),
            }
        }
        let magic = &magic[..filled];
        let format = match magic {
            b if b.starts_with(b"PK\x03\x04") || b.starts_with(b"PK\x05\x06") => Some(ArchiveFormat::Zip),
            b if b.starts_with(b"\x1f\x8b") => Some(ArchiveFormat::TarGzip),
            _ => None,
        };
        Ok(format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn copy_buffer_counts_bytes() -> Result<(), Box<dyn std::error::Error>> {
        let data: Vec<u8> = (0..100_000u32).map(|i| i as u8).collect();
        let mut out = Vec::new();
        let mut buf = CopyBuffer::with_capacity(1000);
        let n = buf.copy(&mut &data[..], &mut out)?;
        assert_eq!(n, data.len() as u64);
        assert_eq!(out, data);
        Ok(())
    }

    #[test]
    fn copy_buffer_reports_failing_side() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::Other, "disk full"))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }
        let mut buf = CopyBuffer::new();
        let err = buf.copy(&mut &b"abc"[..], &mut Broken).unwrap_err();
        assert!(matches!(err, CopyError::Write(_)));
    }

    #[test]
    fn directory_headers_get_trailing_slash() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let sub = dir.path().join("sub");
        fs::create_dir(&sub)?;
        let header = EntryHeader::from_metadata("sub".into(), &sub, &fs::symlink_metadata(&sub)?)?;
        assert_eq!(header.name, "sub/");
        assert_eq!(header.kind, EntryKind::Dir);
        assert!(!header.is_root_marker());
        Ok(())
    }

    #[test]
    fn detects_formats_by_magic() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let zip = dir.path().join("a.bin");
        fs::write(&zip, b"PK\x03\x04rest")?;
        let gz = dir.path().join("b.bin");
        fs::write(&gz, b"\x1f\x8b\x08\x00")?;
        let txt = dir.path().join("c.txt");
        fs::write(&txt, b"hi")?;
        assert_eq!(ArchiveFormat::detect(&zip)?, Some(ArchiveFormat::Zip));
        assert_eq!(ArchiveFormat::detect(&gz)?, Some(ArchiveFormat::TarGzip));
        assert_eq!(ArchiveFormat::detect(&txt)?, None);
        Ok(())
    }
}
