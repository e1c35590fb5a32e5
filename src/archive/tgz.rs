//! tar + gzip creation, extraction and append.
//!
//! A tar stream has no index: headers and content blocks are strictly
//! interleaved in walk order, so extraction reads front to back and append
//! rebuilds the whole archive (see [`append_to_tar_gzip_with`]).
//!
//! Headers use the ustar block layout with GNU magic. Names or link targets
//! that do not fit the 100-byte fields are carried by a preceding GNU
//! `././@LongLink` entry, which GNU tar, bsdtar and the `tar` crate all read.

use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{Builder, EntryType, Header};
use tracing::{debug, info, warn};

use super::append::{validate_sources, TempArchive};
use super::naming::entry_destination;
use super::{archive_tree, CopyBuffer, CopyError, EntryHeader, EntryKind, EntryWriter, HeaderBuilder};
use super::{OuterLayer, RootRelative};
use crate::config::{AppendOptions, DEFAULT_GZIP_LEVEL};
use crate::error::{join, FileboxError, Result};
use crate::fsx::{self as fs, File};

/// The container the tar [`EntryWriter`]s write into.
pub type TarSink = Builder<GzEncoder<File>>;

const BLOCK_SIZE: usize = 512;
const LONG_LINK_NAME: &[u8] = b"././@LongLink";

/// Default tar entry writer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TarEntryWriter;

impl<W: Write> EntryWriter<Builder<W>> for TarEntryWriter {
    fn write_entry(
        &self,
        archive: &mut Builder<W>,
        header: &EntryHeader,
        content: &mut dyn Read,
        buf: &mut CopyBuffer,
    ) -> Result<()> {
        if header.is_root_marker() {
            return Ok(());
        }
        let out = archive.get_mut();
        frame_entry(out, header, content, buf).map_err(|e| match e {
            EntryError::Content(CopyError::Read(e)) => FileboxError::io(e, &header.name),
            EntryError::Content(CopyError::Write(e)) | EntryError::Stream(e) => FileboxError::io(e, &header.name),
        })
    }
}

enum EntryError {
    Stream(io::Error),
    Content(CopyError),
}

impl From<io::Error> for EntryError {
    fn from(err: io::Error) -> Self {
        EntryError::Stream(err)
    }
}

fn frame_entry<W: Write + ?Sized>(
    out: &mut W,
    entry: &EntryHeader,
    content: &mut dyn Read,
    buf: &mut CopyBuffer,
) -> Result<(), EntryError> {
    let mut header = Header::new_gnu();
    header.set_mode(entry.mode & 0o7777);
    header.set_mtime(unix_seconds(entry.mtime));
    header.set_uid(0);
    header.set_gid(0);
    match entry.kind {
        EntryKind::File => {
            header.set_entry_type(EntryType::Regular);
            header.set_size(entry.size);
        }
        EntryKind::Dir => {
            header.set_entry_type(EntryType::Directory);
            header.set_size(0);
        }
        EntryKind::Symlink => {
            header.set_entry_type(EntryType::Symlink);
            header.set_size(0);
        }
    }

    if header.set_path(&entry.name).is_err() {
        write_long_field(out, b'L', entry.name.as_bytes())?;
        copy_truncated(&mut header.as_old_mut().name, entry.name.as_bytes());
    }
    if let Some(target) = &entry.link_target {
        if header.set_link_name(target).is_err() {
            let bytes = target.to_string_lossy();
            write_long_field(out, b'K', bytes.as_bytes())?;
            copy_truncated(&mut header.as_old_mut().linkname, bytes.as_bytes());
        }
    }
    header.set_cksum();
    out.write_all(header.as_bytes())?;

    if entry.kind == EntryKind::File {
        let mut limited = content.take(entry.size);
        let copied = buf.copy(&mut limited, out).map_err(EntryError::Content)?;
        if copied != entry.size {
            return Err(EntryError::Content(CopyError::Read(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("'{}' shrank while archiving ({copied} of {} bytes)", entry.name, entry.size),
            ))));
        }
        write_padding(out, copied)?;
    }
    Ok(())
}

/// A GNU extension entry whose content is `value`, NUL terminated.
fn write_long_field<W: Write + ?Sized>(out: &mut W, kind: u8, value: &[u8]) -> io::Result<()> {
    let mut header = Header::new_gnu();
    copy_truncated(&mut header.as_old_mut().name, LONG_LINK_NAME);
    header.set_mode(0o644);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(0);
    header.set_size(value.len() as u64 + 1);
    header.set_entry_type(EntryType::new(kind));
    header.set_cksum();
    out.write_all(header.as_bytes())?;
    out.write_all(value)?;
    out.write_all(&[0])?;
    write_padding(out, value.len() as u64 + 1)
}

fn copy_truncated(field: &mut [u8], value: &[u8]) {
    let n = field.len().min(value.len());
    field[..n].copy_from_slice(&value[..n]);
    field[n..].fill(0);
}

fn write_padding<W: Write + ?Sized>(out: &mut W, len: u64) -> io::Result<()> {
    let rem = (len % BLOCK_SIZE as u64) as usize;
    if rem != 0 {
        out.write_all(&[0u8; BLOCK_SIZE][..BLOCK_SIZE - rem])?;
    }
    Ok(())
}

fn unix_seconds(time: SystemTime) -> u64 {
    time.duration_since(SystemTime::UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

fn compression(level: u32) -> Result<Compression> {
    if level > 9 {
        return Err(FileboxError::InvalidCompressionLevel(level));
    }
    Ok(Compression::new(level))
}

/// Closes the layers inner to outer: tar trailer, gzip trailer, file.
fn finish_tar(tar: TarSink, dest: &Path) -> Result<()> {
    let gz = tar.into_inner().map_err(|e| FileboxError::io(e, dest))?;
    let file = gz.finish().map_err(|e| FileboxError::io(e, dest))?;
    file.sync_all().map_err(|e| FileboxError::io(e, dest))
}

/// Archives `src` into a gzip-compressed tar at `dest`, keeping only the structure below `src`.
pub fn create_tar_gzip(src: impl AsRef<Path>, dest: impl AsRef<Path>, level: u32) -> Result<()> {
    create_tar_gzip_with(src.as_ref(), dest.as_ref(), level, &RootRelative, &TarEntryWriter)
}

/// [`create_tar_gzip`] with a custom header builder and entry writer.
pub fn create_tar_gzip_with<B, W>(src: &Path, dest: &Path, level: u32, builder: &B, writer: &W) -> Result<()>
where
    B: HeaderBuilder + ?Sized,
    W: EntryWriter<TarSink> + ?Sized,
{
    info!(src = %src.display(), dest = %dest.display(), level, "creating tar.gz archive");
    let level = compression(level)?;
    fs::symlink_metadata(src).map_err(|e| FileboxError::io(e, src))?;

    let file = fs::create_file(dest)?;
    let mut tar = Builder::new(GzEncoder::new(file, level));
    let mut buf = CopyBuffer::new();
    let written = archive_tree(&mut tar, src, builder, writer, &mut buf);
    join(written, finish_tar(tar, dest))
}

/// Adds `sources` to the tar.gz at `archive` with the default gzip level.
pub fn append_to_tar_gzip<P: AsRef<Path>>(archive: impl AsRef<Path>, sources: &[P]) -> Result<()> {
    let options = AppendOptions { level: DEFAULT_GZIP_LEVEL, ..Default::default() };
    append_to_tar_gzip_with(&options, &OuterLayer, &TarEntryWriter, archive.as_ref(), sources)
}

/// [`append_to_tar_gzip`] with explicit options, header builder and entry writer.
///
/// Tar cannot be spliced, so the existing archive is first extracted into a
/// scratch directory, then every top-level item of that directory and every
/// new source are walked into a fresh archive. Time and temporary disk use
/// grow with the size of the whole archive, not only with what is added.
pub fn append_to_tar_gzip_with<B, W, P>(
    options: &AppendOptions,
    builder: &B,
    writer: &W,
    archive: &Path,
    sources: &[P],
) -> Result<()>
where
    B: HeaderBuilder + ?Sized,
    W: EntryWriter<TarSink> + ?Sized,
    P: AsRef<Path>,
{
    info!(archive = %archive.display(), sources = sources.len(), "appending to tar.gz archive");
    let level = compression(options.level)?;
    validate_sources(sources)?;

    let temp_dir = options.resolved_temp_dir();
    fs::create_dir_all(&temp_dir).map_err(|e| FileboxError::io(e, &temp_dir))?;
    let scratch = fs::mkdir_temp(&temp_dir, "filebox-untgz")?;
    extract_tar_gzip(archive, scratch.path())?;

    let mut all: Vec<PathBuf> = fs::read_dir_full_names(scratch.path())?;
    all.extend(sources.iter().map(|s| s.as_ref().to_path_buf()));

    let temp = TempArchive::create(&temp_dir, archive)?;
    let mut tar = Builder::new(GzEncoder::new(temp.handle()?, level));
    let mut buf = CopyBuffer::new();
    let written = all
        .iter()
        .try_for_each(|src| archive_tree(&mut tar, src, builder, writer, &mut buf));
    join(written, finish_tar(tar, temp.path()))?;
    temp.commit()
}

fn open_entries(archive: &Path) -> Result<tar::Archive<GzDecoder<BufReader<File>>>> {
    let file = File::open(archive).map_err(|e| FileboxError::io(e, archive))?;
    Ok(tar::Archive::new(GzDecoder::new(BufReader::new(file))))
}

/// Extracts the tar.gz at `archive` into `dest`.
///
/// Directories, regular files (with their mode) and symlinks are recreated;
/// any other entry type is skipped.
pub fn extract_tar_gzip(archive: impl AsRef<Path>, dest: impl AsRef<Path>) -> Result<()> {
    let (archive, dest) = (archive.as_ref(), dest.as_ref());
    info!(archive = %archive.display(), dest = %dest.display(), "extracting tar.gz archive");
    let mut tar = open_entries(archive)?;
    let mut buf = CopyBuffer::new();

    for entry in tar.entries().map_err(|e| FileboxError::tar(e, archive))? {
        let mut entry = entry.map_err(|e| FileboxError::tar(e, archive))?;
        let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        let target = entry_destination(dest, &name)?;
        let entry_type = entry.header().entry_type();

        match entry_type {
            EntryType::Directory => {
                fs::unlink_symlink(&target)?;
                fs::create_dir_all(&target).map_err(|e| FileboxError::io(e, &target))?;
            }
            EntryType::Regular | EntryType::Continuous => {
                let mode = entry.header().mode().map_err(|e| FileboxError::tar(e, archive))? & 0o7777;
                debug!(entry = %name, target = %target.display(), "extracting entry");
                fs::unlink_symlink(&target)?;
                let mut out = fs::create_file_mode(&target, mode)?;
                buf.copy(&mut entry, &mut out).map_err(|e| match e {
                    CopyError::Read(e) => FileboxError::tar(e, archive),
                    CopyError::Write(e) => FileboxError::io(e, &target),
                })?;
            }
            EntryType::Symlink => {
                let Some(link) = entry.link_name().map_err(|e| FileboxError::tar(e, archive))? else {
                    warn!(entry = %name, "symlink entry without target, skipping");
                    continue;
                };
                create_symlink(&link, &target)?;
            }
            other => {
                debug!(entry = %name, kind = ?other, "skipping unsupported entry type");
            }
        }
    }

    fs::create_dir_all(dest).map_err(|e| FileboxError::io(e, dest))
}

fn create_symlink(link: &Path, target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| FileboxError::io(e, parent))?;
    }
    fs::unlink_symlink(target)?;
    fs::symlink(link, target).map_err(|e| FileboxError::io(e, target))
}

/// Entry names in archive order; duplicates are kept.
pub fn list_tar_gzip(archive: impl AsRef<Path>) -> Result<Vec<String>> {
    let archive = archive.as_ref();
    let mut tar = open_entries(archive)?;
    let mut names = Vec::new();
    for entry in tar.entries().map_err(|e| FileboxError::tar(e, archive))? {
        let entry = entry.map_err(|e| FileboxError::tar(e, archive))?;
        names.push(String::from_utf8_lossy(&entry.path_bytes()).into_owned());
    }
    Ok(names)
}
