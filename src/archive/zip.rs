//! Zip creation, extraction and append.
//!
//! Entries are Deflate-compressed one by one; the central directory written
//! by [`ZipWriter::finish`] indexes them. Zip has no symlink entry type, so
//! the default writer leaves symlinks out.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::SystemTime;

use ::zip::result::ZipError;
use ::zip::write::FileOptions;
use ::zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};
use chrono::{Datelike, Local, NaiveDate, TimeZone, Timelike};
use tracing::{debug, info, warn};

use super::append::{validate_sources, TempArchive};
use super::naming::entry_destination;
use super::{archive_tree, CopyBuffer, CopyError, EntryHeader, EntryKind, EntryWriter, HeaderBuilder};
use super::{OuterLayer, RootRelative};
use crate::config::AppendOptions;
use crate::error::{join, FileboxError, Result};
use crate::fsx::{self as fs, File};

/// The container the zip [`EntryWriter`]s write into.
pub type ZipSink = ZipWriter<ZipOutput>;

/// Output file of a zip being written.
///
/// After the first failed write, further output is discarded and the
/// failure is remembered. `ZipWriter` retries its finalization when dropped
/// after a failed `finish`; that retry then ends quietly, and finishing
/// the archive still reports the failure.
pub struct ZipOutput {
    file: File,
    failed: Option<io::ErrorKind>,
}

impl ZipOutput {
    pub fn new(file: File) -> Self {
        Self { file, failed: None }
    }

    fn latch<T>(&mut self, res: io::Result<T>) -> io::Result<T> {
        if let Err(e) = &res {
            if e.kind() != io::ErrorKind::Interrupted {
                self.failed = Some(e.kind());
            }
        }
        res
    }
}

impl Write for ZipOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.failed.is_some() {
            return Ok(buf.len());
        }
        let res = self.file.write(buf);
        self.latch(res)
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.failed.is_some() {
            return Ok(());
        }
        let res = self.file.flush();
        self.latch(res)
    }
}

impl Seek for ZipOutput {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

const DEFAULT_FILE_MODE: u32 = 0o644;
const DEFAULT_DIR_MODE: u32 = 0o755;

/// Default zip entry writer.
#[derive(Debug, Clone, Copy)]
pub struct ZipEntryWriter {
    /// Method for file entries. Directories are always stored.
    pub method: CompressionMethod,
    /// Codec level; `None` keeps the codec default.
    pub level: Option<i32>,
}

impl Default for ZipEntryWriter {
    fn default() -> Self {
        Self { method: CompressionMethod::Deflated, level: None }
    }
}

impl ZipEntryWriter {
    /// Zip options for `header`. The compression method is always set
    /// explicitly; leaving it out would silently store file content.
    pub fn options(&self, header: &EntryHeader) -> FileOptions {
        let options = FileOptions::default()
            .unix_permissions(header.mode)
            .last_modified_time(to_zip_time(header.mtime));
        match header.kind {
            EntryKind::Dir => options,
            _ => options
                .compression_method(self.method)
                .compression_level(self.level)
                .large_file(header.size >= u32::MAX as u64),
        }
    }
}

impl EntryWriter<ZipSink> for ZipEntryWriter {
    fn write_entry(
        &self,
        archive: &mut ZipSink,
        header: &EntryHeader,
        content: &mut dyn Read,
        buf: &mut CopyBuffer,
    ) -> Result<()> {
        match header.kind {
            EntryKind::Dir if header.is_root_marker() => Ok(()),
            EntryKind::Dir => archive
                .add_directory(header.name.as_str(), self.options(header))
                .map_err(|e| FileboxError::zip(e, &header.name)),
            EntryKind::Symlink => {
                warn!(entry = %header.name, "zip has no symlink entries, skipping");
                Ok(())
            }
            EntryKind::File => {
                archive
                    .start_file(header.name.as_str(), self.options(header))
                    .map_err(|e| FileboxError::zip(e, &header.name))?;
                buf.copy(content, archive).map_err(|e| match e {
                    CopyError::Read(e) => FileboxError::io(e, &header.name),
                    CopyError::Write(e) => FileboxError::zip(ZipError::Io(e), &header.name),
                })?;
                Ok(())
            }
        }
    }
}

/// Converts a timestamp to the zip (DOS, local time) representation.
/// Times before 1980 clamp to the zip epoch.
pub fn to_zip_time(time: SystemTime) -> DateTime {
    let local: chrono::DateTime<Local> = time.into();
    u16::try_from(local.year())
        .ok()
        .and_then(|year| {
            DateTime::from_date_and_time(
                year,
                local.month() as u8,
                local.day() as u8,
                local.hour() as u8,
                local.minute() as u8,
                local.second() as u8,
            )
            .ok()
        })
        .unwrap_or_default()
}

pub fn from_zip_time(time: DateTime) -> SystemTime {
    NaiveDate::from_ymd_opt(time.year() as i32, time.month() as u32, time.day() as u32)
        .and_then(|d| d.and_hms_opt(time.hour() as u32, time.minute() as u32, time.second() as u32))
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .map(SystemTime::from)
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

/// Header describing an entry of an existing zip archive.
fn header_of(entry: &::zip::read::ZipFile<'_>) -> EntryHeader {
    let kind = if entry.is_dir() { EntryKind::Dir } else { EntryKind::File };
    let default_mode = if kind == EntryKind::Dir { DEFAULT_DIR_MODE } else { DEFAULT_FILE_MODE };
    EntryHeader {
        name: entry.name().to_string(),
        mode: entry.unix_mode().map(|m| m & 0o7777).unwrap_or(default_mode),
        size: if kind == EntryKind::Dir { 0 } else { entry.size() },
        mtime: from_zip_time(entry.last_modified()),
        kind,
        link_target: None,
    }
}

fn open_archive(path: &Path) -> Result<ZipArchive<File>> {
    let file = File::open(path).map_err(|e| FileboxError::io(e, path))?;
    ZipArchive::new(file).map_err(|e| FileboxError::zip(e, path))
}

/// Writes the central directory, then flushes the file to disk.
fn finish_zip(mut zip: ZipSink, dest: &Path) -> Result<()> {
    let out = zip.finish().map_err(|e| FileboxError::zip(e, dest))?;
    if let Some(kind) = out.failed {
        return Err(FileboxError::io(io::Error::new(kind, "an earlier write to the archive failed"), dest));
    }
    out.file.sync_all().map_err(|e| FileboxError::io(e, dest))
}

/// Zips `src` into `dest`, keeping only the structure below `src`.
pub fn create_zip(src: impl AsRef<Path>, dest: impl AsRef<Path>) -> Result<()> {
    create_zip_with(src.as_ref(), dest.as_ref(), &RootRelative, &ZipEntryWriter::default())
}

/// [`create_zip`] with a custom header builder and entry writer.
pub fn create_zip_with<B, W>(src: &Path, dest: &Path, builder: &B, writer: &W) -> Result<()>
where
    B: HeaderBuilder + ?Sized,
    W: EntryWriter<ZipSink> + ?Sized,
{
    info!(src = %src.display(), dest = %dest.display(), "creating zip archive");
    fs::symlink_metadata(src).map_err(|e| FileboxError::io(e, src))?;

    let file = fs::create_file(dest)?;
    let mut zip = ZipWriter::new(ZipOutput::new(file));
    let mut buf = CopyBuffer::new();
    let written = archive_tree(&mut zip, src, builder, writer, &mut buf);
    join(written, finish_zip(zip, dest))
}

/// Adds `sources` to the existing zip at `archive`; directories land under their own name.
pub fn append_to_zip<P: AsRef<Path>>(archive: impl AsRef<Path>, sources: &[P]) -> Result<()> {
    append_to_zip_with(
        &AppendOptions::default(),
        &OuterLayer,
        &ZipEntryWriter::default(),
        archive.as_ref(),
        sources,
    )
}

/// [`append_to_zip`] with explicit options, header builder and entry writer.
///
/// Existing entries are re-written entry by entry through `writer` into a
/// temporary archive, the new sources follow, and the result is copied over
/// `archive`. The original is untouched until that final copy.
pub fn append_to_zip_with<B, W, P>(
    options: &AppendOptions,
    builder: &B,
    writer: &W,
    archive: &Path,
    sources: &[P],
) -> Result<()>
where
    B: HeaderBuilder + ?Sized,
    W: EntryWriter<ZipSink> + ?Sized,
    P: AsRef<Path>,
{
    info!(archive = %archive.display(), sources = sources.len(), "appending to zip archive");
    validate_sources(sources)?;
    let mut existing = open_archive(archive)?;

    let temp = TempArchive::create(&options.resolved_temp_dir(), archive)?;
    let mut zip = ZipWriter::new(ZipOutput::new(temp.handle()?));
    let mut buf = CopyBuffer::new();

    let written = copy_entries(&mut existing, archive, &mut zip, writer, &mut buf).and_then(|()| {
        for src in sources {
            archive_tree(&mut zip, src.as_ref(), builder, writer, &mut buf)?;
        }
        Ok(())
    });
    join(written, finish_zip(zip, temp.path()))?;
    temp.commit()
}

/// Re-serializes every entry of `existing` through `writer`.
fn copy_entries<W>(
    existing: &mut ZipArchive<File>,
    path: &Path,
    zip: &mut ZipSink,
    writer: &W,
    buf: &mut CopyBuffer,
) -> Result<()>
where
    W: EntryWriter<ZipSink> + ?Sized,
{
    for i in 0..existing.len() {
        let mut entry = existing.by_index(i).map_err(|e| FileboxError::zip(e, path))?;
        let header = header_of(&entry);
        debug!(entry = %header.name, "carrying over entry");
        writer.write_entry(zip, &header, &mut entry, buf)?;
    }
    Ok(())
}

/// Extracts the zip at `archive` into `dest`, restoring permission bits.
pub fn extract_zip(archive: impl AsRef<Path>, dest: impl AsRef<Path>) -> Result<()> {
    let (archive, dest) = (archive.as_ref(), dest.as_ref());
    info!(archive = %archive.display(), dest = %dest.display(), "extracting zip archive");
    let mut zip = open_archive(archive)?;
    let mut buf = CopyBuffer::new();

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(|e| FileboxError::zip(e, archive))?;
        let target = entry_destination(dest, entry.name())?;

        fs::unlink_symlink(&target)?;
        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(|e| FileboxError::io(e, &target))?;
            continue;
        }

        let mode = entry.unix_mode().map(|m| m & 0o7777).unwrap_or(DEFAULT_FILE_MODE);
        debug!(entry = %entry.name(), target = %target.display(), "extracting entry");
        let mut out = fs::create_file_mode(&target, mode)?;
        buf.copy(&mut entry, &mut out).map_err(|e| match e {
            CopyError::Read(e) => FileboxError::zip(ZipError::Io(e), archive),
            CopyError::Write(e) => FileboxError::io(e, &target),
        })?;
    }

    // An archive without entries still yields its (empty) destination.
    fs::create_dir_all(dest).map_err(|e| FileboxError::io(e, dest))
}

/// Entry names in archive order; duplicates are kept.
pub fn list_zip(archive: impl AsRef<Path>) -> Result<Vec<String>> {
    let archive = archive.as_ref();
    let mut zip = open_archive(archive)?;
    (0..zip.len())
        .map(|i| {
            zip.by_index(i)
                .map(|entry| entry.name().to_string())
                .map_err(|e| FileboxError::zip(e, archive))
        })
        .collect()
}
