//! # Filebox Core Library
//!
//! Filesystem toolkit behind the `filebox` command-line application.
//!
//! The central piece is the archive subsystem: creating, extracting and
//! appending to zip and tar.gz archives through a walk / header / writer
//! pipeline that callers can customize at each stage.
//!
//! ## Key Modules
//!
//! - [`archive`]: zip and tar.gz create, extract, append and list.
//! - [`fsx`]: file and directory primitives used across the crate.
//! - [`hash`]: streaming SHA-2 and BLAKE3 digests of files.
//! - [`lines`]: line-oriented file reading.
//! - [`paths`]: executable and caller path introspection.
//! - [`config`]: tunables for append (temporary directory, gzip level).
//!
//! ## Examples
//!
//! ```no_run
//! use filebox::{append_to_zip, create_zip, extract_zip};
//!
//! # fn main() -> filebox::Result<()> {
//! create_zip("home", "home.zip")?;
//! append_to_zip("home.zip", &["notes/log1.txt"])?;
//! extract_zip("home.zip", "restored")?;
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod cli;
pub mod config;
pub mod error;
pub mod fsx;
pub mod hash;
pub mod lines;
pub mod paths;

pub use archive::tgz::{
    append_to_tar_gzip, append_to_tar_gzip_with, create_tar_gzip, create_tar_gzip_with, extract_tar_gzip,
    list_tar_gzip, TarEntryWriter,
};
pub use archive::zip::{
    append_to_zip, append_to_zip_with, create_zip, create_zip_with, extract_zip, list_zip, ZipEntryWriter,
};
pub use archive::{ArchiveFormat, CopyBuffer, EntryHeader, EntryKind, EntryWriter, HeaderBuilder};
pub use archive::{OuterLayer, RootRelative};
pub use config::{AppendOptions, DEFAULT_GZIP_LEVEL};
pub use error::{FileboxError, Result};
