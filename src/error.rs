use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// The primary error type for all operations in the `filebox` crate.
#[derive(Debug, Error)]
pub enum FileboxError {
    /// An I/O error occurred, typically while reading or writing a file.
    /// Includes the path where the error happened.
    #[error("I/O error on path '{}': {source}", path.display())]
    Io { source: io::Error, path: PathBuf },

    /// A node met during an append walk is neither a regular file, a directory nor a symlink.
    #[error("'{}' is not a regular file", path.display())]
    NotRegularFile { path: PathBuf },

    /// An error occurred when trying to strip a prefix from a file path.
    #[error("Could not strip prefix '{}' from path '{}'", prefix.display(), path.display())]
    StripPrefix { prefix: PathBuf, path: PathBuf },

    /// The filesystem walk failed at some node.
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// The zip container could not be read or written.
    #[error("zip error on '{}': {source}", path.display())]
    Zip { source: zip::result::ZipError, path: PathBuf },

    /// The gzip stream or a tar header could not be read. Failures writing
    /// a tar.gz are reported as `Io`.
    #[error("tar.gz error on '{}': {source}", path.display())]
    Tar { source: io::Error, path: PathBuf },

    /// An archive entry would land outside of the extraction directory.
    #[error("unsafe entry name '{name}'")]
    UnsafeEntryName { name: String },

    /// Gzip accepts levels 0 through 9.
    #[error("invalid gzip compression level {0} (expected 0-9)")]
    InvalidCompressionLevel(u32),

    /// Copying the finished temporary archive over the original failed.
    /// The temporary archive is left at `temp`.
    #[error("could not replace '{}' with '{}': {source}", target.display(), temp.display())]
    Replace { source: io::Error, temp: PathBuf, target: PathBuf },

    /// An operational error together with the errors raised while closing streams.
    #[error("{}", join_messages(.0))]
    Joined(Vec<FileboxError>),
}

pub type Result<T, E = FileboxError> = std::result::Result<T, E>;

fn join_messages(errors: &[FileboxError]) -> String {
    errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ")
}

impl FileboxError {
    pub fn io(source: io::Error, path: impl AsRef<Path>) -> Self {
        FileboxError::Io { source, path: path.as_ref().to_path_buf() }
    }

    pub(crate) fn zip(source: zip::result::ZipError, path: impl AsRef<Path>) -> Self {
        FileboxError::Zip { source, path: path.as_ref().to_path_buf() }
    }

    pub(crate) fn tar(source: io::Error, path: impl AsRef<Path>) -> Self {
        FileboxError::Tar { source, path: path.as_ref().to_path_buf() }
    }

    /// True when the error means "this is not a well-formed archive".
    pub fn is_format_error(&self) -> bool {
        use zip::result::ZipError;
        match self {
            FileboxError::Zip { source, .. } => {
                matches!(source, ZipError::InvalidArchive(_) | ZipError::UnsupportedArchive(_))
            }
            FileboxError::Tar { .. } | FileboxError::UnsafeEntryName { .. } => true,
            FileboxError::Joined(errors) => errors.iter().any(FileboxError::is_format_error),
            _ => false,
        }
    }

    /// True for `NotRegularFile`, also when it sits inside a `Joined` error.
    pub fn is_not_regular_file(&self) -> bool {
        match self {
            FileboxError::NotRegularFile { .. } => true,
            FileboxError::Joined(errors) => errors.iter().any(FileboxError::is_not_regular_file),
            _ => false,
        }
    }
}

/// Merges the outcome of an operation with the outcome of closing its streams.
///
/// Both outcomes are kept: a successful operation whose close failed is still a failure.
pub fn join(operation: Result<()>, close: Result<()>) -> Result<()> {
    match (operation, close) {
        (Ok(()), Ok(())) => Ok(()),
        (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
        (Err(op), Err(cl)) => {
            let mut errors = match op {
                FileboxError::Joined(inner) => inner,
                other => vec![other],
            };
            errors.push(cl);
            Err(FileboxError::Joined(errors))
        }
    }
}
