use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::DEFAULT_GZIP_LEVEL;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Log every archive entry (same as RUST_LOG=debug).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Create an archive from a file or a directory.
    #[command(alias = "c")]
    Create {
        /// File or directory to archive. A directory's own name is not stored.
        #[arg(required = true)]
        src: PathBuf,

        /// The path for the output archive file (e.g., home.zip).
        #[arg(short, long)]
        output: PathBuf,

        /// Container format. Defaults to the output extension, then zip.
        #[arg(long, value_enum)]
        format: Option<Format>,

        /// Gzip compression level (0-9). Used only for tgz.
        #[arg(long, default_value_t = DEFAULT_GZIP_LEVEL, value_parser = clap::value_parser!(u32).range(0..=9))]
        level: u32,
    },

    /// Extract an archive; the format is detected from its content.
    #[command(alias = "x")]
    Extract {
        /// The archive file to extract.
        #[arg(required = true)]
        archive: PathBuf,

        /// The directory where files will be extracted. Defaults to the current directory.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Add files or directories to an existing archive.
    #[command(alias = "a")]
    Append {
        /// The archive to extend.
        #[arg(required = true)]
        archive: PathBuf,

        /// Files or directories to add. Directories keep their own name.
        #[arg(required = true)]
        sources: Vec<PathBuf>,

        /// Directory for temporary files. Falls back to FILEBOX_TMPDIR, then the system temp directory.
        #[arg(long)]
        tmp_dir: Option<PathBuf>,

        /// Gzip compression level (0-9) of the rebuilt tar.gz.
        #[arg(long, default_value_t = DEFAULT_GZIP_LEVEL, value_parser = clap::value_parser!(u32).range(0..=9))]
        level: u32,
    },

    /// List the entries of an archive without extracting it.
    #[command(alias = "l")]
    List {
        /// The archive file to list contents of.
        #[arg(required = true)]
        archive: PathBuf,
    },

    /// Print the digest of a file.
    Hash {
        #[arg(required = true)]
        file: PathBuf,

        #[arg(long, value_enum, default_value_t = HashAlgo::Sha256)]
        algo: HashAlgo,
    },
}

/// Archive container formats accepted by `create`.
#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
pub enum Format {
    Zip,
    /// gzip-compressed tar.
    Tgz,
}

impl Format {
    /// Guesses the format from an output file name (`.tgz`, `.tar.gz`, `.zip`).
    pub fn from_extension(path: &std::path::Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_ascii_lowercase();
        if name.ends_with(".tgz") || name.ends_with(".tar.gz") {
            Some(Format::Tgz)
        } else if name.ends_with(".zip") {
            Some(Format::Zip)
        } else {
            None
        }
    }
}

#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
pub enum HashAlgo {
    Md5,
    Sha1,
    Sha256,
    Sha512,
    Blake3,
}

/// Parses command-line arguments using `clap`.
pub fn run() -> Result<Args, Box<dyn std::error::Error>> {
    Ok(Args::parse())
}
