//! Main entry point for the filebox CLI app

use filebox::cli::{self, Commands, Format, HashAlgo};
use filebox::{hash, AppendOptions, ArchiveFormat};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

fn main() -> std::process::ExitCode {
    if let Err(e) = run_app() {
        if e.downcast_ref::<clap::Error>().is_none() {
            eprintln!("Error: {}", e);
        }
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn detect(archive: &Path) -> Result<ArchiveFormat, Box<dyn std::error::Error>> {
    ArchiveFormat::detect(archive)?
        .ok_or_else(|| format!("'{}' is neither a zip nor a tar.gz archive", archive.display()).into())
}

fn run_app() -> Result<(), Box<dyn std::error::Error>> {
    let args = cli::run()?;
    init_logging(args.verbose);

    match args.command {
        Commands::Create { src, output, format, level } => {
            match format.or_else(|| Format::from_extension(&output)).unwrap_or(Format::Zip) {
                Format::Zip => filebox::create_zip(&src, &output)?,
                Format::Tgz => filebox::create_tar_gzip(&src, &output, level)?,
            }
        }
        Commands::Extract { archive, output } => {
            let dest = output.unwrap_or_else(|| PathBuf::from("."));
            match detect(&archive)? {
                ArchiveFormat::Zip => filebox::extract_zip(&archive, &dest)?,
                ArchiveFormat::TarGzip => filebox::extract_tar_gzip(&archive, &dest)?,
            }
        }
        Commands::Append { archive, sources, tmp_dir, level } => {
            let options = AppendOptions { temp_dir: tmp_dir, level };
            match detect(&archive)? {
                ArchiveFormat::Zip => filebox::append_to_zip_with(
                    &options,
                    &filebox::OuterLayer,
                    &filebox::ZipEntryWriter::default(),
                    &archive,
                    &sources,
                )?,
                ArchiveFormat::TarGzip => filebox::append_to_tar_gzip_with(
                    &options,
                    &filebox::OuterLayer,
                    &filebox::TarEntryWriter,
                    &archive,
                    &sources,
                )?,
            }
        }
        Commands::List { archive } => {
            let names = match detect(&archive)? {
                ArchiveFormat::Zip => filebox::list_zip(&archive)?,
                ArchiveFormat::TarGzip => filebox::list_tar_gzip(&archive)?,
            };
            for name in names {
                println!("{name}");
            }
        }
        Commands::Hash { file, algo } => {
            let digest = match algo {
                HashAlgo::Md5 => hash::md5(&file)?,
                HashAlgo::Sha1 => hash::sha1(&file)?,
                HashAlgo::Sha256 => hash::sha256(&file)?,
                HashAlgo::Sha512 => hash::sha512(&file)?,
                HashAlgo::Blake3 => hash::blake3(&file)?,
            };
            println!("{}  {}", hash::to_hex(&digest), file.display());
        }
    }

    Ok(())
}
