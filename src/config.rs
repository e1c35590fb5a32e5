//! Tunables for archive operations.

use std::path::PathBuf;

/// Gzip level used when the caller does not pick one.
pub const DEFAULT_GZIP_LEVEL: u32 = 6;

/// Environment variable that overrides where append stages its temporary files.
pub const TMPDIR_ENV: &str = "FILEBOX_TMPDIR";

/// Settings for the append operations.
#[derive(Debug, Clone)]
pub struct AppendOptions {
    /// Directory for the temporary archive (and, for tar.gz, the scratch tree).
    /// `None` falls back to `FILEBOX_TMPDIR`, then to the system temp directory.
    pub temp_dir: Option<PathBuf>,
    /// Gzip level of the rebuilt tar.gz archive. Ignored for zip.
    pub level: u32,
}

impl Default for AppendOptions {
    fn default() -> Self {
        Self { temp_dir: None, level: DEFAULT_GZIP_LEVEL }
    }
}

impl AppendOptions {
    pub fn resolved_temp_dir(&self) -> PathBuf {
        temp_dir_from_opt_or_env(self.temp_dir.clone())
    }
}

/// Priority:
/// 1. the explicit option.
/// 2. `FILEBOX_TMPDIR` environment variable.
/// 3. the system temp directory.
pub fn temp_dir_from_opt_or_env(dir_opt: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = dir_opt {
        return dir;
    }
    match std::env::var_os(TMPDIR_ENV) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => std::env::temp_dir(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_dir_wins() {
        let opts = AppendOptions { temp_dir: Some(PathBuf::from("/srv/scratch")), ..Default::default() };
        assert_eq!(opts.resolved_temp_dir(), PathBuf::from("/srv/scratch"));
        assert_eq!(opts.level, DEFAULT_GZIP_LEVEL);
    }
}
