//! Environment introspection.

use std::panic::Location;
use std::path::PathBuf;

/// Directory containing the running executable.
pub fn binary_path() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    exe.parent().map(|p| p.to_path_buf())
}

/// Source file of the code that calls this function.
#[track_caller]
pub fn caller_path() -> &'static str {
    Location::caller().file()
}
