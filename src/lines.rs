//! Line-oriented file reading.

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::error::{FileboxError, Result};
use crate::fsx::{self as fs, File};

/// Reads a file one line at a time, without a line-length limit.
///
/// Line terminators (`\n` and `\r\n`) are stripped. The final line is
/// returned even when the file does not end with a newline.
pub struct LineReader {
    reader: BufReader<File>,
    path: PathBuf,
    line: Vec<u8>,
}

impl LineReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| FileboxError::io(e, path))?;
        Ok(Self {
            reader: BufReader::new(file),
            path: path.to_path_buf(),
            line: Vec::with_capacity(4096),
        })
    }

    /// The next line, or `Ok(None)` once the file is exhausted.
    pub fn next_line(&mut self) -> Result<Option<Vec<u8>>> {
        self.line.clear();
        let n = self
            .reader
            .read_until(b'\n', &mut self.line)
            .map_err(|e| FileboxError::io(e, &self.path))?;
        if n == 0 {
            return Ok(None);
        }
        if self.line.last() == Some(&b'\n') {
            self.line.pop();
            if self.line.last() == Some(&b'\r') {
                self.line.pop();
            }
        }
        Ok(Some(self.line.clone()))
    }
}

impl Iterator for LineReader {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_line().transpose()
    }
}

/// Reads every line of a file into memory. Invalid UTF-8 is replaced lossily.
pub fn read_file_lines(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let mut lines = Vec::with_capacity(64);
    for line in LineReader::open(path)? {
        lines.push(String::from_utf8_lossy(&line?).into_owned());
    }
    Ok(lines)
}

pub fn read_file_bytes(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = path.as_ref();
    fs::read(path).map_err(|e| FileboxError::io(e, path))
}

pub fn read_file_string(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    fs::read_to_string(path).map_err(|e| FileboxError::io(e, path))
}
