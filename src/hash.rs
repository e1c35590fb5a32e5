//! File and stream digests.
//!
//! Independent of the archive code. Digests are computed by streaming the
//! input through a fixed buffer, so file size does not affect memory use.

use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256, Sha512};

use crate::error::{FileboxError, Result};
use crate::fsx::File;

const HASH_BUF_SIZE: usize = 64 * 1024;

/// Digest of everything `reader` yields.
pub fn reader_sum<D: Digest>(mut reader: impl Read) -> io::Result<Vec<u8>> {
    let mut hasher = D::new();
    let mut buf = vec![0u8; HASH_BUF_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_vec())
}

pub fn file_sum<D: Digest>(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| FileboxError::io(e, path))?;
    reader_sum::<D>(file).map_err(|e| FileboxError::io(e, path))
}

pub fn md5(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = path.as_ref();
    let mut file = File::open(path).map_err(|e| FileboxError::io(e, path))?;
    let mut context = md5::Context::new();
    io::copy(&mut file, &mut context).map_err(|e| FileboxError::io(e, path))?;
    Ok(context.compute().0.to_vec())
}

pub fn sha1(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    file_sum::<sha1::Sha1>(path)
}

pub fn sha256(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    file_sum::<Sha256>(path)
}

pub fn sha512(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    file_sum::<Sha512>(path)
}

pub fn blake3(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = path.as_ref();
    let mut file = File::open(path).map_err(|e| FileboxError::io(e, path))?;
    let mut hasher = blake3::Hasher::new();
    io::copy(&mut file, &mut hasher).map_err(|e| FileboxError::io(e, path))?;
    Ok(hasher.finalize().as_bytes().to_vec())
}

/// Lower-case hexadecimal rendering of a digest.
pub fn to_hex(digest: &[u8]) -> String {
    use std::fmt::Write;
    digest.iter().fold(String::with_capacity(digest.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}
