use crate::error::Result;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

const READ_CHUNK: usize = 8192;

/// Compute the SHA-256 digest of a file as a lowercase hex string.
///
/// Reads in fixed-size chunks so arbitrarily large artifacts never have to
/// fit in memory.
pub fn file_sha256(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; READ_CHUNK];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Case-insensitive hex digest comparison.
pub fn digest_matches(actual: &str, expected: &str) -> bool {
    actual.eq_ignore_ascii_case(expected)
}
