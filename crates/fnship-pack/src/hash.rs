//! Content fingerprinting.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use fnship_core::ContentFingerprint;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::collect_files;
use crate::error::{PackError, PackResult};

const READ_CHUNK: usize = 64 * 1024;

/// SHA-256 over every file below `source_path`, visited in lexicographic
/// relative-path order.
///
/// Each file contributes its relative path, byte length and contents, so
/// moving bytes between files or renaming a file changes the digest. File
/// metadata (mtime, permissions, owner) is never read.
pub fn fingerprint(source_path: &Path) -> PackResult<ContentFingerprint> {
    let io_err = |source: std::io::Error| PackError::Io {
        path: source_path.to_path_buf(),
        source,
    };

    let files = collect_files(source_path).map_err(io_err)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_CHUNK];

    for file in &files {
        let mut reader = File::open(&file.absolute).map_err(io_err)?;
        let len = reader.metadata().map_err(io_err)?.len();

        hasher.update(file.relative.as_bytes());
        hasher.update([0u8]);
        hasher.update(len.to_be_bytes());
        loop {
            let n = reader.read(&mut buf).map_err(io_err)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
    }

    let hex = hex::encode(hasher.finalize());
    debug!(path = ?source_path, files = files.len(), fingerprint = %&hex[..12], "fingerprint computed");
    ContentFingerprint::from_hex(&hex).map_err(|e| PackError::Io {
        path: source_path.to_path_buf(),
        source: std::io::Error::other(e),
    })
}
