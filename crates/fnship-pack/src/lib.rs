//! fnship pack — fingerprint and package function source trees.
//!
//! The fingerprint is the unit of change detection: it must be identical for
//! identical trees no matter where they live or how the filesystem orders
//! them. The archive only needs to be correct, not byte-reproducible, since it
//! is built solely when the fingerprint changed.

mod archive;
mod error;
mod hash;

pub use archive::{ArchiveFile, pack, pack_to_file};
pub use error::{PackError, PackResult};
pub use hash::fingerprint;

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// A regular file below a source root, with its `/`-separated relative path.
pub(crate) struct SourceFile {
    pub relative: String,
    pub absolute: PathBuf,
}

/// Every regular file below `root`, sorted by relative path.
///
/// Symlinks are followed, so a linked file is hashed and packed with the
/// bytes it points at. Link cycles surface as an error. Directories contribute
/// only through the files they contain.
pub(crate) fn collect_files(root: &Path) -> std::io::Result<Vec<SourceFile>> {
    if !root.is_dir() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("source directory does not exist: {}", root.display()),
        ));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(std::io::Error::other)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(std::io::Error::other)?
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        files.push(SourceFile {
            relative,
            absolute: entry.into_path(),
        });
    }
    files.sort_by(|a, b| a.relative.cmp(&b.relative));
    Ok(files)
}
