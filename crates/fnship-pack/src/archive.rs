//! Zip packaging of a source tree.

use std::fs::File;
use std::io::{Cursor, Seek, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{PackError, PackResult};
use crate::{SourceFile, collect_files};

/// A packaged archive on local disk. The file is removed when this value is
/// dropped, on every exit path of the caller.
#[derive(Debug)]
pub struct ArchiveFile {
    file: NamedTempFile,
    size_bytes: u64,
}

impl ArchiveFile {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }
}

/// Package `source_path` into an in-memory zip.
pub fn pack(source_path: &Path) -> PackResult<Vec<u8>> {
    let files = collect_files(source_path).map_err(|e| packaging(source_path, e))?;
    let cursor = write_zip(&files, Cursor::new(Vec::new()))
        .map_err(|e| packaging(source_path, e))?;
    Ok(cursor.into_inner())
}

/// Package `source_path` into a temporary zip file created in `temp_dir`.
pub fn pack_to_file(source_path: &Path, temp_dir: &Path) -> PackResult<ArchiveFile> {
    let files = collect_files(source_path).map_err(|e| packaging(source_path, e))?;
    let prefix = source_path
        .file_name()
        .map(|n| format!("{}-", n.to_string_lossy()))
        .unwrap_or_else(|| "function-".to_string());

    let mut file = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".zip")
        .tempfile_in(temp_dir)
        .map_err(|e| packaging(source_path, e))?;
    write_zip(&files, file.as_file_mut()).map_err(|e| packaging(source_path, e))?;
    let size_bytes = file
        .as_file()
        .metadata()
        .map_err(|e| packaging(source_path, e))?
        .len();

    debug!(
        path = ?source_path,
        archive = ?file.path(),
        entries = files.len(),
        size_bytes,
        "archive written"
    );
    Ok(ArchiveFile { file, size_bytes })
}

/// Entries are named by their path relative to the source root.
fn write_zip<W: Write + Seek>(files: &[SourceFile], writer: W) -> std::io::Result<W> {
    let mut zip = ZipWriter::new(writer);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);

    for file in files {
        zip.start_file(file.relative.as_str(), options)
            .map_err(std::io::Error::other)?;
        let mut source = File::open(&file.absolute)?;
        std::io::copy(&mut source, &mut zip)?;
    }
    zip.finish().map_err(std::io::Error::other)
}

fn packaging(path: &Path, err: impl std::fmt::Display) -> PackError {
    PackError::Packaging {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Read;

    fn sample_tree() -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("charge");
        fs::create_dir_all(root.join("lib")).unwrap();
        fs::write(root.join("lambda_function.py"), "def lambda_handler(e, c): pass\n").unwrap();
        fs::write(root.join("lib/util.py"), "X = 1\n").unwrap();
        (dir, root)
    }

    #[test]
    fn entries_are_relative_to_source_root() {
        let (_dir, root) = sample_tree();
        let bytes = pack(&root).unwrap();

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(names, vec!["lambda_function.py", "lib/util.py"]);

        let mut body = String::new();
        archive
            .by_name("lib/util.py")
            .unwrap()
            .read_to_string(&mut body)
            .unwrap();
        assert_eq!(body, "X = 1\n");
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_file_is_packed_with_target_bytes() {
        let (dir, root) = sample_tree();
        let shared = dir.path().join("shared.py");
        fs::write(&shared, "SHARED = True\n").unwrap();
        std::os::unix::fs::symlink(&shared, root.join("shared.py")).unwrap();

        let bytes = pack(&root).unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(names, vec!["lambda_function.py", "lib/util.py", "shared.py"]);

        let mut body = String::new();
        archive
            .by_name("shared.py")
            .unwrap()
            .read_to_string(&mut body)
            .unwrap();
        assert_eq!(body, "SHARED = True\n");
    }

    #[test]
    fn temp_archive_is_removed_on_drop() {
        let (dir, root) = sample_tree();
        let archive = pack_to_file(&root, dir.path()).unwrap();
        let path = archive.path().to_path_buf();
        assert!(path.exists());
        assert!(archive.size_bytes() > 0);
        drop(archive);
        assert!(!path.exists());
    }

    #[test]
    fn missing_source_is_packaging_failure() {
        let dir = tempfile::tempdir().unwrap();
        let err = pack_to_file(&dir.path().join("missing"), dir.path()).unwrap_err();
        assert!(matches!(err, PackError::Packaging { .. }));
    }
}
