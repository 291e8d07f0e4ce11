//! Order archive extraction.

use std::fs::{self, File};
use std::io;
use std::path::Path;

use tracing::debug;
use zip::ZipArchive;

use crate::engine::TransformError;

/// Unpacks the zip at `archive` into `target`, returning the number of files
/// written.
///
/// Blocking; call it from `spawn_blocking`. Entries whose names escape the
/// target folder abort the extraction.
pub fn extract_archive(archive: &Path, target: &Path) -> Result<usize, TransformError> {
    let file = File::open(archive).map_err(|e| TransformError::fs("open", archive, e))?;
    let mut zip = ZipArchive::new(file)
        .map_err(|e| TransformError::Parse(format!("{}: {}", archive.display(), e)))?;

    fs::create_dir_all(target).map_err(|e| TransformError::fs("create_dir_all", target, e))?;

    let mut written = 0;
    for index in 0..zip.len() {
        let mut entry = zip.by_index(index).map_err(|e| {
            TransformError::Parse(format!("{} entry {}: {}", archive.display(), index, e))
        })?;
        let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
            return Err(TransformError::Parse(format!(
                "{} contains unsafe entry {}",
                archive.display(),
                entry.name()
            )));
        };
        let destination = target.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&destination)
                .map_err(|e| TransformError::fs("create_dir_all", &destination, e))?;
            continue;
        }

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| TransformError::fs("create_dir_all", parent, e))?;
        }
        let mut output =
            File::create(&destination).map_err(|e| TransformError::fs("create", &destination, e))?;
        io::copy(&mut entry, &mut output)
            .map_err(|e| TransformError::fs("write", &destination, e))?;
        written += 1;
    }

    debug!("Extracted {} files from {:?} into {:?}", written, archive, target);
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::FileOptions;
    use zip::ZipWriter;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut zip = ZipWriter::new(file);
        for (name, data) in entries {
            zip.start_file(*name, FileOptions::default()).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_extracts_nested_entries() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("5001.zip");
        write_zip(
            &archive,
            &[
                ("item_1/surface_[0].jpg", b"cover"),
                ("item_1/surface_[1].jpg", b"sheet"),
                ("order.xml", b"<order/>"),
            ],
        );

        let target = dir.path().join("5001");
        let written = extract_archive(&archive, &target).unwrap();

        assert_eq!(written, 3);
        assert_eq!(
            fs::read(target.join("item_1").join("surface_[1].jpg")).unwrap(),
            b"sheet"
        );
        assert!(target.join("order.xml").exists());
    }

    #[test]
    fn test_rejects_escaping_entries() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("evil.zip");
        write_zip(&archive, &[("../outside.jpg", b"x")]);

        let err = extract_archive(&archive, &dir.path().join("out")).unwrap_err();
        assert!(matches!(err, TransformError::Parse(_)));
        assert!(!dir.path().join("outside.jpg").exists());
    }

    #[test]
    fn test_corrupt_archive_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("bad.zip");
        fs::write(&archive, b"not a zip").unwrap();

        let err = extract_archive(&archive, &dir.path().join("out")).unwrap_err();
        assert!(matches!(err, TransformError::Parse(_)));
    }

    #[test]
    fn test_missing_archive_is_filesystem_error() {
        let dir = TempDir::new().unwrap();
        let err = extract_archive(&dir.path().join("none.zip"), dir.path()).unwrap_err();
        assert!(matches!(err, TransformError::FileSystem(_)));
    }
}
