//! Zip packing for circuit uploads and result downloads.
use std::{
    fs::File,
    io::{self, Cursor, Seek, Write},
    path::{Path, PathBuf},
};

use tracing::{debug, warn};
use zip::{CompressionMethod, ZipArchive, ZipWriter, write::SimpleFileOptions};

use crate::error::ApiError;

/// Extract `bytes` under `dir` and return the files written.
///
/// Entries whose names would escape `dir` are skipped.
pub fn unpack(bytes: &[u8], dir: &Path) -> Result<Vec<PathBuf>, ApiError> {
    let mut zip = ZipArchive::new(Cursor::new(bytes))?;
    let mut written = Vec::with_capacity(zip.len());

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let Some(rel) = entry.enclosed_name() else {
            warn!(name = entry.name(), "skipping archive entry outside the working directory");
            continue;
        };
        let out = dir.join(rel);
        if entry.is_dir() {
            std::fs::create_dir_all(&out)?;
            continue;
        }
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = File::create(&out)?;
        io::copy(&mut entry, &mut file)?;
        debug!(file = %out.display(), "unpacked");
        written.push(out);
    }
    Ok(written)
}

/// Zip `files` (flat, by file name) into `dest`.
pub fn pack_to_file(files: &[&Path], dest: &Path) -> Result<(), ApiError> {
    write_zip(File::create(dest)?, files)?;
    Ok(())
}

/// Zip `files` (flat, by file name) in memory.
pub fn pack(files: &[&Path]) -> Result<Vec<u8>, ApiError> {
    Ok(write_zip(Cursor::new(Vec::new()), files)?.into_inner())
}

fn write_zip<W: Write + Seek>(out: W, files: &[&Path]) -> Result<W, ApiError> {
    let mut zip = ZipWriter::new(out);
    let opts = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for path in files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ApiError::Archive(format!("not a file: {}", path.display())))?;
        zip.start_file(name, opts)?;
        let mut src = File::open(path)?;
        io::copy(&mut src, &mut zip)?;
    }
    Ok(zip.finish()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("spice-api-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn pack_then_unpack_elsewhere() {
        let src = scratch();
        let a = src.join("rc.net");
        let b = src.join("models.lib");
        std::fs::write(&a, "V1 in 0 1\n").unwrap();
        std::fs::write(&b, ".model D D\n").unwrap();

        let bytes = pack(&[a.as_path(), b.as_path()]).unwrap();
        let dst = scratch();
        let files = unpack(&bytes, &dst).unwrap();

        assert_eq!(files, vec![dst.join("rc.net"), dst.join("models.lib")]);
        assert_eq!(std::fs::read_to_string(dst.join("rc.net")).unwrap(), "V1 in 0 1\n");
    }

    #[test]
    fn entries_cannot_escape() {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("../evil.txt", SimpleFileOptions::default()).unwrap();
        zip.write_all(b"x").unwrap();
        zip.start_file("sub/ok.txt", SimpleFileOptions::default()).unwrap();
        zip.write_all(b"y").unwrap();
        let bytes = zip.finish().unwrap().into_inner();

        let dst = scratch();
        let files = unpack(&bytes, &dst).unwrap();
        assert_eq!(files, vec![dst.join("sub").join("ok.txt")]);
        assert!(!dst.parent().unwrap().join("evil.txt").exists());
    }

    #[test]
    fn garbage_is_an_archive_error() {
        assert!(matches!(
            unpack(b"definitely not a zip", &scratch()),
            Err(ApiError::Archive(_))
        ));
    }
}
