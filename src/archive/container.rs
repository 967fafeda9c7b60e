//! Blocking zip writers for chapter containers and the final series archive

use crate::error::{Error, Result};
use std::fs::File;
use std::io::{Seek, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

fn deflated() -> FileOptions {
    FileOptions::default().compression_method(CompressionMethod::Deflated)
}

fn archive_error(path: &Path) -> impl FnOnce(zip::result::ZipError) -> Error + '_ {
    move |source| Error::Archive {
        path: path.to_path_buf(),
        source,
    }
}

/// Regular files directly inside `dir`, sorted by file name
pub fn sorted_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Write a chapter container: the `documents` first, then every page in `pages_dir`
pub fn write_cbz(pages_dir: &Path, documents: &[(&str, &[u8])], dest: &Path) -> Result<()> {
    let file = File::create(dest)?;
    let mut zip = ZipWriter::new(file);

    for (name, bytes) in documents {
        zip.start_file(*name, deflated())
            .map_err(archive_error(dest))?;
        zip.write_all(bytes)?;
    }

    let pages = sorted_files(pages_dir)?;
    for page in &pages {
        let name = page
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        zip.start_file(name, deflated()).map_err(archive_error(dest))?;
        let mut source = File::open(page)?;
        std::io::copy(&mut source, &mut zip)?;
    }

    zip.finish().map_err(archive_error(dest))?;
    debug!(?dest, pages = pages.len(), "chapter container written");
    Ok(())
}

/// Compress everything below `root` into `dest`, paths relative to `root`
pub fn zip_directory(root: &Path, dest: &Path) -> Result<()> {
    let file = File::create(dest)?;
    let mut zip = ZipWriter::new(file);
    add_dir_to_zip(&mut zip, root, root, dest)?;
    zip.finish().map_err(archive_error(dest))?;
    Ok(())
}

fn add_dir_to_zip<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    base: &Path,
    dir: &Path,
    dest: &Path,
) -> Result<()> {
    let mut entries = std::fs::read_dir(dir)?.collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        let rel = path.strip_prefix(base).unwrap_or(&path);
        let name = rel.to_string_lossy().replace('\\', "/");

        if entry.file_type()?.is_dir() {
            zip.add_directory(format!("{}/", name), deflated())
                .map_err(archive_error(dest))?;
            add_dir_to_zip(zip, base, &path, dest)?;
        } else {
            zip.start_file(name, deflated()).map_err(archive_error(dest))?;
            let mut source = File::open(&path)?;
            std::io::copy(&mut source, zip)?;
        }
    }

    Ok(())
}
