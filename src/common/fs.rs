use std::{fs, path::{Path, PathBuf}};

use walkdir::WalkDir;
use zip::ZipArchive;

use crate::error::{PullerError, Result};

/// Create the directory if it doesn't exist; error if a non-directory exists there.
pub fn ensure_dir_exists(path: &Path) -> Result<()> {
    if path.exists() {
        if !path.is_dir() {
            return Err(PullerError::config(format!("path exists but is not a directory: {}", path.display())));
        }
    } else {
        fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Extracts the given `.zip` file to the target directory and returns the extracted file paths.
/// If `delete_after` is `true`, removes the `.zip` file after a successful extraction.
pub fn extract_zip(zip_path: &Path, dest_dir: &Path, delete_after: bool) -> Result<Vec<PathBuf>> {
    let file = fs::File::open(zip_path)?;
    let mut archive = ZipArchive::new(file)?;
    ensure_dir_exists(dest_dir)?;
    archive.extract(dest_dir)?;

    let mut extracted = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        if entry.is_dir() { continue }
        // `enclosed_name` rejects absolute paths and `..` components.
        if let Some(rel) = entry.enclosed_name() {
            extracted.push(dest_dir.join(rel));
        }
    }

    if delete_after {
        fs::remove_file(zip_path)?;
    }
    Ok(extracted)
}

/// Read one member of a zip archive fully into memory.
pub fn read_zip_member(zip_path: &Path, predicate: impl Fn(&str) -> bool) -> Result<Option<(String, Vec<u8>)>> {
    use std::io::Read;

    let file = fs::File::open(zip_path)?;
    let mut archive = ZipArchive::new(file)?;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() || !predicate(entry.name()) { continue }
        let name = entry.name().to_string();
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut bytes)?;
        return Ok(Some((name, bytes)));
    }
    Ok(None)
}

/// All files below `dir` whose extension is one of `extensions` (case-insensitive), sorted.
pub fn find_files(dir: &Path, extensions: &[&str]) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
        })
        .collect();
    found.sort();
    found
}
