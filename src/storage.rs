// File system operations for exported artifacts
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to get app data directory")]
    NoAppDataDir,
    #[error("Invalid artifact filename: {0:?}")]
    InvalidFilename(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Get the app data directory for chordflow
pub fn get_app_data_dir() -> StorageResult<PathBuf> {
    let data_dir = dirs::data_dir().ok_or(StorageError::NoAppDataDir)?;
    let app_dir = data_dir.join("chordflow");
    fs::create_dir_all(&app_dir)?;
    Ok(app_dir)
}

/// Default directory for exports when none is given
pub fn get_exports_dir() -> StorageResult<PathBuf> {
    let exports_dir = get_app_data_dir()?.join("exports");
    fs::create_dir_all(&exports_dir)?;
    Ok(exports_dir)
}

/// Write an artifact into `dir` and return its path and SHA256 hash
pub fn write_artifact(dir: &Path, filename: &str, data: &[u8]) -> StorageResult<(PathBuf, String)> {
    let is_plain_name = Path::new(filename)
        .file_name()
        .map(|name| name == filename)
        .unwrap_or(false);
    if !is_plain_name {
        return Err(StorageError::InvalidFilename(filename.to_string()));
    }

    fs::create_dir_all(dir)?;
    let file_path = dir.join(filename);
    let mut file = fs::File::create(&file_path)?;
    file.write_all(data)?;

    let hash = calculate_sha256(data);
    log::info!("Wrote {} ({} bytes, sha256 {})", file_path.display(), data.len(), hash);

    Ok((file_path, hash))
}

/// Read a file from disk
pub fn read_file(path: &Path) -> StorageResult<Vec<u8>> {
    Ok(fs::read(path)?)
}

/// Calculate SHA256 hash of data
pub fn calculate_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// "Verse & Chorus!" -> "verse-chorus"
pub fn artifact_stem(name: &str) -> String {
    let mut stem = String::new();
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            stem.push(c.to_ascii_lowercase());
        } else if !stem.ends_with('-') && !stem.is_empty() {
            stem.push('-');
        }
    }
    let stem = stem.trim_end_matches('-');
    if stem.is_empty() {
        "arrangement".to_string()
    } else {
        stem.to_string()
    }
}
