//! Source archive setup: digest check, extraction and output directories.

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tar::Archive;
use thiserror::Error;
use tracing::info;

/// Fatal setup conditions. Any of these aborts the whole run.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("directory {} already exists, quitting", .0.display())]
    DirectoryExists(PathBuf),
    #[error("archive {} not found", .0.display())]
    MissingArchive(PathBuf),
    #[error("archive {} did not have the expected hash: expected {expected}, found {actual}", .path.display())]
    DigestMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
    #[error("directory {} does not exist after extraction, quitting", .0.display())]
    MissingDirectory(PathBuf),
}

pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect())
}

/// Fails unless the archive's SHA-256 equals `expected` (case-insensitive hex).
pub fn verify_digest(archive: &Path, expected: &str) -> Result<()> {
    if !archive.is_file() {
        return Err(SetupError::MissingArchive(archive.to_path_buf()).into());
    }
    let actual = sha256_file(archive)
        .with_context(|| format!("failed to hash {}", archive.display()))?;
    if !actual.eq_ignore_ascii_case(expected.trim()) {
        return Err(SetupError::DigestMismatch {
            path: archive.to_path_buf(),
            expected: expected.trim().to_ascii_lowercase(),
            actual,
        }
        .into());
    }
    info!(archive = %archive.display(), sha256 = %actual, "archive digest verified");
    Ok(())
}

/// Unpack a `.tar.gz` into `destination`.
pub fn extract_tar_gz(archive: &Path, destination: &Path) -> Result<()> {
    let file =
        File::open(archive).with_context(|| format!("failed to open {}", archive.display()))?;
    let mut tarball = Archive::new(GzDecoder::new(file));
    tarball.unpack(destination).with_context(|| {
        format!(
            "failed to extract {} into {}",
            archive.display(),
            destination.display()
        )
    })?;
    Ok(())
}

/// Create `dir`, failing if it already exists.
pub fn create_fresh_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        return Err(SetupError::DirectoryExists(dir.to_path_buf()).into());
    }
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    Ok(())
}
