//! On-disk layout of a run and the setup sequence that creates it.

use crate::archive::{create_fresh_dir, extract_tar_gz, verify_digest, SetupError};
use crate::config::HarnessConfig;
use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::info;

/// Where sources come from before the batch starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    /// Verify and unpack the configured archive; the sources dir must not exist yet.
    Extract,
    /// Use an already-extracted sources dir as-is.
    Reuse,
}

/// Paths of one run. Everything below `sources_root` is kept relative so that
/// commands run from the sources root see the same names the operator does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceLayout {
    workdir: PathBuf,
    archive: PathBuf,
    sources_root: PathBuf,
    processed_dir: PathBuf,
    bin_dir: PathBuf,
    scratch_file: PathBuf,
    manifest: PathBuf,
}

impl WorkspaceLayout {
    pub fn new(workdir: &Path, config: &HarnessConfig) -> Self {
        Self {
            workdir: workdir.to_path_buf(),
            archive: workdir.join(&config.archive.file),
            sources_root: workdir.join(&config.archive.sources_dir),
            processed_dir: config.layout.processed_dir.clone(),
            bin_dir: config.layout.bin_dir.clone(),
            scratch_file: config.layout.scratch_file.clone(),
            manifest: config.layout.manifest.clone(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn archive(&self) -> &Path {
        &self.archive
    }

    pub fn sources_root(&self) -> &Path {
        &self.sources_root
    }

    pub fn resolve(&self, relative: &Path) -> PathBuf {
        self.sources_root.join(relative)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.resolve(&self.manifest)
    }

    pub fn scratch_path(&self) -> PathBuf {
        self.resolve(&self.scratch_file)
    }

    pub fn original_source(&self, kernel: &str) -> PathBuf {
        self.processed_dir.join(format!("{kernel}.orig.c"))
    }

    pub fn transformed_source(&self, kernel: &str) -> PathBuf {
        self.processed_dir.join(format!("{kernel}.opt.c"))
    }

    pub fn original_binary(&self, kernel: &str) -> PathBuf {
        self.bin_dir.join(format!("{kernel}_orig"))
    }

    pub fn transformed_binary(&self, kernel: &str) -> PathBuf {
        self.bin_dir.join(format!("{kernel}_opt"))
    }

    /// Run setup. Any failure here is fatal; the digest is checked before
    /// anything is created on disk.
    pub fn prepare(&self, config: &HarnessConfig, mode: SourceMode) -> Result<()> {
        if mode == SourceMode::Extract {
            if self.sources_root.exists() {
                return Err(SetupError::DirectoryExists(self.sources_root.clone()).into());
            }
            println!("Extracting sources from {}", self.archive.display());
            verify_digest(&self.archive, &config.archive.sha256)?;
            extract_tar_gz(&self.archive, &self.workdir)?;
        }

        println!("Processing sources");
        if !self.sources_root.is_dir() {
            return Err(SetupError::MissingDirectory(self.sources_root.clone()).into());
        }
        create_fresh_dir(&self.resolve(&self.processed_dir))?;
        create_fresh_dir(&self.resolve(&self.bin_dir))?;
        info!(sources = %self.sources_root.display(), "workspace prepared");
        Ok(())
    }
}
