//! Harness configuration with the PolyBench/C 4.2 conventions as defaults.

use anyhow::{Context, Result};
use polyprep_source::{ClosingBrace, DEFAULT_DIRECTIVE_MARKER};
use polyprep_tools::{CompilerSpec, PreprocessorSpec, TransformerSpec};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub file: PathBuf,
    /// Lowercase hex SHA-256 of `file`.
    pub sha256: String,
    /// Directory the archive unpacks into.
    pub sources_dir: PathBuf,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::from("polybench-c-4.2.tar.gz"),
            sha256: "ecf1546d84ff4dc4ff02a8ad4b303ff15c6fd0940fccb37fd9dfb2eb223fe8b3".to_string(),
            sources_dir: PathBuf::from("polybench-c-4.2"),
        }
    }
}

/// Paths relative to the extracted sources root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub processed_dir: PathBuf,
    pub bin_dir: PathBuf,
    pub scratch_file: PathBuf,
    pub manifest: PathBuf,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            processed_dir: PathBuf::from("processed"),
            bin_dir: PathBuf::from("bin"),
            scratch_file: PathBuf::from("tmp_kernel.c"),
            manifest: PathBuf::from("utilities/benchmark_list"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    /// Prepended to the kernel name to form the searched function name.
    pub function_prefix: String,
    pub directive_marker: String,
    pub closing_brace: ClosingBrace,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            function_prefix: "kernel_".to_string(),
            directive_marker: DEFAULT_DIRECTIVE_MARKER.to_string(),
            closing_brace: ClosingBrace::Append,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub archive: ArchiveConfig,
    pub layout: LayoutConfig,
    pub locator: LocatorConfig,
    pub preprocessor: PreprocessorSpec,
    pub transformer: TransformerSpec,
    pub compiler: CompilerSpec,
}

impl HarnessConfig {
    /// Missing files yield the defaults; missing keys fall back per field.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config = serde_json::from_slice(&data)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let blob = serde_json::to_vec_pretty(self)?;
        fs::write(path, blob)?;
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
