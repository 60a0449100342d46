//! Per-kernel outcomes and the batch summary.
//!
//! Timings are informational: they are printed and recorded, never turned into
//! a pass/fail verdict.

use polyprep_tools::ToolFailure;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Which step of a kernel's pipeline an external tool failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureStage {
    Transform,
    CompileOriginal,
    CompileTransformed,
    RunOriginal,
    RunTransformed,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureStage::Transform => "transform",
            FailureStage::CompileOriginal => "compile original",
            FailureStage::CompileTransformed => "compile transformed",
            FailureStage::RunOriginal => "run original",
            FailureStage::RunTransformed => "run transformed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KernelTimings {
    pub original_ms: f64,
    pub transformed_ms: f64,
    /// `original / transformed`; above 1.0 means the transformed variant ran
    /// faster. `None` when the transformed run took no measurable time.
    #[serde(default)]
    pub speedup: Option<f64>,
}

impl KernelTimings {
    pub fn new(original: Duration, transformed: Duration) -> Self {
        let original_ms = original.as_secs_f64() * 1000.0;
        let transformed_ms = transformed.as_secs_f64() * 1000.0;
        Self {
            original_ms,
            transformed_ms,
            speedup: (transformed_ms > 0.0).then(|| original_ms / transformed_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum KernelOutcome {
    Succeeded {
        timings: KernelTimings,
    },
    SkippedToolFailure {
        stage: FailureStage,
        failure: ToolFailure,
    },
    SkippedLocatorFailure {
        reason: String,
    },
}

impl KernelOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, KernelOutcome::Succeeded { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelRecord {
    pub kernel: String,
    pub path: String,
    pub function: String,
    pub outcome: KernelOutcome,
}

/// Running success/failure counts, owned by the driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchTally {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchTally {
    pub fn record(&mut self, outcome: &KernelOutcome) {
        self.total += 1;
        if outcome.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }

    pub fn summary_line(&self) -> String {
        format!(
            "{} benchmarks processed, {} succeeded, {} failed",
            self.total, self.succeeded, self.failed
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub generated_at_unix_ms: u128,
    pub tally: BatchTally,
    pub kernels: Vec<KernelRecord>,
}

impl BatchReport {
    pub fn new(tally: BatchTally, kernels: Vec<KernelRecord>) -> Self {
        let generated_at_unix_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_else(|_| Duration::from_secs(0))
            .as_millis();
        Self {
            generated_at_unix_ms,
            tally,
            kernels,
        }
    }

    pub fn summary_line(&self) -> String {
        self.tally.summary_line()
    }

    pub fn as_map(&self) -> BTreeMap<&str, &KernelRecord> {
        self.kernels
            .iter()
            .map(|record| (record.kernel.as_str(), record))
            .collect()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let report = serde_json::from_str(&json)?;
        Ok(report)
    }
}
