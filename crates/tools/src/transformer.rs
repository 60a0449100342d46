//! Adapter for the external code-transformation tool.

use crate::process::{Invocation, ToolFailure};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TransformError {
    /// The tool ran and rejected the kernel. Recoverable: skip the kernel.
    #[error(transparent)]
    Tool(#[from] ToolFailure),
    #[error("failed to write scratch file {}: {source}", .path.display())]
    Scratch { path: PathBuf, source: io::Error },
}

/// Turns an isolated kernel snippet into a rewritten body.
pub trait Transformer {
    fn name(&self) -> &str;

    /// `snippet` is the full function, signature included, so the tool gets
    /// compilable input. Returns the replacement body.
    fn transform(&mut self, snippet: &str, entry_point: &str) -> Result<String, TransformError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformerSpec {
    /// Relative paths with a directory component resolve against the sources root.
    pub program: PathBuf,
    pub entry_point_flag: String,
    /// Number of `int tN;` scratch declarations the rewritten code expects.
    pub temp_declarations: usize,
}

impl Default for TransformerSpec {
    fn default() -> Self {
        Self {
            program: PathBuf::from("../../build/bin/spf-ie"),
            entry_point_flag: "--entry-point".to_string(),
            temp_declarations: 10,
        }
    }
}

/// `int t0;` .. `int t{count-1};` followed by a blank line; empty for zero.
pub fn temp_declarations(count: usize) -> String {
    if count == 0 {
        return String::new();
    }
    let mut prelude: String = (0..count).map(|i| format!("int t{i};\n")).collect();
    prelude.push('\n');
    prelude
}

/// Runs the configured tool on a single fixed scratch file.
///
/// The scratch slot is overwritten for every kernel, so one instance must not
/// serve two kernels at once; `&mut self` on `transform` enforces that.
pub struct ExternalTransformer {
    spec: TransformerSpec,
    scratch: PathBuf,
    working_dir: PathBuf,
    prelude: String,
}

impl ExternalTransformer {
    pub fn new(spec: TransformerSpec, scratch: PathBuf, working_dir: PathBuf) -> Self {
        let prelude = temp_declarations(spec.temp_declarations);
        Self {
            spec,
            scratch,
            working_dir,
            prelude,
        }
    }

    pub fn scratch_path(&self) -> &Path {
        &self.scratch
    }

    pub fn invocation(&self, entry_point: &str) -> Invocation {
        Invocation::new(&self.spec.program)
            .path_arg(&self.scratch)
            .arg(self.spec.entry_point_flag.as_str())
            .arg(entry_point)
            .current_dir(&self.working_dir)
    }
}

impl Transformer for ExternalTransformer {
    fn name(&self) -> &str {
        "external"
    }

    fn transform(&mut self, snippet: &str, entry_point: &str) -> Result<String, TransformError> {
        fs::write(&self.scratch, snippet).map_err(|source| TransformError::Scratch {
            path: self.scratch.clone(),
            source,
        })?;

        let output = self.invocation(entry_point).run_checked()?;
        debug!(
            entry_point,
            bytes = output.stdout.len(),
            elapsed_ms = output.elapsed.as_secs_f64() * 1000.0,
            "transformation succeeded"
        );

        let mut body = String::with_capacity(self.prelude.len() + output.stdout.len());
        body.push_str(&self.prelude);
        body.push_str(&output.stdout);
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declarations_match_convention() {
        let prelude = temp_declarations(3);
        assert_eq!(prelude, "int t0;\nint t1;\nint t2;\n\n");
        assert!(temp_declarations(0).is_empty());
        assert!(temp_declarations(10).ends_with("int t9;\n\n"));
    }

    #[test]
    fn invocation_passes_scratch_and_entry_point() {
        let transformer = ExternalTransformer::new(
            TransformerSpec::default(),
            PathBuf::from("/src/tmp_kernel.c"),
            PathBuf::from("/src"),
        );
        let invocation = transformer.invocation("kernel_gemm");
        assert_eq!(
            invocation.arguments(),
            &["/src/tmp_kernel.c", "--entry-point", "kernel_gemm"]
        );
    }

    #[cfg(unix)]
    #[test]
    fn tool_output_is_prefixed_and_scratch_written() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join("tmp_kernel.c");
        let spec = TransformerSpec {
            program: PathBuf::from("echo"),
            entry_point_flag: "--entry-point".into(),
            temp_declarations: 1,
        };
        let mut transformer =
            ExternalTransformer::new(spec, scratch.clone(), dir.path().to_path_buf());

        let body = transformer.transform("void\nkernel_x()\n{\n}\n", "kernel_x").unwrap();
        let expected_args = format!("{} --entry-point kernel_x\n", scratch.display());
        assert_eq!(body, format!("int t0;\n\n{expected_args}"));
        assert_eq!(
            fs::read_to_string(&scratch).unwrap(),
            "void\nkernel_x()\n{\n}\n"
        );
    }

    #[cfg(unix)]
    #[test]
    fn failing_tool_is_recoverable() {
        let dir = tempfile::tempdir().unwrap();
        let spec = TransformerSpec {
            program: PathBuf::from("false"),
            ..TransformerSpec::default()
        };
        let mut transformer = ExternalTransformer::new(
            spec,
            dir.path().join("tmp_kernel.c"),
            dir.path().to_path_buf(),
        );
        let err = transformer.transform("x\n", "kernel_x").unwrap_err();
        assert!(matches!(err, TransformError::Tool(ToolFailure { exit_code: Some(1), .. })));
    }
}
