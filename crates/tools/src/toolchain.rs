//! Setup-free external collaborators: macro stripping, compilation, timed runs.

use crate::process::{Invocation, ToolFailure, ToolOutput};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

pub const PREPROCESSED_SUFFIX: &str = "preproc.c";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessorSpec {
    pub program: PathBuf,
    /// Arguments placed before the kernel source path.
    pub leading_args: Vec<String>,
    /// Include-path and macro-definition flags placed after the kernel path.
    pub trailing_args: Vec<String>,
}

impl Default for PreprocessorSpec {
    fn default() -> Self {
        Self {
            program: PathBuf::from("perl"),
            leading_args: vec!["utilities/create_cpped_version.pl".to_string()],
            trailing_args: vec![
                "-I".to_string(),
                "utilities".to_string(),
                "-DPOLYBENCH_USE_C99_PROTO".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerSpec {
    pub program: PathBuf,
    pub include_dirs: Vec<PathBuf>,
    pub extra_sources: Vec<PathBuf>,
    pub flags: Vec<String>,
}

impl Default for CompilerSpec {
    fn default() -> Self {
        Self {
            program: PathBuf::from("gcc"),
            include_dirs: vec![PathBuf::from("utilities")],
            extra_sources: vec![PathBuf::from("utilities/polybench.c")],
            flags: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CompileRequest<'a> {
    pub source: &'a Path,
    pub output: &'a Path,
    /// Directory holding the kernel's own headers.
    pub kernel_dir: &'a Path,
}

#[derive(Debug, Clone)]
pub struct Execution {
    pub elapsed: Duration,
    pub stdout: String,
    pub stderr: String,
}

impl From<ToolOutput> for Execution {
    fn from(output: ToolOutput) -> Self {
        Self {
            elapsed: output.elapsed,
            stdout: output.stdout,
            stderr: output.stderr,
        }
    }
}

/// Sibling `<kernel>.preproc.c` path the macro stripper writes for `source`.
pub fn preprocessed_path(source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    source.with_file_name(format!("{stem}.{PREPROCESSED_SUFFIX}"))
}

/// External collaborators the batch driver shells out to.
pub trait Toolchain {
    /// Strip benchmark macros from `source`, returning the written listing path.
    fn strip_macros(&mut self, source: &Path) -> Result<PathBuf, ToolFailure>;

    fn compile(&mut self, request: CompileRequest<'_>) -> Result<(), ToolFailure>;

    /// Run `executable` once and measure its wall-clock time.
    fn execute(&mut self, executable: &Path) -> Result<Execution, ToolFailure>;
}

/// Toolchain backed by real processes run from the sources root.
///
/// Paths handed to it are relative to `working_dir` unless absolute.
pub struct ShellToolchain {
    working_dir: PathBuf,
    preprocessor: PreprocessorSpec,
    compiler: CompilerSpec,
}

impl ShellToolchain {
    pub fn new(working_dir: PathBuf, preprocessor: PreprocessorSpec, compiler: CompilerSpec) -> Self {
        Self {
            working_dir,
            preprocessor,
            compiler,
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn preprocess_invocation(&self, source: &Path) -> Invocation {
        Invocation::new(&self.preprocessor.program)
            .args(self.preprocessor.leading_args.iter().cloned())
            .path_arg(source)
            .args(self.preprocessor.trailing_args.iter().cloned())
            .current_dir(&self.working_dir)
    }

    pub fn compile_invocation(&self, request: CompileRequest<'_>) -> Invocation {
        let mut invocation = Invocation::new(&self.compiler.program);
        for dir in &self.compiler.include_dirs {
            invocation = invocation.arg("-I").path_arg(dir);
        }
        invocation = invocation
            .arg("-I")
            .path_arg(request.kernel_dir)
            .args(self.compiler.flags.iter().cloned());
        for source in &self.compiler.extra_sources {
            invocation = invocation.path_arg(source);
        }
        invocation
            .path_arg(request.source)
            .arg("-o")
            .path_arg(request.output)
            .current_dir(&self.working_dir)
    }
}

impl Toolchain for ShellToolchain {
    fn strip_macros(&mut self, source: &Path) -> Result<PathBuf, ToolFailure> {
        self.preprocess_invocation(source).run_checked()?;
        Ok(preprocessed_path(source))
    }

    fn compile(&mut self, request: CompileRequest<'_>) -> Result<(), ToolFailure> {
        self.compile_invocation(request).run_checked()?;
        Ok(())
    }

    fn execute(&mut self, executable: &Path) -> Result<Execution, ToolFailure> {
        let program = if executable.is_absolute() {
            executable.to_path_buf()
        } else {
            self.working_dir.join(executable)
        };
        let output = Invocation::new(program)
            .current_dir(&self.working_dir)
            .run_checked()?;
        info!(
            executable = %executable.display(),
            elapsed_ms = output.elapsed.as_secs_f64() * 1000.0,
            "executable finished"
        );
        Ok(output.into())
    }
}
