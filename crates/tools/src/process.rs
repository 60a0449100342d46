//! Blocking external process invocation with captured output.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// A failed external invocation: non-zero exit, signal, or launch failure.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{program} failed ({}): {diagnostic}", describe_exit(.exit_code))]
pub struct ToolFailure {
    pub program: String,
    /// `None` when the process could not be launched or was killed by a signal.
    pub exit_code: Option<i32>,
    pub diagnostic: String,
}

fn describe_exit(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code".to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub program: String,
    pub exit_code: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl ToolOutput {
    /// `Ok(output)` on exit status 0, otherwise the captured stderr as a failure.
    pub fn into_result(self) -> Result<ToolOutput, ToolFailure> {
        if self.success {
            Ok(self)
        } else {
            Err(ToolFailure {
                program: self.program,
                exit_code: self.exit_code,
                diagnostic: self.stderr,
            })
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: PathBuf,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.display().to_string())
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Program path as it will be launched. Relative paths with a directory
    /// component are taken relative to the working directory.
    pub fn resolved_program(&self) -> PathBuf {
        match &self.current_dir {
            Some(dir) if self.program.is_relative() && self.program.components().count() > 1 => {
                dir.join(&self.program)
            }
            _ => self.program.clone(),
        }
    }

    /// Run to completion, capturing stdout and stderr. Never times out.
    pub fn run(&self) -> Result<ToolOutput, ToolFailure> {
        let program = self.resolved_program();
        let mut command = Command::new(&program);
        command.args(&self.args);
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }

        debug!(command = %self, "running external tool");
        let start = Instant::now();
        let output = command.output().map_err(|err| ToolFailure {
            program: self.program.display().to_string(),
            exit_code: None,
            diagnostic: format!("failed to launch {}: {err}", program.display()),
        })?;
        let elapsed = start.elapsed();

        Ok(ToolOutput {
            program: self.program.display().to_string(),
            exit_code: output.status.code(),
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            elapsed,
        })
    }

    /// Run and require exit status 0.
    pub fn run_checked(&self) -> Result<ToolOutput, ToolFailure> {
        self.run()?.into_result()
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}
