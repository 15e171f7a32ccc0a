//! External compiler invocation.
//!
//! Style compilation and script bundling shell out to whatever tool the
//! project configures. A [`ToolCommand`] is a program plus an argument
//! template; `{input}` and `{output}` placeholders are substituted per call.

use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("'{0}' not found (is it installed and on PATH?)")]
    NotFound(String),
    #[error("failed to launch '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("'{program}' exited with {status}\n{stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },
}

/// A configured external program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    program: String,
    args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Find the program, relative to `cwd` if it contains a separator,
    /// otherwise on `PATH`.
    pub fn locate(&self, cwd: &Path) -> Result<PathBuf, ToolError> {
        which::which_in(&self.program, std::env::var_os("PATH"), cwd)
            .map_err(|_| ToolError::NotFound(self.program.clone()))
    }

    /// Substitute `{input}` and `{output}` into the argument template.
    pub fn expand_args(&self, input: &Path, output: &Path) -> Vec<String> {
        let input = input.to_string_lossy();
        let output = output.to_string_lossy();
        self.args
            .iter()
            .map(|arg| arg.replace("{input}", &input).replace("{output}", &output))
            .collect()
    }

    /// Run the tool in `cwd`. Non-zero exit is an error carrying stderr;
    /// stderr from a successful run is logged as warnings.
    pub fn run(&self, cwd: &Path, input: &Path, output: &Path) -> Result<(), ToolError> {
        let program = self.locate(cwd)?;
        let args = self.expand_args(input, output);
        tracing::debug!(program = %program.display(), ?args, "running tool");

        let result = Command::new(&program)
            .args(&args)
            .current_dir(cwd)
            .output()
            .map_err(|source| ToolError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let stderr = String::from_utf8_lossy(&result.stderr).trim().to_string();
        if !result.status.success() {
            return Err(ToolError::Failed {
                program: self.program.clone(),
                status: result.status.to_string(),
                stderr,
            });
        }
        for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
            tracing::warn!(tool = %self.program, "{line}");
        }
        Ok(())
    }
}
