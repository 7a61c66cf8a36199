//! External process execution.
//!
//! Every pipeline step is one external invocation. The [`ProcessRunner`]
//! trait is the seam between phase logic and the operating system: phases
//! build argument lists and interpret exit codes, the runner launches the
//! program, blocks until it exits, and hands back the captured output.

use std::future::Future;
use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::errors::ProcessError;

/// Reserved exit code meaning "step skipped: no work", e.g. an empty table
/// list or an empty script workspace.
pub const NO_WORK_EXIT_CODE: i32 = 404;

/// Result of one completed external process.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// 0 on success; tool-specific non-zero on failure.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Launches an external executable and blocks until it exits.
pub trait ProcessRunner: Send + Sync {
    /// Run `program` with `args`, optionally in `cwd`, and capture its
    /// output. Failure to *launch* is an error; a non-zero exit is not.
    fn launch(
        &self,
        program: &Path,
        args: &[String],
        cwd: Option<&Path>,
    ) -> impl Future<Output = Result<ProcessOutput, ProcessError>> + Send;
}

/// [`ProcessRunner`] backed by `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandRunner;

impl ProcessRunner for CommandRunner {
    fn launch(
        &self,
        program: &Path,
        args: &[String],
        cwd: Option<&Path>,
    ) -> impl Future<Output = Result<ProcessOutput, ProcessError>> + Send {
        async move {
            let mut cmd = Command::new(program);
            cmd.args(args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());
            if let Some(dir) = cwd {
                cmd.current_dir(dir);
            }

            debug!(program = %program.display(), ?args, "launching external process");
            let output = cmd.output().await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ProcessError::ToolNotFound(program.to_path_buf())
                } else {
                    ProcessError::IoError(e)
                }
            })?;

            let exit_code = output.status.code().unwrap_or(-1);
            if exit_code != 0 {
                warn!(program = %program.display(), exit_code, "external process failed");
            }

            Ok(ProcessOutput {
                exit_code,
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_launch_captures_stdout_and_exit_code() {
        let runner = CommandRunner;
        let output = runner
            .launch(Path::new("echo"), &["hello".to_string()], None)
            .await
            .unwrap();
        assert_eq!(output.exit_code, 0);
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_launch_missing_tool() {
        let runner = CommandRunner;
        let result = runner
            .launch(Path::new("/nonexistent/xenosync-no-such-tool"), &[], None)
            .await;
        assert!(matches!(
            result,
            Err(ProcessError::ToolNotFound(path)) if path == PathBuf::from("/nonexistent/xenosync-no-such-tool")
        ));
    }
}
