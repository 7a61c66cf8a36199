//! Version control phase.
//!
//! Runs a fixed pull, add, commit, push pipeline over a single local git
//! repository via the external `git` binary. Each step reports its exit
//! code through lifecycle events; a non-zero exit from pull, add, or
//! commit short-circuits the remaining steps, and the phase result is the
//! exit code of the last step that ran. A step failure is a value, not an
//! error; only missing tooling or an invalid repository raises [`VcsError`].

use std::path::{Path, PathBuf};

use tracing::{info, instrument};

use crate::config::GitConfig;
use crate::errors::VcsError;
use crate::events::{EventBus, LifecycleEvent, Phase};
use crate::process::ProcessRunner;

/// Resolve the working tree and metadata directory for a configured
/// repository path. A trailing `.git` component is tolerated, so both
/// `/srv/repo` and `/srv/repo/.git` name the same repository.
fn repository_paths(repository: &Path) -> Result<(PathBuf, PathBuf), VcsError> {
    let work_tree = if repository.file_name().is_some_and(|n| n == ".git") {
        repository
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| VcsError::InvalidRepository(repository.display().to_string()))?
    } else {
        repository.to_path_buf()
    };

    let git_dir = work_tree.join(".git");
    if !git_dir.is_dir() {
        return Err(VcsError::InvalidRepository(repository.display().to_string()));
    }
    Ok((work_tree, git_dir))
}

/// The version control phase.
pub struct GitPhase<'a, R: ProcessRunner> {
    config: &'a GitConfig,
    runner: &'a R,
    bus: &'a EventBus,
}

impl<'a, R: ProcessRunner> GitPhase<'a, R> {
    pub fn new(config: &'a GitConfig, runner: &'a R, bus: &'a EventBus) -> Self {
        Self {
            config,
            runner,
            bus,
        }
    }

    /// Run the pull, add, commit, push pipeline.
    ///
    /// Returns the exit code of the last step that ran: 0 when the whole
    /// pipeline succeeded, the failing step's code otherwise.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<i32, VcsError> {
        self.bus.emit(LifecycleEvent::PhaseStarted { phase: Phase::Git });

        if !self.config.executable.exists() {
            return Err(VcsError::ToolNotFound(self.config.executable.clone()));
        }
        let (work_tree, git_dir) = repository_paths(&self.config.repository)?;

        let steps: [(&str, Vec<String>); 4] = [
            (
                "Pull",
                vec![
                    "pull".into(),
                    "origin".into(),
                    self.config.branch.clone(),
                ],
            ),
            ("Add", vec!["add".into(), self.config.add_pattern.clone()]),
            (
                "Commit",
                vec![
                    "commit".into(),
                    "-m".into(),
                    self.config.commit_message.clone(),
                ],
            ),
            (
                "Push",
                vec![
                    "push".into(),
                    "origin".into(),
                    // Explicit refspec: a bare `HEAD` would let the remote
                    // pick the destination ref.
                    format!("{0}:{0}", self.config.branch),
                ],
            ),
        ];

        let mut exit_code = 0;
        for (name, step_args) in steps {
            exit_code = self
                .run_step(name, step_args, &work_tree, &git_dir)
                .await?;
            if exit_code != 0 {
                break;
            }
        }

        self.bus.emit(LifecycleEvent::PhaseCompleted { phase: Phase::Git });
        if exit_code == 0 {
            info!(repository = %work_tree.display(), "git pipeline completed");
        }
        Ok(exit_code)
    }

    async fn run_step(
        &self,
        name: &str,
        step_args: Vec<String>,
        work_tree: &Path,
        git_dir: &Path,
    ) -> Result<i32, VcsError> {
        let mut args = vec![
            format!("--git-dir={}", git_dir.display()),
            format!("--work-tree={}", work_tree.display()),
        ];
        args.extend(step_args);

        self.bus.emit(LifecycleEvent::ProcessStarted { name: name.into() });

        let output = self
            .runner
            .launch(&self.config.executable, &args, Some(work_tree))
            .await?;

        if !output.stdout.trim().is_empty() {
            self.bus.emit(LifecycleEvent::Output {
                text: output.stdout.clone(),
            });
        }
        if !output.stderr.trim().is_empty() {
            self.bus.emit(LifecycleEvent::Output {
                text: output.stderr.clone(),
            });
        }
        self.bus.emit(LifecycleEvent::ProcessCompleted {
            name: name.into(),
            exit_code: output.exit_code,
        });

        Ok(output.exit_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProcessError;
    use crate::process::ProcessOutput;
    use std::future::Future;
    use std::sync::Mutex;

    /// Scripted runner: pops one canned output per launch and records the
    /// argument lists it saw.
    struct ScriptedRunner {
        outputs: Mutex<Vec<ProcessOutput>>,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl ScriptedRunner {
        fn new(exit_codes: &[i32]) -> Self {
            let outputs = exit_codes
                .iter()
                .rev()
                .map(|&code| ProcessOutput {
                    exit_code: code,
                    stdout: String::new(),
                    stderr: String::new(),
                })
                .collect();
            Self {
                outputs: Mutex::new(outputs),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl ProcessRunner for ScriptedRunner {
        fn launch(
            &self,
            _program: &Path,
            args: &[String],
            _cwd: Option<&Path>,
        ) -> impl Future<Output = Result<ProcessOutput, ProcessError>> + Send {
            self.calls.lock().unwrap().push(args.to_vec());
            let output = self.outputs.lock().unwrap().pop();
            async move {
                Ok(output.unwrap_or(ProcessOutput {
                    exit_code: 0,
                    stdout: String::new(),
                    stderr: String::new(),
                }))
            }
        }
    }

    fn repo_fixture() -> (tempfile::TempDir, GitConfig) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        let config = GitConfig {
            executable: PathBuf::from("/bin/sh"),
            repository: dir.path().to_path_buf(),
            branch: "main".into(),
            ..GitConfig::default()
        };
        (dir, config)
    }

    #[tokio::test]
    async fn test_all_steps_run_in_order() {
        let (_dir, config) = repo_fixture();
        let runner = ScriptedRunner::new(&[0, 0, 0, 0]);
        let bus = EventBus::new();

        let code = GitPhase::new(&config, &runner, &bus).run().await.unwrap();
        assert_eq!(code, 0);

        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[0][2], "pull");
        assert_eq!(calls[1][2], "add");
        assert_eq!(calls[2][2], "commit");
        assert_eq!(calls[3][2], "push");
        assert_eq!(calls[3][4], "main:main");
        assert!(calls[0][0].starts_with("--git-dir="));
        assert!(calls[0][1].starts_with("--work-tree="));
    }

    #[tokio::test]
    async fn test_pull_failure_short_circuits() {
        let (_dir, config) = repo_fixture();
        let runner = ScriptedRunner::new(&[1]);
        let bus = EventBus::new();

        let code = GitPhase::new(&config, &runner, &bus).run().await.unwrap();
        assert_eq!(code, 1);
        assert_eq!(runner.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_push_exit_code_is_phase_result() {
        let (_dir, config) = repo_fixture();
        let runner = ScriptedRunner::new(&[0, 0, 0, 128]);
        let bus = EventBus::new();

        let code = GitPhase::new(&config, &runner, &bus).run().await.unwrap();
        assert_eq!(code, 128);
        assert_eq!(runner.calls.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_invalid_repository() {
        let dir = tempfile::tempdir().unwrap();
        let config = GitConfig {
            executable: PathBuf::from("/bin/sh"),
            repository: dir.path().to_path_buf(),
            ..GitConfig::default()
        };
        let runner = ScriptedRunner::new(&[]);
        let bus = EventBus::new();

        let result = GitPhase::new(&config, &runner, &bus).run().await;
        assert!(matches!(result, Err(VcsError::InvalidRepository(_))));
    }

    #[tokio::test]
    async fn test_trailing_git_component_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        let (work_tree, git_dir) = repository_paths(&dir.path().join(".git")).unwrap();
        assert_eq!(work_tree, dir.path());
        assert_eq!(git_dir, dir.path().join(".git"));
    }

    #[tokio::test]
    async fn test_missing_executable() {
        let (_dir, mut config) = repo_fixture();
        config.executable = PathBuf::from("/nonexistent/git");
        let runner = ScriptedRunner::new(&[]);
        let bus = EventBus::new();

        let result = GitPhase::new(&config, &runner, &bus).run().await;
        assert!(matches!(result, Err(VcsError::ToolNotFound(_))));
    }
}
