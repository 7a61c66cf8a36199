//! Synchronization orchestrator.
//!
//! Dispatches one synchronization run across the backend phases in fixed
//! order: the remote transfer phase always precedes a version control
//! phase, and the database phase runs alone. Configuration and
//! tool-not-found errors unwind the run; a step's non-zero exit code is
//! the run's result value and the run still completes.

use chrono::Utc;

use crate::config::AppConfig;
use crate::connection::{DatabaseConnection, RemoteConnection};
use crate::dbdiff::DatabasePhase;
use crate::errors::CoreError;
use crate::events::{EventBus, LifecycleEvent};
use crate::process::ProcessRunner;
use crate::transfer::{RemotePhase, ScriptedSession};
use crate::vcs::GitPhase;

/// Which backends one synchronization run drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    /// Remote transfer only.
    RemoteOnly,
    /// Remote transfer, then the git pipeline.
    RemoteThenGit,
    /// Remote transfer, then a Mercurial pipeline. Declared but not
    /// implemented; selecting it fails after the remote phase.
    RemoteThenMercurial,
    /// Database diff only.
    DatabaseOnly,
}

/// Drives one synchronization run.
pub struct Synchronizer<'a, R: ProcessRunner> {
    config: &'a AppConfig,
    runner: &'a R,
    bus: &'a EventBus,
}

impl<'a, R: ProcessRunner> Synchronizer<'a, R> {
    pub fn new(config: &'a AppConfig, runner: &'a R, bus: &'a EventBus) -> Self {
        Self {
            config,
            runner,
            bus,
        }
    }

    /// Run the phases selected by `action`.
    ///
    /// Returns the run's exit code: 0 on full success, a step's exit code
    /// when a pipeline step failed, [`crate::process::NO_WORK_EXIT_CODE`]
    /// when the database phase had nothing to do. `SyncCompleted` is
    /// emitted only when no error propagated; an unwinding error leaves
    /// the run without a completion event.
    pub async fn run(&self, action: SyncAction) -> Result<i32, CoreError> {
        self.bus.emit(LifecycleEvent::SyncStarted { at: Utc::now() });

        let exit_code = match action {
            SyncAction::RemoteOnly => {
                self.run_remote().await?;
                0
            }
            SyncAction::RemoteThenGit => {
                self.run_remote().await?;
                self.run_git().await?
            }
            SyncAction::RemoteThenMercurial => {
                self.run_remote().await?;
                return Err(CoreError::NotImplemented("mercurial"));
            }
            SyncAction::DatabaseOnly => self.run_database().await?,
        };

        self.bus.emit(LifecycleEvent::SyncCompleted { at: Utc::now() });
        Ok(exit_code)
    }

    async fn run_remote(&self) -> Result<(), CoreError> {
        let connection = RemoteConnection::resolve(&self.config.connections)
            .map_err(crate::errors::TransferError::from)?;
        let session = ScriptedSession::new(
            self.config.remote.executable.clone(),
            connection,
            self.runner,
        );
        RemotePhase::new(&self.config.remote, session, self.bus)
            .run()
            .await?;
        Ok(())
    }

    async fn run_git(&self) -> Result<i32, CoreError> {
        let code = GitPhase::new(&self.config.git, self.runner, self.bus)
            .run()
            .await?;
        Ok(code)
    }

    async fn run_database(&self) -> Result<i32, CoreError> {
        let source = DatabaseConnection::resolve(
            &self.config.connections,
            &self.config.database.source_connection,
        )
        .map_err(crate::errors::DbError::from)?;
        let destination = DatabaseConnection::resolve(
            &self.config.connections,
            &self.config.database.destination_connection,
        )
        .map_err(crate::errors::DbError::from)?;

        let code = DatabasePhase::new(
            &self.config.database,
            source,
            destination,
            self.runner,
            self.bus,
        )
        .run()
        .await?;
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProcessError;
    use crate::process::ProcessOutput;
    use std::future::Future;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    struct OkRunner;

    impl ProcessRunner for OkRunner {
        fn launch(
            &self,
            _program: &Path,
            _args: &[String],
            _cwd: Option<&Path>,
        ) -> impl Future<Output = Result<ProcessOutput, ProcessError>> + Send {
            async {
                Ok(ProcessOutput {
                    exit_code: 0,
                    stdout: String::new(),
                    stderr: String::new(),
                })
            }
        }
    }

    fn config_with_sftp() -> AppConfig {
        let mut config = AppConfig::default();
        config
            .connections
            .insert("sftp".into(), "hostname=files.example.com".into());
        config
    }

    #[tokio::test]
    async fn test_mercurial_is_not_implemented() {
        let mut config = config_with_sftp();
        // An existing executable with no configured pairs makes the remote
        // phase a no-op, exposing the Mercurial dispatch alone.
        config.remote.executable = "/bin/sh".into();
        let bus = EventBus::new();
        let runner = OkRunner;

        let result = Synchronizer::new(&config, &runner, &bus)
            .run(SyncAction::RemoteThenMercurial)
            .await;
        assert!(matches!(result, Err(CoreError::NotImplemented("mercurial"))));
    }

    #[tokio::test]
    async fn test_no_connection_descriptor_unwinds() {
        let config = AppConfig::default();
        let bus = EventBus::new();
        let runner = OkRunner;

        let result = Synchronizer::new(&config, &runner, &bus)
            .run(SyncAction::RemoteOnly)
            .await;
        assert!(matches!(result, Err(CoreError::Transfer(_))));
    }

    #[tokio::test]
    async fn test_completion_event_only_on_success() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();
        let sink = seen.clone();
        bus.subscribe(move |event| {
            let tag = match event {
                LifecycleEvent::SyncStarted { .. } => "started",
                LifecycleEvent::SyncCompleted { .. } => "completed",
                _ => return,
            };
            sink.lock().unwrap().push(tag);
        });

        let config = AppConfig::default();
        let runner = OkRunner;
        let result = Synchronizer::new(&config, &runner, &bus)
            .run(SyncAction::RemoteOnly)
            .await;
        assert!(result.is_err());
        // The error unwound before completion: started, never completed.
        assert_eq!(*seen.lock().unwrap(), vec!["started"]);
    }

    #[tokio::test]
    async fn test_remote_only_with_no_pairs_succeeds() {
        let mut config = config_with_sftp();
        config.remote.executable = "/bin/sh".into();
        let bus = EventBus::new();
        let runner = OkRunner;

        let code = Synchronizer::new(&config, &runner, &bus)
            .run(SyncAction::RemoteOnly)
            .await
            .unwrap();
        assert_eq!(code, 0);
    }
}
