//! Remote transfer phase.
//!
//! Synchronizes configured directory pairs through an external transfer
//! tool. One session is opened and reused across pairs; only keys present
//! in both the local and the remote directory map participate, and a
//! non-success outcome for any pair aborts the phase with the tool's error.

use std::future::Future;
use std::path::PathBuf;

use tracing::{debug, info, instrument};

use crate::config::{RemoteConfig, SyncCriteria, SyncMode};
use crate::connection::RemoteConnection;
use crate::errors::TransferError;
use crate::events::{EventBus, LifecycleEvent, Phase, SideEffect};
use crate::process::ProcessRunner;

// ---------------------------------------------------------------------------
// Session abstraction
// ---------------------------------------------------------------------------

/// One directory pair to synchronize, with the configured options.
#[derive(Debug, Clone)]
pub struct PairRequest<'a> {
    pub local: &'a str,
    pub remote: &'a str,
    pub mode: SyncMode,
    pub remove_files: bool,
    pub mirror: bool,
    pub criteria: SyncCriteria,
}

/// Outcome of one file observed during a pair synchronization.
#[derive(Debug, Clone)]
pub struct Transfer {
    pub file_name: String,
    pub success: bool,
    pub error: Option<String>,
    /// Permission-adjustment outcome, when the tool reports one.
    pub chmod: Option<SideEffect>,
    /// Timestamp-adjustment outcome, when the tool reports one.
    pub touch: Option<SideEffect>,
}

/// Result of synchronizing one directory pair.
#[derive(Debug, Clone, Default)]
pub struct SyncOutcome {
    pub transfers: Vec<Transfer>,
    /// Raw console output of the underlying tool, for event forwarding.
    pub raw_output: String,
    /// `Some(detail)` when the tool reported failure.
    pub failure: Option<String>,
}

impl SyncOutcome {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// A transfer session reusable across directory pairs.
///
/// The phase verifies the session is still open before each pair and
/// reopens it when it is not.
pub trait TransferSession: Send {
    fn is_open(&self) -> bool;

    fn open(&mut self) -> impl Future<Output = Result<(), TransferError>> + Send;

    fn synchronize(
        &mut self,
        request: &PairRequest<'_>,
    ) -> impl Future<Output = Result<SyncOutcome, TransferError>> + Send;
}

// ---------------------------------------------------------------------------
// Scripted session over the transfer CLI
// ---------------------------------------------------------------------------

/// [`TransferSession`] that drives a WinSCP-style scripting CLI.
///
/// The CLI has no long-lived process; each `synchronize` call issues one
/// invocation whose command script opens the session URL, synchronizes a
/// single pair, and exits.
pub struct ScriptedSession<'r, R: ProcessRunner> {
    executable: PathBuf,
    connection: RemoteConnection,
    runner: &'r R,
    opened: bool,
}

impl<'r, R: ProcessRunner> ScriptedSession<'r, R> {
    pub fn new(executable: PathBuf, connection: RemoteConnection, runner: &'r R) -> Self {
        Self {
            executable,
            connection,
            runner,
            opened: false,
        }
    }

    fn synchronize_command(&self, request: &PairRequest<'_>) -> String {
        let mut cmd = format!("synchronize {}", request.mode.as_str());
        if request.remove_files {
            cmd.push_str(" -delete");
        }
        if request.mirror {
            cmd.push_str(" -mirror");
        }
        cmd.push_str(&format!(
            " -criteria={} \"{}\" \"{}\"",
            request.criteria.as_str(),
            request.local,
            request.remote
        ));
        cmd
    }
}

impl<R: ProcessRunner> TransferSession for ScriptedSession<'_, R> {
    fn is_open(&self) -> bool {
        self.opened
    }

    fn open(&mut self) -> impl Future<Output = Result<(), TransferError>> + Send {
        async move {
            debug!(host = %self.connection.host, "opening transfer session");
            self.opened = true;
            Ok(())
        }
    }

    fn synchronize(
        &mut self,
        request: &PairRequest<'_>,
    ) -> impl Future<Output = Result<SyncOutcome, TransferError>> + Send {
        async move {
            let args = vec![
                "/ini=nul".to_string(),
                "/command".to_string(),
                format!("open {}", self.connection.session_url()),
                self.synchronize_command(request),
                "exit".to_string(),
            ];

            let output = self.runner.launch(&self.executable, &args, None).await?;
            // The tool tears the connection down when it exits.
            self.opened = output.success();

            let transfers = parse_session_output(&output.stdout);
            let failure = if output.success() {
                None
            } else {
                let detail = if output.stderr.trim().is_empty() {
                    format!("transfer tool exited with code {}", output.exit_code)
                } else {
                    output.stderr.trim().to_string()
                };
                Some(detail)
            };

            Ok(SyncOutcome {
                transfers,
                raw_output: output.stdout,
                failure,
            })
        }
    }
}

/// Parse the transfer CLI's console listing into per-file outcomes.
///
/// Progress lines look like
/// `index.html               |        10 KB |  256.0 KB/s | binary | 100%`;
/// a file counts as transferred when its percentage column reached 100%.
/// Failure lines look like `Error transferring file 'index.html'. <detail>`.
pub fn parse_session_output(text: &str) -> Vec<Transfer> {
    let mut transfers = Vec::new();

    for line in text.lines() {
        let line = line.trim_end();
        if let Some(rest) = line.strip_prefix("Error transferring file '") {
            if let Some(pos) = rest.find('\'') {
                transfers.push(Transfer {
                    file_name: rest[..pos].to_string(),
                    success: false,
                    error: Some(line.trim().to_string()),
                    chmod: None,
                    touch: None,
                });
            }
            continue;
        }

        let columns: Vec<&str> = line.split('|').map(str::trim).collect();
        if columns.len() >= 2 && columns.last().is_some_and(|c| c.ends_with('%')) {
            let name = columns[0];
            if name.is_empty() {
                continue;
            }
            transfers.push(Transfer {
                file_name: name.to_string(),
                success: *columns.last().unwrap() == "100%",
                error: None,
                chmod: None,
                touch: None,
            });
        }
    }

    transfers
}

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// The remote transfer phase.
pub struct RemotePhase<'a, S: TransferSession> {
    config: &'a RemoteConfig,
    session: S,
    bus: &'a EventBus,
}

impl<'a, S: TransferSession> RemotePhase<'a, S> {
    pub fn new(config: &'a RemoteConfig, session: S, bus: &'a EventBus) -> Self {
        Self {
            config,
            session,
            bus,
        }
    }

    /// Synchronize every directory pair present in both maps, in remote-map
    /// order. Aborts on the first pair whose outcome is not a success.
    #[instrument(skip(self))]
    pub async fn run(mut self) -> Result<(), TransferError> {
        self.bus.emit(LifecycleEvent::PhaseStarted {
            phase: Phase::Remote,
        });

        if !self.config.executable.exists() {
            return Err(TransferError::ToolNotFound(self.config.executable.clone()));
        }

        for (key, remote_dir) in &self.config.remote_directories {
            let Some(local_dir) = self.config.local_directories.get(key) else {
                debug!(key = %key, "skipping pair absent from local map");
                continue;
            };

            if !self.session.is_open() {
                self.session.open().await?;
            }

            self.bus.emit(LifecycleEvent::PairStarted {
                local: local_dir.clone(),
                remote: remote_dir.clone(),
            });

            let request = PairRequest {
                local: local_dir,
                remote: remote_dir,
                mode: self.config.mode,
                remove_files: self.config.remove_files,
                mirror: self.config.mirror_mode,
                criteria: self.config.criteria,
            };
            let outcome = self.session.synchronize(&request).await?;

            if !outcome.raw_output.trim().is_empty() {
                self.bus.emit(LifecycleEvent::Output {
                    text: outcome.raw_output.clone(),
                });
            }
            for transfer in &outcome.transfers {
                self.bus.emit(LifecycleEvent::FileTransferred {
                    name: transfer.file_name.clone(),
                    success: transfer.success,
                    error: transfer.error.clone(),
                    chmod: transfer.chmod.clone(),
                    touch: transfer.touch.clone(),
                });
            }

            if let Some(detail) = outcome.failure {
                return Err(TransferError::SyncFailed {
                    pair: key.clone(),
                    detail,
                });
            }

            self.bus.emit(LifecycleEvent::PairCompleted);
            info!(key = %key, "directory pair synchronized");
        }

        self.bus.emit(LifecycleEvent::PhaseCompleted {
            phase: Phase::Remote,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_progress_lines() {
        let output = "\
Searching for host...
Connected
index.html                |        10 KB |  256.0 KB/s | binary | 100%
style.css                 |         2 KB |  128.0 KB/s | binary |  42%
Error transferring file 'missing.txt'. Permission denied.
";
        let transfers = parse_session_output(output);
        assert_eq!(transfers.len(), 3);

        assert_eq!(transfers[0].file_name, "index.html");
        assert!(transfers[0].success);

        assert_eq!(transfers[1].file_name, "style.css");
        assert!(!transfers[1].success);

        assert_eq!(transfers[2].file_name, "missing.txt");
        assert!(!transfers[2].success);
        assert!(transfers[2].error.as_deref().unwrap().contains("Permission denied"));
    }

    #[test]
    fn test_parse_ignores_noise() {
        let output = "banner\nno pipes here\n|  |\n";
        assert!(parse_session_output(output).is_empty());
    }

    #[test]
    fn test_synchronize_command_flags() {
        let runner = crate::process::CommandRunner;
        let connection =
            RemoteConnection::from_descriptor("hostname=files.example.com").unwrap();
        let session =
            ScriptedSession::new(PathBuf::from("/usr/bin/winscp"), connection, &runner);

        let request = PairRequest {
            local: "/srv/www",
            remote: "/var/www",
            mode: SyncMode::Both,
            remove_files: true,
            mirror: true,
            criteria: SyncCriteria::Checksum,
        };
        assert_eq!(
            session.synchronize_command(&request),
            "synchronize both -delete -mirror -criteria=checksum \"/srv/www\" \"/var/www\""
        );

        let plain = PairRequest {
            remove_files: false,
            mirror: false,
            criteria: SyncCriteria::Time,
            ..request
        };
        assert_eq!(
            session.synchronize_command(&plain),
            "synchronize both -criteria=time \"/srv/www\" \"/var/www\""
        );
    }
}
