//! Error types for the xenosync core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.
//!
//! The taxonomy separates fatal errors from step failures: configuration
//! errors and tool-not-found errors are raised before any external process
//! runs and unwind to the orchestrator; a non-zero exit code from a pipeline
//! step is a plain value handled by the owning phase, never an error.

use std::path::PathBuf;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Vcs(#[from] VcsError),

    #[error(transparent)]
    Database(#[from] DbError),

    /// The requested backend is declared but not implemented.
    #[error("the '{0}' backend is not implemented")]
    NotImplemented(&'static str),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and connection resolution.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// None of the prioritized remote connection descriptors is configured.
    #[error("no remote connection descriptor is configured (checked 'sftp', 'scp', 'ftp')")]
    NoConnectionDescriptor,

    /// A named database connection key is requested but not configured.
    #[error("connection '{0}' is not configured")]
    ConnectionNotFound(String),

    /// A connection descriptor lacks a required field.
    #[error("connection descriptor is missing required field '{0}'")]
    MissingField(&'static str),

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Process errors
// ---------------------------------------------------------------------------

/// Errors from launching an external process.
///
/// A process that launches and exits non-zero is **not** an error; the exit
/// code is returned to the caller. These variants cover failure to launch.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The executable does not exist at the designated location.
    #[error("'{0}' cannot be found at the designated location")]
    ToolNotFound(PathBuf),

    /// Generic I/O wrapper.
    #[error("process I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Remote transfer errors
// ---------------------------------------------------------------------------

/// Errors from the remote transfer phase.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The transfer executable does not exist at the configured path.
    #[error("transfer tool cannot be found at '{0}'")]
    ToolNotFound(PathBuf),

    /// A directory pair failed to synchronize.
    #[error("synchronization of pair '{pair}' failed: {detail}")]
    SyncFailed { pair: String, detail: String },

    /// Underlying process failure.
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// Connection resolution failure.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Version control errors
// ---------------------------------------------------------------------------

/// Errors from the version control phase.
#[derive(Debug, Error)]
pub enum VcsError {
    /// The VCS executable does not exist at the configured path.
    #[error("git cannot be found at '{0}'")]
    ToolNotFound(PathBuf),

    /// The configured local path is not a valid repository.
    #[error("'{0}' is not a valid local repository")]
    InvalidRepository(String),

    /// Underlying process failure.
    #[error(transparent)]
    Process(#[from] ProcessError),
}

// ---------------------------------------------------------------------------
// Database diff errors
// ---------------------------------------------------------------------------

/// Errors from the database diff phase.
#[derive(Debug, Error)]
pub enum DbError {
    /// The query or diff executable does not exist at the configured path.
    #[error("{tool} cannot be found at '{path}'")]
    ToolNotFound { tool: &'static str, path: PathBuf },

    /// Underlying process failure.
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// Connection resolution failure.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Workspace file I/O failure (table list, script files).
    #[error("workspace I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl CoreError {
    /// Whether the error warrants printing remediation guidance (usage and
    /// configuration instructions) to the operator.
    pub fn is_remediable(&self) -> bool {
        match self {
            CoreError::Config(_) | CoreError::NotImplemented(_) => true,
            CoreError::Transfer(TransferError::ToolNotFound(_))
            | CoreError::Transfer(TransferError::Config(_)) => true,
            CoreError::Vcs(VcsError::ToolNotFound(_))
            | CoreError::Vcs(VcsError::InvalidRepository(_)) => true,
            CoreError::Database(DbError::ToolNotFound { .. })
            | CoreError::Database(DbError::Config(_)) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = ConfigError::ConnectionNotFound("SourceDatabase".into());
        assert_eq!(
            err.to_string(),
            "connection 'SourceDatabase' is not configured"
        );

        let err = VcsError::InvalidRepository("/srv/repo".into());
        assert_eq!(err.to_string(), "'/srv/repo' is not a valid local repository");

        let err = DbError::ToolNotFound {
            tool: "tablediff",
            path: PathBuf::from("/opt/mssql/tablediff"),
        };
        assert!(err.to_string().contains("tablediff"));
    }

    #[test]
    fn test_core_error_from_subsystem() {
        let cfg_err = ConfigError::NoConnectionDescriptor;
        let core_err: CoreError = cfg_err.into();
        assert!(matches!(core_err, CoreError::Config(_)));
        assert!(core_err.is_remediable());

        let sync_err: CoreError = TransferError::SyncFailed {
            pair: "www".into(),
            detail: "remote side closed".into(),
        }
        .into();
        assert!(!sync_err.is_remediable());
    }
}
