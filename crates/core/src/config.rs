//! TOML-based configuration for xenosync.
//!
//! The configuration is loaded once, validated eagerly, and passed by
//! reference into the orchestrator and phases; nothing reads configuration
//! lazily at run time. Connection credentials live in the `[connections]`
//! table as raw descriptor strings and are resolved through
//! [`crate::connection`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ConfigError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,

    /// Remote transfer phase settings.
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Version control phase settings.
    #[serde(default)]
    pub git: GitConfig,

    /// Database diff phase settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Named raw connection descriptors (`sftp`, `scp`, `ftp` for the
    /// remote transfer phase; arbitrary names for database connections).
    #[serde(default)]
    pub connections: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for the dated append-only run log.
    #[serde(default = "default_log_dir")]
    pub directory: PathBuf,
}

fn default_log_level() -> String {
    "info".into()
}
fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: default_log_dir(),
        }
    }
}

// ---------------------------------------------------------------------------
// Remote transfer
// ---------------------------------------------------------------------------

/// Direction of a directory-pair synchronization.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Remote changes are copied to the local directory only.
    Download,
    /// Local changes are copied to the remote directory only.
    Upload,
    /// Changes are copied in both directions.
    #[default]
    Both,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Download => "local",
            Self::Upload => "remote",
            Self::Both => "both",
        }
    }
}

/// Comparison criterion deciding whether a file needs transferring.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncCriteria {
    #[default]
    Time,
    Size,
    Checksum,
}

impl SyncCriteria {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Time => "time",
            Self::Size => "size",
            Self::Checksum => "checksum",
        }
    }
}

/// Remote transfer phase configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Path to the transfer tool executable.
    #[serde(default = "default_transfer_executable")]
    pub executable: PathBuf,

    /// Synchronization direction.
    #[serde(default)]
    pub mode: SyncMode,

    /// Remove files on the target that no longer exist on the source.
    #[serde(default)]
    pub remove_files: bool,

    /// Also overwrite newer target files (mirror).
    #[serde(default)]
    pub mirror_mode: bool,

    /// Comparison criterion.
    #[serde(default)]
    pub criteria: SyncCriteria,

    /// Local directories keyed by pair name.
    #[serde(default)]
    pub local_directories: BTreeMap<String, String>,

    /// Remote directories keyed by pair name. Only keys present in *both*
    /// maps participate in synchronization.
    #[serde(default)]
    pub remote_directories: BTreeMap<String, String>,
}

fn default_transfer_executable() -> PathBuf {
    PathBuf::from("/usr/bin/winscp")
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            executable: default_transfer_executable(),
            mode: SyncMode::default(),
            remove_files: false,
            mirror_mode: false,
            criteria: SyncCriteria::default(),
            local_directories: BTreeMap::new(),
            remote_directories: BTreeMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Version control
// ---------------------------------------------------------------------------

/// Version control phase configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitConfig {
    /// Path to the git executable.
    #[serde(default = "default_git_executable")]
    pub executable: PathBuf,

    /// Local repository working tree path.
    #[serde(default)]
    pub repository: PathBuf,

    /// Branch to pull from and push to. Default `HEAD`.
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Pathspec passed to `git add`. Default `.`, i.e. everything.
    #[serde(default = "default_add_pattern")]
    pub add_pattern: String,

    /// Automated commit message.
    #[serde(default = "default_commit_message")]
    pub commit_message: String,
}

fn default_git_executable() -> PathBuf {
    PathBuf::from("/usr/bin/git")
}
fn default_branch() -> String {
    "HEAD".into()
}
fn default_add_pattern() -> String {
    ".".into()
}
fn default_commit_message() -> String {
    "Committed by xenosync".into()
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            executable: default_git_executable(),
            repository: PathBuf::new(),
            branch: default_branch(),
            add_pattern: default_add_pattern(),
            commit_message: default_commit_message(),
        }
    }
}

// ---------------------------------------------------------------------------
// Database diff
// ---------------------------------------------------------------------------

/// Database diff phase configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the query tool executable (sqlcmd-style).
    #[serde(default = "default_query_tool")]
    pub query_tool: PathBuf,

    /// Path to the table diff executable (tablediff-style).
    #[serde(default = "default_diff_tool")]
    pub diff_tool: PathBuf,

    /// Name of the source connection in `[connections]`.
    #[serde(default = "default_source_connection")]
    pub source_connection: String,

    /// Name of the destination connection in `[connections]`.
    #[serde(default = "default_destination_connection")]
    pub destination_connection: String,

    /// Schema holding the tables to diff on the source side.
    #[serde(default = "default_schema")]
    pub source_schema: String,

    /// Schema on the destination side.
    #[serde(default = "default_schema")]
    pub destination_schema: String,

    /// Workspace directory for generated diff scripts. Exclusively owned by
    /// the database diff phase; cleared at phase start.
    #[serde(default = "default_script_storage")]
    pub script_storage: PathBuf,
}

fn default_query_tool() -> PathBuf {
    PathBuf::from("/opt/mssql-tools/bin/sqlcmd")
}
fn default_diff_tool() -> PathBuf {
    PathBuf::from("/opt/mssql-tools/bin/tablediff")
}
fn default_source_connection() -> String {
    "SourceDatabase".into()
}
fn default_destination_connection() -> String {
    "DestinationDatabase".into()
}
fn default_schema() -> String {
    "dbo".into()
}
fn default_script_storage() -> PathBuf {
    PathBuf::from("./tablediffs")
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            query_tool: default_query_tool(),
            diff_tool: default_diff_tool(),
            source_connection: default_source_connection(),
            destination_connection: default_destination_connection(),
            source_schema: default_schema(),
            destination_schema: default_schema(),
            script_storage: default_script_storage(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & validation
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file at the given path.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Validate that all fields are sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
        if !LEVELS.contains(&self.log.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "log.level".into(),
                detail: format!("'{}' is not a tracing level", self.log.level),
            });
        }
        if self.git.branch.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "git.branch".into(),
                detail: "branch must not be empty".into(),
            });
        }
        if self.git.add_pattern.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "git.add_pattern".into(),
                detail: "add pattern must not be empty".into(),
            });
        }
        if self.database.script_storage.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "database.script_storage".into(),
                detail: "script storage path must not be empty".into(),
            });
        }
        Ok(())
    }

    /// Convenience: load and validate in one call.
    pub fn load_and_validate<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load_from_file(path)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_toml() -> &'static str {
        r#"
[log]
level = "debug"
directory = "/var/log/xenosync"

[remote]
executable = "/usr/local/bin/winscp"
mode = "both"
remove_files = false
mirror_mode = true
criteria = "size"

[remote.local_directories]
www = "/srv/www"
assets = "/srv/assets"

[remote.remote_directories]
www = "/var/www"
assets = "/var/assets"

[git]
executable = "/usr/bin/git"
repository = "/srv/repo"
branch = "main"
add_pattern = "."
commit_message = "Automated sync commit"

[database]
query_tool = "/opt/mssql-tools/bin/sqlcmd"
diff_tool = "/opt/mssql-tools/bin/tablediff"
source_connection = "SourceDatabase"
destination_connection = "DestinationDatabase"
source_schema = "dbo"
destination_schema = "dbo"
script_storage = "/var/lib/xenosync/tablediffs"

[connections]
sftp = "hostname=files.example.com;username=deploy;password=secret"
SourceDatabase = "server=src.example.com;database=orders;uid=app;pwd=pw"
DestinationDatabase = "server=dst.example.com;database=orders;uid=app;pwd=pw"
"#
    }

    #[test]
    fn test_parse_full_config() {
        let config: AppConfig = toml::from_str(sample_toml()).expect("failed to parse toml");
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.remote.criteria, SyncCriteria::Size);
        assert!(config.remote.mirror_mode);
        assert_eq!(config.remote.local_directories.len(), 2);
        assert_eq!(config.git.branch, "main");
        assert_eq!(config.database.source_schema, "dbo");
        assert_eq!(config.connections.len(), 3);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xenosync.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(sample_toml().as_bytes()).unwrap();

        let config = AppConfig::load_and_validate(&path).expect("load failed");
        assert_eq!(config.git.commit_message, "Automated sync commit");
    }

    #[test]
    fn test_file_not_found() {
        let result = AppConfig::load_from_file("/nonexistent/xenosync.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.log.level, "info");
        assert_eq!(config.remote.mode, SyncMode::Both);
        assert_eq!(config.remote.criteria, SyncCriteria::Time);
        assert!(!config.remote.remove_files);
        assert_eq!(config.git.branch, "HEAD");
        assert_eq!(config.git.add_pattern, ".");
        assert_eq!(config.git.commit_message, "Committed by xenosync");
        assert_eq!(config.database.source_schema, "dbo");
        assert!(config.connections.is_empty());
    }

    #[test]
    fn test_validate_rejects_bad_level() {
        let mut config = AppConfig::default();
        config.log.level = "loud".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "log.level"
        ));
    }

    #[test]
    fn test_validate_rejects_empty_branch() {
        let mut config = AppConfig::default();
        config.git.branch = String::new();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "git.branch"
        ));
    }
}
