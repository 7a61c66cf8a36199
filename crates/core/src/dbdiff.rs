//! Database diff phase.
//!
//! Five-step pipeline over sqlcmd- and tablediff-style external tools:
//! clean the script workspace, enumerate the source tables, generate one
//! diff script per table, cleanse each generated script, and apply the
//! scripts to the destination. Generation tolerates per-table failures and
//! keeps going; application is strict and aborts on the first failing
//! script. An empty table list or an empty workspace short-circuits with
//! [`NO_WORK_EXIT_CODE`].

use std::path::PathBuf;

use tracing::{debug, info, instrument, warn};

use crate::config::DatabaseConfig;
use crate::connection::DatabaseConnection;
use crate::errors::DbError;
use crate::events::{EventBus, LifecycleEvent, Phase};
use crate::process::{ProcessRunner, NO_WORK_EXIT_CODE};

/// File the table enumeration query writes into the script workspace.
const TABLE_LIST_FILE: &str = "tables.txt";

/// Statement disabling every foreign-key constraint on the destination.
pub const CONSTRAINTS_OFF: &str =
    "EXEC sp_msforeachtable \"ALTER TABLE ? NOCHECK CONSTRAINT all\"";

/// Statement re-enabling (and re-checking) every foreign-key constraint.
pub const CONSTRAINTS_ON: &str =
    "EXEC sp_msforeachtable \"ALTER TABLE ? WITH CHECK CHECK CONSTRAINT all\"";

/// Catalog query listing the diffable tables of one schema, ordered by name.
/// `sysdiagrams` is tooling-owned and excluded.
fn catalog_query(schema: &str) -> String {
    format!(
        "SELECT [name] FROM sys.tables \
         WHERE SCHEMA_NAME([schema_id]) = '{schema}' \
         AND [name] <> 'sysdiagrams' ORDER BY [name]"
    )
}

/// Parse the query tool's console-format table listing.
///
/// The listing carries a column-name line, a separator line, and a trailing
/// `(N rows affected)` summary; only the data rows survive: empty lines are
/// dropped, summary lines (starting with `(`) are dropped, then the two
/// header lines are skipped and the rest trimmed.
pub fn parse_table_list(text: &str) -> Vec<String> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .filter(|line| !line.starts_with('('))
        .skip(2)
        .map(|line| line.trim().to_string())
        .collect()
}

/// Cleanse one generated diff script so it applies cleanly.
///
/// The diff tool emits the literal `N'Null'` where it means SQL `Null`, and
/// its scripts fail on foreign-key ordering; the cleansed script substitutes
/// the literal and wraps the body in a constraint-disable header and a
/// constraint-enable footer. Cleansing an already-cleansed script is a no-op
/// apart from the (idempotent) literal substitution.
pub fn cleanse_script(contents: &str) -> String {
    let body = contents.replace("N'Null'", "Null");
    if body.starts_with(CONSTRAINTS_OFF) {
        return body;
    }
    format!("{CONSTRAINTS_OFF}\nGO\n{body}\nGO\n{CONSTRAINTS_ON}\nGO\n")
}

/// The database diff phase.
pub struct DatabasePhase<'a, R: ProcessRunner> {
    config: &'a DatabaseConfig,
    source: DatabaseConnection,
    destination: DatabaseConnection,
    runner: &'a R,
    bus: &'a EventBus,
}

impl<'a, R: ProcessRunner> DatabasePhase<'a, R> {
    pub fn new(
        config: &'a DatabaseConfig,
        source: DatabaseConnection,
        destination: DatabaseConnection,
        runner: &'a R,
        bus: &'a EventBus,
    ) -> Self {
        Self {
            config,
            source,
            destination,
            runner,
            bus,
        }
    }

    /// Run the whole pipeline. Returns the phase exit code: 0 on success,
    /// [`NO_WORK_EXIT_CODE`] when there was nothing to diff or apply, a
    /// tool exit code otherwise.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<i32, DbError> {
        self.bus.emit(LifecycleEvent::PhaseStarted {
            phase: Phase::Database,
        });

        if !self.config.query_tool.exists() {
            return Err(DbError::ToolNotFound {
                tool: "query tool",
                path: self.config.query_tool.clone(),
            });
        }
        if !self.config.diff_tool.exists() {
            return Err(DbError::ToolNotFound {
                tool: "diff tool",
                path: self.config.diff_tool.clone(),
            });
        }

        self.clean_workspace()?;
        let (mut exit_code, tables) = self.enumerate_tables().await?;

        if exit_code == 0 {
            exit_code = self.generate_scripts(&tables).await?;
        }
        if exit_code == 0 {
            exit_code = self.apply_differences().await?;
        }

        self.bus.emit(LifecycleEvent::PhaseCompleted {
            phase: Phase::Database,
        });
        Ok(exit_code)
    }

    /// Step 1: ensure the script workspace exists and is empty.
    pub fn clean_workspace(&self) -> Result<(), DbError> {
        self.bus.emit(LifecycleEvent::ProcessStarted {
            name: "Clean Workspace".into(),
        });
        let dir = &self.config.script_storage;
        std::fs::create_dir_all(dir)?;
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() {
                std::fs::remove_file(path)?;
            }
        }
        debug!(dir = %dir.display(), "script workspace cleaned");
        self.bus.emit(LifecycleEvent::ProcessCompleted {
            name: "Clean Workspace".into(),
            exit_code: 0,
        });
        Ok(())
    }

    /// Step 2: enumerate the source tables through the query tool.
    ///
    /// Returns the query tool's exit code and the parsed table names; on a
    /// non-zero exit the listing is not read and the table list is empty.
    pub async fn enumerate_tables(&self) -> Result<(i32, Vec<String>), DbError> {
        let list_path = self.config.script_storage.join(TABLE_LIST_FILE);
        let mut args = self.query_tool_args(&self.source);
        args.extend([
            "-Q".to_string(),
            catalog_query(&self.config.source_schema),
            "-o".to_string(),
            list_path.display().to_string(),
        ]);

        self.bus.emit(LifecycleEvent::ProcessStarted {
            name: "Enumerate Tables".into(),
        });
        let output = self.runner.launch(&self.config.query_tool, &args, None).await?;
        self.bus.emit(LifecycleEvent::ProcessCompleted {
            name: "Enumerate Tables".into(),
            exit_code: output.exit_code,
        });

        if !output.success() {
            return Ok((output.exit_code, Vec::new()));
        }

        let listing = std::fs::read_to_string(&list_path)?;
        let tables = parse_table_list(&listing);
        info!(count = tables.len(), "tables enumerated");
        Ok((0, tables))
    }

    /// Step 3 (+4): generate one diff script per table, cleansing each
    /// script as soon as it appears.
    ///
    /// A failing table does not stop the later ones; the step's exit code
    /// is the last table's exit code. An empty table list short-circuits
    /// with [`NO_WORK_EXIT_CODE`] and emits no per-table events.
    pub async fn generate_scripts(&self, tables: &[String]) -> Result<i32, DbError> {
        self.bus.emit(LifecycleEvent::ProcessStarted {
            name: "Generate Scripts".into(),
        });

        if tables.is_empty() {
            info!("no tables to diff");
            self.bus.emit(LifecycleEvent::ProcessCompleted {
                name: "Generate Scripts".into(),
                exit_code: NO_WORK_EXIT_CODE,
            });
            return Ok(NO_WORK_EXIT_CODE);
        }

        let mut exit_code = 0;
        for table in tables {
            let script_path = self.config.script_storage.join(format!("{table}.sql"));
            let name = format!("Generate Script - {table}");
            self.bus.emit(LifecycleEvent::ProcessStarted { name: name.clone() });

            let args = self.diff_tool_args(table, &script_path);
            let output = self.runner.launch(&self.config.diff_tool, &args, None).await?;
            if !output.stdout.trim().is_empty() {
                self.bus.emit(LifecycleEvent::Output {
                    text: output.stdout.clone(),
                });
            }

            // The tool writes a script only when differences exist.
            if script_path.is_file() {
                let contents = std::fs::read_to_string(&script_path)?;
                std::fs::write(&script_path, cleanse_script(&contents))?;
            }

            if !output.success() {
                warn!(table = %table, exit_code = output.exit_code, "table diff failed");
            }
            self.bus.emit(LifecycleEvent::ProcessCompleted {
                name,
                exit_code: output.exit_code,
            });
            exit_code = output.exit_code;
        }
        self.bus.emit(LifecycleEvent::ProcessCompleted {
            name: "Generate Scripts".into(),
            exit_code,
        });
        Ok(exit_code)
    }

    /// Step 5: apply every generated script to the destination, in file
    /// name order. Each applied script is deleted; the first failing script
    /// aborts the remaining ones. An empty workspace short-circuits with
    /// [`NO_WORK_EXIT_CODE`] without launching the query tool.
    pub async fn apply_differences(&self) -> Result<i32, DbError> {
        self.bus.emit(LifecycleEvent::ProcessStarted {
            name: "Apply Differences".into(),
        });

        let mut scripts: Vec<PathBuf> = std::fs::read_dir(&self.config.script_storage)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "sql"))
            .collect();
        scripts.sort();

        if scripts.is_empty() {
            info!("no diff scripts to apply");
            self.bus.emit(LifecycleEvent::ProcessCompleted {
                name: "Apply Differences".into(),
                exit_code: NO_WORK_EXIT_CODE,
            });
            return Ok(NO_WORK_EXIT_CODE);
        }

        for script in scripts {
            let file_name = script
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let name = format!("Apply Script - {file_name}");
            self.bus.emit(LifecycleEvent::ProcessStarted { name: name.clone() });

            let mut args = self.query_tool_args(&self.destination);
            args.extend(["-i".to_string(), script.display().to_string()]);
            let output = self.runner.launch(&self.config.query_tool, &args, None).await?;
            if !output.stdout.trim().is_empty() {
                self.bus.emit(LifecycleEvent::Output {
                    text: output.stdout.clone(),
                });
            }
            self.bus.emit(LifecycleEvent::ProcessCompleted {
                name,
                exit_code: output.exit_code,
            });

            if !output.success() {
                self.bus.emit(LifecycleEvent::ProcessCompleted {
                    name: "Apply Differences".into(),
                    exit_code: output.exit_code,
                });
                return Ok(output.exit_code);
            }
            std::fs::remove_file(&script)?;
        }
        self.bus.emit(LifecycleEvent::ProcessCompleted {
            name: "Apply Differences".into(),
            exit_code: 0,
        });
        Ok(0)
    }

    fn query_tool_args(&self, connection: &DatabaseConnection) -> Vec<String> {
        let mut args = vec![
            "-S".to_string(),
            connection.data_source.clone(),
            "-d".to_string(),
            connection.initial_catalog.clone(),
        ];
        if connection.integrated_security {
            args.push("-E".to_string());
        } else {
            args.extend([
                "-U".to_string(),
                connection.user_id.clone(),
                "-P".to_string(),
                connection.password.clone(),
            ]);
        }
        args
    }

    fn diff_tool_args(&self, table: &str, script_path: &std::path::Path) -> Vec<String> {
        let mut args = vec![
            "-sourceserver".to_string(),
            format!("[{}]", self.source.data_source),
            "-sourcedatabase".to_string(),
            format!("[{}]", self.source.initial_catalog),
            "-sourceschema".to_string(),
            format!("[{}]", self.config.source_schema),
            "-sourcetable".to_string(),
            format!("[{table}]"),
        ];
        if !self.source.integrated_security {
            args.extend([
                "-sourceuser".to_string(),
                format!("[{}]", self.source.user_id),
                "-sourcepassword".to_string(),
                format!("[{}]", self.source.password),
            ]);
        }
        args.extend([
            "-destinationserver".to_string(),
            format!("[{}]", self.destination.data_source),
            "-destinationdatabase".to_string(),
            format!("[{}]", self.destination.initial_catalog),
            "-destinationschema".to_string(),
            format!("[{}]", self.config.destination_schema),
            "-destinationtable".to_string(),
            format!("[{table}]"),
        ]);
        if !self.destination.integrated_security {
            args.extend([
                "-destinationuser".to_string(),
                format!("[{}]", self.destination.user_id),
                "-destinationpassword".to_string(),
                format!("[{}]", self.destination.password),
            ]);
        }
        args.extend([
            "-dt".to_string(),
            "-et".to_string(),
            "TableDiffs".to_string(),
            "-f".to_string(),
            script_path.display().to_string(),
        ]);
        args
    }
}
