//! Console and file rendering of lifecycle events.
//!
//! The core emits events; this module turns them into the operator-facing
//! log lines, colors them for the console, and appends them to a dated
//! plain-text run log.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use console::style;
use tracing::warn;

use xenosync_core::{EventBus, LifecycleEvent};

/// Separator printed after a completed run.
pub const SEPARATOR: &str = "----------------------------------------";

/// Render one event into its log lines.
pub fn render_lines(event: &LifecycleEvent) -> Vec<String> {
    match event {
        LifecycleEvent::SyncStarted { at } => {
            vec![format!(
                "Synchronization started at {}.",
                at.format("%Y-%m-%d %H:%M:%S UTC")
            )]
        }
        LifecycleEvent::SyncCompleted { at } => {
            vec![
                format!(
                    "Synchronization completed at {}.",
                    at.format("%Y-%m-%d %H:%M:%S UTC")
                ),
                SEPARATOR.to_string(),
            ]
        }
        LifecycleEvent::PhaseStarted { phase } => {
            vec![format!("{phase} synchronization started.")]
        }
        LifecycleEvent::PhaseCompleted { phase } => {
            vec![format!("{phase} synchronization completed.")]
        }
        LifecycleEvent::PairStarted { local, remote } => {
            vec![format!("Synchronizing '{local}' with '{remote}'...")]
        }
        LifecycleEvent::PairCompleted => vec!["Directory pair synchronized.".to_string()],
        LifecycleEvent::FileTransferred {
            name,
            success,
            error,
            chmod,
            touch,
        } => {
            let mut lines = if *success {
                vec![format!("+File synchronized: {name}")]
            } else {
                let detail = error.as_deref().unwrap_or("unknown error");
                vec![format!("!File failed: {name} ({detail})")]
            };
            if let Some(chmod) = chmod {
                lines.push(render_side_effect("Permissions", chmod.success, &chmod.detail));
            }
            if let Some(touch) = touch {
                lines.push(render_side_effect("Timestamp", touch.success, &touch.detail));
            }
            lines
        }
        LifecycleEvent::ProcessStarted { name } => vec![format!("{name} started.")],
        LifecycleEvent::ProcessCompleted { name, exit_code } => {
            vec![format!("{name} completed."), format!("Exit Code: {exit_code}")]
        }
        LifecycleEvent::Output { text } => {
            text.lines().map(|line| line.to_string()).collect()
        }
    }
}

fn render_side_effect(kind: &str, success: bool, detail: &str) -> String {
    if success {
        format!(" +{kind} updated: {detail}")
    } else {
        format!(" !{kind} update failed: {detail}")
    }
}

/// Subscribe a colored console listener.
pub fn attach_console(bus: &mut EventBus) {
    bus.subscribe(|event| {
        for line in render_lines(event) {
            if line.starts_with('+') || line.starts_with(" +") {
                println!("{}", style(line).green());
            } else if line.starts_with('!') || line.starts_with(" !") {
                println!("{}", style(line).red());
            } else if line == SEPARATOR {
                println!("{}", style(line).dim());
            } else {
                println!("{line}");
            }
        }
    });
}

/// Subscribe an append-only file listener writing to `log-YYYY-MM-DD.txt`
/// in `dir`. The directory is created up front; append failures at run
/// time are reported through tracing and otherwise swallowed, so a full
/// disk cannot abort a synchronization.
pub fn attach_file_log(bus: &mut EventBus, dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let dir = dir.to_path_buf();
    bus.subscribe(move |event| {
        if let Err(e) = append_lines(&dir, &render_lines(event)) {
            warn!(error = %e, "failed to append to run log");
        }
    });
    Ok(())
}

fn append_lines(dir: &PathBuf, lines: &[String]) -> std::io::Result<()> {
    let path = dir.join(format!("log-{}.txt", Local::now().format("%Y-%m-%d")));
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    for line in lines {
        writeln!(file, "{line}")?;
    }
    Ok(())
}
