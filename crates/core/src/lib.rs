//! Core library for xenosync, an unattended synchronization pipeline over
//! external transfer, version control, and database tooling.
//!
//! The library is pure orchestration: it launches opaque external
//! processes (a WinSCP-style transfer CLI, `git`, sqlcmd- and
//! tablediff-style database tools), sequences them, decides
//! continue-or-abort on their exit codes, and reports progress through a
//! synchronous event bus. Rendering and persistence of those events belong
//! to the embedding binary.

pub mod config;
pub mod connection;
pub mod dbdiff;
pub mod errors;
pub mod events;
pub mod orchestrator;
pub mod process;
pub mod transfer;
pub mod vcs;

pub use config::AppConfig;
pub use connection::{DatabaseConnection, RemoteConnection};
pub use errors::CoreError;
pub use events::{EventBus, LifecycleEvent, Phase};
pub use orchestrator::{SyncAction, Synchronizer};
pub use process::{CommandRunner, NO_WORK_EXIT_CODE};
