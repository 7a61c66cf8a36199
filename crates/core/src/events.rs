//! Lifecycle events and the synchronous event bus.
//!
//! Phases never render or persist anything themselves; they emit
//! [`LifecycleEvent`] values and external collaborators (console, log file)
//! subscribe through the [`EventBus`]. Delivery is synchronous and in
//! registration order: every listener sees an event before the emitting
//! step proceeds.

use chrono::{DateTime, Utc};
use serde::Serialize;

// ---------------------------------------------------------------------------
// Event payloads
// ---------------------------------------------------------------------------

/// The backend a phase-level event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Remote,
    Git,
    Mercurial,
    Database,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Remote => write!(f, "Remote"),
            Self::Git => write!(f, "Git"),
            Self::Mercurial => write!(f, "Mercurial"),
            Self::Database => write!(f, "Database"),
        }
    }
}

/// Outcome of a per-file side effect (permission or timestamp adjustment)
/// reported by the transfer tool alongside the file itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SideEffect {
    pub success: bool,
    pub detail: String,
}

/// An immutable lifecycle notification.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// The whole synchronization run started.
    SyncStarted { at: DateTime<Utc> },

    /// The whole synchronization run completed.
    SyncCompleted { at: DateTime<Utc> },

    /// A backend phase started.
    PhaseStarted { phase: Phase },

    /// A backend phase completed.
    PhaseCompleted { phase: Phase },

    /// Synchronization of one directory pair started.
    PairStarted { local: String, remote: String },

    /// Synchronization of one directory pair completed.
    PairCompleted,

    /// One file was transferred (or failed to transfer) during a pair sync.
    FileTransferred {
        name: String,
        success: bool,
        error: Option<String>,
        /// Permission-adjustment outcome, when the tool reports one.
        chmod: Option<SideEffect>,
        /// Timestamp-adjustment outcome, when the tool reports one.
        touch: Option<SideEffect>,
    },

    /// An external process (pipeline step) started.
    ProcessStarted { name: String },

    /// An external process (pipeline step) completed.
    ProcessCompleted { name: String, exit_code: i32 },

    /// Raw output text captured from an external process.
    Output { text: String },
}

// ---------------------------------------------------------------------------
// Event bus
// ---------------------------------------------------------------------------

type Listener = Box<dyn Fn(&LifecycleEvent) + Send + Sync>;

/// Callback registry for lifecycle events.
///
/// Listeners are registered up front; [`EventBus::emit`] delivers the event
/// to every listener, synchronously, in registration order.
#[derive(Default)]
pub struct EventBus {
    listeners: Vec<Listener>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Later registrations are delivered later.
    pub fn subscribe<F>(&mut self, listener: F)
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    /// Deliver an event to every registered listener.
    pub fn emit(&self, event: LifecycleEvent) {
        for listener in &self.listeners {
            listener(&event);
        }
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_emit_delivers_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();

        for tag in ["first", "second", "third"] {
            let seen = seen.clone();
            bus.subscribe(move |_event| seen.lock().unwrap().push(tag));
        }

        bus.emit(LifecycleEvent::PairCompleted);
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_emit_without_listeners_is_noop() {
        let bus = EventBus::new();
        bus.emit(LifecycleEvent::PhaseStarted { phase: Phase::Git });
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let event = LifecycleEvent::ProcessCompleted {
            name: "Pull".into(),
            exit_code: 1,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "process_completed");
        assert_eq!(json["exit_code"], 1);
    }
}
