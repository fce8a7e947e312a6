//! Per-object runtime state
//!
//! ```text
//!     ┌──────────┐
//!     │ Stopped  │◄─────────────────┐
//!     └────┬─────┘                  │
//!          │ start                  │ failure
//!     ┌────▼─────┐                  │
//!     │ Starting │──────────────────┘
//!     └────┬─────┘
//!          │ success / warning
//!     ┌────▼─────┐  reload   ┌───────────┐
//!     │ Running  │◄─────────►│ Reloading │
//!     └────┬─────┘           └───────────┘
//!          │ stop
//!     ┌────▼─────┐
//!     │ Stopping │
//!     └────┬─────┘
//!          │ success / warning
//!     ┌────▼─────┐
//!     │ Stopped  │
//!     └──────────┘
//! ```

use chrono::{DateTime, Local};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
    /// Does not change `started`
    Reloading,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Reloading => "reloading",
        }
    }
}

/// Runtime state of one object
#[derive(Debug, Clone, Default)]
pub struct RunState {
    pub phase: Phase,
    pub started: bool,
    pub started_since: Option<DateTime<Local>>,
    /// 0 when nothing is tracked
    pub current_pid: u32,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_starting(&mut self) {
        self.phase = Phase::Starting;
    }

    pub fn set_running(&mut self, pid: u32) {
        self.phase = Phase::Running;
        self.started = true;
        self.started_since = Some(Local::now());
        self.current_pid = pid;
    }

    /// Start failed: nothing is running
    pub fn set_start_failed(&mut self) {
        self.phase = Phase::Stopped;
        self.started = false;
        self.started_since = None;
        self.current_pid = 0;
    }

    pub fn set_stopping(&mut self) {
        self.phase = Phase::Stopping;
    }

    pub fn set_stopped(&mut self) {
        self.phase = Phase::Stopped;
        self.started = false;
        self.started_since = None;
        self.current_pid = 0;
    }

    /// Stop failed: the object keeps running
    pub fn set_stop_failed(&mut self) {
        self.phase = if self.started {
            Phase::Running
        } else {
            Phase::Stopped
        };
    }

    /// Enter reload, returning the phase to restore afterwards
    pub fn begin_reload(&mut self) -> Phase {
        std::mem::replace(&mut self.phase, Phase::Reloading)
    }

    pub fn end_reload(&mut self, previous: Phase) {
        self.phase = previous;
    }

    /// How long the object has been up
    pub fn uptime(&self) -> Option<chrono::Duration> {
        self.started_since.map(|since| Local::now() - since)
    }
}
