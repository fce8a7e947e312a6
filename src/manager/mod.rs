//! Service manager
//!
//! Owns the registry and the execution context, and drives objects through
//! the lifecycle state machine one at a time.

mod context;
mod identity;
mod lifecycle;
mod pidfile;
mod proc_table;
mod process;
mod registry;
mod runlevel;
mod shell;
mod state;

pub use context::{
    BootMode, CurrentTask, ExecContext, TaskHandle, TaskKind, DEFAULT_PID_FILE_TIMEOUT,
};
pub use identity::{lookup_identity, resolve_group, resolve_user, Identity, IdentityError};
pub use lifecycle::{COMMAND_STOP_POLL, PID_FILE_POLL, SIGNAL_STOP_POLL};
pub use pidfile::{parse_pid, read_pid_file, PidFileError};
pub use proc_table::{correct_pid, is_alive, ProcStat};
pub use process::{spawn, CommandKind, SignalBlock, SpawnError, Spawned};
pub use registry::{ObjectRef, PriorityIter, Registry, RegistryError};
pub use runlevel::RunSummary;
pub use shell::{needs_shell, Interpreter};
pub use state::{Phase, RunState};

use crate::console::Reporter;
use crate::objects::ServiceObject;
use crate::outcome::Outcome;

/// Service manager for one supervisor
pub struct Manager {
    registry: Registry,
    ctx: ExecContext,
    reporter: Box<dyn Reporter>,
}

impl Manager {
    pub fn new(registry: Registry, ctx: ExecContext, reporter: Box<dyn Reporter>) -> Self {
        Self {
            registry,
            ctx,
            reporter,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn context(&self) -> &ExecContext {
        &self.ctx
    }

    pub fn runlevel(&self) -> &str {
        &self.ctx.runlevel
    }

    pub fn boot_mode(&self) -> BootMode {
        self.ctx.boot_mode
    }

    /// Handle for the signal path
    pub fn task_handle(&self) -> TaskHandle {
        self.ctx.task_handle()
    }

    pub fn get_object(&self, id: &str) -> Option<&ServiceObject> {
        self.registry.lookup(id)
    }

    fn find(&self, id: &str) -> Result<ObjectRef, ManagerError> {
        self.registry
            .find(id)
            .ok_or_else(|| ManagerError::NotFound(id.to_string()))
    }

    /// Start one object by id. Already started objects are left alone.
    pub fn start_object(&mut self, id: &str) -> Result<Outcome, ManagerError> {
        let r = self.find(id)?;
        if self.registry.get(r)?.started() {
            log::info!("{} already started", id);
            return Ok(Outcome::Success);
        }
        self.start_ref(r)
    }

    pub fn stop_object(&mut self, id: &str) -> Result<Outcome, ManagerError> {
        let r = self.find(id)?;
        self.stop_ref(r)
    }

    pub fn reload_object(&mut self, id: &str) -> Result<Outcome, ManagerError> {
        let r = self.find(id)?;
        let obj = self.registry.get_mut(r)?;
        let line = obj.display_line("Reloading");
        let outcome = lifecycle::reload(&self.ctx, obj)?;
        self.reporter.status(&line, outcome);
        Ok(outcome)
    }

    pub(crate) fn start_ref(&mut self, r: ObjectRef) -> Result<Outcome, ManagerError> {
        let obj = self.registry.get_mut(r)?;
        let line = obj.display_line("Starting");
        let outcome = lifecycle::start(&self.ctx, obj)?;
        self.reporter.status(&line, outcome);
        Ok(outcome)
    }

    pub(crate) fn stop_ref(&mut self, r: ObjectRef) -> Result<Outcome, ManagerError> {
        let obj = self.registry.get_mut(r)?;
        let line = obj.display_line("Stopping");
        let outcome = lifecycle::stop(&self.ctx, obj)?;
        self.reporter.status(&line, outcome);
        Ok(outcome)
    }

    /// React to reaped processes: forget their PIDs and restart objects
    /// that asked for it. Returns the ids that were restarted.
    pub fn handle_exits(&mut self, reaped: &[u32]) -> Result<Vec<String>, ManagerError> {
        let hits: Vec<ObjectRef> = self
            .registry
            .entries()
            .filter(|(_, o)| o.current_pid() != 0 && reaped.contains(&o.current_pid()))
            .map(|(r, _)| r)
            .collect();

        let mut restarted = Vec::new();
        for r in hits {
            let obj = self.registry.get_mut(r)?;
            log::info!("{}: pid {} exited", obj.id, obj.current_pid());
            obj.state.current_pid = 0;

            if obj.options.auto_restart && obj.is_enabled() && obj.started() {
                obj.state.set_stopped();
                let id = obj.id.clone();
                self.reporter.log(&format!("Restarting {}", obj.description), false);
                self.start_ref(r)?;
                restarted.push(id);
            }
        }
        Ok(restarted)
    }

    /// One line per object for state dumps
    pub fn status_lines(&self) -> Vec<String> {
        let mut lines = vec![format!(
            "runlevel={} boot_mode={} busy={}",
            self.ctx.runlevel,
            self.ctx.boot_mode.as_str(),
            self.ctx.task.object().unwrap_or_else(|| "-".to_string())
        )];
        lines.extend(self.registry.iter().map(|o| {
            format!(
                "{:<20} {:<10} pid={:<7} enabled={:<5} start={} stop={} runlevels={}",
                o.id,
                o.state.phase.as_str(),
                o.current_pid(),
                o.is_enabled(),
                o.start_priority,
                o.stop_priority,
                o.runlevels.join(",")
            )
        }));
        lines
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Runlevel {0} has no enabled objects to start")]
    EmptyRunlevel(String),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Failed to spawn: {0}")]
    Spawn(#[from] SpawnError),
}

impl ManagerError {
    /// The supervisor cannot go on (emergency shell territory)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ManagerError::Spawn(SpawnError::Fork(_))
                | ManagerError::Registry(RegistryError::Corrupt(_))
        )
    }
}
