//! Supervisor execution context
//!
//! Everything the lifecycle code used to keep in globals: the current
//! runlevel, which orchestrator pass is active, the in-flight task record
//! and the interpreter choice. The only piece shared with other threads
//! is the task's atomic state, reached through `TaskHandle`.

use std::cell::{Cell, OnceCell, RefCell};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use super::shell::Interpreter;

/// Default budget for a PID file to appear after start
pub const DEFAULT_PID_FILE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BootMode {
    #[default]
    Neutral,
    Bootup,
    Shutdown,
}

impl BootMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Neutral => "neutral",
            Self::Bootup => "bootup",
            Self::Shutdown => "shutdown",
        }
    }
}

/// What the supervisor is blocked on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Spawn,
    Termination,
    PidFile,
}

#[derive(Debug, Default)]
struct TaskShared {
    busy: AtomicBool,
    cancel: AtomicBool,
    pid: AtomicU32,
}

/// Thread-safe view of the in-flight task for the signal path
#[derive(Debug, Clone)]
pub struct TaskHandle {
    shared: Arc<TaskShared>,
}

impl TaskHandle {
    /// Ask the in-flight wait to give up. Returns false when idle.
    pub fn abort(&self) -> bool {
        if !self.shared.busy.load(Ordering::SeqCst) {
            return false;
        }
        self.shared.cancel.store(true, Ordering::SeqCst);
        true
    }

    /// PID of the in-flight process, 0 while spawning or idle
    pub fn pid(&self) -> u32 {
        self.shared.pid.load(Ordering::SeqCst)
    }

    pub fn is_busy(&self) -> bool {
        self.shared.busy.load(Ordering::SeqCst)
    }

    /// Abort the in-flight task and SIGTERM its process if one is recorded.
    /// A spawn that has not recorded its PID yet sees the cancel flag itself.
    pub fn interrupt(&self) -> bool {
        if !self.abort() {
            return false;
        }
        let pid = self.pid();
        if pid != 0 {
            if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                log::warn!("Failed to signal pid {}: {}", pid, e);
            }
        }
        true
    }
}

/// Single in-flight task record
#[derive(Debug, Default)]
pub struct CurrentTask {
    shared: Arc<TaskShared>,
    object: RefCell<Option<String>>,
    kind: Cell<Option<TaskKind>>,
}

impl CurrentTask {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> TaskHandle {
        TaskHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Mark `object` as in flight. The record is cleared when the guard drops.
    pub fn begin(&self, object: &str, kind: TaskKind) -> TaskGuard<'_> {
        self.shared.cancel.store(false, Ordering::SeqCst);
        self.shared.pid.store(0, Ordering::SeqCst);
        *self.object.borrow_mut() = Some(object.to_string());
        self.kind.set(Some(kind));
        self.shared.busy.store(true, Ordering::SeqCst);
        TaskGuard { task: self }
    }

    pub fn object(&self) -> Option<String> {
        self.object.borrow().clone()
    }

    pub fn kind(&self) -> Option<TaskKind> {
        self.kind.get()
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancel.load(Ordering::SeqCst)
    }
}

pub struct TaskGuard<'a> {
    task: &'a CurrentTask,
}

impl TaskGuard<'_> {
    pub fn set_pid(&self, pid: u32) {
        self.task.shared.pid.store(pid, Ordering::SeqCst);
    }

    pub fn cancelled(&self) -> bool {
        self.task.is_cancelled()
    }
}

impl Drop for TaskGuard<'_> {
    fn drop(&mut self) {
        self.task.shared.busy.store(false, Ordering::SeqCst);
        self.task.shared.pid.store(0, Ordering::SeqCst);
        self.task.kind.set(None);
        *self.task.object.borrow_mut() = None;
    }
}

/// State threaded through every lifecycle call
#[derive(Debug)]
pub struct ExecContext {
    pub runlevel: String,
    pub boot_mode: BootMode,
    pub pid_file_timeout: Duration,
    pub task: CurrentTask,
    interpreter: OnceCell<Interpreter>,
}

impl ExecContext {
    pub fn new(runlevel: impl Into<String>) -> Self {
        Self {
            runlevel: runlevel.into(),
            boot_mode: BootMode::Neutral,
            pid_file_timeout: DEFAULT_PID_FILE_TIMEOUT,
            task: CurrentTask::new(),
            interpreter: OnceCell::new(),
        }
    }

    /// Interpreter for shell commands, detected on first use
    pub fn interpreter(&self) -> &Interpreter {
        self.interpreter.get_or_init(Interpreter::detect)
    }

    /// Pin the interpreter instead of detecting it
    pub fn set_interpreter(&mut self, interpreter: Interpreter) {
        self.interpreter = OnceCell::from(interpreter);
    }

    pub fn task_handle(&self) -> TaskHandle {
        self.task.handle()
    }
}
