//! Typed service object definitions
//!
//! One `ServiceObject` per managed unit. Everything except `state` is fixed
//! once the object table is loaded.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use nix::sys::signal::Signal;

use crate::manager::RunState;

/// Stop timeout used when an object does not configure one
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Policy for bringing an object down
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StopMode {
    /// Run `stop_command`
    Command,
    /// Signal the tracked PID
    SignalByPid,
    /// Signal the PID read from `pid_file`
    SignalByPidFile,
    /// Nothing to do
    None,
    /// Not resolved yet (only valid while loading)
    #[default]
    Invalid,
}

impl StopMode {
    /// Map a StopCommand keyword; `None` means the value is a literal command
    pub fn from_keyword(s: &str) -> Option<Self> {
        match s.trim() {
            "PID" => Some(Self::SignalByPid),
            "PIDFILE" => Some(Self::SignalByPidFile),
            "NONE" => Some(Self::None),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::SignalByPid => "pid",
            Self::SignalByPidFile => "pidfile",
            Self::None => "none",
            Self::Invalid => "invalid",
        }
    }
}

/// Three-valued enabled flag. `Unset` only exists between construction
/// and the registry integrity scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Enabled {
    Yes,
    No,
    #[default]
    Unset,
}

impl Enabled {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" | "on" => Some(Self::Yes),
            "false" | "no" | "0" | "off" => Some(Self::No),
            _ => None,
        }
    }

    pub fn is_enabled(self) -> bool {
        self == Self::Yes
    }
}

/// Independent runtime options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectOptions {
    /// Always run commands through the interpreter
    pub force_shell: bool,
    /// Double-fork start commands
    pub daemonize: bool,
    /// The started program forks once more; adds one to the PID estimate
    pub is_service: bool,
    pub auto_restart: bool,
    /// Only has work to do at shutdown
    pub halt_only: bool,
    pub no_stop_wait: bool,
    /// Start waits for `pid_file` to appear
    pub has_pid_file: bool,
    /// Survives runlevel switches
    pub persistent: bool,
    /// Start command is "<new-root> <old-root-dir>" for pivot_root
    pub pivot_root: bool,
    /// Start command replaces the supervisor image
    pub exec_replace: bool,
    /// Print the description without a Starting/Stopping prefix
    pub raw_description: bool,
}

impl ObjectOptions {
    /// Set a flag by its config keyword. Returns false for unknown keywords.
    pub fn set_flag(&mut self, flag: &str) -> bool {
        let slot = match flag.to_uppercase().as_str() {
            "FORCESHELL" => &mut self.force_shell,
            "DAEMONIZE" => &mut self.daemonize,
            "SERVICE" => &mut self.is_service,
            "AUTORESTART" => &mut self.auto_restart,
            "HALTONLY" => &mut self.halt_only,
            "NOSTOPWAIT" => &mut self.no_stop_wait,
            "HASPIDFILE" => &mut self.has_pid_file,
            "PERSISTENT" => &mut self.persistent,
            "PIVOT" => &mut self.pivot_root,
            "EXEC" => &mut self.exec_replace,
            "RAWDESCRIPTION" => &mut self.raw_description,
            _ => return false,
        };
        *slot = true;
        true
    }
}

/// Identity and stdio for spawned commands
#[derive(Debug, Clone, Default)]
pub struct ExecSection {
    /// 0 = leave unchanged
    pub user_id: u32,
    /// 0 = leave unchanged (or the user's primary group when a user is set)
    pub group_id: u32,
    pub working_directory: Option<PathBuf>,
    pub stdout: Option<PathBuf>,
    pub stderr: Option<PathBuf>,
}

/// A managed unit
#[derive(Debug, Clone)]
pub struct ServiceObject {
    pub id: String,
    pub description: String,

    pub start_command: Option<String>,
    pub stop_command: Option<String>,
    pub prestart_command: Option<String>,
    pub reload_command: Option<String>,
    pub reload_signal: Option<Signal>,
    pub pid_file: Option<PathBuf>,

    pub stop_mode: StopMode,
    pub start_priority: u64,
    pub stop_priority: u64,
    pub runlevels: Vec<String>,
    pub options: ObjectOptions,
    pub exec: ExecSection,
    pub stop_timeout: Duration,
    pub term_signal: Signal,
    pub enabled: Enabled,

    /// Mutated by the lifecycle state machine only
    pub state: RunState,
}

impl ServiceObject {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            start_command: None,
            stop_command: None,
            prestart_command: None,
            reload_command: None,
            reload_signal: None,
            pid_file: None,
            stop_mode: StopMode::default(),
            start_priority: 0,
            stop_priority: 0,
            runlevels: Vec::new(),
            options: ObjectOptions::default(),
            exec: ExecSection::default(),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            term_signal: Signal::SIGTERM,
            enabled: Enabled::default(),
            state: RunState::default(),
        }
    }

    /// Relevant priority for a start or stop pass
    pub fn priority(&self, for_start: bool) -> u64 {
        if for_start {
            self.start_priority
        } else {
            self.stop_priority
        }
    }

    pub fn in_runlevel(&self, runlevel: &str) -> bool {
        self.runlevels.iter().any(|rl| rl == runlevel)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.is_enabled()
    }

    pub fn started(&self) -> bool {
        self.state.started
    }

    pub fn current_pid(&self) -> u32 {
        self.state.current_pid
    }

    /// Line shown next to the outcome tag
    pub fn display_line(&self, verb: &str) -> String {
        if self.options.raw_description {
            self.description.clone()
        } else {
            format!("{} {}", verb, self.description)
        }
    }
}

/// Parse a signal given as "SIGTERM", "TERM" or "15"
pub fn parse_signal(s: &str) -> Option<Signal> {
    let s = s.trim();
    if let Ok(num) = s.parse::<i32>() {
        return Signal::try_from(num).ok();
    }
    let upper = s.to_uppercase();
    if upper.starts_with("SIG") {
        Signal::from_str(&upper).ok()
    } else {
        Signal::from_str(&format!("SIG{}", upper)).ok()
    }
}

/// Parse a whole number of seconds ("30" or "30s")
pub fn parse_seconds(s: &str) -> Option<Duration> {
    let s = s.trim();
    let n = s.strip_suffix('s').unwrap_or(s);
    n.parse().ok().map(Duration::from_secs)
}
