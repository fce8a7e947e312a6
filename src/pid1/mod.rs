//! PID 1 functionality
//!
//! Handles responsibilities specific to running as init (PID 1):
//! - Ctrl-Alt-Del policy
//! - Zombie process reaping
//! - Signal forwarding to the supervisor core
//! - Orderly shutdown and the emergency shell

mod reaper;
mod shutdown;
mod signals;

pub use reaper::{reap_zombies, ReapedProcess, WaitResult};
pub use shutdown::{shutdown, ShutdownType};
pub use signals::{InitSignal, SignalHandler};

use std::os::unix::process::CommandExt;
use std::process;
use std::time::Duration;

use crate::settings::Settings;

/// Shell exec'd when the supervisor cannot continue
pub const EMERGENCY_SHELL: &str = "/bin/sh";

/// Check if we are running as PID 1
pub fn is_pid1() -> bool {
    process::id() == 1
}

/// Initialize the PID 1 environment
///
/// Applies the Ctrl-Alt-Del policy. Outside PID 1 the supervisor becomes a
/// child subreaper instead, so orphaned service processes are still
/// reported to it.
pub fn init(settings: &Settings) -> Result<(), Pid1Error> {
    if !is_pid1() {
        log::debug!("Not PID 1 (pid={}), registering as subreaper", process::id());
        return become_subreaper();
    }

    log::info!("Running as PID 1");

    if settings.disable_cad {
        // With CAD disabled the kernel sends SIGINT to PID 1 instead of rebooting
        nix::sys::reboot::set_cad_enabled(false).map_err(Pid1Error::Cad)?;
        log::info!("Ctrl-Alt-Del reboot disabled");
    }

    Ok(())
}

fn become_subreaper() -> Result<(), Pid1Error> {
    // SAFETY: plain prctl with integer arguments
    let rc = unsafe { libc::prctl(libc::PR_SET_CHILD_SUBREAPER, 1, 0, 0, 0) };
    if rc != 0 {
        return Err(Pid1Error::Subreaper(nix::Error::last()));
    }
    Ok(())
}

/// Replace the supervisor with an interactive shell
pub fn emergency_shell() -> ! {
    log::error!("Starting emergency shell");
    let err = process::Command::new(EMERGENCY_SHELL).exec();
    log::error!("Failed to exec {}: {}", EMERGENCY_SHELL, err);

    if !is_pid1() {
        process::exit(1);
    }
    // PID 1 must never exit
    loop {
        std::thread::sleep(Duration::from_secs(60));
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Pid1Error {
    #[error("Failed to set Ctrl-Alt-Del policy: {0}")]
    Cad(nix::Error),

    #[error("Failed to become child subreaper: {0}")]
    Subreaper(nix::Error),

    #[error("Signal setup failed: {0}")]
    Signal(#[from] std::io::Error),
}
