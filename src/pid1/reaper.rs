//! Zombie process reaping
//!
//! Orphans are reparented to PID 1 (or to us as subreaper) and must be
//! waited for. Only the supervisor core calls this, between operations,
//! so it never races the engine's own `waitpid` on a spawned child.

use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

/// Information about a reaped process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReapedProcess {
    pub pid: u32,
    pub status: WaitResult,
}

/// Exit status of a reaped process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitResult {
    /// Process exited normally with code
    Exited(i32),
    /// Process killed by signal
    Signaled(i32),
}

/// Reap every exited child without blocking
pub fn reap_zombies() -> Vec<ReapedProcess> {
    let mut reaped = Vec::new();

    loop {
        match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => break,
            Ok(WaitStatus::Exited(p, code)) => {
                log::debug!("Reaped PID {} (exited {})", p, code);
                reaped.push(ReapedProcess {
                    pid: p.as_raw() as u32,
                    status: WaitResult::Exited(code),
                });
            }
            Ok(WaitStatus::Signaled(p, sig, _)) => {
                log::debug!("Reaped PID {} (killed by {})", p, sig);
                reaped.push(ReapedProcess {
                    pid: p.as_raw() as u32,
                    status: WaitResult::Signaled(sig as i32),
                });
            }
            Ok(_) => continue,
            Err(nix::errno::Errno::EINTR) => continue,
            Err(nix::errno::Errno::ECHILD) => break,
            Err(e) => {
                log::error!("waitpid error: {}", e);
                break;
            }
        }
    }

    reaped
}
