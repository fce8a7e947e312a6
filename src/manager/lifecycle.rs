//! Start, stop and reload of a single object
//!
//! Each call drives one object through its phases and returns the
//! `Outcome`. Only fork failure escapes as an error; everything else is
//! reported per object.

use std::path::Path;
use std::thread::sleep;
use std::time::{Duration, Instant};

use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag};
use nix::unistd::Pid;

use super::context::{ExecContext, TaskKind};
use super::pidfile::read_pid_file;
use super::proc_table;
use super::process::{self, CommandKind, SpawnError, Spawned};
use crate::objects::{ServiceObject, StopMode};
use crate::outcome::Outcome;

/// Poll interval while waiting for a PID file
pub const PID_FILE_POLL: Duration = Duration::from_millis(100);
/// Poll interval after a stop command
pub const COMMAND_STOP_POLL: Duration = Duration::from_millis(100);
/// Poll interval after a termination signal
pub const SIGNAL_STOP_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitEnd {
    Exited,
    TimedOut,
    Cancelled,
}

/// Run a command, turning per-object spawn problems into a Failure outcome
fn run(
    ctx: &ExecContext,
    obj: &ServiceObject,
    command: &str,
    kind: CommandKind,
) -> Result<Spawned, SpawnError> {
    match process::spawn(ctx, obj, command, kind) {
        Ok(spawned) => Ok(spawned),
        Err(e @ SpawnError::Fork(_)) => Err(e),
        Err(e) => {
            log::error!("{}: {}", obj.id, e);
            Ok(Spawned {
                pid: 0,
                spawned_pid: 0,
                outcome: Outcome::Failure,
            })
        }
    }
}

/// A PID we are willing to signal
fn signalable(pid: u32) -> bool {
    pid != 0 && pid <= i32::MAX as u32 && pid != std::process::id()
}

/// PID from the object's PID file, if it has one and it is readable
fn pid_from_file(obj: &ServiceObject) -> Option<u32> {
    let path = obj.pid_file.as_deref()?;
    match read_pid_file(path) {
        Ok(pid) => Some(pid),
        Err(e) => {
            log::warn!("{}: {}: {}", obj.id, path.display(), e);
            None
        }
    }
}

/// Process a stop or reload should act on
fn resolve_pid(obj: &ServiceObject) -> Option<u32> {
    let pid = match obj.stop_mode {
        StopMode::SignalByPidFile => pid_from_file(obj),
        _ => pid_from_file(obj).or(Some(obj.current_pid())),
    };
    pid.filter(|&p| p != 0)
}

pub fn start(ctx: &ExecContext, obj: &mut ServiceObject) -> Result<Outcome, SpawnError> {
    let Some(command) = obj.start_command.clone() else {
        if obj.options.halt_only {
            return Ok(Outcome::Success);
        }
        log::error!("{}: no start command", obj.id);
        return Ok(Outcome::Failure);
    };

    obj.state.set_starting();

    if let Some(prestart) = obj.prestart_command.clone() {
        let res = run(ctx, obj, &prestart, CommandKind::Prestart)?;
        if res.outcome != Outcome::Success {
            log::warn!("{}: prestart command returned {}", obj.id, res.outcome);
        }
    }

    if obj.options.pivot_root {
        let outcome = pivot(&obj.id, &command);
        if outcome.completed() {
            obj.state.set_running(0);
        } else {
            obj.state.set_start_failed();
        }
        return Ok(outcome);
    }

    if obj.options.exec_replace {
        let err = process::exec_in_place(ctx, obj, &command);
        log::error!("{}: {}", obj.id, err);
        obj.state.set_start_failed();
        return Ok(Outcome::Failure);
    }

    let spawned = run(ctx, obj, &command, CommandKind::Start)?;
    let mut outcome = spawned.outcome;

    if outcome.completed() && obj.options.has_pid_file {
        if let Some(path) = obj.pid_file.clone() {
            if !wait_for_pid_file(ctx, &obj.id, &path) {
                outcome = outcome.degrade();
            }
        }
    }

    if outcome.completed() {
        let pid = pid_from_file(obj).unwrap_or(spawned.pid);
        obj.state.set_running(pid);
        log::info!("{}: started (pid {})", obj.id, pid);
    } else {
        obj.state.set_start_failed();
        log::error!("{}: start failed", obj.id);
    }

    Ok(outcome)
}

/// "<new-root> <old-root-dir>": swap the root filesystem
fn pivot(id: &str, spec: &str) -> Outcome {
    let parts: Vec<&str> = spec.split_whitespace().collect();
    let [new_root, put_old] = parts.as_slice() else {
        log::error!("{}: pivot_root needs \"<new-root> <old-root-dir>\", got {:?}", id, spec);
        return Outcome::Failure;
    };

    if let Err(e) = nix::unistd::pivot_root(*new_root, *put_old) {
        log::error!("{}: pivot_root({}, {}) failed: {}", id, new_root, put_old, e);
        return Outcome::Failure;
    }
    if let Err(e) = nix::unistd::chdir("/") {
        log::warn!("{}: chdir to new root failed: {}", id, e);
        return Outcome::Warning;
    }
    Outcome::Success
}

/// Poll until `path` exists. False on timeout or cancel.
fn wait_for_pid_file(ctx: &ExecContext, id: &str, path: &Path) -> bool {
    if path.exists() {
        return true;
    }

    let task = ctx.task.begin(id, TaskKind::PidFile);
    let deadline = Instant::now() + ctx.pid_file_timeout;
    loop {
        sleep(PID_FILE_POLL);
        if path.exists() {
            return true;
        }
        if task.cancelled() {
            log::warn!("{}: wait for {} cancelled", id, path.display());
            return false;
        }
        if Instant::now() >= deadline {
            log::warn!("{}: {} did not appear in time", id, path.display());
            return false;
        }
    }
}

/// Poll until `pid` is gone, reaping it if it is our child
fn wait_for_exit(
    ctx: &ExecContext,
    id: &str,
    pid: u32,
    timeout: Duration,
    interval: Duration,
) -> WaitEnd {
    let task = ctx.task.begin(id, TaskKind::Termination);
    let deadline = Instant::now() + timeout;
    loop {
        // Only this pid: a blanket waitpid(-1) would steal other children
        let _ = waitpid(Pid::from_raw(pid as i32), Some(WaitPidFlag::WNOHANG));
        if !proc_table::is_alive(pid) {
            return WaitEnd::Exited;
        }
        if task.cancelled() {
            return WaitEnd::Cancelled;
        }
        if Instant::now() >= deadline {
            return WaitEnd::TimedOut;
        }
        sleep(interval);
    }
}

fn finish_stop(obj: &mut ServiceObject, outcome: Outcome) -> Outcome {
    if outcome.completed() {
        obj.state.set_stopped();
        log::info!("{}: stopped", obj.id);
    } else {
        obj.state.set_stop_failed();
        log::error!("{}: stop failed", obj.id);
    }
    outcome
}

pub fn stop(ctx: &ExecContext, obj: &mut ServiceObject) -> Result<Outcome, SpawnError> {
    // A process dying because we stopped it must not trigger a restart
    let auto_restart = std::mem::replace(&mut obj.options.auto_restart, false);
    let result = stop_inner(ctx, obj);
    obj.options.auto_restart = auto_restart;
    result
}

fn stop_inner(ctx: &ExecContext, obj: &mut ServiceObject) -> Result<Outcome, SpawnError> {
    match obj.stop_mode {
        StopMode::Invalid => {
            log::warn!("{}: stop mode was never resolved, nothing to do", obj.id);
            Ok(Outcome::Success)
        }
        StopMode::None => {
            obj.state.set_stopped();
            Ok(Outcome::Success)
        }
        StopMode::Command => {
            let Some(command) = obj.stop_command.clone() else {
                log::error!("{}: no stop command", obj.id);
                return Ok(finish_stop(obj, Outcome::Failure));
            };
            obj.state.set_stopping();
            let target = resolve_pid(obj).filter(|&p| signalable(p));

            let mut outcome = run(ctx, obj, &command, CommandKind::Stop)?.outcome;
            if let Some(pid) = target {
                if outcome.completed() && !obj.options.no_stop_wait {
                    let end = wait_for_exit(ctx, &obj.id, pid, obj.stop_timeout, COMMAND_STOP_POLL);
                    if end != WaitEnd::Exited {
                        log::warn!("{}: pid {} still running after stop command ({:?})", obj.id, pid, end);
                        outcome = outcome.degrade();
                    }
                }
            }
            Ok(finish_stop(obj, outcome))
        }
        StopMode::SignalByPid | StopMode::SignalByPidFile => {
            let Some(pid) = resolve_pid(obj) else {
                log::error!("{}: no process to signal", obj.id);
                return Ok(finish_stop(obj, Outcome::Failure));
            };
            if !signalable(pid) {
                log::error!("{}: refusing to signal pid {}", obj.id, pid);
                return Ok(finish_stop(obj, Outcome::Failure));
            }

            obj.state.set_stopping();
            if let Err(e) = kill(Pid::from_raw(pid as i32), obj.term_signal) {
                log::error!("{}: kill({}, {}) failed: {}", obj.id, pid, obj.term_signal, e);
                return Ok(finish_stop(obj, Outcome::Failure));
            }
            if obj.options.no_stop_wait {
                return Ok(finish_stop(obj, Outcome::Success));
            }

            let outcome = match wait_for_exit(ctx, &obj.id, pid, obj.stop_timeout, SIGNAL_STOP_POLL) {
                WaitEnd::Exited => Outcome::Success,
                WaitEnd::Cancelled => {
                    log::warn!("{}: wait for pid {} cancelled", obj.id, pid);
                    Outcome::Warning
                }
                WaitEnd::TimedOut => {
                    log::error!("{}: pid {} ignored {}", obj.id, pid, obj.term_signal);
                    Outcome::Failure
                }
            };
            Ok(finish_stop(obj, outcome))
        }
    }
}

pub fn reload(ctx: &ExecContext, obj: &mut ServiceObject) -> Result<Outcome, SpawnError> {
    let previous = obj.state.begin_reload();
    let result = reload_inner(ctx, obj);
    obj.state.end_reload(previous);
    result
}

fn reload_inner(ctx: &ExecContext, obj: &ServiceObject) -> Result<Outcome, SpawnError> {
    if let Some(signal) = obj.reload_signal {
        return Ok(send_reload_signal(obj, signal));
    }
    if let Some(command) = obj.reload_command.as_deref() {
        return Ok(run(ctx, obj, command, CommandKind::Reload)?.outcome);
    }
    log::error!("{}: no reload signal or command", obj.id);
    Ok(Outcome::Failure)
}

fn send_reload_signal(obj: &ServiceObject, signal: Signal) -> Outcome {
    let Some(pid) = resolve_pid(obj).filter(|&p| signalable(p)) else {
        log::error!("{}: no process to reload", obj.id);
        return Outcome::Failure;
    };
    match kill(Pid::from_raw(pid as i32), signal) {
        Ok(()) => Outcome::Success,
        Err(e) => {
            log::error!("{}: kill({}, {}) failed: {}", obj.id, pid, signal, e);
            Outcome::Failure
        }
    }
}
