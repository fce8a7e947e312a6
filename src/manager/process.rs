//! Process spawning
//!
//! Commands run one at a time: fork, set up the child, exec, then block in
//! `waitpid` until the child is gone. Everything the child touches is
//! built before `fork` so the child side only makes raw libc calls.

use std::ffi::{CString, OsStr};
use std::os::raw::c_char;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use nix::errno::Errno;
use nix::sys::signal::{kill, pthread_sigmask, SigSet, SigmaskHow, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};

use super::context::{ExecContext, TaskKind};
use super::identity::{lookup_identity, IdentityError};
use super::proc_table;
use super::shell::needs_shell;
use crate::objects::ServiceObject;
use crate::outcome::Outcome;

/// Highest signal number on Linux plus one
const NSIG: libc::c_int = 65;

/// Which of an object's commands is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Start,
    Stop,
    Prestart,
    Reload,
}

/// Result of one completed command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Spawned {
    /// Best guess at the PID of the program the command started (0 if none)
    pub pid: u32,
    /// PID returned by fork
    pub spawned_pid: u32,
    pub outcome: Outcome,
}

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("Failed to create a process: {0}")]
    Fork(nix::Error),

    #[error("Command for {0} is empty")]
    EmptyCommand(String),

    #[error("Command for {0} contains a NUL byte")]
    NulByte(String),

    #[error("Cannot resolve identity: {0}")]
    Identity(#[from] IdentityError),

    #[error("exec failed: {0}")]
    Exec(nix::Error),
}

/// Blocks every signal on the calling thread until dropped
pub struct SignalBlock {
    previous: SigSet,
}

impl SignalBlock {
    pub fn new() -> Result<Self, nix::Error> {
        let mut previous = SigSet::empty();
        pthread_sigmask(SigmaskHow::SIG_BLOCK, Some(&SigSet::all()), Some(&mut previous))?;
        Ok(Self { previous })
    }
}

impl Drop for SignalBlock {
    fn drop(&mut self) {
        if let Err(e) = pthread_sigmask(SigmaskHow::SIG_SETMASK, Some(&self.previous), None) {
            log::error!("Failed to restore signal mask: {}", e);
        }
    }
}

/// Everything the child needs, owned by the parent
struct Prepared {
    program: CString,
    argv: Vec<CString>,
    envp: Vec<CString>,
    workdir: Option<CString>,
    stdout: Option<CString>,
    stderr: Option<CString>,
    uid: libc::uid_t,
    gid: libc::gid_t,
    groups: Vec<libc::gid_t>,
    daemonize: bool,
    via_shell: bool,
}

fn cstring(bytes: &[u8], id: &str) -> Result<CString, SpawnError> {
    CString::new(bytes).map_err(|_| SpawnError::NulByte(id.to_string()))
}

fn cpath(path: Option<&Path>, id: &str) -> Result<Option<CString>, SpawnError> {
    path.map(|p| cstring(p.as_os_str().as_bytes(), id)).transpose()
}

fn prepare(
    ctx: &ExecContext,
    obj: &ServiceObject,
    command: &str,
    kind: CommandKind,
) -> Result<Prepared, SpawnError> {
    let id = obj.id.as_str();
    let command = command.trim();
    if command.is_empty() {
        return Err(SpawnError::EmptyCommand(id.to_string()));
    }

    let via_shell = obj.options.force_shell || needs_shell(command);
    let (program, argv) = if via_shell {
        let sh = ctx.interpreter();
        let program = cstring(sh.path.as_os_str().as_bytes(), id)?;
        let argv = vec![
            cstring(sh.argv0.as_bytes(), id)?,
            cstring(b"-c", id)?,
            cstring(command.as_bytes(), id)?,
        ];
        (program, argv)
    } else {
        let argv = command
            .split_whitespace()
            .map(|t| cstring(t.as_bytes(), id))
            .collect::<Result<Vec<_>, _>>()?;
        (argv[0].clone(), argv)
    };

    let mut env: Vec<(Vec<u8>, Vec<u8>)> = std::env::vars_os()
        .map(|(k, v)| (k.as_bytes().to_vec(), v.as_bytes().to_vec()))
        .collect();

    let (uid, gid, groups) = if obj.exec.user_id != 0 {
        let identity = lookup_identity(obj.exec.user_id, obj.exec.group_id)?;
        let exports: [(&str, &OsStr); 4] = [
            ("HOME", identity.home.as_os_str()),
            ("USER", OsStr::new(&identity.name)),
            ("LOGNAME", OsStr::new(&identity.name)),
            ("SHELL", identity.shell.as_os_str()),
        ];
        for (key, value) in exports {
            env.retain(|(k, _)| k.as_slice() != key.as_bytes());
            env.push((key.as_bytes().to_vec(), value.as_bytes().to_vec()));
        }
        (identity.uid, identity.gid, identity.groups)
    } else {
        (0, obj.exec.group_id, Vec::new())
    };

    let envp = env
        .into_iter()
        .map(|(mut k, v)| {
            k.push(b'=');
            k.extend_from_slice(&v);
            cstring(&k, id)
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Prepared {
        program,
        argv,
        envp,
        workdir: cpath(obj.exec.working_directory.as_deref(), id)?,
        stdout: cpath(obj.exec.stdout.as_deref(), id)?,
        stderr: cpath(obj.exec.stderr.as_deref(), id)?,
        uid,
        gid,
        groups,
        daemonize: kind == CommandKind::Start && obj.options.daemonize,
        via_shell,
    })
}

fn null_terminated(strings: &[CString]) -> Vec<*const c_char> {
    strings
        .iter()
        .map(|s| s.as_ptr())
        .chain(std::iter::once(std::ptr::null()))
        .collect()
}

/// Run one command of `obj` to completion
pub fn spawn(
    ctx: &ExecContext,
    obj: &ServiceObject,
    command: &str,
    kind: CommandKind,
) -> Result<Spawned, SpawnError> {
    let prepared = prepare(ctx, obj, command, kind)?;
    let argv = null_terminated(&prepared.argv);
    let envp = null_terminated(&prepared.envp);

    let task = ctx.task.begin(&obj.id, TaskKind::Spawn);

    let block = SignalBlock::new().map_err(SpawnError::Fork)?;
    // SAFETY: the child only calls async-signal-safe libc functions on
    // buffers prepared above, then execs or _exits.
    let child = match unsafe { fork() } {
        Ok(ForkResult::Child) => unsafe { child_exec(&prepared, &argv, &envp) },
        Ok(ForkResult::Parent { child }) => child,
        Err(e) => return Err(SpawnError::Fork(e)),
    };
    let spawned_pid = child.as_raw() as u32;
    task.set_pid(spawned_pid);
    drop(block);

    log::debug!("{}: spawned {:?} command as pid {}", obj.id, kind, spawned_pid);

    // An abort that landed before the pid was recorded could not signal it
    if task.cancelled() {
        log::warn!("{}: aborted while spawning, terminating pid {}", obj.id, spawned_pid);
        if let Err(e) = kill(child, Signal::SIGTERM) {
            log::warn!("Failed to signal pid {}: {}", spawned_pid, e);
        }
    }

    let outcome = wait_for_exit(child);
    drop(task);

    let pid = if kind == CommandKind::Start {
        let shell_offset = if prepared.via_shell {
            ctx.interpreter().pid_offset()
        } else {
            0
        };
        let estimate = estimate_pid(
            spawned_pid,
            shell_offset,
            obj.options.is_service,
            prepared.daemonize,
        );
        let corrected = proc_table::correct_pid(spawned_pid, estimate);
        if corrected != estimate {
            log::debug!("{}: corrected pid {} -> {}", obj.id, estimate, corrected);
        }
        corrected
    } else {
        spawned_pid
    };

    Ok(Spawned {
        pid,
        spawned_pid,
        outcome,
    })
}

/// Guess the PID of the program a start command leaves behind. Every layer
/// between us and it takes one PID slot.
pub(crate) fn estimate_pid(
    spawned: u32,
    shell_offset: u32,
    is_service: bool,
    daemonize: bool,
) -> u32 {
    spawned + shell_offset + u32::from(is_service) + u32::from(daemonize)
}

fn wait_for_exit(child: Pid) -> Outcome {
    loop {
        match waitpid(child, None) {
            Ok(WaitStatus::Exited(_, code)) => return Outcome::from_exit_code(code),
            Ok(WaitStatus::Signaled(_, sig, _)) => {
                log::warn!("pid {} was killed by {}", child, sig);
                return Outcome::Warning;
            }
            Ok(status) => {
                log::warn!("pid {}: unexpected wait status {:?}", child, status);
                return Outcome::Warning;
            }
            Err(Errno::EINTR) => continue,
            Err(e) => {
                log::warn!("waitpid({}) failed: {}", child, e);
                return Outcome::Warning;
            }
        }
    }
}

/// Replace the current process image with `command`. Only returns on failure.
pub fn exec_in_place(
    ctx: &ExecContext,
    obj: &ServiceObject,
    command: &str,
) -> SpawnError {
    let prepared = match prepare(ctx, obj, command, CommandKind::Start) {
        Ok(p) => p,
        Err(e) => return e,
    };
    let argv = null_terminated(&prepared.argv);
    let envp = null_terminated(&prepared.envp);

    log::info!("{}: replacing supervisor with {}", obj.id, command);
    // SAFETY: argv and envp are NULL-terminated arrays into live CStrings
    unsafe {
        libc::execvpe(prepared.program.as_ptr(), argv.as_ptr(), envp.as_ptr());
    }
    SpawnError::Exec(Errno::last())
}

/// Child side of `spawn`. Never returns.
unsafe fn child_exec(p: &Prepared, argv: &[*const c_char], envp: &[*const c_char]) -> ! {
    for sig in 1..NSIG {
        if sig != libc::SIGKILL && sig != libc::SIGSTOP {
            libc::signal(sig, libc::SIG_DFL);
        }
    }
    let mut empty: libc::sigset_t = std::mem::zeroed();
    libc::sigemptyset(&mut empty);
    libc::pthread_sigmask(libc::SIG_SETMASK, &empty, std::ptr::null_mut());

    if p.daemonize {
        match libc::fork() {
            -1 => libc::_exit(1),
            0 => {}
            _ => libc::_exit(0),
        }
    }

    if libc::setsid() < 0 {
        libc::_exit(1);
    }

    if let Some(dir) = &p.workdir {
        if libc::chdir(dir.as_ptr()) != 0 {
            libc::_exit(1);
        }
    }

    for (path, target) in [(&p.stdout, libc::STDOUT_FILENO), (&p.stderr, libc::STDERR_FILENO)] {
        if let Some(path) = path {
            let fd = libc::open(
                path.as_ptr(),
                libc::O_WRONLY | libc::O_CREAT | libc::O_APPEND,
                0o644 as libc::c_uint,
            );
            if fd < 0 || libc::dup2(fd, target) < 0 {
                libc::_exit(1);
            }
            if fd > libc::STDERR_FILENO {
                libc::close(fd);
            }
        }
    }

    if p.uid != 0 {
        if libc::setgroups(p.groups.len(), p.groups.as_ptr()) != 0
            || libc::setgid(p.gid) != 0
            || libc::setuid(p.uid) != 0
        {
            libc::_exit(1);
        }
    } else if p.gid != 0 && libc::setgid(p.gid) != 0 {
        libc::_exit(1);
    }

    libc::execvpe(p.program.as_ptr(), argv.as_ptr(), envp.as_ptr());
    libc::_exit(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{Enabled, StopMode};

    fn object(id: &str) -> ServiceObject {
        let mut obj = ServiceObject::new(id);
        obj.description = id.to_string();
        obj.stop_mode = StopMode::None;
        obj.enabled = Enabled::Yes;
        obj
    }

    #[test]
    fn test_direct_success() {
        let ctx = ExecContext::new("default");
        let res = spawn(&ctx, &object("t"), "true", CommandKind::Start).unwrap();
        assert_eq!(res.outcome, Outcome::Success);
        assert!(res.spawned_pid > 0);
        // `true` is gone and reaped, nothing to track
        assert_eq!(res.pid, 0);
    }

    #[test]
    fn test_pid_estimate_layers() {
        assert_eq!(estimate_pid(100, 0, false, false), 100);
        assert_eq!(estimate_pid(100, 1, false, false), 101);
        assert_eq!(estimate_pid(100, 0, true, false), 101);
        assert_eq!(estimate_pid(100, 0, false, true), 101);
        assert_eq!(estimate_pid(100, 1, true, true), 103);
    }

    #[test]
    fn test_direct_failure() {
        let ctx = ExecContext::new("default");
        let res = spawn(&ctx, &object("f"), "false", CommandKind::Stop).unwrap();
        assert_eq!(res.outcome, Outcome::Failure);
        assert_eq!(res.pid, res.spawned_pid);
    }

    #[test]
    fn test_exit_128_is_warning() {
        let ctx = ExecContext::new("default");
        let mut obj = object("w");
        obj.options.force_shell = true;
        let res = spawn(&ctx, &obj, "exit 128", CommandKind::Stop).unwrap();
        assert_eq!(res.outcome, Outcome::Warning);
    }

    #[test]
    fn test_missing_program_fails_in_child() {
        let ctx = ExecContext::new("default");
        let res = spawn(
            &ctx,
            &object("m"),
            "/nonexistent/rlinit-no-such-binary",
            CommandKind::Start,
        )
        .unwrap();
        assert_eq!(res.outcome, Outcome::Failure);
    }

    #[test]
    fn test_empty_command() {
        let ctx = ExecContext::new("default");
        let res = spawn(&ctx, &object("e"), "   ", CommandKind::Start);
        assert!(matches!(res, Err(SpawnError::EmptyCommand(_))));
    }

    #[test]
    fn test_shell_command_and_redirect() {
        let dir = std::env::temp_dir().join(format!("rlinit-spawn-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let out = dir.join("out.log");
        let _ = std::fs::remove_file(&out);

        let mut obj = object("r");
        obj.exec.stdout = Some(out.clone());
        obj.exec.working_directory = Some(dir.clone());
        let ctx = ExecContext::new("default");

        let res = spawn(&ctx, &obj, "echo one | tr a-z A-Z; pwd", CommandKind::Start).unwrap();
        assert_eq!(res.outcome, Outcome::Success);
        let res = spawn(&ctx, &obj, "echo two", CommandKind::Start).unwrap();
        assert_eq!(res.outcome, Outcome::Success);

        let content = std::fs::read_to_string(&out).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "ONE");
        assert_eq!(std::fs::canonicalize(lines[1]).unwrap(), std::fs::canonicalize(&dir).unwrap());
        assert_eq!(lines[2], "two");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_task_cleared_after_spawn() {
        let ctx = ExecContext::new("default");
        let handle = ctx.task_handle();
        spawn(&ctx, &object("c"), "true", CommandKind::Start).unwrap();
        assert!(!handle.is_busy());
        assert_eq!(handle.pid(), 0);
    }

    #[test]
    fn test_signal_block_restores_mask() {
        let before = SigSet::thread_get_mask().unwrap();
        {
            let _block = SignalBlock::new().unwrap();
            let during = SigSet::thread_get_mask().unwrap();
            assert!(during.contains(nix::sys::signal::Signal::SIGTERM));
        }
        let after = SigSet::thread_get_mask().unwrap();
        assert_eq!(
            before.contains(nix::sys::signal::Signal::SIGTERM),
            after.contains(nix::sys::signal::Signal::SIGTERM)
        );
    }
}
