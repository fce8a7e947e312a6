//! Integration tests for starting and stopping real processes

use std::fs;
use std::path::PathBuf;
use std::process::{Child, Command};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use rlinit::manager::{is_alive, ExecContext, TaskHandle, PID_FILE_POLL, SIGNAL_STOP_POLL};
use rlinit::objects::{Enabled, ServiceObject, StopMode};
use rlinit::{ConsoleReporter, Manager, Outcome, Registry};

static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

fn unique_test_dir() -> PathBuf {
    let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = PathBuf::from(format!("/tmp/rlinit-lifecycle-test-{}-{}", std::process::id(), id));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn object(id: &str, start: &str) -> ServiceObject {
    let mut obj = ServiceObject::new(id);
    obj.description = format!("test object {}", id);
    obj.start_command = Some(start.to_string());
    obj.stop_mode = StopMode::None;
    obj.start_priority = 1;
    obj.stop_priority = 1;
    obj.runlevels = vec!["default".to_string()];
    obj.enabled = Enabled::Yes;
    obj
}

fn manager_with(ctx: ExecContext, objects: Vec<ServiceObject>) -> Manager {
    let registry = Registry::from_objects(objects).unwrap();
    Manager::new(registry, ctx, Box::new(ConsoleReporter))
}

fn manager(objects: Vec<ServiceObject>) -> Manager {
    manager_with(ExecContext::new("default"), objects)
}

/// A process that ignores SIGTERM until killed
fn stubborn_process() -> Child {
    let child = Command::new("sh")
        .args(["-c", "trap '' TERM; while :; do sleep 0.1; done"])
        .spawn()
        .unwrap();
    // Give the shell time to install the trap
    thread::sleep(Duration::from_millis(300));
    child
}

/// Keeps aborting whatever the manager is busy with until finished
struct Aborter {
    done: Arc<AtomicBool>,
    last_abort: Arc<Mutex<Option<Instant>>>,
    join: thread::JoinHandle<()>,
}

impl Aborter {
    fn spawn(handle: TaskHandle) -> Self {
        let done = Arc::new(AtomicBool::new(false));
        let last_abort = Arc::new(Mutex::new(None));
        let (flag, last) = (done.clone(), last_abort.clone());
        let join = thread::spawn(move || {
            while !flag.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(50));
                if handle.abort() {
                    *last.lock().unwrap() = Some(Instant::now());
                }
            }
        });
        Self {
            done,
            last_abort,
            join,
        }
    }

    /// Stop aborting and return when the last abort happened
    fn finish(self) -> Instant {
        self.done.store(true, Ordering::SeqCst);
        self.join.join().unwrap();
        let last = *self.last_abort.lock().unwrap();
        last.expect("nothing was aborted")
    }
}

#[test]
fn test_existing_pid_file_does_not_wait() {
    let dir = unique_test_dir();
    let mut child = Command::new("sleep").arg("30").spawn().unwrap();
    let pid_file = dir.join("daemon.pid");
    fs::write(&pid_file, format!("{}\n", child.id())).unwrap();

    let mut obj = object("daemon", "true");
    obj.options.has_pid_file = true;
    obj.stop_mode = StopMode::SignalByPidFile;
    obj.pid_file = Some(pid_file);
    let mut m = manager(vec![obj]);

    let begin = Instant::now();
    assert_eq!(m.start_object("daemon").unwrap(), Outcome::Success);
    assert!(begin.elapsed() < Duration::from_secs(1));
    assert_eq!(m.get_object("daemon").unwrap().current_pid(), child.id());

    assert_eq!(m.stop_object("daemon").unwrap(), Outcome::Success);
    let obj = m.get_object("daemon").unwrap();
    assert!(!obj.started());
    assert_eq!(obj.current_pid(), 0);

    // Already reaped by the stop wait
    let _ = child.wait();
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_missing_pid_file_times_out_with_warning() {
    let dir = unique_test_dir();
    let mut obj = object("late", "true");
    obj.options.has_pid_file = true;
    obj.pid_file = Some(dir.join("never.pid"));

    let mut ctx = ExecContext::new("default");
    ctx.pid_file_timeout = Duration::from_millis(300);
    let mut m = manager_with(ctx, vec![obj]);

    let begin = Instant::now();
    assert_eq!(m.start_object("late").unwrap(), Outcome::Warning);
    assert!(begin.elapsed() < Duration::from_secs(3));
    // A warning still counts as started
    assert!(m.get_object("late").unwrap().started());
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_abort_pid_file_wait() {
    let dir = unique_test_dir();
    let mut obj = object("slow", "true");
    obj.options.has_pid_file = true;
    obj.pid_file = Some(dir.join("slow.pid"));

    let mut ctx = ExecContext::new("default");
    ctx.pid_file_timeout = Duration::from_secs(60);
    let mut m = manager_with(ctx, vec![obj]);

    let aborter = Aborter::spawn(m.task_handle());
    let outcome = m.start_object("slow").unwrap();
    let returned = Instant::now();
    let last_abort = aborter.finish();

    assert_eq!(outcome, Outcome::Warning);
    // Gives up within a few polling intervals of the abort
    assert!(returned.duration_since(last_abort) < PID_FILE_POLL * 4);
    assert!(!m.task_handle().is_busy());
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_stop_timeout_is_failure() {
    let dir = unique_test_dir();
    let mut child = stubborn_process();
    let pid_file = dir.join("stubborn.pid");
    fs::write(&pid_file, child.id().to_string()).unwrap();

    let mut obj = object("stubborn", "true");
    obj.stop_mode = StopMode::SignalByPidFile;
    obj.pid_file = Some(pid_file);
    obj.stop_timeout = Duration::from_millis(300);
    let mut m = manager(vec![obj]);

    assert_eq!(m.start_object("stubborn").unwrap(), Outcome::Success);
    let begin = Instant::now();
    assert_eq!(m.stop_object("stubborn").unwrap(), Outcome::Failure);
    assert!(begin.elapsed() < Duration::from_secs(3));
    assert!(is_alive(child.id()));
    // A failed stop leaves the object marked as started
    assert!(m.get_object("stubborn").unwrap().started());

    let _ = kill(Pid::from_raw(child.id() as i32), Signal::SIGKILL);
    let _ = child.wait();
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_abort_stop_wait() {
    let dir = unique_test_dir();
    let mut child = stubborn_process();
    let pid_file = dir.join("stubborn.pid");
    fs::write(&pid_file, child.id().to_string()).unwrap();

    let mut obj = object("stubborn", "true");
    obj.stop_mode = StopMode::SignalByPidFile;
    obj.pid_file = Some(pid_file);
    obj.stop_timeout = Duration::from_secs(60);
    let mut m = manager(vec![obj]);
    m.start_object("stubborn").unwrap();

    let aborter = Aborter::spawn(m.task_handle());
    let outcome = m.stop_object("stubborn").unwrap();
    let returned = Instant::now();
    let last_abort = aborter.finish();

    assert_eq!(outcome, Outcome::Warning);
    assert!(returned.duration_since(last_abort) < SIGNAL_STOP_POLL * 20);

    let _ = kill(Pid::from_raw(child.id() as i32), Signal::SIGKILL);
    let _ = child.wait();
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_stop_by_pid_without_tracked_pid() {
    let mut obj = object("nopid", "true");
    obj.stop_mode = StopMode::SignalByPid;
    let mut m = manager(vec![obj]);

    let begin = Instant::now();
    assert_eq!(m.stop_object("nopid").unwrap(), Outcome::Failure);
    assert!(begin.elapsed() < Duration::from_secs(1));
}

#[test]
fn test_command_stop() {
    let dir = unique_test_dir();
    let marker = dir.join("stopped");

    let mut obj = object("cmd", "true");
    obj.stop_mode = StopMode::Command;
    obj.stop_command = Some(format!("touch {}", marker.display()));
    let mut m = manager(vec![obj]);

    assert_eq!(m.start_object("cmd").unwrap(), Outcome::Success);
    assert_eq!(m.stop_object("cmd").unwrap(), Outcome::Success);
    assert!(marker.exists());
    assert!(!m.get_object("cmd").unwrap().started());
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_command_stop_waits_for_target() {
    let dir = unique_test_dir();
    let mut child = Command::new("sleep").arg("30").spawn().unwrap();
    let pid_file = dir.join("target.pid");
    fs::write(&pid_file, child.id().to_string()).unwrap();

    let mut obj = object("target", "true");
    obj.stop_mode = StopMode::Command;
    obj.stop_command = Some(format!("kill {}", child.id()));
    obj.options.force_shell = true;
    obj.pid_file = Some(pid_file);
    obj.stop_timeout = Duration::from_secs(10);
    let mut m = manager(vec![obj]);

    assert_eq!(m.start_object("target").unwrap(), Outcome::Success);
    let begin = Instant::now();
    assert_eq!(m.stop_object("target").unwrap(), Outcome::Success);
    assert!(begin.elapsed() < Duration::from_secs(3));
    assert!(!is_alive(child.id()));
    assert!(!m.get_object("target").unwrap().started());

    let _ = child.wait();
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_command_stop_target_survives() {
    let dir = unique_test_dir();
    let mut child = stubborn_process();
    let pid_file = dir.join("stubborn.pid");
    fs::write(&pid_file, child.id().to_string()).unwrap();

    let mut obj = object("stubborn", "true");
    obj.stop_mode = StopMode::Command;
    obj.stop_command = Some(format!("kill {}", child.id()));
    obj.options.force_shell = true;
    obj.pid_file = Some(pid_file);
    obj.stop_timeout = Duration::from_millis(300);
    let mut m = manager(vec![obj]);

    m.start_object("stubborn").unwrap();
    let begin = Instant::now();
    assert_eq!(m.stop_object("stubborn").unwrap(), Outcome::Warning);
    assert!(begin.elapsed() < Duration::from_secs(3));
    assert!(is_alive(child.id()));
    // The stop command itself worked, so the object counts as stopped
    assert!(!m.get_object("stubborn").unwrap().started());

    let _ = kill(Pid::from_raw(child.id() as i32), Signal::SIGKILL);
    let _ = child.wait();
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_no_stop_wait_returns_at_once() {
    let dir = unique_test_dir();
    let mut child = stubborn_process();
    let pid_file = dir.join("stubborn.pid");
    fs::write(&pid_file, child.id().to_string()).unwrap();

    let mut obj = object("stubborn", "true");
    obj.stop_mode = StopMode::SignalByPidFile;
    obj.pid_file = Some(pid_file);
    obj.stop_timeout = Duration::from_secs(60);
    obj.options.no_stop_wait = true;
    let mut m = manager(vec![obj]);

    m.start_object("stubborn").unwrap();
    let begin = Instant::now();
    assert_eq!(m.stop_object("stubborn").unwrap(), Outcome::Success);
    assert!(begin.elapsed() < Duration::from_secs(1));
    assert!(is_alive(child.id()));
    assert!(!m.get_object("stubborn").unwrap().started());

    let _ = kill(Pid::from_raw(child.id() as i32), Signal::SIGKILL);
    let _ = child.wait();
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_daemonized_start_tracks_program() {
    let mut obj = object("bg", "sleep 37");
    obj.options.daemonize = true;
    obj.stop_mode = StopMode::SignalByPid;
    let mut m = manager(vec![obj]);

    assert_eq!(m.start_object("bg").unwrap(), Outcome::Success);
    let pid = m.get_object("bg").unwrap().current_pid();
    assert_ne!(pid, 0);

    // The detached child may still be on its way to exec
    let deadline = Instant::now() + Duration::from_secs(3);
    let mut cmdline = String::new();
    while Instant::now() < deadline && !cmdline.contains("sleep") {
        cmdline = fs::read(format!("/proc/{}/cmdline", pid))
            .map(|raw| String::from_utf8_lossy(&raw).to_string())
            .unwrap_or_default();
        thread::sleep(Duration::from_millis(20));
    }
    assert!(cmdline.contains("sleep"), "pid {} is {:?}", pid, cmdline);

    assert_eq!(m.stop_object("bg").unwrap(), Outcome::Success);
    assert!(!is_alive(pid));
}

#[test]
fn test_abort_right_after_spawn_begins() {
    for i in 0..5 {
        let mut m = manager(vec![object("hang", "sleep 2")]);
        let handle = m.task_handle();
        let interrupter = thread::spawn(move || {
            while !handle.is_busy() {
                std::hint::spin_loop();
            }
            handle.interrupt()
        });

        let begin = Instant::now();
        let outcome = m.start_object("hang").unwrap();
        assert!(interrupter.join().unwrap());
        assert_eq!(outcome, Outcome::Warning, "iteration {}", i);
        assert!(begin.elapsed() < Duration::from_millis(1500), "iteration {}", i);
    }
}

#[test]
fn test_shell_pipeline_and_direct_exec() {
    let dir = unique_test_dir();
    let piped = dir.join("piped");
    let direct = dir.join("direct");

    let mut pipe_obj = object("pipe", &format!("echo hello | tr a-z A-Z > {}", piped.display()));
    pipe_obj.start_priority = 1;
    let mut direct_obj = object("direct", "echo direct");
    direct_obj.exec.stdout = Some(direct.clone());
    let mut missing = object("missing", "/nonexistent/rlinit-binary --flag");
    missing.start_priority = 2;

    let mut m = manager(vec![pipe_obj, direct_obj, missing]);
    assert_eq!(m.start_object("pipe").unwrap(), Outcome::Success);
    assert_eq!(fs::read_to_string(&piped).unwrap(), "HELLO\n");

    assert_eq!(m.start_object("direct").unwrap(), Outcome::Success);
    assert_eq!(fs::read_to_string(&direct).unwrap(), "direct\n");

    assert_eq!(m.start_object("missing").unwrap(), Outcome::Failure);
    assert!(!m.get_object("missing").unwrap().started());
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_reload_by_signal() {
    let mut child = Command::new("sleep").arg("30").spawn().unwrap();
    let dir = unique_test_dir();
    let pid_file = dir.join("reload.pid");
    fs::write(&pid_file, child.id().to_string()).unwrap();

    let mut obj = object("reload", "true");
    obj.stop_mode = StopMode::SignalByPidFile;
    obj.pid_file = Some(pid_file);
    obj.reload_signal = Some(Signal::SIGKILL);
    let mut m = manager(vec![obj]);
    m.start_object("reload").unwrap();

    assert_eq!(m.reload_object("reload").unwrap(), Outcome::Success);
    let status = child.wait().unwrap();
    assert!(!status.success());
    // Reload does not change the lifecycle state
    assert!(m.get_object("reload").unwrap().started());

    let mut bare = object("bare", "true");
    bare.stop_mode = StopMode::None;
    let mut m = manager(vec![bare]);
    assert_eq!(m.reload_object("bare").unwrap(), Outcome::Failure);
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_auto_restart_after_exit() {
    let mut obj = object("respawn", "sleep 30 &");
    obj.stop_mode = StopMode::SignalByPid;
    obj.options.auto_restart = true;
    let mut m = manager(vec![obj]);

    assert_eq!(m.start_object("respawn").unwrap(), Outcome::Success);
    let first = m.get_object("respawn").unwrap().current_pid();
    assert_ne!(first, 0);
    assert!(is_alive(first));

    // Simulate the reaper reporting the tracked process
    let _ = kill(Pid::from_raw(first as i32), Signal::SIGKILL);
    let restarted = m.handle_exits(&[first]).unwrap();
    assert_eq!(restarted, vec!["respawn".to_string()]);

    let second = m.get_object("respawn").unwrap().current_pid();
    assert_ne!(second, 0);
    assert_ne!(second, first);
    assert!(m.get_object("respawn").unwrap().started());

    // Stopping on purpose does not restart
    assert_eq!(m.stop_object("respawn").unwrap(), Outcome::Success);
    assert!(m.handle_exits(&[second]).unwrap().is_empty());
    assert!(m.get_object("respawn").unwrap().options.auto_restart);
}
