//! Final shutdown sequence for PID 1
//!
//! Runs after the supervisor's stop pass has brought objects down:
//! 1. SIGTERM everything left, wait up to the grace period
//! 2. SIGKILL stragglers
//! 3. Sync, unmount, remount root read-only
//! 4. reboot(2)

use std::path::Path;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::mount::{mount, umount2, MntFlags, MsFlags};
use nix::sys::reboot::{reboot, RebootMode};
use nix::sys::signal::{kill, Signal};
use nix::unistd::{sync, Pid};
use tokio::time::sleep;

use super::reaper::reap_zombies;

/// How long processes get between SIGTERM and SIGKILL
pub const KILL_GRACE: Duration = Duration::from_secs(5);

/// Mount points that stay mounted until the kernel takes over
const KEEP_MOUNTED: &[&str] = &["/", "/proc", "/sys", "/dev", "/dev/pts", "/run"];

/// Type of shutdown to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownType {
    Poweroff,
    Reboot,
    Halt,
}

impl ShutdownType {
    fn to_reboot_mode(self) -> RebootMode {
        match self {
            ShutdownType::Poweroff => RebootMode::RB_POWER_OFF,
            ShutdownType::Reboot => RebootMode::RB_AUTOBOOT,
            ShutdownType::Halt => RebootMode::RB_HALT_SYSTEM,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ShutdownType::Poweroff => "poweroff",
            ShutdownType::Reboot => "reboot",
            ShutdownType::Halt => "halt",
        }
    }
}

/// Take the machine down. Never returns.
pub async fn shutdown(shutdown_type: ShutdownType) -> ! {
    log::info!("Initiating {}", shutdown_type.as_str());

    terminate_all_processes().await;

    log::info!("Syncing filesystems");
    sync();
    unmount_filesystems();
    sync();

    log::info!("Executing {}", shutdown_type.as_str());
    let Err(e) = reboot(shutdown_type.to_reboot_mode());
    log::error!("reboot() failed: {}", e);
    // PID 1 cannot exit
    loop {
        std::thread::sleep(Duration::from_secs(1));
    }
}

/// True while any process other than us can still be signalled
fn others_alive() -> bool {
    // kill(-1, 0) reaches every process we may signal except ourselves
    !matches!(kill(Pid::from_raw(-1), None), Err(Errno::ESRCH))
}

async fn terminate_all_processes() {
    log::info!("Sending SIGTERM to all processes");
    let _ = kill(Pid::from_raw(-1), Signal::SIGTERM);

    let deadline = Instant::now() + KILL_GRACE;
    while Instant::now() < deadline {
        reap_zombies();
        if !others_alive() {
            return;
        }
        sleep(Duration::from_millis(100)).await;
    }

    log::info!("Sending SIGKILL to remaining processes");
    let _ = kill(Pid::from_raw(-1), Signal::SIGKILL);
    sleep(Duration::from_millis(100)).await;
    reap_zombies();
}

/// Mount points from /proc/mounts, deepest last-mounted first
fn mount_points(mounts: &str) -> Vec<String> {
    let mut points: Vec<String> = mounts
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .filter(|mp| !KEEP_MOUNTED.contains(mp))
        .map(String::from)
        .collect();
    points.reverse();
    points
}

fn unmount_filesystems() {
    log::info!("Unmounting filesystems");

    let mounts = match std::fs::read_to_string("/proc/mounts") {
        Ok(m) => m,
        Err(e) => {
            log::error!("Cannot read /proc/mounts: {}", e);
            return;
        }
    };

    for mount_point in mount_points(&mounts) {
        let path = Path::new(&mount_point);
        log::debug!("Unmounting {}", mount_point);
        if let Err(e) = umount2(path, MntFlags::empty()) {
            log::debug!("Unmount of {} failed: {}, detaching", mount_point, e);
            if let Err(e) = umount2(path, MntFlags::MNT_DETACH) {
                log::warn!("Failed to unmount {}: {}", mount_point, e);
            }
        }
    }

    if let Err(e) = mount(
        None::<&str>,
        "/",
        None::<&str>,
        MsFlags::MS_REMOUNT | MsFlags::MS_RDONLY,
        None::<&str>,
    ) {
        log::warn!("Failed to remount / read-only: {}", e);
    }
}
