//! Process table inspection via /proc

use nix::sys::signal::kill;
use nix::unistd::Pid;

/// Fields of /proc/<pid>/stat we care about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcStat {
    pub pid: u32,
    pub state: char,
    pub ppid: u32,
    pub pgrp: u32,
    pub session: u32,
}

/// Parse the content of /proc/<pid>/stat. The command name may contain
/// spaces and parentheses, so fields are taken after the last ')'.
pub fn parse_stat(content: &str) -> Option<ProcStat> {
    let open = content.find('(')?;
    let close = content.rfind(')')?;
    let pid = content[..open].trim().parse().ok()?;

    let mut fields = content.get(close + 1..)?.split_whitespace();
    let state = fields.next()?.chars().next()?;
    let ppid = fields.next()?.parse().ok()?;
    let pgrp = fields.next()?.parse().ok()?;
    let session = fields.next()?.parse().ok()?;

    Some(ProcStat {
        pid,
        state,
        ppid,
        pgrp,
        session,
    })
}

pub fn read_stat(pid: u32) -> Option<ProcStat> {
    let content = std::fs::read_to_string(format!("/proc/{}/stat", pid)).ok()?;
    parse_stat(&content)
}

/// A process is alive if it can be signalled and is not a zombie
pub fn is_alive(pid: u32) -> bool {
    if pid == 0 || pid > i32::MAX as u32 {
        return false;
    }
    if kill(Pid::from_raw(pid as i32), None).is_err() {
        return false;
    }
    match read_stat(pid) {
        Some(stat) => stat.state != 'Z',
        // No procfs: trust kill(pid, 0)
        None => true,
    }
}

/// Every readable process in /proc
pub fn all_processes() -> Vec<ProcStat> {
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return Vec::new();
    };

    entries
        .flatten()
        .filter_map(|e| e.file_name().to_str().and_then(|n| n.parse::<u32>().ok()))
        .filter_map(read_stat)
        .collect()
}

/// Re-derive the PID of the program a spawn started.
///
/// The arithmetic estimate is only a guess (shells may or may not fork,
/// services fork an unknown number of times). Candidates are live
/// processes in the spawned PID's session or parented by the spawned PID
/// or the estimate. The estimate wins if it is a candidate, else the
/// lowest candidate, else the estimate if it is alive at all, else 0.
pub fn correct_pid(spawned: u32, estimate: u32) -> u32 {
    pick_pid(&all_processes(), spawned, estimate, is_alive)
}

fn pick_pid(
    table: &[ProcStat],
    spawned: u32,
    estimate: u32,
    alive: impl Fn(u32) -> bool,
) -> u32 {
    let related = |p: &ProcStat| {
        p.state != 'Z'
            && (p.session == spawned
                || p.ppid == spawned
                || (estimate != 0 && p.ppid == estimate)
                || p.pid == estimate)
    };

    let mut candidates: Vec<u32> = table.iter().filter(|p| related(p)).map(|p| p.pid).collect();
    candidates.sort_unstable();

    if estimate != 0 && candidates.contains(&estimate) {
        return estimate;
    }
    if let Some(&lowest) = candidates.first() {
        return lowest;
    }
    if alive(estimate) {
        estimate
    } else {
        0
    }
}
