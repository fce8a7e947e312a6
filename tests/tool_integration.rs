//! Tests for rlinit-tool against a scratch config dir

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::atomic::{AtomicU32, Ordering};

static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

fn unique_test_dir() -> PathBuf {
    let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = PathBuf::from(format!("/tmp/rlinit-tool-test-{}-{}", std::process::id(), id));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(dir.join("objects")).unwrap();
    dir
}

fn write_object(dir: &Path, id: &str, priority: u64, runlevels: &str, start: &str) {
    fs::write(
        dir.join("objects").join(format!("{}.object", id)),
        format!(
            "[Object]\nDescription=Object {id}\nStartCommand={start}\nStopCommand=NONE\nStartPriority={priority}\nRunlevels={runlevels}\nEnabled=true\n"
        ),
    )
    .unwrap();
}

fn tool(dir: &Path, args: &[&str]) -> (Output, String) {
    let output = Command::new(env!("CARGO_BIN_EXE_rlinit-tool"))
        .arg("--config-dir")
        .arg(dir)
        .args(args)
        .output()
        .unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    (output, stdout)
}

#[test]
fn test_check_and_list() {
    let dir = unique_test_dir();
    write_object(&dir, "net", 2, "default", "true");
    write_object(&dir, "fsck", 1, "default rescue", "true");

    let (output, stdout) = tool(&dir, &["check"]);
    assert!(output.status.success());
    assert!(stdout.contains("2 objects OK"));

    let (output, stdout) = tool(&dir, &["list", "--runlevel", "rescue"]);
    assert!(output.status.success());
    assert!(stdout.contains("fsck"));
    assert!(!stdout.contains("Object net"));
    assert!(stdout.contains("1 objects listed"));
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_boot_dry_run_order() {
    let dir = unique_test_dir();
    let marker = dir.join("ran");
    write_object(&dir, "b-late", 9, "default", &format!("touch {}", marker.display()));
    write_object(&dir, "a-early", 3, "default", "true");

    let (output, stdout) = tool(&dir, &["boot", "--dry-run"]);
    assert!(output.status.success());
    let early = stdout.find("a-early").unwrap();
    let late = stdout.find("b-late").unwrap();
    assert!(early < late);
    assert!(!marker.exists());

    let (output, stdout) = tool(&dir, &["boot"]);
    assert!(output.status.success());
    assert!(marker.exists());
    assert!(stdout.contains("2 started"));
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_start_failure_exit_code() {
    let dir = unique_test_dir();
    write_object(&dir, "bad", 1, "default", "false");

    let (output, stdout) = tool(&dir, &["start", "bad"]);
    assert!(!output.status.success());
    assert!(stdout.contains("[FAIL]"));

    let (output, _) = tool(&dir, &["start", "missing"]);
    assert!(!output.status.success());
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_boot_banner() {
    let dir = unique_test_dir();
    write_object(&dir, "a", 1, "default", "true");
    fs::write(
        dir.join("rlinit.conf"),
        "[Global]\nBootBannerText=Welcome to scratch\nBootBannerColor=cyan\n",
    )
    .unwrap();

    let (output, stdout) = tool(&dir, &["boot"]);
    assert!(output.status.success());
    let banner = stdout.find("\x1b[36mWelcome to scratch\x1b[0m").unwrap();
    assert!(banner < stdout.find("Starting Object a").unwrap());

    // No banner for a dry run
    let (_, stdout) = tool(&dir, &["boot", "--dry-run"]);
    assert!(!stdout.contains("Welcome"));
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_enable_disable_and_set() {
    let dir = unique_test_dir();
    write_object(&dir, "getty", 2, "default", "true");

    let (output, stdout) = tool(&dir, &["disable", "getty"]);
    assert!(output.status.success());
    assert!(stdout.contains("Disabled getty"));
    let content = fs::read_to_string(dir.join("objects/getty.object")).unwrap();
    assert!(content.contains("Enabled=false\n"));
    assert!(content.contains("Description=Object getty\n"));

    let (_, stdout) = tool(&dir, &["show", "getty"]);
    assert!(stdout.starts_with("○ getty"));

    let (output, _) = tool(&dir, &["enable", "getty"]);
    assert!(output.status.success());
    let (_, stdout) = tool(&dir, &["show", "getty"]);
    assert!(stdout.starts_with("● getty"));

    let (output, _) = tool(&dir, &["set", "getty", "startpriority", "7"]);
    assert!(output.status.success());
    let (_, stdout) = tool(&dir, &["show", "getty"]);
    assert!(stdout.contains("start=7"));

    // Unknown attribute and bad value are both refused
    let (output, _) = tool(&dir, &["set", "getty", "User", "root"]);
    assert!(!output.status.success());
    let (output, _) = tool(&dir, &["set", "getty", "StartPriority", "soon"]);
    assert!(!output.status.success());
    let (output, _) = tool(&dir, &["enable", "missing"]);
    assert!(!output.status.success());
    let _ = fs::remove_dir_all(&dir);
}
