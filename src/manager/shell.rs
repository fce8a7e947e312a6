//! Command interpreter selection
//!
//! Commands with shell syntax run through `<interpreter> -c`. Whether the
//! interpreter execs the last command in place ("collapses") decides if
//! the program we want to track has the spawned PID or the one after it.

use std::path::{Path, PathBuf};

/// Characters that need a shell to mean what the author intended
const METACHARACTERS: &[char] = &[
    '|', '&', ';', '<', '>', '(', ')', '$', '`', '\\', '"', '\'', '*', '?', '[', ']', '#', '~',
    '{', '}', '!', '=', '\n',
];

/// Interpreters in preference order: (binary name, collapses into the command)
const KNOWN_SHELLS: &[(&str, bool)] = &[
    ("bash", true),
    ("dash", true),
    ("zsh", true),
    ("csh", true),
    ("busybox", false),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpreter {
    pub path: PathBuf,
    /// argv[0]; busybox picks its applet from it
    pub argv0: String,
    pub collapses: bool,
}

impl Interpreter {
    /// Extra PID distance between the spawned process and the command
    pub fn pid_offset(&self) -> u32 {
        if self.collapses {
            0
        } else {
            1
        }
    }

    /// Pick the first known shell under `bin_dir`, or plain `sh`
    pub fn detect_in(bin_dir: &Path) -> Self {
        for (name, collapses) in KNOWN_SHELLS {
            let path = bin_dir.join(name);
            if is_usable(&path) {
                let argv0 = if *name == "busybox" { "sh" } else { name };
                log::debug!("Using {} as command interpreter", path.display());
                return Self {
                    path,
                    argv0: argv0.to_string(),
                    collapses: *collapses,
                };
            }
        }

        log::warn!(
            "No known shell found, falling back to sh. Install bash, dash, zsh, csh or busybox: \
             PID tracking depends on how the shell handles -c"
        );
        Self {
            path: bin_dir.join("sh"),
            argv0: "sh".to_string(),
            collapses: false,
        }
    }

    pub fn detect() -> Self {
        Self::detect_in(Path::new("/bin"))
    }
}

fn is_usable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// True if `command` uses shell syntax
pub fn needs_shell(command: &str) -> bool {
    command.contains(METACHARACTERS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn unique_test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "rlinit-shell-{}-{}",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn fake_binary(dir: &Path, name: &str) {
        let path = dir.join(name);
        std::fs::write(&path, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn test_needs_shell() {
        assert!(needs_shell("dmesg | tail"));
        assert!(needs_shell("echo $HOME"));
        assert!(needs_shell("a && b"));
        assert!(needs_shell("echo 'quoted'"));
        assert!(needs_shell("FOO=1 daemon"));
        assert!(!needs_shell("/usr/sbin/sshd -D"));
        assert!(!needs_shell("mount -o remount,rw /"));
    }

    #[test]
    fn test_prefers_bash() {
        let dir = unique_test_dir("bash");
        fake_binary(&dir, "busybox");
        fake_binary(&dir, "dash");
        fake_binary(&dir, "bash");
        let sh = Interpreter::detect_in(&dir);
        assert_eq!(sh.path, dir.join("bash"));
        assert!(sh.collapses);
        assert_eq!(sh.pid_offset(), 0);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_busybox_does_not_collapse() {
        let dir = unique_test_dir("busybox");
        fake_binary(&dir, "busybox");
        let sh = Interpreter::detect_in(&dir);
        assert_eq!(sh.argv0, "sh");
        assert_eq!(sh.pid_offset(), 1);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_non_executable_skipped() {
        let dir = unique_test_dir("noexec");
        std::fs::write(dir.join("bash"), "").unwrap();
        fake_binary(&dir, "zsh");
        let sh = Interpreter::detect_in(&dir);
        assert_eq!(sh.path, dir.join("zsh"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_fallback_sh() {
        let dir = unique_test_dir("empty");
        let sh = Interpreter::detect_in(&dir);
        assert_eq!(sh.path, dir.join("sh"));
        assert!(!sh.collapses);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
