//! Global supervisor settings
//!
//! Read from the `[Global]` section of `<config-dir>/rlinit.conf`. A
//! missing file means defaults; command-line flags override afterwards.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::console::{format_banner, BannerColor};
use crate::manager::{ExecContext, DEFAULT_PID_FILE_TIMEOUT};
use crate::objects::{parse_object_file, parse_seconds, single, Enabled, LoadError, ParseError};

pub const DEFAULT_CONFIG_DIR: &str = "/etc/rlinit";
pub const CONFIG_FILE: &str = "rlinit.conf";
pub const GLOBAL_SECTION: &str = "[Global]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub config_dir: PathBuf,
    pub objects_dir: PathBuf,
    pub default_runlevel: String,
    pub rescue_runlevel: String,
    pub pid_file_timeout: Duration,
    pub disable_cad: bool,
    /// Text printed before the start pass, None when disabled
    pub banner_text: Option<String>,
    pub banner_color: Option<BannerColor>,
}

impl Default for Settings {
    fn default() -> Self {
        Self::with_config_dir(Path::new(DEFAULT_CONFIG_DIR))
    }
}

impl Settings {
    pub fn with_config_dir(dir: &Path) -> Self {
        Self {
            config_dir: dir.to_path_buf(),
            objects_dir: dir.join("objects"),
            default_runlevel: "default".to_string(),
            rescue_runlevel: "rescue".to_string(),
            pid_file_timeout: DEFAULT_PID_FILE_TIMEOUT,
            disable_cad: false,
            banner_text: None,
            banner_color: None,
        }
    }

    /// Read `<dir>/rlinit.conf`
    pub fn load(dir: &Path) -> Result<Self, LoadError> {
        let mut settings = Self::with_config_dir(dir);
        let path = dir.join(CONFIG_FILE);
        if !path.exists() {
            log::debug!("{} not found, using defaults", path.display());
            return Ok(settings);
        }

        let wrap = |source| LoadError::File {
            path: path.clone(),
            source,
        };
        let parsed = parse_object_file(&path).map_err(wrap)?;
        if let Some(global) = parsed.get(GLOBAL_SECTION) {
            settings.apply(global).map_err(wrap)?;
        }
        Ok(settings)
    }

    fn apply(&mut self, global: &crate::objects::ParsedSection) -> Result<(), ParseError> {
        if let Some(v) = single(global, "DEFAULTRUNLEVEL")? {
            self.default_runlevel = v.to_string();
        }
        if let Some(v) = single(global, "RESCUERUNLEVEL")? {
            self.rescue_runlevel = v.to_string();
        }
        if let Some(v) = single(global, "OBJECTSDIRECTORY")? {
            self.objects_dir = self.config_dir.join(v);
        }
        if let Some(v) = single(global, "PIDFILETIMEOUT")? {
            self.pid_file_timeout = parse_seconds(v).ok_or_else(|| ParseError::BadValue {
                key: "PidFileTimeout",
                value: v.to_string(),
            })?;
        }
        if let Some(v) = single(global, "DISABLECAD")? {
            self.disable_cad = Enabled::parse(v)
                .map(Enabled::is_enabled)
                .ok_or_else(|| ParseError::BadValue {
                    key: "DisableCAD",
                    value: v.to_string(),
                })?;
        }
        if let Some(v) = single(global, "BOOTBANNERTEXT")? {
            self.banner_text = (v != "NONE").then(|| v.to_string());
        }
        if let Some(v) = single(global, "BOOTBANNERCOLOR")? {
            self.banner_color = if v == "NONE" {
                None
            } else {
                Some(BannerColor::parse(v).ok_or_else(|| ParseError::BadValue {
                    key: "BootBannerColor",
                    value: v.to_string(),
                })?)
            };
        }
        Ok(())
    }

    /// The boot banner as it should appear on the console
    pub fn banner(&self) -> Option<String> {
        self.banner_text
            .as_deref()
            .map(|text| format_banner(text, self.banner_color))
    }

    /// Fresh execution context in the default runlevel
    pub fn exec_context(&self) -> ExecContext {
        let mut ctx = ExecContext::new(self.default_runlevel.clone());
        ctx.pid_file_timeout = self.pid_file_timeout;
        ctx
    }
}
