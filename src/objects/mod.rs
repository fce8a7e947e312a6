//! Object file loading
//!
//! One `<id>.object` file per managed object, each with a single
//! `[Object]` section. The loaded objects feed `Registry::from_objects`,
//! which checks the table as a whole.

mod edit;
mod object;
mod parser;

pub use edit::{edit_object_value, object_path, rewrite_value, EditError};
pub use object::*;
pub use parser::{
    list, parse_file, parse_object_file, single, ParseError, ParsedFile, ParsedSection,
};

use std::path::{Path, PathBuf};

use crate::manager::{resolve_group, resolve_user, Registry, RegistryError};

pub const OBJECT_SECTION: &str = "[Object]";
pub const OBJECT_EXTENSION: &str = "object";

const KNOWN_KEYS: &[&str] = &[
    "DESCRIPTION",
    "STARTCOMMAND",
    "STOPCOMMAND",
    "PRESTARTCOMMAND",
    "RELOADCOMMAND",
    "RELOADSIGNAL",
    "PIDFILE",
    "STARTPRIORITY",
    "STOPPRIORITY",
    "RUNLEVELS",
    "ENABLED",
    "PERSISTENT",
    "OPTIONS",
    "USER",
    "GROUP",
    "WORKINGDIRECTORY",
    "STDOUT",
    "STDERR",
    "STOPTIMEOUT",
    "TERMSIGNAL",
];

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("{}: {source}", .path.display())]
    File { path: PathBuf, source: ParseError },

    #[error("Bad object directory pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Cannot read object directory: {0}")]
    Glob(#[from] glob::GlobError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

fn bad(key: &'static str, value: &str) -> ParseError {
    ParseError::BadValue {
        key,
        value: value.to_string(),
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ParseError> {
    Enabled::parse(value)
        .map(Enabled::is_enabled)
        .ok_or_else(|| bad(key, value))
}

fn parse_priority(key: &'static str, value: &str) -> Result<u64, ParseError> {
    value.trim().parse().map_err(|_| bad(key, value))
}

/// Resolve the StopCommand value into a stop mode (and PID file path)
fn apply_stop_command(obj: &mut ServiceObject, value: &str) {
    let mut words = value.split_whitespace();
    let first = words.next().unwrap_or("");

    match StopMode::from_keyword(first) {
        Some(StopMode::SignalByPidFile) => {
            obj.stop_mode = StopMode::SignalByPidFile;
            let rest: Vec<&str> = words.collect();
            if !rest.is_empty() {
                obj.pid_file = Some(PathBuf::from(rest.join(" ")));
            }
        }
        Some(mode) if words.next().is_none() => obj.stop_mode = mode,
        _ => {
            obj.stop_mode = StopMode::Command;
            obj.stop_command = Some(value.to_string());
        }
    }
}

/// Convert parsed INI data into a typed ServiceObject
pub fn parse_object(id: &str, parsed: &ParsedFile) -> Result<ServiceObject, ParseError> {
    let section = parsed
        .get(OBJECT_SECTION)
        .ok_or(ParseError::MissingSection(OBJECT_SECTION))?;

    for key in section.keys() {
        if !KNOWN_KEYS.contains(&key.as_str()) {
            log::warn!("{}: ignoring unknown key {}", id, key);
        }
    }

    let mut obj = ServiceObject::new(id);

    if let Some(v) = single(section, "DESCRIPTION")? {
        obj.description = v.to_string();
    }
    obj.start_command = single(section, "STARTCOMMAND")?.map(String::from);
    obj.prestart_command = single(section, "PRESTARTCOMMAND")?.map(String::from);
    obj.reload_command = single(section, "RELOADCOMMAND")?.map(String::from);

    // Before STOPCOMMAND so "PIDFILE <path>" wins over a separate PIDFile key
    if let Some(v) = single(section, "PIDFILE")? {
        obj.pid_file = Some(PathBuf::from(v));
    }
    if let Some(v) = single(section, "STOPCOMMAND")? {
        apply_stop_command(&mut obj, v);
    }

    if let Some(v) = single(section, "RELOADSIGNAL")? {
        obj.reload_signal = Some(parse_signal(v).ok_or_else(|| bad("ReloadSignal", v))?);
    }
    if let Some(v) = single(section, "TERMSIGNAL")? {
        obj.term_signal = parse_signal(v).ok_or_else(|| bad("TermSignal", v))?;
    }
    if let Some(v) = single(section, "STOPTIMEOUT")? {
        obj.stop_timeout = parse_seconds(v).ok_or_else(|| bad("StopTimeout", v))?;
    }

    if let Some(v) = single(section, "STARTPRIORITY")? {
        obj.start_priority = parse_priority("StartPriority", v)?;
    }
    if let Some(v) = single(section, "STOPPRIORITY")? {
        obj.stop_priority = parse_priority("StopPriority", v)?;
    }
    obj.runlevels = list(section, "RUNLEVELS");

    if let Some(v) = single(section, "ENABLED")? {
        obj.enabled = Enabled::parse(v).ok_or_else(|| bad("Enabled", v))?;
    }

    for flag in list(section, "OPTIONS") {
        if !obj.options.set_flag(&flag) {
            return Err(bad("Options", &flag));
        }
    }
    if let Some(v) = single(section, "PERSISTENT")? {
        obj.options.persistent = parse_bool("Persistent", v)?;
    }

    if let Some(v) = single(section, "USER")? {
        obj.exec.user_id = resolve_user(v).ok_or_else(|| bad("User", v))?;
    }
    if let Some(v) = single(section, "GROUP")? {
        obj.exec.group_id = resolve_group(v).ok_or_else(|| bad("Group", v))?;
    }
    obj.exec.working_directory = single(section, "WORKINGDIRECTORY")?.map(PathBuf::from);
    obj.exec.stdout = single(section, "STDOUT")?.map(PathBuf::from);
    obj.exec.stderr = single(section, "STDERR")?.map(PathBuf::from);

    Ok(obj)
}

/// Load one object file; the id is the file stem
pub fn load_object_file(path: &Path) -> Result<ServiceObject, LoadError> {
    let wrap = |source| LoadError::File {
        path: path.to_path_buf(),
        source,
    };

    let id = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| wrap(ParseError::MissingValue("object id")))?;
    let parsed = parse_object_file(path).map_err(wrap)?;
    parse_object(id, &parsed).map_err(wrap)
}

/// Load every object file in `dir`, in file name order
pub fn load_objects(dir: &Path) -> Result<Vec<ServiceObject>, LoadError> {
    if !dir.is_dir() {
        log::warn!("Object directory {} does not exist", dir.display());
        return Ok(Vec::new());
    }

    let pattern = format!(
        "{}/*.{}",
        glob::Pattern::escape(&dir.to_string_lossy()),
        OBJECT_EXTENSION
    );

    let mut objects = Vec::new();
    for entry in glob::glob(&pattern)? {
        let path = entry?;
        log::debug!("Loading {}", path.display());
        objects.push(load_object_file(&path)?);
    }
    log::info!("Loaded {} objects from {}", objects.len(), dir.display());
    Ok(objects)
}

/// Load and integrity-check the object table
pub fn load_registry(dir: &Path) -> Result<Registry, LoadError> {
    Ok(Registry::from_objects(load_objects(dir)?)?)
}
