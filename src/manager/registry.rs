//! Service registry
//!
//! Owns every `ServiceObject` in load order. Objects are addressed by
//! `ObjectRef` handles so the orchestrator can collect a priority level
//! and then drive each entry mutably.

use crate::objects::{Enabled, ServiceObject, StopMode};

/// Handle to an entry, valid for the registry that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectRef(usize);

impl ObjectRef {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Two objects with id \"{0}\"")]
    DuplicateId(String),

    #[error("Object \"{0}\" has no description")]
    MissingDescription(String),

    #[error("Object \"{0}\" has neither a start nor a stop command")]
    NoCommands(String),

    #[error("Object \"{0}\" has no resolved stop mode")]
    InvalidStopMode(String),

    #[error("Object \"{0}\" belongs to no runlevel")]
    NoRunlevels(String),

    #[error("Object \"{0}\" does not say whether it is enabled")]
    EnabledUnset(String),

    #[error("Object \"{0}\" stops by command but has no stop command")]
    MissingStopCommand(String),

    #[error("Object \"{0}\" needs a PID file path")]
    MissingPidFile(String),

    #[error("Object table corrupt: {0}")]
    Corrupt(String),
}

#[derive(Debug, Default)]
pub struct Registry {
    objects: Vec<ServiceObject>,
}

impl Registry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a registry from loaded objects, running the integrity scan
    pub fn from_objects(objects: Vec<ServiceObject>) -> Result<Self, RegistryError> {
        for (i, obj) in objects.iter().enumerate() {
            check_integrity(obj)?;
            if objects[..i].iter().any(|other| other.id == obj.id) {
                return Err(RegistryError::DuplicateId(obj.id.clone()));
            }
        }

        let registry = Self { objects };
        registry.warn_priority_collisions();
        Ok(registry)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServiceObject> {
        self.objects.iter()
    }

    /// Every entry together with its handle
    pub fn entries(&self) -> impl Iterator<Item = (ObjectRef, &ServiceObject)> {
        self.objects.iter().enumerate().map(|(i, o)| (ObjectRef(i), o))
    }

    /// Exact id match
    pub fn lookup(&self, id: &str) -> Option<&ServiceObject> {
        self.objects.iter().find(|o| o.id == id)
    }

    pub fn find(&self, id: &str) -> Option<ObjectRef> {
        self.objects.iter().position(|o| o.id == id).map(ObjectRef)
    }

    pub fn get(&self, r: ObjectRef) -> Result<&ServiceObject, RegistryError> {
        self.objects
            .get(r.0)
            .ok_or_else(|| RegistryError::Corrupt(format!("stale handle {}", r.0)))
    }

    /// Runtime-state access for the lifecycle state machine
    pub(crate) fn get_mut(&mut self, r: ObjectRef) -> Result<&mut ServiceObject, RegistryError> {
        self.objects
            .get_mut(r.0)
            .ok_or_else(|| RegistryError::Corrupt(format!("stale handle {}", r.0)))
    }

    /// Highest non-zero start or stop priority, 0 if nothing is scheduled
    pub fn highest_priority(&self, for_start: bool) -> u64 {
        self.objects
            .iter()
            .map(|o| o.priority(for_start))
            .filter(|&p| p != 0)
            .max()
            .unwrap_or(0)
    }

    /// Lazily walk every entry with `priority`, optionally restricted to a runlevel
    pub fn by_priority<'a>(
        &'a self,
        runlevel: Option<&'a str>,
        for_start: bool,
        priority: u64,
    ) -> PriorityIter<'a> {
        PriorityIter {
            objects: &self.objects,
            runlevel,
            for_start,
            priority,
            next: 0,
            done: false,
        }
    }

    /// Next matching entry after `cursor` (first match when `cursor` is None).
    ///
    /// `Ok(None)` means the level is exhausted; `Err` means the table can no
    /// longer be trusted and the current pass must be abandoned.
    pub fn iterate_by_priority(
        &self,
        runlevel: Option<&str>,
        for_start: bool,
        priority: u64,
        cursor: Option<ObjectRef>,
    ) -> Result<Option<ObjectRef>, RegistryError> {
        let start = match cursor {
            Some(c) if c.0 >= self.objects.len() => {
                return Err(RegistryError::Corrupt(format!("cursor {} past end", c.0)));
            }
            Some(c) => c.0 + 1,
            None => 0,
        };

        let mut iter = self.by_priority(runlevel, for_start, priority);
        iter.next = start;
        iter.next().transpose()
    }

    /// True if `runlevel` has at least one enabled member with a start priority
    pub fn has_runlevel_members(&self, runlevel: &str) -> bool {
        self.objects
            .iter()
            .any(|o| o.is_enabled() && o.start_priority > 0 && o.in_runlevel(runlevel))
    }

    fn warn_priority_collisions(&self) {
        for (i, obj) in self.objects.iter().enumerate() {
            if !obj.is_enabled() {
                continue;
            }
            for other in self.objects[i + 1..].iter().filter(|o| o.is_enabled()) {
                let start_clash = obj.start_priority != 0 && obj.start_priority == other.start_priority;
                let stop_clash = obj.stop_priority != 0 && obj.stop_priority == other.stop_priority;
                if start_clash || stop_clash {
                    log::warn!(
                        "Objects \"{}\" and \"{}\" share a priority; they run in table order",
                        obj.id,
                        other.id
                    );
                }
            }
        }
    }
}

/// Iterator over the entries of one priority level
pub struct PriorityIter<'a> {
    objects: &'a [ServiceObject],
    runlevel: Option<&'a str>,
    for_start: bool,
    priority: u64,
    next: usize,
    done: bool,
}

impl Iterator for PriorityIter<'_> {
    type Item = Result<ObjectRef, RegistryError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        while let Some(obj) = self.objects.get(self.next) {
            let index = self.next;
            self.next += 1;

            if obj.priority(self.for_start) != self.priority {
                continue;
            }
            if let Some(rl) = self.runlevel {
                if !obj.in_runlevel(rl) {
                    continue;
                }
            }
            if obj.stop_mode == StopMode::Invalid || obj.enabled == Enabled::Unset {
                self.done = true;
                return Some(Err(RegistryError::Corrupt(format!(
                    "object \"{}\" lost its loaded state",
                    obj.id
                ))));
            }
            return Some(Ok(ObjectRef(index)));
        }

        self.done = true;
        None
    }
}

fn check_integrity(obj: &ServiceObject) -> Result<(), RegistryError> {
    let id = || obj.id.clone();

    if obj.description.is_empty() {
        return Err(RegistryError::MissingDescription(id()));
    }
    if obj.start_command.is_none() && obj.stop_command.is_none() {
        return Err(RegistryError::NoCommands(id()));
    }
    if obj.stop_mode == StopMode::Invalid {
        return Err(RegistryError::InvalidStopMode(id()));
    }
    if obj.runlevels.is_empty() {
        return Err(RegistryError::NoRunlevels(id()));
    }
    if obj.enabled == Enabled::Unset {
        return Err(RegistryError::EnabledUnset(id()));
    }
    if obj.stop_mode == StopMode::Command && obj.stop_command.is_none() {
        return Err(RegistryError::MissingStopCommand(id()));
    }
    let needs_pid_file = obj.stop_mode == StopMode::SignalByPidFile || obj.options.has_pid_file;
    if needs_pid_file && obj.pid_file.is_none() {
        return Err(RegistryError::MissingPidFile(id()));
    }
    Ok(())
}
