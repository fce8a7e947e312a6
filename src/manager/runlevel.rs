//! Runlevel orchestration
//!
//! Walks the registry one priority level at a time, starting members of
//! the current runlevel and stopping what should not be running.

use super::context::BootMode;
use super::registry::ObjectRef;
use super::{Manager, ManagerError};
use crate::objects::ServiceObject;
use crate::outcome::Outcome;

/// Counts from one orchestrator pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub visited: usize,
    pub succeeded: usize,
    pub warned: usize,
    pub failed: usize,
    /// Worst outcome seen, or Failure when nothing was scheduled
    pub outcome: Outcome,
}

impl Default for RunSummary {
    fn default() -> Self {
        Self {
            visited: 0,
            succeeded: 0,
            warned: 0,
            failed: 0,
            outcome: Outcome::Success,
        }
    }
}

impl RunSummary {
    fn nothing_scheduled() -> Self {
        Self {
            outcome: Outcome::Failure,
            ..Self::default()
        }
    }

    fn record(&mut self, outcome: Outcome) {
        self.visited += 1;
        match outcome {
            Outcome::Success => self.succeeded += 1,
            Outcome::Warning => {
                self.warned += 1;
                if self.outcome == Outcome::Success {
                    self.outcome = Outcome::Warning;
                }
            }
            Outcome::Failure => {
                self.failed += 1;
                self.outcome = Outcome::Failure;
            }
        }
    }

    fn merge(&mut self, other: RunSummary) {
        self.visited += other.visited;
        self.succeeded += other.succeeded;
        self.warned += other.warned;
        self.failed += other.failed;
        self.outcome = match (self.outcome, other.outcome) {
            (Outcome::Failure, _) | (_, Outcome::Failure) => Outcome::Failure,
            (Outcome::Warning, _) | (_, Outcome::Warning) => Outcome::Warning,
            _ => Outcome::Success,
        };
    }
}

fn start_candidate(obj: &ServiceObject) -> bool {
    obj.is_enabled() && !obj.options.halt_only && !obj.started()
}

/// Halt-only objects are stopped even though they never started: their
/// stop command is the work they exist for.
fn stop_candidate(obj: &ServiceObject) -> bool {
    obj.is_enabled() && (obj.started() || obj.options.halt_only)
}

impl Manager {
    /// Start (`starting`) or stop every eligible object, lowest priority first
    pub fn run_all(&mut self, starting: bool) -> Result<RunSummary, ManagerError> {
        self.ctx.boot_mode = if starting {
            BootMode::Bootup
        } else {
            BootMode::Shutdown
        };
        let result = self.run_pass(starting);
        self.ctx.boot_mode = BootMode::Neutral;
        result
    }

    fn run_pass(&mut self, starting: bool) -> Result<RunSummary, ManagerError> {
        if starting && self.registry.highest_priority(true) == 0 {
            self.reporter.log("No objects are scheduled to start", true);
            return Ok(RunSummary::nothing_scheduled());
        }

        if starting {
            let runlevel = self.ctx.runlevel.clone();
            log::info!("Starting runlevel {}", runlevel);
            self.walk(Some(&runlevel), true, start_candidate)
        } else {
            log::info!("Stopping all objects");
            self.walk(None, false, stop_candidate)
        }
    }

    /// Move to `target`: stop what does not belong there, then start its members
    pub fn switch_runlevel(&mut self, target: &str) -> Result<RunSummary, ManagerError> {
        if !self.registry.has_runlevel_members(target) {
            self.reporter
                .log(&format!("Runlevel {} has no objects to start", target), true);
            return Err(ManagerError::EmptyRunlevel(target.to_string()));
        }

        self.reporter.log(&format!("Switching to runlevel {}", target), false);

        let mut summary = self.walk(None, false, |obj| {
            obj.started()
                && !obj.options.persistent
                && !obj.options.halt_only
                && !obj.in_runlevel(target)
        })?;

        self.ctx.runlevel = target.to_string();

        summary.merge(self.walk(Some(target), true, start_candidate)?);
        Ok(summary)
    }

    /// Objects a start or stop pass would visit, in order, without running anything
    pub fn plan(&self, starting: bool) -> Result<Vec<&ServiceObject>, ManagerError> {
        let runlevel = starting.then_some(self.ctx.runlevel.as_str());
        let filter: fn(&ServiceObject) -> bool = if starting {
            start_candidate
        } else {
            stop_candidate
        };

        let mut planned = Vec::new();
        for priority in 1..=self.registry.highest_priority(starting) {
            for r in self.registry.by_priority(runlevel, starting, priority) {
                let obj = self.registry.get(r?)?;
                if filter(obj) {
                    planned.push(obj);
                }
            }
        }
        Ok(planned)
    }

    /// Visit every priority level, acting on the entries `filter` accepts
    fn walk(
        &mut self,
        runlevel: Option<&str>,
        for_start: bool,
        filter: impl Fn(&ServiceObject) -> bool,
    ) -> Result<RunSummary, ManagerError> {
        let mut summary = RunSummary::default();

        for priority in 1..=self.registry.highest_priority(for_start) {
            let level: Vec<ObjectRef> = self
                .registry
                .by_priority(runlevel, for_start, priority)
                .collect::<Result<_, _>>()?;

            for r in level {
                if !filter(self.registry.get(r)?) {
                    continue;
                }
                let outcome = if for_start {
                    self.start_ref(r)?
                } else {
                    self.stop_ref(r)?
                };
                summary.record(outcome);
            }
        }

        log::debug!("Pass finished: {:?}", summary);
        Ok(summary)
    }
}
