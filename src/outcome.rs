//! Tri-state result used by every supervisor operation
//!
//! `Warning` means the operation completed but something looked off
//! (timeout, missing PID file, prestart failure). It never blocks the
//! next orchestration step. `Failure` means the state change did not happen.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Success,
    Warning,
    Failure,
}

impl Outcome {
    /// Classify a decoded exit status
    ///
    /// 0 is success, 128 and anything outside 0..=255 are warnings,
    /// every other non-zero status is a failure.
    pub fn from_exit_code(code: i32) -> Self {
        match code {
            0 => Outcome::Success,
            128 => Outcome::Warning,
            c if !(0..=255).contains(&c) => Outcome::Warning,
            _ => Outcome::Failure,
        }
    }

    /// True for Success and Warning (the state change happened)
    pub fn completed(self) -> bool {
        !matches!(self, Outcome::Failure)
    }

    /// Downgrade a Success to Warning; other values are kept
    pub fn degrade(self) -> Self {
        match self {
            Outcome::Success => Outcome::Warning,
            other => other,
        }
    }

    /// Console tag for status lines
    pub fn tag(self) -> &'static str {
        match self {
            Outcome::Success => "[ OK ]",
            Outcome::Warning => "[WARN]",
            Outcome::Failure => "[FAIL]",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Warning => "warning",
            Outcome::Failure => "failure",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
