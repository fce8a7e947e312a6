//! Console status reporting

use std::io::Write;

use crate::outcome::Outcome;

/// Where the manager reports progress
pub trait Reporter: Send {
    /// One finished step, e.g. "Starting OpenSSH server"
    fn status(&self, line: &str, outcome: Outcome);

    /// Free-form message
    fn log(&self, message: &str, is_error: bool);
}

/// Width of the column the outcome tag is aligned to
const STATUS_WIDTH: usize = 60;

/// Prints status lines to stdout and messages through `log`
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleReporter;

impl ConsoleReporter {
    pub fn format_status(line: &str, outcome: Outcome) -> String {
        let text = format!("{} ...", line);
        format!("{:<width$} {}", text, outcome.tag(), width = STATUS_WIDTH)
    }
}

impl Reporter for ConsoleReporter {
    fn status(&self, line: &str, outcome: Outcome) {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "{}", Self::format_status(line, outcome));
        let _ = out.flush();
    }

    fn log(&self, message: &str, is_error: bool) {
        if is_error {
            log::error!("{}", message);
        } else {
            log::info!("{}", message);
        }
    }
}

/// Foreground color for the boot banner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerColor {
    Black,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
}

impl BannerColor {
    pub fn parse(name: &str) -> Option<Self> {
        let color = match name.to_ascii_uppercase().as_str() {
            "BLACK" => Self::Black,
            "RED" => Self::Red,
            "GREEN" => Self::Green,
            "YELLOW" => Self::Yellow,
            "BLUE" => Self::Blue,
            "MAGENTA" => Self::Magenta,
            "CYAN" => Self::Cyan,
            "WHITE" => Self::White,
            _ => return None,
        };
        Some(color)
    }

    fn ansi_code(self) -> u8 {
        30 + self as u8
    }
}

/// Render the banner shown before the start pass
pub fn format_banner(text: &str, color: Option<BannerColor>) -> String {
    match color {
        Some(c) => format!("\x1b[{}m{}\x1b[0m", c.ansi_code(), text),
        None => text.to_string(),
    }
}
