//! PID file reading

use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum PidFileError {
    #[error("Cannot read PID file: {0}")]
    Io(#[from] std::io::Error),

    #[error("PID file is empty")]
    Empty,

    #[error("PID file contains non-numeric data: {0:?}")]
    NotNumeric(String),

    #[error("PID file names pid 0")]
    Zero,
}

/// Read a PID file. One trailing "\n" or "\r\n" is tolerated; anything
/// else that is not an ASCII digit makes the file malformed.
pub fn read_pid_file(path: &Path) -> Result<u32, PidFileError> {
    let content = std::fs::read_to_string(path)?;
    parse_pid(&content)
}

pub fn parse_pid(content: &str) -> Result<u32, PidFileError> {
    let body = content
        .strip_suffix("\r\n")
        .or_else(|| content.strip_suffix('\n'))
        .unwrap_or(content);

    if body.is_empty() {
        return Err(PidFileError::Empty);
    }
    if !body.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PidFileError::NotNumeric(body.to_string()));
    }

    // All digits, so the only parse failure left is overflow
    let pid: u32 = body
        .parse()
        .map_err(|_| PidFileError::NotNumeric(body.to_string()))?;
    if pid == 0 {
        return Err(PidFileError::Zero);
    }
    if pid > i32::MAX as u32 {
        return Err(PidFileError::NotNumeric(body.to_string()));
    }
    Ok(pid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_pid() {
        assert_eq!(parse_pid("1234").unwrap(), 1234);
    }

    #[test]
    fn test_trailing_newline() {
        assert_eq!(parse_pid("42\n").unwrap(), 42);
        assert_eq!(parse_pid("42\r\n").unwrap(), 42);
    }

    #[test]
    fn test_only_one_terminator() {
        assert!(matches!(parse_pid("42\n\n"), Err(PidFileError::NotNumeric(_))));
    }

    #[test]
    fn test_malformed() {
        assert!(matches!(parse_pid(""), Err(PidFileError::Empty)));
        assert!(matches!(parse_pid("\n"), Err(PidFileError::Empty)));
        assert!(matches!(parse_pid(" 42"), Err(PidFileError::NotNumeric(_))));
        assert!(matches!(parse_pid("-5"), Err(PidFileError::NotNumeric(_))));
        assert!(matches!(parse_pid("12ab"), Err(PidFileError::NotNumeric(_))));
        assert!(matches!(parse_pid("99999999999"), Err(PidFileError::NotNumeric(_))));
    }

    #[test]
    fn test_zero_rejected() {
        assert!(matches!(parse_pid("0\n"), Err(PidFileError::Zero)));
    }

    #[test]
    fn test_missing_file() {
        let result = read_pid_file(Path::new("/nonexistent/rlinit-test.pid"));
        assert!(matches!(result, Err(PidFileError::Io(_))));
    }
}
