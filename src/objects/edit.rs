//! In-place edits of object files
//!
//! Only the value of an existing `Key=value` line in the `[Object]` section
//! is replaced. Everything else in the file, comments and key spelling
//! included, is written back untouched.

use std::path::{Path, PathBuf};

use super::{parse_file, parse_object, ParseError, OBJECT_EXTENSION, OBJECT_SECTION};

#[derive(Debug, thiserror::Error)]
pub enum EditError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Object {0} has no {1} attribute")]
    MissingKey(String, String),

    #[error("Edit would break object {0}: {1}")]
    Invalid(String, ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Path of the file defining object `id`
pub fn object_path(dir: &Path, id: &str) -> PathBuf {
    dir.join(format!("{}.{}", id, OBJECT_EXTENSION))
}

/// Replace the value of `key` in the `[Object]` section of `content`.
/// Returns None when the section has no such key.
pub fn rewrite_value(content: &str, key: &str, value: &str) -> Option<String> {
    let wanted = key.trim().to_uppercase();
    let mut in_object = false;
    let mut replaced = false;
    let mut out = String::with_capacity(content.len() + value.len());

    for line in content.split_inclusive('\n') {
        let trimmed = line.trim();
        let comment = trimmed.starts_with('#') || trimmed.starts_with(';');
        if trimmed.starts_with('[') {
            in_object = trimmed == OBJECT_SECTION;
        } else if in_object && !replaced && !comment {
            if let Some((name, _)) = line.split_once('=') {
                if name.trim().to_uppercase() == wanted {
                    let ending = if line.ends_with('\n') { "\n" } else { "" };
                    out.push_str(name);
                    out.push('=');
                    out.push_str(value);
                    out.push_str(ending);
                    replaced = true;
                    continue;
                }
            }
        }
        out.push_str(line);
    }

    replaced.then_some(out)
}

/// Set `key` to `value` in the file of object `id` under `dir`
pub fn edit_object_value(dir: &Path, id: &str, key: &str, value: &str) -> Result<(), EditError> {
    let path = object_path(dir, id);
    if !path.is_file() {
        return Err(EditError::NotFound(id.to_string()));
    }

    let content = std::fs::read_to_string(&path)?;
    let edited = rewrite_value(&content, key, value)
        .ok_or_else(|| EditError::MissingKey(id.to_string(), key.to_string()))?;

    // Refuse to write something the loader would reject
    parse_file(&edited)
        .and_then(|parsed| parse_object(id, &parsed))
        .map_err(|e| EditError::Invalid(id.to_string(), e))?;

    std::fs::write(&path, edited)?;
    log::info!("{}: set {}={}", id, key, value);
    Ok(())
}
