//! INI-style object file parser
//!
//! Sections map to key/value lists. Keys are case-insensitive (stored
//! uppercase). Values are kept verbatim except for the list keys, which
//! split on whitespace.

use std::collections::HashMap;
use std::path::Path;

/// Values of one section; the u32 keeps the order values appeared in
pub type ParsedSection = HashMap<String, Vec<(u32, String)>>;

/// Section name (including brackets) to its contents
pub type ParsedFile = HashMap<String, ParsedSection>;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Section '{0}' appears more than once")]
    DuplicateSection(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Missing section {0}")]
    MissingSection(&'static str),

    #[error("Missing value for {0}")]
    MissingValue(&'static str),

    #[error("Bad value '{value}' for {key}")]
    BadValue { key: &'static str, value: String },

    #[error("Setting '{0}' has too many values: {1:?}")]
    TooManyValues(String, Vec<String>),
}

/// Keys whose value is a whitespace separated list
const LIST_KEYS: &[&str] = &["RUNLEVELS", "OPTIONS"];

/// Parse object file content
pub fn parse_file(content: &str) -> Result<ParsedFile, ParseError> {
    let mut sections = HashMap::new();
    let lines: Vec<&str> = content.lines().map(|s| s.trim()).collect();

    let mut lines_iter = lines.iter().peekable();

    // Skip lines before the first section
    while lines_iter.peek().map_or(false, |l| !l.starts_with('[')) {
        lines_iter.next();
    }

    let Some(first_section) = lines_iter.next() else {
        return Ok(sections);
    };

    let mut current_section_name = first_section.to_string();
    let mut current_section_lines = Vec::new();

    for line in lines_iter {
        if line.starts_with('[') {
            if sections.contains_key(&current_section_name) {
                return Err(ParseError::DuplicateSection(current_section_name));
            }
            sections.insert(
                current_section_name.clone(),
                parse_section(&current_section_lines),
            );
            current_section_name = line.to_string();
            current_section_lines.clear();
        } else {
            current_section_lines.push(*line);
        }
    }

    if sections.contains_key(&current_section_name) {
        return Err(ParseError::DuplicateSection(current_section_name));
    }
    sections.insert(current_section_name, parse_section(&current_section_lines));

    Ok(sections)
}

fn parse_section(lines: &[&str]) -> ParsedSection {
    let mut entries: ParsedSection = HashMap::new();
    let mut entry_number = 0u32;

    for line in lines {
        if line.starts_with('#') || line.starts_with(';') || line.is_empty() {
            continue;
        }

        let Some(pos) = line.find('=') else {
            continue;
        };

        let (name, value) = line.split_at(pos);
        let value = value[1..].trim();
        let name = name.trim().to_uppercase();

        // Commands may contain commas, pipes and quotes: only list keys are split
        let values: Vec<String> = if LIST_KEYS.contains(&name.as_str()) {
            value.split_whitespace().map(|s| s.to_string()).collect()
        } else {
            vec![value.to_string()]
        };

        let vec = entries.entry(name).or_default();
        for v in values {
            if !v.is_empty() {
                vec.push((entry_number, v));
                entry_number += 1;
            }
        }
    }

    entries
}

/// Read and parse an object file from disk
pub fn parse_object_file(path: &Path) -> Result<ParsedFile, ParseError> {
    let content = std::fs::read_to_string(path)?;
    parse_file(&content)
}

/// Single value of a key, erroring when it was given more than once
pub fn single<'a>(section: &'a ParsedSection, key: &str) -> Result<Option<&'a str>, ParseError> {
    match section.get(key).map(|v| v.as_slice()) {
        None | Some([]) => Ok(None),
        Some([(_, value)]) => Ok(Some(value.as_str())),
        Some(values) => Err(ParseError::TooManyValues(
            key.to_string(),
            values.iter().map(|(_, v)| v.clone()).collect(),
        )),
    }
}

/// All values of a list key in the order they appeared
pub fn list(section: &ParsedSection, key: &str) -> Vec<String> {
    let mut values = section.get(key).cloned().unwrap_or_default();
    values.sort_by_key(|(order, _)| *order);
    values.into_iter().map(|(_, v)| v).collect()
}
