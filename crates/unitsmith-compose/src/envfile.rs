//! Env file reading.

use std::collections::BTreeMap;
use std::path::Path;

use unitsmith_common::error::{Result, UnitsmithError};

/// Parses dotenv text into variables.
///
/// Supports `#` comments, an optional `export ` prefix, and single- or
/// double-quoted values. Lines without `=` are ignored.
#[must_use]
pub fn parse(text: &str) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let _ = vars.insert(key.trim().to_owned(), unquote(value.trim()));
    }
    vars
}

fn unquote(value: &str) -> String {
    if let Some(inner) = value
        .strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
    {
        return inner.to_owned();
    }
    if let Some(inner) = value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
        return inner.replace("\\n", "\n").replace("\\\"", "\"");
    }
    // Unquoted values may carry a trailing comment.
    value
        .split_once(" #")
        .map_or(value, |(v, _)| v.trim_end())
        .to_owned()
}

/// Reads and parses the env file at `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn read(path: &Path) -> Result<BTreeMap<String, String>> {
    let text = std::fs::read_to_string(path).map_err(|e| UnitsmithError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let vars = parse(&text);
    tracing::debug!(path = %path.display(), vars = vars.len(), "read env file");
    Ok(vars)
}
