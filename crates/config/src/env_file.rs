//! `.env`-style override file parsing
//!
//! One `KEY=VALUE` assignment per line. Blank lines and `#` comment lines are
//! ignored, a trailing ` #` or ` //` comment is cut off, an optional
//! `export ` prefix is dropped and one pair of surrounding quotes is removed
//! from the value.

use tracing::{debug, trace};

use crate::keys::is_allowed;

/// Parse a single override line into a raw `(key, value)` pair
///
/// Returns `None` for blank lines, comment lines and lines without an `=`
/// separator. The allow-list is not consulted here.
pub fn parse_override_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let line = strip_trailing_comment(line).trim();
    let line = match line.strip_prefix("export ") {
        Some(rest) => rest.trim(),
        None => line,
    };

    let (key, value) = line.split_once('=')?;
    Some((key.trim().to_string(), strip_quotes(value.trim()).to_string()))
}

/// Parse override file contents, keeping only allow-listed assignments
///
/// Later lines win over earlier ones when the same key repeats; the returned
/// pairs are in file order so applying them sequentially gives that result.
pub fn parse_override_file(content: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();

    for (index, raw) in content.lines().enumerate() {
        let line_no = index + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        match parse_override_line(trimmed) {
            Some((key, value)) if is_allowed(&key) => {
                trace!(line = line_no, key = %key, "Accepted override");
                pairs.push((key, value));
            }
            Some((key, _)) => {
                debug!(line = line_no, key = %key, "Ignoring override for unrecognized key");
            }
            None => {
                debug!(line = line_no, "Skipping malformed override line");
            }
        }
    }

    pairs
}

fn strip_trailing_comment(line: &str) -> &str {
    let line = line.split(" #").next().unwrap_or(line);
    line.split(" //").next().unwrap_or(line)
}

fn strip_quotes(value: &str) -> &str {
    let value = value
        .strip_prefix(['"', '\''])
        .unwrap_or(value);
    value.strip_suffix(['"', '\'']).unwrap_or(value)
}
