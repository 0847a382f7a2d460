//! JSON decoding with enough context to diagnose a misbehaving endpoint.

use crate::portal::errors::PortalError;

/// Width (in characters) of the body excerpt attached to a decode error.
const SNIPPET_CHARS: usize = 24;

/// Decode `body` as `T`, reporting the serde path, position and a snippet of
/// the offending line on failure.
pub fn parse_json<T: serde::de::DeserializeOwned>(
    body: &str,
    context: &str,
) -> Result<T, PortalError> {
    let jd = &mut serde_json::Deserializer::from_str(body);
    serde_path_to_error::deserialize(jd).map_err(|err| {
        let inner = err.inner();
        let (line, column) = (inner.line(), inner.column());
        let path = err.path().to_string();

        let msg = inner.to_string();
        let loc = format!(" at line {line} column {column}");
        let msg = msg.strip_suffix(&loc).unwrap_or(&msg);

        let mut detail = String::new();
        if !path.is_empty() && path != "." {
            detail.push_str(&format!("at path '{path}': "));
        }
        detail.push_str(&describe_mismatch(msg));
        detail.push_str(&format!(" (line {line} col {column})\n"));
        detail.push_str(&snippet(body, line, column));

        PortalError::format(context, anyhow::anyhow!(detail))
    })
}

/// Turn `invalid type: X, expected Y` into `expected Y, got X`.
fn describe_mismatch(msg: &str) -> String {
    if let Some(rest) = msg.strip_prefix("invalid type: ")
        && let Some((actual, expected)) = rest.split_once(", expected ")
    {
        return format!("expected {}, got {}", expected.trim(), actual);
    }
    msg.to_string()
}

/// Excerpt of `line` around `column` with a caret under the error position.
/// The window is measured in chars so it stays on UTF-8 boundaries.
fn snippet(body: &str, line: usize, column: usize) -> String {
    let target: Vec<char> = body
        .lines()
        .nth(line.saturating_sub(1))
        .unwrap_or("")
        .chars()
        .collect();
    if target.is_empty() {
        return "(empty line)".to_string();
    }

    // serde_json reports byte columns; clamp rather than remap.
    let error_idx = column.saturating_sub(1).min(target.len().saturating_sub(1));
    let half = SNIPPET_CHARS / 2;
    let start = error_idx.saturating_sub(half);
    let end = (error_idx + half).min(target.len());

    let slice: String = target[start..end].iter().collect();
    let caret = " ".repeat(error_idx - start) + "^";
    format!("...{slice}...\n   {caret}")
}
