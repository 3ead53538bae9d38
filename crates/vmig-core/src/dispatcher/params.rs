//! Parameter maps and their two wire encodings.

use std::collections::BTreeMap;

use serde_json::Value;

/// Ordered string-keyed parameter map.
pub type Parameters = BTreeMap<String, Value>;

const SENSITIVE_FRAGMENTS: [&str; 4] = ["password", "secret", "credential", "token"];

const REDACTED: &str = "***";

const DESCRIBE_VALUE_CHARS: usize = 60;

/// Whether a parameter name carries a secret.
pub fn is_sensitive(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    SENSITIVE_FRAGMENTS.iter().any(|f| name.contains(f))
}

/// Direct convention: `-Name value` pairs.
///
/// `true` becomes a bare switch, `false` and `null` are omitted, strings and
/// numbers are passed verbatim and nested values as compact JSON.
pub fn to_direct_args(params: &Parameters) -> Vec<String> {
    let mut args = Vec::with_capacity(params.len() * 2);
    for (name, value) in params {
        match value {
            Value::Bool(true) => args.push(format!("-{name}")),
            Value::Bool(false) | Value::Null => {}
            Value::String(s) => {
                args.push(format!("-{name}"));
                args.push(s.clone());
            }
            Value::Number(n) => {
                args.push(format!("-{name}"));
                args.push(n.to_string());
            }
            nested => {
                args.push(format!("-{name}"));
                args.push(nested.to_string());
            }
        }
    }
    args
}

/// Optimized convention: one JSON object for stdin.
pub fn to_stdin_payload(params: &Parameters) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(params)
}

/// `Name=value` listing with sensitive values replaced.
pub fn describe(params: &Parameters) -> String {
    params
        .iter()
        .map(|(name, value)| {
            if is_sensitive(name) {
                format!("{name}={REDACTED}")
            } else {
                let rendered = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                format!("{name}={}", truncate(&rendered, DESCRIBE_VALUE_CHARS))
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Replace any sensitive parameter value occurring in `text`.
pub fn scrub(text: &str, params: &Parameters) -> String {
    let mut out = text.to_string();
    for (name, value) in params {
        if !is_sensitive(name) {
            continue;
        }
        if let Value::String(secret) = value {
            if !secret.is_empty() {
                out = out.replace(secret.as_str(), REDACTED);
            }
        }
    }
    out
}

/// First `max` characters of `text`, with an ellipsis when cut.
pub fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
