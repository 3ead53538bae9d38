//! Normalizes raw operation output into an [`Outcome`].
//!
//! Scripts report results inconsistently: a bare `Success`, a
//! `Failure: <reason>` line, a JSON object with a `success` flag, or
//! free-form text containing a marker. Rules are applied in order:
//!
//! 1. trimmed text equals the success sentinel → `Success`
//! 2. trimmed text starts with the failure sentinel → `Failure(remainder)`
//! 3. trimmed text starts with the skip sentinel → `Skipped(remainder)`
//! 4. text is a JSON object with `skipped`/`success` flags → as reported
//! 5. text contains the embedded success marker → `Success`,
//!    otherwise `Failure("unparseable result")`
//!
//! Failure reasons are bucketed into a [`FailureCause`] by case-insensitive
//! substring match. Buckets are configuration, not protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{FailureCause, Outcome};

/// Fragments that map a failure reason to a cause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureBucket {
    pub cause: FailureCause,
    pub fragments: Vec<String>,
}

impl FailureBucket {
    pub fn new(cause: FailureCause, fragments: &[&str]) -> Self {
        Self {
            cause,
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
        }
    }
}

/// Sentinels and buckets used by [`ResultClassifier`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub success_sentinel: String,
    pub failure_prefix: String,
    pub skip_prefix: String,
    pub success_marker: String,
    /// Checked in order; first match wins.
    pub buckets: Vec<FailureBucket>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            success_sentinel: "Success".to_string(),
            failure_prefix: "Failure:".to_string(),
            skip_prefix: "Skipped:".to_string(),
            success_marker: "SUCCESS".to_string(),
            buckets: vec![
                FailureBucket::new(
                    FailureCause::Network,
                    &[
                        "unreachable",
                        "could not connect",
                        "could not resolve",
                        "no such host",
                        "connection refused",
                        "actively refused",
                        "network",
                    ],
                ),
                FailureBucket::new(
                    FailureCause::Authentication,
                    &[
                        "authentication",
                        "unauthorized",
                        "incorrect user name or password",
                        "login",
                        "access denied",
                        "permission denied",
                    ],
                ),
                FailureBucket::new(FailureCause::Timeout, &["timed out", "timeout"]),
                FailureBucket::new(FailureCause::Certificate, &["certificate", "ssl", "tls"]),
            ],
        }
    }
}

const DEFAULT_ERROR: &str = "Unknown error";

/// Pure classifier over raw output strings.
#[derive(Debug, Clone)]
pub struct ResultClassifier {
    config: ClassifierConfig,
}

impl Default for ResultClassifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}

impl ResultClassifier {
    pub fn new(mut config: ClassifierConfig) -> Self {
        for bucket in &mut config.buckets {
            for fragment in &mut bucket.fragments {
                *fragment = fragment.to_lowercase();
            }
        }
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Classify `raw`. Never panics; unrecognized input is a failure.
    pub fn classify(&self, raw: &str) -> Outcome {
        let trimmed = raw.trim();
        let cfg = &self.config;

        if trimmed == cfg.success_sentinel {
            return Outcome::Success;
        }

        if let Some(rest) = strip_sentinel(trimmed, &cfg.failure_prefix) {
            return self.failure(rest);
        }

        if let Some(rest) = strip_sentinel(trimmed, &cfg.skip_prefix) {
            return Outcome::skipped(rest);
        }

        if let Some(outcome) = self.classify_structured(trimmed) {
            return outcome;
        }

        if !cfg.success_marker.is_empty() && trimmed.contains(&cfg.success_marker) {
            return Outcome::Success;
        }

        Outcome::unparseable()
    }

    /// Bucket a failure reason.
    pub fn cause_of(&self, reason: &str) -> FailureCause {
        let reason = reason.to_lowercase();
        self.config
            .buckets
            .iter()
            .find(|b| b.fragments.iter().any(|f| reason.contains(f.as_str())))
            .map(|b| b.cause)
            .unwrap_or(FailureCause::Other)
    }

    fn failure(&self, reason: &str) -> Outcome {
        Outcome::failure(reason, self.cause_of(reason))
    }

    fn classify_structured(&self, text: &str) -> Option<Outcome> {
        let object = match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => map,
            _ => return None,
        };

        if field(&object, &["skipped", "Skipped"]).and_then(Value::as_bool) == Some(true) {
            let reason = text_field(&object, &["reason", "Reason", "message", "Message"])
                .unwrap_or_else(|| "skipped".to_string());
            return Some(Outcome::skipped(reason));
        }

        match field(&object, &["success", "Success"]).and_then(Value::as_bool)? {
            true => Some(Outcome::Success),
            false => {
                let reason = text_field(&object, &["error", "Error", "message", "Message"])
                    .unwrap_or_else(|| DEFAULT_ERROR.to_string());
                Some(self.failure(&reason))
            }
        }
    }
}

fn strip_sentinel<'a>(text: &'a str, sentinel: &str) -> Option<&'a str> {
    if sentinel.is_empty() {
        return None;
    }
    text.strip_prefix(sentinel).map(str::trim)
}

fn field<'a>(object: &'a serde_json::Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| object.get(*k))
}

fn text_field(object: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    match field(object, keys)? {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
