//! Bounded, concurrency-safe activity log.
//!
//! [`ActivityLog`] is the buffer behind the live log view. Any number of
//! producers (the dispatcher, the orchestrator, front-ends) append
//! [`LogEntry`] values; consumers take consistent snapshots and filter them
//! on the read side with [`LogFilter`].
//!
//! A single mutex guards both the entries and the capacity, so an append and
//! the eviction it causes are never observed separately. Change
//! notifications go out on a `tokio::sync::broadcast` channel; nothing here
//! depends on a UI thread.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Default number of retained entries.
pub const DEFAULT_CAPACITY: usize = 1000;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Success,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Success => "SUCCESS",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    timestamp: DateTime<Utc>,
    level: LogLevel,
    source: String,
    script: String,
    session_id: String,
    message: String,
    rendered: String,
}

impl LogEntry {
    pub fn new(
        level: LogLevel,
        source: &str,
        script: &str,
        session_id: &str,
        message: impl Into<String>,
    ) -> Self {
        let timestamp = Utc::now();
        let message = message.into();
        let rendered = format!(
            "[{}] [{}] [{}] [{}] {}",
            timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            level,
            source,
            script,
            message.replace(['\r', '\n'], " ")
        );
        Self {
            timestamp,
            level,
            source: source.to_string(),
            script: script.to_string(),
            session_id: session_id.to_string(),
            message,
            rendered,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn script(&self) -> &str {
        &self.script
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Precomputed single-line rendering.
    pub fn rendered(&self) -> &str {
        &self.rendered
    }
}

/// Notification sent to subscribers after the buffer changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferEvent {
    Appended(LogEntry),
    Cleared,
    Resized { capacity: usize },
}

#[derive(Debug)]
struct Ring {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl Ring {
    fn evict_to(&mut self, limit: usize) {
        while self.entries.len() > limit {
            self.entries.pop_front();
        }
    }
}

/// Bounded FIFO buffer of [`LogEntry`] values.
#[derive(Debug)]
pub struct ActivityLog {
    ring: Mutex<Ring>,
    events: broadcast::Sender<BufferEvent>,
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ActivityLog {
    /// Create a buffer holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let capacity = capacity.max(1);
        Self {
            ring: Mutex::new(Ring {
                entries: VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY)),
                capacity,
            }),
            events,
        }
    }

    /// Append an entry, evicting the oldest when full.
    pub fn append(&self, entry: LogEntry) {
        {
            let mut ring = self.ring.lock().unwrap_or_else(PoisonError::into_inner);
            let limit = ring.capacity - 1;
            ring.evict_to(limit);
            ring.entries.push_back(entry.clone());
        }
        // No subscribers is fine.
        let _ = self.events.send(BufferEvent::Appended(entry));
    }

    /// The most recent `max` entries, oldest first.
    pub fn snapshot(&self, max: usize) -> Vec<LogEntry> {
        let ring = self.ring.lock().unwrap_or_else(PoisonError::into_inner);
        let skip = ring.entries.len().saturating_sub(max);
        ring.entries.iter().skip(skip).cloned().collect()
    }

    /// Snapshot of the most recent `max` entries matching `filter`.
    pub fn filtered(&self, filter: &LogFilter, max: usize) -> Vec<LogEntry> {
        let all = self.snapshot(usize::MAX);
        let mut matched = filter.apply(&all);
        let skip = matched.len().saturating_sub(max);
        matched.split_off(skip)
    }

    pub fn clear(&self) {
        self.ring
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .clear();
        let _ = self.events.send(BufferEvent::Cleared);
    }

    /// Change the capacity, trimming the oldest entries immediately.
    pub fn set_capacity(&self, capacity: usize) {
        let capacity = capacity.max(1);
        {
            let mut ring = self.ring.lock().unwrap_or_else(PoisonError::into_inner);
            ring.capacity = capacity;
            ring.evict_to(capacity);
        }
        let _ = self.events.send(BufferEvent::Resized { capacity });
    }

    pub fn capacity(&self) -> usize {
        self.ring
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .capacity
    }

    pub fn len(&self) -> usize {
        self.ring
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Receive change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<BufferEvent> {
        self.events.subscribe()
    }
}

/// Read-side filter over snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogFilter {
    /// Allowed levels; empty allows all.
    pub levels: Vec<LogLevel>,
    /// Case-insensitive substring over message, source, script and session.
    pub text: Option<String>,
}

impl LogFilter {
    pub fn levels(levels: &[LogLevel]) -> Self {
        Self {
            levels: levels.to_vec(),
            text: None,
        }
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    pub fn matches(&self, entry: &LogEntry) -> bool {
        if !self.levels.is_empty() && !self.levels.contains(&entry.level) {
            return false;
        }
        match self.text.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(needle) => {
                let needle = needle.to_lowercase();
                [
                    entry.message(),
                    entry.source(),
                    entry.script(),
                    entry.session_id(),
                ]
                .iter()
                .any(|field| field.to_lowercase().contains(&needle))
            }
        }
    }

    pub fn apply(&self, entries: &[LogEntry]) -> Vec<LogEntry> {
        entries.iter().filter(|e| self.matches(e)).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(n: usize) -> LogEntry {
        LogEntry::new(LogLevel::Info, "test", "none", "s1", format!("entry {n}"))
    }

    #[test]
    fn test_rendered_is_single_line() {
        let e = LogEntry::new(LogLevel::Warning, "Dispatcher", "Migrate-VM", "s1", "a\nb");
        assert!(!e.rendered().contains('\n'));
        assert!(e.rendered().contains("[WARNING] [Dispatcher] [Migrate-VM] a b"));
        assert_eq!(e.message(), "a\nb");
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let log = ActivityLog::new(3);
        for n in 1..=5 {
            log.append(entry(n));
        }
        let messages: Vec<String> = log
            .snapshot(10)
            .iter()
            .map(|e| e.message().to_string())
            .collect();
        assert_eq!(messages, vec!["entry 3", "entry 4", "entry 5"]);
    }

    #[test]
    fn test_snapshot_max_returns_most_recent() {
        let log = ActivityLog::new(10);
        for n in 1..=4 {
            log.append(entry(n));
        }
        let snap = log.snapshot(2);
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].message(), "entry 3");
        assert_eq!(snap[1].message(), "entry 4");
    }

    #[test]
    fn test_set_capacity_trims_immediately() {
        let log = ActivityLog::new(10);
        for n in 1..=8 {
            log.append(entry(n));
        }
        log.set_capacity(3);
        assert_eq!(log.len(), 3);
        assert_eq!(log.snapshot(10)[0].message(), "entry 6");

        log.append(entry(9));
        assert_eq!(log.len(), 3);
        assert_eq!(log.snapshot(10)[0].message(), "entry 7");
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let log = ActivityLog::new(0);
        log.append(entry(1));
        log.append(entry(2));
        assert_eq!(log.capacity(), 1);
        assert_eq!(log.snapshot(5)[0].message(), "entry 2");
    }

    #[test]
    fn test_filter_does_not_mutate() {
        let log = ActivityLog::new(10);
        log.append(LogEntry::new(LogLevel::Error, "Orchestrator", "Migrate-VM", "s1", "boom"));
        log.append(LogEntry::new(LogLevel::Info, "Dispatcher", "Get-Inventory", "s2", "ok"));

        let errors = log.filtered(&LogFilter::levels(&[LogLevel::Error]), 10);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message(), "boom");

        let by_text = log.filtered(&LogFilter::default().with_text("INVENTORY"), 10);
        assert_eq!(by_text.len(), 1);
        assert_eq!(by_text[0].source(), "Dispatcher");

        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_clear_and_notifications() {
        let log = ActivityLog::new(5);
        let mut rx = log.subscribe();
        log.append(entry(1));
        log.clear();

        assert!(log.is_empty());
        assert!(matches!(rx.try_recv(), Ok(BufferEvent::Appended(_))));
        assert_eq!(rx.try_recv().unwrap(), BufferEvent::Cleared);
    }
}
