//! Domain model for vmig.

pub mod connection;
pub mod error;
pub mod item;
pub mod options;
pub mod outcome;
pub mod run;
pub mod summary;
pub mod task;

pub use connection::{Connection, ConnectionRegistry};
pub use error::{MigrationError, Precondition, Result};
pub use item::{DiscoveredItem, ItemKind, ItemStatus, MigrationItem};
pub use options::MigrationOptions;
pub use outcome::{FailureCause, Outcome, UNPARSEABLE_RESULT};
pub use run::{RunProgress, RunReport, RunState};
pub use summary::{format_duration, RunSummary, RunVerdict};
pub use task::MigrationTask;
