//! Prelude module for convenient imports
//!
//! ```ignore
//! use dmtrack::prelude::*;
//! ```

// Configuration and errors
pub use crate::config::TrackerConfig;
pub use crate::error::{Error, Result};

// Events and statistics
pub use crate::event::{DomainEvent, EventSink, ItemQuality, Scope};
pub use crate::stats::{AggregateStats, StatsAggregator};

// Shared snapshot
pub use crate::shared::{Consumer, PollOutcome, Publisher, SharedSnapshot, SnapshotChannel};

// Session
pub use crate::session::Session;
