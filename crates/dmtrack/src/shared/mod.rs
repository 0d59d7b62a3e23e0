//! Cross-process snapshot shared between the agent and its consumers
//!
//! The agent (producer) republishes the full state after every event; the
//! consumer polls a copy at a fixed rate. Only the filter fields are written
//! by both sides.

pub mod channel;
pub mod consumer;
pub mod layout;
pub mod publisher;
pub mod rates;
pub mod view;

#[cfg(target_os = "windows")]
pub use channel::NamedChannel;
pub use channel::{LocalChannel, SnapshotChannel};
pub use consumer::{Consumer, DISPLAY_CAPACITY, DisplayHistory, PollOutcome};
pub use layout::{MAGIC, SNAPSHOT_SIZE, SharedSnapshot};
pub use publisher::Publisher;
pub use rates::SessionRates;
pub use view::SnapshotView;
