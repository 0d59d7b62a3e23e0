//! # dmtrack
//!
//! Core library for the in-process gameplay tracker.
//!
//! This crate provides:
//! - Hook target resolution via wildcard signature scanning
//! - A hook registry over a pluggable code patcher (`retour` on Windows)
//! - Event extraction from packet handlers and chat lines
//! - Running statistics with bounded recent history
//! - The fixed-layout shared snapshot used to talk to consumer processes

pub mod config;
pub mod error;
pub mod event;
pub mod extract;
pub mod hook;
pub mod memory;
pub mod prelude;
pub mod session;
pub mod shared;
pub mod signature;
pub mod stats;

pub use config::{
    ChannelConfig, HookTarget, ModuleConfig, PacketLayout, PacketLayouts, StartupConfig,
    TrackerConfig, TrackerConfigBuilder,
};
pub use error::{Error, Result};
pub use event::{DomainEvent, EventSink, ItemQuality, KillRecord, LootRecord, Scope, now_millis};
pub use extract::{ContentFilter, FilterConfig, TextExtractor};
#[cfg(target_os = "windows")]
pub use hook::DetourPatcher;
pub use hook::{CodePatcher, Forwarding, HookPoint, HookRegistry, HookState, OriginalSlot};
pub use memory::{LocalMemory, MockMemoryReader, ReadMemory};
pub use session::{CONTROL_NOT_READY, EventHandler, Session};
#[cfg(target_os = "windows")]
pub use shared::NamedChannel;
pub use shared::{
    Consumer, DisplayHistory, LocalChannel, PollOutcome, Publisher, SessionRates, SharedSnapshot,
    SnapshotChannel, SnapshotView,
};
pub use signature::{ModuleImage, PatternSpec, Resolution, find_module, resolve_target};
pub use stats::{AggregateStats, RecentHistory, StatsAggregator};
