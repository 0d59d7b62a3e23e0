//! Tracking session context
//!
//! One `Session` is built at startup and handed to every interceptor. It owns
//! the aggregator, the publisher and the live filter, and is the only path
//! from a hooked call to the shared snapshot.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, trace, warn};

use crate::config::{TrackerConfig, timing};
use crate::error::{Error, Result};
use crate::event::{DomainEvent, EventSink, Scope};
use crate::extract::{ContentFilter, TextExtractor, extract_packet, packet_hex};
use crate::hook::HookPoint;
use crate::memory::layout::text::MAX_MESSAGE_LEN;
use crate::memory::{BufferAccess, ReadMemory, read_c_string, read_msvc_string};
use crate::shared::{Publisher, SnapshotChannel};
use crate::stats::StatsAggregator;

/// Exit code of a control export (`ToggleOverlay`, `ResetStats`) called
/// before the session exists
pub const CONTROL_NOT_READY: u32 = u32::MAX;

/// Subscriber notified of every event after it has been folded in
pub type EventHandler = Box<dyn Fn(&DomainEvent) + Send + Sync>;

/// Pieces of the free-text diagnostic field
#[derive(Debug, Default)]
struct Diagnostics {
    hooks: Vec<String>,
    filter: Option<String>,
    combat: Option<String>,
}

impl Diagnostics {
    fn render(&self) -> String {
        self.hooks
            .iter()
            .chain(self.filter.iter())
            .chain(self.combat.iter())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

pub struct Session<C: SnapshotChannel, R: ReadMemory> {
    config: TrackerConfig,
    reader: R,
    text: TextExtractor,
    stats: Mutex<StatsAggregator>,
    publisher: Option<Publisher<C>>,
    handlers: RwLock<Vec<EventHandler>>,
    overlay: AtomicBool,
    // Lock order: `stats` before `diagnostics`.
    diagnostics: Mutex<Diagnostics>,
    filter: Mutex<ContentFilter>,
    filter_checks: AtomicU64,
    combat_calls: AtomicU64,
}

impl<C: SnapshotChannel, R: ReadMemory> Session<C, R> {
    /// Build a session. Without a publisher the session still tracks, it
    /// just has nobody to tell.
    pub fn new(config: TrackerConfig, reader: R, publisher: Option<Publisher<C>>) -> Result<Self> {
        let filter = ContentFilter::new(config.filter.clone());
        Ok(Self {
            text: TextExtractor::new()?,
            config,
            reader,
            stats: Mutex::new(StatsAggregator::new()),
            publisher,
            handlers: RwLock::new(Vec::new()),
            overlay: AtomicBool::new(true),
            diagnostics: Mutex::new(Diagnostics::default()),
            filter: Mutex::new(filter),
            filter_checks: AtomicU64::new(0),
            combat_calls: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    pub fn publisher(&self) -> Option<&Publisher<C>> {
        self.publisher.as_ref()
    }

    /// Copy of the current aggregate state
    pub fn stats(&self) -> StatsAggregator {
        self.stats.lock().clone()
    }

    pub fn overlay_visible(&self) -> bool {
        self.overlay.load(Ordering::Relaxed)
    }

    pub fn diagnostics(&self) -> String {
        self.diagnostics.lock().render()
    }

    pub fn subscribe(&self, handler: impl Fn(&DomainEvent) + Send + Sync + 'static) {
        self.handlers.write().push(Box::new(handler));
    }

    /// Note the outcome of installing one hook in the diagnostic field
    pub fn record_hook_status(&self, point: HookPoint, outcome: &Result<usize>) {
        let line = match outcome {
            Ok(target) => format!("{} hook OK at {:#x}", point, target),
            Err(e) => format!("{} hook FAILED: {}", point, e),
        };
        debug!("{}", line);
        self.diagnostics.lock().hooks.push(line);
        self.publish();
    }

    /// Structured path: one call of a `processPacket_*` handler
    pub fn on_packet(&self, point: HookPoint, argument: u64) {
        let layout = self.config.layouts.for_point(point);

        if point == HookPoint::CombatMsg {
            self.dump_combat(argument, layout.map(|l| l.access).unwrap_or_default());
        }

        match extract_packet(&self.reader, point, layout, argument) {
            Ok(events) => events.into_iter().for_each(|e| self.emit(e)),
            Err(e) => debug!("{} packet at {:#x} dropped: {}", point, argument, e),
        }
    }

    /// Text path: a chat line appended as a NUL-terminated narrow string
    pub fn on_chat_line(&self, address: u64) {
        match read_c_string(&self.reader, address, MAX_MESSAGE_LEN) {
            Ok(line) => self.on_chat_text(&line),
            Err(e) => debug!("Chat line at {:#x} dropped: {}", address, e),
        }
    }

    pub fn on_chat_text(&self, line: &str) {
        let events = self.text.extract(line);
        if !events.is_empty() {
            trace!("{:?} -> {} event(s)", line, events.len());
        }
        events.into_iter().for_each(|e| self.emit(e));
    }

    /// Whether an inbound chat message (an MSVC string object at `message`)
    /// should be hidden. Any failure answers `false`.
    pub fn should_block_message(&self, message: u64, linked_item: u64) -> bool {
        let checks = self.filter_checks.fetch_add(1, Ordering::Relaxed) + 1;
        self.refresh_filter();

        let filter = self.filter.lock();
        let enabled = filter.config().enabled;
        let tagged = linked_item != 0;
        // The tagged rule needs no text, so it holds even without a message.
        let decision = if !enabled {
            Ok(false)
        } else if tagged && filter.config().block_tagged {
            Ok(true)
        } else if message == 0 {
            Ok(false)
        } else {
            read_msvc_string(&self.reader, message).map(|text| filter.should_block(&text, tagged))
        };
        drop(filter);

        let (blocked, status) = match decision {
            Ok(blocked) => (
                blocked,
                format!(
                    "Filter: {}, Block: {}, Checks: {}",
                    if enabled { "ON" } else { "OFF" },
                    if blocked { "YES" } else { "NO" },
                    checks
                ),
            ),
            Err(e) => {
                debug!("Filter check failed open: {}", e);
                (false, format!("Filter: read failed, Checks: {}", checks))
            }
        };
        self.diagnostics.lock().filter = Some(status);
        blocked
    }

    /// Zero all counters and history, then republish
    pub fn reset(&self) {
        let mut stats = self.stats.lock();
        stats.reset();
        self.publish_locked(&stats);
        info!("Statistics reset");
    }

    /// Flip overlay visibility; returns the new state
    pub fn toggle_overlay(&self) -> bool {
        let visible = !self.overlay.fetch_xor(true, Ordering::Relaxed);
        info!("Overlay {}", if visible { "shown" } else { "hidden" });
        self.publish();
        visible
    }

    /// Publish one last time and mark the snapshot dead. The session keeps
    /// counting afterwards but nothing more reaches consumers as live.
    ///
    /// Waits for the statistics at most one publish timeout; if a hooked call
    /// still holds them, the marker is cleared without the final publish.
    pub fn shutdown(&self) {
        let timeout = Duration::from_millis(timing::PUBLISH_LOCK_TIMEOUT_MS);
        match self.stats.try_lock_for(timeout) {
            Some(stats) => {
                self.publish_locked(&stats);
                let local = stats.stats(Scope::Local);
                info!("Session closed: {} kill(s), {} exp", local.kills, local.experience);
            }
            None => warn!("Statistics busy at shutdown, skipping the final publish"),
        }
        if let Some(publisher) = &self.publisher {
            publisher.release();
        }
    }

    /// Shutdown at process exit. Every other thread is already gone and may
    /// have died holding a session lock, so only the liveness marker is
    /// cleared: no session lock, no publish, no logging.
    pub fn abandon(&self) {
        if let Some(publisher) = &self.publisher {
            publisher.release_silently();
        }
    }

    /// Republish the whole state
    pub fn publish(&self) {
        let stats = self.stats.lock();
        self.publish_locked(&stats);
    }

    fn publish_locked(&self, stats: &StatsAggregator) {
        let Some(publisher) = &self.publisher else {
            return;
        };
        let diagnostics = self.diagnostics.lock().render();
        match publisher.publish(stats, self.overlay_visible(), &diagnostics) {
            Ok(()) => {}
            Err(e) if e.is_transient() => {}
            Err(e) => warn!("Publish failed: {}", e),
        }
    }

    /// Pick up filter edits made by the consumer
    fn refresh_filter(&self) {
        let Some(publisher) = &self.publisher else {
            return;
        };
        let timeout = Duration::from_millis(timing::FILTER_REFRESH_TIMEOUT_MS);
        match publisher.read_filter(timeout) {
            Ok(latest) => {
                let mut filter = self.filter.lock();
                if *filter.config() != latest {
                    debug!("Filter changed: enabled={} terms={:?}", latest.enabled, latest.terms);
                    *filter = ContentFilter::new(latest);
                }
            }
            Err(Error::LockTimeout(_)) => trace!("Filter refresh skipped, using cached filter"),
            Err(e) => debug!("Filter refresh failed: {}", e),
        }
    }

    fn dump_combat(&self, argument: u64, access: BufferAccess) {
        let count = self.combat_calls.fetch_add(1, Ordering::Relaxed) + 1;
        let dump = if argument == 0 {
            format!("Cnt:{} (null packet)", count)
        } else {
            match packet_hex(&self.reader, argument, access) {
                Ok(hex) => format!("Cnt:{} {}", count, hex),
                Err(e) => format!("Cnt:{} unreadable: {}", count, e),
            }
        };
        self.diagnostics.lock().combat = Some(dump);
        self.publish();
    }
}

impl<C: SnapshotChannel, R: ReadMemory> EventSink for Session<C, R> {
    fn emit(&self, event: DomainEvent) {
        {
            let mut stats = self.stats.lock();
            if !stats.apply(&event) {
                return;
            }
            self.publish_locked(&stats);
        }
        for handler in self.handlers.read().iter() {
            handler(&event);
        }
    }
}
