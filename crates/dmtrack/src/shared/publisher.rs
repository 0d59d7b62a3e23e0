use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::event::{Scope, now_millis};
use crate::extract::FilterConfig;
use crate::shared::channel::SnapshotChannel;
use crate::shared::layout::{MAGIC, SharedSnapshot};
use crate::stats::StatsAggregator;

/// Producer side of the shared snapshot.
///
/// Owns the block's lifetime: initializes it on creation and clears the
/// liveness marker when dropped. Filter fields are written only at
/// initialization; afterwards they belong to the consumer.
pub struct Publisher<C: SnapshotChannel> {
    channel: C,
    timeout: Duration,
    session_start_ms: i64,
    released: AtomicBool,
}

impl<C: SnapshotChannel> Publisher<C> {
    /// Zero the block, then mark it live with the overlay shown and the
    /// default filter terms
    pub fn initialize(channel: C, filter: &FilterConfig, timeout: Duration) -> Result<Self> {
        let session_start_ms = now_millis();
        channel.with_locked(timeout, &mut |block| {
            *block = SharedSnapshot::zeroed();
            block.overlay_visible = 1;
            block.session_start_ms = session_start_ms;
            block.set_filter(filter);
            block.magic = MAGIC;
        })?;
        info!("Shared snapshot initialized (session start {})", session_start_ms);

        Ok(Self {
            channel,
            timeout,
            session_start_ms,
            released: AtomicBool::new(false),
        })
    }

    pub fn session_start_ms(&self) -> i64 {
        self.session_start_ms
    }

    /// Republish the whole state. Skipped (with `LockTimeout`) under contention.
    pub fn publish(&self, stats: &StatsAggregator, overlay: bool, diagnostics: &str) -> Result<()> {
        let result = self.channel.with_locked(self.timeout, &mut |block| {
            block.write_stats(stats.stats(Scope::Local), stats.stats(Scope::Group));
            block.write_loot(stats.recent_loot());
            block.write_kills(stats.recent_kills());
            block.overlay_visible = u8::from(overlay);
            block.set_diagnostics(diagnostics);
        });
        if let Err(e) = &result {
            debug!("Publish skipped: {}", e);
        }
        result
    }

    /// Current filter settings as last written by either side.
    ///
    /// Takes its own timeout so interceptors can use a shorter wait than
    /// publishing does.
    pub fn read_filter(&self, timeout: Duration) -> Result<FilterConfig> {
        let mut filter = FilterConfig::default();
        self.channel
            .with_locked(timeout, &mut |block| filter = block.filter())?;
        Ok(filter)
    }

    /// Overlay flag as currently stored in the block
    pub fn read_overlay(&self) -> Result<bool> {
        let mut visible = false;
        self.channel
            .with_locked(self.timeout, &mut |block| visible = block.overlay_visible != 0)?;
        Ok(visible)
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Clear the liveness marker so consumers stop trusting the block.
    ///
    /// Runs at most once; later publishes still write stats but the block
    /// stays marked dead.
    pub fn release(&self) {
        match self.clear_magic() {
            None => {}
            Some(Ok(())) => info!("Shared snapshot released"),
            Some(Err(e)) => warn!("Could not clear snapshot liveness marker: {}", e),
        }
    }

    /// `release` without logging, for process exit: the log writer may be
    /// owned by a thread that no longer exists. Returns whether the marker
    /// is cleared.
    pub fn release_silently(&self) -> bool {
        self.clear_magic().is_none_or(|result| result.is_ok())
    }

    /// `None` if already released
    fn clear_magic(&self) -> Option<Result<()>> {
        if self.released.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some(
            self.channel
                .with_locked(self.timeout, &mut |block| block.magic = 0),
        )
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl<C: SnapshotChannel> Drop for Publisher<C> {
    fn drop(&mut self) {
        self.release();
    }
}
