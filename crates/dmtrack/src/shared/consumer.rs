use std::collections::VecDeque;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::timing;
use crate::error::{Error, Result};
use crate::extract::FilterConfig;
use crate::shared::channel::SnapshotChannel;
use crate::shared::layout::SharedSnapshot;
use crate::stats::HISTORY_CAPACITY;

/// Result of one consumer poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// A fresh copy of a live block
    Live(Box<SharedSnapshot>),
    /// The lock was busy; keep showing the previous frame
    Skipped,
    /// No producer (never started, or gone)
    Waiting,
}

/// Consumer side of the shared snapshot.
///
/// Never blocks on the producer: the lock wait is bounded, and any failure
/// to confirm liveness drops the connection and reports `Waiting` until a
/// later poll reconnects.
pub struct Consumer<C, F>
where
    C: SnapshotChannel,
    F: FnMut() -> Result<C>,
{
    connect: F,
    channel: Option<C>,
    timeout: Duration,
}

impl<C, F> Consumer<C, F>
where
    C: SnapshotChannel,
    F: FnMut() -> Result<C>,
{
    pub fn new(connect: F) -> Self {
        Self {
            connect,
            channel: None,
            timeout: Duration::from_millis(timing::CONSUMER_LOCK_TIMEOUT_MS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    pub fn poll(&mut self) -> PollOutcome {
        let timeout = self.timeout;
        let Some(channel) = self.ensure_connected() else {
            return PollOutcome::Waiting;
        };

        match channel.read(timeout) {
            Ok(block) if block.is_live() => PollOutcome::Live(Box::new(block)),
            Ok(_) => {
                self.disconnect("liveness marker missing");
                PollOutcome::Waiting
            }
            Err(e) if e.is_transient() => PollOutcome::Skipped,
            Err(e) => {
                self.disconnect(&e.to_string());
                PollOutcome::Waiting
            }
        }
    }

    /// Edit the filter stored in the block (last writer wins)
    pub fn update_filter(&mut self, edit: impl FnOnce(&mut FilterConfig)) -> Result<FilterConfig> {
        let mut edit = Some(edit);
        let mut outcome: Result<FilterConfig> =
            Err(Error::ChannelUnavailable("producer not running".to_string()));

        let timeout = self.timeout;
        let channel = self
            .ensure_connected()
            .ok_or_else(|| Error::ChannelUnavailable("producer not running".to_string()))?;
        channel.with_locked(timeout, &mut |block| {
            if !block.is_live() {
                return;
            }
            let mut filter = block.filter();
            if let Some(edit) = edit.take() {
                edit(&mut filter);
            }
            block.set_filter(&filter);
            outcome = Ok(block.filter());
        })?;
        outcome
    }

    fn ensure_connected(&mut self) -> Option<&C> {
        if self.channel.is_none() {
            match (self.connect)() {
                Ok(channel) => {
                    info!("Connected to shared snapshot");
                    self.channel = Some(channel);
                }
                Err(e) => {
                    debug!("Shared snapshot not available: {}", e);
                    return None;
                }
            }
        }
        self.channel.as_ref()
    }

    fn disconnect(&mut self, reason: &str) {
        if self.channel.take().is_some() {
            info!("Producer gone ({}), waiting to reconnect", reason);
        }
    }
}

/// Entries the display history keeps
pub const DISPLAY_CAPACITY: usize = 50;

/// Ring contents seen at the previous absorb
#[derive(Debug, Clone)]
struct RingMark<T> {
    records: Vec<T>,
    cursor: u32,
}

/// Longer history accumulated on the consumer side from successive snapshots.
///
/// Records are matched by their position in the producer's ring, never by
/// content, so identical records (same name, same millisecond) each get an
/// entry.
#[derive(Debug, Clone)]
pub struct DisplayHistory<T> {
    entries: VecDeque<T>,
    seen: Option<RingMark<T>>,
}

impl<T> Default for DisplayHistory<T> {
    fn default() -> Self {
        Self {
            entries: VecDeque::with_capacity(DISPLAY_CAPACITY),
            seen: None,
        }
    }
}

impl<T: Clone + PartialEq> DisplayHistory<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the records that arrived since the last call. `records` is a
    /// ring in snapshot order (oldest first) and `cursor` its write cursor.
    /// Returns how many were new.
    pub fn absorb(&mut self, records: &[T], cursor: u32) -> usize {
        let added = match &self.seen {
            None => records.len(),
            Some(mark) => arrivals(mark, records, cursor),
        };
        for record in &records[records.len() - added..] {
            if self.entries.len() == DISPLAY_CAPACITY {
                self.entries.pop_front();
            }
            self.entries.push_back(record.clone());
        }
        self.seen = Some(RingMark {
            records: records.to_vec(),
            cursor,
        });
        added
    }

    /// Newest first
    pub fn newest_first(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().rev()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop the shown entries; records already in the ring stay hidden.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Forget everything, including the ring position (producer restarted)
    pub fn reset(&mut self) {
        self.entries.clear();
        self.seen = None;
    }
}

/// How many of `current` were pushed after `previous` was taken.
///
/// The count comes from the ring length while it fills and from the cursor
/// once full; the overlap it implies must match, otherwise the ring was
/// reset or lapped and every record counts as new.
fn arrivals<T: PartialEq>(previous: &RingMark<T>, current: &[T], cursor: u32) -> usize {
    let capacity = HISTORY_CAPACITY;
    let before = previous.records.len();

    let pushed = if current.len() < before {
        return current.len();
    } else if current.len() < capacity {
        current.len() - before
    } else {
        let cap = capacity as u32;
        let mut delta = ((cursor % cap + cap - previous.cursor % cap) % cap) as usize;
        if delta < capacity - before {
            delta += capacity;
        }
        if delta == 0 && previous.records.as_slice() != current {
            delta = capacity;
        }
        delta
    };
    let pushed = pushed.min(current.len());

    let overlap = current.len() - pushed;
    if overlap > before || current[..overlap] != previous.records[before - overlap..] {
        return current.len();
    }
    pushed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::KillRecord;
    use crate::shared::channel::LocalChannel;
    use crate::shared::layout::MAGIC;

    const TIMEOUT: Duration = Duration::from_millis(10);

    fn live_channel() -> LocalChannel {
        let channel = LocalChannel::new();
        channel
            .with_locked(TIMEOUT, &mut |b| b.magic = MAGIC)
            .unwrap();
        channel
    }

    #[test]
    fn test_waiting_until_producer_appears() {
        let mut consumer = Consumer::new(|| -> Result<LocalChannel> {
            Err(Error::ChannelUnavailable("not created".into()))
        });
        assert_eq!(consumer.poll(), PollOutcome::Waiting);
        assert!(!consumer.is_connected());
    }

    #[test]
    fn test_uninitialized_block_is_waiting() {
        let channel = LocalChannel::new();
        let mut consumer = Consumer::new(move || Ok(channel.clone()));
        assert_eq!(consumer.poll(), PollOutcome::Waiting);
        assert!(!consumer.is_connected());
    }

    #[test]
    fn test_live_block_and_loss_of_liveness() {
        let channel = live_channel();
        let producer = channel.clone();
        let mut consumer = Consumer::new(move || Ok(channel.clone())).with_timeout(TIMEOUT);

        assert!(matches!(consumer.poll(), PollOutcome::Live(_)));

        producer.with_locked(TIMEOUT, &mut |b| b.magic = 0).unwrap();
        assert_eq!(consumer.poll(), PollOutcome::Waiting);

        producer.with_locked(TIMEOUT, &mut |b| b.magic = MAGIC).unwrap();
        assert!(matches!(consumer.poll(), PollOutcome::Live(_)));
    }

    #[test]
    fn test_contention_skips_frame() {
        let channel = live_channel();
        let holder = channel.clone();
        let mut consumer = Consumer::new(move || Ok(channel.clone())).with_timeout(TIMEOUT);
        assert!(matches!(consumer.poll(), PollOutcome::Live(_)));

        let _held = holder.hold();
        assert_eq!(consumer.poll(), PollOutcome::Skipped);
        assert!(consumer.is_connected());
    }

    #[test]
    fn test_update_filter_writes_back() {
        let channel = live_channel();
        let producer = channel.clone();
        let mut consumer = Consumer::new(move || Ok(channel.clone())).with_timeout(TIMEOUT);

        let filter = consumer
            .update_filter(|f| {
                f.enabled = true;
                f.terms = vec!["wts".into()];
            })
            .unwrap();
        assert!(filter.enabled);

        let block = producer.read(TIMEOUT).unwrap();
        assert_eq!(block.filter().terms, vec!["wts"]);
    }

    #[test]
    fn test_update_filter_requires_live_producer() {
        let channel = LocalChannel::new();
        let mut consumer = Consumer::new(move || Ok(channel.clone())).with_timeout(TIMEOUT);
        assert!(consumer.update_filter(|f| f.enabled = true).is_err());
    }

    fn kill(name: &str, timestamp: i64) -> KillRecord {
        KillRecord {
            name: name.to_string(),
            exp: 0,
            timestamp,
            group: false,
        }
    }

    /// Ring view after `pushed` arrivals, named by arrival index
    fn ring(pushed: usize) -> (Vec<KillRecord>, u32) {
        let first = pushed.saturating_sub(HISTORY_CAPACITY);
        let records = (first..pushed).map(|i| kill(&format!("Mob {}", i), i as i64)).collect();
        (records, (pushed % HISTORY_CAPACITY) as u32)
    }

    fn names(history: &DisplayHistory<KillRecord>) -> Vec<&str> {
        history.newest_first().map(|k| k.name.as_str()).collect()
    }

    #[test]
    fn test_display_history_absorbs_only_new() {
        let mut history = DisplayHistory::new();
        assert_eq!(history.absorb(&[kill("Wolf", 1), kill("Bear", 2)], 2), 2);
        assert_eq!(history.absorb(&[kill("Wolf", 1), kill("Bear", 2), kill("Wolf", 3)], 3), 1);
        assert_eq!(history.absorb(&[kill("Wolf", 1), kill("Bear", 2), kill("Wolf", 3)], 3), 0);
        assert_eq!(names(&history), vec!["Wolf", "Bear", "Wolf"]);
    }

    #[test]
    fn test_identical_records_are_kept_apart() {
        let mut history = DisplayHistory::new();
        let enemy = kill("Enemy", 1_000);

        assert_eq!(history.absorb(&[enemy.clone()], 1), 1);
        assert_eq!(history.absorb(&[enemy.clone(), enemy.clone(), enemy.clone()], 3), 2);
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn test_full_ring_uses_cursor() {
        let mut history = DisplayHistory::new();
        let (records, cursor) = ring(10);
        assert_eq!(history.absorb(&records, cursor), 10);

        let (records, cursor) = ring(13);
        assert_eq!(history.absorb(&records, cursor), 3);
        assert_eq!(names(&history)[0], "Mob 12");

        // A partly filled ring overtaken between polls
        let mut history = DisplayHistory::new();
        let (records, cursor) = ring(4);
        history.absorb(&records, cursor);
        let (records, cursor) = ring(12);
        assert_eq!(history.absorb(&records, cursor), 8);
    }

    #[test]
    fn test_full_ring_of_identical_records() {
        let mut history = DisplayHistory::new();
        let full = vec![kill("Enemy", 5); HISTORY_CAPACITY];

        assert_eq!(history.absorb(&full, 0), 10);
        assert_eq!(history.absorb(&full, 0), 0);
        assert_eq!(history.absorb(&full, 3), 3);
        assert_eq!(history.len(), 13);
    }

    #[test]
    fn test_clear_keeps_ring_position() {
        let mut history = DisplayHistory::new();
        let (records, cursor) = ring(5);
        history.absorb(&records, cursor);

        history.clear();
        assert_eq!(history.absorb(&records, cursor), 0);
        assert!(history.is_empty());

        let (records, cursor) = ring(6);
        assert_eq!(history.absorb(&records, cursor), 1);
        assert_eq!(names(&history), vec!["Mob 5"]);
    }

    #[test]
    fn test_producer_reset_counts_everything_new() {
        let mut history = DisplayHistory::new();
        let (records, cursor) = ring(5);
        history.absorb(&records, cursor);

        assert_eq!(history.absorb(&[], 0), 0);
        assert_eq!(history.absorb(&[kill("Rat", 99), kill("Rat", 100)], 2), 2);

        let mut history = DisplayHistory::new();
        history.absorb(&records, cursor);
        // Same length, different content: the ring was refilled
        let refilled: Vec<KillRecord> = (0..6).map(|i| kill("Bat", 500 + i)).collect();
        assert_eq!(history.absorb(&refilled, 6), 6);
    }

    #[test]
    fn test_display_history_is_bounded() {
        let mut history = DisplayHistory::new();
        for pushed in (10..=60).step_by(5) {
            let (records, cursor) = ring(pushed);
            history.absorb(&records, cursor);
        }
        assert_eq!(history.len(), DISPLAY_CAPACITY);
        assert_eq!(history.newest_first().next().map(|k| k.timestamp), Some(59));
        assert_eq!(history.newest_first().last().map(|k| k.timestamp), Some(10));
    }
}
