//! Running statistics folded from domain events

use serde::{Deserialize, Serialize};
use strum::EnumCount;
use tracing::{debug, trace};

use crate::event::{DomainEvent, GOLD_ITEM_ID, ItemQuality, KillRecord, LootRecord, Scope};

/// Entries kept in the snapshot ring buffers
pub const HISTORY_CAPACITY: usize = 10;

/// Cumulative counters for one scope
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub kills: i64,
    pub loot_items: i64,
    pub gold_gained: i64,
    pub gold_spent: i64,
    pub experience: i64,
    pub damage: i64,
    pub loot_by_quality: [i64; ItemQuality::COUNT],
}

impl AggregateStats {
    pub fn loot_of(&self, quality: ItemQuality) -> i64 {
        self.loot_by_quality[quality.tier() as usize]
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Fixed-capacity ring keeping the most recent `N` entries.
///
/// Entry `k` (0-based arrival count) lives in slot `k % N`; the cursor is the
/// slot the next entry will overwrite.
#[derive(Debug, Clone)]
pub struct RecentHistory<T, const N: usize> {
    slots: [Option<T>; N],
    total: u64,
}

impl<T, const N: usize> Default for RecentHistory<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> RecentHistory<T, N> {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
            total: 0,
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn push(&mut self, item: T) {
        if N == 0 {
            return;
        }
        let slot = (self.total % N as u64) as usize;
        self.slots[slot] = Some(item);
        self.total += 1;
    }

    pub fn len(&self) -> usize {
        self.total.min(N as u64) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Entries ever pushed (including evicted ones)
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Slot the next push writes to
    pub fn cursor(&self) -> usize {
        if N == 0 { 0 } else { (self.total % N as u64) as usize }
    }

    /// Raw slots in storage order
    pub fn slots(&self) -> &[Option<T>; N] {
        &self.slots
    }

    /// Entries oldest first
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        let start = if self.total > N as u64 { self.cursor() } else { 0 };
        self.slots[start..]
            .iter()
            .chain(self.slots[..start].iter())
            .flatten()
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = None);
        self.total = 0;
    }
}

/// Single-writer fold of events into both scopes and the recent rings
#[derive(Debug, Clone, Default)]
pub struct StatsAggregator {
    local: AggregateStats,
    group: AggregateStats,
    loot: RecentHistory<LootRecord, HISTORY_CAPACITY>,
    kills: RecentHistory<KillRecord, HISTORY_CAPACITY>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self, scope: Scope) -> &AggregateStats {
        match scope {
            Scope::Local => &self.local,
            Scope::Group => &self.group,
        }
    }

    pub fn recent_loot(&self) -> &RecentHistory<LootRecord, HISTORY_CAPACITY> {
        &self.loot
    }

    pub fn recent_kills(&self) -> &RecentHistory<KillRecord, HISTORY_CAPACITY> {
        &self.kills
    }

    /// Fold one event. Returns `false` when the event changed nothing.
    pub fn apply(&mut self, event: &DomainEvent) -> bool {
        let group = event.is_group_scoped();
        let changed = match event {
            DomainEvent::Kill {
                name,
                exp,
                group: in_group,
                timestamp,
            } => {
                self.each_scope(group, |s| s.kills = s.kills.saturating_add(1));
                self.kills.push(KillRecord {
                    name: name.clone(),
                    exp: *exp,
                    timestamp: *timestamp,
                    group: *in_group,
                });
                true
            }
            DomainEvent::LootItem {
                name,
                item_id,
                quality,
                amount,
                timestamp,
                ..
            } => {
                let amount = *amount;
                if amount <= 0 {
                    false
                } else if is_currency(name, *item_id) {
                    self.each_scope(group, |s| s.gold_gained = s.gold_gained.saturating_add(amount));
                    true
                } else {
                    let tier = quality.tier() as usize;
                    self.each_scope(group, |s| {
                        s.loot_items = s.loot_items.saturating_add(amount);
                        s.loot_by_quality[tier] = s.loot_by_quality[tier].saturating_add(amount);
                    });
                    self.loot.push(LootRecord {
                        name: name.clone(),
                        quality: *quality,
                        amount,
                        timestamp: *timestamp,
                    });
                    true
                }
            }
            DomainEvent::ExpGain { amount, .. } => self.add(group, *amount, |s| &mut s.experience),
            DomainEvent::GoldGain { amount, .. } => {
                self.add(group, *amount, |s| &mut s.gold_gained)
            }
            DomainEvent::GoldSpend { amount, .. } => self.add(false, *amount, |s| &mut s.gold_spent),
            DomainEvent::DamageDealt { amount, .. } => self.add(false, *amount, |s| &mut s.damage),
        };

        if changed {
            debug!("Applied {} (group: {})", event.kind(), group);
        } else {
            trace!("Ignored {} with non-positive amount", event.kind());
        }
        changed
    }

    /// Zero every counter and empty both rings
    pub fn reset(&mut self) {
        self.local.reset();
        self.group.reset();
        self.loot.clear();
        self.kills.clear();
    }

    fn each_scope(&mut self, group: bool, mut update: impl FnMut(&mut AggregateStats)) {
        update(&mut self.local);
        if group {
            update(&mut self.group);
        }
    }

    fn add(
        &mut self,
        group: bool,
        amount: i64,
        field: impl Fn(&mut AggregateStats) -> &mut i64,
    ) -> bool {
        if amount <= 0 {
            return false;
        }
        self.each_scope(group, |s| {
            let slot = field(s);
            *slot = slot.saturating_add(amount);
        });
        true
    }
}

/// Gold shows up either by item id or by name
fn is_currency(name: &str, item_id: Option<u32>) -> bool {
    item_id == Some(GOLD_ITEM_ID) || name.trim().eq_ignore_ascii_case("gold")
}
