//! Wire layout of the shared snapshot
//!
//! Fixed-size, `#[repr(C)]`, integer-only. Every padding byte is an explicit
//! field so the whole block can be copied as bytes and any bit pattern is a
//! valid value. Flags are `u8` (0 = false).
//!
//! | offset | field            | size |
//! |--------|------------------|------|
//! | 0x0000 | magic            | 4    |
//! | 0x0008 | local stats      | 96   |
//! | 0x0068 | group stats      | 96   |
//! | 0x00C8 | recent loot      | 880  |
//! | 0x0438 | loot cursor      | 4    |
//! | 0x0440 | recent kills     | 880  |
//! | 0x07B0 | kill cursor      | 4    |
//! | 0x07B4 | flags            | 4    |
//! | 0x07B8 | filter terms     | 512  |
//! | 0x09B8 | session start ms | 8    |
//! | 0x09C0 | diagnostics      | 512  |

use crate::event::{ItemQuality, KillRecord, LootRecord};
use crate::extract::FilterConfig;
use crate::stats::{AggregateStats, HISTORY_CAPACITY, RecentHistory};

/// Liveness marker written once by the producer
pub const MAGIC: u32 = 0xDEAD_BEEF;

pub const NAME_LEN: usize = 64;
pub const TERMS_LEN: usize = 512;
pub const DIAGNOSTICS_LEN: usize = 512;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WireStats {
    pub kills: i64,
    pub loot_items: i64,
    pub gold_gained: i64,
    pub gold_spent: i64,
    pub experience: i64,
    pub damage: i64,
    pub loot_by_quality: [i64; 6],
}

impl From<&AggregateStats> for WireStats {
    fn from(stats: &AggregateStats) -> Self {
        Self {
            kills: stats.kills,
            loot_items: stats.loot_items,
            gold_gained: stats.gold_gained,
            gold_spent: stats.gold_spent,
            experience: stats.experience,
            damage: stats.damage,
            loot_by_quality: stats.loot_by_quality,
        }
    }
}

impl From<&WireStats> for AggregateStats {
    fn from(wire: &WireStats) -> Self {
        Self {
            kills: wire.kills,
            loot_items: wire.loot_items,
            gold_gained: wire.gold_gained,
            gold_spent: wire.gold_spent,
            experience: wire.experience,
            damage: wire.damage,
            loot_by_quality: wire.loot_by_quality,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireLoot {
    pub name: [u8; NAME_LEN],
    pub quality: u8,
    pub _pad: [u8; 7],
    pub amount: i64,
    pub timestamp: i64,
}

impl WireLoot {
    pub const EMPTY: Self = Self {
        name: [0; NAME_LEN],
        quality: 0,
        _pad: [0; 7],
        amount: 0,
        timestamp: 0,
    };

    pub fn is_empty(&self) -> bool {
        self.name[0] == 0 && self.timestamp == 0
    }

    pub fn to_record(&self) -> LootRecord {
        LootRecord {
            name: decode_fixed(&self.name),
            quality: ItemQuality::from_tier_saturating(i64::from(self.quality)),
            amount: self.amount,
            timestamp: self.timestamp,
        }
    }
}

impl From<&LootRecord> for WireLoot {
    fn from(record: &LootRecord) -> Self {
        Self {
            name: encode_fixed(&record.name),
            quality: record.quality.tier(),
            _pad: [0; 7],
            amount: record.amount,
            timestamp: record.timestamp,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireKill {
    pub name: [u8; NAME_LEN],
    pub exp: i64,
    pub timestamp: i64,
    pub group: u8,
    pub _pad: [u8; 7],
}

impl WireKill {
    pub const EMPTY: Self = Self {
        name: [0; NAME_LEN],
        exp: 0,
        timestamp: 0,
        group: 0,
        _pad: [0; 7],
    };

    pub fn is_empty(&self) -> bool {
        self.name[0] == 0 && self.timestamp == 0
    }

    pub fn to_record(&self) -> KillRecord {
        KillRecord {
            name: decode_fixed(&self.name),
            exp: self.exp,
            timestamp: self.timestamp,
            group: self.group != 0,
        }
    }
}

impl From<&KillRecord> for WireKill {
    fn from(record: &KillRecord) -> Self {
        Self {
            name: encode_fixed(&record.name),
            exp: record.exp,
            timestamp: record.timestamp,
            group: u8::from(record.group),
            _pad: [0; 7],
        }
    }
}

/// The block shared between the instrumented process and its consumers
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharedSnapshot {
    pub magic: u32,
    pub _pad0: u32,
    pub local: WireStats,
    pub group: WireStats,
    pub recent_loot: [WireLoot; HISTORY_CAPACITY],
    pub loot_cursor: u32,
    pub _pad1: u32,
    pub recent_kills: [WireKill; HISTORY_CAPACITY],
    pub kill_cursor: u32,
    pub overlay_visible: u8,
    pub filter_enabled: u8,
    pub filter_block_tagged: u8,
    pub filter_use_regex: u8,
    pub filter_terms: [u8; TERMS_LEN],
    pub session_start_ms: i64,
    pub diagnostics: [u8; DIAGNOSTICS_LEN],
}

pub const SNAPSHOT_SIZE: usize = std::mem::size_of::<SharedSnapshot>();

const _: () = assert!(SNAPSHOT_SIZE == 0x0BC0);
const _: () = assert!(std::mem::size_of::<WireLoot>() == 88);
const _: () = assert!(std::mem::size_of::<WireKill>() == 88);

impl SharedSnapshot {
    /// All-zero block: not yet initialized (magic 0)
    pub fn zeroed() -> Self {
        Self {
            magic: 0,
            _pad0: 0,
            local: WireStats::default(),
            group: WireStats::default(),
            recent_loot: [WireLoot::EMPTY; HISTORY_CAPACITY],
            loot_cursor: 0,
            _pad1: 0,
            recent_kills: [WireKill::EMPTY; HISTORY_CAPACITY],
            kill_cursor: 0,
            overlay_visible: 0,
            filter_enabled: 0,
            filter_block_tagged: 0,
            filter_use_regex: 0,
            filter_terms: [0; TERMS_LEN],
            session_start_ms: 0,
            diagnostics: [0; DIAGNOSTICS_LEN],
        }
    }

    pub fn is_live(&self) -> bool {
        self.magic == MAGIC
    }

    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: repr(C), integer-only fields with explicit padding, so every
        // byte of the struct is initialized.
        unsafe { std::slice::from_raw_parts((self as *const Self).cast::<u8>(), SNAPSHOT_SIZE) }
    }

    /// Copy a block out of raw bytes; `None` if the span is too short
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < SNAPSHOT_SIZE {
            return None;
        }
        // SAFETY: length checked; every bit pattern is a valid SharedSnapshot.
        Some(unsafe { std::ptr::read_unaligned(bytes.as_ptr().cast::<Self>()) })
    }

    pub fn write_stats(&mut self, local: &AggregateStats, group: &AggregateStats) {
        self.local = local.into();
        self.group = group.into();
    }

    pub fn write_loot(&mut self, history: &RecentHistory<LootRecord, HISTORY_CAPACITY>) {
        for (wire, slot) in self.recent_loot.iter_mut().zip(history.slots()) {
            *wire = slot.as_ref().map(WireLoot::from).unwrap_or(WireLoot::EMPTY);
        }
        self.loot_cursor = history.cursor() as u32;
    }

    pub fn write_kills(&mut self, history: &RecentHistory<KillRecord, HISTORY_CAPACITY>) {
        for (wire, slot) in self.recent_kills.iter_mut().zip(history.slots()) {
            *wire = slot.as_ref().map(WireKill::from).unwrap_or(WireKill::EMPTY);
        }
        self.kill_cursor = history.cursor() as u32;
    }

    /// Loot entries oldest first
    pub fn loot_records(&self) -> Vec<LootRecord> {
        ring_order(&self.recent_loot, self.loot_cursor, WireLoot::is_empty)
            .map(WireLoot::to_record)
            .collect()
    }

    /// Kill entries oldest first
    pub fn kill_records(&self) -> Vec<KillRecord> {
        ring_order(&self.recent_kills, self.kill_cursor, WireKill::is_empty)
            .map(WireKill::to_record)
            .collect()
    }

    pub fn filter(&self) -> FilterConfig {
        FilterConfig {
            enabled: self.filter_enabled != 0,
            terms: FilterConfig::parse_terms(&decode_fixed(&self.filter_terms)),
            block_tagged: self.filter_block_tagged != 0,
            use_regex: self.filter_use_regex != 0,
        }
    }

    pub fn set_filter(&mut self, filter: &FilterConfig) {
        self.filter_enabled = u8::from(filter.enabled);
        self.filter_block_tagged = u8::from(filter.block_tagged);
        self.filter_use_regex = u8::from(filter.use_regex);
        self.filter_terms = encode_fixed(&filter.terms_string());
    }

    pub fn diagnostics(&self) -> String {
        decode_fixed(&self.diagnostics)
    }

    pub fn set_diagnostics(&mut self, text: &str) {
        self.diagnostics = encode_fixed(text);
    }
}

impl Default for SharedSnapshot {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Walk a wire ring oldest first.
///
/// A full ring starts at the cursor; a partially filled one at slot 0.
fn ring_order<T>(
    slots: &[T; HISTORY_CAPACITY],
    cursor: u32,
    is_empty: fn(&T) -> bool,
) -> impl Iterator<Item = &T> {
    let cursor = (cursor as usize).min(HISTORY_CAPACITY - 1);
    let start = if is_empty(&slots[cursor]) { 0 } else { cursor };
    slots[start..]
        .iter()
        .chain(slots[..start].iter())
        .filter(move |s| !is_empty(*s))
}

/// NUL-terminated copy of `text`, truncated on a character boundary
pub fn encode_fixed<const N: usize>(text: &str) -> [u8; N] {
    let mut out = [0u8; N];
    let mut end = text.len().min(N.saturating_sub(1));
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    out[..end].copy_from_slice(&text.as_bytes()[..end]);
    out
}

/// Text up to the first NUL (or the whole field)
pub fn decode_fixed(bytes: &[u8]) -> String {
    let end = memchr::memchr(0, bytes).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_offsets() {
        let snap = SharedSnapshot::zeroed();
        let base = &snap as *const _ as usize;
        assert_eq!(&snap.local as *const _ as usize - base, 0x0008);
        assert_eq!(&snap.recent_loot as *const _ as usize - base, 0x00C8);
        assert_eq!(&snap.recent_kills as *const _ as usize - base, 0x0440);
        assert_eq!(&snap.filter_terms as *const _ as usize - base, 0x07B8);
        assert_eq!(&snap.session_start_ms as *const _ as usize - base, 0x09B8);
        assert_eq!(&snap.diagnostics as *const _ as usize - base, 0x09C0);
    }

    #[test]
    fn test_encode_fixed_truncates_on_char_boundary() {
        let name: [u8; 8] = encode_fixed("abcdeé€x");
        assert_eq!(decode_fixed(&name), "abcdeé");

        let short: [u8; 8] = encode_fixed("ab");
        assert_eq!(&short[..3], b"ab\0");
    }

    #[test]
    fn test_bytes_round_trip() {
        let mut snap = SharedSnapshot::zeroed();
        snap.magic = MAGIC;
        snap.local.kills = 42;
        snap.set_diagnostics("hello");

        let copy = SharedSnapshot::from_bytes(snap.as_bytes()).unwrap();
        assert_eq!(copy, snap);
        assert!(SharedSnapshot::from_bytes(&[0u8; 16]).is_none());
    }

    #[test]
    fn test_ring_order_after_wrap() {
        let mut history: RecentHistory<KillRecord, HISTORY_CAPACITY> = RecentHistory::new();
        for i in 1..=12 {
            history.push(KillRecord {
                name: format!("Mob {}", i),
                exp: i,
                timestamp: 1000 + i,
                group: false,
            });
        }
        let mut snap = SharedSnapshot::zeroed();
        snap.write_kills(&history);

        let exps: Vec<i64> = snap.kill_records().iter().map(|k| k.exp).collect();
        assert_eq!(exps, (3..=12).collect::<Vec<_>>());
    }

    #[test]
    fn test_ring_order_partial() {
        let mut history: RecentHistory<LootRecord, HISTORY_CAPACITY> = RecentHistory::new();
        for name in ["Ore", "Herb"] {
            history.push(LootRecord {
                name: name.to_string(),
                quality: ItemQuality::Rare,
                amount: 1,
                timestamp: 1,
            });
        }
        let mut snap = SharedSnapshot::zeroed();
        snap.write_loot(&history);

        let names: Vec<String> = snap.loot_records().into_iter().map(|l| l.name).collect();
        assert_eq!(names, vec!["Ore", "Herb"]);
        assert_eq!(snap.loot_cursor, 2);
        assert_eq!(snap.recent_loot[0].quality, 3);
    }

    #[test]
    fn test_filter_fields() {
        let mut snap = SharedSnapshot::zeroed();
        let filter = FilterConfig {
            enabled: true,
            terms: vec!["wts".into(), "wtb".into()],
            block_tagged: true,
            use_regex: false,
        };
        snap.set_filter(&filter);
        assert_eq!(snap.filter(), filter);
        assert_eq!(decode_fixed(&snap.filter_terms), "wts, wtb");
    }
}
