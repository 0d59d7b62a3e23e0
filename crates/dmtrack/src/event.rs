//! Typed gameplay events and the records kept for them

use serde::{Deserialize, Serialize};
use strum::{Display, EnumCount, EnumIter, FromRepr, IntoStaticStr};

/// Item quality tiers, lowest first
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Default,
    Serialize,
    Deserialize,
    Display,
    IntoStaticStr,
    EnumIter,
    EnumCount,
    FromRepr,
)]
#[repr(u8)]
pub enum ItemQuality {
    Junk = 0,
    #[default]
    Common = 1,
    Uncommon = 2,
    Rare = 3,
    Epic = 4,
    Legendary = 5,
}

impl ItemQuality {
    pub fn tier(self) -> u8 {
        self as u8
    }

    /// Map a raw tier number; out-of-range values clamp to the nearest tier
    pub fn from_tier_saturating(tier: i64) -> Self {
        let clamped = tier.clamp(0, (Self::COUNT - 1) as i64) as u8;
        Self::from_repr(clamped).unwrap_or_default()
    }

    /// Display color as RGB
    pub fn color(self) -> (u8, u8, u8) {
        match self {
            ItemQuality::Junk => (128, 128, 128),
            ItemQuality::Common => (255, 255, 255),
            ItemQuality::Uncommon => (30, 255, 0),
            ItemQuality::Rare => (0, 112, 221),
            ItemQuality::Epic => (255, 0, 127),
            ItemQuality::Legendary => (163, 53, 238),
        }
    }
}

/// Which aggregate a stat update applies to
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, IntoStaticStr, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Scope {
    Local,
    Group,
}

/// One gameplay occurrence recovered from the host.
///
/// `group` marks events that also count toward the group aggregate; the
/// local aggregate is always updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainEvent {
    Kill {
        name: String,
        exp: i64,
        group: bool,
        timestamp: i64,
    },
    LootItem {
        name: String,
        item_id: Option<u32>,
        quality: ItemQuality,
        amount: i64,
        group: bool,
        timestamp: i64,
    },
    ExpGain {
        amount: i64,
        group: bool,
        timestamp: i64,
    },
    GoldGain {
        amount: i64,
        group: bool,
        timestamp: i64,
    },
    GoldSpend {
        amount: i64,
        timestamp: i64,
    },
    DamageDealt {
        amount: i64,
        timestamp: i64,
    },
}

/// Item id the host uses for gold
pub const GOLD_ITEM_ID: u32 = 1;

impl DomainEvent {
    pub fn kill(name: impl Into<String>, exp: i64) -> Self {
        DomainEvent::Kill {
            name: name.into(),
            exp,
            group: false,
            timestamp: now_millis(),
        }
    }

    pub fn loot(name: impl Into<String>, quality: ItemQuality, amount: i64) -> Self {
        DomainEvent::LootItem {
            name: name.into(),
            item_id: None,
            quality,
            amount,
            group: false,
            timestamp: now_millis(),
        }
    }

    pub fn exp(amount: i64) -> Self {
        DomainEvent::ExpGain {
            amount,
            group: false,
            timestamp: now_millis(),
        }
    }

    pub fn gold_gain(amount: i64) -> Self {
        DomainEvent::GoldGain {
            amount,
            group: false,
            timestamp: now_millis(),
        }
    }

    pub fn gold_spend(amount: i64) -> Self {
        DomainEvent::GoldSpend {
            amount,
            timestamp: now_millis(),
        }
    }

    pub fn damage(amount: i64) -> Self {
        DomainEvent::DamageDealt {
            amount,
            timestamp: now_millis(),
        }
    }

    /// Mark the event as group scoped (no effect on spend/damage)
    pub fn in_group(mut self, scoped: bool) -> Self {
        match &mut self {
            DomainEvent::Kill { group, .. }
            | DomainEvent::LootItem { group, .. }
            | DomainEvent::ExpGain { group, .. }
            | DomainEvent::GoldGain { group, .. } => *group = scoped,
            DomainEvent::GoldSpend { .. } | DomainEvent::DamageDealt { .. } => {}
        }
        self
    }

    pub fn is_group_scoped(&self) -> bool {
        match self {
            DomainEvent::Kill { group, .. }
            | DomainEvent::LootItem { group, .. }
            | DomainEvent::ExpGain { group, .. }
            | DomainEvent::GoldGain { group, .. } => *group,
            DomainEvent::GoldSpend { .. } | DomainEvent::DamageDealt { .. } => false,
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            DomainEvent::Kill { timestamp, .. }
            | DomainEvent::LootItem { timestamp, .. }
            | DomainEvent::ExpGain { timestamp, .. }
            | DomainEvent::GoldGain { timestamp, .. }
            | DomainEvent::GoldSpend { timestamp, .. }
            | DomainEvent::DamageDealt { timestamp, .. } => *timestamp,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DomainEvent::Kill { .. } => "kill",
            DomainEvent::LootItem { .. } => "loot_item",
            DomainEvent::ExpGain { .. } => "exp_gain",
            DomainEvent::GoldGain { .. } => "gold_gain",
            DomainEvent::GoldSpend { .. } => "gold_spend",
            DomainEvent::DamageDealt { .. } => "damage_dealt",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LootRecord {
    pub name: String,
    pub quality: ItemQuality,
    pub amount: i64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillRecord {
    pub name: String,
    pub exp: i64,
    pub timestamp: i64,
    pub group: bool,
}

/// Receiver of extracted events
pub trait EventSink {
    fn emit(&self, event: DomainEvent);
}

/// Milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_quality_tiers_are_ordinal() {
        let tiers: Vec<u8> = ItemQuality::iter().map(ItemQuality::tier).collect();
        assert_eq!(tiers, vec![0, 1, 2, 3, 4, 5]);
        assert!(ItemQuality::Legendary > ItemQuality::Epic);
        assert_eq!(ItemQuality::default(), ItemQuality::Common);
    }

    #[test]
    fn test_quality_from_tier_saturating() {
        assert_eq!(ItemQuality::from_tier_saturating(3), ItemQuality::Rare);
        assert_eq!(ItemQuality::from_tier_saturating(-4), ItemQuality::Junk);
        assert_eq!(ItemQuality::from_tier_saturating(99), ItemQuality::Legendary);
    }

    #[test]
    fn test_quality_colors() {
        assert_eq!(ItemQuality::Junk.color(), (128, 128, 128));
        assert_eq!(ItemQuality::Legendary.color(), (163, 53, 238));
        assert_eq!(ItemQuality::Uncommon.to_string(), "Uncommon");
    }

    #[test]
    fn test_group_scope_flag() {
        let kill = DomainEvent::kill("Wolf", 0).in_group(true);
        assert!(kill.is_group_scoped());

        let spend = DomainEvent::gold_spend(10).in_group(true);
        assert!(!spend.is_group_scoped());
    }

    #[test]
    fn test_event_serializes_with_kind_tag() {
        let json = serde_json::to_value(DomainEvent::ExpGain {
            amount: 150,
            group: false,
            timestamp: 1,
        })
        .unwrap();
        assert_eq!(json["kind"], "exp_gain");
        assert_eq!(json["amount"], 150);
    }
}
