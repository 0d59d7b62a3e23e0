//! JSON export of a snapshot

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::event::{KillRecord, LootRecord};
use crate::extract::FilterConfig;
use crate::shared::layout::SharedSnapshot;
use crate::shared::rates::SessionRates;
use crate::stats::AggregateStats;

/// Owned, serializable copy of a snapshot plus derived values
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotView {
    pub session_start: Option<String>,
    pub overlay_visible: bool,
    pub local: AggregateStats,
    pub group: AggregateStats,
    pub rates: SessionRates,
    /// Oldest first
    pub recent_loot: Vec<LootRecord>,
    /// Oldest first
    pub recent_kills: Vec<KillRecord>,
    pub filter: FilterConfig,
    pub diagnostics: String,
}

impl SnapshotView {
    pub fn new(block: &SharedSnapshot, now_ms: i64) -> Self {
        let local = AggregateStats::from(&block.local);
        let session_start = DateTime::<Utc>::from_timestamp_millis(block.session_start_ms)
            .filter(|_| block.session_start_ms > 0)
            .map(|t| t.to_rfc3339());

        Self {
            session_start,
            overlay_visible: block.overlay_visible != 0,
            rates: SessionRates::compute(&local, block.session_start_ms, now_ms),
            local,
            group: AggregateStats::from(&block.group),
            recent_loot: block.loot_records(),
            recent_kills: block.kill_records(),
            filter: block.filter(),
            diagnostics: block.diagnostics(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{DomainEvent, ItemQuality, Scope};
    use crate::shared::layout::MAGIC;
    use crate::stats::StatsAggregator;

    fn sample_block() -> SharedSnapshot {
        let mut stats = StatsAggregator::new();
        stats.apply(&DomainEvent::kill("Wolf", 40));
        stats.apply(&DomainEvent::loot("Wolf Pelt", ItemQuality::Uncommon, 2));
        stats.apply(&DomainEvent::damage(120));

        let mut block = SharedSnapshot::zeroed();
        block.magic = MAGIC;
        block.overlay_visible = 1;
        block.session_start_ms = 1_700_000_000_000;
        block.write_stats(stats.stats(Scope::Local), stats.stats(Scope::Group));
        block.write_loot(stats.recent_loot());
        block.write_kills(stats.recent_kills());
        block.set_diagnostics("recv_msg hook OK");
        block
    }

    #[test]
    fn test_view_copies_block() {
        let block = sample_block();
        let view = SnapshotView::new(&block, block.session_start_ms + 60_000);

        assert!(view.overlay_visible);
        assert_eq!(view.local.kills, 1);
        assert_eq!(view.local.loot_of(ItemQuality::Uncommon), 2);
        assert_eq!(view.recent_loot[0].name, "Wolf Pelt");
        assert_eq!(view.recent_kills[0].name, "Wolf");
        assert!((view.rates.kills_per_minute - 1.0).abs() < 1e-9);
        assert_eq!(view.session_start.as_deref(), Some("2023-11-14T22:13:20+00:00"));
    }

    #[test]
    fn test_view_json_fields() {
        let block = sample_block();
        let json = SnapshotView::new(&block, block.session_start_ms).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["local"]["damage"], 120);
        assert_eq!(value["recent_loot"][0]["quality"], "Uncommon");
        assert_eq!(value["diagnostics"], "recv_msg hook OK");
        assert_eq!(value["filter"]["enabled"], false);
    }

    #[test]
    fn test_view_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        SnapshotView::new(&SharedSnapshot::zeroed(), 0).save(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"session_start\": null"));
    }
}
