//! Text rendering of the watch view

use std::fmt::Write;

use dmtrack::{
    AggregateStats, DisplayHistory, FilterConfig, ItemQuality, KillRecord, LootRecord,
    SessionRates, SharedSnapshot,
};
use owo_colors::OwoColorize;
use strum::IntoEnumIterator;

pub const KEY_HELP: &str = "[r] reset  [o] overlay  [f] filter on/off  [c] clear lists  [q] quit";

/// Lines of recent loot and kills shown per list
pub const LIST_ROWS: usize = 12;

fn paint(text: &str, quality: ItemQuality, color: bool) -> String {
    if color {
        let (r, g, b) = quality.color();
        text.truecolor(r, g, b).to_string()
    } else {
        text.to_string()
    }
}

fn heading(text: &str, color: bool) -> String {
    if color {
        text.bold().to_string()
    } else {
        text.to_string()
    }
}

/// "12s", "4m", "2h" since `timestamp`
pub fn age(timestamp: i64, now_ms: i64) -> String {
    let seconds = (now_ms - timestamp).max(0) / 1000;
    match seconds {
        s if s < 60 => format!("{}s", s),
        s if s < 3600 => format!("{}m", s / 60),
        s => format!("{}h", s / 3600),
    }
}

pub fn stats_line(label: &str, stats: &AggregateStats) -> String {
    format!(
        "{:<6} kills {:>5}  exp {:>8}  gold +{} / -{}  loot {:>5}  damage {}",
        label,
        stats.kills,
        stats.experience,
        stats.gold_gained,
        stats.gold_spent,
        stats.loot_items,
        stats.damage
    )
}

pub fn rates_line(rates: &SessionRates) -> String {
    format!(
        "RATES  kills/min {:.1}  exp/h {:.0}  dps {:.1}  dmg/h {:.0}",
        rates.kills_per_minute, rates.exp_per_hour, rates.damage_per_second, rates.damage_per_hour
    )
}

pub fn quality_line(stats: &AggregateStats, color: bool) -> String {
    let parts: Vec<String> = ItemQuality::iter()
        .map(|q| paint(&format!("{} {}", q, stats.loot_of(q)), q, color))
        .collect();
    format!("LOOT   {}", parts.join("  "))
}

pub fn filter_line(filter: &FilterConfig) -> String {
    let mut modes = Vec::new();
    if filter.use_regex {
        modes.push("regex");
    }
    if filter.block_tagged {
        modes.push("tagged");
    }
    format!(
        "FILTER {}{}  terms: {}",
        if filter.enabled { "on" } else { "off" },
        if modes.is_empty() {
            String::new()
        } else {
            format!(" ({})", modes.join(", "))
        },
        filter.terms_string()
    )
}

pub fn loot_line(record: &LootRecord, now_ms: i64, color: bool) -> String {
    let name = paint(&format!("[{}]", record.name), record.quality, color);
    format!("  {:>4}  {} x{}", age(record.timestamp, now_ms), name, record.amount)
}

pub fn kill_line(record: &KillRecord, now_ms: i64) -> String {
    let mut line = format!("  {:>4}  {}", age(record.timestamp, now_ms), record.name);
    if record.exp > 0 {
        let _ = write!(line, " (+{} exp)", record.exp);
    }
    if record.group {
        line.push_str(" [group]");
    }
    line
}

/// Full frame for a live snapshot
pub fn frame(
    block: &SharedSnapshot,
    loot: &DisplayHistory<LootRecord>,
    kills: &DisplayHistory<KillRecord>,
    now_ms: i64,
    color: bool,
) -> String {
    let local = AggregateStats::from(&block.local);
    let group = AggregateStats::from(&block.group);
    let rates = SessionRates::compute(&local, block.session_start_ms, now_ms);

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}  session {}  overlay {}",
        heading("dmtrack", color),
        rates.elapsed_display(),
        if block.overlay_visible != 0 { "shown" } else { "hidden" }
    );
    let _ = writeln!(out, "{}", stats_line("LOCAL", &local));
    let _ = writeln!(out, "{}", stats_line("GROUP", &group));
    let _ = writeln!(out, "{}", rates_line(&rates));
    let _ = writeln!(out, "{}", quality_line(&local, color));
    let _ = writeln!(out, "{}", filter_line(&block.filter()));

    let _ = writeln!(out, "\n{} ({})", heading("RECENT LOOT", color), loot.len());
    for record in loot.newest_first().take(LIST_ROWS) {
        let _ = writeln!(out, "{}", loot_line(record, now_ms, color));
    }
    let _ = writeln!(out, "\n{} ({})", heading("RECENT KILLS", color), kills.len());
    for record in kills.newest_first().take(LIST_ROWS) {
        let _ = writeln!(out, "{}", kill_line(record, now_ms));
    }

    let diagnostics = block.diagnostics();
    if !diagnostics.is_empty() {
        let _ = writeln!(out, "\nDIAG   {}", diagnostics);
    }
    let _ = writeln!(out, "\n{}", KEY_HELP);
    out
}

/// Frame shown while no producer is live
pub fn waiting_frame(color: bool) -> String {
    format!(
        "{}  waiting for the agent (is it injected?)\n\n{}\n",
        heading("dmtrack", color),
        KEY_HELP
    )
}

#[cfg(test)]
mod tests {
    use dmtrack::{DomainEvent, Scope, StatsAggregator};

    use super::*;

    const NOW: i64 = 1_700_000_100_000;

    fn block_with(events: &[DomainEvent]) -> SharedSnapshot {
        let mut stats = StatsAggregator::new();
        for event in events {
            stats.apply(event);
        }
        let mut block = SharedSnapshot::zeroed();
        block.write_stats(stats.stats(Scope::Local), stats.stats(Scope::Group));
        block.write_loot(stats.recent_loot());
        block.write_kills(stats.recent_kills());
        block.session_start_ms = NOW - 60_000;
        block.overlay_visible = 1;
        block
    }

    #[test]
    fn test_age() {
        assert_eq!(age(NOW - 5_000, NOW), "5s");
        assert_eq!(age(NOW - 125_000, NOW), "2m");
        assert_eq!(age(NOW - 7_200_000, NOW), "2h");
        assert_eq!(age(NOW + 1_000, NOW), "0s");
    }

    #[test]
    fn test_kill_line() {
        let record = KillRecord {
            name: "Cave Bat".into(),
            exp: 150,
            timestamp: NOW - 3_000,
            group: true,
        };
        assert_eq!(kill_line(&record, NOW), "    3s  Cave Bat (+150 exp) [group]");
    }

    #[test]
    fn test_loot_line_plain() {
        let record = LootRecord {
            name: "Flaming Sword".into(),
            quality: ItemQuality::Epic,
            amount: 1,
            timestamp: NOW,
        };
        assert_eq!(loot_line(&record, NOW, false), "    0s  [Flaming Sword] x1");
        assert!(loot_line(&record, NOW, true).contains("\u{1b}["));
    }

    #[test]
    fn test_filter_line() {
        let filter = FilterConfig {
            enabled: true,
            terms: vec!["wts".into(), "wtb".into()],
            block_tagged: true,
            use_regex: false,
        };
        assert_eq!(filter_line(&filter), "FILTER on (tagged)  terms: wts, wtb");
    }

    #[test]
    fn test_frame_contents() {
        let block = block_with(&[
            DomainEvent::kill("Cave Bat", 0),
            DomainEvent::exp(120),
            DomainEvent::loot("Healing Potion", ItemQuality::Common, 3),
        ]);
        let mut loot: DisplayHistory<LootRecord> = DisplayHistory::new();
        loot.absorb(&block.loot_records(), block.loot_cursor);
        let mut kills: DisplayHistory<KillRecord> = DisplayHistory::new();
        kills.absorb(&block.kill_records(), block.kill_cursor);

        let text = frame(&block, &loot, &kills, NOW, false);
        assert!(text.contains("session 00:01:00"), "{}", text);
        assert!(text.contains("overlay shown"));
        assert!(text.contains("LOCAL  kills     1"));
        assert!(text.contains("[Healing Potion] x3"));
        assert!(text.contains("Cave Bat"));
        assert!(text.contains("kills/min 1.0"));
        assert!(text.ends_with(&format!("{}\n", KEY_HELP)));
    }

    #[test]
    fn test_waiting_frame() {
        assert!(waiting_frame(false).contains("waiting for the agent"));
    }
}
