//! Per-session rates derived on the consumer side

use serde::Serialize;

use crate::stats::AggregateStats;

/// Sessions shorter than this are treated as this long
const MIN_ELAPSED_MS: i64 = 1_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SessionRates {
    pub elapsed_ms: i64,
    pub kills_per_minute: f64,
    pub exp_per_hour: f64,
    pub damage_per_second: f64,
    pub damage_per_hour: f64,
}

impl SessionRates {
    /// Rates for `stats` accumulated between `session_start_ms` and `now_ms`.
    ///
    /// A missing start (zero) yields all-zero rates.
    pub fn compute(stats: &AggregateStats, session_start_ms: i64, now_ms: i64) -> Self {
        if session_start_ms <= 0 {
            return Self::default();
        }
        let elapsed_ms = now_ms.saturating_sub(session_start_ms).max(0);
        let effective = elapsed_ms.max(MIN_ELAPSED_MS) as f64;

        let seconds = effective / 1_000.0;
        let minutes = effective / 60_000.0;
        let hours = effective / 3_600_000.0;
        let dps = stats.damage as f64 / seconds;

        Self {
            elapsed_ms,
            kills_per_minute: stats.kills as f64 / minutes,
            exp_per_hour: stats.experience as f64 / hours,
            damage_per_second: dps,
            damage_per_hour: dps * 3_600.0,
        }
    }

    /// `HH:MM:SS` of the session length
    pub fn elapsed_display(&self) -> String {
        let total = self.elapsed_ms / 1_000;
        format!("{:02}:{:02}:{:02}", total / 3_600, (total / 60) % 60, total % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(kills: i64, experience: i64, damage: i64) -> AggregateStats {
        AggregateStats {
            kills,
            experience,
            damage,
            ..AggregateStats::default()
        }
    }

    #[test]
    fn test_rates_over_ten_minutes() {
        let start = 1_700_000_000_000;
        let rates = SessionRates::compute(&stats(20, 6_000, 1_200), start, start + 600_000);

        assert_eq!(rates.elapsed_ms, 600_000);
        assert!((rates.kills_per_minute - 2.0).abs() < 1e-9);
        assert!((rates.exp_per_hour - 36_000.0).abs() < 1e-6);
        assert!((rates.damage_per_second - 2.0).abs() < 1e-9);
        assert!((rates.damage_per_hour - 7_200.0).abs() < 1e-6);
        assert_eq!(rates.elapsed_display(), "00:10:00");
    }

    #[test]
    fn test_short_session_is_clamped() {
        let start = 1_700_000_000_000;
        let rates = SessionRates::compute(&stats(1, 0, 50), start, start);
        assert_eq!(rates.elapsed_ms, 0);
        assert!((rates.damage_per_second - 50.0).abs() < 1e-9);
        assert!(rates.kills_per_minute.is_finite());
    }

    #[test]
    fn test_missing_start_gives_zero() {
        let rates = SessionRates::compute(&stats(5, 5, 5), 0, 1_000_000);
        assert_eq!(rates, SessionRates::default());
    }

    #[test]
    fn test_clock_going_backwards() {
        let rates = SessionRates::compute(&stats(0, 0, 0), 2_000, 1_000);
        assert_eq!(rates.elapsed_ms, 0);
        assert_eq!(rates.elapsed_display(), "00:00:00");
    }
}
