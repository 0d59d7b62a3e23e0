//! Chat-line grammars
//!
//! Every grammar is tried on every line in a fixed order (loot, experience,
//! kill, gold spent, gold received) and all matches fire. Loot named "Gold"
//! becomes a gold gain instead of an item.

use regex::{Captures, Regex};
use tracing::{debug, trace};

use crate::error::Result;
use crate::event::DomainEvent;
use crate::extract::quality::infer_quality;

const LOOT: &str = r"(?i)receive:\s*\[([^\]]+)\](?:\s*x(\d+))?";
const EXP: &str = r"(?i)(?:\b(?:gained|gain|received|got)\b|\+)\s*(\d+)\s*(?:experience|exp|xp)\b";
const KILL_TRAILING: &str = r"(?i)(?:\[([^\]]+)\]|(\w+))\s+has\s+been\s+defeated";
const KILL_LEAD_IN: &str =
    r"(?i)\b(?:killed|slain|defeated)\s+(?:(?:the|a|an)\s+)?(?:\[([^\]]+)\]|(\w+))";
const SPENT: &str = r"(?i)\bspent\s+(\d+)\s+gold\b";
const GOLD: &str = r"(?i)\b(?:received|got|looted)\s+(\d+)\s+(?:gold|coins?)\b";

/// Name used when a kill line carries no usable target
pub const UNKNOWN_TARGET: &str = "Enemy";

/// Compiled chat grammars
#[derive(Debug, Clone)]
pub struct TextExtractor {
    loot: Regex,
    exp: Regex,
    kill_trailing: Regex,
    kill_lead_in: Regex,
    spent: Regex,
    gold: Regex,
}

impl TextExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            loot: Regex::new(LOOT)?,
            exp: Regex::new(EXP)?,
            kill_trailing: Regex::new(KILL_TRAILING)?,
            kill_lead_in: Regex::new(KILL_LEAD_IN)?,
            spent: Regex::new(SPENT)?,
            gold: Regex::new(GOLD)?,
        })
    }

    /// Every event the line describes, in grammar order
    pub fn extract(&self, line: &str) -> Vec<DomainEvent> {
        let mut events = Vec::new();

        if let Some(event) = self.loot(line) {
            events.push(event);
        }
        if let Some(amount) = self.capture_amount(&self.exp, line) {
            events.push(DomainEvent::exp(amount));
        }
        if let Some(name) = self.kill_target(line) {
            events.push(DomainEvent::kill(name, 0));
        }
        if let Some(amount) = self.capture_amount(&self.spent, line) {
            events.push(DomainEvent::gold_spend(amount));
        }
        if let Some(amount) = self.capture_amount(&self.gold, line) {
            events.push(DomainEvent::gold_gain(amount));
        }

        if events.is_empty() {
            trace!("No grammar matched: {:?}", line);
        } else {
            debug!("Extracted {} event(s) from {:?}", events.len(), line);
        }
        events
    }

    fn loot(&self, line: &str) -> Option<DomainEvent> {
        let caps = self.loot.captures(line)?;
        let name = caps.get(1)?.as_str().trim();
        let amount = match caps.get(2) {
            Some(m) => parse_amount(m.as_str())?,
            None => 1,
        };

        if name.eq_ignore_ascii_case("gold") {
            Some(DomainEvent::gold_gain(amount))
        } else {
            Some(DomainEvent::loot(name, infer_quality(name), amount))
        }
    }

    fn kill_target(&self, line: &str) -> Option<String> {
        let caps = self
            .kill_trailing
            .captures(line)
            .or_else(|| self.kill_lead_in.captures(line))?;
        Some(target_name(&caps))
    }

    fn capture_amount(&self, grammar: &Regex, line: &str) -> Option<i64> {
        let caps = grammar.captures(line)?;
        parse_amount(caps.get(1)?.as_str())
    }
}

/// Bracketed name if present, else the bare word
fn target_name(caps: &Captures<'_>) -> String {
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().trim())
        .filter(|name| !name.is_empty())
        .unwrap_or(UNKNOWN_TARGET)
        .to_string()
}

/// Digits to an amount; anything that overflows `i64` drops the event
fn parse_amount(digits: &str) -> Option<i64> {
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ItemQuality;

    fn extractor() -> TextExtractor {
        TextExtractor::new().unwrap()
    }

    #[test]
    fn test_loot_with_amount() {
        let events = extractor().extract("You receive: [Healing Potion] x3");
        assert_eq!(events.len(), 1);
        match &events[0] {
            DomainEvent::LootItem {
                name,
                amount,
                quality,
                ..
            } => {
                assert_eq!(name, "Healing Potion");
                assert_eq!(*amount, 3);
                assert_eq!(*quality, ItemQuality::Common);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_loot_without_amount_defaults_to_one() {
        let events = extractor().extract("You receive: [Epic Sword]");
        assert!(matches!(
            &events[..],
            [DomainEvent::LootItem { amount: 1, quality: ItemQuality::Epic, .. }]
        ));
    }

    #[test]
    fn test_gold_loot_becomes_currency() {
        let events = extractor().extract("You receive: [Gold] x5");
        assert!(matches!(&events[..], [DomainEvent::GoldGain { amount: 5, .. }]));

        let events = extractor().extract("you RECEIVE: [gold]");
        assert!(matches!(&events[..], [DomainEvent::GoldGain { amount: 1, .. }]));
    }

    #[test]
    fn test_experience_lead_ins() {
        let ex = extractor();
        for line in [
            "You gained 150 experience",
            "You gain 150 exp",
            "Received 150 XP",
            "got 150 experience",
            "+150 xp",
        ] {
            let events = ex.extract(line);
            assert!(
                matches!(&events[..], [DomainEvent::ExpGain { amount: 150, .. }]),
                "{}: {:?}",
                line,
                events
            );
        }
    }

    #[test]
    fn test_experience_needs_unit() {
        assert!(extractor().extract("You gained 150 friends").is_empty());
    }

    #[test]
    fn test_kill_bracketed_and_bare() {
        let ex = extractor();
        let names: Vec<String> = [
            "You killed [Cave Troll]",
            "You have slain Goblin",
            "You defeated the Dragon",
            "[Dark Knight] has been defeated",
            "Wolf has been defeated by you",
        ]
        .iter()
        .flat_map(|line| ex.extract(line))
        .filter_map(|e| match e {
            DomainEvent::Kill { name, .. } => Some(name),
            _ => None,
        })
        .collect();

        assert_eq!(
            names,
            vec!["Cave Troll", "Goblin", "Dragon", "Dark Knight", "Wolf"]
        );
    }

    #[test]
    fn test_spent_gold() {
        let events = extractor().extract("You spent 250 Gold on repairs");
        assert!(matches!(&events[..], [DomainEvent::GoldSpend { amount: 250, .. }]));
    }

    #[test]
    fn test_received_gold_text() {
        let events = extractor().extract("You looted 12 coins");
        assert!(matches!(&events[..], [DomainEvent::GoldGain { amount: 12, .. }]));
    }

    #[test]
    fn test_multiple_grammars_fire() {
        let events = extractor().extract("You killed [Boar] and gained 40 exp");
        let kinds: Vec<_> = events.iter().map(DomainEvent::kind).collect();
        assert_eq!(kinds, vec!["exp_gain", "kill"]);
    }

    #[test]
    fn test_overflowing_amount_is_dropped() {
        let events = extractor().extract("You receive: [Gem] x99999999999999999999999");
        assert!(events.is_empty());
    }

    #[test]
    fn test_unrelated_text() {
        assert!(extractor().extract("Hello there").is_empty());
        assert!(extractor().extract("").is_empty());
    }
}
