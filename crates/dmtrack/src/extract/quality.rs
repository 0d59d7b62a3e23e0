use crate::event::ItemQuality;

/// Name keywords per tier, highest tier first
const KEYWORDS: &[(ItemQuality, &[&str])] = &[
    (ItemQuality::Legendary, &["legendary", "divine"]),
    (ItemQuality::Epic, &["epic", "imperial"]),
    (ItemQuality::Rare, &["rare", "holy"]),
    (ItemQuality::Uncommon, &["uncommon", "large", "curious"]),
];

/// Guess an item's quality from keywords in its name.
///
/// Tiers are checked from the top down so the highest match wins. Names
/// without any keyword are `Common`; `Junk` is never inferred.
pub fn infer_quality(name: &str) -> ItemQuality {
    let lower = name.to_lowercase();
    KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|w| lower.contains(w)))
        .map(|(quality, _)| *quality)
        .unwrap_or(ItemQuality::Common)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_keyword_is_common() {
        assert_eq!(infer_quality("Healing Potion"), ItemQuality::Common);
        assert_eq!(infer_quality(""), ItemQuality::Common);
    }

    #[test]
    fn test_keywords_per_tier() {
        assert_eq!(infer_quality("Divine Blade"), ItemQuality::Legendary);
        assert_eq!(infer_quality("Imperial Helm"), ItemQuality::Epic);
        assert_eq!(infer_quality("Holy Water"), ItemQuality::Rare);
        assert_eq!(infer_quality("Large Healing Potion"), ItemQuality::Uncommon);
        assert_eq!(infer_quality("Curious Trinket"), ItemQuality::Uncommon);
    }

    #[test]
    fn test_highest_tier_wins() {
        assert_eq!(infer_quality("Rare Legendary Relic"), ItemQuality::Legendary);
        assert_eq!(infer_quality("Large Holy Shield"), ItemQuality::Rare);
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(infer_quality("EPIC sword"), ItemQuality::Epic);
    }

    #[test]
    fn test_uncommon_is_not_read_as_common_substring() {
        // "uncommon" sits above the Common default
        assert_eq!(infer_quality("Uncommon Ring"), ItemQuality::Uncommon);
    }
}
