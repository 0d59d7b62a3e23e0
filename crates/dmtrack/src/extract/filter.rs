//! Chat content filter
//!
//! Decides whether an inbound chat message is hidden from the host's own
//! chat window. The configuration lives in the shared snapshot so the
//! consumer can edit it while the host runs.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Terms written into a freshly created snapshot
pub const DEFAULT_TERMS: &[&str] = &["wts", "wtb", "wtt", "sell", "offer", "cheap", "obo", r"\[.*\]"];

/// Live filter settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub enabled: bool,
    pub terms: Vec<String>,
    /// Block messages carrying a linked item
    pub block_tagged: bool,
    /// Treat each term as a regular expression
    pub use_regex: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            terms: DEFAULT_TERMS.iter().map(|t| t.to_string()).collect(),
            block_tagged: false,
            use_regex: false,
        }
    }
}

impl FilterConfig {
    /// Comma separated term list, as stored in the snapshot
    pub fn terms_string(&self) -> String {
        self.terms.join(", ")
    }

    /// Split a comma separated list, trimming blanks and dropping empty terms
    pub fn parse_terms(text: &str) -> Vec<String> {
        text.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone)]
enum Matcher {
    Substring(String),
    Pattern(Regex),
}

/// `FilterConfig` compiled for repeated checks
#[derive(Debug, Clone)]
pub struct ContentFilter {
    config: FilterConfig,
    matchers: Vec<Matcher>,
}

impl ContentFilter {
    /// Compile a configuration.
    ///
    /// A term that is not a valid regex falls back to a substring match
    /// rather than disabling the whole filter.
    pub fn new(config: FilterConfig) -> Self {
        let matchers = config
            .terms
            .iter()
            .map(|term| term.trim())
            .filter(|term| !term.is_empty())
            .map(|term| {
                if config.use_regex {
                    match RegexBuilder::new(term).case_insensitive(true).build() {
                        Ok(re) => return Matcher::Pattern(re),
                        Err(e) => warn!("Filter term {:?} is not a valid regex: {}", term, e),
                    }
                }
                Matcher::Substring(term.to_lowercase())
            })
            .collect();
        Self { config, matchers }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Whether the message should be hidden
    pub fn should_block(&self, message: &str, tagged: bool) -> bool {
        if !self.config.enabled {
            return false;
        }
        if tagged && self.config.block_tagged {
            return true;
        }
        if self.matchers.is_empty() {
            return false;
        }

        let lower = message.to_lowercase();
        self.matchers.iter().any(|m| match m {
            Matcher::Substring(term) => lower.contains(term.as_str()),
            Matcher::Pattern(re) => re.is_match(message),
        })
    }
}

impl Default for ContentFilter {
    fn default() -> Self {
        Self::new(FilterConfig::default())
    }
}
