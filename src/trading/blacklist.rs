//! Time-limited suppression of (pattern type, ticker) pairs

use std::collections::HashMap;

use crate::formations::PatternType;
use crate::{PatternError, Result};

/// TTL-keyed set checked before a pattern is admitted as trade
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Blacklist {
    ttl_secs: i64,
    entries: HashMap<(PatternType, String), i64>,
}

impl Blacklist {
    pub fn new(ttl_secs: i64) -> Self {
        Self {
            ttl_secs,
            entries: HashMap::new(),
        }
    }

    /// Suppress the pair until `now + ttl`. A later insert extends it.
    pub fn insert(&mut self, pattern_type: PatternType, ticker: &str, now: i64) {
        let expires_at = now + self.ttl_secs;
        log::warn!("black-listed {pattern_type} for {ticker} until {expires_at}");
        self.entries
            .entry((pattern_type, ticker.to_string()))
            .and_modify(|e| *e = (*e).max(expires_at))
            .or_insert(expires_at);
    }

    pub fn contains(&self, pattern_type: PatternType, ticker: &str, now: i64) -> bool {
        self.entries
            .get(&(pattern_type, ticker.to_string()))
            .is_some_and(|expires_at| now < *expires_at)
    }

    /// `Err(Blacklisted)` while the pair is suppressed
    pub fn check(&self, pattern_type: PatternType, ticker: &str, now: i64) -> Result<()> {
        if self.contains(pattern_type, ticker, now) {
            return Err(PatternError::Blacklisted {
                pattern_type,
                ticker: ticker.to_string(),
            });
        }
        Ok(())
    }

    /// Drop expired entries; returns how many were removed.
    pub fn prune(&mut self, now: i64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, expires_at| now < *expires_at);
        before - self.entries.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_expires_after_ttl() {
        let mut blacklist = Blacklist::new(100);
        blacklist.insert(PatternType::Channel, "BTC", 1_000);
        assert!(blacklist.contains(PatternType::Channel, "BTC", 1_099));
        assert!(!blacklist.contains(PatternType::Channel, "BTC", 1_100));
        assert!(!blacklist.contains(PatternType::Triangle, "BTC", 1_050));
        assert!(!blacklist.contains(PatternType::Channel, "ETH", 1_050));
    }

    #[test]
    fn test_check_reports_pair() {
        let mut blacklist = Blacklist::new(100);
        blacklist.insert(PatternType::TkeUp, "BTC", 0);
        match blacklist.check(PatternType::TkeUp, "BTC", 10) {
            Err(PatternError::Blacklisted { pattern_type, ticker }) => {
                assert_eq!(pattern_type, PatternType::TkeUp);
                assert_eq!(ticker, "BTC");
            },
            other => panic!("expected Blacklisted, got {other:?}"),
        }
        assert!(blacklist.check(PatternType::TkeUp, "BTC", 100).is_ok());
    }

    #[test]
    fn test_prune_and_extend() {
        let mut blacklist = Blacklist::new(100);
        blacklist.insert(PatternType::Channel, "BTC", 0);
        blacklist.insert(PatternType::Channel, "BTC", 50);
        blacklist.insert(PatternType::Channel, "ETH", 0);
        assert_eq!(blacklist.prune(120), 1);
        assert_eq!(blacklist.len(), 1);
        assert!(blacklist.contains(PatternType::Channel, "BTC", 120));
        assert_eq!(blacklist.prune(150), 1);
        assert!(blacklist.is_empty());
    }
}
