/*!
Eviction strategies.

A strategy picks which tab to drop when a new one does not fit. The registry
only ever offers it closable tabs, in list order, so a strategy cannot
select a pinned tab.
*/

use crate::tab::Tab;
use crate::TabkeepError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Policy choosing an eviction candidate.
pub trait EvictionStrategy: Send + Sync {
    /// Pick one of `candidates` to evict, or `None` to refuse.
    ///
    /// `candidates` are closable tabs in list order.
    fn select<'a>(&self, candidates: &[&'a Tab]) -> Option<&'a Tab>;

    /// Name used in logs
    fn name(&self) -> &str;
}

/// Built-in strategies selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemovalStrategy {
    /// Least recently accessed
    #[default]
    Lru,
    /// Earliest created
    Oldest,
    /// First temporary tab, else the last closable one
    Temporary,
    /// Never evict; adding to a full registry fails
    Manual,
}

impl RemovalStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lru => "lru",
            Self::Oldest => "oldest",
            Self::Temporary => "temporary",
            Self::Manual => "manual",
        }
    }
}

impl EvictionStrategy for RemovalStrategy {
    fn select<'a>(&self, candidates: &[&'a Tab]) -> Option<&'a Tab> {
        let candidates = candidates.iter().copied().filter(|t| t.closable);
        match self {
            // min_by_key keeps the first of equal keys, so ties go to list order
            Self::Lru => candidates.min_by_key(|t| t.last_accessed),
            Self::Oldest => candidates.min_by_key(|t| t.created_at),
            Self::Temporary => {
                let closable: Vec<&Tab> = candidates.collect();
                closable
                    .iter()
                    .copied()
                    .find(|t| t.temporary)
                    .or_else(|| closable.last().copied())
            }
            Self::Manual => None,
        }
    }

    fn name(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for RemovalStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RemovalStrategy {
    type Err = TabkeepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lru" => Ok(Self::Lru),
            "oldest" => Ok(Self::Oldest),
            "temporary" => Ok(Self::Temporary),
            "manual" => Ok(Self::Manual),
            other => Err(TabkeepError::config(format!(
                "Unknown removal strategy: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tab::NewTab;
    use chrono::{DateTime, Utc};

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(ms).unwrap()
    }

    fn tab(id: &str, created: i64, accessed: i64) -> Tab {
        let mut tab = Tab::from_new(NewTab::new(id, format!("/{id}")), id.to_string(), at(created));
        tab.last_accessed = at(accessed);
        tab
    }

    #[test]
    fn test_lru_picks_least_recently_accessed() {
        let a = tab("a", 0, 300);
        let b = tab("b", 100, 100);
        let c = tab("c", 200, 400);

        let picked = RemovalStrategy::Lru.select(&[&a, &b, &c]).unwrap();
        assert_eq!(picked.id, "b");
    }

    #[test]
    fn test_lru_ties_go_to_list_order() {
        let a = tab("a", 0, 100);
        let b = tab("b", 0, 100);

        let picked = RemovalStrategy::Lru.select(&[&a, &b]).unwrap();
        assert_eq!(picked.id, "a");
    }

    #[test]
    fn test_oldest_picks_earliest_created() {
        let a = tab("a", 50, 50);
        let b = tab("b", 10, 900);

        let picked = RemovalStrategy::Oldest.select(&[&a, &b]).unwrap();
        assert_eq!(picked.id, "b");
    }

    #[test]
    fn test_temporary_prefers_temporary_tabs() {
        let a = tab("a", 0, 0);
        let mut b = tab("b", 0, 0);
        b.temporary = true;
        let c = tab("c", 0, 0);

        let picked = RemovalStrategy::Temporary.select(&[&a, &b, &c]).unwrap();
        assert_eq!(picked.id, "b");
    }

    #[test]
    fn test_temporary_falls_back_to_last_closable() {
        let a = tab("a", 0, 0);
        let b = tab("b", 0, 0);
        let mut c = tab("c", 0, 0);
        c.closable = false;

        let picked = RemovalStrategy::Temporary.select(&[&a, &b, &c]).unwrap();
        assert_eq!(picked.id, "b");
    }

    #[test]
    fn test_manual_never_selects() {
        let a = tab("a", 0, 0);
        assert!(RemovalStrategy::Manual.select(&[&a]).is_none());
    }

    #[test]
    fn test_non_closable_never_selected() {
        let mut a = tab("a", 0, 0);
        a.closable = false;
        let b = tab("b", 10, 10);

        for strategy in [RemovalStrategy::Lru, RemovalStrategy::Oldest, RemovalStrategy::Temporary] {
            assert_eq!(strategy.select(&[&a, &b]).unwrap().id, "b");
            assert!(strategy.select(&[&a]).is_none());
        }
    }

    #[test]
    fn test_parse_strategy() {
        assert_eq!("LRU".parse::<RemovalStrategy>().unwrap(), RemovalStrategy::Lru);
        assert_eq!(" manual ".parse::<RemovalStrategy>().unwrap(), RemovalStrategy::Manual);
        assert!("random".parse::<RemovalStrategy>().is_err());
    }
}
