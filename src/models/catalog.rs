//! Read-only rank master data.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::RankId;

/// One rank tier as stored in the master table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankEntry {
    pub id: RankId,
    pub name: String,
    #[serde(default)]
    pub name_ja: String,
}

/// Lookup of rank tiers by id.
///
/// Built once from storage and handed to whatever needs rank names.
#[derive(Debug, Clone, Default)]
pub struct RankCatalog {
    entries: BTreeMap<RankId, RankEntry>,
}

impl RankCatalog {
    pub fn new(entries: impl IntoIterator<Item = RankEntry>) -> Self {
        Self {
            entries: entries.into_iter().map(|e| (e.id, e)).collect(),
        }
    }

    pub fn get(&self, id: RankId) -> Option<&RankEntry> {
        self.entries.get(&id)
    }

    /// Ranks at or above `min_rank`, ascending.
    pub fn at_or_above(&self, min_rank: RankId) -> impl Iterator<Item = &RankEntry> {
        self.entries.range(min_rank..).map(|(_, e)| e)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: u32, name: &str) -> RankEntry {
        RankEntry {
            id: RankId(id),
            name: name.to_string(),
            name_ja: String::new(),
        }
    }

    #[test]
    fn test_catalog_lookup() {
        let catalog = RankCatalog::new(vec![entry(4, "Diamond I"), entry(1, "Bronze I")]);
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get(RankId(4)).unwrap().name, "Diamond I");
        assert!(catalog.get(RankId(9)).is_none());
    }

    #[test]
    fn test_catalog_at_or_above_is_ordered() {
        let catalog = RankCatalog::new(vec![
            entry(6, "Diamond III"),
            entry(3, "Gold III"),
            entry(4, "Diamond I"),
        ]);
        let ids: Vec<_> = catalog.at_or_above(RankId(4)).map(|e| e.id.get()).collect();
        assert_eq!(ids, vec![4, 6]);
    }
}
