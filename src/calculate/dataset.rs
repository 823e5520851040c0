//! Dataset loading.
//!
//! Reads one window of match groups, battles, team links and star awards in
//! batches and joins them in memory into [`MatchOutcome`]s. The result is
//! immutable and shared by every aggregation kind of a run.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::models::{CharacterId, MatchGroup, MatchGroupId, MatchId, MatchOutcome, Team};
use crate::storage::{MatchSource, StorageError, WindowFilter};

/// A star player award for one match group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StarAward {
    pub group_id: MatchGroupId,
    pub character: CharacterId,
}

/// Counts of rows and matches excluded or repaired while loading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DataQuality {
    /// Matches without a single identified character on either side.
    pub unresolved_matches: u64,
    /// Matches where a character appeared on both sides.
    pub overlapping_teams: u64,
    /// Team link cells with no character id.
    pub missing_character_ids: u64,
    /// Matches kept with one empty side.
    pub one_sided_matches: u64,
    /// Child rows whose parent group or match is not part of the window.
    pub rows_outside_window: u64,
    /// Matches whose id was already loaded.
    pub duplicate_matches: u64,
}

impl DataQuality {
    /// Anomalies that changed what the aggregations see.
    pub fn anomalies(&self) -> u64 {
        self.unresolved_matches
            + self.overlapping_teams
            + self.missing_character_ids
            + self.duplicate_matches
    }
}

/// Sizes of a loaded dataset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DatasetSummary {
    pub match_groups: usize,
    pub matches: usize,
    pub star_awards: usize,
    pub characters: usize,
}

/// The in-memory window of matches every aggregation reads from.
#[derive(Debug, Clone, Default)]
pub struct StatsDataset {
    groups: BTreeMap<MatchGroupId, MatchGroup>,
    matches: Vec<MatchOutcome>,
    star_awards: Vec<StarAward>,
    participants: HashMap<MatchGroupId, BTreeSet<CharacterId>>,
    quality: DataQuality,
}

impl StatsDataset {
    pub fn builder() -> DatasetBuilder {
        DatasetBuilder::default()
    }

    /// Every resolved match, in load order. Can be called any number of times.
    pub fn matches(&self) -> impl Iterator<Item = &MatchOutcome> + '_ {
        self.matches.iter()
    }

    /// Every match group in the window, including groups without a resolved match.
    pub fn groups(&self) -> impl Iterator<Item = &MatchGroup> + '_ {
        self.groups.values()
    }

    pub fn group(&self, id: &MatchGroupId) -> Option<&MatchGroup> {
        self.groups.get(id)
    }

    pub fn star_awards(&self) -> &[StarAward] {
        &self.star_awards
    }

    /// Characters that played at least one resolved match of each group.
    pub fn participants_by_group(&self) -> &HashMap<MatchGroupId, BTreeSet<CharacterId>> {
        &self.participants
    }

    pub fn quality(&self) -> DataQuality {
        self.quality
    }

    pub fn summary(&self) -> DatasetSummary {
        let characters: BTreeSet<CharacterId> = self
            .participants
            .values()
            .flat_map(|set| set.iter().copied())
            .collect();

        DatasetSummary {
            match_groups: self.groups.len(),
            matches: self.matches.len(),
            star_awards: self.star_awards.len(),
            characters: characters.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[derive(Debug)]
struct PendingMatch {
    id: MatchId,
    group_id: MatchGroupId,
    winners: Vec<CharacterId>,
    losers: Vec<CharacterId>,
}

/// Index join used by the loader.
///
/// Rows must arrive parent first: groups, then matches, then team links.
/// Star awards only need their group.
#[derive(Debug, Default)]
pub struct DatasetBuilder {
    groups: BTreeMap<MatchGroupId, MatchGroup>,
    match_index: HashMap<MatchId, usize>,
    pending: Vec<PendingMatch>,
    star_awards: Vec<StarAward>,
    quality: DataQuality,
}

impl DatasetBuilder {
    pub fn add_group(&mut self, group: MatchGroup) {
        self.groups.insert(group.id.clone(), group);
    }

    /// Register a battle. Returns `false` if its group is unknown or the id repeats.
    pub fn add_match(&mut self, id: MatchId, group_id: MatchGroupId) -> bool {
        if !self.groups.contains_key(&group_id) {
            self.quality.rows_outside_window += 1;
            return false;
        }
        if self.match_index.contains_key(&id) {
            self.quality.duplicate_matches += 1;
            return false;
        }

        self.match_index.insert(id.clone(), self.pending.len());
        self.pending.push(PendingMatch {
            id,
            group_id,
            winners: Vec::new(),
            losers: Vec::new(),
        });
        true
    }

    /// Record one winner x loser row for a battle.
    pub fn add_team_link(
        &mut self,
        match_id: &MatchId,
        winner: Option<CharacterId>,
        loser: Option<CharacterId>,
    ) {
        let Some(&idx) = self.match_index.get(match_id) else {
            self.quality.rows_outside_window += 1;
            return;
        };

        let pending = &mut self.pending[idx];
        match winner {
            Some(c) => pending.winners.push(c),
            None => self.quality.missing_character_ids += 1,
        }
        match loser {
            Some(c) => pending.losers.push(c),
            None => self.quality.missing_character_ids += 1,
        }
    }

    pub fn add_star_award(&mut self, group_id: MatchGroupId, character: CharacterId) {
        if !self.groups.contains_key(&group_id) {
            self.quality.rows_outside_window += 1;
            return;
        }
        self.star_awards.push(StarAward {
            group_id,
            character,
        });
    }

    /// Resolve every pending battle into a [`MatchOutcome`].
    pub fn finish(self) -> StatsDataset {
        let mut quality = self.quality;
        let mut matches = Vec::with_capacity(self.pending.len());
        let mut participants: HashMap<MatchGroupId, BTreeSet<CharacterId>> = HashMap::new();

        for pending in self.pending {
            let winners = Team::new(pending.winners);
            let losers = Team::new(pending.losers);

            if winners.is_empty() && losers.is_empty() {
                quality.unresolved_matches += 1;
                continue;
            }
            if winners.overlaps(&losers) {
                quality.overlapping_teams += 1;
                continue;
            }
            if winners.is_empty() || losers.is_empty() {
                quality.one_sided_matches += 1;
            }

            // Groups are checked in add_match, so the lookup cannot miss.
            let Some(group) = self.groups.get(&pending.group_id) else {
                continue;
            };

            let outcome = MatchOutcome {
                match_id: pending.id,
                group_id: pending.group_id,
                map_id: group.map_id,
                rank_id: group.rank_id,
                mode_id: group.mode_id,
                winners,
                losers,
            };
            participants
                .entry(outcome.group_id.clone())
                .or_default()
                .extend(outcome.participants());
            matches.push(outcome);
        }

        StatsDataset {
            groups: self.groups,
            matches,
            star_awards: self.star_awards,
            participants,
            quality,
        }
    }
}

/// Load one window of matches from `source`.
///
/// Storage errors are returned as they are; data-quality problems are counted
/// in [`DataQuality`] and never fail the load.
pub fn load_dataset<S>(
    source: &S,
    filter: &WindowFilter,
    batch_size: usize,
) -> Result<StatsDataset, StorageError>
where
    S: MatchSource + ?Sized,
{
    let start = Instant::now();
    info!(
        "Loading match groups from {} (since {}, rank >= {})",
        source.describe(),
        filter.since,
        filter.min_rank
    );

    let mut builder = StatsDataset::builder();

    let pass = Instant::now();
    let mut rows = 0usize;
    for batch in source.match_groups(filter, batch_size) {
        let batch = batch?;
        rows += batch.len();
        debug!("Match group batch: {} rows", batch.len());
        for row in batch {
            builder.add_group(MatchGroup {
                id: row.id,
                map_id: row.map_id,
                rank_id: row.rank_id,
                mode_id: row.mode_id,
            });
        }
    }
    info!("Loaded {} match groups in {:?}", rows, pass.elapsed());

    let pass = Instant::now();
    let mut kept = 0usize;
    for batch in source.matches(filter, batch_size) {
        for row in batch? {
            if builder.add_match(row.id, row.group_id) {
                kept += 1;
            }
        }
    }
    info!("Loaded {} matches in {:?}", kept, pass.elapsed());

    let pass = Instant::now();
    let mut rows = 0usize;
    for batch in source.team_links(filter, batch_size) {
        let batch = batch?;
        rows += batch.len();
        for row in batch {
            builder.add_team_link(&row.match_id, row.winner, row.loser);
        }
    }
    info!("Loaded {} team links in {:?}", rows, pass.elapsed());

    let pass = Instant::now();
    let mut rows = 0usize;
    for batch in source.star_awards(filter, batch_size) {
        let batch = batch?;
        rows += batch.len();
        for row in batch {
            builder.add_star_award(row.group_id, row.character);
        }
    }
    info!("Loaded {} star awards in {:?}", rows, pass.elapsed());

    let dataset = builder.finish();
    let quality = dataset.quality();
    if quality.anomalies() > 0 {
        warn!(
            "Excluded or repaired data: {} unresolved, {} overlapping, {} missing ids, {} duplicates",
            quality.unresolved_matches,
            quality.overlapping_teams,
            quality.missing_character_ids,
            quality.duplicate_matches
        );
    }

    let summary = dataset.summary();
    info!(
        "Dataset ready: {} groups, {} matches, {} characters in {:?}",
        summary.match_groups,
        summary.matches,
        summary.characters,
        start.elapsed()
    );

    Ok(dataset)
}
