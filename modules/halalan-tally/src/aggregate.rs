// Precinct → barangay vote aggregation.
//
// Counts are summed exactly as u64; only percentages and turnout are
// rounded, to two decimals, at the very end.

use std::collections::HashMap;

use halalan_common::{PrecinctRecord, RaceCategory};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateTally {
    pub name: String,
    pub votes: u64,
    pub percentage: f64,
}

/// Aggregated results of one barangay. `categories[i]` is the tally of
/// `PrecinctRecord::national[i]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarangayTally {
    pub turnout: f64,
    pub categories: Vec<Vec<CandidateTally>>,
}

impl BarangayTally {
    pub fn category(&self, category: RaceCategory) -> &[CandidateTally] {
        self.categories
            .get(category.index())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Highest-voted entry of a category.
    pub fn top(&self, category: RaceCategory) -> Option<&CandidateTally> {
        self.category(category).first()
    }
}

/// Sum one race category across precincts.
///
/// Sorted by votes descending; equal counts keep first-encountered order.
pub fn tally(precincts: &[PrecinctRecord], category_index: usize) -> Vec<CandidateTally> {
    let mut totals = RunningTotals::default();
    for race in precincts.iter().filter_map(|p| p.race(category_index)) {
        for candidate in race {
            totals.add(&candidate.name, candidate.votes);
        }
    }

    let grand_total = totals.grand_total;
    let mut tallies: Vec<CandidateTally> = totals
        .into_entries()
        .map(|(name, votes)| CandidateTally {
            name,
            votes,
            percentage: percentage(votes, grand_total),
        })
        .collect();
    tallies.sort_by(|a, b| b.votes.cmp(&a.votes));
    tallies
}

/// Mean precinct turnout, rounded to two decimals. Zero for no precincts.
pub fn turnout(precincts: &[PrecinctRecord]) -> f64 {
    if precincts.is_empty() {
        return 0.0;
    }
    let sum: f64 = precincts.iter().map(PrecinctRecord::turnout).sum();
    round2(sum / precincts.len() as f64)
}

/// Turnout plus a tally for every race category any precinct reports.
pub fn aggregate_barangay(precincts: &[PrecinctRecord]) -> BarangayTally {
    let category_count = precincts.iter().map(|p| p.national.len()).max().unwrap_or(0);
    BarangayTally {
        turnout: turnout(precincts),
        categories: (0..category_count).map(|i| tally(precincts, i)).collect(),
    }
}

fn percentage(votes: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round2(votes as f64 / total as f64 * 100.0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Insertion-ordered name → votes accumulator.
#[derive(Debug, Default)]
struct RunningTotals {
    index: HashMap<String, usize>,
    entries: Vec<(String, u64)>,
    grand_total: u64,
}

impl RunningTotals {
    fn add(&mut self, name: &str, votes: u64) {
        self.grand_total += votes;
        match self.index.get(name) {
            Some(&i) => self.entries[i].1 += votes,
            None => {
                self.index.insert(name.to_string(), self.entries.len());
                self.entries.push((name.to_string(), votes));
            }
        }
    }

    fn into_entries(self) -> impl Iterator<Item = (String, u64)> {
        self.entries.into_iter()
    }
}

/// Overall leader of a category across many barangays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leader {
    pub name: String,
    pub votes: u64,
}

/// Sums barangay tallies of one category for a whole run.
#[derive(Debug, Default)]
pub struct CategoryTotals {
    totals: RunningTotals,
}

impl CategoryTotals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, tally: &[CandidateTally]) {
        for candidate in tally {
            self.totals.add(&candidate.name, candidate.votes);
        }
    }

    /// Name with the most votes; the first to reach the maximum wins ties.
    /// `None` until some candidate has a vote.
    pub fn leader(&self) -> Option<Leader> {
        let mut best: Option<&(String, u64)> = None;
        for entry in &self.totals.entries {
            if entry.1 > best.map_or(0, |b| b.1) {
                best = Some(entry);
            }
        }
        best.map(|(name, votes)| Leader {
            name: name.clone(),
            votes: *votes,
        })
    }
}

/// Overall leader of one race.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryLeader {
    pub category: RaceCategory,
    pub leader: Option<Leader>,
}

/// One `CategoryTotals` per race, fed from whole barangay tallies.
#[derive(Debug, Default)]
pub struct RaceTotals {
    totals: [CategoryTotals; RaceCategory::ALL.len()],
}

impl RaceTotals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, tally: &BarangayTally) {
        for category in RaceCategory::ALL {
            self.totals[category.index()].add(tally.category(category));
        }
    }

    pub fn leader(&self, category: RaceCategory) -> Option<Leader> {
        self.totals[category.index()].leader()
    }

    /// Leaders of every race, in `RaceCategory::ALL` order.
    pub fn leaders(&self) -> Vec<CategoryLeader> {
        RaceCategory::ALL
            .into_iter()
            .map(|category| CategoryLeader {
                category,
                leader: self.leader(category),
            })
            .collect()
    }
}
