// Per-run state and the per-feature worker.
//
// Everything a run mutates lives here instead of in globals: the in-run
// dataset memo, the winner tracker and the category totals. A second
// session (or a test) starts from a clean slate.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use halalan_archive::CityDataFetcher;
use halalan_common::{
    normalize_component, CacheKey, CityDataset, GeoFeature, LocalityNames, RaceCategory,
};
use halalan_tally::{
    aggregate_barangay, BarangayTally, CategoryLeader, Leader, RaceTotals, WinnerCount, WinnerTracker,
};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::{MapError, Result};
use crate::scheduler::BatchScheduler;

/// Filter value meaning "no restriction".
pub const ALL: &str = "ALL";

const NO_DATA: &str = "No Data";
const ERROR: &str = "Error";

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// Region / province / city restriction chosen in the UI. `None` matches all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunFilter {
    region: Option<String>,
    province: Option<String>,
    city: Option<String>,
}

impl RunFilter {
    pub fn new(region: &str, province: &str, city: &str) -> Self {
        Self {
            region: filter_value(region),
            province: filter_value(province),
            city: filter_value(city),
        }
    }

    pub fn all() -> Self {
        Self::default()
    }

    pub fn matches(&self, names: &LocalityNames) -> bool {
        fn accepts(filter: &Option<String>, value: &str) -> bool {
            filter.as_deref().map_or(true, |f| f == value)
        }
        accepts(&self.region, &names.region)
            && accepts(&self.province, &names.province)
            && accepts(&self.city, &names.city)
    }
}

fn filter_value(raw: &str) -> Option<String> {
    let value = normalize_component(raw);
    (!value.is_empty() && value != ALL).then_some(value)
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AreaOutcome {
    Tallied {
        winner: String,
        votes: u64,
        tally: BarangayTally,
    },
    /// City dataset found, barangay missing from it.
    NoBarangayData,
    /// City dataset unavailable.
    NoCityData,
    /// Water feature; never looked up.
    Waterbody,
    /// Processing this feature failed.
    Failed,
    /// Outside the run filter; not emitted.
    Skipped,
}

/// A feature plus what the run found for it.
#[derive(Debug, Clone)]
pub struct EnrichedFeature {
    pub feature: GeoFeature,
    pub name: String,
    pub outcome: AreaOutcome,
}

impl EnrichedFeature {
    /// Winner label the renderer keys its colors on.
    pub fn winner_label(&self) -> &str {
        match &self.outcome {
            AreaOutcome::Tallied { winner, .. } => winner,
            AreaOutcome::NoBarangayData => NO_DATA,
            AreaOutcome::Failed => ERROR,
            AreaOutcome::NoCityData | AreaOutcome::Waterbody | AreaOutcome::Skipped => "",
        }
    }

    pub fn votes(&self) -> u64 {
        match &self.outcome {
            AreaOutcome::Tallied { votes, .. } => *votes,
            _ => 0,
        }
    }

    pub fn turnout(&self) -> Option<f64> {
        match &self.outcome {
            AreaOutcome::Tallied { tally, .. } => Some(tally.turnout),
            _ => None,
        }
    }

    /// The original feature with `_name`, `_winner`, `_votes`, `_turnout`
    /// and (optionally) `_tally` properties added.
    pub fn to_feature(&self, include_tally: bool) -> Result<GeoFeature> {
        let mut feature = self.feature.clone();
        let props = &mut feature.properties.extra;
        props.insert("_name".into(), Value::from(self.name.clone()));
        props.insert("_winner".into(), Value::from(self.winner_label()));
        props.insert("_votes".into(), Value::from(self.votes()));
        if let Some(turnout) = self.turnout() {
            props.insert("_turnout".into(), Value::from(turnout));
        }
        if include_tally {
            if let AreaOutcome::Tallied { tally, .. } = &self.outcome {
                props.insert("_tally".into(), serde_json::to_value(tally)?);
            }
        }
        Ok(feature)
    }
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub category: RaceCategory,
    /// Processed features in input order, `Skipped` ones removed.
    pub features: Vec<EnrichedFeature>,
    pub winners: Vec<WinnerCount>,
    /// Overall leader of the selected category.
    pub overall: Option<Leader>,
    /// Overall leader of every race, over the areas tallied this run.
    pub overall_by_category: Vec<CategoryLeader>,
    pub stats: RunStats,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub tallied: usize,
    pub no_barangay_data: usize,
    pub no_city_data: usize,
    pub waterbodies: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl RunStats {
    fn count(&mut self, outcome: &AreaOutcome) {
        match outcome {
            AreaOutcome::Tallied { .. } => self.tallied += 1,
            AreaOutcome::NoBarangayData => self.no_barangay_data += 1,
            AreaOutcome::NoCityData => self.no_city_data += 1,
            AreaOutcome::Waterbody => self.waterbodies += 1,
            AreaOutcome::Failed => self.failed += 1,
            AreaOutcome::Skipped => self.skipped += 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

type DatasetSlot = Arc<OnceCell<Option<Arc<CityDataset>>>>;

pub struct RunSession {
    run_id: Uuid,
    fetcher: CityDataFetcher,
    filter: RunFilter,
    category: RaceCategory,
    city_data: Mutex<HashMap<CacheKey, DatasetSlot>>,
    winners: Mutex<WinnerTracker>,
    totals: Mutex<RaceTotals>,
}

impl RunSession {
    pub fn new(fetcher: CityDataFetcher, filter: RunFilter, category: RaceCategory) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            fetcher,
            filter,
            category,
            city_data: Mutex::new(HashMap::new()),
            winners: Mutex::new(WinnerTracker::new()),
            totals: Mutex::new(RaceTotals::new()),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn category(&self) -> RaceCategory {
        self.category
    }

    /// Dataset for a locality's city. Concurrent callers asking for the same
    /// city share one in-flight resolution.
    pub async fn city_dataset(&self, names: &LocalityNames) -> Option<Arc<CityDataset>> {
        let slot = {
            let mut map = self.city_data.lock().unwrap_or_else(|e| e.into_inner());
            map.entry(names.cache_key()).or_default().clone()
        };
        slot.get_or_init(|| self.fetcher.resolve(&names.region, &names.province, &names.city))
            .await
            .clone()
    }

    /// Resolve, look up and tally one feature.
    pub async fn process_feature(&self, feature: &GeoFeature) -> Result<EnrichedFeature> {
        let props = &feature.properties;
        let names = props.names();

        if !self.filter.matches(&names) {
            return Ok(self.enriched(feature, names.display_name(), AreaOutcome::Skipped));
        }
        if props.is_waterbody() {
            return Ok(self.enriched(feature, props.waterbody_name(), AreaOutcome::Waterbody));
        }

        let display_name = names.display_name();
        let Some(dataset) = self.city_dataset(&names).await else {
            return Ok(self.enriched(feature, display_name, AreaOutcome::NoCityData));
        };
        let Some(barangay) = dataset.find_barangay(&names.barangay) else {
            return Ok(self.enriched(feature, display_name, AreaOutcome::NoBarangayData));
        };

        let tally = aggregate_barangay(&barangay.data);
        let top = tally.top(self.category).ok_or_else(|| MapError::EmptyTally {
            name: display_name.clone(),
            category: self.category,
        })?;
        let (winner, votes) = (top.name.clone(), top.votes);

        self.winners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .update(&winner);
        self.totals
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .add(&tally);

        Ok(self.enriched(
            feature,
            display_name,
            AreaOutcome::Tallied { winner, votes, tally },
        ))
    }

    /// Sentinel result for a feature whose processing failed.
    pub fn failed(&self, feature: &GeoFeature, error: MapError) -> EnrichedFeature {
        let names = feature.properties.names();
        warn!(
            region = %names.region,
            province = %names.province,
            city = %names.city,
            barangay = %names.barangay,
            error = %error,
            "Processing error"
        );
        self.enriched(feature, names.display_name(), AreaOutcome::Failed)
    }

    fn enriched(&self, feature: &GeoFeature, name: String, outcome: AreaOutcome) -> EnrichedFeature {
        EnrichedFeature {
            feature: feature.clone(),
            name,
            outcome,
        }
    }

    pub fn winners(&self) -> Vec<WinnerCount> {
        self.winners.lock().unwrap_or_else(|e| e.into_inner()).snapshot()
    }

    pub fn overall_leader(&self) -> Option<Leader> {
        self.totals
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .leader(self.category)
    }

    pub fn overall_leaders(&self) -> Vec<CategoryLeader> {
        self.totals.lock().unwrap_or_else(|e| e.into_inner()).leaders()
    }

    /// Process every feature through `scheduler`, reporting partial results
    /// to `on_progress` for incremental display.
    pub async fn run<P>(
        &self,
        scheduler: &BatchScheduler,
        features: &[GeoFeature],
        on_progress: P,
    ) -> RunReport
    where
        P: FnMut(&[EnrichedFeature]),
    {
        let span = info_span!("run", run_id = %self.run_id, category = %self.category);
        async {
            info!(
                features = features.len(),
                batch_size = scheduler.batch_size(),
                mode = ?scheduler.mode(),
                "Processing localities"
            );

            let results = scheduler
                .process_with_progress(
                    features,
                    |feature| self.process_feature(feature),
                    |feature, error| self.failed(feature, error),
                    on_progress,
                )
                .await;

            let mut stats = RunStats::default();
            for result in &results {
                stats.count(&result.outcome);
            }
            info!(?stats, "Run complete");

            RunReport {
                run_id: self.run_id,
                category: self.category,
                features: results
                    .into_iter()
                    .filter(|r| r.outcome != AreaOutcome::Skipped)
                    .collect(),
                winners: self.winners(),
                overall: self.overall_leader(),
                overall_by_category: self.overall_leaders(),
                stats,
            }
        }
        .instrument(span)
        .await
    }
}
