// What the renderer reads: the enriched FeatureCollection and the legend.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use halalan_common::{FeatureCollection, RaceCategory};
use halalan_tally::{CategoryLeader, Leader, WinnerCount};
use serde::Serialize;
use tracing::debug;

use crate::error::Result;
use crate::session::{AreaOutcome, EnrichedFeature, RunReport};

/// Legend data: distinct winners by area count plus the overall leaders.
#[derive(Debug, Clone, Serialize)]
pub struct Legend {
    pub category: RaceCategory,
    pub winners: Vec<WinnerCount>,
    pub overall: Option<Leader>,
    pub overall_by_category: Vec<CategoryLeader>,
    pub generated_at: DateTime<Utc>,
}

impl Legend {
    pub fn from_report(report: &RunReport) -> Self {
        Self {
            category: report.category,
            winners: report.winners.clone(),
            overall: report.overall.clone(),
            overall_by_category: report.overall_by_category.clone(),
            generated_at: Utc::now(),
        }
    }
}

/// Enriched features ready for the renderer. Skipped features are dropped.
pub fn enriched_collection(
    features: &[EnrichedFeature],
    include_tally: bool,
) -> Result<FeatureCollection> {
    let features = features
        .iter()
        .filter(|f| f.outcome != AreaOutcome::Skipped)
        .map(|f| f.to_feature(include_tally))
        .collect::<Result<Vec<_>>>()?;
    Ok(FeatureCollection::new(features))
}

pub async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let body = serde_json::to_vec(value)?;
    tokio::fs::write(path, body).await?;
    debug!(path = %path.display(), "Wrote output");
    Ok(())
}

/// Blocking write through a sibling temp file, so a reader polling `path`
/// never sees a half-written snapshot.
///
/// Progress callbacks are synchronous, so this blocks the calling thread;
/// from inside the runtime wrap it in `tokio::task::block_in_place`.
pub fn write_snapshot<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let tmp = snapshot_tmp_path(path);
    std::fs::write(&tmp, serde_json::to_vec(value)?)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn snapshot_tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}
