use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CommonError;
use crate::normalize::{normalize, normalize_component, LocalityNames};

/// `TYPE_3` value marking a non-votable water feature.
pub const WATERBODY: &str = "Waterbody";

// ---------------------------------------------------------------------------
// Locality list (GeoJSON)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type", default = "feature_collection_kind")]
    pub kind: String,
    #[serde(default)]
    pub features: Vec<GeoFeature>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FeatureCollection {
    pub fn new(features: Vec<GeoFeature>) -> Self {
        Self {
            kind: feature_collection_kind(),
            features,
            extra: Map::new(),
        }
    }
}

fn feature_collection_kind() -> String {
    "FeatureCollection".to_string()
}

fn feature_kind() -> String {
    "Feature".to_string()
}

/// One barangay boundary. Geometry and unknown members pass through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoFeature {
    #[serde(rename = "type", default = "feature_kind")]
    pub kind: String,
    pub properties: LocalityProperties,
    #[serde(default)]
    pub geometry: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Raw boundary attributes. Anything not named here is kept in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocalityProperties {
    #[serde(rename = "REGION", default)]
    pub region: Option<String>,
    #[serde(rename = "PROVINCE", default)]
    pub province: Option<String>,
    #[serde(rename = "NAME_2", default)]
    pub city: Option<String>,
    #[serde(rename = "NAME_3", default)]
    pub barangay: Option<String>,
    #[serde(rename = "TYPE_3", default)]
    pub area_type: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LocalityProperties {
    pub fn is_waterbody(&self) -> bool {
        self.area_type.as_deref() == Some(WATERBODY)
    }

    pub fn names(&self) -> LocalityNames {
        normalize(
            self.region.as_deref().unwrap_or_default(),
            self.province.as_deref().unwrap_or_default(),
            self.city.as_deref().unwrap_or_default(),
            self.barangay.as_deref().unwrap_or_default(),
        )
    }

    /// Water features are labelled `NAME_3, PROVINCE` without the city rewrite.
    pub fn waterbody_name(&self) -> String {
        normalize_component(&format!(
            "{}, {}",
            self.barangay.as_deref().unwrap_or_default(),
            self.province.as_deref().unwrap_or_default()
        ))
    }
}

// ---------------------------------------------------------------------------
// Per-city dataset document
// ---------------------------------------------------------------------------

/// `{ data: [ { barangayName, data: [PrecinctRecord] } ] }`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CityDataset {
    #[serde(default)]
    pub data: Vec<BarangayEntry>,
}

impl CityDataset {
    /// Find a barangay by name. Both sides go through `normalize_component`.
    pub fn find_barangay(&self, name: &str) -> Option<&BarangayEntry> {
        let wanted = normalize_component(name);
        self.data
            .iter()
            .find(|b| normalize_component(&b.barangay_name) == wanted)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarangayEntry {
    #[serde(rename = "barangayName")]
    pub barangay_name: String,
    #[serde(default)]
    pub data: Vec<PrecinctRecord>,
}

/// One polling place. `national[0]` is senatorial, `national[1]` party-list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrecinctRecord {
    #[serde(default)]
    pub national: Vec<RaceResult>,
    #[serde(default)]
    pub information: Option<PrecinctInformation>,
}

impl PrecinctRecord {
    pub fn race(&self, category_index: usize) -> Option<&[CandidateVotes]> {
        self.national
            .get(category_index)
            .map(|r| r.candidates.candidates.as_slice())
    }

    pub fn turnout(&self) -> f64 {
        self.information.as_ref().map_or(0.0, |i| i.turnout)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RaceResult {
    #[serde(default)]
    pub candidates: CandidateList,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateList {
    #[serde(default)]
    pub candidates: Vec<CandidateVotes>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateVotes {
    pub name: String,
    #[serde(default)]
    pub votes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrecinctInformation {
    #[serde(default)]
    pub turnout: f64,
}

// ---------------------------------------------------------------------------
// Race category
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaceCategory {
    #[default]
    Senatorial,
    PartyList,
}

impl RaceCategory {
    pub const ALL: [RaceCategory; 2] = [RaceCategory::Senatorial, RaceCategory::PartyList];

    /// Position of this race in `PrecinctRecord::national`.
    pub fn index(self) -> usize {
        match self {
            RaceCategory::Senatorial => 0,
            RaceCategory::PartyList => 1,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.index() == index)
    }
}

impl fmt::Display for RaceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RaceCategory::Senatorial => write!(f, "senatorial"),
            RaceCategory::PartyList => write!(f, "party_list"),
        }
    }
}

impl FromStr for RaceCategory {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "senatorial" | "senator" | "senatorbrgyvotes" | "0" => Ok(RaceCategory::Senatorial),
            "party_list" | "partylist" | "party-list" | "partylistbrgyvotes" | "1" => {
                Ok(RaceCategory::PartyList)
            }
            other => Err(CommonError::UnknownCategory(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_document_parses() {
        let doc = serde_json::json!({
            "data": [{
                "barangayName": "SAMPALOC POB.",
                "data": [{
                    "national": [
                        {"candidates": {"candidates": [{"name": "A", "votes": 10}]}},
                        {"candidates": {"candidates": [{"name": "P", "votes": 4}]}}
                    ],
                    "information": {"turnout": 81.5}
                }]
            }]
        });
        let dataset: CityDataset = serde_json::from_value(doc).unwrap();
        let brgy = dataset.find_barangay("sampaloc  pob.").unwrap();
        assert_eq!(brgy.data[0].race(1).unwrap()[0].name, "P");
        assert_eq!(brgy.data[0].turnout(), 81.5);
        assert!(brgy.data[0].race(2).is_none());
    }

    #[test]
    fn feature_keeps_unknown_properties() {
        let doc = serde_json::json!({
            "type": "Feature",
            "properties": {"REGION": "Region XI", "NAME_3": "Lake", "TYPE_3": "Waterbody", "ID_3": 42},
            "geometry": null
        });
        let feature: GeoFeature = serde_json::from_value(doc).unwrap();
        assert!(feature.properties.is_waterbody());
        assert_eq!(feature.properties.extra["ID_3"], 42);

        let back = serde_json::to_value(&feature).unwrap();
        assert_eq!(back["properties"]["ID_3"], 42);
        assert_eq!(back["type"], "Feature");
    }

    #[test]
    fn category_parses_ui_values() {
        assert_eq!("senatorBrgyVotes".parse::<RaceCategory>().unwrap(), RaceCategory::Senatorial);
        assert_eq!("party-list".parse::<RaceCategory>().unwrap(), RaceCategory::PartyList);
        assert!("mayor".parse::<RaceCategory>().is_err());
        assert_eq!(RaceCategory::from_index(1), Some(RaceCategory::PartyList));
    }
}
