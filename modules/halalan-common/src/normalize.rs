// Locality name normalization.
//
// The normalized names double as the cache key and as the remote address of
// a city's dataset, so every call site goes through this one module.

use std::borrow::Cow;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static RE_PARENTHESIZED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(([^)]+)\)").unwrap());
static RE_WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// The one region whose raw name is kept even if it carries a parenthesized alias.
const METRO_MANILA: &str = "METROPOLITAN MANILA";

/// What a mis-decoded `ñ` shows up as in the boundary files.
const REPLACEMENT_CHAR: char = '\u{FFFD}';

/// Fully normalized (region, province, city, barangay) names of one locality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalityNames {
    pub region: String,
    pub province: String,
    pub city: String,
    pub barangay: String,
}

impl LocalityNames {
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::from_names(&self.region, &self.province, &self.city)
    }

    /// Label shown by the renderer: `BARANGAY, CITY, PROVINCE`.
    pub fn display_name(&self) -> String {
        format!("{}, {}, {}", self.barangay, self.city, self.province)
    }
}

/// `REGION|PROVINCE|CITY`, every segment normalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn from_names(region: &str, province: &str, city: &str) -> Self {
        Self(format!(
            "{}|{}|{}",
            normalize_component(region),
            normalize_component(province),
            normalize_component(city)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalize the raw attribute strings of one boundary feature.
///
/// Idempotent: feeding the output back in returns it unchanged.
pub fn normalize(region: &str, province: &str, city: &str, barangay: &str) -> LocalityNames {
    LocalityNames {
        region: normalize_component(&canonical_region(region.trim())),
        province: normalize_component(province),
        city: normalize_component(&canonical_city(city.trim())),
        barangay: normalize_component(&canonical_barangay(barangay.trim())),
    }
}

/// The final pass applied to every field: trim, repair the `ñ` placeholder,
/// collapse whitespace runs, uppercase.
///
/// Also used on its own for filter strings and dataset barangay names.
pub fn normalize_component(raw: &str) -> String {
    let repaired = raw.trim().replace(REPLACEMENT_CHAR, "ñ");
    RE_WHITESPACE.replace_all(&repaired, " ").to_uppercase()
}

/// `Region IV-A (CALABARZON)` -> `CALABARZON`.
fn canonical_region(raw: &str) -> Cow<'_, str> {
    if raw.eq_ignore_ascii_case(METRO_MANILA) {
        return Cow::Borrowed(raw);
    }
    match RE_PARENTHESIZED.captures(raw).and_then(|c| c.get(1)) {
        Some(alias) => Cow::Borrowed(alias.as_str()),
        None => Cow::Borrowed(raw),
    }
}

/// `Calamba City` -> `City of Calamba`.
fn canonical_city(raw: &str) -> Cow<'_, str> {
    if !raw.contains("City") || raw.to_uppercase().starts_with("CITY OF ") {
        return Cow::Borrowed(raw);
    }
    let base = raw.strip_suffix(" City").unwrap_or(raw);
    Cow::Owned(format!("City of {base}"))
}

/// `Sampaloc Poblacion` -> `Sampaloc Pob.`; a barangay named just `Poblacion` stays.
fn canonical_barangay(raw: &str) -> Cow<'_, str> {
    match raw.strip_suffix("Poblacion") {
        Some(prefix) if !prefix.is_empty() => Cow::Owned(format!("{prefix}Pob.")),
        _ => Cow::Borrowed(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// (raw region, province, city, barangay) -> expected normalized names.
    const VECTORS: &[([&str; 4], [&str; 4])] = &[
        (
            ["Region IV-A (CALABARZON)", "Laguna", "Calamba City", "Poblacion"],
            ["CALABARZON", "LAGUNA", "CITY OF CALAMBA", "POBLACION"],
        ),
        (
            ["Region IV-A (CALABARZON)", "Laguna", "Calamba City", "Sampaloc Poblacion"],
            ["CALABARZON", "LAGUNA", "CITY OF CALAMBA", "SAMPALOC POB."],
        ),
        (
            ["Metropolitan Manila", "Second District", "Quezon City", "Bagong  Silangan"],
            ["METROPOLITAN MANILA", "SECOND DISTRICT", "CITY OF QUEZON", "BAGONG SILANGAN"],
        ),
        (
            ["Cordillera Administrative Region (CAR)", " Benguet ", "La Trinidad", "Pico"],
            ["CAR", "BENGUET", "LA TRINIDAD", "PICO"],
        ),
        (
            ["Region I (Ilocos Region)", "Pangasinan", "Dasol", "Ba\u{FFFD}o"],
            ["ILOCOS REGION", "PANGASINAN", "DASOL", "BAÑO"],
        ),
        (
            ["Region VII (Central Visayas)", "Cebu", "City of Talisay", "Lagtang"],
            ["CENTRAL VISAYAS", "CEBU", "CITY OF TALISAY", "LAGTANG"],
        ),
        (
            ["Region XI", "Davao\tdel Sur", "Digos", "Zone I (Pob.)"],
            ["REGION XI", "DAVAO DEL SUR", "DIGOS", "ZONE I (POB.)"],
        ),
    ];

    fn run(raw: &[&str; 4]) -> LocalityNames {
        normalize(raw[0], raw[1], raw[2], raw[3])
    }

    #[test]
    fn shared_vectors() {
        for (raw, expected) in VECTORS {
            let got = run(raw);
            assert_eq!(
                [got.region.as_str(), got.province.as_str(), got.city.as_str(), got.barangay.as_str()],
                *expected,
                "raw input {raw:?}"
            );
        }
    }

    #[test]
    fn normalize_is_idempotent() {
        for (raw, _) in VECTORS {
            let once = run(raw);
            let twice = normalize(&once.region, &once.province, &once.city, &once.barangay);
            assert_eq!(once, twice, "raw input {raw:?}");
        }
    }

    #[test]
    fn cache_key_joins_normalized_segments() {
        let names = normalize("Region IV-A (CALABARZON)", "Laguna", "Calamba City", "Poblacion");
        assert_eq!(names.cache_key().as_str(), "CALABARZON|LAGUNA|CITY OF CALAMBA");
    }

    #[test]
    fn cache_key_ignores_source_variation() {
        let a = CacheKey::from_names("calabarzon", "  Laguna", "city of   calamba");
        let b = CacheKey::from_names("CALABARZON", "LAGUNA", "CITY OF CALAMBA");
        assert_eq!(a, b);
    }

    #[test]
    fn metro_manila_matched_case_insensitively() {
        let names = normalize("metropolitan manila", "x", "y", "z");
        assert_eq!(names.region, "METROPOLITAN MANILA");
        let names = normalize("National Capital Region (NCR)", "x", "y", "z");
        assert_eq!(names.region, "NCR");
    }

    #[test]
    fn display_name_orders_barangay_city_province() {
        let names = normalize("Region IV-A (CALABARZON)", "Laguna", "Calamba City", "Sampaloc Poblacion");
        assert_eq!(names.display_name(), "SAMPALOC POB., CITY OF CALAMBA, LAGUNA");
    }

    #[test]
    fn component_repairs_placeholder_and_whitespace() {
        assert_eq!(normalize_component("  Pe\u{FFFD}a   Blanca "), "PEÑA BLANCA");
    }

    #[test]
    fn city_of_prefix_is_not_doubled() {
        assert_eq!(run(&["Region VII", "Cebu", "City of Talisay", "Lagtang"]).city, "CITY OF TALISAY");
        assert_eq!(run(&["Region III", "Pampanga", "city of San Fernando", "Dolores"]).city, "CITY OF SAN FERNANDO");
        assert_eq!(run(&["Region V", "Camarines Sur", "Naga City", "Abella"]).city, "CITY OF NAGA");
    }
}
