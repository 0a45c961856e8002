// Loading the base boundary list. The one failure that aborts a run.

use halalan_common::FeatureCollection;
use tracing::info;

use crate::error::{MapError, Result};

/// Load the GeoJSON locality list from a file path or an `http(s)` URL.
pub async fn load_localities(location: &str) -> Result<FeatureCollection> {
    let load_failed = |reason: String| MapError::LoadFailed {
        location: location.to_string(),
        reason,
    };

    let body = if is_remote(location) {
        fetch_remote(location).await.map_err(|e| load_failed(e.to_string()))?
    } else {
        tokio::fs::read(location)
            .await
            .map_err(|e| load_failed(e.to_string()))?
    };

    let collection: FeatureCollection =
        serde_json::from_slice(&body).map_err(|e| load_failed(e.to_string()))?;
    info!(location, features = collection.features.len(), "Locality list loaded");
    Ok(collection)
}

fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

async fn fetch_remote(url: &str) -> std::result::Result<Vec<u8>, reqwest::Error> {
    let resp = reqwest::get(url).await?.error_for_status()?;
    Ok(resp.bytes().await?.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn loads_feature_collection_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Barangays.json");
        std::fs::write(
            &path,
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","properties":{"REGION":"Region XI","NAME_3":"Pico"},"geometry":null}
            ]}"#,
        )
        .unwrap();

        let collection = load_localities(path.to_str().unwrap()).await.unwrap();
        assert_eq!(collection.features.len(), 1);
        assert_eq!(collection.features[0].properties.barangay.as_deref(), Some("Pico"));
    }

    #[tokio::test]
    async fn missing_file_is_a_load_failure() {
        let err = load_localities("/definitely/not/here.json").await.unwrap_err();
        assert!(matches!(err, MapError::LoadFailed { .. }));
    }

    #[tokio::test]
    async fn malformed_file_is_a_load_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = load_localities(path.to_str().unwrap()).await.unwrap_err();
        assert!(matches!(err, MapError::LoadFailed { .. }));
    }
}
