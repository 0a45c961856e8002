// Where per-city datasets come from.
//
// DatasetSource is the network seam: the fetcher only ever asks for a
// CityAddress, so tests swap in MockSource and offline runs can point at a
// local mirror of the same directory layout.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use halalan_common::{normalize_component, CityDataset};
use tracing::debug;
use url::Url;

use crate::error::{ArchiveError, Result};

/// Remote location of one city's document: `<REGION>/<PROVINCE>/<CITY>.json`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CityAddress {
    region: String,
    province: String,
    city: String,
}

impl CityAddress {
    pub fn new(region: &str, province: &str, city: &str) -> Self {
        Self {
            region: normalize_component(region),
            province: normalize_component(province),
            city: normalize_component(city),
        }
    }

    /// Unencoded path segments, the last one carrying the `.json` extension.
    pub fn segments(&self) -> [String; 3] {
        [
            self.region.clone(),
            self.province.clone(),
            format!("{}.json", self.city),
        ]
    }

    pub fn relative_path(&self) -> String {
        self.segments().join("/")
    }
}

#[async_trait]
pub trait DatasetSource: Send + Sync {
    /// Read and parse one city's dataset.
    async fn fetch(&self, address: &CityAddress) -> Result<CityDataset>;
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

pub struct HttpDatasetSource {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpDatasetSource {
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self> {
        let mut base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(ArchiveError::InvalidUrl(base_url.to_string()));
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            base_url,
        })
    }

    /// Percent-encoded document URL for a city.
    pub fn url_for(&self, address: &CityAddress) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(address.segments());
        }
        url
    }
}

#[async_trait]
impl DatasetSource for HttpDatasetSource {
    async fn fetch(&self, address: &CityAddress) -> Result<CityDataset> {
        let url = self.url_for(address);
        debug!(url = %url, "Fetching city dataset");

        let resp = self.client.get(url.clone()).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ArchiveError::NotFound {
                location: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = resp.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

// ---------------------------------------------------------------------------
// Local mirror
// ---------------------------------------------------------------------------

/// Reads datasets from a directory laid out like the remote tree.
pub struct FileDatasetSource {
    root: PathBuf,
}

impl FileDatasetSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, address: &CityAddress) -> PathBuf {
        address
            .segments()
            .iter()
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }
}

#[async_trait]
impl DatasetSource for FileDatasetSource {
    async fn fetch(&self, address: &CityAddress) -> Result<CityDataset> {
        let path = self.path_for(address);
        debug!(path = %path.display(), "Reading city dataset");

        let body = match tokio::fs::read(&path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ArchiveError::NotFound {
                    location: path.display().to_string(),
                    status: 404,
                });
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answer a single request with `status` and `body`; returns the base URL.
    async fn serve_once(status: &str, body: &str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = vec![0u8; 4096];
            let _ = socket.read(&mut request).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        });
        format!("http://{addr}/data/")
    }

    #[tokio::test]
    async fn http_non_success_status_is_not_found() {
        let base = serve_once("404 Not Found", "404: Not Found").await;
        let source = HttpDatasetSource::new(&base, Some(Duration::from_secs(5))).unwrap();

        let result = source.fetch(&CityAddress::new("CAR", "BENGUET", "BUGUIAS")).await;
        match result {
            Err(ArchiveError::NotFound { location, status }) => {
                assert_eq!(status, 404);
                assert!(location.ends_with("/data/CAR/BENGUET/BUGUIAS.json"));
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn http_malformed_body_is_parse_error() {
        let base = serve_once("200 OK", "{\"data\": [oops").await;
        let source = HttpDatasetSource::new(&base, Some(Duration::from_secs(5))).unwrap();

        let result = source.fetch(&CityAddress::new("CAR", "BENGUET", "LA TRINIDAD")).await;
        assert!(matches!(result, Err(ArchiveError::Parse(_))), "got {result:?}");
    }

    #[tokio::test]
    async fn http_success_parses_dataset() {
        let base = serve_once("200 OK", r#"{"data":[{"barangayName":"PICO","data":[]}]}"#).await;
        let source = HttpDatasetSource::new(&base, Some(Duration::from_secs(5))).unwrap();

        let dataset = source
            .fetch(&CityAddress::new("CAR", "BENGUET", "LA TRINIDAD"))
            .await
            .unwrap();
        assert_eq!(dataset.data[0].barangay_name, "PICO");
    }

    #[test]
    fn address_uppercases_segments() {
        let address = CityAddress::new("Calabarzon", "laguna", "City of Calamba");
        assert_eq!(address.relative_path(), "CALABARZON/LAGUNA/CITY OF CALAMBA.json");
    }

    #[test]
    fn url_is_percent_encoded_under_base() {
        let source = HttpDatasetSource::new("https://example.org/data/minified_local", None).unwrap();
        let url = source.url_for(&CityAddress::new("CALABARZON", "LAGUNA", "CITY OF CALAMBA"));
        assert_eq!(
            url.as_str(),
            "https://example.org/data/minified_local/CALABARZON/LAGUNA/CITY%20OF%20CALAMBA.json"
        );
    }

    #[test]
    fn same_triple_same_url() {
        let source = HttpDatasetSource::new("https://example.org/", None).unwrap();
        let a = source.url_for(&CityAddress::new("car", " Benguet", "la  trinidad"));
        let b = source.url_for(&CityAddress::new("CAR", "BENGUET", "LA TRINIDAD"));
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_non_base_url() {
        assert!(HttpDatasetSource::new("mailto:someone@example.org", None).is_err());
        assert!(HttpDatasetSource::new("not a url", None).is_err());
    }

    #[tokio::test]
    async fn file_source_reads_mirror_layout() {
        let dir = tempfile::tempdir().unwrap();
        let city_dir = dir.path().join("CAR").join("BENGUET");
        std::fs::create_dir_all(&city_dir).unwrap();
        std::fs::write(
            city_dir.join("LA TRINIDAD.json"),
            r#"{"data":[{"barangayName":"PICO","data":[]}]}"#,
        )
        .unwrap();

        let source = FileDatasetSource::new(dir.path());
        let dataset = source
            .fetch(&CityAddress::new("CAR", "BENGUET", "LA TRINIDAD"))
            .await
            .unwrap();
        assert_eq!(dataset.data[0].barangay_name, "PICO");

        let missing = source.fetch(&CityAddress::new("CAR", "BENGUET", "BUGUIAS")).await;
        assert!(matches!(missing, Err(ArchiveError::NotFound { status: 404, .. })));
    }
}
