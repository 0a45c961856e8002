// Test double for the dataset network seam.
//
// MockSource: HashMap-based address→dataset, records every request and the
// peak number of concurrent fetches. Unregistered addresses are NotFound.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use halalan_common::CityDataset;

use crate::error::{ArchiveError, Result};
use crate::source::{CityAddress, DatasetSource};

pub struct MockSource {
    datasets: HashMap<String, CityDataset>,
    malformed: HashSet<String>,
    delay: Option<Duration>,
    requests: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl Default for MockSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSource {
    pub fn new() -> Self {
        Self {
            datasets: HashMap::new(),
            malformed: HashSet::new(),
            delay: None,
            requests: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn on_city(mut self, region: &str, province: &str, city: &str, dataset: CityDataset) -> Self {
        let path = CityAddress::new(region, province, city).relative_path();
        self.datasets.insert(path, dataset);
        self
    }

    /// The address answers, but with a body that fails to parse.
    pub fn on_malformed(mut self, region: &str, province: &str, city: &str) -> Self {
        let path = CityAddress::new(region, province, city).relative_path();
        self.malformed.insert(path);
        self
    }

    /// Hold every fetch open for `delay` so concurrency becomes observable.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests_for(&self, region: &str, province: &str, city: &str) -> usize {
        let path = CityAddress::new(region, province, city).relative_path();
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|p| **p == path)
            .count()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DatasetSource for MockSource {
    async fn fetch(&self, address: &CityAddress) -> Result<CityDataset> {
        let path = address.relative_path();
        self.requests.lock().unwrap().push(path.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.malformed.contains(&path) {
            return Err(ArchiveError::Parse(format!("malformed body at {path}")));
        }
        self.datasets
            .get(&path)
            .cloned()
            .ok_or(ArchiveError::NotFound {
                location: path,
                status: 404,
            })
    }
}
