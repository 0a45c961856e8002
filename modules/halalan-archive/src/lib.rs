pub mod error;
pub mod fetcher;
pub mod source;
pub mod store;
#[cfg(feature = "test-support")]
pub mod testing;

pub use error::{ArchiveError, Result};
pub use fetcher::CityDataFetcher;
pub use source::{CityAddress, DatasetSource, FileDatasetSource, HttpDatasetSource};
pub use store::{CacheEntry, PersistentCache};
