pub mod config;
pub mod error;
pub mod normalize;
pub mod types;

pub use config::{Config, NegativeCachePolicy};
pub use error::{CommonError, Result};
pub use normalize::{normalize, normalize_component, CacheKey, LocalityNames};
pub use types::*;
