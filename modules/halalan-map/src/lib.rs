pub mod error;
pub mod locality;
pub mod output;
pub mod scheduler;
pub mod session;

pub use error::{MapError, Result, SchedulerError};
pub use scheduler::{BatchScheduler, SchedulerMode};
pub use session::{AreaOutcome, EnrichedFeature, RunFilter, RunReport, RunSession};
