pub mod aggregate;
pub mod winners;

pub use aggregate::{
    aggregate_barangay, tally, turnout, BarangayTally, CandidateTally, CategoryLeader, CategoryTotals,
    Leader, RaceTotals,
};
pub use winners::{WinnerCount, WinnerTracker};
