//! Event completion and perfect-card ("gabarito") detection.

mod detector;

pub use detector::{find_perfect_users, CompletionOutcome, PerfectCardDetector};
