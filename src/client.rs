//! Connection scheduling for metadata attempts.
//!
//! [`PeerQueue`] decides which candidate is tried next;
//! [`ConnectionScheduler`] caps how many sessions run at once and recycles
//! each slot as soon as its session ends.

mod queue;
mod scheduler;
mod work;

pub use queue::PeerQueue;
pub use scheduler::{Admission, AdmitAll, AttemptOutcome, ConnectionScheduler};
pub use work::CandidateWork;
