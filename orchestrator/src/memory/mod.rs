//! Episode memory: the data model, the bounded store, and retrieval ranking.

pub mod episode;
pub mod retrieval;
pub mod store;

pub use episode::{CandidateOutcome, Episode};
pub use store::{ContextStore, SharedContextStore};
