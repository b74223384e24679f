mod conflicts;
mod retrieval;
mod scoring;
mod store;
mod versions;

pub use conflicts::{ConflictDetector, StoreConflictDetector};
pub use retrieval::RmcRetriever;
pub use scoring::ScoringEngine;
pub use store::MemoryStore;
pub use versions::{successor_links, VersionTreeManager};
