mod conflicts;
mod entries;
mod relations;

pub use conflicts::ConflictRepository;
pub use entries::{EntryRepository, EntrySearchHit};
pub use relations::RelationRepository;
