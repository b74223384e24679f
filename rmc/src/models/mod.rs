mod common;
mod conflict;
mod entry;
mod extraction;
mod relation;
mod retrieval;

pub use common::*;
pub use conflict::*;
pub use entry::*;
pub use extraction::*;
pub use relation::*;
pub use retrieval::*;
