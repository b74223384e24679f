pub mod backends;
mod connection;
mod metadata;
pub mod repository;
pub(crate) mod schema;
pub mod traits;

pub use backends::libsql::LibSqlBackend;
pub use connection::Database;
pub use metadata::MetadataRepository;
pub use repository::EntrySearchHit;
pub use traits::*;
