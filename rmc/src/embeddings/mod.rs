mod api;
mod cache;
mod hashed;
mod provider;

#[cfg(test)]
mod tests;

pub use cache::QueryEmbeddingCache;
pub use hashed::HashedEmbedder;
pub use provider::{Embedder, EmbeddingProvider};
