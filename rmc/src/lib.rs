//! Relational Memory Cache: multi-tenant memory for AI agents that pairs
//! vector similarity search with a typed, weighted relation graph,
//! append-only version trees and contradiction tracking.

pub mod config;
pub mod db;
pub mod embeddings;
mod engine;
pub mod error;
pub mod intelligence;
pub mod llm;
pub mod models;
pub mod services;

pub use config::Config;
pub use engine::Rmc;
pub use error::{Result, RmcError};
