//! # shadowvec Search
//!
//! Nearest-neighbor search over shadow tables, resolved back into primary
//! records under the caller's access rules.
//!
//! - [`SearchCriteria`] - The single `field -> vector` pair of a search body
//! - [`QueryEngine`] - Validates, runs the KNN and resolves hits into records
//! - [`assemble`] - Merges ranked candidates with resolved records

pub mod assembler;
pub mod criteria;
pub mod engine;

pub use assembler::{assemble, SearchResultItem, SearchResultSet};
pub use criteria::SearchCriteria;
pub use engine::{QueryEngine, QueryEngineConfig, SearchRequest, MAX_SEARCH_RESULTS};
