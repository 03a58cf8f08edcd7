//! # shadowvec
//!
//! A shadow vector index for a primary record store.
//!
//! Collections that declare a vector `dimensionality` get a shadow table
//! (`vss_<collection>`) holding one vector column per vector field, keyed by
//! the primary store's row id. The table is created lazily on the first write,
//! kept in sync by lifecycle event handlers, and searched by nearest neighbor.
//! Hits are resolved back into full records through the primary store's
//! listing path, so collection read rules apply to search results exactly as
//! they apply to ordinary listing.
//!
//! ## Quick Start
//!
//! ### As a Server
//!
//! ```bash
//! shadowvec --data-dir ./data --http-port 8090 --admin-token secret
//! ```
//!
//! ### As a Library
//!
//! ```rust,no_run
//! use shadowvec::prelude::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn run() -> Result<()> {
//! let pool = Arc::new(ShadowPool::open("./data/shadow", ShadowPoolConfig::default())?);
//! let index = ShadowIndex::new(pool);
//! let bus = Arc::new(EventBus::new());
//! let store = Arc::new(MemoryRecordStore::new(bus.clone()));
//! Arc::new(MutationSynchronizer::new(store.clone(), index.clone(), Duration::from_secs(10)))
//!     .register(&bus);
//!
//! store.create_collection(
//!     CollectionDescriptor::builder("docs")
//!         .vector_field("embedding")
//!         .dimensionality(3)
//!         .list_rule(AccessRule::Public)
//!         .build()?,
//! )?;
//! let data = serde_json::json!({"embedding": [0.1, 0.2, 0.3]});
//! store.create("docs", None, data.as_object().cloned().unwrap_or_default()).await?;
//!
//! let engine = QueryEngine::new(store.clone(), index, QueryEngineConfig::default());
//! let criteria = SearchCriteria::from_value(serde_json::json!({"embedding": [0.1, 0.2, 0.3]}))?;
//! let results = engine
//!     .search(SearchRequest::new("docs", criteria, AccessContext::guest()).with_limit(10))
//!     .await?;
//! assert_eq!(results.items.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Crate Structure
//!
//! - `shadowvec-core` - Records, collections, vectors, access rules, events, errors
//! - `shadowvec-storage` - Shadow pool and tables, schema manager, synchronizer, primary store
//! - `shadowvec-search` - Query engine and result assembly
//! - `shadowvec-api` - REST API

// Re-export core types
pub use shadowvec_core::{
    AccessContext, AccessRule, CollectionDescriptor, CollectionDefinition, Deadline, Error,
    EventBus, EventKind, FieldKind, FieldSpec, Filter, FilterCondition, ListQuery, Record,
    RecordId, Result, RowId, Vector, VectorCollectionConfig,
};

// Re-export storage
pub use shadowvec_storage::{
    MemoryRecordStore, MutationOutcome, MutationSynchronizer, RecordStore, RowIdentityMapper,
    SchemaManager, ShadowIndex, ShadowPool, ShadowPoolConfig, ShadowRow, ShadowTableSchema,
};

// Re-export search
pub use shadowvec_search::{
    QueryEngine, QueryEngineConfig, SearchCriteria, SearchRequest, SearchResultItem,
    SearchResultSet, MAX_SEARCH_RESULTS,
};

// Re-export API
pub use shadowvec_api::{ApiState, RestApi};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        AccessContext, AccessRule, CollectionDescriptor, Deadline, Error, EventBus, FieldKind,
        FieldSpec, MemoryRecordStore, MutationSynchronizer, QueryEngine, QueryEngineConfig,
        Result, SearchCriteria, SearchRequest, ShadowIndex, ShadowPool, ShadowPoolConfig,
        Vector,
    };
}

/// SIMD-optimized vector operations
pub mod simd {
    pub use shadowvec_core::simd::l2_distance_simd;
}
