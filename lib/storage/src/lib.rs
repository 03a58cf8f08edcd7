//! # shadowvec Storage
//!
//! The shadow index and everything that keeps it consistent with the
//! primary record store.
//!
//! - [`ShadowPool`] - One LMDB environment behind a shared (read) path and an
//!   exclusive (write) path
//! - [`ShadowIndex`] - Shadow tables `vss_<collection>` keyed by row id, with KNN search
//! - [`SchemaManager`] - Lazily derives and creates a collection's shadow table
//! - [`RowIdentityMapper`] - Record id to row id translation, never cached
//! - [`MutationSynchronizer`] - Applies create/update/delete events to the shadow index
//! - [`RecordStore`] - What the shadow index needs from the primary store
//! - [`MemoryRecordStore`] - In-memory primary store publishing lifecycle events

pub mod memory;
pub mod pool;
pub mod primary;
pub mod rowid;
pub mod schema;
pub mod shadow;
pub mod sync;

pub use memory::{MemoryRecordStore, MutationOutcome};
pub use pool::{PoolStats, ShadowPool, ShadowPoolConfig};
pub use primary::RecordStore;
pub use rowid::RowIdentityMapper;
pub use schema::SchemaManager;
pub use shadow::{ShadowIndex, ShadowRow, ShadowTableSchema, ShadowTableStats};
pub use sync::MutationSynchronizer;
