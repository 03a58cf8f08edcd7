//! # shadowvec Core
//!
//! Core types shared by the shadowvec crates.
//!
//! - [`CollectionDescriptor`] - A primary-store collection with its typed [`VectorCollectionConfig`]
//! - [`Record`] - A fully materialized primary-store record, with [`RecordId`] and [`RowId`]
//! - [`Vector`] - Dense vector stored in a shadow index column
//! - [`FilterCondition`] / [`AccessRule`] / [`ListQuery`] - Read rules and listing filters
//! - [`EventBus`] - Typed record lifecycle events
//! - [`Deadline`] - Caller-supplied operation bound
//!
//! ## Example
//!
//! ```rust
//! use shadowvec_core::{CollectionDescriptor, FieldKind, FieldSpec};
//!
//! let docs = CollectionDescriptor::builder("docs")
//!     .field(FieldSpec::new("title", FieldKind::Text))
//!     .vector_field("embedding")
//!     .dimensionality(3)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(docs.shadow_table_name(), "vss_docs");
//! assert_eq!(docs.vector_config().unwrap().fields, vec!["embedding"]);
//! ```

pub mod access;
pub mod collection;
pub mod deadline;
pub mod error;
pub mod events;
pub mod filter;
pub mod record;
pub mod vector;

/// L2 distance kernel with AVX2 and NEON paths.
pub mod simd;

pub use access::AccessContext;
pub use collection::{
    shadow_table_name, AccessRule, CollectionBuilder, CollectionDefinition, CollectionDescriptor,
    CollectionOptions, FieldKind, FieldSpec, VectorCollectionConfig, SHADOW_TABLE_PREFIX,
};
pub use deadline::Deadline;
pub use error::{Error, Result};
pub use events::{EventBus, EventKind, HookFuture, RecordEvent, SubscriptionId};
pub use filter::{Filter, FilterCondition, ListQuery, AUTH_ID_PLACEHOLDER};
pub use record::{Record, RecordId, RowId};
pub use vector::Vector;
