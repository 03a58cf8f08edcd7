//! # shadowvec API
//!
//! actix-web surface: `POST /api/collections/{collection}/vss` for
//! nearest-neighbor search plus record and collection endpoints backed by
//! the in-memory primary store.

pub mod access;
pub mod error;
pub mod rest;

pub use access::{Caller, AUTH_ID_HEADER};
pub use error::ApiError;
pub use rest::{configure, ApiState, RestApi};
