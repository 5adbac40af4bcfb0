//! Backend boundary for ijview sessions.
//!
//! This crate defines the messages exchanged between a viewer session and the
//! image backend, the [`Backend`] trait every transport implements, and the
//! backend error taxonomy. It does not implement any transport itself.

#![warn(missing_docs)]

pub mod backend;
pub mod error;
pub mod params;
pub mod types;

pub use backend::Backend;
pub use error::{BackendError, Result};
pub use params::{canonical_params, preview_key};
pub use types::*;
