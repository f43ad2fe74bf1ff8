//! `agrochain-core` — shared building blocks for the task/cache layer.
//!
//! This crate contains the pieces every other crate agrees on: strongly-typed
//! identifiers, the error taxonomy that crosses component boundaries, and the
//! coarse cache-invalidation seam.

pub mod error;
pub mod id;
pub mod invalidate;

pub use error::{TaskError, TaskResult};
pub use id::TaskId;
pub use invalidate::Invalidate;
