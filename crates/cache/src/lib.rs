//! Bounded in-memory cache with per-entry expiration.
//!
//! ## Design
//!
//! - Entries expire lazily on lookup; there is no background sweep
//! - Inserting a new key at capacity evicts the oldest entry first
//! - `clear` is the invalidation primitive: writes elsewhere in the system
//!   drop the whole cache rather than tracking per-key dependencies
//! - Entirely in-memory; nothing survives a process restart

pub mod ttl;

pub use ttl::{CacheConfig, TtlCache};
