//! Coarse cache-invalidation seam.

/// Something whose cached view can be wholesale invalidated.
///
/// The task layer tracks no dependency graph between cached keys and the
/// state a completed operation mutated, so invalidation is all-or-nothing:
/// a queue configured with an invalidation target calls this after every
/// successfully completed operation.
pub trait Invalidate: Send + Sync {
    /// Drop all cached state. Must be cheap to call and infallible.
    fn invalidate(&self);
}
