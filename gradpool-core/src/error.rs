use thiserror::Error;

/// Failure conditions at the pool boundary.
///
/// Graph construction and the backward pass are total computations over
/// well-formed input; capacity and handle validity are the only fallible
/// seams, and both are recoverable at the call site.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
  /// The pool is full; the requested node was not created.
  #[error("value pool reached maximum capacity {capacity}, create failed")]
  CapacityExceeded { capacity: usize },

  /// The handle's index lies outside the current occupancy, either because
  /// it was issued by another pool or because a truncation invalidated it.
  #[error("handle {index} is outside pool occupancy {occupancy}")]
  InvalidHandle { index: usize, occupancy: usize },
}
