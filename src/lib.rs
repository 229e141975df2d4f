//!
//! # gradpool
//!
//! ## Core API
//!
//! Pool-backed scalar reverse-mode automatic differentiation. The main entry
//! point is [`ValuePool`]: arithmetic builders append graph nodes to the pool
//! and [`ValuePool::backward`] accumulates exact gradients of a chosen output
//! in one reverse traversal. Scoped snapshot/truncate reclamation keeps
//! long-running training loops bounded.
//!
//! The default-on `nn` feature layers a small multilayer perceptron on top
//! of the engine.
//!

pub use lib_gradpool_core::*;

#[cfg(feature = "nn")]
pub use lib_gradpool_nn as nn;
