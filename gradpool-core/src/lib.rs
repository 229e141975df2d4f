//!
//! # gradpool-core
//!
//! Scalar reverse-mode automatic differentiation over a pool-allocated
//! computation graph.
//!
//! Nodes live in a [`ValuePool`] and are addressed through copyable
//! [`ValueHandle`]s instead of references... every arithmetic builder reads
//! its operand data, computes the forward value eagerly, and appends one new
//! node recording the operation tag and the operand handles. Calling
//! [`ValuePool::backward`] then orders the graph once and accumulates exact
//! gradients into every contributing node in a single reverse traversal.
//!
//! ## Handle Invariants
//!
//! 1. A node's operand handles always have a strictly smaller creation index
//!    than the node itself, so the graph is acyclic by construction
//! 2. A handle is only valid against the pool that issued it
//! 3. [`ValuePool::truncate`] invalidates every handle at or past the mark;
//!    such handles are rejected by the bounds check in [`ValuePool::get`]
//!

use rustc_hash::FxHashSet;

use smallvec::SmallVec;

pub mod dot;
mod error;

pub use error::PoolError;

/// Default node capacity of a pool.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Operation tag selecting the local derivative rule applied during the
/// backward pass; `None` marks a leaf (constant or trainable parameter).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathOp {
  None,
  Add,
  Mul,
  Pow,
  Exp,
  Tanh,
}

/// One node of the computation graph.
#[derive(Debug, Clone)]
pub struct Value {
  /// Forward-computed result, fixed at creation; the training layer may
  /// rewrite it for parameter leaves between passes.
  pub data: f64,
  /// Accumulated partial derivative of the chosen output with respect to
  /// this node; zero at creation, summed into during [`ValuePool::backward`].
  pub gradient: f64,
  exponent: f64,
  op: MathOp,
  inputs: SmallVec<[ValueHandle; 2]>,
}

impl Value {
  fn leaf(data: f64) -> Self {
    Self {
      data,
      gradient: 0.0,
      exponent: 0.0,
      op: MathOp::None,
      inputs: SmallVec::new(),
    }
  }

  #[inline]
  pub fn op(&self) -> MathOp {
    self.op
  }

  /// Exponent of a `Pow` node; zero for every other tag.
  #[inline]
  pub fn exponent(&self) -> f64 {
    self.exponent
  }

  /// Operand handles, in application order.
  #[inline]
  pub fn inputs(&self) -> &[ValueHandle] {
    &self.inputs
  }
}

/// Stable reference to a node, by creation index, valid only against the
/// pool that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueHandle(usize);

impl ValueHandle {
  /// Creation index of the referenced node.
  #[inline]
  pub fn index(&self) -> usize {
    self.0
  }
}

/// Occupancy snapshot used for scoped bulk reclamation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mark(usize);

/// Append-only, scope-truncatable storage for computation-graph nodes, plus
/// the arithmetic builders and the backward pass that operate on them.
#[derive(Debug)]
pub struct ValuePool {
  values: Vec<Value>,
  capacity: usize,
}

impl ValuePool {
  pub fn new() -> Self {
    Self::with_capacity(DEFAULT_CAPACITY)
  }

  pub fn with_capacity(capacity: usize) -> Self {
    Self {
      values: Vec::with_capacity(capacity),
      capacity,
    }
  }

  /// Number of currently occupied nodes.
  #[inline]
  pub fn len(&self) -> usize {
    self.values.len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }

  /// Fixed node capacity of this pool.
  #[inline]
  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Handles of every currently occupied node, in creation order.
  pub fn handles(&self) -> impl Iterator<Item = ValueHandle> + '_ {
    (0..self.values.len()).map(ValueHandle)
  }

  /// Append a leaf node holding `data`.
  pub fn create(&mut self, data: f64) -> Result<ValueHandle, PoolError> {
    self.push(Value::leaf(data))
  }

  fn push(&mut self, value: Value) -> Result<ValueHandle, PoolError> {
    if self.values.len() == self.capacity {
      log::error!(
        "value pool reached maximum capacity {}, create failed",
        self.capacity
      );
      return Err(PoolError::CapacityExceeded {
        capacity: self.capacity,
      });
    }
    let handle = ValueHandle(self.values.len());
    self.values.push(value);
    Ok(handle)
  }

  pub fn get(&self, handle: ValueHandle) -> Result<&Value, PoolError> {
    self.values.get(handle.0).ok_or(PoolError::InvalidHandle {
      index: handle.0,
      occupancy: self.values.len(),
    })
  }

  pub fn get_mut(&mut self, handle: ValueHandle) -> Result<&mut Value, PoolError> {
    let occupancy = self.values.len();
    self
      .values
      .get_mut(handle.0)
      .ok_or(PoolError::InvalidHandle {
        index: handle.0,
        occupancy,
      })
  }

  /// Record the current occupancy.
  #[inline]
  pub fn snapshot(&self) -> Mark {
    Mark(self.values.len())
  }

  /// Roll occupancy back to `mark`, discarding every node created since.
  ///
  /// Handles issued after the mark must not be dereferenced afterwards, and
  /// marks must be consumed in strictly nested (stack) order.
  pub fn truncate(&mut self, mark: Mark) {
    debug_assert!(mark.0 <= self.values.len(), "truncation mark out of order");
    if mark.0 <= self.values.len() {
      log::debug!(
        "truncating pool from {} to {} nodes",
        self.values.len(),
        mark.0
      );
      self.values.truncate(mark.0);
    }
  }

  /// Run `f` between a snapshot/truncate pair, reclaiming every node it
  /// created once it returns.
  pub fn scoped<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
    let mark = self.snapshot();
    let result = f(self);
    self.truncate(mark);
    result
  }
}

impl Default for ValuePool {
  fn default() -> Self {
    Self::new()
  }
}

/// Graph construction: the five primitives, then derived forms expressed
/// purely as compositions of them.
impl ValuePool {
  fn binary(
    &mut self,
    op: MathOp,
    data: f64,
    a: ValueHandle,
    b: ValueHandle,
  ) -> Result<ValueHandle, PoolError> {
    self.push(Value {
      data,
      gradient: 0.0,
      exponent: 0.0,
      op,
      inputs: SmallVec::from_slice(&[a, b]),
    })
  }

  fn unary(&mut self, op: MathOp, data: f64, a: ValueHandle) -> Result<ValueHandle, PoolError> {
    self.push(Value {
      data,
      gradient: 0.0,
      exponent: 0.0,
      op,
      inputs: SmallVec::from_slice(&[a]),
    })
  }

  /// `a + b`
  pub fn add(&mut self, a: ValueHandle, b: ValueHandle) -> Result<ValueHandle, PoolError> {
    let data = self.get(a)?.data + self.get(b)?.data;
    self.binary(MathOp::Add, data, a, b)
  }

  /// `a * b`
  pub fn mul(&mut self, a: ValueHandle, b: ValueHandle) -> Result<ValueHandle, PoolError> {
    let data = self.get(a)?.data * self.get(b)?.data;
    self.binary(MathOp::Mul, data, a, b)
  }

  /// `a` raised to a plain, non-graph-tracked exponent.
  ///
  /// Standard real-power semantics: a negative base with a fractional
  /// exponent yields NaN and is not special-cased.
  pub fn powf(&mut self, a: ValueHandle, exponent: f64) -> Result<ValueHandle, PoolError> {
    let data = self.get(a)?.data.powf(exponent);
    self.push(Value {
      data,
      gradient: 0.0,
      exponent,
      op: MathOp::Pow,
      inputs: SmallVec::from_slice(&[a]),
    })
  }

  /// `e^a`
  pub fn exp(&mut self, a: ValueHandle) -> Result<ValueHandle, PoolError> {
    let data = self.get(a)?.data.exp();
    self.unary(MathOp::Exp, data, a)
  }

  /// Hyperbolic tangent of `a`.
  pub fn tanh(&mut self, a: ValueHandle) -> Result<ValueHandle, PoolError> {
    let data = self.get(a)?.data.tanh();
    self.unary(MathOp::Tanh, data, a)
  }

  /// `-a`, as multiplication by a promoted `-1` constant.
  pub fn neg(&mut self, a: ValueHandle) -> Result<ValueHandle, PoolError> {
    let minus_one = self.create(-1.0)?;
    self.mul(a, minus_one)
  }

  /// `a - b`, as `a + (-b)`.
  pub fn sub(&mut self, a: ValueHandle, b: ValueHandle) -> Result<ValueHandle, PoolError> {
    let negated = self.neg(b)?;
    self.add(a, negated)
  }

  /// `a / b`, as `a * b^-1`.
  pub fn div(&mut self, a: ValueHandle, b: ValueHandle) -> Result<ValueHandle, PoolError> {
    let reciprocal = self.powf(b, -1.0)?;
    self.mul(a, reciprocal)
  }

  /// `a + scalar`, with the scalar promoted to a leaf.
  pub fn add_scalar(&mut self, a: ValueHandle, scalar: f64) -> Result<ValueHandle, PoolError> {
    let scalar = self.create(scalar)?;
    self.add(a, scalar)
  }

  /// `a - scalar`
  pub fn sub_scalar(&mut self, a: ValueHandle, scalar: f64) -> Result<ValueHandle, PoolError> {
    self.add_scalar(a, -scalar)
  }

  /// `a * scalar`
  pub fn mul_scalar(&mut self, a: ValueHandle, scalar: f64) -> Result<ValueHandle, PoolError> {
    let scalar = self.create(scalar)?;
    self.mul(a, scalar)
  }

  /// `a / scalar`; the reciprocal is folded into the promoted constant.
  pub fn div_scalar(&mut self, a: ValueHandle, scalar: f64) -> Result<ValueHandle, PoolError> {
    self.mul_scalar(a, scalar.recip())
  }
}

/// Topological ordering and the backward pass.
impl ValuePool {
  /// Dependency-respecting order over every occupied node: each node appears
  /// after everything reachable through its operand links.
  ///
  /// Iterative post-order DFS started from every node in ascending handle
  /// order, so the result is deterministic for fixed pool contents and a
  /// node's first operand subgraph is ordered before its second.
  pub fn topological_order(&self) -> Vec<ValueHandle> {
    let len = self.values.len();
    let mut order = Vec::with_capacity(len);
    let mut visited: FxHashSet<usize> = FxHashSet::default();
    let mut stack: Vec<(usize, bool)> = Vec::new();

    for root in 0..len {
      if visited.contains(&root) {
        continue;
      }
      stack.push((root, false));
      while let Some((index, children_processed)) = stack.pop() {
        if children_processed {
          // fully expanded, emit in postorder
          order.push(ValueHandle(index));
        } else if visited.insert(index) {
          // marker to emit the node after its children
          stack.push((index, true));
          // push in reverse so the first operand is expanded first...
          for &input in self.values[index].inputs.iter().rev() {
            if !visited.contains(&input.0) {
              stack.push((input.0, false));
            }
          }
        }
      }
    }

    order
  }

  /// Reverse-mode differentiation: seed `root`'s gradient with 1, then walk
  /// the topological order backwards, letting every node push its local
  /// derivative contributions into its operands' accumulators.
  ///
  /// Contributions are always summed, never overwritten: a node feeding
  /// several downstream nodes collects one term per consumer. Callers owning
  /// parameters across passes must zero the accumulators they care about
  /// before calling this again.
  pub fn backward(&mut self, root: ValueHandle) -> Result<(), PoolError> {
    let order = self.topological_order();
    log::trace!(
      "backward pass over {} nodes rooted at {}",
      order.len(),
      root.index()
    );
    self.get_mut(root)?.gradient = 1.0;
    for handle in order.into_iter().rev() {
      self.accumulate(handle);
    }
    Ok(())
  }

  /// Apply one node's local derivative rule. Operand handles are always in
  /// bounds here: construction only ever records smaller indices.
  fn accumulate(&mut self, handle: ValueHandle) {
    let index = handle.0;
    let (op, g, data, exponent) = {
      let value = &self.values[index];
      (value.op, value.gradient, value.data, value.exponent)
    };
    match op {
      MathOp::None => {}
      MathOp::Add => {
        debug_assert_eq!(self.values[index].inputs.len(), 2);
        let a = self.values[index].inputs[0].0;
        let b = self.values[index].inputs[1].0;
        self.values[a].gradient += g;
        self.values[b].gradient += g;
      }
      MathOp::Mul => {
        debug_assert_eq!(self.values[index].inputs.len(), 2);
        let a = self.values[index].inputs[0].0;
        let b = self.values[index].inputs[1].0;
        let a_data = self.values[a].data;
        let b_data = self.values[b].data;
        self.values[a].gradient += b_data * g;
        self.values[b].gradient += a_data * g;
      }
      MathOp::Pow => {
        debug_assert_eq!(self.values[index].inputs.len(), 1);
        let a = self.values[index].inputs[0].0;
        let base = self.values[a].data;
        self.values[a].gradient += exponent * base.powf(exponent - 1.0) * g;
      }
      MathOp::Exp => {
        debug_assert_eq!(self.values[index].inputs.len(), 1);
        let a = self.values[index].inputs[0].0;
        self.values[a].gradient += data * g;
      }
      MathOp::Tanh => {
        debug_assert_eq!(self.values[index].inputs.len(), 1);
        let a = self.values[index].inputs[0].0;
        self.values[a].gradient += (1.0 - data * data) * g;
      }
    }
  }
}
