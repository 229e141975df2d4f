//!
//! # gradpool-nn
//!
//! Minimal multilayer perceptron layered on the pool engine. Every trainable
//! parameter is a leaf node in the shared [`ValuePool`], forward composition
//! goes through the core's arithmetic builders, and training is plain
//! gradient descent over the accumulated gradients.
//!
//! The intended loop snapshots the pool each iteration so the intermediate
//! forward/backward nodes are reclaimed while parameters persist:
//!
//! ```
//! use lib_gradpool_core::ValuePool;
//! use lib_gradpool_nn::{sum_squared_error, Mlp};
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//!
//! let mut pool = ValuePool::new();
//! let mut rng = StdRng::seed_from_u64(7);
//! let mlp = Mlp::new(&mut pool, &mut rng, 2, &[3, 1]).unwrap();
//! let inputs = [pool.create(0.5).unwrap(), pool.create(-1.0).unwrap()];
//! let target = [pool.create(1.0).unwrap()];
//!
//! for _ in 0..10 {
//!   pool
//!     .scoped(|pool| {
//!       let prediction = mlp.forward(pool, &inputs)?;
//!       let loss = sum_squared_error(pool, &prediction, &target)?;
//!       mlp.zero_grad(pool)?;
//!       mlp.train_step(pool, loss, 0.05)
//!     })
//!     .unwrap();
//! }
//! ```
//!

use rand::Rng;

use lib_gradpool_core::{PoolError, ValueHandle, ValuePool};

/// Single tanh neuron: `fan_in` weights plus a bias, all trainable leaves.
#[derive(Debug, Clone)]
pub struct Neuron {
  weights: Vec<ValueHandle>,
  bias: ValueHandle,
}

impl Neuron {
  /// Parameters are drawn uniformly from `[-1, 1)`.
  pub fn new<R: Rng>(
    pool: &mut ValuePool,
    rng: &mut R,
    fan_in: usize,
  ) -> Result<Self, PoolError> {
    let mut weights = Vec::with_capacity(fan_in);
    for _ in 0..fan_in {
      weights.push(pool.create(rng.gen_range(-1.0..1.0))?);
    }
    let bias = pool.create(rng.gen_range(-1.0..1.0))?;
    Ok(Self { weights, bias })
  }

  /// `tanh(w · x + b)`; `inputs` length must match the neuron's fan-in.
  pub fn forward(
    &self,
    pool: &mut ValuePool,
    inputs: &[ValueHandle],
  ) -> Result<ValueHandle, PoolError> {
    debug_assert_eq!(inputs.len(), self.weights.len());
    let mut sum = self.bias;
    for (&weight, &input) in self.weights.iter().zip(inputs) {
      let wx = pool.mul(weight, input)?;
      sum = pool.add(sum, wx)?;
    }
    pool.tanh(sum)
  }

  /// Weights followed by the bias.
  pub fn parameters(&self) -> impl Iterator<Item = ValueHandle> + '_ {
    self.weights.iter().copied().chain(std::iter::once(self.bias))
  }
}

/// Fully-connected layer of [`Neuron`]s sharing one input slice.
#[derive(Debug, Clone)]
pub struct Layer {
  neurons: Vec<Neuron>,
}

impl Layer {
  pub fn new<R: Rng>(
    pool: &mut ValuePool,
    rng: &mut R,
    fan_in: usize,
    fan_out: usize,
  ) -> Result<Self, PoolError> {
    let mut neurons = Vec::with_capacity(fan_out);
    for _ in 0..fan_out {
      neurons.push(Neuron::new(pool, rng, fan_in)?);
    }
    Ok(Self { neurons })
  }

  pub fn forward(
    &self,
    pool: &mut ValuePool,
    inputs: &[ValueHandle],
  ) -> Result<Vec<ValueHandle>, PoolError> {
    self
      .neurons
      .iter()
      .map(|neuron| neuron.forward(pool, inputs))
      .collect()
  }

  pub fn parameters(&self) -> impl Iterator<Item = ValueHandle> + '_ {
    self.neurons.iter().flat_map(Neuron::parameters)
  }
}

/// Multilayer perceptron: a stack of layers applied in order.
#[derive(Debug, Clone)]
pub struct Mlp {
  layers: Vec<Layer>,
}

impl Mlp {
  /// `inputs` is the input width, `layer_sizes` the width of each layer in
  /// order; the last entry is the output width.
  pub fn new<R: Rng>(
    pool: &mut ValuePool,
    rng: &mut R,
    inputs: usize,
    layer_sizes: &[usize],
  ) -> Result<Self, PoolError> {
    let mut layers = Vec::with_capacity(layer_sizes.len());
    let mut fan_in = inputs;
    for &fan_out in layer_sizes {
      layers.push(Layer::new(pool, rng, fan_in, fan_out)?);
      fan_in = fan_out;
    }
    let mlp = Self { layers };
    log::debug!(
      "initialized mlp {:?} with {} parameters",
      layer_sizes,
      mlp.parameters().count()
    );
    Ok(mlp)
  }

  pub fn forward(
    &self,
    pool: &mut ValuePool,
    inputs: &[ValueHandle],
  ) -> Result<Vec<ValueHandle>, PoolError> {
    let mut activations = inputs.to_vec();
    for layer in &self.layers {
      activations = layer.forward(pool, &activations)?;
    }
    Ok(activations)
  }

  pub fn parameters(&self) -> impl Iterator<Item = ValueHandle> + '_ {
    self.layers.iter().flat_map(Layer::parameters)
  }

  /// Reset every parameter's gradient accumulator ahead of a fresh pass.
  pub fn zero_grad(&self, pool: &mut ValuePool) -> Result<(), PoolError> {
    for parameter in self.parameters() {
      pool.get_mut(parameter)?.gradient = 0.0;
    }
    Ok(())
  }

  /// One gradient-descent step: backward from `loss`, then move every
  /// parameter downhill by `learning_rate` times its gradient.
  pub fn train_step(
    &self,
    pool: &mut ValuePool,
    loss: ValueHandle,
    learning_rate: f64,
  ) -> Result<(), PoolError> {
    pool.backward(loss)?;
    for parameter in self.parameters() {
      let value = pool.get_mut(parameter)?;
      value.data -= learning_rate * value.gradient;
    }
    Ok(())
  }
}

/// Sum of squared prediction errors over a batch of outputs.
pub fn sum_squared_error(
  pool: &mut ValuePool,
  predictions: &[ValueHandle],
  targets: &[ValueHandle],
) -> Result<ValueHandle, PoolError> {
  debug_assert_eq!(predictions.len(), targets.len());
  let mut loss = None;
  for (&prediction, &target) in predictions.iter().zip(targets) {
    let difference = pool.sub(prediction, target)?;
    let squared = pool.powf(difference, 2.0)?;
    loss = Some(match loss {
      Some(total) => pool.add(total, squared)?,
      None => squared,
    });
  }
  match loss {
    Some(handle) => Ok(handle),
    None => pool.create(0.0),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  use approx::assert_abs_diff_eq;
  use rand::rngs::StdRng;
  use rand::SeedableRng;

  fn seeded() -> StdRng {
    StdRng::seed_from_u64(42)
  }

  mod neuron {
    use super::*;

    #[test]
    fn forward_matches_manual_computation() {
      let mut pool = ValuePool::new();
      let mut rng = seeded();
      let neuron = Neuron::new(&mut pool, &mut rng, 2).unwrap();
      let x1 = pool.create(0.5).unwrap();
      let x2 = pool.create(-1.5).unwrap();

      let parameters: Vec<f64> = neuron
        .parameters()
        .map(|p| pool.get(p).unwrap().data)
        .collect();
      let expected = (parameters[0] * 0.5 + parameters[1] * -1.5 + parameters[2]).tanh();

      let out = neuron.forward(&mut pool, &[x1, x2]).unwrap();
      assert_abs_diff_eq!(pool.get(out).unwrap().data, expected, epsilon = 1e-12);
    }

    #[test]
    fn parameters_are_fan_in_plus_bias() {
      let mut pool = ValuePool::new();
      let mut rng = seeded();
      let neuron = Neuron::new(&mut pool, &mut rng, 3).unwrap();
      assert_eq!(neuron.parameters().count(), 4);
      assert_eq!(pool.len(), 4);
    }

    #[test]
    fn initial_parameters_stay_in_unit_range() {
      let mut pool = ValuePool::new();
      let mut rng = seeded();
      let neuron = Neuron::new(&mut pool, &mut rng, 16).unwrap();
      for parameter in neuron.parameters() {
        let data = pool.get(parameter).unwrap().data;
        assert!((-1.0..1.0).contains(&data));
      }
    }
  }

  mod mlp {
    use super::*;

    #[test]
    fn parameter_count_follows_layer_sizes() {
      let mut pool = ValuePool::new();
      let mut rng = seeded();
      let mlp = Mlp::new(&mut pool, &mut rng, 3, &[4, 4, 1]).unwrap();
      // (3+1)*4 + (4+1)*4 + (4+1)*1
      assert_eq!(mlp.parameters().count(), 41);
      assert_eq!(pool.len(), 41);
    }

    #[test]
    fn forward_width_matches_last_layer() {
      let mut pool = ValuePool::new();
      let mut rng = seeded();
      let mlp = Mlp::new(&mut pool, &mut rng, 2, &[3, 2]).unwrap();
      let inputs = [pool.create(1.0).unwrap(), pool.create(-1.0).unwrap()];
      let outputs = mlp.forward(&mut pool, &inputs).unwrap();
      assert_eq!(outputs.len(), 2);
      for output in outputs {
        // tanh activations stay in (-1, 1)
        assert!(pool.get(output).unwrap().data.abs() < 1.0);
      }
    }

    #[test]
    fn zero_grad_resets_parameter_accumulators() {
      let mut pool = ValuePool::new();
      let mut rng = seeded();
      let mlp = Mlp::new(&mut pool, &mut rng, 2, &[2, 1]).unwrap();
      let inputs = [pool.create(1.0).unwrap(), pool.create(0.5).unwrap()];
      let outputs = mlp.forward(&mut pool, &inputs).unwrap();
      pool.backward(outputs[0]).unwrap();
      assert!(mlp
        .parameters()
        .any(|p| pool.get(p).unwrap().gradient != 0.0));

      mlp.zero_grad(&mut pool).unwrap();
      assert!(mlp
        .parameters()
        .all(|p| pool.get(p).unwrap().gradient == 0.0));
    }

    #[test]
    fn training_reduces_loss_with_bounded_occupancy() {
      let mut pool = ValuePool::new();
      let mut rng = seeded();
      let mlp = Mlp::new(&mut pool, &mut rng, 3, &[4, 4, 1]).unwrap();

      let samples = [
        ([2.0, 3.0, -1.0], 1.0),
        ([3.0, -1.0, 0.5], -1.0),
        ([0.5, 1.0, 1.0], -1.0),
        ([1.0, 1.0, -1.0], 1.0),
      ];
      let mut inputs = Vec::new();
      let mut targets = Vec::new();
      for (features, expected) in &samples {
        let row: Vec<ValueHandle> = features
          .iter()
          .map(|&feature| pool.create(feature).unwrap())
          .collect();
        inputs.push(row);
        targets.push(pool.create(*expected).unwrap());
      }
      let baseline = pool.len();

      let mut first_loss = None;
      let mut last_loss = 0.0;
      for _ in 0..50 {
        let loss = pool
          .scoped(|pool| {
            let mut predictions = Vec::new();
            for row in &inputs {
              let outputs = mlp.forward(pool, row)?;
              predictions.push(outputs[0]);
            }
            let loss = sum_squared_error(pool, &predictions, &targets)?;
            let loss_data = pool.get(loss)?.data;
            mlp.zero_grad(pool)?;
            mlp.train_step(pool, loss, 0.05)?;
            Ok::<_, PoolError>(loss_data)
          })
          .unwrap();
        first_loss.get_or_insert(loss);
        last_loss = loss;
        // every iteration's intermediates were reclaimed
        assert_eq!(pool.len(), baseline);
      }

      assert!(last_loss < first_loss.unwrap());
      assert!(last_loss.is_finite());
    }
  }

  mod loss {
    use super::*;

    #[test]
    fn sum_squared_error_matches_manual() {
      let mut pool = ValuePool::new();
      let predictions = [pool.create(0.5).unwrap(), pool.create(-0.25).unwrap()];
      let targets = [pool.create(1.0).unwrap(), pool.create(-1.0).unwrap()];
      let loss = sum_squared_error(&mut pool, &predictions, &targets).unwrap();
      let expected = (0.5f64 - 1.0).powi(2) + (-0.25f64 + 1.0).powi(2);
      assert_abs_diff_eq!(pool.get(loss).unwrap().data, expected, epsilon = 1e-12);
    }

    #[test]
    fn empty_batch_is_zero_loss() {
      let mut pool = ValuePool::new();
      let loss = sum_squared_error(&mut pool, &[], &[]).unwrap();
      assert_eq!(pool.get(loss).unwrap().data, 0.0);
    }

    #[test]
    fn gradient_through_loss_is_twice_the_error() {
      let mut pool = ValuePool::new();
      let prediction = pool.create(0.8).unwrap();
      let target = pool.create(0.5).unwrap();
      let loss = sum_squared_error(&mut pool, &[prediction], &[target]).unwrap();
      pool.backward(loss).unwrap();
      // d/dp (p - t)^2 = 2 (p - t)
      assert_abs_diff_eq!(
        pool.get(prediction).unwrap().gradient,
        2.0 * (0.8 - 0.5),
        epsilon = 1e-12
      );
    }
  }
}
