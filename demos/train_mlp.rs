use std::error::Error;

use rand::thread_rng;

use gradpool::nn::{sum_squared_error, Mlp};
use gradpool::{PoolError, ValueHandle, ValuePool};

fn main() -> Result<(), Box<dyn Error>> {
  env_logger::init();

  let mut pool = ValuePool::new();
  let mut rng = thread_rng();
  let mlp = Mlp::new(&mut pool, &mut rng, 3, &[4, 4, 1])?;

  let samples = [
    ([2.0, 3.0, -1.0], 1.0),
    ([3.0, -1.0, 0.5], -1.0),
    ([0.5, 1.0, 1.0], -1.0),
    ([1.0, 1.0, -1.0], 1.0),
  ];
  let mut inputs: Vec<Vec<ValueHandle>> = Vec::new();
  let mut targets: Vec<ValueHandle> = Vec::new();
  for (features, expected) in &samples {
    let row = features
      .iter()
      .map(|&feature| pool.create(feature))
      .collect::<Result<Vec<_>, _>>()?;
    inputs.push(row);
    targets.push(pool.create(*expected)?);
  }

  println!("initial parameters:");
  for (index, parameter) in mlp.parameters().enumerate() {
    println!("parameter {index}, data: {:.6}", pool.get(parameter)?.data);
  }
  println!();

  for iteration in 0..50 {
    // every node built this iteration is reclaimed on scope exit, so fifty
    // iterations fit a pool sized for one...
    let loss = pool.scoped(|pool| {
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
    })?;
    println!("iteration {iteration}, loss: {loss:.5}");
  }

  println!();
  println!("trained parameters:");
  for (index, parameter) in mlp.parameters().enumerate() {
    println!("parameter {index}, data: {:.6}", pool.get(parameter)?.data);
  }

  println!();
  pool.scoped(|pool| {
    for (row, target) in inputs.iter().zip(&targets) {
      let outputs = mlp.forward(pool, row)?;
      println!(
        "prediction: {:9.6}, expect: {:9.6}",
        pool.get(outputs[0])?.data,
        pool.get(*target)?.data
      );
    }
    Ok::<_, PoolError>(())
  })?;

  Ok(())
}
