use std::error::Error;
use std::fs::File;
use std::io::{BufWriter, Write};

use gradpool::{dot, ValueHandle, ValuePool};

fn report(pool: &ValuePool, label: &str, handle: ValueHandle) -> Result<(), Box<dyn Error>> {
  let value = pool.get(handle)?;
  println!(
    "{label}, data: {:.6}, gradient: {:.6}",
    value.data, value.gradient
  );
  Ok(())
}

fn write_dot(pool: &ValuePool, root: ValueHandle, name: &str) -> Result<(), Box<dyn Error>> {
  let file = File::create(format!("{name}.dot"))?;
  let mut buf = BufWriter::new(file);
  buf.write_all(dot::render(pool, root)?.as_bytes())?;
  buf.flush()?;
  Ok(())
}

/// `h = exp((b(ab + 1))^2 / 2 - 16)`, exercising every derived builder.
fn composite_expression(pool: &mut ValuePool) -> Result<(), Box<dyn Error>> {
  println!("composite expression:");
  let a = pool.create(1.0)?;
  let b = pool.create(2.0)?;
  let ba = pool.mul(b, a)?;
  let c = pool.add_scalar(ba, 1.0)?;
  let d = pool.mul(b, c)?;
  let e = pool.powf(d, 2.0)?;
  let f = pool.div_scalar(e, 2.0)?;
  let g = pool.sub_scalar(f, 16.0)?;
  let h = pool.exp(g)?;

  pool.backward(h)?;

  let named = [
    ("a", a),
    ("b", b),
    ("c", c),
    ("d", d),
    ("e", e),
    ("f", f),
    ("g", g),
    ("h", h),
  ];
  for (label, handle) in named {
    report(pool, label, handle)?;
  }
  write_dot(pool, h, "composite_expression")
}

/// Tanh written out as `(e^2n - 1) / (e^2n + 1)`; the gradients must agree
/// with the fused tanh neuron below.
fn exp_ratio_neuron(pool: &mut ValuePool) -> Result<(), Box<dyn Error>> {
  println!("exp-ratio neuron:");
  let x1 = pool.create(2.0)?;
  let x2 = pool.create(0.0)?;
  let w1 = pool.create(-3.0)?;
  let w2 = pool.create(1.0)?;
  let b = pool.create(6.88137358702)?;
  let x1w1 = pool.mul(x1, w1)?;
  let x2w2 = pool.mul(x2, w2)?;
  let sum = pool.add(x1w1, x2w2)?;
  let n = pool.add(sum, b)?;
  let two_n = pool.mul_scalar(n, 2.0)?;
  let e = pool.exp(two_n)?;
  let numerator = pool.sub_scalar(e, 1.0)?;
  let denominator = pool.add_scalar(e, 1.0)?;
  let o = pool.div(numerator, denominator)?;

  pool.backward(o)?;

  let named = [
    ("x1", x1),
    ("x2", x2),
    ("w1", w1),
    ("w2", w2),
    ("b", b),
    ("n", n),
    ("e", e),
    ("o", o),
  ];
  for (label, handle) in named {
    report(pool, label, handle)?;
  }
  write_dot(pool, o, "exp_ratio_neuron")
}

fn tanh_neuron(pool: &mut ValuePool) -> Result<(), Box<dyn Error>> {
  println!("tanh neuron:");
  let x1 = pool.create(2.0)?;
  let x2 = pool.create(0.0)?;
  let w1 = pool.create(-3.0)?;
  let w2 = pool.create(1.0)?;
  let b = pool.create(6.88137358702)?;
  let x1w1 = pool.mul(x1, w1)?;
  let x2w2 = pool.mul(x2, w2)?;
  let sum = pool.add(x1w1, x2w2)?;
  let n = pool.add(sum, b)?;
  let o = pool.tanh(n)?;

  pool.backward(o)?;

  let named = [
    ("x1", x1),
    ("x2", x2),
    ("w1", w1),
    ("w2", w2),
    ("b", b),
    ("n", n),
    ("o", o),
  ];
  for (label, handle) in named {
    report(pool, label, handle)?;
  }
  write_dot(pool, o, "tanh_neuron")
}

fn main() -> Result<(), Box<dyn Error>> {
  env_logger::init();

  let mut pool = ValuePool::new();
  pool.scoped(composite_expression)?;
  println!();
  pool.scoped(exp_ratio_neuron)?;
  println!();
  pool.scoped(tanh_neuron)?;
  Ok(())
}
