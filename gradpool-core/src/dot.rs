//! Graphviz DOT rendering of a computation subgraph.
//!
//! A pure read-only consumer of the pool API: walks operand links from a
//! chosen root and emits one record node per value plus one ellipse node per
//! operation, left to right.

use rustc_hash::FxHashSet;

use crate::{MathOp, PoolError, Value, ValueHandle, ValuePool};

/// Render the subgraph reachable from `root` as DOT text.
pub fn render(pool: &ValuePool, root: ValueHandle) -> Result<String, PoolError> {
  let mut out = String::from("digraph {\n  rankdir=LR;\n");
  let mut visited: FxHashSet<usize> = FxHashSet::default();
  let mut stack = vec![root];

  while let Some(handle) = stack.pop() {
    if !visited.insert(handle.index()) {
      continue;
    }
    let value = pool.get(handle)?;
    out.push_str(&format!(
      "  n{idx} [shape=record, label=\"{{ {idx} | data {data:.4} }}\"];\n",
      idx = handle.index(),
      data = value.data,
    ));
    if let Some(label) = op_label(value) {
      out.push_str(&format!(
        "  n{idx}_op [shape=ellipse, label=\"{label}\"];\n  n{idx}_op -> n{idx};\n",
        idx = handle.index(),
      ));
      for &input in value.inputs() {
        out.push_str(&format!(
          "  n{} -> n{}_op;\n",
          input.index(),
          handle.index()
        ));
        stack.push(input);
      }
    }
  }

  out.push_str("}\n");
  Ok(out)
}

fn op_label(value: &Value) -> Option<String> {
  match value.op() {
    MathOp::None => None,
    MathOp::Add => Some("+".to_owned()),
    MathOp::Mul => Some("*".to_owned()),
    MathOp::Pow => Some(format!("** {}", value.exponent())),
    MathOp::Exp => Some("exp".to_owned()),
    MathOp::Tanh => Some("tanh".to_owned()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn renders_reachable_subgraph_only() {
    let mut pool = ValuePool::new();
    let a = pool.create(2.0).unwrap();
    let b = pool.create(3.0).unwrap();
    let product = pool.mul(a, b).unwrap();
    let unrelated = pool.create(9.0).unwrap();

    let text = render(&pool, product).unwrap();
    assert!(text.starts_with("digraph {"));
    assert!(text.contains("n0 [shape=record"));
    assert!(text.contains("n2_op [shape=ellipse, label=\"*\"]"));
    assert!(text.contains("n0 -> n2_op;"));
    assert!(text.contains("n1 -> n2_op;"));
    assert!(!text.contains(&format!("n{} ", unrelated.index())));
  }

  #[test]
  fn power_node_shows_exponent() {
    let mut pool = ValuePool::new();
    let a = pool.create(2.0).unwrap();
    let squared = pool.powf(a, 2.0).unwrap();

    let text = render(&pool, squared).unwrap();
    assert!(text.contains("label=\"** 2\""));
  }

  #[test]
  fn shared_operand_is_emitted_once() {
    let mut pool = ValuePool::new();
    let x = pool.create(1.0).unwrap();
    let y = pool.mul(x, x).unwrap();

    let text = render(&pool, y).unwrap();
    let occurrences = text.matches("n0 [shape=record").count();
    assert_eq!(occurrences, 1);
  }
}
