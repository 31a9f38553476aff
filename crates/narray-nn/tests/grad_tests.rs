// Gradient tests — end-to-end backward passes through composed graphs,
// checking the exact values each law produces.

use narray_core::{DType, NArray};
use narray_nn::{Graph, Reduction};

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn f64s(data: &[f64], shape: impl Into<narray_core::Shape>) -> NArray {
    NArray::from_f64_slice(data, shape, DType::F64).unwrap()
}

// Broadcast gradients

#[test]
fn test_sub_broadcast_gradients() {
    init_logs();
    // a: (3, 1), b: (3, 4). c = a - b has shape (3, 4); summing to a scalar
    // makes every upstream element 1, so a collects +4 per row and b -1
    // everywhere.
    let mut g = Graph::new();
    let a = g.var(f64s(&[1.0, 2.0, 3.0], (3, 1)));
    let b = g.var(NArray::zeros((3, 4), DType::F64));
    let c = g.sub(a, b).unwrap();
    let total = g.sum_all(c).unwrap();
    g.backward(total).unwrap();

    assert_eq!(g.grad(a).unwrap().to_f64_vec().unwrap(), vec![4.0, 4.0, 4.0]);
    assert_eq!(g.grad(b).unwrap().to_f64_vec().unwrap(), vec![-1.0; 12]);
}

#[test]
fn test_mul_broadcast_gradients() {
    let mut g = Graph::new();
    let a = g.var(f64s(&[2.0], ()));
    let b = g.var(f64s(&[1.0, 2.0, 3.0], (3,)));
    let c = g.mul(a, b).unwrap();
    let total = g.sum_all(c).unwrap();
    g.backward(total).unwrap();

    // da = sum(b) = 6; db = a broadcast = [2, 2, 2].
    assert_eq!(g.grad(a).unwrap().scalar_value().unwrap(), 6.0);
    assert_eq!(g.grad(b).unwrap().to_f64_vec().unwrap(), vec![2.0, 2.0, 2.0]);
}

// Cat / narrow round trip

#[test]
fn test_cat_routes_gradient_segments() {
    let mut g = Graph::new();
    let x1 = g.var(NArray::zeros((2, 2), DType::F64));
    let x2 = g.var(NArray::zeros((2, 3), DType::F64));
    let c = g.cat(&[x1, x2], 1).unwrap();
    assert_eq!(g.value(c).unwrap().dims(), &[2, 5]);

    // Weight each output column differently so segment routing is visible.
    let w = g.var(f64s(&[1.0, 2.0, 3.0, 4.0, 5.0], (5,)));
    let weighted = g.mul(c, w).unwrap();
    let total = g.sum_all(weighted).unwrap();
    g.backward(total).unwrap();

    assert_eq!(
        g.grad(x1).unwrap().to_f64_vec().unwrap(),
        vec![1.0, 2.0, 1.0, 2.0]
    );
    assert_eq!(
        g.grad(x2).unwrap().to_f64_vec().unwrap(),
        vec![3.0, 4.0, 5.0, 3.0, 4.0, 5.0]
    );
}

// Reductions

#[test]
fn test_sum1d_then_weighting() {
    let mut g = Graph::new();
    let x = g.var(NArray::seq((2, 3), DType::F64));
    let s = g.sum1d(x, 0).unwrap();
    let w = g.var(f64s(&[1.0, 10.0, 100.0], (3,)));
    let sw = g.mul(s, w).unwrap();
    let total = g.sum_all(sw).unwrap();
    g.backward(total).unwrap();

    // Each column's gradient is its weight, spread down the summed axis.
    assert_eq!(
        g.grad(x).unwrap().to_f64_vec().unwrap(),
        vec![1.0, 10.0, 100.0, 1.0, 10.0, 100.0]
    );
}

// Standardization

#[test]
fn test_standardize_constant_input_is_all_zeros() {
    // Constant input: variance 0, epsilon keeps the division finite and the
    // standardized values are exactly 0.
    let mut g = Graph::new();
    let x = g.var(NArray::full((2, 4), DType::F64, 3.0));
    let z = g.standardize_on(x, &[1], 0, 1e-3).unwrap();
    assert_eq!(g.value(z).unwrap().to_f64_vec().unwrap(), vec![0.0; 8]);

    let total = g.sum_all(z).unwrap();
    g.backward(total).unwrap();
    // With z = 0 everywhere, dx = (1 - (N + 0)/N)/std = 0.
    let gx = g.grad(x).unwrap().to_f64_vec().unwrap();
    assert!(gx.iter().all(|v| v.abs() < 1e-9));
}

#[test]
fn test_standardize_forward_values() {
    let mut g = Graph::new();
    let x = g.var(f64s(&[1.0, 3.0], (2,)));
    // mean 2, population variance 1; epsilon 0 gives z = [-1, 1].
    let z = g.standardize_on(x, &[0], 0, 0.0).unwrap();
    let vals = g.value(z).unwrap().to_f64_vec().unwrap();
    assert!((vals[0] + 1.0).abs() < 1e-12);
    assert!((vals[1] - 1.0).abs() < 1e-12);

    // Standardization is invariant to shift and scale of the input, so the
    // gradient of sum(z) collapses to zero.
    let total = g.sum_all(z).unwrap();
    g.backward(total).unwrap();
    let gx = g.grad(x).unwrap().to_f64_vec().unwrap();
    assert!(gx.iter().all(|v| v.abs() < 1e-9));
}

// Loss end-to-end

#[test]
fn test_mse_mean_loss_and_gradients() {
    init_logs();
    let mut g = Graph::new();
    let pred = g.var(f64s(&[1.0, 2.0, 3.0], (3,)));
    let target = g.var(f64s(&[1.0, 1.0, 1.0], (3,)));
    let loss = g.mse_loss(pred, target, Reduction::Mean).unwrap();

    let v = g.value(loss).unwrap().scalar_value().unwrap();
    assert!((v - 5.0 / 3.0).abs() < 1e-12);

    g.backward(loss).unwrap();
    // dL/dpred = 2*diff/3 = [0, 2/3, 4/3]; target gets the negation.
    let gp = g.grad(pred).unwrap().to_f64_vec().unwrap();
    let gt = g.grad(target).unwrap().to_f64_vec().unwrap();
    for (got, want) in gp.iter().zip([0.0, 2.0 / 3.0, 4.0 / 3.0]) {
        assert!((got - want).abs() < 1e-12);
    }
    for (got, want) in gt.iter().zip([0.0, -2.0 / 3.0, -4.0 / 3.0]) {
        assert!((got - want).abs() < 1e-12);
    }
}

#[test]
fn test_backward_ignores_unrelated_loss_nodes() {
    // Two losses over the same prediction; backward on the second must not
    // pick up contributions from the first, even though loss nodes seed
    // their own gradients at construction.
    let mut g = Graph::new();
    let pred = g.var(f64s(&[1.0, 2.0], (2,)));
    let target = g.var(NArray::zeros((2,), DType::F64));
    let _first = g.mse_loss(pred, target, Reduction::Sum).unwrap();
    let second = g.mse_loss(pred, target, Reduction::Sum).unwrap();

    g.backward(second).unwrap();
    // dL/dpred = 2*diff = [2, 4] from the second loss alone.
    assert_eq!(g.grad(pred).unwrap().to_f64_vec().unwrap(), vec![2.0, 4.0]);
    assert_eq!(
        g.grad(target).unwrap().to_f64_vec().unwrap(),
        vec![-2.0, -4.0]
    );
}

#[test]
fn test_backward_skips_nodes_outside_the_root_graph() {
    // A dead-end ln over the same variable must not run during an
    // unrelated backward; with x = 0 its law would inject NaN through 0/x.
    let mut g = Graph::new();
    let x = g.var(f64s(&[0.0, 1.0], (2,)));
    let _dead_end = g.ln(x).unwrap();
    let y = g.sqr(x).unwrap();
    let total = g.sum_all(y).unwrap();
    g.backward(total).unwrap();

    assert_eq!(g.grad(x).unwrap().to_f64_vec().unwrap(), vec![0.0, 2.0]);
}

#[test]
fn test_regression_step_through_full_graph() {
    // One forward/backward of a tiny standardize-then-fit pipeline,
    // composing broadcast, reduction and loss gradients.
    let mut g = Graph::new();
    let x = g.var(f64s(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], (3, 2)));
    let w = g.var(f64s(&[0.5, -0.5], (2,)));
    let z = g.standardize_on(x, &[0], 0, 1e-6).unwrap();
    let scaled = g.mul(z, w).unwrap();
    let pred = g.sum1d(scaled, 1).unwrap();
    let target = g.var(NArray::zeros((3,), DType::F64));
    let loss = g.mse_loss(pred, target, Reduction::Mean).unwrap();

    g.backward(loss).unwrap();

    // Both columns standardize to [-..., 0, +...], so pred = z·[.5, -.5]
    // row-wise; the loss is finite and w receives a finite gradient.
    assert!(g.value(loss).unwrap().scalar_value().unwrap().is_finite());
    let gw = g.grad(w).unwrap().to_f64_vec().unwrap();
    assert_eq!(gw.len(), 2);
    assert!(gw.iter().all(|v| v.is_finite()));
    // The two columns are identical up to the weight sign, so their
    // gradient magnitudes match.
    assert!((gw[0] + gw[1]).abs() < 1e-9 || (gw[0] - gw[1]).abs() < 1e-9);
}

// Accumulation across separate consumers

#[test]
fn test_two_consumers_accumulate() {
    let mut g = Graph::new();
    let x = g.var(f64s(&[1.0, 2.0], (2,)));
    let a = g.sqr(x).unwrap();
    let b = g.neg(x).unwrap();
    let s = g.add(a, b).unwrap();
    let total = g.sum_all(s).unwrap();
    g.backward(total).unwrap();

    // d(x² - x)/dx = 2x - 1.
    assert_eq!(g.grad(x).unwrap().to_f64_vec().unwrap(), vec![1.0, 3.0]);
}

#[test]
fn test_random_init_trains_finite() {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    let mut rng = StdRng::seed_from_u64(42);
    let mut g = Graph::new();
    let x = g.var(NArray::random_normal((8, 3), DType::F64, &mut rng));
    let w = g.var(NArray::random_normal((3,), DType::F64, &mut rng));
    let scaled = g.mul(x, w).unwrap();
    let pred = g.sum1d(scaled, 1).unwrap();
    let target = g.var(NArray::zeros((8,), DType::F64));
    let loss = g.mse_loss(pred, target, Reduction::Mean).unwrap();
    g.backward(loss).unwrap();

    assert!(g.value(loss).unwrap().scalar_value().unwrap().is_finite());
    let gw = g.grad(w).unwrap().to_f64_vec().unwrap();
    assert_eq!(gw.len(), 3);
    assert!(gw.iter().all(|v| v.is_finite()));
    // With nonzero predictions the gradient cannot vanish identically.
    assert!(gw.iter().any(|v| v.abs() > 0.0));
}

#[test]
fn test_zero_grads_between_passes() {
    let mut g = Graph::new();
    let x = g.var(f64s(&[2.0], ()));
    let y = g.sqr(x).unwrap();
    g.backward(y).unwrap();
    assert_eq!(g.grad(x).unwrap().scalar_value().unwrap(), 4.0);

    // Without zeroing, a second pass doubles the accumulation.
    g.backward(y).unwrap();
    assert_eq!(g.grad(x).unwrap().scalar_value().unwrap(), 8.0);

    g.zero_grads().unwrap();
    g.backward(y).unwrap();
    assert_eq!(g.grad(x).unwrap().scalar_value().unwrap(), 4.0);
}
