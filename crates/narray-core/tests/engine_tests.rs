// Engine tests — layout algebra, broadcasting, iteration, and the view
// contract, exercised through the public NArray surface.

use narray_core::{DType, ElementWise, Layout, NArray, Order, PointerIter, Shape};

use proptest::prelude::*;

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// Strided addressing

#[test]
fn test_stride_dot_product_addressing() {
    init_logs();
    // Address of [i, j, k] in a dense (2, 3, 4) block is 12i + 4j + k.
    let a = NArray::seq((2, 3, 4), DType::F64);
    assert_eq!(a.get(&[1, 2, 3]).unwrap(), 23.0);
    assert_eq!(a.get(&[0, 1, 0]).unwrap(), 4.0);
}

#[test]
fn test_row_and_col_major_disagree_beyond_1d() {
    let row = Layout::dense((2, 3), 0, Order::RowMajor);
    let col = Layout::dense((2, 3), 0, Order::ColMajor);
    assert_eq!(row.strides(), &[3, 1]);
    assert_eq!(col.strides(), &[1, 2]);

    let line_row = Layout::dense((6,), 0, Order::RowMajor);
    let line_col = Layout::dense((6,), 0, Order::ColMajor);
    assert_eq!(line_row.strides(), line_col.strides());
}

// Transpose as pure metadata

#[test]
fn test_transpose_shares_storage() {
    let a = NArray::seq((2, 3), DType::F64);
    let t = a.transpose(0, 1).unwrap();
    assert!(t.shares_storage(&a));
    assert_eq!(t.dims(), &[3, 2]);
    assert_eq!(t.to_f64_vec().unwrap(), vec![0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);

    // A write through the transpose is visible in the original.
    t.set(&[2, 1], 99.0).unwrap();
    assert_eq!(a.get(&[1, 2]).unwrap(), 99.0);
}

#[test]
fn test_narrow_window_aliases_parent() {
    let a = NArray::seq((4, 5), DType::F64);
    let w = a.narrow(0, 1, 2).unwrap().narrow(1, 2, 3).unwrap();
    assert_eq!(w.dims(), &[2, 3]);
    assert_eq!(w.to_f64_vec().unwrap(), vec![7.0, 8.0, 9.0, 12.0, 13.0, 14.0]);
    w.fill_(0.0).unwrap();
    assert_eq!(a.get(&[1, 2]).unwrap(), 0.0);
    assert_eq!(a.get(&[0, 2]).unwrap(), 2.0);
}

// Broadcast resolution

#[test]
fn test_joint_broadcast_shape() {
    let shapes = vec![
        Shape::from((2, 1)),
        Shape::from((3, 2, 3)),
        Shape::from((3,)),
        Shape::from((4, 1, 1, 1)),
    ];
    let ew = ElementWise::resolve_shapes(&shapes).unwrap();
    assert_eq!(ew.shape(), &Shape::from((4, 3, 2, 3)));
}

#[test]
fn test_broadcast_binary_values() {
    // Column [0, 1, 2] plus row [0, 10, 20, 30].
    let col = NArray::seq((3, 1), DType::F64);
    let row = NArray::from_f64_slice(&[0.0, 10.0, 20.0, 30.0], (4,), DType::F64).unwrap();
    let sum = col.add(&row).unwrap();
    assert_eq!(sum.dims(), &[3, 4]);
    assert_eq!(
        sum.to_f64_vec().unwrap(),
        vec![0.0, 10.0, 20.0, 30.0, 1.0, 11.0, 21.0, 31.0, 2.0, 12.0, 22.0, 32.0]
    );
}

#[test]
fn test_broadcast_rejects_mismatched_axes() {
    let a = NArray::zeros((2, 3), DType::F64);
    let b = NArray::zeros((3, 2), DType::F64);
    assert!(a.add(&b).is_err());
}

// Reductions and their inverses

#[test]
fn test_sum1d_then_strexp_restores_shape() {
    let a = NArray::seq((2, 3, 4), DType::F64);
    for axis in 0..3 {
        let reduced = a.sum1d(axis).unwrap();
        assert_eq!(reduced.rank(), 2);
        let restored = reduced.strexp(axis, a.dims()[axis]).unwrap();
        assert_eq!(restored.dims(), a.dims());
        // Summing the restored array along the same axis scales by the extent.
        let again = restored.sum1d(axis).unwrap();
        let scaled = reduced.map(|v| v * a.dims()[axis] as f64).unwrap();
        assert!(again.allclose(&scaled, 1e-9));
    }
}

#[test]
fn test_reduce_sum_to_undoes_broadcast() {
    // Forward: (3, 1) broadcast against (3, 4). Backward: reduce (3, 4)
    // gradients to each operand's shape.
    let a = NArray::seq((3, 1), DType::F64);
    let b = NArray::seq((3, 4), DType::F64);
    let c = a.add(&b).unwrap();
    assert_eq!(c.dims(), &[3, 4]);

    let upstream = NArray::full((3, 4), DType::F64, 1.0);
    let ga = upstream.reduce_sum_to(a.shape()).unwrap();
    let gb = upstream.reduce_sum_to(b.shape()).unwrap();
    assert_eq!(ga.to_f64_vec().unwrap(), vec![4.0, 4.0, 4.0]);
    assert_eq!(gb.to_f64_vec().unwrap(), vec![1.0; 12]);
}

#[test]
fn test_sum_all_matches_axis_sums() {
    let a = NArray::seq((3, 4), DType::F64);
    let total = a.sum_all().unwrap();
    let by_axis = a.sum1d(0).unwrap().sum1d(0).unwrap().scalar_value().unwrap();
    assert_eq!(total, by_axis);
    assert_eq!(total, 66.0);
}

// Views vs copies

#[test]
fn test_copy_detaches_views() {
    let a = NArray::seq((2, 3), DType::F64);
    let t = a.transpose(0, 1).unwrap();
    let c = t.copy().unwrap();
    assert!(!c.shares_storage(&a));
    assert!(c.is_dense());
    a.fill_(0.0).unwrap();
    assert_eq!(c.to_f64_vec().unwrap(), vec![0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);
}

#[test]
fn test_expand_aliases_single_element() {
    let a = NArray::scalar(DType::F64, 2.0);
    let wide = a.strexp(0, 5).unwrap();
    assert_eq!(wide.to_f64_vec().unwrap(), vec![2.0; 5]);
    a.fill_(3.0).unwrap();
    assert_eq!(wide.to_f64_vec().unwrap(), vec![3.0; 5]);
}

// Mixed dtypes through the f64 lens

#[test]
fn test_integer_storage_through_lens() {
    let a = NArray::from_f64_slice(&[1.0, 2.0, 3.0], (3,), DType::I32).unwrap();
    let b = NArray::from_f64_slice(&[10.0, 10.0, 10.0], (3,), DType::I32).unwrap();
    let c = a.add(&b).unwrap();
    assert_eq!(c.dtype(), DType::I32);
    assert_eq!(c.to_f64_vec().unwrap(), vec![11.0, 12.0, 13.0]);
}

#[test]
fn test_u8_saturation_is_not_assumed() {
    // Values are cast through the lens; writing in-range values holds exact.
    let a = NArray::from_f64_slice(&[0.0, 128.0, 255.0], (3,), DType::U8).unwrap();
    assert_eq!(a.to_f64_vec().unwrap(), vec![0.0, 128.0, 255.0]);
}

// Property: the pointer iterator visits every logical element exactly once,
// for arbitrary shapes and either traversal order, including after a
// transpose. Addresses may repeat only via stride-0 axes, which these dense
// layouts do not have.

fn small_shape() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(1usize..5, 0..4)
}

proptest! {
    #[test]
    fn prop_pointer_iter_visits_each_element_once(dims in small_shape(), col in any::<bool>()) {
        let shape = Shape::new(dims);
        let n = shape.size();
        let order = if col { Order::ColMajor } else { Order::RowMajor };
        let layout = Layout::dense(shape, 0, order);
        let mut seen: Vec<usize> = PointerIter::new(&layout, order).collect();
        prop_assert_eq!(seen.len(), n);
        seen.sort_unstable();
        seen.dedup();
        prop_assert_eq!(seen.len(), n);
        prop_assert!(seen.iter().all(|&p| p < n));
    }

    #[test]
    fn prop_transposed_iteration_is_a_permutation(d0 in 1usize..6, d1 in 1usize..6) {
        let layout = Layout::row_major((d0, d1)).transpose(0, 1).unwrap();
        let mut seen: Vec<usize> = PointerIter::new(&layout, Order::RowMajor).collect();
        seen.sort_unstable();
        let expected: Vec<usize> = (0..d0 * d1).collect();
        prop_assert_eq!(seen, expected);
    }

    #[test]
    fn prop_broadcast_add_matches_manual_expansion(
        d0 in 1usize..5,
        d1 in 1usize..5,
        vals in prop::collection::vec(-100.0f64..100.0, 1..5),
    ) {
        let d1 = vals.len().min(d1).max(1);
        let row: Vec<f64> = vals.iter().cycle().take(d1).copied().collect();
        let a = NArray::seq((d0, d1), DType::F64);
        let b = NArray::from_f64_slice(&row, (d1,), DType::F64).unwrap();
        let fast = a.add(&b).unwrap();
        let manual = NArray::apply(&[&a, &b], |v| v[0] + v[1]).unwrap();
        prop_assert!(fast.allclose(&manual, 0.0));
    }
}
