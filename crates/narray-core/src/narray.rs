use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rand::Rng;
use rand_distr::StandardNormal;
use rayon::prelude::*;

use crate::broadcast::ElementWise;
use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::iter::PointerIter;
use crate::layout::{Layout, Order};
use crate::shape::Shape;
use crate::storage::Storage;

// NArray combines a Storage buffer with a Layout over it. Cloning shares
// the storage (a view differs from its parent only in layout); copy()
// allocates fresh storage. Every address produced by iterating the layout
// lies within the storage, an invariant established at construction and
// preserved by the view operations.
//
// Mutation discipline: the in-place family (`*_` methods) writes through
// the receiver's storage and is visible through every view sharing it.
// The engine's contract is a single mutator at a time per storage, by
// ownership convention rather than lock protocol; the RwLock only
// serializes the individual accesses.

/// Minimum element count before dense elementwise kernels fan out to rayon.
const PAR_LEN: usize = 4096;

/// Dense n-dimensional array view over shared storage.
#[derive(Clone)]
pub struct NArray {
    storage: Arc<RwLock<Storage>>,
    layout: Layout,
    dtype: DType,
}

impl std::fmt::Debug for NArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "NArray(shape={}, dtype={}, offset={})",
            self.layout.shape(),
            self.dtype,
            self.layout.offset()
        )
    }
}

impl NArray {
    fn from_owned(storage: Storage, layout: Layout) -> Self {
        let dtype = storage.dtype();
        NArray {
            storage: Arc::new(RwLock::new(storage)),
            layout,
            dtype,
        }
    }

    fn view_with_layout(&self, layout: Layout) -> Self {
        NArray {
            storage: Arc::clone(&self.storage),
            layout,
            dtype: self.dtype,
        }
    }

    fn read_storage(&self) -> Result<RwLockReadGuard<'_, Storage>> {
        self.storage
            .read()
            .map_err(|_| Error::msg("storage lock poisoned"))
    }

    fn write_storage(&self) -> Result<RwLockWriteGuard<'_, Storage>> {
        self.storage
            .write()
            .map_err(|_| Error::msg("storage lock poisoned"))
    }

    // Construction

    /// Array of zeros with a dense row-major layout.
    pub fn zeros(shape: impl Into<Shape>, dtype: DType) -> Self {
        let shape = shape.into();
        let storage = Storage::zeros(dtype, shape.size());
        Self::from_owned(storage, Layout::row_major(shape))
    }

    /// Array filled with a constant.
    pub fn full(shape: impl Into<Shape>, dtype: DType, value: f64) -> Self {
        let shape = shape.into();
        let mut storage = Storage::zeros(dtype, shape.size());
        let len = storage.len();
        storage.fill(value, 0, len);
        Self::from_owned(storage, Layout::row_major(shape))
    }

    /// Rank-0 array holding a single value.
    pub fn scalar(dtype: DType, value: f64) -> Self {
        Self::full(Shape::scalar(), dtype, value)
    }

    /// Array built from a flat row-major f64 slice.
    pub fn from_f64_slice(data: &[f64], shape: impl Into<Shape>, dtype: DType) -> Result<Self> {
        let shape = shape.into();
        let storage = Storage::from_f64_checked(dtype, data, &shape)?;
        Ok(Self::from_owned(storage, Layout::row_major(shape)))
    }

    /// Array whose elements equal their own element index in the declared
    /// order (0, 1, 2, ... in row-major here).
    pub fn seq(shape: impl Into<Shape>, dtype: DType) -> Self {
        Self::seq_with_order(shape, dtype, Order::RowMajor)
    }

    pub fn seq_with_order(shape: impl Into<Shape>, dtype: DType, order: Order) -> Self {
        let shape = shape.into();
        let layout = Layout::dense(shape, 0, order);
        let mut storage = Storage::zeros(dtype, layout.size());
        for (i, ptr) in PointerIter::new(&layout, order).enumerate() {
            storage.set(ptr, i as f64);
        }
        Self::from_owned(storage, layout)
    }

    /// Uniform samples in [0, 1) from an explicit RNG handle.
    pub fn random<R: Rng + ?Sized>(shape: impl Into<Shape>, dtype: DType, rng: &mut R) -> Self {
        let shape = shape.into();
        let data: Vec<f64> = (0..shape.size()).map(|_| rng.gen::<f64>()).collect();
        let storage = Storage::from_f64(dtype, &data);
        Self::from_owned(storage, Layout::row_major(shape))
    }

    /// Standard-normal samples (mean 0, std 1) from an explicit RNG handle.
    pub fn random_normal<R: Rng + ?Sized>(
        shape: impl Into<Shape>,
        dtype: DType,
        rng: &mut R,
    ) -> Self {
        let shape = shape.into();
        let data: Vec<f64> = (0..shape.size()).map(|_| rng.sample(StandardNormal)).collect();
        let storage = Storage::from_f64(dtype, &data);
        Self::from_owned(storage, Layout::row_major(shape))
    }

    pub fn zeros_like(other: &NArray) -> Self {
        Self::zeros(other.shape().clone(), other.dtype())
    }

    // Accessors

    pub fn shape(&self) -> &Shape {
        self.layout.shape()
    }

    pub fn dims(&self) -> &[usize] {
        self.layout.dims()
    }

    pub fn rank(&self) -> usize {
        self.layout.rank()
    }

    pub fn size(&self) -> usize {
        self.layout.size()
    }

    pub fn dim(&self, axis: usize) -> Result<usize> {
        self.shape().dim(axis)
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn is_dense(&self) -> bool {
        self.layout.is_dense()
    }

    /// Whether two arrays share the same underlying storage buffer.
    pub fn shares_storage(&self, other: &NArray) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }

    /// Element at a multi-dimensional index.
    pub fn get(&self, index: &[usize]) -> Result<f64> {
        let ptr = self.layout.flat_index(index)?;
        Ok(self.read_storage()?.get(ptr))
    }

    /// Write the element at a multi-dimensional index (in-place family).
    pub fn set(&self, index: &[usize], value: f64) -> Result<()> {
        let ptr = self.layout.flat_index(index)?;
        self.write_storage()?.set(ptr, value);
        Ok(())
    }

    /// The single value of a one-element array.
    pub fn scalar_value(&self) -> Result<f64> {
        if self.size() != 1 {
            return Err(Error::NotAScalar {
                shape: self.shape().clone(),
            });
        }
        let guard = self.read_storage()?;
        let ptr = PointerIter::new(&self.layout, Order::RowMajor)
            .next()
            .ok_or_else(|| Error::msg("empty array"))?;
        Ok(guard.get(ptr))
    }

    /// All logical elements in row-major order.
    pub fn to_f64_vec(&self) -> Result<Vec<f64>> {
        let guard = self.read_storage()?;
        Ok(PointerIter::new(&self.layout, Order::RowMajor)
            .map(|ptr| guard.get(ptr))
            .collect())
    }

    /// Dense row-major copy with freshly allocated storage.
    pub fn copy(&self) -> Result<NArray> {
        let data = self.to_f64_vec()?;
        let storage = Storage::from_f64(self.dtype, &data);
        Ok(Self::from_owned(
            storage,
            Layout::row_major(self.shape().clone()),
        ))
    }

    /// Element-by-element comparison within `tol`; false on shape mismatch.
    pub fn allclose(&self, other: &NArray, tol: f64) -> bool {
        if self.shape() != other.shape() {
            return false;
        }
        match (self.to_f64_vec(), other.to_f64_vec()) {
            (Ok(a), Ok(b)) => a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() <= tol),
            _ => false,
        }
    }

    // Elementwise apply

    /// Broadcasted n-ary elementwise apply into a fresh dense array.
    ///
    /// All operands must share one dtype; the scalar function sees the
    /// operand values at each resolved address tuple.
    pub fn apply<F>(operands: &[&NArray], f: F) -> Result<NArray>
    where
        F: Fn(&[f64]) -> f64,
    {
        let first = operands
            .first()
            .ok_or_else(|| Error::msg("apply: empty operand list"))?;
        for op in operands {
            if op.dtype() != first.dtype() {
                return Err(Error::DTypeMismatch {
                    expected: first.dtype(),
                    got: op.dtype(),
                });
            }
        }
        let layouts: Vec<&Layout> = operands.iter().map(|o| o.layout()).collect();
        let ew = ElementWise::resolve(&layouts)?;
        let out_shape = ew.shape().clone();
        let n = out_shape.size();

        let guards = operands
            .iter()
            .map(|o| o.read_storage())
            .collect::<Result<Vec<_>>>()?;
        let mut iters: Vec<PointerIter> = ew
            .operands()
            .iter()
            .map(|op| PointerIter::new(op.layout(), Order::RowMajor))
            .collect();

        let mut out = Storage::zeros(first.dtype(), n);
        let mut vals = vec![0.0f64; operands.len()];
        for i in 0..n {
            for (j, it) in iters.iter_mut().enumerate() {
                // The iterators are sized to exactly n elements.
                if let Some(ptr) = it.next() {
                    vals[j] = guards[j].get(ptr);
                }
            }
            out.set(i, f(&vals));
        }
        Ok(Self::from_owned(out, Layout::row_major(out_shape)))
    }

    /// Pure unary map into a fresh dense array.
    pub fn map<F>(&self, f: F) -> Result<NArray>
    where
        F: Fn(f64) -> f64,
    {
        let guard = self.read_storage()?;
        let n = self.size();
        let mut out = Storage::zeros(self.dtype, n);
        for (i, ptr) in PointerIter::new(&self.layout, Order::RowMajor).enumerate() {
            out.set(i, f(guard.get(ptr)));
        }
        drop(guard);
        Ok(Self::from_owned(
            out,
            Layout::row_major(self.shape().clone()),
        ))
    }

    /// Broadcasted binary apply with a dense f64 fast path that fans out to
    /// rayon for large arrays. The parallelism is invisible to callers.
    fn binary_with<F>(&self, other: &NArray, f: F) -> Result<NArray>
    where
        F: Fn(f64, f64) -> f64 + Sync,
    {
        if self.dtype != other.dtype {
            return Err(Error::DTypeMismatch {
                expected: self.dtype,
                got: other.dtype,
            });
        }
        if self.dtype == DType::F64
            && self.shape() == other.shape()
            && self.layout.is_dense()
            && other.layout.is_dense()
            && self.layout.order() == Order::RowMajor
            && other.layout.order() == Order::RowMajor
        {
            let ga = self.read_storage()?;
            let gb = other.read_storage()?;
            if let (Some(av), Some(bv)) = (ga.as_f64(), gb.as_f64()) {
                let n = self.size();
                let a = &av[self.layout.offset()..self.layout.offset() + n];
                let b = &bv[other.layout.offset()..other.layout.offset() + n];
                let out: Vec<f64> = if n >= PAR_LEN {
                    a.par_iter()
                        .zip(b.par_iter())
                        .map(|(&x, &y)| f(x, y))
                        .collect()
                } else {
                    a.iter().zip(b.iter()).map(|(&x, &y)| f(x, y)).collect()
                };
                drop(ga);
                drop(gb);
                return Ok(Self::from_owned(
                    Storage::F64(out),
                    Layout::row_major(self.shape().clone()),
                ));
            }
        }
        Self::apply(&[self, other], |v| f(v[0], v[1]))
    }

    pub fn add(&self, other: &NArray) -> Result<NArray> {
        self.binary_with(other, |a, b| a + b)
    }

    pub fn sub(&self, other: &NArray) -> Result<NArray> {
        self.binary_with(other, |a, b| a - b)
    }

    pub fn mul(&self, other: &NArray) -> Result<NArray> {
        self.binary_with(other, |a, b| a * b)
    }

    pub fn div(&self, other: &NArray) -> Result<NArray> {
        self.binary_with(other, |a, b| a / b)
    }

    pub fn neg(&self) -> Result<NArray> {
        self.map(|v| -v)
    }

    pub fn sqr(&self) -> Result<NArray> {
        self.map(|v| v * v)
    }

    pub fn sqrt(&self) -> Result<NArray> {
        self.map(f64::sqrt)
    }

    pub fn exp(&self) -> Result<NArray> {
        self.map(f64::exp)
    }

    pub fn ln(&self) -> Result<NArray> {
        self.map(f64::ln)
    }

    // In-place family. These overwrite the receiver's own storage and must
    // not be used while another holder still needs the previous values.

    /// Overwrite every element with `value`.
    pub fn fill_(&self, value: f64) -> Result<()> {
        let mut guard = self.write_storage()?;
        if self.layout.is_dense() {
            guard.fill(value, self.layout.offset(), self.size());
        } else {
            for ptr in PointerIter::new(&self.layout, Order::RowMajor) {
                guard.set(ptr, value);
            }
        }
        Ok(())
    }

    /// In-place unary map through the receiver's layout.
    pub fn map_<F>(&self, f: F) -> Result<()>
    where
        F: Fn(f64) -> f64,
    {
        let mut guard = self.write_storage()?;
        if self.layout.is_dense() {
            // A dense layout covers exactly one contiguous range, in either
            // order, so the slice walk is the same element set.
            if let Some(buf) = guard.as_f64_mut() {
                let start = self.layout.offset();
                for v in &mut buf[start..start + self.size()] {
                    *v = f(*v);
                }
                return Ok(());
            }
        }
        for ptr in PointerIter::new(&self.layout, Order::RowMajor) {
            let v = guard.get(ptr);
            guard.set(ptr, f(v));
        }
        Ok(())
    }

    /// In-place broadcasted zip: `self[i] = f(self[i], other[i])`.
    ///
    /// `other` is broadcast to the receiver's shape; the receiver's shape
    /// must already be the joint result shape (in-place ops cannot grow).
    fn zip_<F>(&self, other: &NArray, f: F) -> Result<()>
    where
        F: Fn(f64, f64) -> f64,
    {
        if self.dtype != other.dtype {
            return Err(Error::DTypeMismatch {
                expected: self.dtype,
                got: other.dtype,
            });
        }
        let ew = ElementWise::resolve(&[&self.layout, other.layout()])?;
        if ew.shape() != self.shape() {
            return Err(Error::ShapeMismatch {
                expected: self.shape().clone(),
                got: other.shape().clone(),
            });
        }
        let other_iter = PointerIter::new(ew.operand(1).layout(), Order::RowMajor);

        if self.shares_storage(other) {
            // Same buffer: snapshot the operand first to avoid read/write
            // aliasing through the lock.
            let snapshot: Vec<f64> = {
                let guard = other.read_storage()?;
                other_iter.map(|ptr| guard.get(ptr)).collect()
            };
            let mut guard = self.write_storage()?;
            for (ptr, v) in PointerIter::new(&self.layout, Order::RowMajor).zip(snapshot) {
                let cur = guard.get(ptr);
                guard.set(ptr, f(cur, v));
            }
        } else {
            let other_guard = other.read_storage()?;
            let mut guard = self.write_storage()?;
            for (ptr, optr) in PointerIter::new(&self.layout, Order::RowMajor).zip(other_iter) {
                let cur = guard.get(ptr);
                guard.set(ptr, f(cur, other_guard.get(optr)));
            }
        }
        Ok(())
    }

    pub fn add_(&self, other: &NArray) -> Result<()> {
        self.zip_(other, |a, b| a + b)
    }

    pub fn sub_(&self, other: &NArray) -> Result<()> {
        self.zip_(other, |a, b| a - b)
    }

    pub fn mul_(&self, other: &NArray) -> Result<()> {
        self.zip_(other, |a, b| a * b)
    }

    pub fn div_(&self, other: &NArray) -> Result<()> {
        self.zip_(other, |a, b| a / b)
    }

    // Reductions. All accumulation routes through Storage::inc via a
    // stride-0 accumulator layout, so every logical element contributes
    // exactly once.

    /// Sum of all elements.
    pub fn sum_all(&self) -> Result<f64> {
        let guard = self.read_storage()?;
        Ok(PointerIter::new(&self.layout, Order::RowMajor)
            .map(|ptr| guard.get(ptr))
            .sum())
    }

    /// Mean of all elements.
    pub fn mean_all(&self) -> Result<f64> {
        let n = self.size();
        if n == 0 {
            return Err(Error::NumericDomain("mean of empty array".into()));
        }
        Ok(self.sum_all()? / n as f64)
    }

    /// Accumulator layout over `self`'s shape whose addresses land in the
    /// keepdim result: reduced axes get stride 0.
    fn acc_layout(&self, axes: &[usize], result: &Layout) -> Layout {
        let mut strides = result.strides().to_vec();
        for &axis in axes {
            strides[axis] = 0;
        }
        Layout::from_parts(
            self.shape().clone(),
            strides,
            result.offset(),
            result.order(),
        )
    }

    fn check_axes(&self, axes: &[usize]) -> Result<()> {
        for &axis in axes {
            if axis >= self.rank() {
                return Err(Error::AxisOutOfRange {
                    axis,
                    rank: self.rank(),
                });
            }
        }
        Ok(())
    }

    fn keepdim_shape(&self, axes: &[usize]) -> Shape {
        let mut dims = self.dims().to_vec();
        for &axis in axes {
            dims[axis] = 1;
        }
        Shape::new(dims)
    }

    fn drop_axes(result: NArray, axes: &[usize]) -> Result<NArray> {
        let mut out = result;
        let mut sorted = axes.to_vec();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        for axis in sorted {
            out = out.squeeze(axis)?;
        }
        Ok(out)
    }

    /// Sum over a set of axes.
    pub fn sum_on(&self, axes: &[usize], keepdim: bool) -> Result<NArray> {
        self.check_axes(axes)?;
        let result = NArray::zeros(self.keepdim_shape(axes), self.dtype);
        let acc = self.acc_layout(axes, result.layout());

        let guard = self.read_storage()?;
        let mut out = result.write_storage()?;
        for (src, dst) in PointerIter::new(&self.layout, Order::RowMajor)
            .zip(PointerIter::new(&acc, Order::RowMajor))
        {
            out.inc(dst, guard.get(src));
        }
        drop(out);
        drop(guard);
        if keepdim {
            Ok(result)
        } else {
            Self::drop_axes(result, axes)
        }
    }

    /// Mean over a set of axes.
    pub fn mean_on(&self, axes: &[usize], keepdim: bool) -> Result<NArray> {
        self.check_axes(axes)?;
        let count: usize = axes.iter().map(|&a| self.dims()[a]).product();
        if count == 0 {
            return Err(Error::NumericDomain("mean over empty axes".into()));
        }
        let sum = self.sum_on(axes, keepdim)?;
        sum.map_(|v| v / count as f64)?;
        Ok(sum)
    }

    /// Variance over a set of axes with `count - ddof` divisor.
    pub fn var_on(&self, axes: &[usize], ddof: usize, keepdim: bool) -> Result<NArray> {
        self.check_axes(axes)?;
        let count: usize = axes.iter().map(|&a| self.dims()[a]).product();
        if count <= ddof {
            return Err(Error::NumericDomain(format!(
                "variance requires count > ddof, got count {} and ddof {}",
                count, ddof
            )));
        }
        let mean = self.mean_on(axes, true)?;
        let mean_vals = mean.to_f64_vec()?;
        let result = NArray::zeros(self.keepdim_shape(axes), self.dtype);
        let acc = self.acc_layout(axes, result.layout());

        let guard = self.read_storage()?;
        let mut out = result.write_storage()?;
        for (src, dst) in PointerIter::new(&self.layout, Order::RowMajor)
            .zip(PointerIter::new(&acc, Order::RowMajor))
        {
            let d = guard.get(src) - mean_vals[dst];
            out.inc(dst, d * d / (count - ddof) as f64);
        }
        drop(out);
        drop(guard);
        if keepdim {
            Ok(result)
        } else {
            Self::drop_axes(result, axes)
        }
    }

    /// Sum along one axis, removing it.
    pub fn sum1d(&self, axis: usize) -> Result<NArray> {
        self.sum_on(&[axis], false)
    }

    /// Mean along one axis, removing it.
    pub fn mean1d(&self, axis: usize) -> Result<NArray> {
        self.mean_on(&[axis], false)
    }

    /// Variance along one axis, removing it.
    pub fn var1d(&self, axis: usize, ddof: usize) -> Result<NArray> {
        self.var_on(&[axis], ddof, false)
    }

    /// Reduce any broadcast-expanded axes back down to `target`: the
    /// inverse of the expansion a forward broadcast applied.
    ///
    /// Leading axes missing from `target` are summed away; axes where the
    /// target extent is 1 are summed with the axis kept.
    pub fn reduce_sum_to(&self, target: &Shape) -> Result<NArray> {
        let ew = ElementWise::resolve_shapes(&[self.shape().clone(), target.clone()])?;
        if ew.shape() != self.shape() {
            return Err(Error::ShapeMismatch {
                expected: self.shape().clone(),
                got: target.clone(),
            });
        }
        let mut result = self.clone();
        while result.rank() > target.rank() {
            result = result.sum1d(0)?;
        }
        for i in 0..target.rank() {
            if target.dims()[i] != result.dims()[i] {
                // Joint validity above means the target extent here is 1.
                result = result.sum_on(&[i], true)?;
            }
        }
        Ok(result)
    }

    // Shape-transforming views

    /// Reinterpret a dense array under a new shape of equal size. Zero copy.
    pub fn reshape(&self, shape: impl Into<Shape>) -> Result<NArray> {
        let shape = shape.into();
        if shape.size() != self.size() {
            return Err(Error::ShapeMismatch {
                expected: self.shape().clone(),
                got: shape,
            });
        }
        if !self.layout.is_dense() {
            crate::bail!(
                "reshape requires a dense layout, shape {} is strided",
                self.shape()
            );
        }
        let layout = Layout::dense(shape, self.layout.offset(), self.layout.order());
        Ok(self.view_with_layout(layout))
    }

    /// Swap two axes. Zero copy.
    pub fn transpose(&self, axis0: usize, axis1: usize) -> Result<NArray> {
        Ok(self.view_with_layout(self.layout.transpose(axis0, axis1)?))
    }

    /// Transpose of a rank-2 array.
    pub fn t(&self) -> Result<NArray> {
        if self.rank() != 2 {
            crate::bail!("t() expects rank 2, got rank {}", self.rank());
        }
        self.transpose(0, 1)
    }

    /// Shrink `axis` to `[start, start+len)`. Zero copy.
    pub fn narrow(&self, axis: usize, start: usize, len: usize) -> Result<NArray> {
        Ok(self.view_with_layout(self.layout.narrow(axis, start, len)?))
    }

    /// Insert a size-1 axis at `axis`. Zero copy.
    pub fn stretch(&self, axis: usize) -> Result<NArray> {
        Ok(self.view_with_layout(self.layout.stretch(axis)?))
    }

    /// Expand a size-1 axis to extent `dim` via stride 0. Zero copy.
    pub fn expand(&self, axis: usize, dim: usize) -> Result<NArray> {
        Ok(self.view_with_layout(self.layout.expand(axis, dim)?))
    }

    /// stretch + expand: materialize a missing axis at `axis` with extent
    /// `dim`, repeated via stride 0. Inverse of a one-axis reduction.
    pub fn strexp(&self, axis: usize, dim: usize) -> Result<NArray> {
        self.stretch(axis)?.expand(axis, dim)
    }

    /// Remove a size-1 axis. Zero copy.
    pub fn squeeze(&self, axis: usize) -> Result<NArray> {
        Ok(self.view_with_layout(self.layout.squeeze(axis)?))
    }

    /// Concatenate along `axis` into a fresh dense array.
    ///
    /// Must copy: the operands are not contiguous with each other. Off-axis
    /// extents and dtypes must match.
    pub fn cat(arrays: &[NArray], axis: usize) -> Result<NArray> {
        let first = arrays
            .first()
            .ok_or_else(|| Error::msg("cat: empty array list"))?;
        let rank = first.rank();
        if axis >= rank {
            return Err(Error::AxisOutOfRange { axis, rank });
        }
        for a in arrays.iter().skip(1) {
            if a.dtype() != first.dtype() {
                return Err(Error::DTypeMismatch {
                    expected: first.dtype(),
                    got: a.dtype(),
                });
            }
            if a.rank() != rank {
                return Err(Error::ShapeMismatch {
                    expected: first.shape().clone(),
                    got: a.shape().clone(),
                });
            }
            for d in 0..rank {
                if d != axis && a.dims()[d] != first.dims()[d] {
                    return Err(Error::ShapeMismatch {
                        expected: first.shape().clone(),
                        got: a.shape().clone(),
                    });
                }
            }
        }

        let cat_size: usize = arrays.iter().map(|a| a.dims()[axis]).sum();
        let mut out_dims = first.dims().to_vec();
        out_dims[axis] = cat_size;
        let result = NArray::zeros(Shape::new(out_dims), first.dtype());

        let mut offset = 0usize;
        for a in arrays {
            let len = a.dims()[axis];
            let dst = result.narrow(axis, offset, len)?;
            dst.copy_from(a)?;
            offset += len;
        }
        Ok(result)
    }

    /// Cumulative boundary offsets along `axis` for a cat of these arrays:
    /// `[0, d0, d0+d1, ...]`. Used to slice gradients back per segment.
    pub fn cat_boundaries(arrays: &[NArray], axis: usize) -> Result<Vec<usize>> {
        let mut bounds = Vec::with_capacity(arrays.len() + 1);
        bounds.push(0);
        let mut total = 0usize;
        for a in arrays {
            total += a.dim(axis)?;
            bounds.push(total);
        }
        Ok(bounds)
    }

    /// Overwrite this view's elements with `src`'s, element by element.
    fn copy_from(&self, src: &NArray) -> Result<()> {
        if self.shape() != src.shape() {
            return Err(Error::ShapeMismatch {
                expected: self.shape().clone(),
                got: src.shape().clone(),
            });
        }
        let src_guard = src.read_storage()?;
        let mut dst_guard = self.write_storage()?;
        for (dst, s) in PointerIter::new(&self.layout, Order::RowMajor)
            .zip(PointerIter::new(src.layout(), Order::RowMajor))
        {
            dst_guard.set(dst, src_guard.get(s));
        }
        Ok(())
    }
}
