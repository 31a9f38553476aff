use crate::layout::{Layout, Order};

// PointerIter is the one place multi-dimensional traversal order is defined.
// Every reduction and elementwise kernel routes through it (or the dense
// fast path, which produces the same sequence) so that each logical element
// is visited exactly once regardless of memory order.
//
// The walk keeps a running pointer instead of recomputing the stride dot
// product per element: each step adds the fastest axis's stride; on
// overflow the axis resets (subtracting (dim-1)*stride) and the carry moves
// to the next slower axis.

/// Yields the linear storage address of every element of a [`Layout`], in
/// the requested traversal order. Exhausts after exactly `size()` items.
pub struct PointerIter {
    index: Vec<usize>,
    dims: Vec<usize>,
    strides: Vec<usize>,
    /// Axis visit order, fastest-varying first.
    axes: Vec<usize>,
    ptr: usize,
    remaining: usize,
}

impl PointerIter {
    pub fn new(layout: &Layout, order: Order) -> Self {
        let rank = layout.rank();
        let axes: Vec<usize> = match order {
            Order::RowMajor => (0..rank).rev().collect(),
            Order::ColMajor => (0..rank).collect(),
        };
        PointerIter {
            index: vec![0; rank],
            dims: layout.dims().to_vec(),
            strides: layout.strides().to_vec(),
            axes,
            ptr: layout.offset(),
            remaining: layout.size(),
        }
    }

    fn advance(&mut self) {
        for &axis in &self.axes {
            self.index[axis] += 1;
            if self.index[axis] < self.dims[axis] {
                self.ptr += self.strides[axis];
                return;
            }
            // Carry: reset this axis and move to the next slower one.
            self.index[axis] = 0;
            self.ptr -= (self.dims[axis] - 1) * self.strides[axis];
        }
    }
}

impl Iterator for PointerIter {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        let current = self.ptr;
        self.remaining -= 1;
        if self.remaining > 0 {
            self.advance();
        }
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for PointerIter {}
