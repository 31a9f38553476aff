use crate::error::{Error, Result};
use crate::shape::Shape;

// Layout decouples an array's logical shape from its arrangement in flat
// storage. An index tuple maps to the linear address
//
//     offset + sum(idx[i] * strides[i])
//
// which is what makes transpose, narrow and broadcast expansion free: they
// only rewrite strides and offset, never the data. A stride of 0 along an
// axis denotes a broadcast (repeated) dimension.

/// Traversal order for dense layouts and pointer iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    /// C order: the last axis varies fastest.
    #[default]
    RowMajor,
    /// Fortran order: the first axis varies fastest.
    ColMajor,
}

/// Memory layout: shape + per-axis strides + base offset + declared order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    shape: Shape,
    strides: Vec<usize>,
    offset: usize,
    order: Order,
}

impl Layout {
    /// Dense layout with canonical strides for the given order.
    pub fn dense(shape: impl Into<Shape>, offset: usize, order: Order) -> Self {
        let shape = shape.into();
        let strides = match order {
            Order::RowMajor => shape.strides_row_major(),
            Order::ColMajor => shape.strides_col_major(),
        };
        Layout {
            shape,
            strides,
            offset,
            order,
        }
    }

    /// Dense row-major layout at offset 0.
    pub fn row_major(shape: impl Into<Shape>) -> Self {
        Self::dense(shape, 0, Order::RowMajor)
    }

    /// Layout with explicit strides, for views.
    ///
    /// Fails when the stride array length does not match the shape's rank.
    pub fn with_strides(
        shape: Shape,
        strides: Vec<usize>,
        offset: usize,
        order: Order,
    ) -> Result<Self> {
        if strides.len() != shape.rank() {
            return Err(Error::StrideLengthMismatch {
                expected_rank: shape.rank(),
                got: strides.len(),
            });
        }
        Ok(Layout {
            shape,
            strides,
            offset,
            order,
        })
    }

    pub(crate) fn from_parts(shape: Shape, strides: Vec<usize>, offset: usize, order: Order) -> Self {
        debug_assert_eq!(strides.len(), shape.rank());
        Layout {
            shape,
            strides,
            offset,
            order,
        }
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn order(&self) -> Order {
        self.order
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    pub fn size(&self) -> usize {
        self.shape.size()
    }

    /// Whether the strides are the canonical dense strides for the declared
    /// order. Offset may be non-zero (a dense sub-block is still dense).
    pub fn is_dense(&self) -> bool {
        let canonical = match self.order {
            Order::RowMajor => self.shape.strides_row_major(),
            Order::ColMajor => self.shape.strides_col_major(),
        };
        self.strides == canonical
    }

    /// Linear address of a multi-dimensional index, with bounds validation.
    pub fn flat_index(&self, index: &[usize]) -> Result<usize> {
        if index.len() != self.rank() {
            return Err(Error::msg(format!(
                "index rank {} does not match layout rank {}",
                index.len(),
                self.rank()
            )));
        }
        let mut flat = self.offset;
        for (axis, (&idx, &dim)) in index.iter().zip(self.dims().iter()).enumerate() {
            if idx >= dim {
                return Err(Error::IndexOutOfBounds {
                    axis,
                    index: idx,
                    dim,
                });
            }
            flat += idx * self.strides[axis];
        }
        Ok(flat)
    }

    /// Swap two axes. Free: only shape and strides move.
    pub fn transpose(&self, axis0: usize, axis1: usize) -> Result<Layout> {
        let rank = self.rank();
        if axis0 >= rank || axis1 >= rank {
            return Err(Error::AxisOutOfRange {
                axis: axis0.max(axis1),
                rank,
            });
        }
        let mut dims = self.dims().to_vec();
        let mut strides = self.strides.clone();
        dims.swap(axis0, axis1);
        strides.swap(axis0, axis1);
        Ok(Layout::from_parts(
            Shape::new(dims),
            strides,
            self.offset,
            self.order,
        ))
    }

    /// Shrink one axis to `[start, start+len)`, shifting the offset. Zero copy.
    pub fn narrow(&self, axis: usize, start: usize, len: usize) -> Result<Layout> {
        let rank = self.rank();
        if axis >= rank {
            return Err(Error::AxisOutOfRange { axis, rank });
        }
        let dim = self.dims()[axis];
        if start + len > dim {
            return Err(Error::NarrowOutOfBounds {
                axis,
                start,
                len,
                dim,
            });
        }
        let mut dims = self.dims().to_vec();
        dims[axis] = len;
        let offset = self.offset + start * self.strides[axis];
        Ok(Layout::from_parts(
            Shape::new(dims),
            self.strides.clone(),
            offset,
            self.order,
        ))
    }

    /// Insert a size-1 axis at `axis` (stride 0, nothing moves along it).
    pub fn stretch(&self, axis: usize) -> Result<Layout> {
        let rank = self.rank();
        if axis > rank {
            return Err(Error::AxisOutOfRange {
                axis,
                rank: rank + 1,
            });
        }
        let mut dims = self.dims().to_vec();
        let mut strides = self.strides.clone();
        dims.insert(axis, 1);
        strides.insert(axis, 0);
        Ok(Layout::from_parts(
            Shape::new(dims),
            strides,
            self.offset,
            self.order,
        ))
    }

    /// Expand a size-1 axis to extent `dim` by setting its stride to 0.
    ///
    /// The single element is repeated without copying; this is the broadcast
    /// primitive and the inverse used when summing gradients back down.
    pub fn expand(&self, axis: usize, dim: usize) -> Result<Layout> {
        let rank = self.rank();
        if axis >= rank {
            return Err(Error::AxisOutOfRange { axis, rank });
        }
        if self.dims()[axis] != 1 {
            return Err(Error::msg(format!(
                "expand: axis {} has extent {}, expected 1",
                axis,
                self.dims()[axis]
            )));
        }
        let mut dims = self.dims().to_vec();
        let mut strides = self.strides.clone();
        dims[axis] = dim;
        strides[axis] = 0;
        Ok(Layout::from_parts(
            Shape::new(dims),
            strides,
            self.offset,
            self.order,
        ))
    }

    /// Remove a size-1 axis.
    pub fn squeeze(&self, axis: usize) -> Result<Layout> {
        let rank = self.rank();
        if axis >= rank {
            return Err(Error::AxisOutOfRange { axis, rank });
        }
        if self.dims()[axis] != 1 {
            return Err(Error::msg(format!(
                "squeeze: axis {} has extent {}, expected 1",
                axis,
                self.dims()[axis]
            )));
        }
        let mut dims = self.dims().to_vec();
        let mut strides = self.strides.clone();
        dims.remove(axis);
        strides.remove(axis);
        Ok(Layout::from_parts(
            Shape::new(dims),
            strides,
            self.offset,
            self.order,
        ))
    }
}
