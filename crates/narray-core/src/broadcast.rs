use crate::error::{Error, Result};
use crate::layout::Layout;
use crate::shape::Shape;

// NumPy-style broadcasting over any number of operands.
//
// Shapes are right-aligned; at each aligned axis the required extent is the
// maximum of the non-1 sizes present (a missing leading axis counts as 1).
// Each operand's layout is then rewritten against the common shape: axes
// expanded from extent 1 get stride 0, synthesized leading axes get extent
// taken from the result and stride 0. No data moves.

/// One operand of a resolved elementwise broadcast.
#[derive(Debug, Clone)]
pub struct BroadcastOperand {
    layout: Layout,
    unchanged: bool,
}

impl BroadcastOperand {
    /// Layout over the common result shape (possibly with stride-0 axes).
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// True when the operand already had the result shape and needed no
    /// transformation; callers use this to skip the broadcast path.
    pub fn unchanged(&self) -> bool {
        self.unchanged
    }
}

/// Result of jointly broadcasting a list of layouts.
#[derive(Debug, Clone)]
pub struct ElementWise {
    shape: Shape,
    operands: Vec<BroadcastOperand>,
}

impl ElementWise {
    /// Resolve the common shape and per-operand virtual layouts.
    ///
    /// Fails with [`Error::BroadcastInvalid`] when any aligned axis carries
    /// two distinct non-1 extents.
    pub fn resolve(layouts: &[&Layout]) -> Result<ElementWise> {
        if layouts.is_empty() {
            return Err(Error::msg("broadcast: empty operand list"));
        }
        let rank = layouts.iter().map(|l| l.rank()).max().unwrap_or(0);

        // Right-aligned pass: position i counts from the last axis.
        let mut dims = vec![1usize; rank];
        for i in 0..rank {
            let mut required = 1usize;
            for l in layouts {
                let d = aligned_dim(l, i);
                if d == 1 {
                    continue;
                }
                if required == 1 {
                    required = d;
                } else if required != d {
                    return Err(Error::BroadcastInvalid {
                        shapes: layouts.iter().map(|l| l.shape().clone()).collect(),
                    });
                }
            }
            dims[rank - 1 - i] = required;
        }
        let shape = Shape::new(dims);
        log::trace!("broadcast resolved {} operands to {}", layouts.len(), shape);

        let operands = layouts
            .iter()
            .map(|l| transform(l, &shape))
            .collect::<Result<Vec<_>>>()?;

        Ok(ElementWise { shape, operands })
    }

    /// Convenience resolver over bare shapes (dense row-major layouts).
    pub fn resolve_shapes(shapes: &[Shape]) -> Result<ElementWise> {
        let layouts: Vec<Layout> = shapes.iter().map(|s| Layout::row_major(s.clone())).collect();
        let refs: Vec<&Layout> = layouts.iter().collect();
        Self::resolve(&refs)
    }

    /// The common result shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn operands(&self) -> &[BroadcastOperand] {
        &self.operands
    }

    pub fn operand(&self, i: usize) -> &BroadcastOperand {
        &self.operands[i]
    }
}

/// Extent of `layout` at right-aligned position `i` (0 = last axis);
/// missing leading axes read as 1.
fn aligned_dim(layout: &Layout, i: usize) -> usize {
    let rank = layout.rank();
    if i < rank {
        layout.dims()[rank - 1 - i]
    } else {
        1
    }
}

/// Rewrite `layout` against the common `shape`.
fn transform(layout: &Layout, shape: &Shape) -> Result<BroadcastOperand> {
    if layout.shape() == shape {
        return Ok(BroadcastOperand {
            layout: layout.clone(),
            unchanged: true,
        });
    }
    let rank = shape.rank();
    let lead = rank - layout.rank();
    let mut strides = vec![0usize; rank];
    for (i, (&dim, &stride)) in layout
        .dims()
        .iter()
        .zip(layout.strides().iter())
        .enumerate()
    {
        let target = shape.dims()[lead + i];
        if dim == target {
            strides[lead + i] = stride;
        } else if dim == 1 {
            // Expanded axis: repeat the single element.
            strides[lead + i] = 0;
        } else {
            // resolve() already established joint validity.
            return Err(Error::BroadcastInvalid {
                shapes: vec![layout.shape().clone(), shape.clone()],
            });
        }
    }
    let transformed = Layout::from_parts(shape.clone(), strides, layout.offset(), layout.order());
    Ok(BroadcastOperand {
        layout: transformed,
        unchanged: false,
    })
}
