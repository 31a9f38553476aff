// Loss functions.
//
// A loss node is the usual backward root, so it seeds its own gradient to 1
// when it is recorded; `backward()` then needs no explicit seeding step and
// the chain starts from a complete gradient.

use narray_core::{Error, NArray, Result};

use crate::graph::{BackEdge, Graph, NodeId};

/// How per-element losses aggregate into the scalar loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Reduction {
    /// Average over all elements (default).
    #[default]
    Mean,
    /// Sum over all elements.
    Sum,
}

impl Graph {
    /// Mean squared error: `reduce((prediction - target)²)`.
    ///
    /// Both operands must share one shape; the result is a one-element node
    /// with its gradient pre-seeded to 1. Backward sends `±2·diff` (divided
    /// by the element count under [`Reduction::Mean`]) to each operand.
    pub fn mse_loss(
        &mut self,
        prediction: NodeId,
        target: NodeId,
        reduction: Reduction,
    ) -> Result<NodeId> {
        let vp = self.value(prediction)?.clone();
        let vt = self.value(target)?.clone();
        if vp.shape() != vt.shape() {
            return Err(Error::ShapeMismatch {
                expected: vp.shape().clone(),
                got: vt.shape().clone(),
            });
        }
        let diff = vp.sub(&vt)?;
        let sse = diff.sqr()?.sum_all()?;
        let scale = match reduction {
            Reduction::Mean => 1.0 / diff.size() as f64,
            Reduction::Sum => 1.0,
        };
        let value = NArray::scalar(vp.dtype(), sse * scale);

        let dp = diff.clone();
        let dt = diff;
        let edges = vec![
            BackEdge {
                parent: prediction,
                back_fn: Box::new(move |g| dp.map(|v| 2.0 * v * scale)?.mul(g)),
            },
            BackEdge {
                parent: target,
                back_fn: Box::new(move |g| dt.map(|v| -2.0 * v * scale)?.mul(g)),
            },
        ];
        Ok(self.push_seeded(value, edges, "mse_loss"))
    }
}
