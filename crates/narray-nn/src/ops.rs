// Differentiable operations, one graph method per op.
//
// Every method follows the same recipe: read the parent values, validate
// and compute the forward result through narray-core (which raises the
// shape/broadcast errors before anything is recorded), then push a node
// whose back edges capture exactly the arrays the gradient law needs.
//
// GRADIENT LAWS:
//
//   add:  ga += sumTo(g, a.shape)          gb += sumTo(g, b.shape)
//   sub:  ga += sumTo(g, a.shape)          gb += sumTo(-g, b.shape)
//   mul:  ga += sumTo(g*b, a.shape)        gb += sumTo(g*a, b.shape)
//   div:  ga += sumTo(g/b, a.shape)        gb += sumTo(-g*a/b², b.shape)
//   neg:  gx += -g
//   sqr:  gx += 2*x*g
//   sqrt: gx += g / (2*sqrt(x))
//   exp:  gx += g * exp(x)
//   ln:   gx += g / x
//   cat:  parent i receives narrow(g, axis, bounds[i], sizes[i])
//   sum1d: gx += strexp(g, axis, n)
//   mean1d: gx += strexp(g/n, axis, n)
//   sum_all: gx += g (scalar broadcast over x.shape)
//   standardize_on: gx += (g - (sum(g) + z*sum(g*z))/N) / std
//
// sumTo is reduce_sum_to: the exact inverse of whatever broadcast expansion
// the forward pass applied, so gradient shapes always match parent shapes.

use narray_core::{NArray, Result};

use crate::graph::{BackEdge, Graph, NodeId};

impl Graph {
    /// Broadcasting elementwise addition.
    pub fn add(&mut self, a: NodeId, b: NodeId) -> Result<NodeId> {
        let va = self.value(a)?.clone();
        let vb = self.value(b)?.clone();
        let value = va.add(&vb)?;
        let sa = va.shape().clone();
        let sb = vb.shape().clone();
        let edges = vec![
            BackEdge {
                parent: a,
                back_fn: Box::new(move |g| g.reduce_sum_to(&sa)),
            },
            BackEdge {
                parent: b,
                back_fn: Box::new(move |g| g.reduce_sum_to(&sb)),
            },
        ];
        Ok(self.push(value, edges, "add"))
    }

    /// Broadcasting elementwise subtraction.
    pub fn sub(&mut self, a: NodeId, b: NodeId) -> Result<NodeId> {
        let va = self.value(a)?.clone();
        let vb = self.value(b)?.clone();
        let value = va.sub(&vb)?;
        let sa = va.shape().clone();
        let sb = vb.shape().clone();
        let edges = vec![
            BackEdge {
                parent: a,
                back_fn: Box::new(move |g| g.reduce_sum_to(&sa)),
            },
            BackEdge {
                parent: b,
                back_fn: Box::new(move |g| g.neg()?.reduce_sum_to(&sb)),
            },
        ];
        Ok(self.push(value, edges, "sub"))
    }

    /// Broadcasting elementwise multiplication.
    pub fn mul(&mut self, a: NodeId, b: NodeId) -> Result<NodeId> {
        let va = self.value(a)?.clone();
        let vb = self.value(b)?.clone();
        let value = va.mul(&vb)?;
        let sa = va.shape().clone();
        let sb = vb.shape().clone();
        let (ca, cb) = (va.clone(), vb.clone());
        let edges = vec![
            BackEdge {
                parent: a,
                back_fn: Box::new(move |g| g.mul(&cb)?.reduce_sum_to(&sa)),
            },
            BackEdge {
                parent: b,
                back_fn: Box::new(move |g| g.mul(&ca)?.reduce_sum_to(&sb)),
            },
        ];
        Ok(self.push(value, edges, "mul"))
    }

    /// Broadcasting elementwise division.
    pub fn div(&mut self, a: NodeId, b: NodeId) -> Result<NodeId> {
        let va = self.value(a)?.clone();
        let vb = self.value(b)?.clone();
        let value = va.div(&vb)?;
        let sa = va.shape().clone();
        let sb = vb.shape().clone();
        let (ca, cb) = (va.clone(), vb.clone());
        let cb2 = vb.clone();
        let edges = vec![
            BackEdge {
                parent: a,
                back_fn: Box::new(move |g| g.div(&cb)?.reduce_sum_to(&sa)),
            },
            BackEdge {
                parent: b,
                back_fn: Box::new(move |g| {
                    g.mul(&ca)?.div(&cb2.sqr()?)?.neg()?.reduce_sum_to(&sb)
                }),
            },
        ];
        Ok(self.push(value, edges, "div"))
    }

    /// Elementwise negation.
    pub fn neg(&mut self, x: NodeId) -> Result<NodeId> {
        let value = self.value(x)?.neg()?;
        let edges = vec![BackEdge {
            parent: x,
            back_fn: Box::new(|g| g.neg()),
        }];
        Ok(self.push(value, edges, "neg"))
    }

    /// Elementwise square.
    pub fn sqr(&mut self, x: NodeId) -> Result<NodeId> {
        let vx = self.value(x)?.clone();
        let value = vx.sqr()?;
        let edges = vec![BackEdge {
            parent: x,
            back_fn: Box::new(move |g| g.mul(&vx)?.map(|v| 2.0 * v)),
        }];
        Ok(self.push(value, edges, "sqr"))
    }

    /// Elementwise square root.
    pub fn sqrt(&mut self, x: NodeId) -> Result<NodeId> {
        let value = self.value(x)?.sqrt()?;
        let out = value.clone();
        let edges = vec![BackEdge {
            parent: x,
            back_fn: Box::new(move |g| g.div(&out)?.map(|v| 0.5 * v)),
        }];
        Ok(self.push(value, edges, "sqrt"))
    }

    /// Elementwise exponential.
    pub fn exp(&mut self, x: NodeId) -> Result<NodeId> {
        let value = self.value(x)?.exp()?;
        let out = value.clone();
        let edges = vec![BackEdge {
            parent: x,
            back_fn: Box::new(move |g| g.mul(&out)),
        }];
        Ok(self.push(value, edges, "exp"))
    }

    /// Elementwise natural logarithm.
    pub fn ln(&mut self, x: NodeId) -> Result<NodeId> {
        let vx = self.value(x)?.clone();
        let value = vx.ln()?;
        let edges = vec![BackEdge {
            parent: x,
            back_fn: Box::new(move |g| g.div(&vx)),
        }];
        Ok(self.push(value, edges, "ln"))
    }

    /// Concatenation along `axis`. The gradient splits back along the
    /// recorded boundary offsets, one narrow view per parent.
    pub fn cat(&mut self, nodes: &[NodeId], axis: usize) -> Result<NodeId> {
        let values = nodes
            .iter()
            .map(|&n| Ok(self.value(n)?.clone()))
            .collect::<Result<Vec<_>>>()?;
        let value = NArray::cat(&values, axis)?;
        let bounds = NArray::cat_boundaries(&values, axis)?;
        let edges = nodes
            .iter()
            .zip(bounds.windows(2))
            .map(|(&parent, w)| {
                let (start, len) = (w[0], w[1] - w[0]);
                BackEdge {
                    parent,
                    back_fn: Box::new(move |g: &NArray| g.narrow(axis, start, len)),
                }
            })
            .collect();
        Ok(self.push(value, edges, "cat"))
    }

    /// Sum along one axis, removing it.
    pub fn sum1d(&mut self, x: NodeId, axis: usize) -> Result<NodeId> {
        let vx = self.value(x)?;
        let n = vx.dim(axis)?;
        let value = vx.sum1d(axis)?;
        let edges = vec![BackEdge {
            parent: x,
            back_fn: Box::new(move |g| g.strexp(axis, n)),
        }];
        Ok(self.push(value, edges, "sum1d"))
    }

    /// Mean along one axis, removing it.
    pub fn mean1d(&mut self, x: NodeId, axis: usize) -> Result<NodeId> {
        let vx = self.value(x)?;
        let n = vx.dim(axis)?;
        let value = vx.mean1d(axis)?;
        let edges = vec![BackEdge {
            parent: x,
            back_fn: Box::new(move |g| g.map(|v| v / n as f64)?.strexp(axis, n)),
        }];
        Ok(self.push(value, edges, "mean1d"))
    }

    /// Sum of every element, producing a one-element node.
    pub fn sum_all(&mut self, x: NodeId) -> Result<NodeId> {
        let vx = self.value(x)?;
        let value = NArray::scalar(vx.dtype(), vx.sum_all()?);
        let edges = vec![BackEdge {
            parent: x,
            // Scalar gradient broadcasts over the parent shape on accumulate.
            back_fn: Box::new(|g: &NArray| Ok(g.clone())),
        }];
        Ok(self.push(value, edges, "sum_all"))
    }

    /// Standardization over an axis set: `(x - mean) / sqrt(var + epsilon)`
    /// with `count - ddof` variance divisor.
    pub fn standardize_on(
        &mut self,
        x: NodeId,
        axes: &[usize],
        ddof: usize,
        epsilon: f64,
    ) -> Result<NodeId> {
        let vx = self.value(x)?.clone();
        let mean = vx.mean_on(axes, true)?;
        let std = vx
            .var_on(axes, ddof, true)?
            .map(|v| (v + epsilon).sqrt())?;
        let value = vx.sub(&mean)?.div(&std)?;

        let count: usize = axes.iter().map(|&a| vx.dims()[a]).product();
        let z = value.clone();
        let std_b = std.clone();
        let axes_b = axes.to_vec();
        let edges = vec![BackEdge {
            parent: x,
            back_fn: Box::new(move |g| {
                let g_sum = g.sum_on(&axes_b, true)?;
                let gz_sum = g.mul(&z)?.sum_on(&axes_b, true)?;
                let correction = g_sum
                    .add(&z.mul(&gz_sum)?)?
                    .map(|v| v / count as f64)?;
                g.sub(&correction)?.div(&std_b)
            }),
        }];
        Ok(self.push(value, edges, "standardize_on"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use narray_core::DType;

    fn scalar_graph(v: f64) -> (Graph, NodeId) {
        let mut g = Graph::new();
        let x = g.var(NArray::scalar(DType::F64, v));
        (g, x)
    }

    #[test]
    fn test_unary_chain_rules_at_a_point() {
        // d/dx of sqrt at 4 is 1/(2*2) = 0.25.
        let (mut g, x) = scalar_graph(4.0);
        let y = g.sqrt(x).unwrap();
        g.backward(y).unwrap();
        assert!((g.grad(x).unwrap().scalar_value().unwrap() - 0.25).abs() < 1e-12);

        // d/dx of exp at 0 is 1.
        let (mut g, x) = scalar_graph(0.0);
        let y = g.exp(x).unwrap();
        g.backward(y).unwrap();
        assert!((g.grad(x).unwrap().scalar_value().unwrap() - 1.0).abs() < 1e-12);

        // d/dx of ln at 2 is 0.5.
        let (mut g, x) = scalar_graph(2.0);
        let y = g.ln(x).unwrap();
        g.backward(y).unwrap();
        assert!((g.grad(x).unwrap().scalar_value().unwrap() - 0.5).abs() < 1e-12);

        // d/dx of x² at 3 is 6.
        let (mut g, x) = scalar_graph(3.0);
        let y = g.sqr(x).unwrap();
        g.backward(y).unwrap();
        assert!((g.grad(x).unwrap().scalar_value().unwrap() - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_div_quotient_rule() {
        // y = a/b at a=6, b=3: dy/da = 1/3, dy/db = -6/9.
        let mut g = Graph::new();
        let a = g.var(NArray::scalar(DType::F64, 6.0));
        let b = g.var(NArray::scalar(DType::F64, 3.0));
        let y = g.div(a, b).unwrap();
        g.backward(y).unwrap();
        assert!((g.grad(a).unwrap().scalar_value().unwrap() - 1.0 / 3.0).abs() < 1e-12);
        assert!((g.grad(b).unwrap().scalar_value().unwrap() + 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_fanout_accumulates() {
        // y = x*x via two separate uses: grad is 2x regardless of order.
        let (mut g, x) = scalar_graph(5.0);
        let y = g.mul(x, x).unwrap();
        g.backward(y).unwrap();
        assert_eq!(g.grad(x).unwrap().scalar_value().unwrap(), 10.0);
    }

    #[test]
    fn test_sum1d_gradient_spreads() {
        let mut g = Graph::new();
        let x = g.var(NArray::seq((2, 3), DType::F64));
        let s = g.sum1d(x, 1).unwrap();
        let total = g.sum_all(s).unwrap();
        g.backward(total).unwrap();
        assert_eq!(g.grad(x).unwrap().to_f64_vec().unwrap(), vec![1.0; 6]);
    }

    #[test]
    fn test_mean1d_gradient_scales() {
        let mut g = Graph::new();
        let x = g.var(NArray::seq((2, 4), DType::F64));
        let m = g.mean1d(x, 1).unwrap();
        let total = g.sum_all(m).unwrap();
        g.backward(total).unwrap();
        assert_eq!(g.grad(x).unwrap().to_f64_vec().unwrap(), vec![0.25; 8]);
    }

    #[test]
    fn test_invalid_broadcast_rejected_at_record_time() {
        let mut g = Graph::new();
        let a = g.var(NArray::zeros((2, 3), DType::F64));
        let b = g.var(NArray::zeros((3, 2), DType::F64));
        assert!(g.add(a, b).is_err());
        // Nothing was recorded for the failed op.
        assert_eq!(g.len(), 2);
    }
}
