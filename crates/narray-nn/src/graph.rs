// Reverse-mode automatic differentiation over an arena of nodes.
//
// HOW IT WORKS:
//
//   1. Forward pass: every operation appends a node to the arena. A node
//      holds its forward value, a zero-initialized gradient of the same
//      shape, and one back edge per parent. Parents always carry smaller
//      ids than their children, so the arena order IS a topological order.
//
//   2. backward(root) seeds grad(root) = 1 (unless the node seeded itself
//      at construction, as losses do) and walks ids from the root down.
//      When a node is visited, every consumer with a larger id has already
//      run, so its gradient is complete before its own edges fire.
//
//   3. Each back edge maps the node's gradient to one parent's gradient
//      contribution; contributions ACCUMULATE with +=, never overwrite,
//      which is the multivariate chain rule for fan-out.
//
// Back edges are closures capturing only the arrays their law needs (shared
// storage, so captures are cheap). Shape and broadcast validation happens
// when the operation is recorded; closures never re-validate.

use narray_core::{Error, NArray, Result};

/// Handle to a node in a [`Graph`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

type BackFn = Box<dyn Fn(&NArray) -> Result<NArray>>;

/// One gradient-flow edge from a node to one of its parents.
pub(crate) struct BackEdge {
    pub(crate) parent: NodeId,
    pub(crate) back_fn: BackFn,
}

struct Node {
    value: NArray,
    grad: NArray,
    /// Gradient pre-seeded at construction (loss nodes); backward leaves it.
    seeded: bool,
    edges: Vec<BackEdge>,
    op: &'static str,
}

/// Append-only computation DAG.
///
/// Operations are methods on the graph; each validates its inputs, computes
/// the forward value eagerly and records the backward law. Dropping the
/// graph releases every value and gradient.
#[derive(Default)]
pub struct Graph {
    nodes: Vec<Node>,
}

impl Graph {
    pub fn new() -> Self {
        Graph { nodes: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Record a leaf node (input or parameter). Leaves have no back edges;
    /// their gradients are what training reads after backward.
    pub fn var(&mut self, value: NArray) -> NodeId {
        self.push(value, Vec::new(), "var")
    }

    pub(crate) fn push(&mut self, value: NArray, edges: Vec<BackEdge>, op: &'static str) -> NodeId {
        let grad = NArray::zeros_like(&value);
        self.nodes.push(Node {
            value,
            grad,
            seeded: false,
            edges,
            op,
        });
        NodeId(self.nodes.len() - 1)
    }

    /// Push a node whose gradient starts at 1, so backward needs no
    /// explicit seeding step for it.
    pub(crate) fn push_seeded(
        &mut self,
        value: NArray,
        edges: Vec<BackEdge>,
        op: &'static str,
    ) -> NodeId {
        let id = self.push(value, edges, op);
        self.nodes[id.0].seeded = true;
        // fill_ cannot fail on a freshly allocated dense gradient.
        let _ = self.nodes[id.0].grad.fill_(1.0);
        id
    }

    fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes
            .get(id.0)
            .ok_or_else(|| Error::msg(format!("unknown node id {}", id)))
    }

    /// Forward value of a node.
    pub fn value(&self, id: NodeId) -> Result<&NArray> {
        Ok(&self.node(id)?.value)
    }

    /// Accumulated gradient of a node (zeros before backward has run).
    pub fn grad(&self, id: NodeId) -> Result<&NArray> {
        Ok(&self.node(id)?.grad)
    }

    /// Reset every gradient to zero. Required between backward passes;
    /// without it contributions from the previous pass keep accumulating.
    pub fn zero_grads(&self) -> Result<()> {
        for node in &self.nodes {
            if !node.seeded {
                node.grad.fill_(0.0)?;
            }
        }
        Ok(())
    }

    /// Run the backward pass from `root`.
    ///
    /// Unless the root pre-seeded its own gradient, it must hold a single
    /// element and its gradient is seeded to 1. Ids are walked from the
    /// root downwards; every node's gradient is complete before its back
    /// edges fire, because all its consumers carry larger ids. Only the
    /// root's ancestors participate: an unrelated node (another loss over
    /// the same parents, say) must not push contributions into this pass.
    pub fn backward(&mut self, root: NodeId) -> Result<()> {
        let root_node = self.node(root)?;
        if !root_node.seeded {
            if root_node.value.size() != 1 {
                return Err(Error::NotAScalar {
                    shape: root_node.value.shape().clone(),
                });
            }
            root_node.grad.fill_(1.0)?;
        }
        log::debug!("backward from {} over {} nodes", root, root.0 + 1);

        // Ancestors of the root, discovered as the walk descends: a parent
        // always has a smaller id, so marking it here is always ahead of
        // visiting it.
        let mut live = vec![false; root.0 + 1];
        live[root.0] = true;
        for id in (0..=root.0).rev() {
            if !live[id] || self.nodes[id].edges.is_empty() {
                continue;
            }
            for edge in &self.nodes[id].edges {
                live[edge.parent.0] = true;
            }
            // Clone shares storage: reads see the fully accumulated gradient.
            let grad = self.nodes[id].grad.clone();
            for edge in &self.nodes[id].edges {
                let contribution = (edge.back_fn)(&grad)?;
                log::trace!(
                    "{} ({}) -> {}: contribution shape {}",
                    NodeId(id),
                    self.nodes[id].op,
                    edge.parent,
                    contribution.shape()
                );
                self.nodes[edge.parent.0].grad.add_(&contribution)?;
            }
        }
        Ok(())
    }
}
