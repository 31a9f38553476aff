//! # narray-nn
//!
//! Reverse-mode automatic differentiation over [`narray_core`] arrays.
//!
//! This crate provides:
//! - [`Graph`] — append-only arena of computation nodes
//! - [`NodeId`] — handle to a node's value and gradient
//! - differentiable ops (`add`, `sub`, `mul`, `div`, unaries, `cat`,
//!   reductions, `standardize_on`) as graph methods
//! - [`Reduction`] / `mse_loss` — scalar losses that seed their own gradient

pub mod graph;
pub mod loss;
pub mod ops;

pub use graph::{Graph, NodeId};
pub use loss::Reduction;
