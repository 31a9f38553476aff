//! # narray-core
//!
//! Dense n-dimensional array engine with strided views and broadcasting.
//!
//! This crate provides:
//! - [`NArray`] — n-dimensional array over shared storage
//! - [`Shape`] / [`Layout`] — shape, strides, and memory layout
//! - [`DType`] — data types (U8, I32, F32, F64)
//! - [`ElementWise`] — n-ary broadcast resolution
//! - [`PointerIter`] — linear-address iteration in row- or column-major order

pub mod broadcast;
pub mod dtype;
pub mod error;
pub mod iter;
pub mod layout;
pub mod narray;
pub mod shape;
pub mod storage;

pub use broadcast::{BroadcastOperand, ElementWise};
pub use dtype::{DType, WithDType};
pub use error::{Error, Result};
pub use iter::PointerIter;
pub use layout::{Layout, Order};
pub use narray::NArray;
pub use shape::Shape;
pub use storage::Storage;
