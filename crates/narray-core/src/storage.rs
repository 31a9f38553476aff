use crate::dtype::{DType, WithDType};
use crate::error::{Error, Result};
use crate::shape::Shape;

// Storage is a flat typed buffer with no shape knowledge. One closed
// variant per element kind, selected at construction; values cross the
// boundary through the f64 lens of WithDType.
//
// Addresses handed to get/set/inc come from the Layout/iterator contract,
// which guarantees they are in bounds; this layer does not re-validate them
// beyond the container's own indexing (performance-critical path).

/// Owned flat buffer of one element kind.
#[derive(Debug, Clone)]
pub enum Storage {
    U8(Vec<u8>),
    I32(Vec<i32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl Storage {
    /// Zero-filled buffer of `len` elements.
    pub fn zeros(dtype: DType, len: usize) -> Storage {
        match dtype {
            DType::U8 => Storage::U8(vec![0; len]),
            DType::I32 => Storage::I32(vec![0; len]),
            DType::F32 => Storage::F32(vec![0.0; len]),
            DType::F64 => Storage::F64(vec![0.0; len]),
        }
    }

    /// Buffer converted element-by-element from an f64 slice.
    pub fn from_f64(dtype: DType, data: &[f64]) -> Storage {
        match dtype {
            DType::U8 => Storage::U8(data.iter().map(|&v| u8::from_f64(v)).collect()),
            DType::I32 => Storage::I32(data.iter().map(|&v| i32::from_f64(v)).collect()),
            DType::F32 => Storage::F32(data.iter().map(|&v| f32::from_f64(v)).collect()),
            DType::F64 => Storage::F64(data.to_vec()),
        }
    }

    /// Checked construction against a shape's element count.
    pub fn from_f64_checked(dtype: DType, data: &[f64], shape: &Shape) -> Result<Storage> {
        if data.len() != shape.size() {
            return Err(Error::ElementCountMismatch {
                shape: shape.clone(),
                expected: shape.size(),
                got: data.len(),
            });
        }
        Ok(Self::from_f64(dtype, data))
    }

    pub fn dtype(&self) -> DType {
        match self {
            Storage::U8(_) => DType::U8,
            Storage::I32(_) => DType::I32,
            Storage::F32(_) => DType::F32,
            Storage::F64(_) => DType::F64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Storage::U8(v) => v.len(),
            Storage::I32(v) => v.len(),
            Storage::F32(v) => v.len(),
            Storage::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn get(&self, ptr: usize) -> f64 {
        match self {
            Storage::U8(v) => v[ptr].to_f64(),
            Storage::I32(v) => v[ptr].to_f64(),
            Storage::F32(v) => v[ptr].to_f64(),
            Storage::F64(v) => v[ptr],
        }
    }

    #[inline]
    pub fn set(&mut self, ptr: usize, value: f64) {
        match self {
            Storage::U8(v) => v[ptr] = u8::from_f64(value),
            Storage::I32(v) => v[ptr] = i32::from_f64(value),
            Storage::F32(v) => v[ptr] = f32::from_f64(value),
            Storage::F64(v) => v[ptr] = value,
        }
    }

    /// Read-modify-write accumulation, used by reductions.
    #[inline]
    pub fn inc(&mut self, ptr: usize, value: f64) {
        match self {
            Storage::U8(v) => v[ptr] = u8::from_f64(v[ptr].to_f64() + value),
            Storage::I32(v) => v[ptr] = i32::from_f64(v[ptr].to_f64() + value),
            Storage::F32(v) => v[ptr] = f32::from_f64(v[ptr].to_f64() + value),
            Storage::F64(v) => v[ptr] += value,
        }
    }

    /// Fill `len` elements starting at `start`.
    pub fn fill(&mut self, value: f64, start: usize, len: usize) {
        match self {
            Storage::U8(v) => v[start..start + len].fill(u8::from_f64(value)),
            Storage::I32(v) => v[start..start + len].fill(i32::from_f64(value)),
            Storage::F32(v) => v[start..start + len].fill(f32::from_f64(value)),
            Storage::F64(v) => v[start..start + len].fill(value),
        }
    }

    /// Direct view of an f64 buffer, for the dense kernel fast path.
    pub fn as_f64(&self) -> Option<&[f64]> {
        match self {
            Storage::F64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64_mut(&mut self) -> Option<&mut [f64]> {
        match self {
            Storage::F64(v) => Some(v),
            _ => None,
        }
    }
}
