// ========================================================================================
//                             High-Level Data Contracts
// ========================================================================================

// This file is ONLY for types that are SHARED BETWEEN FILES, not types that only are used in one file.

use crate::storage::{BlockGrid, ChunkedArray};
use ndarray::{Array2, Array3, ArrayD, Ix2, Slice};
use std::error::Error;
use std::fmt;
use std::ops::Range;
use thiserror::Error;

/// The element type of an array as seen by the validation layer.
///
/// Only `Int8` is the canonical genotype element type. The other integral types are
/// accepted from in-memory callers when every value fits into `i8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
}

impl DType {
    pub fn name(self) -> &'static str {
        match self {
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::UInt8 => "uint8",
            Self::UInt16 => "uint16",
            Self::UInt32 => "uint32",
            Self::UInt64 => "uint64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
        }
    }

    #[inline]
    pub fn is_integral(self) -> bool {
        !matches!(self, Self::Float32 | Self::Float64)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A dynamically-ranked, in-memory array tagged with its element type.
///
/// This is how arbitrary caller data reaches the validation layer: it may have any
/// rank and any supported element type, and it is the job of `validate` to decide
/// whether it can become a genotype array.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    Int8(ArrayD<i8>),
    Int16(ArrayD<i16>),
    Int32(ArrayD<i32>),
    Int64(ArrayD<i64>),
    UInt8(ArrayD<u8>),
    UInt16(ArrayD<u16>),
    UInt32(ArrayD<u32>),
    UInt64(ArrayD<u64>),
    Float32(ArrayD<f32>),
    Float64(ArrayD<f64>),
}

macro_rules! with_array {
    ($value:expr, $array:ident => $body:expr) => {
        match $value {
            ArrayData::Int8($array) => $body,
            ArrayData::Int16($array) => $body,
            ArrayData::Int32($array) => $body,
            ArrayData::Int64($array) => $body,
            ArrayData::UInt8($array) => $body,
            ArrayData::UInt16($array) => $body,
            ArrayData::UInt32($array) => $body,
            ArrayData::UInt64($array) => $body,
            ArrayData::Float32($array) => $body,
            ArrayData::Float64($array) => $body,
        }
    };
}

macro_rules! map_array {
    ($value:expr, $array:ident => $body:expr) => {
        match $value {
            ArrayData::Int8($array) => ArrayData::Int8($body),
            ArrayData::Int16($array) => ArrayData::Int16($body),
            ArrayData::Int32($array) => ArrayData::Int32($body),
            ArrayData::Int64($array) => ArrayData::Int64($body),
            ArrayData::UInt8($array) => ArrayData::UInt8($body),
            ArrayData::UInt16($array) => ArrayData::UInt16($body),
            ArrayData::UInt32($array) => ArrayData::UInt32($body),
            ArrayData::UInt64($array) => ArrayData::UInt64($body),
            ArrayData::Float32($array) => ArrayData::Float32($body),
            ArrayData::Float64($array) => ArrayData::Float64($body),
        }
    };
}

macro_rules! array_data_from {
    ($($elem:ty => $variant:ident),* $(,)?) => {
        $(
            impl<D: ndarray::Dimension> From<ndarray::Array<$elem, D>> for ArrayData {
                fn from(array: ndarray::Array<$elem, D>) -> Self {
                    ArrayData::$variant(array.into_dyn())
                }
            }
        )*
    };
}

array_data_from!(
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
);

impl ArrayData {
    pub fn dtype(&self) -> DType {
        match self {
            ArrayData::Int8(_) => DType::Int8,
            ArrayData::Int16(_) => DType::Int16,
            ArrayData::Int32(_) => DType::Int32,
            ArrayData::Int64(_) => DType::Int64,
            ArrayData::UInt8(_) => DType::UInt8,
            ArrayData::UInt16(_) => DType::UInt16,
            ArrayData::UInt32(_) => DType::UInt32,
            ArrayData::UInt64(_) => DType::UInt64,
            ArrayData::Float32(_) => DType::Float32,
            ArrayData::Float64(_) => DType::Float64,
        }
    }

    pub fn shape(&self) -> &[usize] {
        with_array!(self, array => array.shape())
    }

    pub fn ndim(&self) -> usize {
        with_array!(self, array => array.ndim())
    }

    /// Copies out the rectangular region described by one range per axis.
    ///
    /// The caller guarantees `region.len() == self.ndim()` and that every range lies
    /// inside the corresponding axis.
    pub(crate) fn slice_region(&self, region: &[Range<usize>]) -> ArrayData {
        map_array!(self, array => array
            .slice_each_axis(|axis| Slice::from(region[axis.axis.index()].clone()))
            .to_owned())
    }

    /// Returns the canonical `i8` payload, or `None` for any other element type.
    pub fn into_int8(self) -> Option<ArrayD<i8>> {
        match self {
            ArrayData::Int8(array) => Some(array),
            _ => None,
        }
    }

    /// Converts integral data to `i8` when no value can change in the process.
    ///
    /// Returns `None` for floating point data and for integral data holding any value
    /// outside the `i8` range.
    pub fn to_int8_lossless(&self) -> Option<ArrayD<i8>> {
        fn narrow<T: Copy>(array: &ArrayD<T>) -> Option<ArrayD<i8>>
        where
            i8: TryFrom<T>,
        {
            let values = array
                .iter()
                .map(|&value| i8::try_from(value).ok())
                .collect::<Option<Vec<i8>>>()?;
            ArrayD::from_shape_vec(array.raw_dim(), values).ok()
        }

        match self {
            ArrayData::Int8(array) => Some(array.clone()),
            ArrayData::Int16(array) => narrow(array),
            ArrayData::Int32(array) => narrow(array),
            ArrayData::Int64(array) => narrow(array),
            ArrayData::UInt8(array) => narrow(array),
            ArrayData::UInt16(array) => narrow(array),
            ArrayData::UInt32(array) => narrow(array),
            ArrayData::UInt64(array) => narrow(array),
            ArrayData::Float32(_) | ArrayData::Float64(_) => None,
        }
    }
}

/// A validated genotype array. The variant is the backend.
///
/// Values of this type are produced by `validate::normalize_genotype_data`, which
/// guarantees rank 3, element type `i8`, and (for the chunked backend) an unsplit
/// ploidy axis.
#[derive(Debug, Clone)]
pub enum GenotypeData {
    Contiguous(Array3<i8>),
    Chunked(ChunkedArray),
}

impl GenotypeData {
    /// `(variants, samples, ploidy)`.
    pub fn shape(&self) -> [usize; 3] {
        match self {
            GenotypeData::Contiguous(array) => {
                let (n_variants, n_samples, ploidy) = array.dim();
                [n_variants, n_samples, ploidy]
            }
            GenotypeData::Chunked(array) => {
                let shape = array.shape();
                let axis = |index: usize| shape.get(index).copied().unwrap_or(0);
                [axis(0), axis(1), axis(2)]
            }
        }
    }

    pub fn is_chunked(&self) -> bool {
        matches!(self, GenotypeData::Chunked(_))
    }
}

/// The result of a genotype query, in the representation of the backend that produced it.
///
/// Both variants describe the same logical `(variants, columns)` grid; `to_array`
/// materializes either one into a plain `Array2`.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultGrid<A> {
    Contiguous(Array2<A>),
    Chunked(BlockGrid<A, Ix2>),
}

impl<A: Clone + Default> ResultGrid<A> {
    pub fn shape(&self) -> (usize, usize) {
        match self {
            ResultGrid::Contiguous(array) => array.dim(),
            ResultGrid::Chunked(grid) => {
                let shape = grid.shape();
                (shape[0], shape[1])
            }
        }
    }

    pub fn to_array(&self) -> Array2<A> {
        match self {
            ResultGrid::Contiguous(array) => array.clone(),
            ResultGrid::Chunked(grid) => grid.assemble(),
        }
    }

    pub fn into_array(self) -> Array2<A> {
        match self {
            ResultGrid::Contiguous(array) => array,
            ResultGrid::Chunked(grid) => grid.assemble(),
        }
    }
}

/// Every way a genotype query can fail.
///
/// All of these are detected before any kernel runs, except `Source` and the chunk
/// variants, which surface while a chunk is being materialized.
#[derive(Debug, Error)]
pub enum GenotypeError {
    #[error(
        "Expected a contiguous array, a chunked array, or a chunk-aware array source, but found {found}."
    )]
    TypeMismatch { found: String },

    #[error("Expected an array with {expected} dimensions, but found {actual}.")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("Chunk {index:?} has shape {actual:?}, but its declared shape is {expected:?}.")]
    ChunkShapeMismatch {
        index: Vec<usize>,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Chunk lengths along axis {axis} sum to {total}, but the axis has extent {extent}.")]
    InvalidChunks {
        axis: usize,
        extent: usize,
        total: usize,
    },

    #[error("Output block grid {actual:?} does not line up with the input block grid {expected:?}.")]
    BlockGridMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Region {region:?} lies outside an array of shape {shape:?}.")]
    RegionOutOfBounds {
        region: Vec<Range<usize>>,
        shape: Vec<usize>,
    },

    #[error(
        "Expected element type {expected}, but found {actual}, which cannot be converted without loss."
    )]
    ElementTypeMismatch { expected: DType, actual: DType },

    #[error("Invalid value {value} for parameter '{name}': {reason}.")]
    InvalidParameter {
        name: &'static str,
        value: i64,
        reason: &'static str,
    },

    #[error("Chunk source error: {0}")]
    Source(#[from] Box<dyn Error + Send + Sync + 'static>),
}
