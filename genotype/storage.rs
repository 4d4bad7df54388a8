// ========================================================================================
//
//                     Chunked storage: sources, arrays, and block grids
//
// ========================================================================================
//
// A chunked array is a logical n-dimensional array whose data is only ever touched one
// rectangular chunk at a time. Chunk boundaries are described the same way on every
// axis: a list of chunk lengths that must sum to the axis extent. The data itself lives
// behind a `ChunkSource`, which can be anything able to materialize a region on demand
// (an in-memory array, a memory map, a remote store).
//
// Outputs of chunked computations are `BlockGrid`s: one owned array per block, laid out
// on a grid with its own chunk boundaries. A block grid can be assembled into a single
// contiguous array when the caller wants one.

use crate::types::{ArrayData, DType, GenotypeError};
use ndarray::{Array, Array3, Dimension, IntoDimension, Ix3, Slice};
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

/// An external array that can hand out any of its chunks as a contiguous buffer.
///
/// `chunks()` must return one list of chunk lengths per dimension. Sources that cannot
/// describe their chunking that way are not chunk-aware and are rejected by validation.
pub trait ChunkSource: Send + Sync + fmt::Debug {
    fn shape(&self) -> &[usize];
    fn dtype(&self) -> DType;
    fn chunks(&self) -> &[Vec<usize>];

    /// Materializes the region described by one half-open range per axis.
    fn read_chunk(&self, region: &[Range<usize>]) -> Result<ArrayData, GenotypeError>;
}

/// Splits an axis of length `extent` into chunks of at most `size` elements.
///
/// A `size` of zero means one chunk spanning the whole axis. An empty axis still gets a
/// single zero-length chunk, so every axis has at least one block.
pub fn chunk_sizes(extent: usize, size: usize) -> Vec<usize> {
    if extent == 0 || size == 0 || size >= extent {
        return vec![extent];
    }
    let mut sizes = vec![size; extent / size];
    if extent % size != 0 {
        sizes.push(extent % size);
    }
    sizes
}

fn validate_chunks(shape: &[usize], chunks: &[Vec<usize>]) -> Result<(), GenotypeError> {
    if chunks.len() != shape.len() {
        return Err(GenotypeError::ShapeMismatch {
            expected: shape.len(),
            actual: chunks.len(),
        });
    }
    for (axis, (&extent, lengths)) in shape.iter().zip(chunks).enumerate() {
        let total: usize = lengths.iter().sum();
        if lengths.is_empty() || total != extent {
            return Err(GenotypeError::InvalidChunks {
                axis,
                extent,
                total,
            });
        }
    }
    Ok(())
}

fn chunk_offsets(lengths: &[usize]) -> Vec<usize> {
    lengths
        .iter()
        .scan(0, |start, &len| {
            let offset = *start;
            *start += len;
            Some(offset)
        })
        .collect()
}

fn dimension_from<D: Dimension>(lengths: &[usize]) -> D {
    let mut dim = D::zeros(lengths.len());
    dim.slice_mut().copy_from_slice(lengths);
    dim
}

/// A chunk source over an array that is already in memory.
#[derive(Debug, Clone)]
pub struct InMemorySource {
    data: ArrayData,
    chunks: Vec<Vec<usize>>,
}

impl InMemorySource {
    pub fn new(data: impl Into<ArrayData>, chunks: Vec<Vec<usize>>) -> Result<Self, GenotypeError> {
        let data = data.into();
        validate_chunks(data.shape(), &chunks)?;
        Ok(Self { data, chunks })
    }

    /// Chunks every axis regularly; `chunk_shape[axis] == 0` keeps that axis whole.
    pub fn regular(data: impl Into<ArrayData>, chunk_shape: &[usize]) -> Result<Self, GenotypeError> {
        let data = data.into();
        if chunk_shape.len() != data.ndim() {
            return Err(GenotypeError::ShapeMismatch {
                expected: data.ndim(),
                actual: chunk_shape.len(),
            });
        }
        let chunks = data
            .shape()
            .iter()
            .zip(chunk_shape)
            .map(|(&extent, &size)| chunk_sizes(extent, size))
            .collect();
        Ok(Self { data, chunks })
    }
}

impl ChunkSource for InMemorySource {
    fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    fn dtype(&self) -> DType {
        self.data.dtype()
    }

    fn chunks(&self) -> &[Vec<usize>] {
        &self.chunks
    }

    fn read_chunk(&self, region: &[Range<usize>]) -> Result<ArrayData, GenotypeError> {
        let shape = self.data.shape();
        let inside = region.len() == shape.len()
            && region
                .iter()
                .zip(shape)
                .all(|(range, &extent)| range.start <= range.end && range.end <= extent);
        if !inside {
            return Err(GenotypeError::RegionOutOfBounds {
                region: region.to_vec(),
                shape: shape.to_vec(),
            });
        }
        Ok(self.data.slice_region(region))
    }
}

/// A logical array split into rectangular chunks, backed by a `ChunkSource`.
///
/// The chunk boundaries are taken from the source unaltered and checked once here, so
/// every block coordinate in `0..block_shape()[axis]` addresses a valid region.
#[derive(Debug, Clone)]
pub struct ChunkedArray {
    source: Arc<dyn ChunkSource>,
    shape: Vec<usize>,
    dtype: DType,
    chunks: Vec<Vec<usize>>,
    offsets: Vec<Vec<usize>>,
}

impl ChunkedArray {
    pub fn new(source: Arc<dyn ChunkSource>) -> Result<Self, GenotypeError> {
        let shape = source.shape().to_vec();
        let chunks = source.chunks().to_vec();
        validate_chunks(&shape, &chunks)?;
        let offsets = chunks.iter().map(|lengths| chunk_offsets(lengths)).collect();
        Ok(Self {
            dtype: source.dtype(),
            source,
            shape,
            chunks,
            offsets,
        })
    }

    /// Wraps an in-memory array, chunking it regularly by `chunk_shape`.
    pub fn from_array(data: impl Into<ArrayData>, chunk_shape: &[usize]) -> Result<Self, GenotypeError> {
        Self::new(Arc::new(InMemorySource::regular(data, chunk_shape)?))
    }

    /// Wraps an in-memory array with explicit per-axis chunk lengths.
    pub fn from_array_with_chunks(
        data: impl Into<ArrayData>,
        chunks: Vec<Vec<usize>>,
    ) -> Result<Self, GenotypeError> {
        Self::new(Arc::new(InMemorySource::new(data, chunks)?))
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn chunks(&self) -> &[Vec<usize>] {
        &self.chunks
    }

    /// Number of chunks along each axis.
    pub fn block_shape(&self) -> Vec<usize> {
        self.chunks.iter().map(Vec::len).collect()
    }

    pub fn n_blocks(&self) -> usize {
        self.chunks.iter().map(Vec::len).product()
    }

    /// The region covered by the block at `coord`.
    pub fn block_region(&self, coord: &[usize]) -> Vec<Range<usize>> {
        coord
            .iter()
            .enumerate()
            .map(|(axis, &block)| {
                let start = self.offsets[axis][block];
                start..start + self.chunks[axis][block]
            })
            .collect()
    }

    /// Materializes one chunk of a rank-3 `i8` array and checks it against the
    /// declared boundaries. A chunk that comes back with a different rank, element
    /// type, or shape (for instance a short ploidy axis) is an error, never padded.
    pub fn read_genotype_block(&self, coord: [usize; 3]) -> Result<Array3<i8>, GenotypeError> {
        let region = self.block_region(&coord);
        let expected: Vec<usize> = region.iter().map(|range| range.end - range.start).collect();
        let chunk = self.source.read_chunk(&region)?;
        let actual_dtype = chunk.dtype();
        if chunk.shape() != expected.as_slice() {
            return Err(GenotypeError::ChunkShapeMismatch {
                index: coord.to_vec(),
                expected,
                actual: chunk.shape().to_vec(),
            });
        }
        let values = chunk
            .into_int8()
            .ok_or(GenotypeError::ElementTypeMismatch {
                expected: DType::Int8,
                actual: actual_dtype,
            })?;
        let ndim = values.ndim();
        values
            .into_dimensionality::<Ix3>()
            .map_err(|_| GenotypeError::ShapeMismatch {
                expected: 3,
                actual: ndim,
            })
    }
}

/// A grid of owned output blocks with per-axis chunk boundaries.
///
/// The grid of blocks has the same dimensionality as the blocks themselves, so block
/// `(i, j)` of a two-dimensional grid covers rows `offsets[0][i]..` and columns
/// `offsets[1][j]..` of the assembled array.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockGrid<A, D: Dimension> {
    blocks: Array<Array<A, D>, D>,
    chunks: Vec<Vec<usize>>,
}

impl<A, D: Dimension> BlockGrid<A, D> {
    /// Assembles a grid from blocks laid out in row-major block order.
    ///
    /// Every block must have exactly the shape its coordinate implies under `chunks`.
    pub fn from_blocks(chunks: Vec<Vec<usize>>, blocks: Vec<Array<A, D>>) -> Result<Self, GenotypeError> {
        if let Some(ndim) = D::NDIM {
            if ndim != chunks.len() {
                return Err(GenotypeError::ShapeMismatch {
                    expected: ndim,
                    actual: chunks.len(),
                });
            }
        }
        let block_shape: Vec<usize> = chunks.iter().map(Vec::len).collect();
        let n_blocks = blocks.len();
        let blocks = Array::from_shape_vec(dimension_from::<D>(&block_shape), blocks).map_err(|_| {
            GenotypeError::BlockGridMismatch {
                expected: block_shape.clone(),
                actual: vec![n_blocks],
            }
        })?;
        for (index, block) in blocks.indexed_iter() {
            let index = index.into_dimension();
            let expected: Vec<usize> = index
                .slice()
                .iter()
                .zip(&chunks)
                .map(|(&position, lengths)| lengths[position])
                .collect();
            if block.shape() != expected.as_slice() {
                return Err(GenotypeError::ChunkShapeMismatch {
                    index: index.slice().to_vec(),
                    expected,
                    actual: block.shape().to_vec(),
                });
            }
        }
        Ok(Self { blocks, chunks })
    }

    pub(crate) fn from_parts(blocks: Array<Array<A, D>, D>, chunks: Vec<Vec<usize>>) -> Self {
        Self { blocks, chunks }
    }

    pub fn blocks(&self) -> &Array<Array<A, D>, D> {
        &self.blocks
    }

    pub fn chunks(&self) -> &[Vec<usize>] {
        &self.chunks
    }

    pub fn n_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// The logical shape of the assembled array.
    pub fn shape(&self) -> Vec<usize> {
        self.chunks.iter().map(|lengths| lengths.iter().sum()).collect()
    }
}

impl<A: Clone + Default, D: Dimension> BlockGrid<A, D> {
    /// Copies every block into one contiguous array.
    pub fn assemble(&self) -> Array<A, D> {
        let offsets: Vec<Vec<usize>> = self.chunks.iter().map(|lengths| chunk_offsets(lengths)).collect();
        let mut out = Array::<A, D>::default(dimension_from::<D>(&self.shape()));
        for (index, block) in self.blocks.indexed_iter() {
            let index = index.into_dimension();
            let coord = index.slice();
            out.slice_each_axis_mut(|axis| {
                let position = axis.axis.index();
                let start = offsets[position][coord[position]];
                Slice::from(start..start + block.len_of(axis.axis))
            })
            .assign(block);
        }
        out
    }
}
