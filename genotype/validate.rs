// ========================================================================================
//
//                  Validation: deciding what a caller's array is, and owning it
//
// ========================================================================================
//
// An input is either a contiguous in-memory array, an already-chunked array, or an
// external source that can describe its own chunking. Anything else is rejected with a
// type error. There is no speculative "convert to an array" fallback.
//
// Once the backend is known, the array must be rank 3 with `i8` elements. The single
// exception is in-memory integral data of another width, which is narrowed to `i8`
// when (and only when) every value survives the conversion unchanged.

use crate::storage::{ChunkSource, ChunkedArray};
use crate::types::{ArrayData, DType, GenotypeData, GenotypeError};
use log::{debug, info};
use ndarray::{Array, Array1, Array2, Array3, Array4, ArrayD, Ix3};
use std::any::{Any, type_name};
use std::sync::Arc;

/// The categories of input the validation layer understands.
#[derive(Debug, Clone)]
pub enum ArrayInput {
    /// A contiguous in-memory array of any rank and element type.
    Dense(ArrayData),
    /// An array that is already split into chunks.
    Chunked(ChunkedArray),
    /// A foreign array that exposes its shape, element type, and chunk boundaries.
    ChunkAware(Arc<dyn ChunkSource>),
}

impl<T, D> From<Array<T, D>> for ArrayInput
where
    D: ndarray::Dimension,
    ArrayData: From<Array<T, D>>,
{
    fn from(array: Array<T, D>) -> Self {
        ArrayInput::Dense(ArrayData::from(array))
    }
}

impl From<ArrayData> for ArrayInput {
    fn from(data: ArrayData) -> Self {
        ArrayInput::Dense(data)
    }
}

impl From<ChunkedArray> for ArrayInput {
    fn from(array: ChunkedArray) -> Self {
        ArrayInput::Chunked(array)
    }
}

impl From<Arc<dyn ChunkSource>> for ArrayInput {
    fn from(source: Arc<dyn ChunkSource>) -> Self {
        ArrayInput::ChunkAware(source)
    }
}

impl From<GenotypeData> for ArrayInput {
    fn from(data: GenotypeData) -> Self {
        match data {
            GenotypeData::Contiguous(array) => ArrayInput::Dense(ArrayData::from(array)),
            GenotypeData::Chunked(array) => ArrayInput::Chunked(array),
        }
    }
}

fn take<U>(value: Box<dyn Any>) -> Result<ArrayInput, Box<dyn Any>>
where
    U: Into<ArrayInput> + 'static,
{
    value.downcast::<U>().map(|typed| (*typed).into())
}

macro_rules! or_take_arrays {
    ($chain:expr; $($elem:ty),* $(,)?) => {
        $chain
            $(
                .or_else(take::<ArrayD<$elem>>)
                .or_else(take::<Array1<$elem>>)
                .or_else(take::<Array2<$elem>>)
                .or_else(take::<Array3<$elem>>)
                .or_else(take::<Array4<$elem>>)
            )*
    };
}

impl ArrayInput {
    /// Classifies an arbitrary value.
    ///
    /// Accepts `ArrayInput`, `ArrayData`, `GenotypeData`, `ChunkedArray`,
    /// `Arc<dyn ChunkSource>`, and owned ndarray arrays (dynamic rank or rank 1 to 4) of
    /// every supported element type. Anything else is a `TypeMismatch` naming the
    /// concrete type that was passed.
    pub fn from_any<T: Any>(value: T) -> Result<Self, GenotypeError> {
        let boxed: Box<dyn Any> = Box::new(value);
        let classified = or_take_arrays!(
            take::<ArrayInput>(boxed)
                .or_else(take::<ArrayData>)
                .or_else(take::<GenotypeData>)
                .or_else(take::<ChunkedArray>)
                .or_else(take::<Arc<dyn ChunkSource>>);
            i8, i16, i32, i64, u8, u16, u32, u64, f32, f64,
        );
        classified.map_err(|_| GenotypeError::TypeMismatch {
            found: type_name::<T>().to_string(),
        })
    }
}

/// Checks that an in-memory array is a genotype array, narrowing integral data of
/// another width to `i8` when that is lossless.
pub fn require_genotype_ndarray(data: ArrayData) -> Result<Array3<i8>, GenotypeError> {
    let ndim = data.ndim();
    if ndim != 3 {
        return Err(GenotypeError::ShapeMismatch {
            expected: 3,
            actual: ndim,
        });
    }
    let dtype = data.dtype();
    let values = match data {
        ArrayData::Int8(values) => values,
        other if dtype.is_integral() => {
            let narrowed = other
                .to_int8_lossless()
                .ok_or(GenotypeError::ElementTypeMismatch {
                    expected: DType::Int8,
                    actual: dtype,
                })?;
            info!("Converted a {dtype} genotype array of shape {:?} to int8", other.shape());
            narrowed
        }
        _ => {
            return Err(GenotypeError::ElementTypeMismatch {
                expected: DType::Int8,
                actual: dtype,
            });
        }
    };
    values
        .into_dimensionality::<Ix3>()
        .map_err(|_| GenotypeError::ShapeMismatch {
            expected: 3,
            actual: ndim,
        })
}

/// Checks that a chunked array is a genotype array whose chunks never split a call.
pub fn require_genotype_chunked(array: &ChunkedArray) -> Result<(), GenotypeError> {
    if array.ndim() != 3 {
        return Err(GenotypeError::ShapeMismatch {
            expected: 3,
            actual: array.ndim(),
        });
    }
    if array.dtype() != DType::Int8 {
        return Err(GenotypeError::ElementTypeMismatch {
            expected: DType::Int8,
            actual: array.dtype(),
        });
    }
    let chunks = array.chunks();
    let ploidy = array.shape()[2];
    if chunks[2].len() != 1 {
        return Err(GenotypeError::ChunkShapeMismatch {
            index: vec![0, 0, 0],
            expected: vec![chunks[0][0], chunks[1][0], ploidy],
            actual: vec![chunks[0][0], chunks[1][0], chunks[2][0]],
        });
    }
    Ok(())
}

/// A source is chunk-aware when it describes one list of chunk lengths per dimension.
pub fn is_chunk_aware(source: &dyn ChunkSource) -> bool {
    source.chunks().len() == source.shape().len()
}

/// Resolves the backend for `input` and checks it is a genotype array.
pub fn normalize_genotype_data(input: impl Into<ArrayInput>) -> Result<GenotypeData, GenotypeError> {
    match input.into() {
        ArrayInput::Dense(data) => {
            let array = require_genotype_ndarray(data)?;
            debug!("Validated contiguous genotype array of shape {:?}", array.dim());
            Ok(GenotypeData::Contiguous(array))
        }
        ArrayInput::Chunked(array) => {
            require_genotype_chunked(&array)?;
            debug!(
                "Validated chunked genotype array of shape {:?} in {} chunks",
                array.shape(),
                array.n_blocks()
            );
            Ok(GenotypeData::Chunked(array))
        }
        ArrayInput::ChunkAware(source) => {
            if !is_chunk_aware(source.as_ref()) {
                return Err(GenotypeError::TypeMismatch {
                    found: format!(
                        "an array source with {} chunk axes for {} dimensions",
                        source.chunks().len(),
                        source.shape().len()
                    ),
                });
            }
            let array = ChunkedArray::new(source)?;
            require_genotype_chunked(&array)?;
            debug!(
                "Wrapped chunk-aware source of shape {:?} using its own {} chunks",
                array.shape(),
                array.n_blocks()
            );
            Ok(GenotypeData::Chunked(array))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemorySource;
    use ndarray::{Array2, array};
    use std::ops::Range;

    #[derive(Debug)]
    struct UnchunkedSource {
        shape: Vec<usize>,
        chunks: Vec<Vec<usize>>,
    }

    impl ChunkSource for UnchunkedSource {
        fn shape(&self) -> &[usize] {
            &self.shape
        }

        fn dtype(&self) -> DType {
            DType::Int8
        }

        fn chunks(&self) -> &[Vec<usize>] {
            &self.chunks
        }

        fn read_chunk(&self, region: &[Range<usize>]) -> Result<ArrayData, GenotypeError> {
            Err(GenotypeError::RegionOutOfBounds {
                region: region.to_vec(),
                shape: self.shape.clone(),
            })
        }
    }

    #[test]
    fn dense_int8_input_is_kept_as_is() {
        let g = array![[[0_i8, 1], [-1, 1]]];
        match normalize_genotype_data(g.clone()).unwrap() {
            GenotypeData::Contiguous(array) => assert_eq!(array, g),
            other => panic!("expected a contiguous array, got {other:?}"),
        }
    }

    #[test]
    fn dense_integral_input_is_narrowed_when_lossless() {
        let g = array![[[0_i64, 1], [-1, 3]]];
        match normalize_genotype_data(g).unwrap() {
            GenotypeData::Contiguous(array) => assert_eq!(array, array![[[0_i8, 1], [-1, 3]]]),
            other => panic!("expected a contiguous array, got {other:?}"),
        }

        let err = normalize_genotype_data(array![[[0_i32, 300]]]).unwrap_err();
        assert!(matches!(
            err,
            GenotypeError::ElementTypeMismatch {
                expected: DType::Int8,
                actual: DType::Int32
            }
        ));
    }

    #[test]
    fn floating_point_input_is_rejected() {
        let err = normalize_genotype_data(array![[[0.0_f32, 1.0]]]).unwrap_err();
        assert!(matches!(
            err,
            GenotypeError::ElementTypeMismatch {
                actual: DType::Float32,
                ..
            }
        ));
    }

    #[test]
    fn rank_is_checked_before_element_type() {
        let err = normalize_genotype_data(Array2::<f64>::zeros((2, 2))).unwrap_err();
        assert!(matches!(
            err,
            GenotypeError::ShapeMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn chunked_input_must_keep_the_ploidy_axis_whole() {
        let g = Array3::<i8>::zeros((4, 4, 2));
        let whole = ChunkedArray::from_array(g.clone(), &[2, 2, 0]).unwrap();
        assert!(normalize_genotype_data(whole).unwrap().is_chunked());

        let split = ChunkedArray::from_array(g, &[2, 2, 1]).unwrap();
        let err = normalize_genotype_data(split).unwrap_err();
        assert!(matches!(err, GenotypeError::ChunkShapeMismatch { .. }));
    }

    #[test]
    fn chunked_input_is_never_narrowed() {
        let wide = ChunkedArray::from_array(Array3::<i16>::zeros((2, 2, 2)), &[1, 1, 0]).unwrap();
        let err = normalize_genotype_data(wide).unwrap_err();
        assert!(matches!(
            err,
            GenotypeError::ElementTypeMismatch {
                actual: DType::Int16,
                ..
            }
        ));
    }

    #[test]
    fn chunk_aware_sources_keep_their_own_chunking() {
        let source: Arc<dyn ChunkSource> = Arc::new(
            InMemorySource::new(Array3::<i8>::zeros((5, 3, 2)), vec![vec![3, 2], vec![1, 2], vec![2]]).unwrap(),
        );
        match normalize_genotype_data(source).unwrap() {
            GenotypeData::Chunked(array) => {
                assert_eq!(array.chunks(), &[vec![3, 2], vec![1, 2], vec![2]]);
            }
            other => panic!("expected a chunked array, got {other:?}"),
        }
    }

    #[test]
    fn sources_without_per_axis_chunks_are_not_chunk_aware() {
        let source: Arc<dyn ChunkSource> = Arc::new(UnchunkedSource {
            shape: vec![2, 2, 2],
            chunks: Vec::new(),
        });
        assert!(!is_chunk_aware(source.as_ref()));
        let err = normalize_genotype_data(source).unwrap_err();
        assert!(matches!(err, GenotypeError::TypeMismatch { .. }));
    }

    #[test]
    fn from_any_classifies_known_containers_and_rejects_the_rest() {
        assert!(matches!(
            ArrayInput::from_any(array![[[0_i8]]]).unwrap(),
            ArrayInput::Dense(ArrayData::Int8(_))
        ));
        assert!(matches!(
            ArrayInput::from_any(Array3::<u16>::zeros((1, 1, 1)).into_dyn()).unwrap(),
            ArrayInput::Dense(ArrayData::UInt16(_))
        ));
        let chunked = ChunkedArray::from_array(Array3::<i8>::zeros((2, 2, 2)), &[1, 0, 0]).unwrap();
        assert!(matches!(
            ArrayInput::from_any(chunked).unwrap(),
            ArrayInput::Chunked(_)
        ));

        let err = ArrayInput::from_any(vec![vec![0_i8; 2]; 2]).unwrap_err();
        match err {
            GenotypeError::TypeMismatch { found } => assert!(found.contains("Vec")),
            other => panic!("expected a type mismatch, got {other:?}"),
        }
        assert!(ArrayInput::from_any("genotypes").is_err());
    }
}
