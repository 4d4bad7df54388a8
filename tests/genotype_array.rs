use genostats::{
    ArrayData, ArrayInput, ChunkSource, ChunkedArray, ComputeConfig, DType, GenotypeArray,
    GenotypeData, GenotypeError, InMemorySource, ResultGrid,
};
use ndarray::{Array2, Array3, array};
use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn example() -> Array3<i8> {
    array![[[0, 0], [0, 1]], [[-1, 0], [1, 1]]]
}

// Serves chunks from memory and counts how many were read.
#[derive(Debug)]
struct CountingSource {
    inner: InMemorySource,
    reads: AtomicUsize,
}

impl ChunkSource for CountingSource {
    fn shape(&self) -> &[usize] {
        self.inner.shape()
    }

    fn dtype(&self) -> DType {
        self.inner.dtype()
    }

    fn chunks(&self) -> &[Vec<usize>] {
        self.inner.chunks()
    }

    fn read_chunk(&self, region: &[Range<usize>]) -> Result<ArrayData, GenotypeError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read_chunk(region)
    }
}

// Declares a ploidy of two but returns chunks with a single slot per call.
#[derive(Debug)]
struct ShortPloidySource {
    shape: Vec<usize>,
    chunks: Vec<Vec<usize>>,
}

impl ChunkSource for ShortPloidySource {
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
        let rows = region[0].end - region[0].start;
        let cols = region[1].end - region[1].start;
        Ok(ArrayData::from(Array3::<i8>::zeros((rows, cols, 1))))
    }
}

#[test]
fn worked_example_on_a_contiguous_array() {
    init_logging();
    let g = GenotypeArray::new(example()).unwrap();
    assert_eq!(g.is_called().unwrap().into_array(), array![[true, true], [false, true]]);
    assert_eq!(g.is_missing().unwrap().into_array(), array![[false, false], [true, false]]);
    assert_eq!(g.is_hom().unwrap().into_array(), array![[true, false], [false, true]]);
    assert_eq!(g.count_alleles(1).unwrap().into_array(), array![[3, 1], [1, 2]]);
}

#[test]
fn negative_max_allele_is_an_invalid_parameter() {
    let g = GenotypeArray::new(example()).unwrap();
    let err = g.count_alleles(-1).unwrap_err();
    assert!(matches!(
        err,
        GenotypeError::InvalidParameter {
            name: "max_allele",
            value: -1,
            ..
        }
    ));
    assert!(err.to_string().contains("max_allele"));
}

#[test]
fn queries_are_repeatable() {
    let data = Array3::from_shape_fn((6, 5, 2), |(i, j, k)| ((i * 5 + j * 2 + k) % 4) as i8 - 1);
    for g in [
        GenotypeArray::new(data.clone()).unwrap(),
        GenotypeArray::new(ChunkedArray::from_array(data.clone(), &[2, 2, 0]).unwrap()).unwrap(),
    ] {
        let first = g.count_alleles(2).unwrap().into_array();
        let second = g.count_alleles(2).unwrap().into_array();
        assert_eq!(first, second);
        assert_eq!(first.sum(), second.sum());
        assert_eq!(g.is_hom().unwrap().to_array(), g.is_hom().unwrap().to_array());
    }

    let g = GenotypeArray::new(data.clone()).unwrap();
    let checksum = |array: &Array3<i8>| array.iter().map(|&value| i64::from(value)).sum::<i64>();
    let before = checksum(&data);
    g.is_called().unwrap();
    g.count_alleles(3).unwrap();
    match g.data() {
        GenotypeData::Contiguous(array) => {
            assert_eq!(checksum(array), before);
            assert_eq!(array, &data);
        }
        other => panic!("expected a contiguous array, got {other:?}"),
    }
}

#[test]
fn chunked_queries_leave_the_source_untouched() {
    let data = Array3::from_shape_fn((6, 5, 2), |(i, j, k)| ((i * 5 + j * 2 + k) % 4) as i8 - 1);
    let source = Arc::new(InMemorySource::regular(data.clone(), &[2, 2, 0]).unwrap());
    let whole = [0..6, 0..5, 0..2];
    let before = source.read_chunk(&whole).unwrap();

    let shared: Arc<dyn ChunkSource> = source.clone();
    let g = GenotypeArray::new(shared).unwrap();
    g.is_called().unwrap();
    g.is_hom().unwrap();
    g.count_alleles(3).unwrap();

    let after = source.read_chunk(&whole).unwrap();
    assert_eq!(after, before);
    assert_eq!(after, ArrayData::from(data));
}

#[test]
fn max_allele_above_the_int8_range_adds_zero_columns() {
    let chunked = ChunkedArray::from_array(example(), &[1, 1, 0]).unwrap();
    for g in [GenotypeArray::new(example()).unwrap(), GenotypeArray::new(chunked).unwrap()] {
        let counts = g.count_alleles(200).unwrap().into_array();
        assert_eq!(counts.dim(), (2, 201));
        assert_eq!(counts.column(0), array![3, 1]);
        assert_eq!(counts.column(1), array![1, 2]);
        assert_eq!(counts.sum(), 7);
    }
}

#[test]
fn called_and_missing_are_not_simple_complements() {
    let g = GenotypeArray::new(array![[[0_i8, -1], [-1, -1], [2, 2]]]).unwrap();
    let called = g.is_called().unwrap().into_array();
    let missing = g.is_missing().unwrap().into_array();
    assert_eq!(called, array![[false, false, true]]);
    assert_eq!(missing, array![[true, true, false]]);
    assert_eq!(called.mapv(|value| !value), missing);
}

#[test]
fn unsupported_containers_are_type_mismatches() {
    let err = GenotypeArray::from_any(vec![0_i8, 1, -1]).unwrap_err();
    match err {
        GenotypeError::TypeMismatch { found } => assert!(found.contains("Vec<i8>")),
        other => panic!("expected a type mismatch, got {other:?}"),
    }
    assert!(GenotypeArray::from_any(example()).is_ok());
}

#[test]
fn wrong_rank_is_a_shape_mismatch() {
    let err = GenotypeArray::new(Array2::<i8>::zeros((3, 3))).unwrap_err();
    assert!(matches!(
        err,
        GenotypeError::ShapeMismatch {
            expected: 3,
            actual: 2
        }
    ));
    let chunked = ChunkedArray::from_array(Array2::<i8>::zeros((3, 3)), &[1, 1]).unwrap();
    assert!(matches!(
        GenotypeArray::new(chunked).unwrap_err(),
        GenotypeError::ShapeMismatch { .. }
    ));
}

#[test]
fn integral_inputs_are_narrowed_only_when_lossless() {
    let wide = array![[[0_u32, 1], [3, 2]]];
    let g = GenotypeArray::new(wide).unwrap();
    assert_eq!(g.count_alleles(3).unwrap().into_array(), array![[1, 1, 1, 1]]);

    let err = GenotypeArray::new(array![[[0_i16, 200]]]).unwrap_err();
    assert!(matches!(
        err,
        GenotypeError::ElementTypeMismatch {
            expected: DType::Int8,
            actual: DType::Int16
        }
    ));
    assert!(GenotypeArray::new(array![[[0.0_f64, 1.0]]]).is_err());
}

#[test]
fn split_ploidy_is_rejected_at_construction() {
    let chunked = ChunkedArray::from_array(example(), &[1, 1, 1]).unwrap();
    assert!(matches!(
        GenotypeArray::new(chunked).unwrap_err(),
        GenotypeError::ChunkShapeMismatch { .. }
    ));
}

#[test]
fn chunk_aware_sources_are_read_one_chunk_per_task() {
    init_logging();
    let data = Array3::from_shape_fn((5, 4, 2), |(i, j, k)| ((i + j * 3 + k) % 3) as i8);
    let counting = Arc::new(CountingSource {
        inner: InMemorySource::new(data.clone(), vec![vec![2, 3], vec![1, 3], vec![2]]).unwrap(),
        reads: AtomicUsize::new(0),
    });
    let source: Arc<dyn ChunkSource> = counting.clone();
    let g = GenotypeArray::new(ArrayInput::from(source)).unwrap();
    assert!(g.is_chunked());
    assert_eq!(counting.reads.load(Ordering::SeqCst), 0);

    let called = g.is_called().unwrap();
    assert_eq!(counting.reads.load(Ordering::SeqCst), 4);
    match &called {
        ResultGrid::Chunked(grid) => assert_eq!(grid.chunks(), &[vec![2, 3], vec![1, 3]]),
        other => panic!("expected a chunked result, got {other:?}"),
    }
    assert_eq!(called.into_array(), Array2::from_elem((5, 4), true));

    let expected = GenotypeArray::new(data).unwrap();
    assert_eq!(
        g.count_alleles(2).unwrap().into_array(),
        expected.count_alleles(2).unwrap().into_array()
    );
}

#[test]
fn chunks_with_a_short_ploidy_are_errors_not_padding() {
    let source: Arc<dyn ChunkSource> = Arc::new(ShortPloidySource {
        shape: vec![2, 2, 2],
        chunks: vec![vec![1, 1], vec![2], vec![2]],
    });
    let g = GenotypeArray::new(source).unwrap();
    match g.is_hom().unwrap_err() {
        GenotypeError::ChunkShapeMismatch { expected, actual, .. } => {
            assert_eq!(expected, vec![1, 2, 2]);
            assert_eq!(actual, vec![1, 2, 1]);
        }
        other => panic!("expected a chunk shape mismatch, got {other:?}"),
    }
    assert!(g.count_alleles(1).is_err());
}

#[test]
fn configured_engines_drive_chunked_queries() {
    let config = ComputeConfig::from_toml_str("schedule = \"parallel\"\nthreads = 2\n").unwrap();
    let engine = config.build_engine().unwrap();
    assert_eq!(engine.threads(), 2);

    let chunked = ChunkedArray::from_array(example(), &[1, 1, 0]).unwrap();
    let g = GenotypeArray::with_engine(chunked, engine).unwrap();
    assert_eq!(g.count_alleles(1).unwrap().into_array(), array![[3, 1], [1, 2]]);
}

#[test]
fn free_functions_validate_then_query() {
    assert_eq!(
        genostats::is_called(example()).unwrap().into_array(),
        array![[true, true], [false, true]]
    );
    assert_eq!(
        genostats::is_missing(example()).unwrap().into_array(),
        array![[false, false], [true, false]]
    );
    let chunked = ChunkedArray::from_array(example(), &[1, 1, 0]).unwrap();
    assert!(matches!(genostats::is_hom(chunked.clone()).unwrap(), ResultGrid::Chunked(_)));
    assert_eq!(
        genostats::count_alleles(chunked, 1).unwrap().into_array(),
        array![[3, 1], [1, 2]]
    );
    assert!(matches!(
        genostats::count_alleles(Array2::<i8>::zeros((2, 2)), 1).unwrap_err(),
        GenotypeError::ShapeMismatch { .. }
    ));
}
