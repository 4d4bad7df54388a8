// ========================================================================================
//
//                  The chunked kernel set: the same queries, one chunk at a time
//
// ========================================================================================
//
// Every query here is expressed as a per-chunk application of the contiguous kernels in
// `kernel`. Chunks may split variants and samples freely, but never the ploidy axis, so
// each call is always whole inside exactly one chunk.
//
// The elementwise queries map every chunk to a block of the `(variants, samples)` grid.
// Allele counting sums over samples, which may span several chunks: each chunk yields a
// partial count of shape `(variants_in_chunk, 1, max_allele + 1)`, and those partials are
// then summed along the sample axis of the block grid.

use crate::engine::ChunkEngine;
use crate::kernel::{self, MaxAllele};
use crate::storage::{BlockGrid, ChunkedArray};
use crate::types::GenotypeError;
use crate::validate::require_genotype_chunked;
use log::debug;
use ndarray::{ArrayView3, Axis, Ix2, Ix3};

fn elementwise<E: ChunkEngine>(
    g: &ChunkedArray,
    engine: &E,
    name: &str,
    scan: fn(ArrayView3<'_, i8>) -> ndarray::Array2<bool>,
) -> Result<BlockGrid<bool, Ix2>, GenotypeError> {
    require_genotype_chunked(g)?;
    debug!("{name}: mapping over {} chunks of {:?}", g.n_blocks(), g.shape());
    let chunks = g.chunks();
    engine.map_blocks(g, vec![chunks[0].clone(), chunks[1].clone()], scan)
}

pub fn is_called<E: ChunkEngine>(g: &ChunkedArray, engine: &E) -> Result<BlockGrid<bool, Ix2>, GenotypeError> {
    elementwise(g, engine, "is_called", kernel::is_called::<i8>)
}

pub fn is_missing<E: ChunkEngine>(g: &ChunkedArray, engine: &E) -> Result<BlockGrid<bool, Ix2>, GenotypeError> {
    elementwise(g, engine, "is_missing", kernel::is_missing::<i8>)
}

pub fn is_hom<E: ChunkEngine>(g: &ChunkedArray, engine: &E) -> Result<BlockGrid<bool, Ix2>, GenotypeError> {
    elementwise(g, engine, "is_hom", kernel::is_hom::<i8>)
}

pub fn count_alleles<E: ChunkEngine>(
    g: &ChunkedArray,
    max_allele: i32,
    engine: &E,
) -> Result<BlockGrid<i32, Ix2>, GenotypeError> {
    count_alleles_with(g, MaxAllele::new(max_allele)?, engine)
}

/// Per-chunk partial counts, summed across sample chunks.
///
/// The result has the variant chunking of `g` and a single block spanning all allele
/// columns.
pub fn count_alleles_with<E: ChunkEngine>(
    g: &ChunkedArray,
    max_allele: MaxAllele,
    engine: &E,
) -> Result<BlockGrid<i32, Ix2>, GenotypeError> {
    require_genotype_chunked(g)?;
    let chunks = g.chunks();
    let sample_blocks = chunks[1].len();
    debug!(
        "count_alleles: {} partial counts over {} sample chunks, max allele {}",
        g.n_blocks(),
        sample_blocks,
        max_allele.get()
    );
    let partial_chunks = vec![chunks[0].clone(), vec![1; sample_blocks], vec![max_allele.columns()]];
    let partial: BlockGrid<i32, Ix3> = engine.map_blocks(g, partial_chunks, |chunk| {
        kernel::count_alleles_with(chunk, max_allele).insert_axis(Axis(1))
    })?;
    engine.sum_axis::<i32, i32, Ix3>(&partial, Axis(1))
}
