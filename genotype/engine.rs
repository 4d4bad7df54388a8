// ========================================================================================
//
//                        Chunk engines: where per-chunk work runs
//
// ========================================================================================
//
// The chunked kernel set never schedules work itself. It describes a computation as
// "map this pure kernel over every chunk" followed, for reductions, by "sum these
// partial blocks along an axis", and hands both steps to a `ChunkEngine`.
//
// An engine only has to decide how a batch of independent tasks is executed. The map
// and reduce capabilities are provided on top of that primitive, and an engine that can
// do better (a distributed executor, say) is free to override them.

use crate::storage::{BlockGrid, ChunkedArray};
use crate::types::GenotypeError;
use itertools::iproduct;
use log::trace;
use ndarray::{Array, ArrayView1, ArrayView3, Axis, Dimension, RemoveAxis};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use std::ops::AddAssign;
use std::sync::Arc;

pub trait ChunkEngine: Send + Sync {
    /// Runs `task(0)`, `task(1)`, .., `task(count - 1)` and returns the outputs in
    /// task order. Tasks are independent and may run concurrently.
    fn run_tasks<T, F>(&self, count: usize, task: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send;

    /// Applies `kernel` to every chunk of a rank-3 `i8` array and collects one output
    /// block per chunk.
    ///
    /// `out_chunks` declares the boundaries of the output grid. Its block grid must be
    /// the input's block grid, or the input's block grid with the (single-block) last
    /// axis dropped. Every block the kernel produces is checked against it.
    fn map_blocks<A, D, F>(
        &self,
        array: &ChunkedArray,
        out_chunks: Vec<Vec<usize>>,
        kernel: F,
    ) -> Result<BlockGrid<A, D>, GenotypeError>
    where
        A: Send,
        D: Dimension,
        F: Fn(ArrayView3<'_, i8>) -> Array<A, D> + Sync + Send,
    {
        if array.ndim() != 3 {
            return Err(GenotypeError::ShapeMismatch {
                expected: 3,
                actual: array.ndim(),
            });
        }
        let input_blocks = array.block_shape();
        let output_blocks: Vec<usize> = out_chunks.iter().map(Vec::len).collect();
        let dropped_last = input_blocks.len() == 3
            && input_blocks[2] == 1
            && output_blocks.as_slice() == &input_blocks[..2];
        if output_blocks != input_blocks && !dropped_last {
            return Err(GenotypeError::BlockGridMismatch {
                expected: input_blocks,
                actual: output_blocks,
            });
        }

        let coords: Vec<[usize; 3]> = iproduct!(
            0..input_blocks[0],
            0..input_blocks[1],
            0..input_blocks[2]
        )
        .map(|(i, j, k)| [i, j, k])
        .collect();

        let outputs = self.run_tasks(coords.len(), |task| -> Result<Array<A, D>, GenotypeError> {
            let coord = coords[task];
            trace!("mapping kernel over chunk {coord:?}");
            let chunk = array.read_genotype_block(coord)?;
            Ok(kernel(chunk.view()))
        });
        let blocks = outputs.into_iter().collect::<Result<Vec<_>, GenotypeError>>()?;
        BlockGrid::from_blocks(out_chunks, blocks)
    }

    /// Sums a block grid along `axis`, across blocks as well as within them, using
    /// `Acc` as the accumulator type.
    ///
    /// Each lane of blocks along `axis` becomes one output block; lanes are summed
    /// independently of each other, and within a lane the order of addition does not
    /// affect the result.
    fn sum_axis<A, Acc, D>(
        &self,
        grid: &BlockGrid<A, D>,
        axis: Axis,
    ) -> Result<BlockGrid<Acc, D::Smaller>, GenotypeError>
    where
        A: Copy + Send + Sync,
        Acc: Copy + Default + AddAssign + From<A> + Send,
        D: RemoveAxis,
    {
        let ndim = grid.blocks().ndim();
        if axis.index() >= ndim {
            return Err(GenotypeError::InvalidParameter {
                name: "axis",
                value: axis.index() as i64,
                reason: "axis is out of range for the block grid",
            });
        }

        let lanes: Vec<ArrayView1<'_, Array<A, D>>> =
            grid.blocks().lanes(axis).into_iter().collect();
        let sums = self.run_tasks(lanes.len(), |task| {
            lanes[task]
                .iter()
                .map(|block| {
                    block.map_axis(axis, |values| {
                        values.iter().fold(Acc::default(), |mut total, &value| {
                            total += Acc::from(value);
                            total
                        })
                    })
                })
                .reduce(|mut total, partial| {
                    total.zip_mut_with(&partial, |left, &right| *left += right);
                    total
                })
                .unwrap_or_default()
        });

        let mut chunks = grid.chunks().to_vec();
        chunks.remove(axis.index());
        let block_dim = grid.blocks().raw_dim().remove_axis(axis);
        let blocks = Array::from_shape_vec(block_dim, sums).map_err(|_| {
            GenotypeError::BlockGridMismatch {
                expected: chunks.iter().map(Vec::len).collect(),
                actual: vec![lanes.len()],
            }
        })?;
        Ok(BlockGrid::from_parts(blocks, chunks))
    }
}

/// Runs every task on the calling thread, in order.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialEngine;

impl ChunkEngine for SequentialEngine {
    fn run_tasks<T, F>(&self, count: usize, task: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send,
    {
        (0..count).map(task).collect()
    }
}

/// Runs tasks on a rayon thread pool: either the global pool or a dedicated one.
#[derive(Debug, Clone, Default)]
pub struct RayonEngine {
    pool: Option<Arc<ThreadPool>>,
}

impl RayonEngine {
    /// Uses rayon's global pool.
    pub fn global() -> Self {
        Self { pool: None }
    }

    /// Builds a dedicated pool with `threads` workers.
    pub fn with_threads(threads: usize) -> Result<Self, ThreadPoolBuildError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|index| format!("genostats-worker-{index}"))
            .build()?;
        Ok(Self {
            pool: Some(Arc::new(pool)),
        })
    }

    /// Number of worker threads tasks will be spread over.
    pub fn threads(&self) -> usize {
        match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }
}

impl ChunkEngine for RayonEngine {
    fn run_tasks<T, F>(&self, count: usize, task: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send,
    {
        let run = || -> Vec<T> { (0..count).into_par_iter().map(&task).collect() };
        match &self.pool {
            Some(pool) => pool.install(run),
            None => run(),
        }
    }
}

/// The engine selected by configuration.
#[derive(Debug, Clone)]
pub enum Engine {
    Sequential(SequentialEngine),
    Parallel(RayonEngine),
}

impl Default for Engine {
    fn default() -> Self {
        Engine::Parallel(RayonEngine::global())
    }
}

impl Engine {
    pub fn threads(&self) -> usize {
        match self {
            Engine::Sequential(_) => 1,
            Engine::Parallel(engine) => engine.threads(),
        }
    }
}

impl ChunkEngine for Engine {
    fn run_tasks<T, F>(&self, count: usize, task: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send,
    {
        match self {
            Engine::Sequential(engine) => engine.run_tasks(count, task),
            Engine::Parallel(engine) => engine.run_tasks(count, task),
        }
    }
}
