#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
pub mod chunked;
pub mod config;
pub mod engine;
pub mod kernel;
pub mod model;
pub mod storage;
pub mod types;
pub mod validate;

pub use storage::{BlockGrid, ChunkSource, ChunkedArray, InMemorySource, chunk_sizes};
pub use config::{ComputeConfig, ConfigError, Schedule};
pub use engine::{ChunkEngine, Engine, RayonEngine, SequentialEngine};
pub use model::{GenotypeArray, count_alleles, is_called, is_hom, is_missing};
pub use types::{ArrayData, DType, GenotypeData, GenotypeError, ResultGrid};
pub use validate::{ArrayInput, normalize_genotype_data};
