// ========================================================================================
//
//                         The genotype array and its public queries
//
// ========================================================================================
//
// `GenotypeArray` owns a validated genotype array and answers the four queries on it.
// The backend (contiguous or chunked) is fixed when the array is constructed; each
// query dispatches once on it and routes to the matching kernel set. Nothing is cached,
// so calling a query twice recomputes it and returns an equal result.

use crate::chunked;
use crate::engine::{ChunkEngine, Engine};
use crate::kernel::{self, MaxAllele};
use crate::types::{GenotypeData, GenotypeError, ResultGrid};
use crate::validate::{ArrayInput, normalize_genotype_data};
use log::debug;
use std::any::Any;

/// A rank-3 `i8` genotype array of shape `(variants, samples, ploidy)`.
#[derive(Debug, Clone)]
pub struct GenotypeArray<E: ChunkEngine = Engine> {
    data: GenotypeData,
    engine: E,
}

impl GenotypeArray<Engine> {
    /// Validates `data` and wraps it, running chunked queries on the default engine.
    pub fn new(data: impl Into<ArrayInput>) -> Result<Self, GenotypeError> {
        Self::with_engine(data, Engine::default())
    }

    /// As `new`, for a value whose type is only known at run time.
    pub fn from_any<T: Any>(data: T) -> Result<Self, GenotypeError> {
        Self::new(ArrayInput::from_any(data)?)
    }
}

impl<E: ChunkEngine> GenotypeArray<E> {
    /// Validates `data` and wraps it, running chunked queries on `engine`.
    pub fn with_engine(data: impl Into<ArrayInput>, engine: E) -> Result<Self, GenotypeError> {
        let data = normalize_genotype_data(data)?;
        Ok(Self { data, engine })
    }

    /// The underlying array, in whichever backend it was constructed with.
    pub fn data(&self) -> &GenotypeData {
        &self.data
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn into_data(self) -> GenotypeData {
        self.data
    }

    /// `(variants, samples, ploidy)`.
    pub fn shape(&self) -> [usize; 3] {
        self.data.shape()
    }

    pub fn n_variants(&self) -> usize {
        self.shape()[0]
    }

    pub fn n_samples(&self) -> usize {
        self.shape()[1]
    }

    pub fn ploidy(&self) -> usize {
        self.shape()[2]
    }

    pub fn is_chunked(&self) -> bool {
        self.data.is_chunked()
    }

    /// True where every ploidy slot of a call holds a non-negative allele.
    pub fn is_called(&self) -> Result<ResultGrid<bool>, GenotypeError> {
        match &self.data {
            GenotypeData::Contiguous(g) => {
                debug!("is_called: contiguous array of shape {:?}", g.dim());
                Ok(ResultGrid::Contiguous(kernel::is_called(g.view())))
            }
            GenotypeData::Chunked(g) => Ok(ResultGrid::Chunked(chunked::is_called(g, &self.engine)?)),
        }
    }

    /// True where any ploidy slot of a call is missing.
    pub fn is_missing(&self) -> Result<ResultGrid<bool>, GenotypeError> {
        match &self.data {
            GenotypeData::Contiguous(g) => {
                debug!("is_missing: contiguous array of shape {:?}", g.dim());
                Ok(ResultGrid::Contiguous(kernel::is_missing(g.view())))
            }
            GenotypeData::Chunked(g) => Ok(ResultGrid::Chunked(chunked::is_missing(g, &self.engine)?)),
        }
    }

    /// True where a call is fully present and all its slots agree.
    pub fn is_hom(&self) -> Result<ResultGrid<bool>, GenotypeError> {
        match &self.data {
            GenotypeData::Contiguous(g) => {
                debug!("is_hom: contiguous array of shape {:?}", g.dim());
                Ok(ResultGrid::Contiguous(kernel::is_hom(g.view())))
            }
            GenotypeData::Chunked(g) => Ok(ResultGrid::Chunked(chunked::is_hom(g, &self.engine)?)),
        }
    }

    /// Per-variant counts of each allele in `0..=max_allele`, shaped
    /// `(variants, max_allele + 1)`.
    ///
    /// `max_allele` is checked before either backend is touched.
    pub fn count_alleles(&self, max_allele: i32) -> Result<ResultGrid<i32>, GenotypeError> {
        let max_allele = MaxAllele::new(max_allele)?;
        match &self.data {
            GenotypeData::Contiguous(g) => {
                debug!(
                    "count_alleles: contiguous array of shape {:?}, max allele {}",
                    g.dim(),
                    max_allele.get()
                );
                Ok(ResultGrid::Contiguous(kernel::count_alleles_with(g.view(), max_allele)))
            }
            GenotypeData::Chunked(g) => Ok(ResultGrid::Chunked(chunked::count_alleles_with(
                g,
                max_allele,
                &self.engine,
            )?)),
        }
    }
}

/// Validates `data` and returns its call-presence grid.
pub fn is_called(data: impl Into<ArrayInput>) -> Result<ResultGrid<bool>, GenotypeError> {
    GenotypeArray::new(data)?.is_called()
}

pub fn is_missing(data: impl Into<ArrayInput>) -> Result<ResultGrid<bool>, GenotypeError> {
    GenotypeArray::new(data)?.is_missing()
}

pub fn is_hom(data: impl Into<ArrayInput>) -> Result<ResultGrid<bool>, GenotypeError> {
    GenotypeArray::new(data)?.is_hom()
}

pub fn count_alleles(data: impl Into<ArrayInput>, max_allele: i32) -> Result<ResultGrid<i32>, GenotypeError> {
    GenotypeArray::new(data)?.count_alleles(max_allele)
}
