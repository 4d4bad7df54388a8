// ========================================================================================
//
//                      The kernels: genotype scans over one contiguous block
//
// ========================================================================================
//
// This module contains the innermost loops of the engine. Every function here takes a
// single, already-validated `(variants, samples, ploidy)` view and returns a freshly
// allocated result; the output is allocated once, before the scan, and the inputs are
// never written. There is no shared state, so any number of these can run concurrently
// on independent blocks, which is exactly what the chunked kernel set does.
//
// The loops walk ndarray lanes along the ploidy axis instead of indexing element by
// element. Shape is checked once, by the caller, and never again inside the scan.
//
// Early exit (stop looking at a position once its answer is known) is only a speed-up:
// every kernel returns the same values a full, exhaustive scan would.

use crate::types::GenotypeError;
use ndarray::{Array2, ArrayView3, Axis, Zip};

/// A small signed integer that encodes one genotype call slot.
///
/// Non-negative values are allele indices; any negative value means the slot is missing.
pub trait AlleleCode: Copy + PartialEq + Send + Sync {
    fn is_missing(self) -> bool;

    /// The allele index, or `None` for a missing slot.
    fn allele_index(self) -> Option<usize>;
}

macro_rules! allele_code {
    ($($ty:ty),*) => {
        $(
            impl AlleleCode for $ty {
                #[inline(always)]
                fn is_missing(self) -> bool {
                    self < 0
                }

                #[inline(always)]
                fn allele_index(self) -> Option<usize> {
                    usize::try_from(self).ok()
                }
            }
        )*
    };
}

allele_code!(i8, i16);

/// The highest allele index `count_alleles` should count.
///
/// Constructing one is the only place `max_allele` is checked, so a count with a negative
/// upper bound is an unrepresentable state for the kernels. Bounds above the largest
/// allele a call can hold are valid; their extra columns stay zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxAllele(u32);

impl MaxAllele {
    pub fn new(max_allele: i32) -> Result<Self, GenotypeError> {
        u32::try_from(max_allele)
            .map(Self)
            .map_err(|_| GenotypeError::InvalidParameter {
                name: "max_allele",
                value: i64::from(max_allele),
                reason: "must be non-negative",
            })
    }

    #[inline]
    pub fn get(self) -> u32 {
        self.0
    }

    /// Width of the allele axis of a count grid: `max_allele + 1`.
    #[inline]
    pub fn columns(self) -> usize {
        self.0 as usize + 1
    }
}

impl TryFrom<i32> for MaxAllele {
    type Error = GenotypeError;

    fn try_from(max_allele: i32) -> Result<Self, Self::Error> {
        Self::new(max_allele)
    }
}

/// True where no ploidy slot of a `(variant, sample)` call is missing.
pub fn is_called<T: AlleleCode>(g: ArrayView3<'_, T>) -> Array2<bool> {
    Zip::from(g.lanes(Axis(2))).map_collect(|calls| !calls.iter().any(|allele| allele.is_missing()))
}

/// True where any ploidy slot of a `(variant, sample)` call is missing.
///
/// This is evaluated on its own rather than as `!is_called`: a partial call (one slot
/// missing, another present) is both "not called" and "missing".
pub fn is_missing<T: AlleleCode>(g: ArrayView3<'_, T>) -> Array2<bool> {
    Zip::from(g.lanes(Axis(2))).map_collect(|calls| calls.iter().any(|allele| allele.is_missing()))
}

/// True where a call is fully present and every slot carries the same allele.
///
/// A haploid call is homozygous whenever it is called. A call with no slots at all
/// (ploidy zero) is never homozygous.
pub fn is_hom<T: AlleleCode>(g: ArrayView3<'_, T>) -> Array2<bool> {
    Zip::from(g.lanes(Axis(2))).map_collect(|calls| match calls.get(0) {
        Some(&first) if !first.is_missing() => calls.iter().skip(1).all(|&allele| allele == first),
        _ => false,
    })
}

/// Counts, for every variant, how many slots across all samples carry each allele in
/// `0..=max_allele`.
///
/// Slots outside that range (missing calls, and alleles above `max_allele`) are left out
/// of the count. A caller passing a `max_allele` below the true highest allele gets
/// truncated counts, not an error.
pub fn count_alleles<T: AlleleCode>(
    g: ArrayView3<'_, T>,
    max_allele: i32,
) -> Result<Array2<i32>, GenotypeError> {
    let max_allele = MaxAllele::new(max_allele)?;
    Ok(count_alleles_with(g, max_allele))
}

/// `count_alleles` with an already-checked upper bound.
pub fn count_alleles_with<T: AlleleCode>(g: ArrayView3<'_, T>, max_allele: MaxAllele) -> Array2<i32> {
    let mut out = Array2::<i32>::zeros((g.len_of(Axis(0)), max_allele.columns()));
    for (mut counts, variant) in out.outer_iter_mut().zip(g.outer_iter()) {
        for allele in variant.iter() {
            if let Some(index) = allele.allele_index() {
                if let Some(slot) = counts.get_mut(index) {
                    *slot += 1;
                }
            }
        }
    }
    out
}
