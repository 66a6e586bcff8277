//! Core value types shared across the crate.
//!
//! This module defines the parameter map handed to Hamiltonian value
//! functions, the orbital bookkeeping of a system ([`SiteRanges`]), and the
//! loosely shaped matrix values that value functions return
//! ([`MatrixBlocks`]).

use std::collections::BTreeMap;
use std::fmt;

use ndarray::{Array1, Array2, Array3, ArrayD, IxDyn};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::system::SystemError;

/// Named real parameters on which Hamiltonian values depend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Params(BTreeMap<String, f64>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion.
    pub fn with(mut self, name: &str, value: f64) -> Self {
        self.0.insert(name.to_string(), value);
        self
    }

    pub fn insert(&mut self, name: &str, value: f64) -> Option<f64> {
        self.0.insert(name.to_string(), value)
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Look up a parameter that a value function requires.
    pub fn require(&self, name: &str) -> Result<f64, SystemError> {
        self.get(name)
            .ok_or_else(|| SystemError::MissingParameter(name.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<const N: usize> From<[(&str, f64); N]> for Params {
    fn from(items: [(&str, f64); N]) -> Self {
        Self(items.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }
}

/// A run of consecutive sites that share the same number of orbitals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteRange {
    /// Index of the first site in the run.
    pub first_site: usize,
    /// Orbitals per site in the run.
    pub norbs: usize,
    /// Offset of the first orbital of the first site.
    pub orb_offset: usize,
}

impl From<(usize, usize, usize)> for SiteRange {
    fn from((first_site, norbs, orb_offset): (usize, usize, usize)) -> Self {
        Self {
            first_site,
            norbs,
            orb_offset,
        }
    }
}

/// Sorted orbital bookkeeping of a system, terminated by the sentinel
/// `(num_sites, 0, total_orbitals)`.
///
/// Consecutive runs may repeat the same `norbs`; only the offsets are
/// required to be consistent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<SiteRange>", into = "Vec<SiteRange>")]
pub struct SiteRanges(Vec<SiteRange>);

impl TryFrom<Vec<SiteRange>> for SiteRanges {
    type Error = SystemError;

    fn try_from(rows: Vec<SiteRange>) -> Result<Self, Self::Error> {
        Self::new(rows)
    }
}

impl From<SiteRanges> for Vec<SiteRange> {
    fn from(ranges: SiteRanges) -> Self {
        ranges.0
    }
}

impl SiteRanges {
    /// Validate and wrap a list of `(first_site, norbs, orb_offset)` rows.
    pub fn new<R: Into<SiteRange>>(rows: impl IntoIterator<Item = R>) -> Result<Self, SystemError> {
        let rows: Vec<SiteRange> = rows.into_iter().map(Into::into).collect();
        let invalid = |reason: &str| Err(SystemError::InvalidSiteRanges(reason.to_string()));

        let (first, last) = match (rows.first(), rows.last()) {
            (Some(f), Some(l)) => (*f, *l),
            _ => return invalid("at least the sentinel row is required"),
        };
        if first.first_site != 0 || first.orb_offset != 0 {
            return invalid("the first row must start at site 0 and orbital 0");
        }
        if last.norbs != 0 {
            return invalid("the sentinel row must have norbs == 0");
        }
        for pair in rows.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if b.first_site <= a.first_site {
                return invalid("first_site must be strictly increasing");
            }
            if a.norbs == 0 {
                return invalid("only the sentinel row may have norbs == 0");
            }
            if b.orb_offset != a.orb_offset + (b.first_site - a.first_site) * a.norbs {
                return invalid("orbital offsets are inconsistent with norbs");
            }
        }
        Ok(Self(rows))
    }

    /// Merge a per-site orbital count list into runs.
    pub fn from_norbs(norbs: impl IntoIterator<Item = usize>) -> Result<Self, SystemError> {
        let mut rows: Vec<SiteRange> = Vec::new();
        let (mut site, mut offset) = (0, 0);
        for n in norbs {
            if rows.last().map(|r| r.norbs) != Some(n) {
                rows.push((site, n, offset).into());
            }
            site += 1;
            offset += n;
        }
        rows.push((site, 0, offset).into());
        Self::new(rows)
    }

    pub fn rows(&self) -> &[SiteRange] {
        &self.0
    }

    fn sentinel(&self) -> SiteRange {
        self.0[self.0.len() - 1]
    }

    pub fn num_sites(&self) -> usize {
        self.sentinel().first_site
    }

    pub fn total_orbitals(&self) -> usize {
        self.sentinel().orb_offset
    }

    fn run_of(&self, site: usize) -> Option<SiteRange> {
        if site >= self.num_sites() {
            return None;
        }
        let idx = self.0.partition_point(|r| r.first_site <= site) - 1;
        Some(self.0[idx])
    }

    /// Number of orbitals on `site`.
    pub fn norbs(&self, site: usize) -> Option<usize> {
        self.run_of(site).map(|r| r.norbs)
    }

    /// Offset of the first orbital of `site`.
    pub fn orb_offset(&self, site: usize) -> Option<usize> {
        self.run_of(site)
            .map(|r| r.orb_offset + (site - r.first_site) * r.norbs)
    }

    /// Orbital indices belonging to `site`.
    pub fn orbital_range(&self, site: usize) -> Option<std::ops::Range<usize>> {
        let run = self.run_of(site)?;
        let start = run.orb_offset + (site - run.first_site) * run.norbs;
        Some(start..start + run.norbs)
    }
}

impl fmt::Display for SiteRanges {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in &self.0 {
            writeln!(f, "({}, {}, {})", r.first_site, r.norbs, r.orb_offset)?;
        }
        Ok(())
    }
}

/// A matrix value as returned by a value function: a scalar, a vector of
/// scalars, a single matrix, or a stack of matrices.
///
/// [`crate::system::vectorized::normalize_matrix_blocks`] broadcasts it into
/// the canonical `(count, rows, cols)` shape.
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixBlocks(pub ArrayD<Complex64>);

impl MatrixBlocks {
    pub fn shape(&self) -> &[usize] {
        self.0.shape()
    }
}

impl From<f64> for MatrixBlocks {
    fn from(x: f64) -> Self {
        Complex64::from(x).into()
    }
}

impl From<Complex64> for MatrixBlocks {
    fn from(x: Complex64) -> Self {
        Self(ArrayD::from_elem(IxDyn(&[]), x))
    }
}

impl From<Array1<Complex64>> for MatrixBlocks {
    fn from(a: Array1<Complex64>) -> Self {
        Self(a.into_dyn())
    }
}

impl From<Array1<f64>> for MatrixBlocks {
    fn from(a: Array1<f64>) -> Self {
        Self(a.mapv(Complex64::from).into_dyn())
    }
}

impl From<Array2<Complex64>> for MatrixBlocks {
    fn from(a: Array2<Complex64>) -> Self {
        Self(a.into_dyn())
    }
}

impl From<Array2<f64>> for MatrixBlocks {
    fn from(a: Array2<f64>) -> Self {
        Self(a.mapv(Complex64::from).into_dyn())
    }
}

impl From<Array3<Complex64>> for MatrixBlocks {
    fn from(a: Array3<Complex64>) -> Self {
        Self(a.into_dyn())
    }
}

impl From<ArrayD<Complex64>> for MatrixBlocks {
    fn from(a: ArrayD<Complex64>) -> Self {
        Self(a)
    }
}
