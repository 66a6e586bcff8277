//! Low-level system abstraction.
//!
//! The [`System`] trait is the contract between finalized tight-binding
//! systems and everything that consumes their Hamiltonian: a graph over site
//! indices, orbital bookkeeping ([`SiteRanges`]), and per-element evaluation
//! via [`System::hamiltonian`]. Vectorized systems additionally evaluate
//! whole blocks of matrix elements at once ([`VectorizedSystem`]).
//!
//! Finite systems with attached leads implement [`FiniteSystem`]; infinite,
//! periodically repeated systems implement [`InfiniteSystem`].

pub mod assembly;
pub mod finite;
pub mod infinite;
pub mod lead;
pub mod vectorized;

pub use finite::{FiniteSystem, Lead, PrecalculateWhat, SelfEnergyLead};
pub use infinite::InfiniteSystem;
pub use lead::PrecalculatedLead;
pub use vectorized::{normalize_matrix_blocks, Selector, Subgraph, Term, VectorizedSystem};

use std::collections::BTreeSet;
use std::fmt;

use ndarray::Array2;
use num_complex::Complex64;
use sprs::CsMat;
use thiserror::Error;

use crate::graph::{Graph, GraphError};
use crate::physics::{DiscreteSymmetry, SolverError};
use crate::site::TagError;
use crate::symmetry::SymmetryError;
use crate::types::{Params, SiteRanges};

/// Errors raised while evaluating or querying a system.
#[derive(Debug, Error)]
pub enum SystemError {
    #[error("Expected values of shape {expected:?}, but received values of shape {found:?}{context}")]
    Shape {
        expected: Vec<usize>,
        found: Vec<usize>,
        /// Extra detail: broadcasting origin and offending function.
        context: String,
    },

    #[error("{0}")]
    Usage(String),

    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid site ranges: {0}")]
    InvalidSiteRanges(String),

    #[error("No matrix element between sites {0} and {1}")]
    NoSuchHopping(usize, usize),

    #[error("Site index {index} out of range for a system of {num_sites} sites")]
    SiteOutOfRange { index: usize, num_sites: usize },

    #[error("Precalculated {what} not available. Consider using precalculate() with what='{what}' or what='all'")]
    NotPrecalculated { what: &'static str },

    #[error(transparent)]
    Tag(#[from] TagError),

    #[error(transparent)]
    Symmetry(#[from] SymmetryError),

    #[error(transparent)]
    Solver(#[from] SolverError),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Which family of systems an implementation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemKind {
    Finite,
    FiniteVectorized,
    Infinite,
    InfiniteVectorized,
}

impl SystemKind {
    pub fn is_finite(self) -> bool {
        matches!(self, SystemKind::Finite | SystemKind::FiniteVectorized)
    }

    pub fn is_infinite(self) -> bool {
        !self.is_finite()
    }

    pub fn is_vectorized(self) -> bool {
        matches!(self, SystemKind::FiniteVectorized | SystemKind::InfiniteVectorized)
    }
}

/// A Hamiltonian-bearing graph over site indices `0..graph().num_nodes()`.
pub trait System: Send + Sync {
    /// Directed graph whose edges are the hoppings.
    fn graph(&self) -> &Graph;

    /// Orbital bookkeeping, if every site declares its orbital count.
    fn site_ranges(&self) -> Option<&SiteRanges>;

    /// Names of the parameters the Hamiltonian depends on.
    fn parameters(&self) -> &BTreeSet<String>;

    /// Onsite block (`i == j`) or hopping block (`i != j`) of shape
    /// `(norbs_i, norbs_j)`.
    fn hamiltonian(&self, i: usize, j: usize, params: &Params) -> Result<Array2<Complex64>, SystemError>;

    fn kind(&self) -> SystemKind;

    /// Class name used by [`System::describe`].
    fn type_name(&self) -> &'static str;

    /// Declared discrete symmetries. Defaults to none.
    fn discrete_symmetry(&self, _params: &Params) -> Result<DiscreteSymmetry, SystemError> {
        Ok(DiscreteSymmetry::default())
    }

    /// Dense Hamiltonian over the given sites (`None` selects all).
    fn hamiltonian_submatrix(
        &self,
        rows: Option<&[usize]>,
        cols: Option<&[usize]>,
        params: &Params,
    ) -> Result<Array2<Complex64>, SystemError> {
        let (rows, cols) = assembly::select_sites(self.graph(), rows, cols);
        assembly::dense_submatrix(self, &rows, &cols, params)
    }

    /// Sparse (CSR) Hamiltonian over the given sites.
    fn hamiltonian_submatrix_sparse(
        &self,
        rows: Option<&[usize]>,
        cols: Option<&[usize]>,
        params: &Params,
    ) -> Result<CsMat<Complex64>, SystemError> {
        let (rows, cols) = assembly::select_sites(self.graph(), rows, cols);
        assembly::sparse_submatrix(self, &rows, &cols, params)
    }

    /// One-line summary, e.g.
    /// `<TightBindingSystem with 4 sites, 6 hoppings, and parameters: (t)>`.
    fn describe(&self) -> String {
        let mut details = vec![
            format!("{} sites", self.graph().num_nodes()),
            format!("{} hoppings", self.graph().num_edges()),
        ];
        if !self.parameters().is_empty() {
            let names: Vec<&str> = self.parameters().iter().map(String::as_str).collect();
            details.push(format!("parameters: ({})", names.join(", ")));
        }
        let (last, head) = details.split_last().map(|(l, h)| (l.clone(), h.join(", "))).unwrap_or_default();
        format!("<{} with {}, and {}>", self.type_name(), head, last)
    }
}

impl fmt::Debug for dyn System {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

pub fn is_finite(syst: &dyn System) -> bool {
    syst.kind().is_finite()
}

pub fn is_infinite(syst: &dyn System) -> bool {
    syst.kind().is_infinite()
}

pub fn is_vectorized(syst: &dyn System) -> bool {
    syst.kind().is_vectorized()
}
