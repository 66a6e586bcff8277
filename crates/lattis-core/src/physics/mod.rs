//! Lead physics consumed by infinite systems.
//!
//! The numerical mode decomposition and self-energy routines live outside
//! this crate. They are reached through the [`LeadSolver`] trait, which is
//! handed explicitly to [`crate::system::InfiniteSystem::modes`],
//! [`crate::system::InfiniteSystem::selfenergy`] and
//! [`crate::system::FiniteSystem::precalculate`].
//!
//! What does live here are the data the routines exchange with systems: the
//! [`DiscreteSymmetry`] descriptor with its validator, and the mode
//! containers [`PropagatingModes`] and [`StabilizedModes`].

pub mod discrete;
pub mod modes;

pub use discrete::{BrokenSymmetry, DiscreteSymmetry};
pub use modes::{ModeDecomposition, PropagatingModes, StabilizedModes};

use ndarray::Array2;
use num_complex::Complex64;
use thiserror::Error;

/// Errors reported by lead solvers and mode post-processing.
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("{what} has shape {found:?}, expected {expected:?}")]
    Dimension {
        what: String,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Singular matrix: {0}")]
    Singular(String),

    #[error("Invalid discrete symmetry: {0}")]
    InvalidSymmetry(String),

    #[error("Lead solver failed: {0}")]
    Failed(String),
}

/// The external mode-decomposition and self-energy routines.
///
/// Implementations receive the cell Hamiltonian with the energy already
/// subtracted from its diagonal, and the inter-cell hopping whose rows run
/// over the cell orbitals and columns over the interface orbitals.
pub trait LeadSolver: Send + Sync {
    /// Decompose the lead into propagating and stabilized modes.
    fn modes(
        &self,
        ham: &Array2<Complex64>,
        hop: &Array2<Complex64>,
        symmetry: &DiscreteSymmetry,
    ) -> Result<ModeDecomposition, SolverError>;

    /// Self-energy of the lead, square over the interface orbitals.
    fn selfenergy(
        &self,
        ham: &Array2<Complex64>,
        hop: &Array2<Complex64>,
    ) -> Result<Array2<Complex64>, SolverError>;
}

/// Conjugate transpose.
pub(crate) fn dagger(a: ndarray::ArrayView2<'_, Complex64>) -> Array2<Complex64> {
    a.t().mapv(|z| z.conj())
}
