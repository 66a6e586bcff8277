//! Infinite systems: one unit cell plus the interface of the previous cell.
//!
//! The first `cell_size` sites of the graph form a complete cell. The
//! remaining sites are copies, in order, of a prefix of the cell's sites as
//! they appear in the previous cell, so inter-cell hoppings are ordinary
//! graph edges.

use std::collections::BTreeSet;

use ndarray::Array2;
use num_complex::Complex64;
use sprs::CsMat;

use super::{System, SystemError};
use crate::physics::{BrokenSymmetry, DiscreteSymmetry, LeadSolver, ModeDecomposition};
use crate::types::Params;

pub trait InfiniteSystem: System {
    /// Number of sites in one cell.
    fn cell_size(&self) -> usize;

    /// Number of interface sites (previous-cell copies in the graph).
    fn num_interface_sites(&self) -> usize {
        self.graph().num_nodes().saturating_sub(self.cell_size())
    }

    /// Hamiltonian of a single cell, over the first `cell_size` sites.
    fn cell_hamiltonian(&self, params: &Params) -> Result<Array2<Complex64>, SystemError> {
        let cell: Vec<usize> = (0..self.cell_size()).collect();
        self.hamiltonian_submatrix(Some(&cell), Some(&cell), params)
    }

    fn cell_hamiltonian_sparse(&self, params: &Params) -> Result<CsMat<Complex64>, SystemError> {
        let cell: Vec<usize> = (0..self.cell_size()).collect();
        self.hamiltonian_submatrix_sparse(Some(&cell), Some(&cell), params)
    }

    /// Hopping from the previous cell into the current one: rows are cell
    /// orbitals, columns interface orbitals.
    fn inter_cell_hopping(&self, params: &Params) -> Result<Array2<Complex64>, SystemError> {
        let cell: Vec<usize> = (0..self.cell_size()).collect();
        let interface: Vec<usize> = (self.cell_size()..self.graph().num_nodes()).collect();
        self.hamiltonian_submatrix(Some(&cell), Some(&interface), params)
    }

    fn inter_cell_hopping_sparse(&self, params: &Params) -> Result<CsMat<Complex64>, SystemError> {
        let cell: Vec<usize> = (0..self.cell_size()).collect();
        let interface: Vec<usize> = (self.cell_size()..self.graph().num_nodes()).collect();
        self.hamiltonian_submatrix_sparse(Some(&cell), Some(&interface), params)
    }

    /// Mode decomposition of the lead at `energy`.
    ///
    /// Declared discrete symmetries that the cell Hamiltonian or the hopping
    /// break are dropped with a warning. Particle-hole and chiral symmetry
    /// are dropped whenever `energy != 0`.
    fn modes(
        &self,
        solver: &dyn LeadSolver,
        energy: f64,
        params: &Params,
    ) -> Result<ModeDecomposition, SystemError> {
        let mut ham = self.cell_hamiltonian(params)?;
        let hop = self.inter_cell_hopping(params)?;
        let mut symmetries = self.discrete_symmetry(params)?;

        let mut broken = BTreeSet::new();
        broken.extend(symmetries.validate(ham.view())?);
        broken.extend(symmetries.validate(hop.view())?);
        for name in broken {
            log::warn!("Hamiltonian breaks {}, ignoring the symmetry in the computation.", name);
            symmetries.disable(name);
        }

        shift_diagonal(&mut ham, energy)?;
        if energy != 0.0 {
            symmetries.disable(BrokenSymmetry::ParticleHole);
            symmetries.disable(BrokenSymmetry::Chiral);
        }
        Ok(solver.modes(&ham, &hop, &symmetries)?)
    }

    /// Self-energy of the lead at `energy`, square over the interface
    /// orbitals.
    fn selfenergy(
        &self,
        solver: &dyn LeadSolver,
        energy: f64,
        params: &Params,
    ) -> Result<Array2<Complex64>, SystemError> {
        let mut ham = self.cell_hamiltonian(params)?;
        shift_diagonal(&mut ham, energy)?;
        let hop = self.inter_cell_hopping(params)?;
        Ok(solver.selfenergy(&ham, &hop)?)
    }

    /// Symmetries broken by the cell Hamiltonian or the inter-cell hopping.
    fn validate_symmetries(&self, params: &Params) -> Result<Vec<BrokenSymmetry>, SystemError> {
        let symmetries: DiscreteSymmetry = self.discrete_symmetry(params)?;
        let ham = self.cell_hamiltonian(params)?;
        let hop = self.inter_cell_hopping(params)?;
        let mut broken = BTreeSet::new();
        broken.extend(symmetries.validate(ham.view())?);
        broken.extend(symmetries.validate(hop.view())?);
        Ok(broken.into_iter().collect())
    }
}

/// Subtract `energy` from the diagonal of a square matrix.
fn shift_diagonal(ham: &mut Array2<Complex64>, energy: f64) -> Result<(), SystemError> {
    if !ham.is_square() {
        return Err(SystemError::Shape {
            expected: vec![ham.nrows(), ham.nrows()],
            found: ham.shape().to_vec(),
            context: " for the cell Hamiltonian".into(),
        });
    }
    ham.diag_mut().mapv_inplace(|z| z - energy);
    Ok(())
}
