//! Containers for the mode decomposition of a lead.
//!
//! [`StabilizedModes::selfenergy`] derives the lead self-energy from the
//! evanescent and outgoing translation eigenvectors with a dense LU
//! factorization via `faer`, so precalculating both modes and self-energy
//! needs only one call into the lead solver.

use faer::linalg::solvers::SpSolver;
use ndarray::{s, Array1, Array2, ArrayView2};
use num_complex::Complex64;

use super::{dagger, SolverError};

/// Propagating modes of a lead.
#[derive(Debug, Clone, PartialEq)]
pub struct PropagatingModes {
    /// Wave functions over the cell orbitals, one column per mode.
    pub wave_functions: Array2<Complex64>,
    pub velocities: Array1<f64>,
    pub momenta: Array1<f64>,
}

impl PropagatingModes {
    pub fn num_modes(&self) -> usize {
        self.wave_functions.ncols()
    }
}

/// Translation eigenvectors of a lead in a numerically stable basis.
///
/// The first `nmodes` columns of `vecs` are the incoming modes; the
/// remaining columns (outgoing followed by evanescent) form a square block.
#[derive(Debug, Clone, PartialEq)]
pub struct StabilizedModes {
    pub vecs: Array2<Complex64>,
    pub vecslmbdainv: Array2<Complex64>,
    pub nmodes: usize,
    /// Square root of the hopping; `None` stands for the identity.
    pub sqrt_hop: Option<Array2<Complex64>>,
}

/// What a lead solver returns from a mode computation.
pub type ModeDecomposition = (PropagatingModes, StabilizedModes);

/// `a⁻¹ rhs` by LU factorization, one right-hand-side column at a time.
fn lu_solve(
    a: ArrayView2<'_, Complex64>,
    rhs: ArrayView2<'_, Complex64>,
) -> Result<Array2<Complex64>, SolverError> {
    let dim = a.nrows();
    let faer_mat = faer::Mat::<faer::complex_native::c64>::from_fn(dim, dim, |i, j| {
        let c = a[[i, j]];
        faer::complex_native::c64::new(c.re, c.im)
    });
    let lu = faer_mat.partial_piv_lu();

    let mut x = Array2::<Complex64>::zeros(rhs.raw_dim());
    for (col, mut out) in rhs.columns().into_iter().zip(x.columns_mut()) {
        let faer_rhs = faer::Col::<faer::complex_native::c64>::from_fn(dim, |i| {
            let c = col[i];
            faer::complex_native::c64::new(c.re, c.im)
        });
        let faer_sol = lu.solve(&faer_rhs);
        for i in 0..dim {
            let c = faer_sol[i];
            out[i] = Complex64::new(c.re, c.im);
        }
    }
    if x.iter().any(|z| !z.re.is_finite() || !z.im.is_finite()) {
        return Err(SolverError::Singular(
            "outgoing and evanescent mode vectors are linearly dependent".into(),
        ));
    }
    Ok(x)
}

impl StabilizedModes {
    /// Retarded self-energy of the lead generated by these modes.
    ///
    /// Over the non-incoming columns computes `v φ (φ Λ⁻¹)⁻¹ v†`, which is
    /// `φ (φ Λ⁻¹)⁻¹` when `sqrt_hop` is the identity.
    pub fn selfenergy(&self) -> Result<Array2<Complex64>, SolverError> {
        let dim = self.vecs.nrows();
        let expected = (dim, self.nmodes + dim);
        if self.vecs.dim() != expected {
            return Err(SolverError::Dimension {
                what: "vecs".into(),
                expected,
                found: self.vecs.dim(),
            });
        }
        if self.vecslmbdainv.dim() != expected {
            return Err(SolverError::Dimension {
                what: "vecslmbdainv".into(),
                expected,
                found: self.vecslmbdainv.dim(),
            });
        }
        let vecs = self.vecs.slice(s![.., self.nmodes..]);
        let lmbdainv = self.vecslmbdainv.slice(s![.., self.nmodes..]);

        match &self.sqrt_hop {
            // X lmbdainv = vecs  <=>  lmbdainv^T X^T = vecs^T
            None => Ok(lu_solve(lmbdainv.t(), vecs.t())?.reversed_axes()),
            Some(v) => {
                if v.ncols() != dim {
                    return Err(SolverError::Dimension {
                        what: "sqrt_hop".into(),
                        expected: (v.nrows(), dim),
                        found: v.dim(),
                    });
                }
                let rhs = dagger(v.view());
                Ok(v.dot(&vecs).dot(&lu_solve(lmbdainv, rhs.view())?))
            }
        }
    }
}
