//! Discrete (non-spatial) symmetries of a Hamiltonian.
//!
//! A [`DiscreteSymmetry`] bundles the conservation law projectors and the
//! time-reversal, particle-hole, and chiral operators declared for a system.
//! [`DiscreteSymmetry::validate`] checks them against a numerical
//! Hamiltonian or hopping matrix.

use std::fmt;

use ndarray::{s, Array2, ArrayView2};
use num_complex::Complex64;
use serde::Serialize;

use super::{dagger, SolverError};

/// Relative tolerance used when comparing transformed matrices.
const VALIDATION_TOL: f64 = 1e-10;

/// A symmetry reported broken by [`DiscreteSymmetry::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum BrokenSymmetry {
    ConservationLaw,
    TimeReversal,
    ParticleHole,
    Chiral,
}

impl BrokenSymmetry {
    pub const ALL: [BrokenSymmetry; 4] = [
        BrokenSymmetry::ConservationLaw,
        BrokenSymmetry::TimeReversal,
        BrokenSymmetry::ParticleHole,
        BrokenSymmetry::Chiral,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BrokenSymmetry::ConservationLaw => "Conservation law",
            BrokenSymmetry::TimeReversal => "Time reversal",
            BrokenSymmetry::ParticleHole => "Particle-hole",
            BrokenSymmetry::Chiral => "Chiral",
        }
    }
}

impl fmt::Display for BrokenSymmetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Declared discrete symmetries. `None` means "not present".
///
/// Projectors are `(n, k_i)` matrices whose columns span the blocks of the
/// conserved quantity; the three operators are `(n, n)` unitaries. The
/// default value declares no symmetry at all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscreteSymmetry {
    pub projectors: Option<Vec<Array2<Complex64>>>,
    pub time_reversal: Option<Array2<Complex64>>,
    pub particle_hole: Option<Array2<Complex64>>,
    pub chiral: Option<Array2<Complex64>>,
}

impl DiscreteSymmetry {
    /// Build a descriptor, checking that the operators are square and
    /// that the projectors resolve the identity.
    pub fn new(
        projectors: Option<Vec<Array2<Complex64>>>,
        time_reversal: Option<Array2<Complex64>>,
        particle_hole: Option<Array2<Complex64>>,
        chiral: Option<Array2<Complex64>>,
    ) -> Result<Self, SolverError> {
        for (name, op) in [
            ("time_reversal", &time_reversal),
            ("particle_hole", &particle_hole),
            ("chiral", &chiral),
        ] {
            if let Some(op) = op {
                if op.nrows() != op.ncols() {
                    return Err(SolverError::InvalidSymmetry(format!(
                        "{} must be a square matrix",
                        name
                    )));
                }
            }
        }
        if let Some(projectors) = &projectors {
            let n = projectors.first().map_or(0, |p| p.nrows());
            if projectors.iter().any(|p| p.nrows() != n) {
                return Err(SolverError::InvalidSymmetry(
                    "projectors must all have the same number of rows".into(),
                ));
            }
            let mut total = Array2::<Complex64>::zeros((n, n));
            for p in projectors {
                total = total + p.dot(&dagger(p.view()));
            }
            if !is_close(total.view(), Array2::<Complex64>::eye(n).view(), 1.0) {
                return Err(SolverError::InvalidSymmetry(
                    "projectors must be orthogonal and complete".into(),
                ));
            }
        }
        Ok(Self {
            projectors,
            time_reversal,
            particle_hole,
            chiral,
        })
    }

    /// Whether no symmetry is declared.
    pub fn is_trivial(&self) -> bool {
        self.projectors.is_none()
            && self.time_reversal.is_none()
            && self.particle_hole.is_none()
            && self.chiral.is_none()
    }

    /// Stop declaring the given symmetry.
    pub fn disable(&mut self, which: BrokenSymmetry) {
        match which {
            BrokenSymmetry::ConservationLaw => self.projectors = None,
            BrokenSymmetry::TimeReversal => self.time_reversal = None,
            BrokenSymmetry::ParticleHole => self.particle_hole = None,
            BrokenSymmetry::Chiral => self.chiral = None,
        }
    }

    /// Check the declared symmetries against `matrix`.
    ///
    /// Rectangular matrices (inter-cell hoppings) are padded with zeros to
    /// a square matrix before the checks. Returns the broken symmetries in
    /// the order conservation law, time reversal, particle-hole, chiral.
    pub fn validate(&self, matrix: ArrayView2<'_, Complex64>) -> Result<Vec<BrokenSymmetry>, SolverError> {
        let h = pad_square(matrix);
        let n = h.nrows();
        let scale = h.iter().fold(1.0_f64, |m, z| m.max(z.norm()));
        let mut broken = Vec::new();

        if let Some(projectors) = &self.projectors {
            for p in projectors {
                check_rows("projector", p.view(), n)?;
            }
            let conserved = projectors.iter().enumerate().all(|(i, pi)| {
                let left = dagger(pi.view()).dot(&h);
                projectors.iter().enumerate().all(|(j, pj)| {
                    i == j
                        || left
                            .dot(pj)
                            .iter()
                            .all(|z| z.norm() <= VALIDATION_TOL * scale)
                })
            });
            if !conserved {
                broken.push(BrokenSymmetry::ConservationLaw);
            }
        }

        let h_conj = h.mapv(|z| z.conj());
        let checks = [
            (BrokenSymmetry::TimeReversal, &self.time_reversal, &h_conj, 1.0),
            (BrokenSymmetry::ParticleHole, &self.particle_hole, &h_conj, -1.0),
            (BrokenSymmetry::Chiral, &self.chiral, &h, -1.0),
        ];
        for (which, op, source, sign) in checks {
            let Some(op) = op else { continue };
            check_rows(which.name(), op.view(), n)?;
            let transformed = op.dot(source).dot(&dagger(op.view()));
            let target = h.mapv(|z| z * sign);
            if !is_close(transformed.view(), target.view(), scale) {
                broken.push(which);
            }
        }
        Ok(broken)
    }
}

fn check_rows(what: &str, op: ArrayView2<'_, Complex64>, n: usize) -> Result<(), SolverError> {
    if op.nrows() != n {
        return Err(SolverError::Dimension {
            what: what.to_string(),
            expected: (n, op.ncols()),
            found: op.dim(),
        });
    }
    Ok(())
}

fn pad_square(matrix: ArrayView2<'_, Complex64>) -> Array2<Complex64> {
    let (rows, cols) = matrix.dim();
    if rows == cols {
        return matrix.to_owned();
    }
    let n = rows.max(cols);
    let mut out = Array2::zeros((n, n));
    out.slice_mut(s![..rows, ..cols]).assign(&matrix);
    out
}

fn is_close(a: ArrayView2<'_, Complex64>, b: ArrayView2<'_, Complex64>, scale: f64) -> bool {
    a.dim() == b.dim()
        && a.iter()
            .zip(b.iter())
            .all(|(x, y)| (x - y).norm() <= VALIDATION_TOL * scale)
}
