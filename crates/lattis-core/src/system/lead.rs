//! Leads whose modes or self-energy were computed ahead of time.

use std::collections::BTreeSet;
use std::sync::Arc;

use ndarray::Array2;
use num_complex::Complex64;

use super::SystemError;
use crate::physics::ModeDecomposition;

/// A frozen snapshot of a lead at one energy and parameter point.
///
/// The values are shared behind `Arc`, so copies of a system holding this
/// lead do not duplicate them. No recomputation is ever attempted.
#[derive(Debug, Clone)]
pub struct PrecalculatedLead {
    modes: Option<Arc<ModeDecomposition>>,
    selfenergy: Option<Arc<Array2<Complex64>>>,
    parameters: BTreeSet<String>,
}

impl PrecalculatedLead {
    /// At least one of `modes` and `selfenergy` must be given.
    pub fn new(
        modes: Option<ModeDecomposition>,
        selfenergy: Option<Array2<Complex64>>,
    ) -> Result<Self, SystemError> {
        if modes.is_none() && selfenergy.is_none() {
            return Err(SystemError::Usage("No precalculated values provided.".into()));
        }
        Ok(Self {
            modes: modes.map(Arc::new),
            selfenergy: selfenergy.map(Arc::new),
            parameters: BTreeSet::new(),
        })
    }

    pub fn modes(&self) -> Result<&ModeDecomposition, SystemError> {
        self.modes
            .as_deref()
            .ok_or(SystemError::NotPrecalculated { what: "modes" })
    }

    pub fn selfenergy(&self) -> Result<&Array2<Complex64>, SystemError> {
        self.selfenergy
            .as_deref()
            .ok_or(SystemError::NotPrecalculated { what: "selfenergy" })
    }

    pub fn has_modes(&self) -> bool {
        self.modes.is_some()
    }

    pub fn has_selfenergy(&self) -> bool {
        self.selfenergy.is_some()
    }

    /// Always empty: the values no longer depend on any parameter.
    pub fn parameters(&self) -> &BTreeSet<String> {
        &self.parameters
    }
}
