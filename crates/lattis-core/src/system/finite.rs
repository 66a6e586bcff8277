//! Finite systems with attached leads.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use ndarray::Array2;
use num_complex::Complex64;

use super::{InfiniteSystem, PrecalculatedLead, System, SystemError};
use crate::physics::{BrokenSymmetry, LeadSolver, ModeDecomposition};
use crate::types::Params;

/// A lead that only knows its self-energy.
pub trait SelfEnergyLead: Send + Sync {
    fn selfenergy(&self, energy: f64, params: &Params) -> Result<Array2<Complex64>, SystemError>;

    fn parameters(&self) -> &BTreeSet<String>;
}

/// A lead attached to a finite system.
#[derive(Clone)]
pub enum Lead {
    /// A periodic system; modes and self-energy come from the lead solver.
    Infinite(Arc<dyn InfiniteSystem>),
    /// Values frozen by [`FiniteSystem::precalculate`].
    Precalculated(PrecalculatedLead),
    /// A lead described by its self-energy alone.
    SelfEnergyOnly(Arc<dyn SelfEnergyLead>),
}

impl Lead {
    /// Whether the lead can only provide a self-energy.
    pub fn is_selfenergy_lead(&self) -> bool {
        matches!(self, Lead::SelfEnergyOnly(_))
    }

    pub fn modes(
        &self,
        solver: &dyn LeadSolver,
        energy: f64,
        params: &Params,
    ) -> Result<ModeDecomposition, SystemError> {
        match self {
            Lead::Infinite(syst) => syst.modes(solver, energy, params),
            Lead::Precalculated(lead) => lead.modes().cloned(),
            Lead::SelfEnergyOnly(_) => Err(SystemError::Usage(
                "lead provides only a self-energy, not modes".into(),
            )),
        }
    }

    pub fn selfenergy(
        &self,
        solver: &dyn LeadSolver,
        energy: f64,
        params: &Params,
    ) -> Result<Array2<Complex64>, SystemError> {
        match self {
            Lead::Infinite(syst) => syst.selfenergy(solver, energy, params),
            Lead::Precalculated(lead) => lead.selfenergy().cloned(),
            Lead::SelfEnergyOnly(lead) => lead.selfenergy(energy, params),
        }
    }

    /// Parameters the lead depends on.
    pub fn parameters(&self) -> &BTreeSet<String> {
        match self {
            Lead::Infinite(syst) => syst.parameters(),
            Lead::Precalculated(lead) => lead.parameters(),
            Lead::SelfEnergyOnly(lead) => lead.parameters(),
        }
    }
}

impl fmt::Debug for Lead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lead::Infinite(syst) => write!(f, "Lead::Infinite({})", syst.describe()),
            Lead::Precalculated(lead) => write!(f, "Lead::Precalculated({:?})", lead),
            Lead::SelfEnergyOnly(_) => f.write_str("Lead::SelfEnergyOnly"),
        }
    }
}

/// What [`FiniteSystem::precalculate`] computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrecalculateWhat {
    #[default]
    Modes,
    SelfEnergy,
    All,
}

impl PrecalculateWhat {
    fn wants_modes(self) -> bool {
        matches!(self, PrecalculateWhat::Modes | PrecalculateWhat::All)
    }

    fn wants_selfenergy(self) -> bool {
        matches!(self, PrecalculateWhat::SelfEnergy | PrecalculateWhat::All)
    }
}

impl FromStr for PrecalculateWhat {
    type Err = SystemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "modes" => Ok(PrecalculateWhat::Modes),
            "selfenergy" => Ok(PrecalculateWhat::SelfEnergy),
            "all" => Ok(PrecalculateWhat::All),
            other => Err(SystemError::Usage(format!(
                "Invalid value of argument 'what': {}",
                other
            ))),
        }
    }
}

impl fmt::Display for PrecalculateWhat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PrecalculateWhat::Modes => "modes",
            PrecalculateWhat::SelfEnergy => "selfenergy",
            PrecalculateWhat::All => "all",
        })
    }
}

/// A finite system, possibly with leads.
///
/// `lead_interfaces[n]` lists the system sites lead `n` connects to;
/// `lead_paddings[n]` lists the system sites that belong to lead `n`.
pub trait FiniteSystem: System {
    fn leads(&self) -> &[Lead];

    fn lead_interfaces(&self) -> &[Vec<usize>];

    fn lead_paddings(&self) -> &[Vec<usize>];

    /// A copy that shares everything with `self` except the leads.
    fn with_leads(&self, leads: Vec<Lead>) -> Result<Self, SystemError>
    where
        Self: Sized;

    /// Precalculate modes and/or self-energies of the selected leads
    /// (`None` selects all) at `energy`.
    ///
    /// Returns a copy of the system in which the selected leads are
    /// replaced by [`PrecalculatedLead`]s; `self` is left untouched. With
    /// [`PrecalculateWhat::All`] the self-energy is derived from the modes,
    /// not computed by a second solver call.
    fn precalculate(
        &self,
        solver: &dyn LeadSolver,
        energy: f64,
        leads: Option<&[usize]>,
        what: PrecalculateWhat,
        params: &Params,
    ) -> Result<Self, SystemError>
    where
        Self: Sized,
    {
        let num_leads = self.leads().len();
        if let Some(&bad) = leads.and_then(|l| l.iter().find(|&&n| n >= num_leads)) {
            return Err(SystemError::Usage(format!(
                "lead index {} out of range for a system with {} leads",
                bad, num_leads
            )));
        }
        let selected = |n: usize| leads.map_or(true, |l| l.contains(&n));
        log::debug!(
            "precalculating {} for leads {:?} at energy {}",
            what,
            (0..num_leads).filter(|&n| selected(n)).collect::<Vec<_>>(),
            energy
        );

        let mut new_leads = Vec::with_capacity(num_leads);
        for (n, lead) in self.leads().iter().enumerate() {
            if !selected(n) {
                new_leads.push(lead.clone());
                continue;
            }
            let modes = if what.wants_modes() {
                Some(lead.modes(solver, energy, params)?)
            } else {
                None
            };
            let selfenergy = if what.wants_selfenergy() {
                Some(match &modes {
                    Some((_, stabilized)) => stabilized.selfenergy()?,
                    None => lead.selfenergy(solver, energy, params)?,
                })
            } else {
                None
            };
            new_leads.push(Lead::Precalculated(PrecalculatedLead::new(modes, selfenergy)?));
        }
        self.with_leads(new_leads)
    }

    /// Symmetries broken by the full Hamiltonian.
    fn validate_symmetries(&self, params: &Params) -> Result<Vec<BrokenSymmetry>, SystemError> {
        let symmetries = self.discrete_symmetry(params)?;
        let ham = self.hamiltonian_submatrix(None, None, params)?;
        Ok(symmetries.validate(ham.view())?)
    }
}
