//! Concrete finalized systems.
//!
//! These hold the output of a lattice construction step: explicit sites or
//! site arrays, the Hamiltonian values attached to them, and (for finite
//! systems) the attached leads. Immutable data sits behind `Arc` so that
//! [`crate::system::FiniteSystem::precalculate`] only copies the lead list.

pub mod tight_binding;
pub mod vectorized;

pub use tight_binding::{TightBindingLead, TightBindingSystem};
pub use vectorized::{FiniteVectorizedSystem, InfiniteVectorizedSystem, TermSpec};

use std::sync::Arc;

use crate::system::{Lead, SystemError};

/// Leads of a finite system with their interface and padding sites.
#[derive(Debug, Clone, Default)]
pub(crate) struct LeadSet {
    pub leads: Vec<Lead>,
    pub interfaces: Arc<Vec<Vec<usize>>>,
    pub paddings: Arc<Vec<Vec<usize>>>,
}

impl LeadSet {
    pub fn attach(
        &mut self,
        num_sites: usize,
        lead: Lead,
        interface: Vec<usize>,
        padding: Vec<usize>,
    ) -> Result<(), SystemError> {
        if let Some(&bad) = interface.iter().chain(&padding).find(|&&s| s >= num_sites) {
            return Err(SystemError::SiteOutOfRange {
                index: bad,
                num_sites,
            });
        }
        self.leads.push(lead);
        Arc::make_mut(&mut self.interfaces).push(interface);
        Arc::make_mut(&mut self.paddings).push(padding);
        Ok(())
    }

    /// Same interfaces and paddings, new leads.
    pub fn replace(&self, leads: Vec<Lead>) -> Result<Self, SystemError> {
        if leads.len() != self.leads.len() {
            return Err(SystemError::Usage(format!(
                "expected {} leads, got {}",
                self.leads.len(),
                leads.len()
            )));
        }
        Ok(Self {
            leads,
            interfaces: Arc::clone(&self.interfaces),
            paddings: Arc::clone(&self.paddings),
        })
    }
}
