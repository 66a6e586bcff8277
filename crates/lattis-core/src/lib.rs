//! # Lattis Core
//!
//! The low-level system layer of a tight-binding toolkit. A lattice
//! construction step produces a *finalized system*: a graph over integer site
//! indices with a Hamiltonian block attached to every node and edge. This
//! crate defines that layer and the operations built on top of it.
//!
//! ## Architecture
//!
//! Every finalized system implements [`system::System`], which provides
//! per-element Hamiltonian access and dense or sparse submatrix assembly.
//! Finite systems ([`system::FiniteSystem`]) carry leads and can freeze their
//! modes or self-energies with [`system::FiniteSystem::precalculate`].
//! Infinite systems ([`system::InfiniteSystem`]) describe one unit cell plus
//! the interface of the previous cell and hand their cell Hamiltonian and
//! inter-cell hopping to a [`physics::LeadSolver`].
//!
//! Vectorized systems ([`system::VectorizedSystem`]) store sites as
//! [`site::SiteArray`]s and the Hamiltonian as terms evaluated a whole block
//! at a time.
//!
//! ## Modules
//!
//! - [`site`]: Site families, sites and site arrays.
//! - [`symmetry`]: Spatial symmetry groups and fundamental domains.
//! - [`types`]: Parameters, orbital bookkeeping, matrix blocks.
//! - [`graph`]: Compressed directed graph of hoppings.
//! - [`value`]: Constant and function-valued Hamiltonian entries.
//! - [`physics`]: Discrete symmetries, lead modes, the lead solver seam.
//! - [`system`]: System traits, assembly and precalculated leads.
//! - [`finalized`]: Concrete per-site and vectorized systems.

pub mod finalized;
pub mod graph;
pub mod physics;
pub mod site;
pub mod symmetry;
pub mod system;
pub mod types;
pub mod value;

pub use finalized::{
    FiniteVectorizedSystem, InfiniteVectorizedSystem, TermSpec, TightBindingLead, TightBindingSystem,
};
pub use physics::{BrokenSymmetry, DiscreteSymmetry, LeadSolver, SolverError};
pub use site::{Site, SiteArray, SiteFamily};
pub use symmetry::{NoSymmetry, Symmetry, TranslationalSymmetry};
pub use system::{
    is_finite, is_infinite, is_vectorized, FiniteSystem, InfiniteSystem, Lead, PrecalculateWhat,
    System, SystemError, SystemKind, VectorizedSystem,
};
pub use types::{MatrixBlocks, Params, SiteRange, SiteRanges};
pub use value::{ArrayValue, SiteValue, Value};
