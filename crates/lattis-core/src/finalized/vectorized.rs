//! Vectorized finite and infinite systems.
//!
//! Sites are stored as site arrays; the Hamiltonian is a list of terms, each
//! evaluated for a whole block of matrix elements by one call to its value
//! function.
//!
//! In an infinite system the site arrays hold the fundamental domain (one
//! cell). A term with symmetry element `+1` describes hoppings from the
//! previous cell into the cell; one with element `-1` describes the reverse
//! direction. The site arrays on the previous-cell side of those terms are
//! the interface and must come first.

use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, OnceLock};

use ndarray::{Array1, Array2, Array3, Axis};
use num_complex::Complex64;
use sprs::CsMat;

use super::LeadSet;
use crate::graph::Graph;
use crate::physics::{dagger, DiscreteSymmetry};
use crate::site::SiteArray;
use crate::symmetry::{NoSymmetry, Symmetry};
use crate::system::assembly::{to_dense, to_sparse, Blocks};
use crate::system::vectorized::{
    cell_placement, collect_term_blocks, site_offsets, site_ranges_from_arrays, Placement,
};
use crate::system::{
    normalize_matrix_blocks, FiniteSystem, InfiniteSystem, Lead, Selector, Subgraph, System,
    SystemError, SystemKind, Term, VectorizedSystem,
};
use crate::types::{Params, SiteRanges};
use crate::value::ArrayValue;

/// A term together with its value, as supplied to the constructors.
#[derive(Debug, Clone)]
pub struct TermSpec {
    pub subgraph: usize,
    pub symmetry_element: Array1<i64>,
    pub hermitian: bool,
    pub value: ArrayValue,
}

impl TermSpec {
    /// A term inside the fundamental domain.
    pub fn new(subgraph: usize, hermitian: bool, value: ArrayValue) -> Self {
        Self {
            subgraph,
            symmetry_element: Array1::zeros(0),
            hermitian,
            value,
        }
    }

    /// A term whose to-sites are moved by `element`.
    pub fn with_element(mut self, element: Array1<i64>) -> Self {
        self.symmetry_element = element;
        self
    }
}

/// Immutable data shared by copies of a vectorized system.
struct TermTable {
    symmetry: Arc<dyn Symmetry>,
    site_arrays: Vec<SiteArray>,
    offsets: Vec<usize>,
    subgraphs: Vec<Subgraph>,
    terms: Vec<Term>,
    values: Vec<ArrayValue>,
    graph: Graph,
    parameters: BTreeSet<String>,
    discrete_symmetry: DiscreteSymmetry,
    site_ranges: OnceLock<Option<SiteRanges>>,
}

impl TermTable {
    fn new(
        symmetry: Arc<dyn Symmetry>,
        site_arrays: Vec<SiteArray>,
        subgraphs: Vec<Subgraph>,
        specs: Vec<TermSpec>,
    ) -> Result<Self, SystemError> {
        for arr in &site_arrays {
            if arr.is_empty() {
                return Err(SystemError::Usage("site arrays must not be empty".into()));
            }
            if arr.family().norbs().is_none() {
                return Err(SystemError::Usage(format!(
                    "site family {} of a vectorized system must declare norbs",
                    arr.family()
                )));
            }
        }
        for sg in &subgraphs {
            for (array, offsets) in [(sg.to_array, &sg.to_offsets), (sg.from_array, &sg.from_offsets)] {
                let len = site_arrays
                    .get(array)
                    .map(SiteArray::len)
                    .ok_or_else(|| SystemError::Usage(format!("subgraph refers to site array {}", array)))?;
                if offsets.iter().any(|&o| o >= len) {
                    return Err(SystemError::Usage(format!(
                        "subgraph offset out of range for site array {} of {} sites",
                        array, len
                    )));
                }
            }
        }

        let mut terms = Vec::with_capacity(specs.len());
        let mut values = Vec::with_capacity(specs.len());
        let mut parameters = BTreeSet::new();
        for spec in specs {
            if spec.subgraph >= subgraphs.len() {
                return Err(SystemError::Usage(format!(
                    "term refers to subgraph {} of {}",
                    spec.subgraph,
                    subgraphs.len()
                )));
            }
            if spec.symmetry_element.len() != symmetry.num_directions() {
                return Err(crate::symmetry::SymmetryError::ElementLength {
                    expected: symmetry.num_directions(),
                    found: spec.symmetry_element.len(),
                }
                .into());
            }
            let term_params: Vec<String> = spec.value.parameters().to_vec();
            parameters.extend(term_params.iter().cloned());
            terms.push(Term {
                subgraph: spec.subgraph,
                symmetry_element: spec.symmetry_element,
                hermitian: spec.hermitian,
                parameters: term_params,
            });
            values.push(spec.value);
        }

        let offsets = site_offsets(&site_arrays);
        Ok(Self {
            symmetry,
            site_arrays,
            offsets,
            subgraphs,
            terms,
            values,
            graph: Graph::default(),
            parameters,
            discrete_symmetry: DiscreteSymmetry::default(),
            site_ranges: OnceLock::new(),
        })
    }

    fn num_sites(&self) -> usize {
        self.offsets.last().copied().unwrap_or(0)
    }

    /// Global `(to, from)` site indices of every element of a term.
    fn term_pairs<'a>(&'a self, term: &'a Term) -> impl Iterator<Item = (usize, usize)> + 'a {
        let sg = &self.subgraphs[term.subgraph];
        let (to_base, from_base) = (self.offsets[sg.to_array], self.offsets[sg.from_array]);
        sg.to_offsets
            .iter()
            .zip(&sg.from_offsets)
            .map(move |(&t, &f)| (to_base + t, from_base + f))
    }

    fn site_ranges(&self) -> Option<&SiteRanges> {
        self.site_ranges
            .get_or_init(|| site_ranges_from_arrays(&self.site_arrays).ok())
            .as_ref()
    }

    fn hamiltonian_term(
        &self,
        index: usize,
        selector: &Selector,
        params: &Params,
    ) -> Result<Array3<Complex64>, SystemError> {
        let term = self.terms.get(index).ok_or_else(|| {
            SystemError::Usage(format!("no term {} in a system of {} terms", index, self.terms.len()))
        })?;
        let value = &self.values[index];
        let sg = &self.subgraphs[term.subgraph];
        let selected = selector.resolve(sg.len())?;

        let pick = |array: usize, offsets: &[usize]| -> Result<SiteArray, SystemError> {
            let chosen: Vec<usize> = selected.iter().map(|&k| offsets[k]).collect();
            self.site_arrays[array]
                .select(&chosen)
                .ok_or_else(|| SystemError::Usage("subgraph offset out of range".into()))
        };
        let mut to_sites = pick(sg.to_array, &sg.to_offsets)?;
        let from_sites = pick(sg.from_array, &sg.from_offsets)?;
        if !term.is_identity() {
            let element = term.symmetry_element.view().insert_axis(Axis(0));
            to_sites = self.symmetry.act_array(element, &to_sites)?;
        }

        let norbs = |array: usize| self.site_arrays[array].family().norbs().unwrap_or(0);
        let blocks = value.evaluate(&to_sites, &from_sites, params)?;
        normalize_matrix_blocks(
            blocks,
            (selected.len(), norbs(sg.to_array), norbs(sg.from_array)),
            value.function_name(),
        )
    }
}

/// Graph edges of the terms inside the fundamental domain.
fn cell_edges(table: &TermTable, edges: &mut HashSet<(usize, usize)>) {
    for term in table.terms.iter().filter(|t| t.is_identity()) {
        for (to, from) in table.term_pairs(term) {
            if to == from {
                continue;
            }
            edges.insert((to, from));
            if term.hermitian {
                edges.insert((from, to));
            }
        }
    }
}

fn build_graph(num_nodes: usize, edges: HashSet<(usize, usize)>) -> Result<Graph, SystemError> {
    Ok(Graph::from_edges(num_nodes, edges)?)
}

/// A finite vectorized system with optional leads.
#[derive(Clone)]
pub struct FiniteVectorizedSystem {
    table: Arc<TermTable>,
    leads: LeadSet,
}

impl FiniteVectorizedSystem {
    pub fn new(
        site_arrays: Vec<SiteArray>,
        subgraphs: Vec<Subgraph>,
        terms: Vec<TermSpec>,
    ) -> Result<Self, SystemError> {
        let mut table = TermTable::new(Arc::new(NoSymmetry), site_arrays, subgraphs, terms)?;
        let mut edges = HashSet::new();
        cell_edges(&table, &mut edges);
        table.graph = build_graph(table.num_sites(), edges)?;
        Ok(Self {
            table: Arc::new(table),
            leads: LeadSet::default(),
        })
    }

    pub fn with_discrete_symmetry(mut self, symmetry: DiscreteSymmetry) -> Result<Self, SystemError> {
        let table = Arc::get_mut(&mut self.table)
            .ok_or_else(|| SystemError::Usage("system data is already shared".into()))?;
        table.discrete_symmetry = symmetry;
        Ok(self)
    }

    pub fn attach_lead(
        mut self,
        lead: Lead,
        interface: Vec<usize>,
        padding: Vec<usize>,
    ) -> Result<Self, SystemError> {
        self.leads.attach(self.table.num_sites(), lead, interface, padding)?;
        Ok(self)
    }

    /// Whether two systems share their term data.
    pub fn shares_data_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.table, &other.table)
    }
}

impl System for FiniteVectorizedSystem {
    fn graph(&self) -> &Graph {
        &self.table.graph
    }

    fn site_ranges(&self) -> Option<&SiteRanges> {
        self.table.site_ranges()
    }

    fn parameters(&self) -> &BTreeSet<String> {
        &self.table.parameters
    }

    fn hamiltonian(&self, i: usize, j: usize, params: &Params) -> Result<Array2<Complex64>, SystemError> {
        let blocks = collect_term_blocks(self, &[i], &[j], params, cell_placement)?;
        if blocks.blocks.is_empty() && i != j {
            return Err(SystemError::NoSuchHopping(i, j));
        }
        Ok(to_dense(&blocks))
    }

    fn discrete_symmetry(&self, _params: &Params) -> Result<DiscreteSymmetry, SystemError> {
        Ok(self.table.discrete_symmetry.clone())
    }

    fn hamiltonian_submatrix(
        &self,
        rows: Option<&[usize]>,
        cols: Option<&[usize]>,
        params: &Params,
    ) -> Result<Array2<Complex64>, SystemError> {
        Ok(to_dense(&self.submatrix_blocks(rows, cols, params)?))
    }

    fn hamiltonian_submatrix_sparse(
        &self,
        rows: Option<&[usize]>,
        cols: Option<&[usize]>,
        params: &Params,
    ) -> Result<CsMat<Complex64>, SystemError> {
        Ok(to_sparse(&self.submatrix_blocks(rows, cols, params)?))
    }

    fn kind(&self) -> SystemKind {
        SystemKind::FiniteVectorized
    }

    fn type_name(&self) -> &'static str {
        "FiniteVectorizedSystem"
    }
}

impl FiniteVectorizedSystem {
    fn submatrix_blocks(
        &self,
        rows: Option<&[usize]>,
        cols: Option<&[usize]>,
        params: &Params,
    ) -> Result<Blocks, SystemError> {
        let all: Vec<usize> = (0..self.table.num_sites()).collect();
        collect_term_blocks(
            self,
            rows.unwrap_or(&all),
            cols.unwrap_or(&all),
            params,
            cell_placement,
        )
    }
}

impl VectorizedSystem for FiniteVectorizedSystem {
    fn symmetry(&self) -> &dyn Symmetry {
        self.table.symmetry.as_ref()
    }

    fn site_arrays(&self) -> &[SiteArray] {
        &self.table.site_arrays
    }

    fn subgraphs(&self) -> &[Subgraph] {
        &self.table.subgraphs
    }

    fn terms(&self) -> &[Term] {
        &self.table.terms
    }

    fn hamiltonian_term(
        &self,
        index: usize,
        selector: &Selector,
        params: &Params,
    ) -> Result<Array3<Complex64>, SystemError> {
        self.table.hamiltonian_term(index, selector, params)
    }
}

impl FiniteSystem for FiniteVectorizedSystem {
    fn leads(&self) -> &[Lead] {
        &self.leads.leads
    }

    fn lead_interfaces(&self) -> &[Vec<usize>] {
        &self.leads.interfaces
    }

    fn lead_paddings(&self) -> &[Vec<usize>] {
        &self.leads.paddings
    }

    fn with_leads(&self, leads: Vec<Lead>) -> Result<Self, SystemError> {
        Ok(Self {
            table: Arc::clone(&self.table),
            leads: self.leads.replace(leads)?,
        })
    }
}

/// Placement of a term within the inter-cell hopping.
fn inter_cell_placement(term: &Term) -> Option<Placement> {
    match term.symmetry_element.as_slice() {
        Some([1]) => Some(Placement::Direct),
        Some([-1]) if term.hermitian => Some(Placement::Conjugate),
        _ => None,
    }
}

/// A vectorized lead: the fundamental domain is one cell.
#[derive(Clone)]
pub struct InfiniteVectorizedSystem {
    table: Arc<TermTable>,
    cell_size: usize,
    num_interface: usize,
}

impl InfiniteVectorizedSystem {
    /// Build a lead over a one-direction symmetry.
    ///
    /// All site arrays must lie in the fundamental domain, every symmetry
    /// element must be `0`, `+1` or `-1`, and the site arrays on the
    /// previous-cell side of inter-cell terms must form a prefix of
    /// `site_arrays`.
    pub fn new(
        symmetry: Arc<dyn Symmetry>,
        site_arrays: Vec<SiteArray>,
        subgraphs: Vec<Subgraph>,
        terms: Vec<TermSpec>,
    ) -> Result<Self, SystemError> {
        if symmetry.num_directions() != 1 {
            return Err(SystemError::Usage(format!(
                "a vectorized lead needs a symmetry with one direction, got {}",
                symmetry.num_directions()
            )));
        }
        for arr in &site_arrays {
            if symmetry.in_fd_array(arr)?.iter().any(|&inside| !inside) {
                return Err(SystemError::Usage(format!(
                    "{} is not inside the fundamental domain",
                    arr
                )));
            }
        }
        let mut table = TermTable::new(symmetry, site_arrays, subgraphs, terms)?;

        let mut interface_arrays = BTreeSet::new();
        for term in &table.terms {
            let sg = &table.subgraphs[term.subgraph];
            match term.symmetry_element[0] {
                0 => {}
                1 => {
                    interface_arrays.insert(sg.from_array);
                }
                -1 => {
                    interface_arrays.insert(sg.to_array);
                }
                g => {
                    return Err(SystemError::Usage(format!(
                        "only nearest-cell hoppings are supported, got symmetry element {}",
                        g
                    )))
                }
            }
        }
        if interface_arrays.iter().enumerate().any(|(k, &a)| k != a) {
            return Err(SystemError::Usage(
                "interface site arrays must come before all other site arrays".into(),
            ));
        }

        let cell_size = table.num_sites();
        let num_interface = table.offsets[interface_arrays.len()];
        let mut edges = HashSet::new();
        cell_edges(&table, &mut edges);
        for term in &table.terms {
            let g = term.symmetry_element[0];
            for (to, from) in table.term_pairs(term) {
                let (cell, previous) = match g {
                    1 => (to, from),
                    -1 => (from, to),
                    _ => continue,
                };
                edges.insert((cell, cell_size + previous));
                edges.insert((cell_size + previous, cell));
            }
        }
        table.graph = build_graph(cell_size + num_interface, edges)?;

        Ok(Self {
            table: Arc::new(table),
            cell_size,
            num_interface,
        })
    }

    pub fn with_discrete_symmetry(mut self, symmetry: DiscreteSymmetry) -> Result<Self, SystemError> {
        let table = Arc::get_mut(&mut self.table)
            .ok_or_else(|| SystemError::Usage("lead data is already shared".into()))?;
        table.discrete_symmetry = symmetry;
        Ok(self)
    }

    fn check_index(&self, i: usize) -> Result<(), SystemError> {
        let num_sites = self.cell_size + self.num_interface;
        if i >= num_sites {
            return Err(SystemError::SiteOutOfRange { index: i, num_sites });
        }
        Ok(())
    }

    fn cell(&self) -> Vec<usize> {
        (0..self.cell_size).collect()
    }

    fn interface(&self) -> Vec<usize> {
        (0..self.num_interface).collect()
    }
}

impl System for InfiniteVectorizedSystem {
    fn graph(&self) -> &Graph {
        &self.table.graph
    }

    /// Orbital bookkeeping of the cell; interface sites alias a prefix of it.
    fn site_ranges(&self) -> Option<&SiteRanges> {
        self.table.site_ranges()
    }

    fn parameters(&self) -> &BTreeSet<String> {
        &self.table.parameters
    }

    fn hamiltonian(&self, i: usize, j: usize, params: &Params) -> Result<Array2<Complex64>, SystemError> {
        self.check_index(i)?;
        self.check_index(j)?;
        let c = self.cell_size;
        match (i < c, j < c) {
            (true, true) => {
                let blocks = collect_term_blocks(self, &[i], &[j], params, cell_placement)?;
                if blocks.blocks.is_empty() && i != j {
                    return Err(SystemError::NoSuchHopping(i, j));
                }
                Ok(to_dense(&blocks))
            }
            (true, false) => {
                let blocks = collect_term_blocks(self, &[i], &[j - c], params, inter_cell_placement)?;
                if blocks.blocks.is_empty() {
                    return Err(SystemError::NoSuchHopping(i, j));
                }
                Ok(to_dense(&blocks))
            }
            (false, true) => Ok(dagger(self.hamiltonian(j, i, params)?.view())),
            (false, false) => self.hamiltonian(i - c, j - c, params),
        }
    }

    fn discrete_symmetry(&self, _params: &Params) -> Result<DiscreteSymmetry, SystemError> {
        Ok(self.table.discrete_symmetry.clone())
    }

    /// Not meaningful for infinite systems.
    fn hamiltonian_submatrix(
        &self,
        _rows: Option<&[usize]>,
        _cols: Option<&[usize]>,
        _params: &Params,
    ) -> Result<Array2<Complex64>, SystemError> {
        Err(submatrix_usage())
    }

    fn hamiltonian_submatrix_sparse(
        &self,
        _rows: Option<&[usize]>,
        _cols: Option<&[usize]>,
        _params: &Params,
    ) -> Result<CsMat<Complex64>, SystemError> {
        Err(submatrix_usage())
    }

    fn kind(&self) -> SystemKind {
        SystemKind::InfiniteVectorized
    }

    fn type_name(&self) -> &'static str {
        "InfiniteVectorizedSystem"
    }
}

fn submatrix_usage() -> SystemError {
    SystemError::Usage(
        "'hamiltonian_submatrix' is not meaningful for infinite systems. \
         Use 'cell_hamiltonian' or 'inter_cell_hopping'."
            .into(),
    )
}

impl VectorizedSystem for InfiniteVectorizedSystem {
    fn symmetry(&self) -> &dyn Symmetry {
        self.table.symmetry.as_ref()
    }

    fn site_arrays(&self) -> &[SiteArray] {
        &self.table.site_arrays
    }

    fn subgraphs(&self) -> &[Subgraph] {
        &self.table.subgraphs
    }

    fn terms(&self) -> &[Term] {
        &self.table.terms
    }

    fn hamiltonian_term(
        &self,
        index: usize,
        selector: &Selector,
        params: &Params,
    ) -> Result<Array3<Complex64>, SystemError> {
        self.table.hamiltonian_term(index, selector, params)
    }
}

impl InfiniteSystem for InfiniteVectorizedSystem {
    fn cell_size(&self) -> usize {
        self.cell_size
    }

    fn cell_hamiltonian(&self, params: &Params) -> Result<Array2<Complex64>, SystemError> {
        let cell = self.cell();
        Ok(to_dense(&collect_term_blocks(self, &cell, &cell, params, cell_placement)?))
    }

    fn cell_hamiltonian_sparse(&self, params: &Params) -> Result<CsMat<Complex64>, SystemError> {
        let cell = self.cell();
        Ok(to_sparse(&collect_term_blocks(self, &cell, &cell, params, cell_placement)?))
    }

    fn inter_cell_hopping(&self, params: &Params) -> Result<Array2<Complex64>, SystemError> {
        let blocks = collect_term_blocks(self, &self.cell(), &self.interface(), params, inter_cell_placement)?;
        Ok(to_dense(&blocks))
    }

    fn inter_cell_hopping_sparse(&self, params: &Params) -> Result<CsMat<Complex64>, SystemError> {
        let blocks = collect_term_blocks(self, &self.cell(), &self.interface(), params, inter_cell_placement)?;
        Ok(to_sparse(&blocks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::SiteFamily;
    use crate::symmetry::TranslationalSymmetry;
    use ndarray::array;

    fn c(re: f64) -> Complex64 {
        Complex64::new(re, 0.0)
    }

    fn hopping_t() -> ArrayValue {
        ArrayValue::hopping("hopping", &["t"], |to: &SiteArray, _: &SiteArray, p: &Params| {
            Ok(Array1::from_elem(to.len(), -p.require("t")?).into())
        })
    }

    fn chain(n: i64) -> FiniteVectorizedSystem {
        let fam = SiteFamily::integer("a", 1, 1).unwrap();
        let tags: Array2<i64> = Array2::from_shape_fn((n as usize, 1), |(i, _)| i as i64);
        let arr = SiteArray::new(fam, tags).unwrap();
        let n = n as usize;
        let onsite = Subgraph::new((0, 0), ((0..n).collect(), (0..n).collect())).unwrap();
        let hop = Subgraph::new((0, 0), ((1..n).collect(), (0..n - 1).collect())).unwrap();
        FiniteVectorizedSystem::new(
            vec![arr],
            vec![onsite, hop],
            vec![
                TermSpec::new(0, false, ArrayValue::constant(1.0)),
                TermSpec::new(1, true, hopping_t()),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_finite_submatrix() {
        let syst = chain(4);
        let params = Params::from([("t", 2.0)]);
        let h = syst.hamiltonian_submatrix(None, None, &params).unwrap();
        assert_eq!(h.dim(), (4, 4));
        for i in 0..4 {
            assert_eq!(h[[i, i]], c(1.0));
        }
        for i in 1..4 {
            assert_eq!(h[[i, i - 1]], c(-2.0));
            assert_eq!(h[[i - 1, i]], c(-2.0));
        }
        assert_eq!(h[[0, 3]], c(0.0));
        assert_eq!(syst.graph().num_edges(), 6);
        assert_eq!(syst.parameters().iter().collect::<Vec<_>>(), vec!["t"]);
    }

    #[test]
    fn test_finite_elements() {
        let syst = chain(3);
        let params = Params::from([("t", 1.5)]);
        assert_eq!(syst.hamiltonian(0, 0, &params).unwrap(), array![[c(1.0)]]);
        assert_eq!(syst.hamiltonian(2, 1, &params).unwrap(), array![[c(-1.5)]]);
        assert_eq!(syst.hamiltonian(1, 2, &params).unwrap(), array![[c(-1.5)]]);
        assert!(matches!(
            syst.hamiltonian(0, 2, &params),
            Err(SystemError::NoSuchHopping(0, 2))
        ));
    }

    #[test]
    fn test_sparse_matches_dense() {
        let syst = chain(5);
        let params = Params::from([("t", 1.0)]);
        let rows = [1, 3];
        let dense = syst.hamiltonian_submatrix(Some(&rows), None, &params).unwrap();
        let sparse = syst.hamiltonian_submatrix_sparse(Some(&rows), None, &params).unwrap();
        assert_eq!(sparse.to_dense(), dense);
    }

    #[test]
    fn test_hamiltonian_term_selection() {
        let syst = chain(4);
        let params = Params::from([("t", 1.0)]);
        let out = syst.hamiltonian_term(1, &Selector::Range(1..3), &params).unwrap();
        assert_eq!(out.dim(), (2, 1, 1));
        assert!(syst.hamiltonian_term(2, &Selector::All, &params).is_err());
    }

    #[test]
    fn test_missing_parameter() {
        let syst = chain(2);
        let err = syst.hamiltonian_submatrix(None, None, &Params::new()).unwrap_err();
        assert!(matches!(err, SystemError::MissingParameter(_)));
    }

    fn lead_parts() -> (Arc<dyn Symmetry>, SiteArray) {
        let fam = SiteFamily::integer("a", 1, 1).unwrap();
        let sym: Arc<dyn Symmetry> = Arc::new(TranslationalSymmetry::new(array![[1]]).unwrap());
        (sym, SiteArray::new(fam, array![[0]]).unwrap())
    }

    #[test]
    fn test_lead_cell_and_hopping() {
        let (sym, arr) = lead_parts();
        let sg = Subgraph::new((0, 0), (vec![0], vec![0])).unwrap();
        let lead = InfiniteVectorizedSystem::new(
            sym,
            vec![arr],
            vec![sg],
            vec![
                TermSpec::new(0, false, ArrayValue::constant(0.5)).with_element(array![0]),
                TermSpec::new(0, true, hopping_t()).with_element(array![1]),
            ],
        )
        .unwrap();
        let params = Params::from([("t", 2.0)]);
        assert_eq!(lead.cell_size(), 1);
        assert_eq!(lead.graph().num_nodes(), 2);
        assert_eq!(lead.cell_hamiltonian(&params).unwrap(), array![[c(0.5)]]);
        assert_eq!(lead.inter_cell_hopping(&params).unwrap(), array![[c(-2.0)]]);
        assert_eq!(lead.hamiltonian(0, 1, &params).unwrap(), array![[c(-2.0)]]);
        assert_eq!(lead.hamiltonian(1, 0, &params).unwrap(), array![[c(-2.0)]]);
        assert_eq!(lead.hamiltonian(1, 1, &params).unwrap(), array![[c(0.5)]]);
        assert!(matches!(
            lead.hamiltonian_submatrix(None, None, &params),
            Err(SystemError::Usage(_))
        ));
    }

    #[test]
    fn test_lead_backward_element_pairs_site_with_its_image() {
        let (sym, arr) = lead_parts();
        let sg = Subgraph::new((0, 0), (vec![0], vec![0])).unwrap();
        let hop = Complex64::new(-2.0, 0.5);
        let lead = InfiniteVectorizedSystem::new(
            sym,
            vec![arr],
            vec![sg],
            vec![TermSpec::new(0, true, ArrayValue::constant(hop)).with_element(array![-1])],
        )
        .unwrap();
        let params = Params::new();
        assert_eq!(lead.graph().num_edges(), 2);
        assert_eq!(lead.cell_hamiltonian(&params).unwrap(), array![[c(0.0)]]);
        // The term gives H[previous, cell]; the hopping is its conjugate.
        assert_eq!(lead.inter_cell_hopping(&params).unwrap(), array![[hop.conj()]]);
        assert_eq!(lead.hamiltonian(0, 1, &params).unwrap(), array![[hop.conj()]]);
        assert_eq!(lead.hamiltonian(1, 0, &params).unwrap(), array![[hop]]);
    }

    #[test]
    fn test_duplicate_selection_is_rejected() {
        let syst = chain(3);
        let params = Params::from([("t", 1.0)]);
        let err = syst.hamiltonian_submatrix(Some(&[0, 2, 0]), None, &params).unwrap_err();
        assert!(matches!(err, SystemError::Usage(_)));
    }

    #[test]
    fn test_lead_rejects_long_hoppings() {
        let (sym, arr) = lead_parts();
        let sg = Subgraph::new((0, 0), (vec![0], vec![0])).unwrap();
        let result = InfiniteVectorizedSystem::new(
            sym,
            vec![arr],
            vec![sg],
            vec![TermSpec::new(0, true, hopping_t()).with_element(array![2])],
        );
        assert!(matches!(result, Err(SystemError::Usage(_))));
    }

    #[test]
    fn test_lead_interface_must_come_first() {
        let (sym, arr) = lead_parts();
        let fam_b = SiteFamily::integer("b", 1, 1).unwrap();
        let arr_b = SiteArray::new(fam_b, array![[0]]).unwrap();
        let sg = Subgraph::new((0, 1), (vec![0], vec![0])).unwrap();
        let result = InfiniteVectorizedSystem::new(
            sym,
            vec![arr, arr_b],
            vec![sg],
            vec![TermSpec::new(0, true, hopping_t()).with_element(array![1])],
        );
        assert!(matches!(result, Err(SystemError::Usage(_))));
    }

    #[test]
    fn test_lead_site_outside_cell() {
        let (sym, _) = lead_parts();
        let fam = SiteFamily::integer("a", 1, 1).unwrap();
        let arr = SiteArray::new(fam, array![[3]]).unwrap();
        let result = InfiniteVectorizedSystem::new(sym, vec![arr], vec![], vec![]);
        assert!(result.is_err());
    }
}
