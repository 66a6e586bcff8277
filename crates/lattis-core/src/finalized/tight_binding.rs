//! Per-site tight-binding systems.
//!
//! Every site carries an optional onsite value and every hopping a value;
//! matrix elements are evaluated one pair at a time. Hoppings are stored
//! once and the reverse direction is the Hermitian conjugate.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use ndarray::{arr1, Array2, Ix2};
use num_complex::Complex64;

use super::LeadSet;
use crate::graph::Graph;
use crate::physics::{dagger, DiscreteSymmetry};
use crate::site::Site;
use crate::symmetry::Symmetry;
use crate::system::{
    normalize_matrix_blocks, FiniteSystem, InfiniteSystem, Lead, System, SystemError, SystemKind,
};
use crate::types::{MatrixBlocks, Params, SiteRanges};
use crate::value::SiteValue;

/// Immutable data shared by copies of a per-site system.
struct SiteGraph {
    sites: Vec<Site>,
    index: HashMap<Site, usize>,
    graph: Graph,
    onsites: Vec<Option<SiteValue>>,
    /// Keyed by `(to, from)` as supplied.
    hoppings: HashMap<(usize, usize), SiteValue>,
    site_ranges: Option<SiteRanges>,
    parameters: BTreeSet<String>,
    discrete_symmetry: DiscreteSymmetry,
}

impl SiteGraph {
    fn new(
        sites: Vec<Site>,
        onsites: Vec<(usize, SiteValue)>,
        hoppings: Vec<(usize, usize, SiteValue)>,
    ) -> Result<Self, SystemError> {
        let n = sites.len();
        let mut index = HashMap::with_capacity(n);
        for (i, site) in sites.iter().enumerate() {
            if index.insert(site.clone(), i).is_some() {
                return Err(SystemError::Usage(format!("duplicate site {}", site)));
            }
        }

        let mut parameters = BTreeSet::new();
        let mut onsite_values = vec![None; n];
        for (i, value) in onsites {
            let slot = onsite_values
                .get_mut(i)
                .ok_or(SystemError::SiteOutOfRange { index: i, num_sites: n })?;
            if slot.is_some() {
                return Err(SystemError::Usage(format!("onsite of site {} given twice", i)));
            }
            parameters.extend(value.parameters().iter().cloned());
            *slot = Some(value);
        }

        let mut edges = Vec::with_capacity(2 * hoppings.len());
        let mut hopping_values = HashMap::with_capacity(hoppings.len());
        for (to, from, value) in hoppings {
            if to == from {
                return Err(SystemError::Usage(format!(
                    "hopping from site {} to itself; use an onsite value",
                    to
                )));
            }
            edges.push((to, from));
            edges.push((from, to));
            parameters.extend(value.parameters().iter().cloned());
            hopping_values.insert((to, from), value);
        }
        let graph = Graph::from_edges(n, edges)?;

        let site_ranges = sites
            .iter()
            .map(|s| s.family().norbs())
            .collect::<Option<Vec<usize>>>()
            .map(SiteRanges::from_norbs)
            .transpose()?;

        Ok(Self {
            sites,
            index,
            graph,
            onsites: onsite_values,
            hoppings: hopping_values,
            site_ranges,
            parameters,
            discrete_symmetry: DiscreteSymmetry::default(),
        })
    }

    fn check_index(&self, i: usize) -> Result<(), SystemError> {
        if i >= self.sites.len() {
            return Err(SystemError::SiteOutOfRange {
                index: i,
                num_sites: self.sites.len(),
            });
        }
        Ok(())
    }

    /// Shape a single matrix element, broadcasting scalars.
    fn block(
        &self,
        value: &SiteValue,
        result: MatrixBlocks,
        to: usize,
        from: usize,
    ) -> Result<Array2<Complex64>, SystemError> {
        let expected = self
            .site_ranges
            .as_ref()
            .and_then(|r| Some((r.norbs(to)?, r.norbs(from)?)));
        match expected {
            Some((p, q)) => {
                let blocks = normalize_matrix_blocks(result, (1, p, q), value.function_name())?;
                Ok(blocks.index_axis_move(ndarray::Axis(0), 0))
            }
            // Without declared orbital counts the value decides its shape.
            None => match result.0.ndim() {
                0 => Ok(Array2::from_elem((1, 1), result.0.iter().copied().next().unwrap_or_default())),
                2 => result.0.into_dimensionality::<Ix2>().map_err(|_| SystemError::Usage(
                    "matrix element is not two-dimensional".into(),
                )),
                _ => Err(SystemError::Shape {
                    expected: vec![],
                    found: result.shape().to_vec(),
                    context: format!(" for the matrix element between sites {} and {}", to, from),
                }),
            },
        }
    }

    fn hamiltonian(&self, i: usize, j: usize, params: &Params) -> Result<Array2<Complex64>, SystemError> {
        self.check_index(i)?;
        self.check_index(j)?;
        if i == j {
            return match &self.onsites[i] {
                Some(value) => {
                    let site = &self.sites[i];
                    self.block(value, value.evaluate(site, site, params)?, i, i)
                }
                None => {
                    let n = self.site_ranges.as_ref().and_then(|r| r.norbs(i)).unwrap_or(1);
                    Ok(Array2::zeros((n, n)))
                }
            };
        }
        if let Some(value) = self.hoppings.get(&(i, j)) {
            let result = value.evaluate(&self.sites[i], &self.sites[j], params)?;
            return self.block(value, result, i, j);
        }
        if let Some(value) = self.hoppings.get(&(j, i)) {
            let result = value.evaluate(&self.sites[j], &self.sites[i], params)?;
            return Ok(dagger(self.block(value, result, j, i)?.view()));
        }
        Err(SystemError::NoSuchHopping(i, j))
    }
}

/// A finite per-site system with optional leads.
#[derive(Clone)]
pub struct TightBindingSystem {
    data: Arc<SiteGraph>,
    leads: LeadSet,
}

impl TightBindingSystem {
    /// Build a system from explicit sites, onsite values `(site, value)`,
    /// and hoppings `(to, from, value)`.
    pub fn new(
        sites: Vec<Site>,
        onsites: Vec<(usize, SiteValue)>,
        hoppings: Vec<(usize, usize, SiteValue)>,
    ) -> Result<Self, SystemError> {
        Ok(Self {
            data: Arc::new(SiteGraph::new(sites, onsites, hoppings)?),
            leads: LeadSet::default(),
        })
    }

    /// Declare discrete symmetries. Only valid before leads are attached,
    /// while the data is not yet shared.
    pub fn with_discrete_symmetry(mut self, symmetry: DiscreteSymmetry) -> Result<Self, SystemError> {
        let data = Arc::get_mut(&mut self.data)
            .ok_or_else(|| SystemError::Usage("system data is already shared".into()))?;
        data.discrete_symmetry = symmetry;
        Ok(self)
    }

    /// Attach a lead connected to `interface` sites.
    pub fn attach_lead(
        mut self,
        lead: Lead,
        interface: Vec<usize>,
        padding: Vec<usize>,
    ) -> Result<Self, SystemError> {
        self.leads.attach(self.data.sites.len(), lead, interface, padding)?;
        Ok(self)
    }

    pub fn sites(&self) -> &[Site] {
        &self.data.sites
    }

    pub fn site_index(&self, site: &Site) -> Option<usize> {
        self.data.index.get(site).copied()
    }

    /// Whether two systems share their site data.
    pub fn shares_data_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl System for TightBindingSystem {
    fn graph(&self) -> &Graph {
        &self.data.graph
    }

    fn site_ranges(&self) -> Option<&SiteRanges> {
        self.data.site_ranges.as_ref()
    }

    fn parameters(&self) -> &BTreeSet<String> {
        &self.data.parameters
    }

    fn hamiltonian(&self, i: usize, j: usize, params: &Params) -> Result<Array2<Complex64>, SystemError> {
        self.data.hamiltonian(i, j, params)
    }

    fn discrete_symmetry(&self, _params: &Params) -> Result<DiscreteSymmetry, SystemError> {
        Ok(self.data.discrete_symmetry.clone())
    }

    fn kind(&self) -> SystemKind {
        SystemKind::Finite
    }

    fn type_name(&self) -> &'static str {
        "TightBindingSystem"
    }
}

impl FiniteSystem for TightBindingSystem {
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
            data: Arc::clone(&self.data),
            leads: self.leads.replace(leads)?,
        })
    }
}

/// An infinite per-site system: one cell followed by the interface sites
/// of the previous cell.
#[derive(Clone)]
pub struct TightBindingLead {
    data: Arc<SiteGraph>,
    symmetry: Arc<dyn Symmetry>,
    cell_size: usize,
}

impl TightBindingLead {
    /// Build a lead from `sites`, whose first `cell_size` entries form the
    /// cell (inside the fundamental domain) and whose remaining entries are
    /// the previous-cell images of a prefix of the cell.
    pub fn new(
        symmetry: Arc<dyn Symmetry>,
        sites: Vec<Site>,
        cell_size: usize,
        onsites: Vec<(usize, SiteValue)>,
        hoppings: Vec<(usize, usize, SiteValue)>,
    ) -> Result<Self, SystemError> {
        if symmetry.num_directions() != 1 {
            return Err(SystemError::Usage(format!(
                "a lead needs a symmetry with one direction, got {}",
                symmetry.num_directions()
            )));
        }
        let n = sites.len();
        if cell_size > n || n - cell_size > cell_size {
            return Err(SystemError::Usage(format!(
                "cell of {} sites cannot have {} interface sites",
                cell_size,
                n.saturating_sub(cell_size)
            )));
        }
        for site in &sites[..cell_size] {
            if !symmetry.in_fd(site)? {
                return Err(SystemError::Usage(format!(
                    "cell site {} is outside the fundamental domain",
                    site
                )));
            }
        }
        let previous = arr1(&[-1_i64]);
        for (k, site) in sites[cell_size..].iter().enumerate() {
            if symmetry.act(previous.view(), &sites[k])? != *site {
                return Err(SystemError::Usage(format!(
                    "interface site {} is not the previous-cell image of cell site {}",
                    site, sites[k]
                )));
            }
        }
        let interface_onsite = onsites.iter().find(|(i, _)| *i >= cell_size);
        if let Some((i, _)) = interface_onsite {
            return Err(SystemError::Usage(format!(
                "onsite given for interface site {}; it is taken from the cell",
                i
            )));
        }
        Ok(Self {
            data: Arc::new(SiteGraph::new(sites, onsites, hoppings)?),
            symmetry,
            cell_size,
        })
    }

    pub fn with_discrete_symmetry(mut self, symmetry: DiscreteSymmetry) -> Result<Self, SystemError> {
        let data = Arc::get_mut(&mut self.data)
            .ok_or_else(|| SystemError::Usage("lead data is already shared".into()))?;
        data.discrete_symmetry = symmetry;
        Ok(self)
    }

    pub fn symmetry(&self) -> &dyn Symmetry {
        self.symmetry.as_ref()
    }

    pub fn sites(&self) -> &[Site] {
        &self.data.sites
    }
}

impl System for TightBindingLead {
    fn graph(&self) -> &Graph {
        &self.data.graph
    }

    fn site_ranges(&self) -> Option<&SiteRanges> {
        self.data.site_ranges.as_ref()
    }

    fn parameters(&self) -> &BTreeSet<String> {
        &self.data.parameters
    }

    /// Elements between two interface sites are those of the cell sites
    /// they alias.
    fn hamiltonian(&self, i: usize, j: usize, params: &Params) -> Result<Array2<Complex64>, SystemError> {
        let c = self.cell_size;
        if i >= c && j >= c {
            self.data.check_index(i)?;
            self.data.check_index(j)?;
            return self.data.hamiltonian(i - c, j - c, params);
        }
        self.data.hamiltonian(i, j, params)
    }

    fn discrete_symmetry(&self, _params: &Params) -> Result<DiscreteSymmetry, SystemError> {
        Ok(self.data.discrete_symmetry.clone())
    }

    fn kind(&self) -> SystemKind {
        SystemKind::Infinite
    }

    fn type_name(&self) -> &'static str {
        "TightBindingLead"
    }
}

impl InfiniteSystem for TightBindingLead {
    fn cell_size(&self) -> usize {
        self.cell_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::SiteFamily;
    use crate::symmetry::TranslationalSymmetry;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn chain(n: i64) -> (SiteFamily, Vec<Site>) {
        let fam = SiteFamily::integer("chain", 1, 1).unwrap();
        let sites = (0..n).map(|x| fam.site(&[x]).unwrap()).collect();
        (fam, sites)
    }

    fn hopping(t: &str) -> SiteValue {
        let name = t.to_string();
        SiteValue::hopping("hop", &[t], move |_, _, p| Ok((-p.require(&name)?).into()))
    }

    #[test]
    fn test_hamiltonian_elements_and_conjugate() {
        let (_, sites) = chain(3);
        let syst = TightBindingSystem::new(
            sites,
            vec![(0, SiteValue::constant(1.0)), (1, SiteValue::constant(2.0))],
            vec![
                (1, 0, SiteValue::constant(Complex64::new(0.0, 1.0))),
                (2, 1, hopping("t")),
            ],
        )
        .unwrap();
        let params = Params::from([("t", 0.5)]);
        assert_eq!(syst.hamiltonian(0, 0, &params).unwrap(), array![[Complex64::new(1.0, 0.0)]]);
        assert_eq!(syst.hamiltonian(1, 0, &params).unwrap()[[0, 0]], Complex64::new(0.0, 1.0));
        assert_eq!(syst.hamiltonian(0, 1, &params).unwrap()[[0, 0]], Complex64::new(0.0, -1.0));
        assert_eq!(syst.hamiltonian(1, 2, &params).unwrap()[[0, 0]], Complex64::new(-0.5, 0.0));
        // Missing onsite is zero.
        assert_eq!(syst.hamiltonian(2, 2, &params).unwrap()[[0, 0]], Complex64::new(0.0, 0.0));
        assert!(matches!(
            syst.hamiltonian(0, 2, &params),
            Err(SystemError::NoSuchHopping(0, 2))
        ));
        assert!(matches!(
            syst.hamiltonian(1, 2, &Params::new()),
            Err(SystemError::MissingParameter(_))
        ));
    }

    #[test]
    fn test_submatrix_is_hermitian() {
        let (_, sites) = chain(4);
        let hoppings = (1..4).map(|i| (i, i - 1, hopping("t"))).collect();
        let onsites = (0..4).map(|i| (i, SiteValue::constant(i as f64))).collect();
        let syst = TightBindingSystem::new(sites, onsites, hoppings).unwrap();
        let h = syst
            .hamiltonian_submatrix(None, None, &Params::from([("t", 1.0)]))
            .unwrap();
        assert_eq!(h.dim(), (4, 4));
        for i in 0..4 {
            for j in 0..4 {
                assert_abs_diff_eq!((h[[i, j]] - h[[j, i]].conj()).norm(), 0.0, epsilon = 1e-14);
            }
        }
        assert_eq!(h[[2, 2]], Complex64::new(2.0, 0.0));
        assert_eq!(h[[3, 2]], Complex64::new(-1.0, 0.0));
        assert_eq!(h[[0, 3]], Complex64::new(0.0, 0.0));
        assert_eq!(syst.graph().num_edges(), 6);
        assert_eq!(
            syst.describe(),
            "<TightBindingSystem with 4 sites, 6 hoppings, and parameters: (t)>"
        );
    }

    #[test]
    fn test_wrong_block_shape_is_reported() {
        let fam = SiteFamily::integer("spinful", 1, 2).unwrap();
        let sites = vec![fam.site(&[0]).unwrap()];
        let bad = SiteValue::onsite("onsite", &[], |_, _| {
            Ok(Array2::<f64>::eye(3).into())
        });
        let syst = TightBindingSystem::new(sites, vec![(0, bad)], vec![]).unwrap();
        let err = syst.hamiltonian(0, 0, &Params::new()).unwrap_err();
        assert!(matches!(err, SystemError::Shape { .. }));
        assert!(err.to_string().contains("onsite"), "{}", err);
    }

    #[test]
    fn test_duplicate_hopping_rejected() {
        let (_, sites) = chain(2);
        let result = TightBindingSystem::new(
            sites,
            vec![],
            vec![(1, 0, SiteValue::constant(1.0)), (0, 1, SiteValue::constant(1.0))],
        );
        assert!(matches!(result, Err(SystemError::Graph(_))));
    }

    #[test]
    fn test_lead_cell_and_hopping() {
        let (fam, _) = chain(0);
        let sym: Arc<dyn Symmetry> = Arc::new(TranslationalSymmetry::new(array![[1]]).unwrap());
        let sites = vec![fam.site(&[0]).unwrap(), fam.site(&[-1]).unwrap()];
        let lead = TightBindingLead::new(
            sym,
            sites,
            1,
            vec![(0, SiteValue::constant(0.5))],
            vec![(0, 1, hopping("t"))],
        )
        .unwrap();
        let params = Params::from([("t", 2.0)]);
        let ham = lead.cell_hamiltonian(&params).unwrap();
        let hop = lead.inter_cell_hopping(&params).unwrap();
        assert_eq!(ham, array![[Complex64::new(0.5, 0.0)]]);
        assert_eq!(hop, array![[Complex64::new(-2.0, 0.0)]]);
        // The interface site aliases the cell site.
        assert_eq!(lead.hamiltonian(1, 1, &params).unwrap(), ham);
        assert!(lead.kind().is_infinite());
    }

    #[test]
    fn test_lead_rejects_misplaced_interface() {
        let (fam, _) = chain(0);
        let sym: Arc<dyn Symmetry> = Arc::new(TranslationalSymmetry::new(array![[1]]).unwrap());
        let sites = vec![fam.site(&[0]).unwrap(), fam.site(&[1]).unwrap()];
        let result = TightBindingLead::new(sym, sites, 1, vec![], vec![]);
        assert!(matches!(result, Err(SystemError::Usage(_))));
    }
}
