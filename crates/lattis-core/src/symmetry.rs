//! Discrete spatial symmetries acting on sites and hoppings.
//!
//! Every symmetry has a fundamental domain: a set of sites from which all
//! other sites are generated by the action of group elements. Group elements
//! are integer vectors of length [`Symmetry::num_directions`]; the identity
//! is the zero vector.
//!
//! Projection onto the fundamental domain is always expressed as
//! `act(-which(a), a)`, so concrete symmetries only implement
//! [`Symmetry::which`] and [`Symmetry::act`] (plus their bulk forms).

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use faer::linalg::solvers::SolverCore;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use thiserror::Error;

use crate::site::{Site, SiteArray, Tag};

/// Errors from inconsistent use of a symmetry.
#[derive(Debug, Error)]
pub enum SymmetryError {
    #[error("`element` must be empty for NoSymmetry")]
    NonTrivialElement,

    #[error("Generators must be empty for NoSymmetry")]
    NonTrivialGenerators,

    #[error("Group element has {found} components, but the symmetry has {expected} directions")]
    ElementLength { expected: usize, found: usize },

    #[error("{elements} group elements given for {sites} sites")]
    ElementCount { elements: usize, sites: usize },

    #[error("Site family {family} is not compatible with the symmetry: {reason}")]
    IncompatibleFamily { family: String, reason: String },

    #[error("Symmetry periods must be linearly independent and nonzero")]
    DegeneratePeriods,
}

/// A discrete group acting on sites.
pub trait Symmetry: fmt::Debug + Send + Sync {
    /// Number of independent generators of the group.
    fn num_directions(&self) -> usize;

    /// The group element that brings the fundamental-domain image of `site`
    /// to `site`.
    fn which(&self, site: &Site) -> Result<Array1<i64>, SymmetryError>;

    /// Bulk form of [`Symmetry::which`], one row per site.
    fn which_array(&self, sites: &SiteArray) -> Result<Array2<i64>, SymmetryError>;

    /// Apply a group element to a site.
    fn act(&self, element: ArrayView1<'_, i64>, site: &Site) -> Result<Site, SymmetryError>;

    /// Apply group elements to a site array. `elements` has either a single
    /// row, applied to every site, or one row per site.
    fn act_array(
        &self,
        elements: ArrayView2<'_, i64>,
        sites: &SiteArray,
    ) -> Result<SiteArray, SymmetryError>;

    /// Apply a group element to the hopping `(a, b)`.
    fn act_hopping(
        &self,
        element: ArrayView1<'_, i64>,
        a: &Site,
        b: &Site,
    ) -> Result<(Site, Site), SymmetryError> {
        Ok((self.act(element, a)?, self.act(element, b)?))
    }

    /// Map a site into the fundamental domain.
    fn to_fd(&self, site: &Site) -> Result<Site, SymmetryError> {
        let element = -self.which(site)?;
        self.act(element.view(), site)
    }

    /// Map a hopping so that its first site lies in the fundamental domain.
    fn to_fd_hopping(&self, a: &Site, b: &Site) -> Result<(Site, Site), SymmetryError> {
        let element = -self.which(a)?;
        self.act_hopping(element.view(), a, b)
    }

    /// Map every site of an array into the fundamental domain.
    fn to_fd_array(&self, sites: &SiteArray) -> Result<SiteArray, SymmetryError> {
        let elements = -self.which_array(sites)?;
        self.act_array(elements.view(), sites)
    }

    /// Whether `site` lies in the fundamental domain.
    fn in_fd(&self, site: &Site) -> Result<bool, SymmetryError> {
        Ok(self.which(site)?.iter().all(|&d| d == 0))
    }

    /// Whether each site of the array lies in the fundamental domain.
    fn in_fd_array(&self, sites: &SiteArray) -> Result<Array1<bool>, SymmetryError> {
        let which = self.which_array(sites)?;
        Ok(which.map_axis(Axis(1), |row| row.iter().all(|&d| d == 0)))
    }

    /// The subgroup generated by the given group elements.
    fn subgroup(&self, generators: &[Array1<i64>]) -> Result<Arc<dyn Symmetry>, SymmetryError>;

    /// Whether `other` is a subgroup of `self`.
    fn has_subgroup(&self, other: &dyn Symmetry) -> bool;

    fn as_any(&self) -> &dyn Any;
}

/// The trivial symmetry group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoSymmetry;

impl Symmetry for NoSymmetry {
    fn num_directions(&self) -> usize {
        0
    }

    fn which(&self, _site: &Site) -> Result<Array1<i64>, SymmetryError> {
        Ok(Array1::zeros(0))
    }

    fn which_array(&self, sites: &SiteArray) -> Result<Array2<i64>, SymmetryError> {
        Ok(Array2::zeros((sites.len(), 0)))
    }

    fn act(&self, element: ArrayView1<'_, i64>, site: &Site) -> Result<Site, SymmetryError> {
        if !element.is_empty() {
            return Err(SymmetryError::NonTrivialElement);
        }
        Ok(site.clone())
    }

    fn act_array(
        &self,
        elements: ArrayView2<'_, i64>,
        sites: &SiteArray,
    ) -> Result<SiteArray, SymmetryError> {
        if elements.ncols() != 0 {
            return Err(SymmetryError::NonTrivialElement);
        }
        Ok(sites.clone())
    }

    fn to_fd(&self, site: &Site) -> Result<Site, SymmetryError> {
        Ok(site.clone())
    }

    fn to_fd_hopping(&self, a: &Site, b: &Site) -> Result<(Site, Site), SymmetryError> {
        Ok((a.clone(), b.clone()))
    }

    fn to_fd_array(&self, sites: &SiteArray) -> Result<SiteArray, SymmetryError> {
        Ok(sites.clone())
    }

    fn in_fd(&self, _site: &Site) -> Result<bool, SymmetryError> {
        Ok(true)
    }

    fn in_fd_array(&self, sites: &SiteArray) -> Result<Array1<bool>, SymmetryError> {
        Ok(Array1::from_elem(sites.len(), true))
    }

    fn subgroup(&self, generators: &[Array1<i64>]) -> Result<Arc<dyn Symmetry>, SymmetryError> {
        if generators.iter().any(|g| !g.is_empty()) {
            return Err(SymmetryError::NonTrivialGenerators);
        }
        Ok(Arc::new(NoSymmetry))
    }

    fn has_subgroup(&self, other: &dyn Symmetry) -> bool {
        other.as_any().is::<NoSymmetry>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Translational symmetry in tag space.
///
/// Each row of `periods` is an integer translation of tags. The fundamental
/// domain consists of the tags whose coordinates along every period lie in
/// `[0, 1)`; components orthogonal to the periods are unconstrained.
#[derive(Debug, Clone)]
pub struct TranslationalSymmetry {
    periods: Array2<i64>,
    /// `periods^T (periods periods^T)^{-1}`, shape `(dim, num_directions)`.
    dual: Array2<f64>,
}

/// Slack when flooring period coordinates.
const FLOOR_EPS: f64 = 1e-9;

impl TranslationalSymmetry {
    /// Create a symmetry from the given periods (one per row).
    pub fn new(periods: Array2<i64>) -> Result<Self, SymmetryError> {
        if periods.nrows() == 0 {
            return Err(SymmetryError::DegeneratePeriods);
        }
        let p = periods.mapv(|x| x as f64);
        let gram = p.dot(&p.t());
        let inv = invert_gram(&gram).ok_or(SymmetryError::DegeneratePeriods)?;
        let dual = p.t().dot(&inv);
        Ok(Self { periods, dual })
    }

    pub fn periods(&self) -> ArrayView2<'_, i64> {
        self.periods.view()
    }

    fn dim(&self) -> usize {
        self.periods.ncols()
    }

    fn check_family(&self, width: usize, site_family: &dyn fmt::Debug) -> Result<(), SymmetryError> {
        if width != self.dim() {
            return Err(SymmetryError::IncompatibleFamily {
                family: format!("{:?}", site_family),
                reason: format!("tags have {} components, periods have {}", width, self.dim()),
            });
        }
        Ok(())
    }

    fn check_element(&self, element: ArrayView1<'_, i64>) -> Result<(), SymmetryError> {
        if element.len() != self.num_directions() {
            return Err(SymmetryError::ElementLength {
                expected: self.num_directions(),
                found: element.len(),
            });
        }
        Ok(())
    }

    fn locate(&self, tag: ArrayView1<'_, i64>) -> Array1<i64> {
        tag.mapv(|x| x as f64)
            .dot(&self.dual)
            .mapv(|c| (c + FLOOR_EPS).floor() as i64)
    }
}

impl PartialEq for TranslationalSymmetry {
    fn eq(&self, other: &Self) -> bool {
        self.periods == other.periods
    }
}

impl Symmetry for TranslationalSymmetry {
    fn num_directions(&self) -> usize {
        self.periods.nrows()
    }

    fn which(&self, site: &Site) -> Result<Array1<i64>, SymmetryError> {
        self.check_family(site.tag().len(), site.family())?;
        Ok(self.locate(ArrayView1::from(site.tag().as_slice())))
    }

    fn which_array(&self, sites: &SiteArray) -> Result<Array2<i64>, SymmetryError> {
        self.check_family(sites.tags().ncols(), sites.family())?;
        let coords = sites.tags().mapv(|x| x as f64).dot(&self.dual);
        Ok(coords.mapv(|c| (c + FLOOR_EPS).floor() as i64))
    }

    fn act(&self, element: ArrayView1<'_, i64>, site: &Site) -> Result<Site, SymmetryError> {
        self.check_element(element)?;
        self.check_family(site.tag().len(), site.family())?;
        let shift = element.dot(&self.periods);
        let tag: Vec<i64> = site.tag().iter().zip(shift.iter()).map(|(t, s)| t + s).collect();
        Ok(Site::from_normalized(site.family().clone(), Tag::from(tag)))
    }

    fn act_array(
        &self,
        elements: ArrayView2<'_, i64>,
        sites: &SiteArray,
    ) -> Result<SiteArray, SymmetryError> {
        if elements.ncols() != self.num_directions() {
            return Err(SymmetryError::ElementLength {
                expected: self.num_directions(),
                found: elements.ncols(),
            });
        }
        if elements.nrows() != 1 && elements.nrows() != sites.len() {
            return Err(SymmetryError::ElementCount {
                elements: elements.nrows(),
                sites: sites.len(),
            });
        }
        self.check_family(sites.tags().ncols(), sites.family())?;
        // A single row broadcasts over all sites.
        let tags = &sites.tags() + &elements.dot(&self.periods);
        Ok(SiteArray::from_normalized(sites.family().clone(), tags))
    }

    fn subgroup(&self, generators: &[Array1<i64>]) -> Result<Arc<dyn Symmetry>, SymmetryError> {
        let mut periods = Array2::zeros((generators.len(), self.dim()));
        for (mut row, g) in periods.outer_iter_mut().zip(generators) {
            self.check_element(g.view())?;
            row.assign(&g.dot(&self.periods));
        }
        Ok(Arc::new(TranslationalSymmetry::new(periods)?))
    }

    fn has_subgroup(&self, other: &dyn Symmetry) -> bool {
        if other.as_any().is::<NoSymmetry>() {
            return true;
        }
        let Some(other) = other.as_any().downcast_ref::<TranslationalSymmetry>() else {
            return false;
        };
        if other.dim() != self.dim() {
            return false;
        }
        other.periods.outer_iter().all(|q| {
            let coords = q.mapv(|x| x as f64).dot(&self.dual);
            let rounded = coords.mapv(|c| c.round() as i64);
            rounded.dot(&self.periods) == q
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Inverse of the Gram matrix of the periods by LU factorization. `None` if
/// the periods are linearly dependent.
fn invert_gram(gram: &Array2<f64>) -> Option<Array2<f64>> {
    let n = gram.nrows();
    let lu = faer::Mat::<f64>::from_fn(n, n, |i, j| gram[[i, j]]).partial_piv_lu();
    let faer_inv = lu.inverse();
    let inv = Array2::from_shape_fn((n, n), |(i, j)| faer_inv.read(i, j));
    if inv.iter().any(|x| !x.is_finite()) {
        return None;
    }
    let residual = gram.dot(&inv) - Array2::<f64>::eye(n);
    residual.iter().all(|x| x.abs() < GRAM_TOL).then_some(inv)
}

/// Largest accepted deviation of `gram * inv` from the identity.
const GRAM_TOL: f64 = 1e-9;
