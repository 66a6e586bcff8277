//! Vectorized systems: sites stored as site arrays, Hamiltonian stored as
//! terms that each cover a whole block of matrix elements.

use std::collections::HashMap;
use std::ops::Range;

use ndarray::{Array1, Array3, ArrayD, Ix2, Ix3};
use num_complex::Complex64;

use super::assembly::{Blocks, PlacedBlock};
use super::{System, SystemError};
use crate::site::SiteArray;
use crate::symmetry::Symmetry;
use crate::types::{MatrixBlocks, Params, SiteRange, SiteRanges};

/// A bulk hopping pattern between two site arrays.
///
/// Element `k` connects site `to_offsets[k]` of `site_arrays[to_array]` with
/// site `from_offsets[k]` of `site_arrays[from_array]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subgraph {
    pub to_array: usize,
    pub from_array: usize,
    pub to_offsets: Vec<usize>,
    pub from_offsets: Vec<usize>,
}

impl Subgraph {
    pub fn new(
        (to_array, from_array): (usize, usize),
        (to_offsets, from_offsets): (Vec<usize>, Vec<usize>),
    ) -> Result<Self, SystemError> {
        if to_offsets.len() != from_offsets.len() {
            return Err(SystemError::Usage(format!(
                "subgraph offsets differ in length: {} vs {}",
                to_offsets.len(),
                from_offsets.len()
            )));
        }
        Ok(Self {
            to_array,
            from_array,
            to_offsets,
            from_offsets,
        })
    }

    pub fn len(&self) -> usize {
        self.to_offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_offsets.is_empty()
    }
}

/// One block-structured group of matrix elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Term {
    /// Index into the system's subgraphs.
    pub subgraph: usize,
    /// Group element applied to the to-sites; zero for elements within the
    /// fundamental domain.
    pub symmetry_element: Array1<i64>,
    /// Whether the Hermitian conjugate must be added during assembly.
    pub hermitian: bool,
    /// Parameters consumed by the term's value function.
    pub parameters: Vec<String>,
}

impl Term {
    pub fn is_identity(&self) -> bool {
        self.symmetry_element.iter().all(|&g| g == 0)
    }
}

/// Which elements of a term to evaluate.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selector {
    #[default]
    All,
    Range(Range<usize>),
    Indices(Vec<usize>),
}

impl Selector {
    /// Element indices selected out of `len`.
    pub fn resolve(&self, len: usize) -> Result<Vec<usize>, SystemError> {
        let out_of_range = |k: usize| {
            SystemError::Usage(format!("selector index {} out of range for a term with {} elements", k, len))
        };
        match self {
            Selector::All => Ok((0..len).collect()),
            Selector::Range(r) => {
                if r.end > len {
                    return Err(out_of_range(r.end.saturating_sub(1)));
                }
                Ok(r.clone().collect())
            }
            Selector::Indices(idx) => match idx.iter().find(|&&k| k >= len) {
                Some(&k) => Err(out_of_range(k)),
                None => Ok(idx.clone()),
            },
        }
    }
}

/// A system whose sites are site arrays and whose Hamiltonian is a list of
/// terms.
pub trait VectorizedSystem: System {
    fn symmetry(&self) -> &dyn Symmetry;

    fn site_arrays(&self) -> &[SiteArray];

    fn subgraphs(&self) -> &[Subgraph];

    fn terms(&self) -> &[Term];

    /// Evaluate term `index` at the selected elements.
    ///
    /// Returns an array of shape `(count, norbs_to, norbs_from)`.
    fn hamiltonian_term(
        &self,
        index: usize,
        selector: &Selector,
        params: &Params,
    ) -> Result<Array3<Complex64>, SystemError>;
}

/// Broadcast values returned by a value function into `(count, rows, cols)`.
///
/// Shapes are interpreted in the order scalar, vector, matrix, stack:
///
/// - a scalar becomes `count` copies of a `1x1` block;
/// - a vector becomes one `1x1` block per entry;
/// - a matrix is tiled `count` times;
/// - a 3-D array must already have the expected shape.
///
/// Anything else is a shape error that names `calling_function` when given.
pub fn normalize_matrix_blocks(
    blocks: MatrixBlocks,
    expected: (usize, usize, usize),
    calling_function: Option<&str>,
) -> Result<Array3<Complex64>, SystemError> {
    let original: Vec<usize> = blocks.shape().to_vec();
    let arr: ArrayD<Complex64> = blocks.0;
    let count = expected.0;

    let mismatch = |found: Vec<usize>, broadcast: bool| {
        let mut context = String::new();
        if broadcast {
            context.push_str(&format!(" (broadcasted from shape {:?})", original));
        }
        if let Some(name) = calling_function {
            context.push_str(&format!(" when evaluating {}", name));
        }
        SystemError::Shape {
            expected: vec![expected.0, expected.1, expected.2],
            found,
            context,
        }
    };

    let (normalized, broadcast) = match arr.ndim() {
        0 => {
            let x = arr.iter().next().copied().unwrap_or_default();
            (Array3::from_elem((count, 1, 1), x), true)
        }
        1 => {
            let n = arr.len();
            let flat: Vec<Complex64> = arr.iter().copied().collect();
            let stacked = Array3::from_shape_vec((n, 1, 1), flat)
                .map_err(|_| mismatch(original.clone(), true))?;
            (stacked, true)
        }
        2 => {
            let m = arr
                .into_dimensionality::<Ix2>()
                .map_err(|_| mismatch(original.clone(), false))?;
            let (r, c) = m.dim();
            (Array3::from_shape_fn((count, r, c), |(_, i, j)| m[[i, j]]), true)
        }
        3 => {
            let stack = arr
                .into_dimensionality::<Ix3>()
                .map_err(|_| mismatch(original.clone(), false))?;
            (stack, false)
        }
        _ => return Err(mismatch(original.clone(), false)),
    };

    if normalized.dim() != expected {
        return Err(mismatch(normalized.shape().to_vec(), broadcast));
    }
    Ok(normalized)
}

/// Index of the first site of every site array, plus the total.
pub(crate) fn site_offsets(site_arrays: &[SiteArray]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(site_arrays.len() + 1);
    let mut total = 0;
    offsets.push(0);
    for arr in site_arrays {
        total += arr.len();
        offsets.push(total);
    }
    offsets
}

/// Site ranges derived from site arrays: one run per array plus the
/// sentinel.
///
/// Every array must be non-empty and its family must declare `norbs`.
pub(crate) fn site_ranges_from_arrays(site_arrays: &[SiteArray]) -> Result<SiteRanges, SystemError> {
    let mut rows = Vec::with_capacity(site_arrays.len() + 1);
    let (mut site, mut orb) = (0, 0);
    for arr in site_arrays {
        let norbs = arr.family().norbs().ok_or_else(|| {
            SystemError::Usage(format!(
                "site family {} of a vectorized system must declare norbs",
                arr.family()
            ))
        })?;
        rows.push(SiteRange {
            first_site: site,
            norbs,
            orb_offset: orb,
        });
        site += arr.len();
        orb += arr.len() * norbs;
    }
    rows.push(SiteRange {
        first_site: site,
        norbs: 0,
        orb_offset: orb,
    });
    SiteRanges::new(rows)
}

/// How a term contributes to a block of the Hamiltonian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Placement {
    /// `H[to, from] += h`
    Direct,
    /// `H[from, to] += h†`
    Conjugate,
    /// Both of the above.
    Both,
}

impl Placement {
    fn direct(self) -> bool {
        matches!(self, Placement::Direct | Placement::Both)
    }

    fn conjugate(self) -> bool {
        matches!(self, Placement::Conjugate | Placement::Both)
    }
}

/// Placement of a term within the fundamental domain Hamiltonian.
pub(crate) fn cell_placement(term: &Term) -> Option<Placement> {
    if !term.is_identity() {
        return None;
    }
    Some(if term.hermitian {
        Placement::Both
    } else {
        Placement::Direct
    })
}

/// Collect the blocks of `H[rows, cols]` contributed by terms, where
/// `placement` decides how each term contributes. Onsite elements of
/// identity terms never receive a conjugate; for other terms `to == from`
/// pairs a site with its own image in another cell.
///
/// Rows and columns are global site indices into the site arrays and must
/// not repeat. Only the elements that land inside the selection are
/// evaluated.
pub(crate) fn collect_term_blocks<S, P>(
    syst: &S,
    rows: &[usize],
    cols: &[usize],
    params: &Params,
    placement: P,
) -> Result<Blocks, SystemError>
where
    S: VectorizedSystem + ?Sized,
    P: Fn(&Term) -> Option<Placement>,
{
    let ranges = syst
        .site_ranges()
        .ok_or_else(|| SystemError::Usage("vectorized system without site ranges".into()))?;
    let layout = |sites: &[usize]| -> Result<(HashMap<usize, usize>, usize), SystemError> {
        let mut map = HashMap::with_capacity(sites.len());
        let mut total = 0;
        for &s in sites {
            let n = ranges.norbs(s).ok_or(SystemError::SiteOutOfRange {
                index: s,
                num_sites: ranges.num_sites(),
            })?;
            if map.insert(s, total).is_some() {
                return Err(SystemError::Usage(format!("site {} is selected more than once", s)));
            }
            total += n;
        }
        Ok((map, total))
    };
    let (row_map, num_rows) = layout(rows)?;
    let (col_map, num_cols) = layout(cols)?;
    let offsets = site_offsets(syst.site_arrays());

    let mut blocks = Vec::new();
    for (index, term) in syst.terms().iter().enumerate() {
        let Some(place) = placement(term) else { continue };
        let sg = &syst.subgraphs()[term.subgraph];
        let (to_base, from_base) = (offsets[sg.to_array], offsets[sg.from_array]);
        let identity = term.is_identity();

        let mut selected = Vec::new();
        let mut targets = Vec::new();
        for k in 0..sg.len() {
            let to = to_base + sg.to_offsets[k];
            let from = from_base + sg.from_offsets[k];
            let direct = place.direct().then(|| (row_map.get(&to), col_map.get(&from)));
            let onsite = identity && to == from;
            let conjugate = (place.conjugate() && !onsite)
                .then(|| (row_map.get(&from), col_map.get(&to)));
            let direct = match direct {
                Some((Some(&r), Some(&c))) => Some((r, c)),
                _ => None,
            };
            let conjugate = match conjugate {
                Some((Some(&r), Some(&c))) => Some((r, c)),
                _ => None,
            };
            if direct.is_some() || conjugate.is_some() {
                selected.push(k);
                targets.push((direct, conjugate));
            }
        }
        if selected.is_empty() {
            continue;
        }

        let selector = if selected.len() == sg.len() {
            Selector::All
        } else {
            Selector::Indices(selected)
        };
        let values = syst.hamiltonian_term(index, &selector, params)?;
        for (h, (direct, conjugate)) in values.outer_iter().zip(targets) {
            if let Some((row, col)) = direct {
                blocks.push(PlacedBlock {
                    row,
                    col,
                    block: h.to_owned(),
                });
            }
            if let Some((row, col)) = conjugate {
                blocks.push(PlacedBlock {
                    row,
                    col,
                    block: crate::physics::dagger(h),
                });
            }
        }
    }

    log::debug!(
        "assembled {} term blocks for a {}x{} submatrix",
        blocks.len(),
        num_rows,
        num_cols
    );
    Ok(Blocks {
        shape: (num_rows, num_cols),
        blocks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::SiteFamily;
    use ndarray::{array, Array2};

    fn c(re: f64) -> Complex64 {
        Complex64::new(re, 0.0)
    }

    #[test]
    fn test_scalar_broadcasts_to_count() {
        let out = normalize_matrix_blocks(5.0_f64.into(), (3, 1, 1), None).unwrap();
        assert_eq!(out.dim(), (3, 1, 1));
        assert!(out.iter().all(|&z| z == c(5.0)));
    }

    #[test]
    fn test_vector_becomes_one_by_one_blocks() {
        let out = normalize_matrix_blocks(array![1.0_f64, 2.0, 3.0].into(), (3, 1, 1), None).unwrap();
        assert_eq!(out, array![[[c(1.0)]], [[c(2.0)]], [[c(3.0)]]]);
    }

    #[test]
    fn test_matrix_is_tiled() {
        let eye: Array2<f64> = Array2::eye(2);
        let out = normalize_matrix_blocks(eye.into(), (4, 2, 2), None).unwrap();
        assert_eq!(out.dim(), (4, 2, 2));
        for block in out.outer_iter() {
            assert_eq!(block, Array2::<Complex64>::eye(2));
        }
    }

    #[test]
    fn test_square_matrix_with_matching_count_is_still_tiled() {
        let m = array![[1.0_f64, 2.0], [3.0, 4.0]];
        let out = normalize_matrix_blocks(m.into(), (2, 2, 2), None).unwrap();
        assert_eq!(out[[0, 1, 0]], c(3.0));
        assert_eq!(out[[1, 1, 0]], c(3.0));
    }

    #[test]
    fn test_exact_stack_passes_through() {
        let stack = Array3::from_shape_fn((2, 1, 2), |(k, _, j)| c((k * 2 + j) as f64));
        let out = normalize_matrix_blocks(stack.clone().into(), (2, 1, 2), None).unwrap();
        assert_eq!(out, stack);
    }

    #[test]
    fn test_mismatch_names_function() {
        let eye: Array2<f64> = Array2::eye(2);
        let err = normalize_matrix_blocks(eye.into(), (3, 2, 3), Some("hopping")).unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, SystemError::Shape { .. }));
        assert!(msg.contains("[3, 2, 3]"), "{}", msg);
        assert!(msg.contains("broadcasted from shape [2, 2]"), "{}", msg);
        assert!(msg.contains("when evaluating hopping"), "{}", msg);
    }

    #[test]
    fn test_vector_length_mismatch() {
        let err = normalize_matrix_blocks(array![1.0_f64, 2.0].into(), (3, 1, 1), None);
        assert!(err.is_err());
    }

    #[test]
    fn test_selector_resolution() {
        assert_eq!(Selector::All.resolve(3).unwrap(), vec![0, 1, 2]);
        assert_eq!(Selector::Range(1..3).resolve(3).unwrap(), vec![1, 2]);
        assert!(Selector::Range(1..4).resolve(3).is_err());
        assert!(Selector::Indices(vec![0, 5]).resolve(3).is_err());
    }

    #[test]
    fn test_site_ranges_from_arrays() {
        let a = SiteFamily::integer("a", 1, 2).unwrap();
        let b = SiteFamily::integer("b", 1, 1).unwrap();
        let arrays = vec![
            SiteArray::new(a, (0..5_i64).map(|x| [x]).collect::<Vec<_>>().into()).unwrap(),
            SiteArray::new(b, array![[0], [1], [2]]).unwrap(),
        ];
        let ranges = site_ranges_from_arrays(&arrays).unwrap();
        let rows: Vec<_> = ranges
            .rows()
            .iter()
            .map(|r| (r.first_site, r.norbs, r.orb_offset))
            .collect();
        assert_eq!(rows, vec![(0, 2, 0), (5, 1, 10), (8, 0, 13)]);
        assert_eq!(site_offsets(&arrays), vec![0, 5, 8]);
    }

    #[test]
    fn test_subgraph_lengths_must_match() {
        assert!(Subgraph::new((0, 0), (vec![0, 1], vec![1])).is_err());
        let sg = Subgraph::new((0, 1), (vec![0, 1], vec![1, 0])).unwrap();
        assert_eq!(sg.len(), 2);
    }
}
