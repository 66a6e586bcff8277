//! Hamiltonian submatrix assembly for per-site systems.
//!
//! Collects the onsite and hopping blocks between a set of row sites and a
//! set of column sites, checks each block against the declared orbital
//! counts, and packs them at the orbital offsets of the selection:
//!
//! - Diagonal (`i == j`, both selected): onsite block of site `i`
//! - Off-diagonal: hopping block for every graph edge `i -> j`

use std::collections::{HashMap, HashSet};

use ndarray::Array2;
use num_complex::Complex64;
use sprs::{CsMat, TriMat};

use super::{System, SystemError};
use crate::graph::Graph;
use crate::types::Params;

/// A block placed at `(row_offset, col_offset)` of the output matrix.
pub(crate) struct PlacedBlock {
    pub row: usize,
    pub col: usize,
    pub block: Array2<Complex64>,
}

/// Blocks of a submatrix together with its orbital dimensions.
pub(crate) struct Blocks {
    pub shape: (usize, usize),
    pub blocks: Vec<PlacedBlock>,
}

/// Resolve `None` selections to all sites.
pub(crate) fn select_sites(
    graph: &Graph,
    rows: Option<&[usize]>,
    cols: Option<&[usize]>,
) -> (Vec<usize>, Vec<usize>) {
    let all = || (0..graph.num_nodes()).collect::<Vec<_>>();
    (
        rows.map_or_else(all, <[usize]>::to_vec),
        cols.map_or_else(all, <[usize]>::to_vec),
    )
}

/// Reject selections that name a site twice.
pub(crate) fn check_distinct(sites: &[usize]) -> Result<(), SystemError> {
    let mut seen = HashSet::with_capacity(sites.len());
    match sites.iter().find(|&&s| !seen.insert(s)) {
        Some(s) => Err(SystemError::Usage(format!("site {} is selected more than once", s))),
        None => Ok(()),
    }
}

/// Orbital count of every site in `sites`.
///
/// Uses the site ranges when available; otherwise the shape of the onsite
/// block decides.
fn orbital_counts<S: System + ?Sized>(
    syst: &S,
    sites: &[usize],
    params: &Params,
) -> Result<Vec<usize>, SystemError> {
    let num_sites = syst.graph().num_nodes();
    sites
        .iter()
        .map(|&site| {
            if site >= num_sites {
                return Err(SystemError::SiteOutOfRange {
                    index: site,
                    num_sites,
                });
            }
            match syst.site_ranges().and_then(|r| r.norbs(site)) {
                Some(n) => Ok(n),
                None => Ok(syst.hamiltonian(site, site, params)?.nrows()),
            }
        })
        .collect()
}

fn offsets(norbs: &[usize]) -> (Vec<usize>, usize) {
    let mut total = 0;
    let offsets = norbs
        .iter()
        .map(|&n| {
            let start = total;
            total += n;
            start
        })
        .collect();
    (offsets, total)
}

fn check_block(
    block: &Array2<Complex64>,
    expected: (usize, usize),
    i: usize,
    j: usize,
) -> Result<(), SystemError> {
    if block.dim() != expected {
        return Err(SystemError::Shape {
            expected: vec![expected.0, expected.1],
            found: block.shape().to_vec(),
            context: format!(" for the matrix element between sites {} and {}", i, j),
        });
    }
    Ok(())
}

/// Evaluate all blocks of the `rows x cols` submatrix.
pub(crate) fn collect_blocks<S: System + ?Sized>(
    syst: &S,
    rows: &[usize],
    cols: &[usize],
    params: &Params,
) -> Result<Blocks, SystemError> {
    check_distinct(rows)?;
    check_distinct(cols)?;
    let row_norbs = orbital_counts(syst, rows, params)?;
    let col_norbs = orbital_counts(syst, cols, params)?;
    let (row_offsets, num_rows) = offsets(&row_norbs);
    let (col_offsets, num_cols) = offsets(&col_norbs);
    let col_index: HashMap<usize, usize> = cols.iter().enumerate().map(|(k, &c)| (c, k)).collect();

    let mut blocks = Vec::new();
    for (r, &i) in rows.iter().enumerate() {
        let mut push = |j: usize| -> Result<(), SystemError> {
            let Some(&c) = col_index.get(&j) else {
                return Ok(());
            };
            let block = syst.hamiltonian(i, j, params)?;
            check_block(&block, (row_norbs[r], col_norbs[c]), i, j)?;
            blocks.push(PlacedBlock {
                row: row_offsets[r],
                col: col_offsets[c],
                block,
            });
            Ok(())
        };
        push(i)?;
        for &j in syst.graph().out_neighbors(i) {
            if j != i {
                push(j)?;
            }
        }
    }

    log::debug!(
        "assembled {} blocks for a {}x{} submatrix",
        blocks.len(),
        num_rows,
        num_cols
    );
    Ok(Blocks {
        shape: (num_rows, num_cols),
        blocks,
    })
}

/// Pack placed blocks into a dense matrix, summing overlapping entries.
pub(crate) fn to_dense(blocks: &Blocks) -> Array2<Complex64> {
    let mut matrix = Array2::<Complex64>::zeros(blocks.shape);
    for placed in &blocks.blocks {
        let (p, q) = placed.block.dim();
        let mut target = matrix.slice_mut(ndarray::s![placed.row..placed.row + p, placed.col..placed.col + q]);
        target += &placed.block;
    }
    matrix
}

/// Pack placed blocks into a CSR matrix, summing duplicate entries.
pub(crate) fn to_sparse(blocks: &Blocks) -> CsMat<Complex64> {
    let mut triplets = TriMat::new(blocks.shape);
    for placed in &blocks.blocks {
        for ((a, b), &value) in placed.block.indexed_iter() {
            if value != Complex64::new(0.0, 0.0) {
                triplets.add_triplet(placed.row + a, placed.col + b, value);
            }
        }
    }
    triplets.to_csr()
}

pub(crate) fn dense_submatrix<S: System + ?Sized>(
    syst: &S,
    rows: &[usize],
    cols: &[usize],
    params: &Params,
) -> Result<Array2<Complex64>, SystemError> {
    Ok(to_dense(&collect_blocks(syst, rows, cols, params)?))
}

pub(crate) fn sparse_submatrix<S: System + ?Sized>(
    syst: &S,
    rows: &[usize],
    cols: &[usize],
    params: &Params,
) -> Result<CsMat<Complex64>, SystemError> {
    Ok(to_sparse(&collect_blocks(syst, rows, cols, params)?))
}
