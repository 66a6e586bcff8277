//! Hamiltonian assembly across per-site and vectorized systems.

use std::sync::Arc;

use approx::assert_abs_diff_eq;
use lattis_core::site::SiteArray;
use lattis_core::system::{Subgraph, VectorizedSystem, Selector};
use lattis_core::{
    is_finite, is_infinite, is_vectorized, ArrayValue, FiniteVectorizedSystem, InfiniteSystem,
    InfiniteVectorizedSystem, Params, SiteFamily, SiteValue, System, TermSpec, TightBindingLead,
    TightBindingSystem, TranslationalSymmetry,
};
use ndarray::{array, Array2, Array3};
use num_complex::Complex64;

const N: usize = 6;

fn c(re: f64, im: f64) -> Complex64 {
    Complex64::new(re, im)
}

/// Two-orbital onsite block depending on the site position.
fn onsite_block(x: i64, mu: f64) -> Array2<Complex64> {
    array![[c(x as f64 - mu, 0.0), c(0.0, 0.1)], [c(0.0, -0.1), c(-(x as f64) - mu, 0.0)]]
}

fn hopping_block(t: f64) -> Array2<Complex64> {
    array![[c(-t, 0.0), c(0.0, 0.5 * t)], [c(0.2, 0.0), c(t, 0.0)]]
}

fn per_site_wire() -> TightBindingSystem {
    let fam = SiteFamily::integer("w", 1, 2).unwrap();
    let sites = (0..N as i64).map(|x| fam.site(&[x]).unwrap()).collect();
    let onsites = (0..N)
        .map(|i| {
            let value = SiteValue::onsite("onsite", &["mu"], |s, p: &Params| {
                Ok(onsite_block(s.tag()[0], p.require("mu")?).into())
            });
            (i, value)
        })
        .collect();
    let hoppings = (1..N)
        .map(|i| {
            let value = SiteValue::hopping("hopping", &["t"], |_, _, p: &Params| {
                Ok(hopping_block(p.require("t")?).into())
            });
            (i, i - 1, value)
        })
        .collect();
    TightBindingSystem::new(sites, onsites, hoppings).unwrap()
}

fn vectorized_wire() -> FiniteVectorizedSystem {
    let fam = SiteFamily::integer("w", 1, 2).unwrap();
    let tags = Array2::from_shape_fn((N, 1), |(i, _)| i as i64);
    let arr = SiteArray::new(fam, tags).unwrap();
    let onsite = Subgraph::new((0, 0), ((0..N).collect(), (0..N).collect())).unwrap();
    let hops = Subgraph::new((0, 0), ((1..N).collect(), (0..N - 1).collect())).unwrap();

    let onsite_value = ArrayValue::onsite("onsite", &["mu"], |sites: &SiteArray, p: &Params| {
        let mu = p.require("mu")?;
        let tags = sites.tags();
        let blocks = Array3::from_shape_fn((sites.len(), 2, 2), |(k, i, j)| onsite_block(tags[[k, 0]], mu)[[i, j]]);
        Ok(blocks.into())
    });
    let hopping_value = ArrayValue::hopping("hopping", &["t"], |_: &SiteArray, _: &SiteArray, p: &Params| {
        Ok(hopping_block(p.require("t")?).into())
    });
    FiniteVectorizedSystem::new(
        vec![arr],
        vec![onsite, hops],
        vec![TermSpec::new(0, false, onsite_value), TermSpec::new(1, true, hopping_value)],
    )
    .unwrap()
}

fn params() -> Params {
    Params::new().with("mu", 0.3).with("t", 1.2)
}

fn assert_close(a: &Array2<Complex64>, b: &Array2<Complex64>) {
    assert_eq!(a.dim(), b.dim());
    for (x, y) in a.iter().zip(b.iter()) {
        assert_abs_diff_eq!(x.re, y.re, epsilon = 1e-12);
        assert_abs_diff_eq!(x.im, y.im, epsilon = 1e-12);
    }
}

#[test]
fn test_vectorized_matches_per_site() {
    let reference = per_site_wire();
    let vectorized = vectorized_wire();
    let p = params();

    let h_ref = reference.hamiltonian_submatrix(None, None, &p).unwrap();
    let h_vec = vectorized.hamiltonian_submatrix(None, None, &p).unwrap();
    assert_eq!(h_ref.dim(), (2 * N, 2 * N));
    assert_close(&h_ref, &h_vec);

    for i in 0..N {
        for &j in &[i.saturating_sub(1), i, (i + 1).min(N - 1)] {
            assert_close(
                &reference.hamiltonian(i, j, &p).unwrap(),
                &vectorized.hamiltonian(i, j, &p).unwrap(),
            );
        }
    }
    assert_eq!(reference.graph().num_edges(), vectorized.graph().num_edges());
    assert_eq!(reference.site_ranges(), vectorized.site_ranges());
}

#[test]
fn test_full_hamiltonian_is_hermitian() {
    let h = vectorized_wire().hamiltonian_submatrix(None, None, &params()).unwrap();
    let h_dagger = h.t().mapv(|z| z.conj());
    assert_close(&h, &h_dagger);
}

#[test]
fn test_submatrix_selection() {
    let syst = per_site_wire();
    let p = params();
    let full = syst.hamiltonian_submatrix(None, None, &p).unwrap();
    let rows = [4, 1];
    let cols = [0, 2];
    let sub = syst.hamiltonian_submatrix(Some(&rows), Some(&cols), &p).unwrap();
    assert_eq!(sub.dim(), (4, 4));
    for (bi, &r) in rows.iter().enumerate() {
        for (bj, &col) in cols.iter().enumerate() {
            for a in 0..2 {
                for b in 0..2 {
                    assert_eq!(sub[[2 * bi + a, 2 * bj + b]], full[[2 * r + a, 2 * col + b]]);
                }
            }
        }
    }

    let sparse = syst.hamiltonian_submatrix_sparse(Some(&rows), Some(&cols), &p).unwrap();
    assert_eq!(sparse.to_dense(), sub);

    let vectorized = vectorized_wire();
    let sparse_vec = vectorized
        .hamiltonian_submatrix_sparse(Some(&rows), Some(&cols), &p)
        .unwrap();
    assert_close(&sparse_vec.to_dense(), &sub);
}

#[test]
fn test_hamiltonian_term_blocks() {
    let syst = vectorized_wire();
    let blocks = syst
        .hamiltonian_term(1, &Selector::Indices(vec![0, 3]), &params())
        .unwrap();
    assert_eq!(blocks.dim(), (2, 2, 2));
    assert_eq!(blocks.index_axis(ndarray::Axis(0), 1), hopping_block(1.2));
    assert_eq!(syst.terms()[1].parameters, vec!["t".to_string()]);
}

#[test]
fn test_summary_and_classification() {
    let finite = vectorized_wire();
    assert_eq!(
        finite.describe(),
        format!(
            "<FiniteVectorizedSystem with {} sites, {} hoppings, and parameters: (mu, t)>",
            N,
            2 * (N - 1)
        )
    );
    let syst: &dyn System = &finite;
    assert!(is_finite(syst) && is_vectorized(syst) && !is_infinite(syst));

    let per_site: &dyn System = &per_site_wire();
    assert!(is_finite(per_site) && !is_vectorized(per_site));
}

/// Two-sublattice chain with cell `[b, a]`.
fn leads() -> (TightBindingLead, InfiniteVectorizedSystem) {
    let a = SiteFamily::integer("a", 1, 1).unwrap();
    let b = SiteFamily::integer("b", 1, 1).unwrap();
    let hop = |name: &'static str| {
        SiteValue::hopping(name, &["t1", "t2"], move |_, _, p: &Params| {
            Ok(p.require(if name == "intra" { "t1" } else { "t2" })?.into())
        })
    };
    let per_site = TightBindingLead::new(
        Arc::new(TranslationalSymmetry::new(array![[1]]).unwrap()),
        vec![b.site(&[0]).unwrap(), a.site(&[0]).unwrap(), b.site(&[-1]).unwrap()],
        2,
        vec![(0, SiteValue::constant(0.25))],
        vec![(1, 0, hop("intra")), (1, 2, hop("inter"))],
    )
    .unwrap();

    let ahop = |key: &'static str| {
        ArrayValue::hopping(key, &["t1", "t2"], move |to: &SiteArray, _: &SiteArray, p: &Params| {
            Ok(ndarray::Array1::from_elem(to.len(), p.require(key)?).into())
        })
    };
    let arrays = vec![
        SiteArray::new(b, array![[0]]).unwrap(),
        SiteArray::new(a, array![[0]]).unwrap(),
    ];
    let a_from_b = Subgraph::new((1, 0), (vec![0], vec![0])).unwrap();
    let b_onsite = Subgraph::new((0, 0), (vec![0], vec![0])).unwrap();
    let vectorized = InfiniteVectorizedSystem::new(
        Arc::new(TranslationalSymmetry::new(array![[1]]).unwrap()),
        arrays,
        vec![a_from_b, b_onsite],
        vec![
            TermSpec::new(1, false, ArrayValue::constant(0.25)).with_element(array![0]),
            TermSpec::new(0, true, ahop("t1")).with_element(array![0]),
            TermSpec::new(0, true, ahop("t2")).with_element(array![1]),
        ],
    )
    .unwrap();
    (per_site, vectorized)
}

#[test]
fn test_vectorized_lead_matches_per_site() {
    let (per_site, vectorized) = leads();
    let p = Params::new().with("t1", 1.0).with("t2", 0.4);

    assert_eq!(vectorized.cell_size(), 2);
    assert_eq!(vectorized.num_interface_sites(), 1);
    assert_eq!(per_site.cell_hamiltonian(&p).unwrap(), vectorized.cell_hamiltonian(&p).unwrap());
    let hop = vectorized.inter_cell_hopping(&p).unwrap();
    assert_eq!(hop.dim(), (2, 1));
    assert_eq!(per_site.inter_cell_hopping(&p).unwrap(), hop);
    assert_eq!(hop[[1, 0]], c(0.4, 0.0));
    assert_eq!(
        per_site.cell_hamiltonian_sparse(&p).unwrap().to_dense(),
        vectorized.cell_hamiltonian_sparse(&p).unwrap().to_dense()
    );

    for i in 0..3 {
        for j in 0..3 {
            let r = per_site.hamiltonian(i, j, &p);
            let v = vectorized.hamiltonian(i, j, &p);
            match (r, v) {
                (Ok(r), Ok(v)) => assert_eq!(r, v, "element ({}, {})", i, j),
                (Err(_), Err(_)) => {}
                (r, v) => panic!("element ({}, {}): {:?} vs {:?}", i, j, r.is_ok(), v.is_ok()),
            }
        }
    }
    assert!(is_infinite(&vectorized as &dyn System));
}

/// Two-array lead with a two-orbital `a` and one-orbital `b`, cell `[b, a]`.
/// Inter-cell hoppings are `a <- b(previous)` (element `+1`) and
/// `b(previous) <- b` (element `-1`).
fn multi_orbital_leads() -> (TightBindingLead, InfiniteVectorizedSystem) {
    let a = SiteFamily::integer("a", 1, 2).unwrap();
    let b = SiteFamily::integer("b", 1, 1).unwrap();
    let onsite_a = array![[c(0.3, 0.0), c(0.0, 0.1)], [c(0.0, -0.1), c(-0.2, 0.0)]];
    let intra = array![[c(1.0, 0.0)], [c(0.0, 0.5)]];
    let forward = array![[c(0.4, 0.0)], [c(-0.3, 0.0)]];
    let backward = c(-0.7, 0.2);

    let per_site = TightBindingLead::new(
        Arc::new(TranslationalSymmetry::new(array![[1]]).unwrap()),
        vec![b.site(&[0]).unwrap(), a.site(&[0]).unwrap(), b.site(&[-1]).unwrap()],
        2,
        vec![(0, SiteValue::constant(0.25)), (1, SiteValue::constant(onsite_a.clone()))],
        vec![
            (1, 0, SiteValue::constant(intra.clone())),
            (1, 2, SiteValue::constant(forward.clone())),
            (2, 0, SiteValue::constant(backward)),
        ],
    )
    .unwrap();

    let arrays = vec![
        SiteArray::new(b, array![[0]]).unwrap(),
        SiteArray::new(a, array![[0]]).unwrap(),
    ];
    let b_b = Subgraph::new((0, 0), (vec![0], vec![0])).unwrap();
    let a_a = Subgraph::new((1, 1), (vec![0], vec![0])).unwrap();
    let a_b = Subgraph::new((1, 0), (vec![0], vec![0])).unwrap();
    let vectorized = InfiniteVectorizedSystem::new(
        Arc::new(TranslationalSymmetry::new(array![[1]]).unwrap()),
        arrays,
        vec![b_b, a_a, a_b],
        vec![
            TermSpec::new(0, false, ArrayValue::constant(0.25)).with_element(array![0]),
            TermSpec::new(1, false, ArrayValue::constant(onsite_a)).with_element(array![0]),
            TermSpec::new(2, true, ArrayValue::constant(intra)).with_element(array![0]),
            TermSpec::new(2, true, ArrayValue::constant(forward)).with_element(array![1]),
            TermSpec::new(0, true, ArrayValue::constant(backward)).with_element(array![-1]),
        ],
    )
    .unwrap();
    (per_site, vectorized)
}

#[test]
fn test_multi_orbital_lead_matches_per_site() {
    let (per_site, vectorized) = multi_orbital_leads();
    let p = Params::new();

    assert_eq!(vectorized.num_interface_sites(), 1);
    assert_close(&per_site.cell_hamiltonian(&p).unwrap(), &vectorized.cell_hamiltonian(&p).unwrap());

    let hop = vectorized.inter_cell_hopping(&p).unwrap();
    assert_eq!(hop.dim(), (3, 1));
    assert_close(&per_site.inter_cell_hopping(&p).unwrap(), &hop);
    assert_eq!(hop[[0, 0]], c(-0.7, -0.2));
    assert_eq!(hop[[1, 0]], c(0.4, 0.0));
    assert_eq!(hop[[2, 0]], c(-0.3, 0.0));
    assert_close(
        &per_site.inter_cell_hopping_sparse(&p).unwrap().to_dense(),
        &vectorized.inter_cell_hopping_sparse(&p).unwrap().to_dense(),
    );
    assert_eq!(per_site.graph().num_edges(), vectorized.graph().num_edges());
}

#[test]
fn test_lead_graph_agrees_with_elements() {
    let (per_site, vectorized) = multi_orbital_leads();
    let p = Params::new();
    let systems: [&dyn System; 2] = [&per_site, &vectorized];
    for syst in systems {
        for i in 0..3 {
            for j in (0..3).filter(|&j| j != i) {
                let linked = syst.graph().out_neighbors(i).contains(&j);
                assert_eq!(
                    linked,
                    syst.hamiltonian(i, j, &p).is_ok(),
                    "{}: element ({}, {})",
                    syst.type_name(),
                    i,
                    j
                );
            }
            for &j in syst.graph().out_neighbors(i) {
                assert_close(&per_site.hamiltonian(i, j, &p).unwrap(), &vectorized.hamiltonian(i, j, &p).unwrap());
            }
        }
    }
}

#[test]
fn test_submatrix_rejects_repeated_sites() {
    let p = params();
    let rows = [1, 3, 1];
    let per_site = per_site_wire().hamiltonian_submatrix(Some(&rows), None, &p);
    assert!(matches!(per_site, Err(lattis_core::SystemError::Usage(_))));
    let vectorized = vectorized_wire().hamiltonian_submatrix_sparse(None, Some(&rows), &p);
    assert!(matches!(vectorized, Err(lattis_core::SystemError::Usage(_))));
}
