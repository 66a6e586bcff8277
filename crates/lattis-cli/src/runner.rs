//! Builds systems from parsed configuration and reports their matrices.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use ndarray::Array2;
use num_complex::Complex64;
use serde::Serialize;

use lattis_core::physics::DiscreteSymmetry;
use lattis_core::system::{FiniteSystem, InfiniteSystem, System};
use lattis_core::{
    BrokenSymmetry, MatrixBlocks, Params, Site, SiteFamily, SiteValue, TightBindingLead,
    TightBindingSystem, TranslationalSymmetry,
};

use crate::config::{SymmetryConfig, SystemConfig, ValueConfig};

/// A system built from a configuration file.
pub enum Built {
    Finite(TightBindingSystem),
    Lead(TightBindingLead),
}

impl Built {
    pub fn as_system(&self) -> &dyn System {
        match self {
            Built::Finite(syst) => syst,
            Built::Lead(lead) => lead,
        }
    }
}

/// A complex matrix split into real and imaginary parts for JSON output.
#[derive(Debug, Serialize)]
pub struct MatrixReport {
    pub rows: usize,
    pub cols: usize,
    pub re: Vec<Vec<f64>>,
    pub im: Vec<Vec<f64>>,
}

impl From<&Array2<Complex64>> for MatrixReport {
    fn from(m: &Array2<Complex64>) -> Self {
        Self {
            rows: m.nrows(),
            cols: m.ncols(),
            re: m.outer_iter().map(|r| r.iter().map(|z| z.re).collect()).collect(),
            im: m.outer_iter().map(|r| r.iter().map(|z| z.im).collect()).collect(),
        }
    }
}

/// Everything a subcommand computed, in the order it was computed.
#[derive(Debug, Serialize)]
pub struct Report {
    pub summary: String,
    pub matrices: BTreeMap<String, MatrixReport>,
    pub broken_symmetries: Vec<BrokenSymmetry>,
}

/// Build the finite system or lead described by `config`.
pub fn build(config: &SystemConfig) -> Result<Built> {
    let families: HashMap<&str, SiteFamily> = config
        .families
        .iter()
        .map(|f| {
            let family = SiteFamily::integer(&f.name, f.dim, f.norbs)
                .with_context(|| format!("Family '{}' is invalid", f.name))?;
            Ok((f.name.as_str(), family))
        })
        .collect::<Result<_>>()?;

    let sites = config
        .sites
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let family = families
                .get(s.family.as_str())
                .with_context(|| format!("Site {}: unknown family '{}'", i, s.family))?;
            family
                .site(&s.tag)
                .with_context(|| format!("Site {}: invalid tag {:?}", i, s.tag))
        })
        .collect::<Result<Vec<Site>>>()?;

    let onsites = config
        .onsites
        .iter()
        .map(|o| Ok((o.site, build_value(&o.value, false)?)))
        .collect::<Result<Vec<_>>>()?;
    let hoppings = config
        .hoppings
        .iter()
        .map(|h| Ok((h.to, h.from, build_value(&h.value, true)?)))
        .collect::<Result<Vec<_>>>()?;

    let symmetry = config
        .symmetry
        .as_ref()
        .map(build_discrete_symmetry)
        .transpose()?
        .unwrap_or_default();

    match &config.lead {
        None => {
            let syst = TightBindingSystem::new(sites, onsites, hoppings)
                .context("Failed to build the system")?
                .with_discrete_symmetry(symmetry)?;
            Ok(Built::Finite(syst))
        }
        Some(lead) => {
            let period = Array2::from_shape_vec((1, lead.period.len()), lead.period.clone())
                .context("Lead period must be a list of integers")?;
            let translation = TranslationalSymmetry::new(period).context("Invalid lead period")?;
            let lead = TightBindingLead::new(Arc::new(translation), sites, lead.cell_size, onsites, hoppings)
                .context("Failed to build the lead")?
                .with_discrete_symmetry(symmetry)?;
            Ok(Built::Lead(lead))
        }
    }
}

fn complex_matrix(rows: &[Vec<[f64; 2]>]) -> Result<Array2<Complex64>> {
    let ncols = rows.first().map_or(0, Vec::len);
    if rows.iter().any(|r| r.len() != ncols) {
        anyhow::bail!("Matrix rows must all have the same length");
    }
    let flat = rows
        .iter()
        .flatten()
        .map(|&[re, im]| Complex64::new(re, im))
        .collect();
    Ok(Array2::from_shape_vec((rows.len(), ncols), flat)?)
}

fn build_value(value: &ValueConfig, hopping: bool) -> Result<SiteValue> {
    Ok(match value {
        ValueConfig::Real(x) => SiteValue::constant(*x),
        ValueConfig::Matrix(rows) => SiteValue::constant(complex_matrix(rows)?),
        ValueConfig::Parameter { parameter, scale } => {
            let (name, scale) = (parameter.clone(), *scale);
            let scaled = move |p: &Params| -> Result<MatrixBlocks, lattis_core::SystemError> {
                Ok((scale * p.require(&name)?).into())
            };
            if hopping {
                SiteValue::hopping("hopping", &[parameter.as_str()], move |_, _, p: &Params| scaled(p))
            } else {
                SiteValue::onsite("onsite", &[parameter.as_str()], move |_, p: &Params| scaled(p))
            }
        }
    })
}

fn build_discrete_symmetry(config: &SymmetryConfig) -> Result<DiscreteSymmetry> {
    let operator = |m: &Option<Vec<Vec<[f64; 2]>>>| m.as_deref().map(complex_matrix).transpose();
    let projectors = if config.projectors.is_empty() {
        None
    } else {
        Some(
            config
                .projectors
                .iter()
                .map(|p| complex_matrix(p))
                .collect::<Result<Vec<_>>>()?,
        )
    };
    DiscreteSymmetry::new(
        projectors,
        operator(&config.time_reversal)?,
        operator(&config.particle_hole)?,
        operator(&config.chiral)?,
    )
    .context("Invalid discrete symmetry")
}

/// Summary, site ranges and full Hamiltonian of a finite system.
pub fn inspect(built: &Built, params: &Params) -> Result<Report> {
    let Built::Finite(syst) = built else {
        anyhow::bail!("'inspect' needs a finite system; use 'lead' for files with a [lead] section");
    };
    let summary = syst.describe();
    println!("{}", summary);
    if let Some(ranges) = syst.site_ranges() {
        println!("Site ranges: {}", ranges);
    }
    if !syst.leads().is_empty() {
        println!("Leads: {}", syst.leads().len());
    }

    let ham = syst
        .hamiltonian_submatrix(None, None, params)
        .context("Failed to assemble the Hamiltonian")?;
    println!("Hamiltonian ({}x{}):", ham.nrows(), ham.ncols());
    print_matrix(&ham);

    let mut matrices = BTreeMap::new();
    matrices.insert("hamiltonian".to_string(), MatrixReport::from(&ham));
    Ok(Report {
        summary,
        matrices,
        broken_symmetries: Vec::new(),
    })
}

/// Cell Hamiltonian and inter-cell hopping of a lead.
pub fn lead(built: &Built, params: &Params) -> Result<Report> {
    let Built::Lead(lead) = built else {
        anyhow::bail!("'lead' needs a [lead] section in the configuration");
    };
    let summary = lead.describe();
    println!("{}", summary);
    println!(
        "Cell: {} sites, interface: {} sites",
        lead.cell_size(),
        lead.num_interface_sites()
    );

    let ham = lead
        .cell_hamiltonian(params)
        .context("Failed to assemble the cell Hamiltonian")?;
    let hop = lead
        .inter_cell_hopping(params)
        .context("Failed to assemble the inter-cell hopping")?;
    println!("Cell Hamiltonian ({}x{}):", ham.nrows(), ham.ncols());
    print_matrix(&ham);
    println!("Inter-cell hopping ({}x{}):", hop.nrows(), hop.ncols());
    print_matrix(&hop);

    let mut matrices = BTreeMap::new();
    matrices.insert("cell_hamiltonian".to_string(), MatrixReport::from(&ham));
    matrices.insert("inter_cell_hopping".to_string(), MatrixReport::from(&hop));
    Ok(Report {
        summary,
        matrices,
        broken_symmetries: Vec::new(),
    })
}

/// Check the declared discrete symmetries against the Hamiltonian.
pub fn validate(built: &Built, params: &Params) -> Result<Report> {
    let broken = match built {
        Built::Finite(syst) => syst.validate_symmetries(params),
        Built::Lead(lead) => lead.validate_symmetries(params),
    }
    .context("Failed to validate discrete symmetries")?;

    let summary = built.as_system().describe();
    println!("{}", summary);
    if broken.is_empty() {
        println!("All declared symmetries are respected.");
    } else {
        for symmetry in &broken {
            println!("Broken: {}", symmetry);
        }
    }
    Ok(Report {
        summary,
        matrices: BTreeMap::new(),
        broken_symmetries: broken,
    })
}

fn print_matrix(m: &Array2<Complex64>) {
    for row in m.outer_iter() {
        let cells: Vec<String> = row
            .iter()
            .map(|z| {
                if z.im == 0.0 {
                    format!("{:>8.4}", z.re)
                } else {
                    format!("{:>8.4}{:+.4}i", z.re, z.im)
                }
            })
            .collect();
        println!("  {}", cells.join(" "));
    }
}

/// Write a report to a JSON file.
pub fn write_json(report: &Report, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(report)
        .map_err(|e| anyhow::anyhow!("JSON serialisation error: {}", e))?;
    std::fs::write(path, json)?;

    println!("Report (JSON) written to: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHAIN: &str = r#"
        [[family]]
        name = "a"

        [[site]]
        family = "a"
        tag = [0]

        [[site]]
        family = "a"
        tag = [1]

        [[onsite]]
        site = 0
        value = 0.5

        [[hopping]]
        to = 1
        from = 0
        value = { parameter = "t", scale = -1.0 }
    "#;

    #[test]
    fn test_build_and_inspect() {
        let config: SystemConfig = toml::from_str(CHAIN).unwrap();
        let built = build(&config).unwrap();
        let report = inspect(&built, &Params::new().with("t", 2.0)).unwrap();
        assert_eq!(
            report.summary,
            "<TightBindingSystem with 2 sites, 2 hoppings, and parameters: (t)>"
        );
        let ham = &report.matrices["hamiltonian"];
        assert_eq!(ham.re, vec![vec![0.5, -2.0], vec![-2.0, 0.0]]);
        assert!(lead(&built, &Params::new()).is_err());
    }

    #[test]
    fn test_missing_parameter_is_reported() {
        let config: SystemConfig = toml::from_str(CHAIN).unwrap();
        let built = build(&config).unwrap();
        let err = inspect(&built, &Params::new()).unwrap_err();
        assert!(format!("{:#}", err).contains("t"));
    }

    #[test]
    fn test_lead_report() {
        let config: SystemConfig = toml::from_str(
            r#"
            [[family]]
            name = "a"

            [[site]]
            family = "a"
            tag = [0]

            [[site]]
            family = "a"
            tag = [-1]

            [[onsite]]
            site = 0
            value = 1.0

            [[hopping]]
            to = 0
            from = 1
            value = -1.0

            [lead]
            period = [1]
            cell_size = 1

            [symmetry]
            particle_hole = [[[1.0, 0.0]]]
            "#,
        )
        .unwrap();
        let built = build(&config).unwrap();
        let report = lead(&built, &Params::new()).unwrap();
        assert_eq!(report.matrices["cell_hamiltonian"].re, vec![vec![1.0]]);
        assert_eq!(report.matrices["inter_cell_hopping"].re, vec![vec![-1.0]]);

        let report = validate(&built, &Params::new()).unwrap();
        assert_eq!(report.broken_symmetries, vec![BrokenSymmetry::ParticleHole]);
    }

    #[test]
    fn test_unknown_family() {
        let config: SystemConfig = toml::from_str(
            r#"
            [[family]]
            name = "a"

            [[site]]
            family = "b"
            tag = [0]
            "#,
        )
        .unwrap();
        let err = build(&config).err().unwrap();
        assert!(err.to_string().contains("unknown family 'b'"));
    }
}
