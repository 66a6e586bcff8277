//! TOML description of an explicit tight-binding system.

use serde::Deserialize;

/// Top-level system description.
#[derive(Debug, Deserialize)]
pub struct SystemConfig {
    #[serde(rename = "family")]
    pub families: Vec<FamilyConfig>,
    #[serde(rename = "site", default)]
    pub sites: Vec<SiteConfig>,
    #[serde(rename = "onsite", default)]
    pub onsites: Vec<OnsiteConfig>,
    #[serde(rename = "hopping", default)]
    pub hoppings: Vec<HoppingConfig>,
    /// Present when the file describes a lead.
    pub lead: Option<LeadConfig>,
    pub symmetry: Option<SymmetryConfig>,
}

/// A site family with integer tags.
#[derive(Debug, Deserialize)]
pub struct FamilyConfig {
    pub name: String,
    /// Tag length.
    #[serde(default = "default_dim")]
    pub dim: usize,
    #[serde(default = "default_norbs")]
    pub norbs: usize,
}

fn default_dim() -> usize {
    1
}
fn default_norbs() -> usize {
    1
}

#[derive(Debug, Deserialize)]
pub struct SiteConfig {
    pub family: String,
    pub tag: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub struct OnsiteConfig {
    pub site: usize,
    pub value: ValueConfig,
}

/// A hopping from `from` to `to`; the reverse direction is implied.
#[derive(Debug, Deserialize)]
pub struct HoppingConfig {
    pub to: usize,
    pub from: usize,
    pub value: ValueConfig,
}

/// A matrix element: a real number, a complex matrix given as rows of
/// `[re, im]` pairs, or a named parameter times a real scale.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ValueConfig {
    Real(f64),
    Matrix(Vec<Vec<[f64; 2]>>),
    Parameter {
        parameter: String,
        #[serde(default = "default_scale")]
        scale: f64,
    },
}

fn default_scale() -> f64 {
    1.0
}

/// Translational symmetry of a lead. Sites past `cell_size` are the
/// previous-cell copies of the first sites of the cell.
#[derive(Debug, Deserialize)]
pub struct LeadConfig {
    /// One period, as an integer tag translation.
    pub period: Vec<i64>,
    pub cell_size: usize,
}

/// Discrete symmetry operators over the orbitals of the system (or of one
/// lead cell), as rows of `[re, im]` pairs.
#[derive(Debug, Default, Deserialize)]
pub struct SymmetryConfig {
    #[serde(default)]
    pub projectors: Vec<Vec<Vec<[f64; 2]>>>,
    pub time_reversal: Option<Vec<Vec<[f64; 2]>>>,
    pub particle_hole: Option<Vec<Vec<[f64; 2]>>>,
    pub chiral: Option<Vec<Vec<[f64; 2]>>>,
}

/// Load and parse a TOML system description.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<SystemConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: SystemConfig = toml::from_str(&content)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_system() {
        let config: SystemConfig = toml::from_str(
            r#"
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
            "#,
        )
        .unwrap();
        assert_eq!(config.families[0].dim, 1);
        assert_eq!(config.families[0].norbs, 1);
        assert_eq!(config.sites.len(), 2);
        assert!(matches!(config.onsites[0].value, ValueConfig::Real(v) if v == 0.5));
        assert!(matches!(
            &config.hoppings[0].value,
            ValueConfig::Parameter { parameter, scale } if parameter == "t" && *scale == -1.0
        ));
        assert!(config.lead.is_none());
    }

    #[test]
    fn test_parse_matrix_value_and_lead() {
        let config: SystemConfig = toml::from_str(
            r#"
            [[family]]
            name = "s"
            norbs = 2

            [[onsite]]
            site = 0
            value = [[[1.0, 0.0], [0.0, -0.5]], [[0.0, 0.5], [-1.0, 0.0]]]

            [lead]
            period = [1]
            cell_size = 1
            "#,
        )
        .unwrap();
        let ValueConfig::Matrix(rows) = &config.onsites[0].value else {
            panic!("expected a matrix value");
        };
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][1], [0.0, -0.5]);
        assert_eq!(config.lead.as_ref().map(|l| l.cell_size), Some(1));
        assert!(config.sites.is_empty());
    }
}
