use crate::reconcile::Patch;
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub datasets: BTreeMap<String, DatasetConfig>,
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub patches: Vec<Patch>,
    pub population: PopulationConfig,
    pub capitals: CapitalsConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatasetConfig {
    pub path: PathBuf,
    pub name_column: String,
    pub code_column: String,
    pub crs: Option<String>, // falls back to the .prj sidecar
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReconcileConfig {
    pub base: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PopulationConfig {
    pub path: PathBuf,
    pub year: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CapitalsConfig {
    pub path: PathBuf,
    #[serde(default = "default_capital_name")]
    pub name_column: String,
    #[serde(default = "default_capital_country")]
    pub country_column: String,
    #[serde(default = "default_capital_lon")]
    pub lon_column: String,
    #[serde(default = "default_capital_lat")]
    pub lat_column: String,
}

fn default_capital_name() -> String {
    "CapitalName".to_string()
}

fn default_capital_country() -> String {
    "Country/Region".to_string()
}

fn default_capital_lon() -> String {
    "CapitalLongitude".to_string()
}

fn default_capital_lat() -> String {
    "CapitalLatitude".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    pub shapefile: PathBuf,
    pub plot_source: PathBuf,
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config = Self::from_toml(&content)?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "Failed to parse TOML configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every dataset key referenced by the patch list exists.
    pub fn validate(&self) -> Result<()> {
        if !self.datasets.contains_key(&self.reconcile.base) {
            return Err(anyhow!(
                "Base dataset '{}' is not configured",
                self.reconcile.base
            ));
        }

        for patch in &self.patches {
            if let Patch::Union { countries: [keep, absorb] } = patch {
                if keep == absorb {
                    return Err(anyhow!("Union patch names '{}' twice", keep));
                }
            }
            if let Patch::Substitute { countries, source } = patch {
                if !self.datasets.contains_key(source) {
                    return Err(anyhow!("Substitution source '{}' is not configured", source));
                }
                if *source == self.reconcile.base {
                    return Err(anyhow!(
                        "Substitution source '{}' is the base dataset",
                        source
                    ));
                }
                if countries.is_empty() {
                    return Err(anyhow!("Substitution from '{}' names no countries", source));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[datasets.natural_earth]
path = "database/ne_50m_admin_0_countries.shp"
name_column = "NAME_EN"
code_column = "ISO_A3"

[datasets.world_borders]
path = "database/TM_WORLD_BORDERS-0.3.shp"
name_column = "NAME"
code_column = "ISO3"

[reconcile]
base = "natural_earth"

[[patches]]
operation = "union"
countries = ["Morocco", "Western Sahara"]

[[patches]]
operation = "substitute"
countries = ["Maldives", "Kiribati"]
source = "world_borders"

[population]
path = "database/population.csv"
year = "2019"

[capitals]
path = "database/df_capitals.csv"

[output]
shapefile = "final_dataset/final_dataset.shp"
plot_source = "final_dataset/plot_source.json"
"#;

    #[test]
    fn test_parse_sample() {
        let config = AppConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.datasets.len(), 2);
        assert_eq!(config.patches.len(), 2);
        assert_eq!(config.capitals.country_column, "Country/Region");
        assert!(matches!(&config.patches[0], Patch::Union { countries } if countries[1] == "Western Sahara"));
    }

    #[test]
    fn test_unknown_source_rejected() {
        let broken = SAMPLE.replace("source = \"world_borders\"", "source = \"missing\"");
        let err = AppConfig::from_toml(&broken).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_base_as_source_rejected() {
        let broken = SAMPLE.replace("source = \"world_borders\"", "source = \"natural_earth\"");
        assert!(AppConfig::from_toml(&broken).is_err());
    }

    #[test]
    fn test_union_of_same_country_rejected() {
        let broken = SAMPLE.replace(
            "countries = [\"Morocco\", \"Western Sahara\"]",
            "countries = [\"Morocco\", \"Morocco\"]",
        );
        let err = AppConfig::from_toml(&broken).unwrap_err();
        assert!(err.to_string().contains("Morocco"));
    }

    #[test]
    fn test_union_needs_a_pair() {
        let broken = SAMPLE.replace(
            "countries = [\"Morocco\", \"Western Sahara\"]",
            "countries = [\"Morocco\"]",
        );
        assert!(AppConfig::from_toml(&broken).is_err());
    }
}
