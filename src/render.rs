use crate::flatten::FlatCoords;
use crate::pipeline::CanonicalDataset;
use crate::types::{BorderDataset, CountryRecord};
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use shapefile::dbase::{FieldName, FieldValue, Record, TableWriterBuilder};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;
use tracing::{info, warn};

/// dBase limits attribute names to 10 bytes.
pub const DBF_FIELD_NAME_LIMIT: usize = 10;

pub struct DensityClass {
    pub upper: f64, // inclusive
    pub color: &'static str,
    pub label: &'static str,
}

pub static DENSITY_CLASSES: [DensityClass; 9] = [
    DensityClass { upper: 10.0, color: "#f7f4f9", label: "≤ 10" },
    DensityClass { upper: 25.0, color: "#e7e1ef", label: "10 - 25" },
    DensityClass { upper: 50.0, color: "#d4b9da", label: "25 - 50" },
    DensityClass { upper: 75.0, color: "#c994c7", label: "50 - 75" },
    DensityClass { upper: 100.0, color: "#df65b0", label: "75 - 100" },
    DensityClass { upper: 150.0, color: "#e7298a", label: "100 - 150" },
    DensityClass { upper: 300.0, color: "#ce1256", label: "150 - 300" },
    DensityClass { upper: 1000.0, color: "#980043", label: "300 - 1000" },
    DensityClass { upper: f64::INFINITY, color: "#67001f", label: "1000+" },
];

pub fn classify(density: f64) -> Option<&'static DensityClass> {
    DENSITY_CLASSES.iter().find(|class| density <= class.upper)
}

/// Bounds for a continuous colour scale over the finite densities.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ColorRange {
    pub low: f64,
    pub high: f64,
}

pub fn color_range(records: &[CountryRecord]) -> Option<ColorRange> {
    records.iter()
        .filter_map(|r| r.population_density)
        .filter(|d| d.is_finite())
        .fold(None, |range, d| match range {
            None => Some(ColorRange { low: d, high: d }),
            Some(ColorRange { low, high }) => Some(ColorRange { low: low.min(d), high: high.max(d) }),
        })
}

/// Truncates an attribute name to what a dBase table can hold.
pub fn dbf_field_name(name: &str) -> String {
    let mut end = name.len().min(DBF_FIELD_NAME_LIMIT);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_string()
}

/// Attribute names of the canonical table before truncation.
#[derive(Debug, Clone)]
pub struct ShapefileColumns {
    pub name: String,
    pub code: String,
    pub population_name: String,
    pub population_code: String,
    pub population: String,
    pub density: String,
}

impl ShapefileColumns {
    pub fn new(name_column: &str, code_column: &str, year: &str) -> Self {
        Self {
            name: name_column.to_string(),
            code: code_column.to_string(),
            population_name: "Country Name".to_string(),
            population_code: "Country Code".to_string(),
            population: year.to_string(),
            density: "pop_density".to_string(),
        }
    }

    /// Columns named after the base dataset's own name and code fields.
    pub fn for_dataset(base: &BorderDataset, year: &str) -> Self {
        Self::new(&base.name_column, &base.code_column, year)
    }

    /// Field names as they will appear in the written file. Two columns
    /// that truncate to the same name are an error.
    pub fn field_names(&self) -> Result<[String; 6]> {
        let names = [
            &self.name,
            &self.code,
            &self.population_name,
            &self.population_code,
            &self.population,
            &self.density,
        ]
        .map(|n| dbf_field_name(n));

        let mut seen = HashSet::new();
        for (full, short) in [&self.name, &self.code, &self.population_name, &self.population_code, &self.population, &self.density]
            .iter()
            .zip(names.iter())
        {
            if !seen.insert(short.clone()) {
                return Err(anyhow!("Column '{}' collides with another column once truncated to '{}'", full, short));
            }
            if short != *full {
                warn!("Column '{}' is written as '{}'", full, short);
            }
        }

        Ok(names)
    }
}

fn field_name(name: &str) -> Result<FieldName> {
    FieldName::try_from(name).map_err(|e| anyhow!("Invalid field name '{}': {:?}", name, e))
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create output directory: {:?}", parent))?;
        }
    }
    Ok(())
}

/// Writes the polygonal rows of the table as a shapefile. Rows without a
/// polygon are kept in the plot source but cannot go into a polygon layer.
pub fn write_shapefile(path: &Path, records: &[CountryRecord], columns: &ShapefileColumns) -> Result<usize> {
    let [name, code, pop_name, pop_code, population, density] = columns.field_names()?;

    let table = TableWriterBuilder::new()
        .add_character_field(field_name(&name)?, 80)
        .add_character_field(field_name(&code)?, 16)
        .add_character_field(field_name(&pop_name)?, 80)
        .add_character_field(field_name(&pop_code)?, 16)
        .add_numeric_field(field_name(&population)?, 18, 0)
        .add_numeric_field(field_name(&density)?, 24, 6);

    ensure_parent(path)?;
    let mut writer = shapefile::Writer::from_path(path, table)
        .with_context(|| format!("Failed to create Shapefile: {:?}", path))?;

    let mut written = 0;
    let mut skipped = 0;

    for record in records {
        let polygon = match record.geometry.as_ref().and_then(|g| g.to_multi_polygon()) {
            Some(mp) => shapefile::Polygon::from(mp),
            None => {
                skipped += 1;
                continue;
            }
        };

        let mut attributes = Record::default();
        attributes.insert(name.clone(), FieldValue::Character(record.name.clone()));
        attributes.insert(code.clone(), FieldValue::Character(record.code.clone()));
        attributes.insert(pop_name.clone(), FieldValue::Character(record.population_name.clone()));
        attributes.insert(pop_code.clone(), FieldValue::Character(record.population_code.clone()));
        attributes.insert(population.clone(), FieldValue::Numeric(record.population.map(|p| p as f64)));
        attributes.insert(density.clone(), FieldValue::Numeric(record.population_density));

        writer.write_shape_and_record(&polygon, &attributes)
            .with_context(|| format!("Failed to write shape for {:?}", record.name))?;
        written += 1;
    }

    if skipped > 0 {
        warn!("{} rows without polygon geometry were left out of {:?}", skipped, path);
    }
    info!("Wrote {} shapes to {:?}", written, path);
    Ok(written)
}

/// Column-oriented country table, one array per column.
#[derive(Debug, Default, Serialize)]
pub struct CountryColumns {
    pub name: Vec<Option<String>>,
    pub code: Vec<Option<String>>,
    pub population: Vec<Option<u64>>,
    pub density: Vec<Option<f64>>,
    pub color: Vec<Option<&'static str>>,
    pub legend: Vec<Option<&'static str>>,
    pub xs: Vec<FlatCoords>,
    pub ys: Vec<FlatCoords>,
}

#[derive(Debug, Default, Serialize)]
pub struct CapitalColumns {
    pub name: Vec<String>,
    pub country: Vec<String>,
    pub lon: Vec<f64>,
    pub lat: Vec<f64>,
}

/// Everything the map front end needs, in the shape its data sources take.
#[derive(Debug, Serialize)]
pub struct PlotSource {
    pub countries: CountryColumns,
    pub capitals: CapitalColumns,
    pub color_range: Option<ColorRange>,
}

impl PlotSource {
    pub fn new(dataset: &CanonicalDataset) -> Self {
        let mut countries = CountryColumns::default();
        for ((record, xs), ys) in dataset.records.iter().zip(&dataset.xs).zip(&dataset.ys) {
            let class = record.population_density.and_then(classify);
            countries.name.push(record.name.clone().or_else(|| record.population_name.clone()));
            countries.code.push(record.code.clone().or_else(|| record.population_code.clone()));
            countries.population.push(record.population);
            countries.density.push(record.population_density);
            countries.color.push(class.map(|c| c.color));
            countries.legend.push(class.map(|c| c.label));
            countries.xs.push(xs.clone());
            countries.ys.push(ys.clone());
        }

        let mut capitals = CapitalColumns::default();
        for capital in &dataset.capitals {
            capitals.name.push(capital.name.clone());
            capitals.country.push(capital.country.clone());
            capitals.lon.push(capital.lon);
            capitals.lat.push(capital.lat);
        }

        Self {
            countries,
            capitals,
            color_range: color_range(&dataset.records),
        }
    }
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    ensure_parent(path)?;
    let file = File::create(path)
        .with_context(|| format!("Failed to create output file: {:?}", path))?;
    serde_json::to_writer(BufWriter::new(file), value)
        .with_context(|| format!("Failed to write JSON: {:?}", path))?;
    info!("Wrote {:?}", path);
    Ok(())
}
