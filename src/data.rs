use crate::config::{AppConfig, CapitalsConfig, DatasetConfig};
use crate::types::{BorderDataset, BorderRow, CapitalRecord, CountryGeometry, PopulationRow};
use anyhow::{anyhow, Context, Result};
use csv::{ReaderBuilder, StringRecord};
use geo::{MultiPolygon, Point};
use shapefile::dbase::FieldValue;
use shapefile::{Reader, Shape};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{info, warn};

/// Loads every configured border dataset, keyed by its config name.
pub fn load_datasets(config: &AppConfig) -> Result<BTreeMap<String, BorderDataset>> {
    let mut datasets = BTreeMap::new();
    for (key, dataset_config) in &config.datasets {
        let dataset = load_border_dataset(key, dataset_config)?;
        info!("Loaded {} rows from dataset '{}'", dataset.rows.len(), key);
        datasets.insert(key.clone(), dataset);
    }
    Ok(datasets)
}

pub fn load_border_dataset(key: &str, config: &DatasetConfig) -> Result<BorderDataset> {
    let extension = config.path.extension()
        .and_then(|e| e.to_str())
        .map(|s: &str| s.to_lowercase())
        .ok_or_else(|| anyhow!("Border file has no extension: {:?}", config.path))?;

    let rows = match extension.as_str() {
        "shp" => load_shapefile_rows(&config.path, &config.name_column, &config.code_column)?,
        "json" | "geojson" => load_geojson_rows(&config.path, &config.name_column, &config.code_column)?,
        _ => return Err(anyhow!("Unsupported geometry format: {}", extension)),
    };

    let crs = match &config.crs {
        Some(crs) => Some(crs.clone()),
        None => read_prj(&config.path)?,
    };

    Ok(BorderDataset {
        key: key.to_string(),
        name_column: config.name_column.clone(),
        code_column: config.code_column.clone(),
        crs,
        rows,
    })
}

/// The `.prj` sidecar of a shapefile, if there is one.
fn read_prj(path: &Path) -> Result<Option<String>> {
    let prj = path.with_extension("prj");
    if !prj.exists() {
        return Ok(None);
    }
    let wkt = fs::read_to_string(&prj)
        .with_context(|| format!("Failed to read projection file: {:?}", prj))?;
    Ok(Some(wkt.trim().to_string()))
}

fn field_text(value: Option<&FieldValue>) -> Option<String> {
    match value? {
        FieldValue::Character(Some(s)) => Some(s.trim().to_string()),
        FieldValue::Numeric(Some(n)) => Some(n.to_string()),
        FieldValue::Integer(i) => Some(i.to_string()),
        _ => None,
    }
}

fn shape_to_geometry(shape: Shape) -> Result<Option<CountryGeometry>> {
    let geometry = match shape {
        Shape::NullShape => None,
        Shape::Point(p) => Some(CountryGeometry::Point(Point::new(p.x, p.y))),
        Shape::PointM(p) => Some(CountryGeometry::Point(Point::new(p.x, p.y))),
        Shape::PointZ(p) => Some(CountryGeometry::Point(Point::new(p.x, p.y))),
        Shape::Polygon(polygon) => {
            let mp: MultiPolygon<f64> = polygon.try_into()
                .map_err(|e| anyhow!("Failed to convert polygon: {:?}", e))?;
            Some(CountryGeometry::from_multi_polygon(mp))
        }
        Shape::PolygonM(polygon) => {
            let mp: MultiPolygon<f64> = polygon.try_into()
                .map_err(|e| anyhow!("Failed to convert polygonM: {:?}", e))?;
            Some(CountryGeometry::from_multi_polygon(mp))
        }
        Shape::PolygonZ(polygon) => {
            let mp: MultiPolygon<f64> = polygon.try_into()
                .map_err(|e| anyhow!("Failed to convert polygonZ: {:?}", e))?;
            Some(CountryGeometry::from_multi_polygon(mp))
        }
        other => {
            warn!("Ignoring non-polygonal shape of type {:?}", other.shapetype());
            None
        }
    };
    Ok(geometry)
}

fn load_shapefile_rows(path: &Path, name_column: &str, code_column: &str) -> Result<Vec<BorderRow>> {
    let mut reader = Reader::from_path(path)
        .with_context(|| format!("Failed to open Shapefile: {:?}", path))?;

    let mut rows = Vec::new();

    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result?;

        let name_value = record.get(name_column)
            .ok_or_else(|| anyhow!("Name column '{}' not found in Shapefile {:?}", name_column, path))?;
        let name = field_text(Some(name_value)).unwrap_or_default();
        let code = field_text(record.get(code_column));

        rows.push(BorderRow {
            name,
            code,
            geometry: shape_to_geometry(shape)?,
        });
    }

    Ok(rows)
}

fn load_geojson_rows(path: &Path, name_column: &str, code_column: &str) -> Result<Vec<BorderRow>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open GeoJSON file: {:?}", path))?;
    parse_geojson_rows(BufReader::new(file), name_column, code_column)
        .with_context(|| format!("Failed to load GeoJSON file: {:?}", path))
}

fn json_text(value: Option<&serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::String(s) => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn parse_geojson_rows<R: Read>(reader: R, name_column: &str, code_column: &str) -> Result<Vec<BorderRow>> {
    use geojson::GeoJson;

    let geojson = GeoJson::from_reader(reader).context("Failed to parse GeoJSON")?;

    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(anyhow!("GeoJSON must be a FeatureCollection")),
    };

    let mut rows = Vec::new();

    for feature in collection.features {
        let properties = feature.properties.as_ref();
        let name = json_text(properties.and_then(|props| props.get(name_column)))
            .unwrap_or_default();
        let code = json_text(properties.and_then(|props| props.get(code_column)));

        let geometry = match feature.geometry {
            Some(geom) => {
                let value: geo::Geometry<f64> = geom.value.try_into()
                    .map_err(|e| anyhow!("Failed to convert geojson geometry: {:?}", e))?;

                match value {
                    geo::Geometry::Point(p) => Some(CountryGeometry::Point(p)),
                    geo::Geometry::Polygon(p) => Some(CountryGeometry::Polygon(p)),
                    geo::Geometry::MultiPolygon(mp) => Some(CountryGeometry::MultiPolygon(mp)),
                    _ => {
                        warn!("Ignoring non-polygonal geometry for '{}'", name);
                        None
                    }
                }
            }
            None => None,
        };

        rows.push(BorderRow { name, code, geometry });
    }

    Ok(rows)
}

pub fn load_population(path: &Path, year: &str) -> Result<Vec<PopulationRow>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open population CSV: {:?}", path))?;
    let rows = parse_population(file, year)
        .with_context(|| format!("Failed to read population CSV: {:?}", path))?;
    info!("Loaded population for {} countries ({})", rows.len(), year);
    Ok(rows)
}

fn parse_population_value(raw: &str) -> Result<Option<u64>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    if let Ok(value) = raw.parse::<u64>() {
        return Ok(Some(value));
    }
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Ok(Some(value.round() as u64)),
        _ => Err(anyhow!("Invalid population value '{}'", raw)),
    }
}

/// Reads a wide population table (one column per year). Preamble lines
/// before the `Country Code` header row are skipped.
pub fn parse_population<R: Read>(reader: R, year: &str) -> Result<Vec<PopulationRow>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut records = rdr.records();
    let headers: StringRecord = loop {
        match records.next() {
            Some(record) => {
                let record = record?;
                if record.iter().any(|h| h.trim() == "Country Code") {
                    break record;
                }
            }
            None => return Err(anyhow!("No header row with 'Country Code' found")),
        }
    };

    let column = |name: &str| {
        headers.iter().position(|h| h.trim() == name)
            .ok_or_else(|| anyhow!("Column '{}' not found in population CSV", name))
    };
    let name_idx = column("Country Name")?;
    let code_idx = column("Country Code")?;
    let year_idx = column(year)?;

    let mut rows = Vec::new();

    for result in records {
        let record = result?;
        let code = record.get(code_idx).unwrap_or("").trim().to_string();
        if code.is_empty() { continue; }

        let population = parse_population_value(record.get(year_idx).unwrap_or(""))
            .with_context(|| format!("Bad {} population for '{}'", year, code))?;

        rows.push(PopulationRow {
            code,
            name: record.get(name_idx).unwrap_or("").trim().to_string(),
            population,
        });
    }

    Ok(rows)
}

pub fn load_capitals(config: &CapitalsConfig) -> Result<Vec<CapitalRecord>> {
    let file = File::open(&config.path)
        .with_context(|| format!("Failed to open capitals CSV: {:?}", config.path))?;
    let capitals = parse_capitals(file, config)
        .with_context(|| format!("Failed to read capitals CSV: {:?}", config.path))?;
    info!("Loaded {} capitals", capitals.len());
    Ok(capitals)
}

pub fn parse_capitals<R: Read>(reader: R, config: &CapitalsConfig) -> Result<Vec<CapitalRecord>> {
    let mut rdr = ReaderBuilder::new().from_reader(reader);
    let headers = rdr.headers()?.clone();

    let column = |name: &str| {
        headers.iter().position(|h| h == name)
            .ok_or_else(|| anyhow!("Column '{}' not found in capitals CSV", name))
    };
    let name_idx = column(&config.name_column)?;
    let country_idx = column(&config.country_column)?;
    let lon_idx = column(&config.lon_column)?;
    let lat_idx = column(&config.lat_column)?;

    let mut capitals = Vec::new();

    for (line, result) in rdr.records().enumerate() {
        let record = result?;
        let coordinate = |idx: usize| -> Result<f64> {
            let raw = record.get(idx).unwrap_or("").trim();
            raw.parse::<f64>()
                .map_err(|_| anyhow!("Invalid coordinate '{}' in capitals row {}", raw, line + 1))
        };

        capitals.push(CapitalRecord {
            name: record.get(name_idx).unwrap_or("").to_string(),
            country: record.get(country_idx).unwrap_or("").to_string(),
            lon: coordinate(lon_idx)?,
            lat: coordinate(lat_idx)?,
        });
    }

    Ok(capitals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const POPULATION: &str = "\"Data Source\",\"World Development Indicators\",\n\
\n\
\"Last Updated Date\",\"2020-12-16\",\n\
\n\
\"Country Name\",\"Country Code\",\"Indicator Name\",\"Indicator Code\",\"2018\",\"2019\",\n\
\"Aruba\",\"ABW\",\"Population, total\",\"SP.POP.TOTL\",\"105845\",\"106314\",\n\
\"Eritrea\",\"ERI\",\"Population, total\",\"SP.POP.TOTL\",\"\",\"\",\n\
\"Morocco\",\"MAR\",\"Population, total\",\"SP.POP.TOTL\",\"36029138\",\"36471769.0\",\n";

    fn capitals_config() -> CapitalsConfig {
        CapitalsConfig {
            path: PathBuf::from("unused.csv"),
            name_column: "CapitalName".to_string(),
            country_column: "Country/Region".to_string(),
            lon_column: "CapitalLongitude".to_string(),
            lat_column: "CapitalLatitude".to_string(),
        }
    }

    #[test]
    fn test_population_skips_preamble() {
        let rows = parse_population(POPULATION.as_bytes(), "2019").unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].code, "ABW");
        assert_eq!(rows[0].population, Some(106_314));
        assert_eq!(rows[1].population, None);
        assert_eq!(rows[2].population, Some(36_471_769));
    }

    #[test]
    fn test_population_missing_year() {
        let err = parse_population(POPULATION.as_bytes(), "1950").unwrap_err();
        assert!(err.to_string().contains("1950"));
    }

    #[test]
    fn test_capitals() {
        let csv = "CapitalName,Country/Region,CapitalLongitude,CapitalLatitude\n\
                   Rabat,Morocco,-6.8498,34.0209\n\
                   Male,Maldives,73.5093,4.1755\n";
        let capitals = parse_capitals(csv.as_bytes(), &capitals_config()).unwrap();
        assert_eq!(capitals.len(), 2);
        assert_eq!(capitals[0].name, "Rabat");
        assert_eq!(capitals[1].country, "Maldives");
        assert!((capitals[1].lat - 4.1755).abs() < 1e-12);
    }

    #[test]
    fn test_capitals_bad_coordinate() {
        let csv = "CapitalName,Country/Region,CapitalLongitude,CapitalLatitude\n\
                   Rabat,Morocco,west,34.0209\n";
        assert!(parse_capitals(csv.as_bytes(), &capitals_config()).is_err());
    }

    #[test]
    fn test_geojson_rows() {
        let json = r#"{
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": { "NAME": "Kiribati", "ISO3": "KIR" },
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[172.0, 1.0], [173.0, 1.0], [173.0, 2.0], [172.0, 1.0]]]
                    }
                },
                {
                    "type": "Feature",
                    "properties": { "NAME": "Nowhere", "ISO3": 999 },
                    "geometry": null
                }
            ]
        }"#;
        let rows = parse_geojson_rows(json.as_bytes(), "NAME", "ISO3").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].code.as_deref(), Some("KIR"));
        assert!(matches!(rows[0].geometry, Some(CountryGeometry::Polygon(_))));
        assert_eq!(rows[1].code.as_deref(), Some("999"));
        assert!(rows[1].geometry.is_none());
    }
}
