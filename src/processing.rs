use crate::projection::CylindricalEqualArea;
use crate::types::{BorderRow, CountryGeometry, CountryRecord, PopulationRow};
use std::collections::{HashMap, HashSet};
use tracing::info;

const M2_PER_KM2: f64 = 1_000_000.0;

/// Outer join of border rows and population rows on country code.
/// Border rows keep their order; population rows with no border match are
/// appended afterwards in file order.
pub fn join_population(rows: Vec<BorderRow>, population: &[PopulationRow]) -> Vec<CountryRecord> {
    let by_code: HashMap<&str, &PopulationRow> = population.iter()
        .map(|p| (p.code.as_str(), p))
        .collect();
    let mut matched: HashSet<&str> = HashSet::new();

    let mut records: Vec<CountryRecord> = rows.into_iter().map(|row| {
        let pop = row.code.as_deref().and_then(|code| by_code.get(code).copied());
        if let Some(p) = pop {
            matched.insert(p.code.as_str());
        }
        CountryRecord {
            name: Some(row.name),
            code: row.code,
            population_name: pop.map(|p| p.name.clone()),
            population_code: pop.map(|p| p.code.clone()),
            geometry: row.geometry,
            population: pop.and_then(|p| p.population),
            population_density: None,
        }
    }).collect();

    let unmatched = population.iter().filter(|p| !matched.contains(p.code.as_str()));
    for p in unmatched {
        records.push(CountryRecord {
            name: None,
            code: None,
            population_name: Some(p.name.clone()),
            population_code: Some(p.code.clone()),
            geometry: None,
            population: p.population,
            population_density: None,
        });
    }

    records
}

/// People per km². Zero when there is no shape to divide by, unknown when
/// the population is.
pub fn population_density(
    projection: &CylindricalEqualArea,
    geometry: Option<&CountryGeometry>,
    population: Option<u64>,
) -> Option<f64> {
    let area = match geometry {
        Some(geometry) => projection.projected_area_m2(geometry),
        None => return Some(0.0),
    };
    if area == 0.0 {
        return Some(0.0);
    }
    population.map(|p| p as f64 / area * M2_PER_KM2)
}

pub fn compute_densities(records: &mut [CountryRecord]) {
    let projection = CylindricalEqualArea::wgs84();
    for record in records.iter_mut() {
        record.population_density =
            population_density(&projection, record.geometry.as_ref(), record.population);
    }
    let known = records.iter().filter(|r| r.population.is_some()).count();
    info!("Computed density for {} rows ({} with population)", records.len(), known);
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, Point};

    fn cell() -> CountryGeometry {
        CountryGeometry::Polygon(polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 1.0),
            (x: 0.0, y: 0.0),
        ])
    }

    fn border(name: &str, code: &str) -> BorderRow {
        BorderRow {
            name: name.to_string(),
            code: Some(code.to_string()),
            geometry: Some(cell()),
        }
    }

    fn pop(code: &str, population: Option<u64>) -> PopulationRow {
        PopulationRow {
            code: code.to_string(),
            name: format!("{} (WB)", code),
            population,
        }
    }

    #[test]
    fn test_outer_join() {
        let rows = vec![border("Morocco", "MAR"), border("France", "-99")];
        let population = vec![pop("WLD", Some(7_000_000_000)), pop("MAR", Some(36_000_000))];
        let records = join_population(rows, &population);

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].population, Some(36_000_000));
        assert_eq!(records[0].population_name.as_deref(), Some("MAR (WB)"));
        assert_eq!(records[1].population, None);
        assert!(records[1].geometry.is_some());
        assert_eq!(records[2].population_code.as_deref(), Some("WLD"));
        assert!(records[2].name.is_none());
        assert!(records[2].geometry.is_none());
    }

    #[test]
    fn test_density_of_null_geometry_is_zero() {
        let projection = CylindricalEqualArea::wgs84();
        assert_eq!(population_density(&projection, None, Some(1_000)), Some(0.0));
        assert_eq!(population_density(&projection, None, None), Some(0.0));
    }

    #[test]
    fn test_density_of_zero_area_is_zero() {
        let projection = CylindricalEqualArea::wgs84();
        let point = CountryGeometry::Point(Point::new(10.0, 10.0));
        let density = population_density(&projection, Some(&point), Some(5_000)).unwrap();
        assert_eq!(density, 0.0);
        assert!(density.is_finite());
    }

    #[test]
    fn test_density_uses_projected_area() {
        let projection = CylindricalEqualArea::wgs84();
        let geometry = cell();
        let area = projection.projected_area_m2(&geometry);
        let density = population_density(&projection, Some(&geometry), Some(12_308_464)).unwrap();
        assert!((density - 12_308_464.0 / area * 1e6).abs() < 1e-9);
        // ~1000 people per km² over a 12,308 km² cell
        assert!((density - 1000.0).abs() < 0.01);
    }

    #[test]
    fn test_unknown_population_has_no_density() {
        let projection = CylindricalEqualArea::wgs84();
        assert_eq!(population_density(&projection, Some(&cell()), None), None);
    }

    #[test]
    fn test_compute_densities_fills_every_row() {
        let mut records = join_population(vec![border("Morocco", "MAR")], &[pop("MAR", Some(1)), pop("XKX", Some(2))]);
        compute_densities(&mut records);
        assert!(records[0].population_density.unwrap() > 0.0);
        assert_eq!(records[1].population_density, Some(0.0));
    }
}
