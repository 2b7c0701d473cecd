use geo::{Area, BooleanOps, Coord, MapCoords, MultiPolygon, Point, Polygon};

/// Shape of a country's border, as read from a source file.
#[derive(Debug, Clone, PartialEq)]
pub enum CountryGeometry {
    Point(Point<f64>),
    Polygon(Polygon<f64>),
    MultiPolygon(MultiPolygon<f64>),
}

impl CountryGeometry {
    /// Single-part multipolygons surface as plain polygons.
    pub fn from_multi_polygon(mut mp: MultiPolygon<f64>) -> Self {
        if mp.0.len() == 1 {
            CountryGeometry::Polygon(mp.0.remove(0))
        } else {
            CountryGeometry::MultiPolygon(mp)
        }
    }

    pub fn to_multi_polygon(&self) -> Option<MultiPolygon<f64>> {
        match self {
            CountryGeometry::Point(_) => None,
            CountryGeometry::Polygon(p) => Some(MultiPolygon::new(vec![p.clone()])),
            CountryGeometry::MultiPolygon(mp) => Some(mp.clone()),
        }
    }

    /// Geometric union of two polygonal shapes. A point contributes nothing.
    pub fn union(&self, other: &CountryGeometry) -> CountryGeometry {
        match (self.to_multi_polygon(), other.to_multi_polygon()) {
            (Some(a), Some(b)) => Self::from_multi_polygon(a.union(&b)),
            (Some(_), None) => self.clone(),
            (None, Some(_)) => other.clone(),
            (None, None) => self.clone(),
        }
    }

    /// Planar area in the units of the current coordinates.
    pub fn unsigned_area(&self) -> f64 {
        match self {
            CountryGeometry::Point(_) => 0.0,
            CountryGeometry::Polygon(p) => p.unsigned_area(),
            CountryGeometry::MultiPolygon(mp) => mp.unsigned_area(),
        }
    }

    pub fn map_coords(&self, f: impl Fn(Coord<f64>) -> Coord<f64> + Copy) -> CountryGeometry {
        match self {
            CountryGeometry::Point(p) => CountryGeometry::Point(p.map_coords(f)),
            CountryGeometry::Polygon(p) => CountryGeometry::Polygon(p.map_coords(f)),
            CountryGeometry::MultiPolygon(mp) => CountryGeometry::MultiPolygon(mp.map_coords(f)),
        }
    }
}

/// One row of a border dataset.
#[derive(Debug, Clone)]
pub struct BorderRow {
    pub name: String,
    pub code: Option<String>,
    pub geometry: Option<CountryGeometry>,
}

#[derive(Debug, Clone)]
pub struct BorderDataset {
    pub key: String,
    pub name_column: String,
    pub code_column: String,
    pub crs: Option<String>,
    pub rows: Vec<BorderRow>,
}

#[derive(Debug, Clone)]
pub struct PopulationRow {
    pub code: String,
    pub name: String,
    pub population: Option<u64>,
}

/// A border row after the outer join with the population table.
#[derive(Debug, Clone)]
pub struct CountryRecord {
    pub name: Option<String>,
    pub code: Option<String>,
    pub population_name: Option<String>,
    pub population_code: Option<String>,
    pub geometry: Option<CountryGeometry>,
    pub population: Option<u64>,
    pub population_density: Option<f64>, // people per km²
}

#[derive(Debug, Clone, PartialEq)]
pub struct CapitalRecord {
    pub name: String,
    pub country: String,
    pub lon: f64,
    pub lat: f64,
}
