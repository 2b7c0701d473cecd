use crate::types::CountryGeometry;
use geo::Coord;

const WGS84_SEMI_MAJOR: f64 = 6_378_137.0;
const WGS84_FLATTENING: f64 = 1.0 / 298.257_223_563;

/// Lambert cylindrical equal-area projection on an ellipsoid
/// (`+proj=cea`, standard parallel at the equator). Output is in metres.
#[derive(Debug, Clone, Copy)]
pub struct CylindricalEqualArea {
    semi_major: f64,
    e: f64,
    e2: f64,
    central_meridian: f64,
}

impl CylindricalEqualArea {
    pub fn wgs84() -> Self {
        let e2 = WGS84_FLATTENING * (2.0 - WGS84_FLATTENING);
        Self {
            semi_major: WGS84_SEMI_MAJOR,
            e: e2.sqrt(),
            e2,
            central_meridian: 0.0,
        }
    }

    // Authalic q(φ) from Snyder, eq. 3-12.
    fn q(&self, sin_phi: f64) -> f64 {
        let e_sin = self.e * sin_phi;
        (1.0 - self.e2)
            * (sin_phi / (1.0 - e_sin * e_sin)
                - (1.0 / (2.0 * self.e)) * ((1.0 - e_sin) / (1.0 + e_sin)).ln())
    }

    /// Projects a lon/lat coordinate in degrees.
    pub fn project(&self, lonlat: Coord<f64>) -> Coord<f64> {
        let lat = lonlat.y.clamp(-90.0, 90.0).to_radians();
        let lon = (lonlat.x - self.central_meridian).to_radians();
        Coord {
            x: self.semi_major * lon,
            y: self.semi_major * self.q(lat.sin()) / 2.0,
        }
    }

    pub fn project_geometry(&self, geometry: &CountryGeometry) -> CountryGeometry {
        let projection = *self;
        geometry.map_coords(move |c| projection.project(c))
    }

    /// Area in square metres of a lon/lat geometry.
    pub fn projected_area_m2(&self, geometry: &CountryGeometry) -> f64 {
        self.project_geometry(geometry).unsigned_area()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, GeodesicArea};

    fn cell(lon: f64, lat: f64, size: f64) -> geo::Polygon<f64> {
        polygon![
            (x: lon, y: lat),
            (x: lon + size, y: lat),
            (x: lon + size, y: lat + size),
            (x: lon, y: lat + size),
            (x: lon, y: lat),
        ]
    }

    #[test]
    fn test_origin_stays_put() {
        let c = CylindricalEqualArea::wgs84().project(Coord { x: 0.0, y: 0.0 });
        assert!(c.x.abs() < 1e-9);
        assert!(c.y.abs() < 1e-9);
    }

    #[test]
    fn test_one_degree_of_longitude() {
        let c = CylindricalEqualArea::wgs84().project(Coord { x: 1.0, y: 1.0 });
        assert!((c.x - 111_319.490_793).abs() < 1e-3);
        assert!((c.y - 110_568.812_400).abs() < 1e-3);
    }

    #[test]
    fn test_equator_cell_area() {
        let geometry = CountryGeometry::Polygon(cell(0.0, 0.0, 1.0));
        let km2 = CylindricalEqualArea::wgs84().projected_area_m2(&geometry) / 1e6;
        assert!((km2 - 12_308.46).abs() < 0.1);
    }

    #[test]
    fn test_matches_geodesic_area() {
        let projection = CylindricalEqualArea::wgs84();
        for (lat, size) in [(-40.0, 1.0), (50.0, 2.0), (70.0, 1.0)] {
            let polygon = cell(12.0, lat, size);
            let expected = polygon.geodesic_area_unsigned();
            let actual = projection.projected_area_m2(&CountryGeometry::Polygon(polygon));
            assert!(((actual - expected) / expected).abs() < 1e-3, "lat {}", lat);
        }
    }

    #[test]
    fn test_degrees_are_not_equal_area() {
        let projection = CylindricalEqualArea::wgs84();
        let low = CountryGeometry::Polygon(cell(0.0, 0.0, 1.0));
        let high = CountryGeometry::Polygon(cell(0.0, 60.0, 1.0));
        assert_eq!(low.unsigned_area(), high.unsigned_area());
        assert!(projection.projected_area_m2(&high) < projection.projected_area_m2(&low) * 0.6);
    }
}
