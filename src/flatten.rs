//! Turns border geometries into the nested x/y arrays expected by a
//! multi-polygon glyph: one entry per part, each part a list of rings
//! (exterior first, then holes).

use crate::types::CountryGeometry;
use geo::{LineString, Polygon};
use serde::ser::{Serialize, SerializeSeq, Serializer};

/// One axis of a flattened geometry.
#[derive(Debug, Clone, PartialEq)]
pub enum FlatCoords {
    /// Placeholder for a row without geometry, serialized as `[0]`.
    Sentinel,
    /// A point's bare coordinate.
    Scalar(f64),
    /// parts -> rings -> values
    Parts(Vec<Vec<Vec<f64>>>),
}

impl Serialize for FlatCoords {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FlatCoords::Sentinel => {
                let mut seq = serializer.serialize_seq(Some(1))?;
                seq.serialize_element(&0)?;
                seq.end()
            }
            FlatCoords::Scalar(v) => serializer.serialize_f64(*v),
            FlatCoords::Parts(parts) => parts.serialize(serializer),
        }
    }
}

fn ring_axes(ring: &LineString<f64>) -> (Vec<f64>, Vec<f64>) {
    ring.coords().map(|c| (c.x, c.y)).unzip()
}

fn polygon_axes(polygon: &Polygon<f64>) -> (Vec<Vec<f64>>, Vec<Vec<f64>>) {
    std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .map(ring_axes)
        .unzip()
}

pub fn flatten(geometry: Option<&CountryGeometry>) -> (FlatCoords, FlatCoords) {
    match geometry {
        None => (FlatCoords::Sentinel, FlatCoords::Sentinel),
        Some(CountryGeometry::Point(p)) => (FlatCoords::Scalar(p.x()), FlatCoords::Scalar(p.y())),
        Some(CountryGeometry::Polygon(p)) => {
            let (xs, ys) = polygon_axes(p);
            (FlatCoords::Parts(vec![xs]), FlatCoords::Parts(vec![ys]))
        }
        Some(CountryGeometry::MultiPolygon(mp)) => {
            let (xs, ys) = mp.iter().map(polygon_axes).unzip();
            (FlatCoords::Parts(xs), FlatCoords::Parts(ys))
        }
    }
}

/// Flattens a whole geometry column, one output row per input row.
pub fn flatten_column<'a, I>(geometries: I) -> (Vec<FlatCoords>, Vec<FlatCoords>)
where
    I: IntoIterator<Item = Option<&'a CountryGeometry>>,
{
    geometries.into_iter().map(flatten).unzip()
}
