//! GeoJSON-shaped geometry attached to org units.
//!
//! Only the shapes the reference system knows about are modelled: a point
//! (unit location), a single polygon, and a multipolygon. Serialization is
//! plain GeoJSON: `{"type": "Point", "coordinates": [x, y]}`.

use serde::{Deserialize, Serialize};

/// A coordinate tuple, `[x, y]` or `[x, y, z]`.
pub type Position = Vec<f64>;

/// Geometry of an org unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point(Position),
    Polygon(Vec<Vec<Position>>),
    MultiPolygon(Vec<Vec<Vec<Position>>>),
}

impl Geometry {
    /// A two-dimensional point.
    pub fn point(x: f64, y: f64) -> Self {
        Self::Point(vec![x, y])
    }

    /// `(x, y)` if this is a point with at least two coordinates.
    pub fn as_point(&self) -> Option<(f64, f64)> {
        match self {
            Self::Point(p) if p.len() >= 2 => Some((p[0], p[1])),
            _ => None,
        }
    }

    /// Planar distance between two points, in coordinate units.
    ///
    /// Returns `None` unless both geometries are points.
    pub fn planar_distance(&self, other: &Geometry) -> Option<f64> {
        let (x1, y1) = self.as_point()?;
        let (x2, y2) = other.as_point()?;
        Some(((x1 - x2).powi(2) + (y1 - y2).powi(2)).sqrt())
    }

    /// Copy of this geometry with every position cut to its first two
    /// coordinates (altitude dropped).
    pub fn truncated_2d(&self) -> Geometry {
        fn cut(p: &Position) -> Position {
            p.iter().take(2).copied().collect()
        }
        match self {
            Self::Point(p) => Self::Point(cut(p)),
            Self::Polygon(rings) => {
                Self::Polygon(rings.iter().map(|r| r.iter().map(cut).collect()).collect())
            }
            Self::MultiPolygon(polys) => Self::MultiPolygon(
                polys
                    .iter()
                    .map(|rings| rings.iter().map(|r| r.iter().map(cut).collect()).collect())
                    .collect(),
            ),
        }
    }

    /// The GeoJSON `type` member.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Point(_) => "Point",
            Self::Polygon(_) => "Polygon",
            Self::MultiPolygon(_) => "MultiPolygon",
        }
    }

    /// The reference system's legacy `featureType` for this shape.
    pub fn feature_type(&self) -> &'static str {
        match self {
            Self::Point(_) => "POINT",
            Self::Polygon(_) => "POLYGON",
            Self::MultiPolygon(_) => "MULTI_POLYGON",
        }
    }

    /// Returns `true` for shapes made of more than one part.
    pub fn is_compound(&self) -> bool {
        matches!(self, Self::MultiPolygon(polys) if polys.len() > 1)
    }

    /// The `coordinates` member as a JSON value.
    pub fn coordinates_json(&self) -> serde_json::Value {
        match self {
            Self::Point(p) => serde_json::json!(p),
            Self::Polygon(rings) => serde_json::json!(rings),
            Self::MultiPolygon(polys) => serde_json::json!(polys),
        }
    }
}
