//! Minimum distance between two handles.
//!
//! Planar distances are in the units of the coordinates. Spheroidal distances treat the
//! coordinates as longitude/latitude degrees on WGS84 and return meters.

use geo::{
    Closest, ClosestPoint, Coord, EuclideanDistance, GeodesicDistance, Geometry, Intersects, Line,
    Point,
};

use crate::algorithm::accessors::is_empty;
use crate::codec::wkt::is_empty_point;
use crate::error::{GeoBlobError, GeoBlobResult};
use crate::handle::GeometryHandle;

/// The isolated vertices and the segments of a geometry.
#[derive(Debug, Default)]
struct Parts {
    points: Vec<Coord>,
    segments: Vec<Line>,
}

impl Parts {
    fn new(geometry: &Geometry) -> Self {
        let mut parts = Self::default();
        parts.add(geometry);
        parts
    }

    fn add(&mut self, geometry: &Geometry) {
        match geometry {
            Geometry::Point(point) => self.add_point(point),
            Geometry::MultiPoint(multi_point) => {
                multi_point.0.iter().for_each(|point| self.add_point(point))
            }
            Geometry::Line(line) => self.segments.push(*line),
            Geometry::LineString(line) => self.add_path(&line.0),
            Geometry::MultiLineString(multi_line) => {
                multi_line.0.iter().for_each(|line| self.add_path(&line.0))
            }
            Geometry::Polygon(polygon) => {
                self.add_path(&polygon.exterior().0);
                polygon
                    .interiors()
                    .iter()
                    .for_each(|ring| self.add_path(&ring.0));
            }
            Geometry::MultiPolygon(multi_polygon) => multi_polygon
                .0
                .iter()
                .for_each(|polygon| self.add(&Geometry::Polygon(polygon.clone()))),
            Geometry::Rect(rect) => self.add(&Geometry::Polygon(rect.to_polygon())),
            Geometry::Triangle(triangle) => self.add(&Geometry::Polygon(triangle.to_polygon())),
            Geometry::GeometryCollection(collection) => {
                collection.0.iter().for_each(|member| self.add(member))
            }
        }
    }

    fn add_point(&mut self, point: &Point) {
        if !is_empty_point(point) {
            self.points.push(point.0);
        }
    }

    fn add_path(&mut self, coords: &[Coord]) {
        match coords {
            [] => {}
            [single] => self.points.push(*single),
            coords => self
                .segments
                .extend(coords.windows(2).map(|pair| Line::new(pair[0], pair[1]))),
        }
    }
}

fn planar(a: Coord, b: Coord) -> f64 {
    Point(a).euclidean_distance(&Point(b))
}

fn project(coord: Coord, segment: &Line) -> Coord {
    match segment.closest_point(&Point(coord)) {
        Closest::Intersection(point) | Closest::SinglePoint(point) => point.0,
        Closest::Indeterminate => segment.start,
    }
}

fn closer(best: Option<(Coord, Coord)>, candidate: (Coord, Coord)) -> Option<(Coord, Coord)> {
    match best {
        Some(best) if planar(best.0, best.1) <= planar(candidate.0, candidate.1) => Some(best),
        _ => Some(candidate),
    }
}

/// The pair of coordinates, one on each side, that realizes the planar distance.
///
/// Only meaningful for geometries that do not intersect.
fn closest_pair(a: &Parts, b: &Parts) -> Option<(Coord, Coord)> {
    let mut best = None;
    for &p in &a.points {
        for &q in &b.points {
            best = closer(best, (p, q));
        }
        for segment in &b.segments {
            best = closer(best, (p, project(p, segment)));
        }
    }
    for segment in &a.segments {
        for &q in &b.points {
            best = closer(best, (project(q, segment), q));
        }
        for other in &b.segments {
            // Disjoint segments are closest at an endpoint of one of them.
            for candidate in [
                (segment.start, project(segment.start, other)),
                (segment.end, project(segment.end, other)),
                (project(other.start, segment), other.start),
                (project(other.end, segment), other.end),
            ] {
                best = closer(best, candidate);
            }
        }
    }
    best
}

/// Minimum distance between two handles, or `None` when either has no coordinates.
///
/// Both handles must share an SRID. Planar distances come straight from `geo`. With
/// `use_spheroid` the planar closest pair is measured along the WGS84 geodesic.
pub fn distance(
    a: &GeometryHandle,
    b: &GeometryHandle,
    use_spheroid: bool,
) -> GeoBlobResult<Option<f64>> {
    if a.srid() != b.srid() {
        return Err(GeoBlobError::geometry(format!(
            "operation on mixed SRID geometries ({} != {})",
            a.srid(),
            b.srid()
        )));
    }
    if is_empty(a.geometry()) || is_empty(b.geometry()) {
        return Ok(None);
    }
    if a.geometry().intersects(b.geometry()) {
        return Ok(Some(0.));
    }
    if !use_spheroid {
        return Ok(Some(a.geometry().euclidean_distance(b.geometry())));
    }
    let Some((p, q)) = closest_pair(&Parts::new(a.geometry()), &Parts::new(b.geometry())) else {
        return Ok(None);
    };
    Ok(Some(Point(p).geodesic_distance(&Point(q))))
}
