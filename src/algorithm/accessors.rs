//! Structural queries on a single handle.

use geo::line_intersection::{line_intersection, LineIntersection};
use geo::{Geometry, GeometryCollection, Line, LineString, MultiLineString, MultiPoint, Point};
use itertools::Itertools;

use crate::codec::wkt::is_empty_point;
use crate::error::{GeoBlobError, GeoBlobResult};
use crate::handle::{coord_count, GeometryHandle};

/// Topological dimension: 0 for points, 1 for lines, 2 for polygons, the largest member
/// dimension for collections (0 when there are none).
pub fn dimension(geometry: &Geometry) -> i32 {
    match geometry {
        Geometry::Point(_) | Geometry::MultiPoint(_) => 0,
        Geometry::Line(_) | Geometry::LineString(_) | Geometry::MultiLineString(_) => 1,
        Geometry::Polygon(_)
        | Geometry::MultiPolygon(_)
        | Geometry::Rect(_)
        | Geometry::Triangle(_) => 2,
        Geometry::GeometryCollection(collection) => {
            collection.0.iter().map(dimension).max().unwrap_or(0)
        }
    }
}

/// Whether a geometry has no coordinates at all.
pub fn is_empty(geometry: &Geometry) -> bool {
    match geometry {
        Geometry::Point(point) => is_empty_point(point),
        Geometry::Line(_) | Geometry::Rect(_) | Geometry::Triangle(_) => false,
        Geometry::LineString(line) => line.0.is_empty(),
        Geometry::Polygon(polygon) => polygon.exterior().0.is_empty(),
        Geometry::MultiPoint(multi_point) => multi_point.0.iter().all(is_empty_point),
        Geometry::MultiLineString(multi_line) => multi_line.0.iter().all(|line| line.0.is_empty()),
        Geometry::MultiPolygon(multi_polygon) => multi_polygon
            .0
            .iter()
            .all(|polygon| polygon.exterior().0.is_empty()),
        Geometry::GeometryCollection(collection) => collection.0.iter().all(is_empty),
    }
}

/// Total number of vertices, ring closing vertices included.
pub fn num_vertices(geometry: &Geometry) -> usize {
    match geometry {
        Geometry::Point(point) => usize::from(!is_empty_point(point)),
        Geometry::Line(_) => 2,
        Geometry::LineString(line) => line.0.len(),
        Geometry::Polygon(polygon) => {
            polygon.exterior().0.len()
                + polygon
                    .interiors()
                    .iter()
                    .map(|ring| ring.0.len())
                    .sum::<usize>()
        }
        Geometry::Rect(_) => 5,
        Geometry::Triangle(_) => 4,
        Geometry::MultiPoint(multi_point) => multi_point
            .0
            .iter()
            .filter(|point| !is_empty_point(point))
            .count(),
        Geometry::MultiLineString(multi_line) => multi_line.0.iter().map(|line| line.0.len()).sum(),
        Geometry::MultiPolygon(multi_polygon) => multi_polygon
            .0
            .iter()
            .map(|polygon| num_vertices(&Geometry::Polygon(polygon.clone())))
            .sum(),
        Geometry::GeometryCollection(collection) => collection.0.iter().map(num_vertices).sum(),
    }
}

/// Number of members of a collection; 1 for a non-empty single geometry, 0 for an empty one.
pub fn num_geometries(geometry: &Geometry) -> usize {
    match geometry {
        Geometry::MultiPoint(multi_point) => multi_point.0.len(),
        Geometry::MultiLineString(multi_line) => multi_line.0.len(),
        Geometry::MultiPolygon(multi_polygon) => multi_polygon.0.len(),
        Geometry::GeometryCollection(collection) => collection.0.len(),
        single => usize::from(!is_empty(single)),
    }
}

/// Number of vertices of a linestring; `None` for every other kind.
pub fn num_points(geometry: &Geometry) -> Option<usize> {
    match geometry {
        Geometry::LineString(line) => Some(line.0.len()),
        _ => None,
    }
}

pub fn is_collection(geometry: &Geometry) -> bool {
    matches!(
        geometry,
        Geometry::MultiPoint(_)
            | Geometry::MultiLineString(_)
            | Geometry::MultiPolygon(_)
            | Geometry::GeometryCollection(_)
    )
}

/// Whether every linear part starts where it ends. Areal and puntal geometries are closed;
/// empty ones are not.
pub fn is_closed(geometry: &Geometry) -> bool {
    if is_empty(geometry) {
        return false;
    }
    match geometry {
        Geometry::LineString(line) => line.is_closed(),
        Geometry::Line(line) => line.start == line.end,
        Geometry::MultiLineString(multi_line) => multi_line
            .0
            .iter()
            .all(|line| line.0.is_empty() || line.is_closed()),
        Geometry::GeometryCollection(collection) => collection
            .0
            .iter()
            .all(|member| is_empty(member) || is_closed(member)),
        _ => true,
    }
}

/// Whether a linestring is closed and does not touch itself anywhere else.
pub fn is_ring(geometry: &Geometry) -> bool {
    match geometry {
        Geometry::LineString(line) => line.0.len() >= 4 && line.is_closed() && is_simple(line),
        _ => false,
    }
}

fn is_simple(line: &LineString) -> bool {
    let segments: Vec<Line> = line.lines().filter(|s| s.start != s.end).collect();
    let closed = line.is_closed();
    let last = segments.len().saturating_sub(1);
    for ((i, a), (j, b)) in segments.iter().enumerate().tuple_combinations() {
        let Some(intersection) = line_intersection(*a, *b) else {
            continue;
        };
        // Consecutive segments may only share the vertex that joins them.
        let shared = if j == i + 1 {
            Some(a.end)
        } else if closed && i == 0 && j == last {
            Some(a.start)
        } else {
            None
        };
        match (intersection, shared) {
            (LineIntersection::SinglePoint { intersection, .. }, Some(shared))
                if intersection == shared => {}
            _ => return false,
        }
    }
    true
}

/// The OGC type name in upper case, e.g. `POINT` or `MULTIPOLYGON`.
pub fn geometry_type(geometry: &Geometry) -> &'static str {
    match geometry {
        Geometry::Point(_) => "POINT",
        Geometry::Line(_) | Geometry::LineString(_) => "LINESTRING",
        Geometry::Polygon(_) | Geometry::Rect(_) | Geometry::Triangle(_) => "POLYGON",
        Geometry::MultiPoint(_) => "MULTIPOINT",
        Geometry::MultiLineString(_) => "MULTILINESTRING",
        Geometry::MultiPolygon(_) => "MULTIPOLYGON",
        Geometry::GeometryCollection(_) => "GEOMETRYCOLLECTION",
    }
}

/// The `n`th vertex of a linestring, counting from 1. Negative values count back from the end
/// (-1 is the last vertex). `None` for other kinds and for indices out of range.
pub fn point_n(handle: &GeometryHandle, n: i32) -> Option<GeometryHandle> {
    let Geometry::LineString(line) = handle.geometry() else {
        return None;
    };
    let len = line.0.len() as i64;
    let index = match i64::from(n) {
        0 => return None,
        n if n > 0 => n - 1,
        n => len + n,
    };
    if !(0..len).contains(&index) {
        return None;
    }
    let coord = line.0[index as usize];
    Some(handle.derive_part(Geometry::Point(Point(coord)), index as usize))
}

pub fn start_point(handle: &GeometryHandle) -> Option<GeometryHandle> {
    point_n(handle, 1)
}

pub fn end_point(handle: &GeometryHandle) -> Option<GeometryHandle> {
    point_n(handle, -1)
}

/// The combinatorial boundary.
pub fn boundary(handle: &GeometryHandle) -> GeoBlobResult<GeometryHandle> {
    let boundary = match handle.geometry() {
        Geometry::Point(_) | Geometry::MultiPoint(_) => {
            Geometry::GeometryCollection(GeometryCollection(vec![]))
        }
        Geometry::Line(line) => line_boundary(&[LineString::from(*line)]),
        Geometry::LineString(line) => line_boundary(std::slice::from_ref(line)),
        Geometry::MultiLineString(multi_line) => line_boundary(&multi_line.0),
        Geometry::Polygon(polygon) if polygon.interiors().is_empty() => {
            Geometry::LineString(polygon.exterior().clone())
        }
        Geometry::Polygon(polygon) => Geometry::MultiLineString(MultiLineString(
            std::iter::once(polygon.exterior())
                .chain(polygon.interiors())
                .cloned()
                .collect(),
        )),
        Geometry::Rect(rect) => Geometry::LineString(rect.to_polygon().exterior().clone()),
        Geometry::Triangle(triangle) => {
            Geometry::LineString(triangle.to_polygon().exterior().clone())
        }
        Geometry::MultiPolygon(multi_polygon) => Geometry::MultiLineString(MultiLineString(
            multi_polygon
                .0
                .iter()
                .flat_map(|polygon| std::iter::once(polygon.exterior()).chain(polygon.interiors()))
                .filter(|ring| !ring.0.is_empty())
                .cloned()
                .collect(),
        )),
        Geometry::GeometryCollection(_) => {
            return Err(GeoBlobError::geometry(
                "ST_Boundary is not defined for geometry collections",
            ))
        }
    };
    Ok(handle.derive(boundary))
}

/// Endpoints that occur an odd number of times (the mod-2 rule).
fn line_boundary(lines: &[LineString]) -> Geometry {
    let mut endpoints: Vec<(geo::Coord, usize)> = vec![];
    for line in lines.iter().filter(|line| !line.is_closed()) {
        for endpoint in [line.0.first(), line.0.last()].into_iter().flatten() {
            match endpoints.iter_mut().find(|(coord, _)| coord == endpoint) {
                Some((_, count)) => *count += 1,
                None => endpoints.push((*endpoint, 1)),
            }
        }
    }
    Geometry::MultiPoint(MultiPoint(
        endpoints
            .into_iter()
            .filter(|(_, count)| count % 2 == 1)
            .map(|(coord, _)| Point(coord))
            .collect(),
    ))
}

/// The leaf members of a geometry, flattening nested collections. A single geometry dumps to
/// itself. Members keep their Z values.
pub fn dump(handle: &GeometryHandle) -> Vec<GeometryHandle> {
    fn collect(geometry: &Geometry, out: &mut Vec<Geometry>) {
        match geometry {
            Geometry::MultiPoint(multi_point) => {
                out.extend(multi_point.0.iter().copied().map(Geometry::Point))
            }
            Geometry::MultiLineString(multi_line) => {
                out.extend(multi_line.0.iter().cloned().map(Geometry::LineString))
            }
            Geometry::MultiPolygon(multi_polygon) => {
                out.extend(multi_polygon.0.iter().cloned().map(Geometry::Polygon))
            }
            Geometry::GeometryCollection(collection) => {
                for member in &collection.0 {
                    collect(member, out);
                }
            }
            single => out.push(single.clone()),
        }
    }

    if !is_collection(handle.geometry()) {
        return vec![handle.derive_part(handle.geometry().clone(), 0)];
    }
    let mut members = vec![];
    collect(handle.geometry(), &mut members);
    let mut offset = 0;
    members
        .into_iter()
        .map(|member| {
            let len = coord_count(&member);
            let part = handle.derive_part(member, offset);
            offset += len;
            part
        })
        .collect()
}

#[cfg(test)]
mod test {
    use geo::line_string;

    use super::*;
    use crate::test::geometry::{gc0, ls0, mls0, mp0, mpoly0, p0, poly0, poly1, ring0};

    #[test]
    fn dimensions() {
        assert_eq!(dimension(&Geometry::Point(p0())), 0);
        assert_eq!(dimension(&ls0()), 1);
        assert_eq!(dimension(&poly0()), 2);
        assert_eq!(dimension(&gc0()), 2);
        assert_eq!(
            dimension(&Geometry::GeometryCollection(GeometryCollection(vec![]))),
            0
        );
    }

    #[test]
    fn counts() {
        assert_eq!(num_vertices(&poly1()), 10);
        assert_eq!(num_vertices(&mp0()), 3);
        assert_eq!(num_vertices(&gc0()), 1 + 2 + 5);
        assert_eq!(num_geometries(&mpoly0()), 2);
        assert_eq!(num_geometries(&ls0()), 1);
        assert_eq!(num_points(&ls0()), Some(2));
        assert_eq!(num_points(&poly0()), None);
    }

    #[test]
    fn emptiness() {
        assert!(is_empty(&Geometry::Point(Point::new(f64::NAN, f64::NAN))));
        assert!(is_empty(&Geometry::LineString(LineString::new(vec![]))));
        assert!(is_empty(&Geometry::GeometryCollection(GeometryCollection(
            vec![]
        ))));
        assert!(!is_empty(&gc0()));
    }

    #[test]
    fn closed_and_rings() {
        assert!(!is_closed(&ls0()));
        assert!(is_closed(&ring0()));
        assert!(is_closed(&poly0()));
        assert!(!is_closed(&mls0()));
        assert!(!is_closed(&Geometry::LineString(LineString::new(vec![]))));

        assert!(is_ring(&ring0()));
        assert!(!is_ring(&ls0()));
        let bowtie = Geometry::LineString(line_string![
            (x: 0., y: 0.),
            (x: 1., y: 1.),
            (x: 1., y: 0.),
            (x: 0., y: 1.),
            (x: 0., y: 0.)
        ]);
        assert!(is_closed(&bowtie));
        assert!(!is_ring(&bowtie));
    }

    #[test]
    fn point_n_is_one_based() {
        let handle = GeometryHandle::new(ls0(), 4326);
        let first = point_n(&handle, 1).unwrap();
        assert_eq!(first.geometry(), &Geometry::Point(Point::new(0., 1.)));
        assert_eq!(first.srid(), 4326);
        let last = point_n(&handle, 2).unwrap();
        assert_eq!(last.geometry(), &Geometry::Point(Point::new(1., 2.)));
        assert_eq!(point_n(&handle, -1).unwrap(), last);
        assert!(point_n(&handle, 0).is_none());
        assert!(point_n(&handle, 3).is_none());
        assert!(point_n(&handle, -3).is_none());
        assert!(point_n(&GeometryHandle::new(poly0(), 0), 1).is_none());
    }

    #[test]
    fn boundaries() {
        let handle = GeometryHandle::new(ls0(), 0);
        assert_eq!(
            boundary(&handle).unwrap().geometry(),
            &Geometry::MultiPoint(MultiPoint(vec![Point::new(0., 1.), Point::new(1., 2.)]))
        );
        let handle = GeometryHandle::new(poly1(), 0);
        assert!(matches!(
            boundary(&handle).unwrap().geometry(),
            Geometry::MultiLineString(lines) if lines.0.len() == 2
        ));
        let handle = GeometryHandle::new(ring0(), 0);
        assert_eq!(
            boundary(&handle).unwrap().geometry(),
            &Geometry::MultiPoint(MultiPoint(vec![]))
        );
        assert!(boundary(&GeometryHandle::new(gc0(), 0)).is_err());
    }

    #[test]
    fn dump_flattens() {
        let handle = GeometryHandle::new(
            Geometry::GeometryCollection(GeometryCollection(vec![mp0(), ls0()])),
            4326,
        );
        let members = dump(&handle);
        assert_eq!(members.len(), 4);
        assert!(members.iter().all(|member| member.srid() == 4326));

        let single = dump(&GeometryHandle::point(1., 2., Some(3.), 0));
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].z(), Some(3.));
    }

    #[test]
    fn vertices_and_members_keep_z() {
        let line = GeometryHandle::new(ls0(), 0)
            .with_z_values(Some(vec![10., 20.]))
            .unwrap();
        assert_eq!(point_n(&line, -1).unwrap().z(), Some(20.));
        assert_eq!(start_point(&line).unwrap().z(), Some(10.));

        let collection = GeometryHandle::new(
            Geometry::GeometryCollection(GeometryCollection(vec![mp0(), ls0()])),
            0,
        )
        .with_z_values(Some(vec![1., 2., 3., 4., 5.]))
        .unwrap();
        let members = dump(&collection);
        assert_eq!(members[2].z(), Some(3.));
        assert_eq!(members[3].z_values(), Some(&[4., 5.][..]));
    }
}
