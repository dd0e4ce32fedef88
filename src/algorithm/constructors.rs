//! Building points, lines and polygons from coordinates and from other handles.

use geo::{Coord, Geometry, LineString, Polygon};
use log::debug;

use crate::codec::wkt::is_empty_point;
use crate::error::{GeoBlobError, GeoBlobResult};
use crate::handle::{GeometryArray, GeometryHandle};

/// A point from its ordinates, with SRID 0.
pub fn make_point(x: f64, y: f64, z: Option<f64>) -> GeometryHandle {
    GeometryHandle::point(x, y, z, 0)
}

/// The vertices a geometry contributes to a line, or `None` for a kind that has none.
fn line_vertices(geometry: &Geometry) -> Option<Vec<Coord>> {
    match geometry {
        Geometry::Point(point) if is_empty_point(point) => Some(vec![]),
        Geometry::Point(point) => Some(vec![point.0]),
        Geometry::MultiPoint(multi_point) => Some(
            multi_point
                .0
                .iter()
                .filter(|point| !is_empty_point(point))
                .map(|point| point.0)
                .collect(),
        ),
        Geometry::LineString(line) => Some(line.0.clone()),
        Geometry::Line(line) => Some(vec![line.start, line.end]),
        _ => None,
    }
}

fn append_vertices(line: &mut Vec<Coord>, vertices: Vec<Coord>, from_line: bool) {
    let mut vertices = vertices.into_iter().peekable();
    // A linestring that starts where the line so far ends shares that vertex.
    if from_line && line.last().is_some() && line.last() == vertices.peek() {
        vertices.next();
    }
    line.extend(vertices);
}

fn check_srid(srid: i32, handle: &GeometryHandle) -> GeoBlobResult<()> {
    if handle.srid() != srid {
        return Err(GeoBlobError::geometry(format!(
            "operation on mixed SRID geometries ({srid} != {})",
            handle.srid()
        )));
    }
    Ok(())
}

/// A linestring through the vertices of two points, multipoints or linestrings.
pub fn make_line(a: &GeometryHandle, b: &GeometryHandle) -> GeoBlobResult<GeometryHandle> {
    check_srid(a.srid(), b)?;
    let mut coords = vec![];
    for handle in [a, b] {
        let vertices = line_vertices(handle.geometry()).ok_or_else(|| {
            GeoBlobError::geometry("ST_MakeLine only accepts points, multipoints and linestrings")
        })?;
        let from_line = matches!(handle.geometry(), Geometry::LineString(_));
        append_vertices(&mut coords, vertices, from_line);
    }
    Ok(a.derive(Geometry::LineString(LineString::new(coords))))
}

/// A linestring through the vertices of every usable member, in order.
///
/// Members of other kinds are ignored. Returns `None` when no member contributes.
pub fn make_line_from_array(geometries: &GeometryArray) -> GeoBlobResult<Option<GeometryHandle>> {
    let mut srid = None;
    let mut coords = vec![];
    let mut used = 0;
    for handle in geometries {
        let Some(vertices) = line_vertices(handle.geometry()) else {
            debug!("ST_MakeLine ignores a non-linear array member");
            continue;
        };
        match srid {
            Some(srid) => check_srid(srid, handle)?,
            None => srid = Some(handle.srid()),
        }
        let from_line = matches!(handle.geometry(), Geometry::LineString(_));
        append_vertices(&mut coords, vertices, from_line);
        used += 1;
    }
    if used == 0 {
        return Ok(None);
    }
    Ok(Some(GeometryHandle::new(
        Geometry::LineString(LineString::new(coords)),
        srid.unwrap_or(0),
    )))
}

fn closed_ring(handle: &GeometryHandle, role: &str) -> GeoBlobResult<LineString> {
    let Geometry::LineString(line) = handle.geometry() else {
        return Err(GeoBlobError::geometry(format!("{role} is not a linestring")));
    };
    if line.0.len() < 4 {
        return Err(GeoBlobError::geometry(format!(
            "{role} must have at least 4 points"
        )));
    }
    if !line.is_closed() {
        return Err(GeoBlobError::geometry(format!("{role} must be closed")));
    }
    Ok(line.clone())
}

/// A polygon from a closed shell and optional closed hole rings.
pub fn make_polygon(
    shell: &GeometryHandle,
    holes: Option<&GeometryArray>,
) -> GeoBlobResult<GeometryHandle> {
    let exterior = closed_ring(shell, "shell")?;
    let interiors = holes
        .into_iter()
        .flatten()
        .map(|hole| closed_ring(hole, "hole"))
        .collect::<GeoBlobResult<Vec<_>>>()?;
    Ok(shell.derive(Geometry::Polygon(Polygon::new(exterior, interiors))))
}
