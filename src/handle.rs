//! Owned, transient geometry handles.
//!
//! A [`GeometryHandle`] is created by decoding a blob (or by a constructor), used by exactly one
//! operation on one row, and released when it goes out of scope. Nothing in this crate frees a
//! handle by hand: every exit path of an operation, including `?` propagation of a parse error,
//! drops the handles it created.

use std::cell::Cell;

use geo::{Coord, Geometry, Point, Polygon};

use crate::error::{GeoBlobError, GeoBlobResult};

thread_local! {
    static LIVE_HANDLES: Cell<usize> = const { Cell::new(0) };
}

/// Number of [`GeometryHandle`]s currently alive on this thread.
///
/// Operations never keep handles past the row they were created for, so this returns to zero
/// whenever no function call is in progress.
pub fn live_handles() -> usize {
    LIVE_HANDLES.with(|count| count.get())
}

/// Registration of one live handle. Dropping it releases the registration.
#[derive(Debug)]
struct LiveToken(());

impl LiveToken {
    fn acquire() -> Self {
        LIVE_HANDLES.with(|count| count.set(count.get() + 1));
        Self(())
    }
}

impl Drop for LiveToken {
    fn drop(&mut self) {
        LIVE_HANDLES.with(|count| count.set(count.get().saturating_sub(1)));
    }
}

/// A parsed geometry exclusively owned by the operation that created it.
///
/// `geo` geometries are planar, so a third ordinate is carried next to the geometry: one Z value
/// per coordinate, in the order the coordinates are serialized (exterior ring before holes,
/// members in order). An empty point counts as one coordinate.
#[derive(Debug)]
pub struct GeometryHandle {
    geometry: Geometry,
    srid: i32,
    z: Option<Vec<f64>>,
    _token: LiveToken,
}

impl GeometryHandle {
    pub fn new(geometry: Geometry, srid: i32) -> Self {
        Self {
            geometry,
            srid,
            z: None,
            _token: LiveToken::acquire(),
        }
    }

    /// A point with an optional third ordinate.
    pub fn point(x: f64, y: f64, z: Option<f64>, srid: i32) -> Self {
        let mut handle = Self::new(Geometry::Point(Point::new(x, y)), srid);
        handle.z = z.map(|z| vec![z]);
        handle
    }

    /// The empty point, stored with NaN coordinates.
    pub fn empty_point(srid: i32) -> Self {
        Self::point(f64::NAN, f64::NAN, None, srid)
    }

    /// Attach one Z value per coordinate.
    pub fn with_z_values(mut self, z: Option<Vec<f64>>) -> GeoBlobResult<Self> {
        if let Some(values) = &z {
            let expected = coord_count(&self.geometry);
            if values.len() != expected {
                return Err(GeoBlobError::parse(format!(
                    "{} Z values for a geometry with {expected} coordinates",
                    values.len()
                )));
            }
        }
        self.z = z;
        Ok(self)
    }

    pub fn with_srid(mut self, srid: i32) -> Self {
        self.srid = srid;
        self
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn srid(&self) -> i32 {
        self.srid
    }

    pub fn has_z(&self) -> bool {
        self.z.is_some()
    }

    /// The Z value of a point.
    pub fn z(&self) -> Option<f64> {
        match self.geometry {
            Geometry::Point(_) => self.z.as_deref()?.first().copied(),
            _ => None,
        }
    }

    pub fn z_values(&self) -> Option<&[f64]> {
        self.z.as_deref()
    }

    pub(crate) fn z_cursor(&self) -> ZCursor<'_> {
        ZCursor {
            values: self.z.as_deref().map(|values| values.iter()),
        }
    }

    /// Create a new planar handle for a geometry derived from this one, keeping the SRID.
    pub fn derive(&self, geometry: Geometry) -> Self {
        Self::new(geometry, self.srid)
    }

    /// Like [`derive`](Self::derive), keeping the Z values of the coordinates
    /// `offset..offset + coord_count(geometry)` of this handle.
    pub(crate) fn derive_part(&self, geometry: Geometry, offset: usize) -> Self {
        let len = coord_count(&geometry);
        let z = self
            .z
            .as_deref()
            .and_then(|values| values.get(offset..offset + len))
            .map(<[f64]>::to_vec);
        let mut handle = self.derive(geometry);
        handle.z = z;
        handle
    }
}

/// Z values handed out in coordinate order.
#[derive(Debug)]
pub(crate) struct ZCursor<'a> {
    values: Option<std::slice::Iter<'a, f64>>,
}

impl ZCursor<'_> {
    pub fn has_z(&self) -> bool {
        self.values.is_some()
    }

    pub fn next(&mut self) -> Option<f64> {
        self.values.as_mut()?.next().copied()
    }
}

/// Number of coordinates a geometry serializes. An empty point counts as one, the rings of a
/// polygon without an exterior count as none.
pub(crate) fn coord_count(geometry: &Geometry) -> usize {
    fn rings(polygon: &Polygon) -> usize {
        if polygon.exterior().0.is_empty() {
            return 0;
        }
        std::iter::once(polygon.exterior())
            .chain(polygon.interiors())
            .map(|ring| ring.0.len())
            .sum()
    }

    match geometry {
        Geometry::Point(_) => 1,
        Geometry::Line(_) => 2,
        Geometry::LineString(line) => line.0.len(),
        Geometry::Polygon(polygon) => rings(polygon),
        Geometry::Rect(rect) => rings(&rect.to_polygon()),
        Geometry::Triangle(triangle) => rings(&triangle.to_polygon()),
        Geometry::MultiPoint(multi_point) => multi_point.0.len(),
        Geometry::MultiLineString(multi_line) => multi_line.0.iter().map(|line| line.0.len()).sum(),
        Geometry::MultiPolygon(multi_polygon) => multi_polygon.0.iter().map(rings).sum(),
        Geometry::GeometryCollection(collection) => collection.0.iter().map(coord_count).sum(),
    }
}

impl PartialEq for GeometryHandle {
    fn eq(&self, other: &Self) -> bool {
        self.srid == other.srid
            && same_z(self.z.as_deref(), other.z.as_deref())
            && match (&self.geometry, &other.geometry) {
                (Geometry::Point(a), Geometry::Point(b)) => same_coord(a.0, b.0),
                (a, b) => a == b,
            }
    }
}

fn same_value(a: f64, b: f64) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

fn same_coord(a: Coord, b: Coord) -> bool {
    same_value(a.x, b.x) && same_value(a.y, b.y)
}

fn same_z(a: Option<&[f64]>, b: Option<&[f64]>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.len() == b.len() && a.iter().zip(b).all(|(a, b)| same_value(*a, *b)),
        (None, None) => true,
        _ => false,
    }
}

/// The handles aggregated from one row's list argument.
///
/// Owns every member; they are released together when the array is dropped, right after the
/// constructor that consumed them returns.
#[derive(Debug, Default)]
pub struct GeometryArray {
    handles: Vec<GeometryHandle>,
}

impl GeometryArray {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            handles: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, handle: GeometryHandle) {
        self.handles.push(handle);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GeometryHandle> {
        self.handles.iter()
    }
}

impl<'a> IntoIterator for &'a GeometryArray {
    type Item = &'a GeometryHandle;
    type IntoIter = std::slice::Iter<'a, GeometryHandle>;

    fn into_iter(self) -> Self::IntoIter {
        self.handles.iter()
    }
}
