//! A geozero [`GeomProcessor`] that assembles one [`geo::Geometry`] from a WKT or GeoJSON stream.

use geo::{
    Coord, Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon,
    Point, Polygon,
};
use geozero::error::{GeozeroError, Result};
use geozero::{CoordDimensions, GeomProcessor};

use crate::error::{GeoBlobError, GeoBlobResult};

/// What a parser saw for the third ordinate of one coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Ordinate {
    /// A 2D coordinate.
    Missing,
    /// An empty point, whose ordinates are all NaN.
    Empty,
    Value(f64),
}

/// Collapse per-coordinate ordinates into the Z values of a handle. `tagged` is set when the
/// input declared a Z dimension, which then applies even if every coordinate is empty.
pub(crate) fn resolve_z(ordinates: &[Ordinate], tagged: bool) -> GeoBlobResult<Option<Vec<f64>>> {
    let has_z = tagged || ordinates.iter().any(|z| matches!(z, Ordinate::Value(_)));
    if !has_z {
        return Ok(None);
    }
    ordinates
        .iter()
        .map(|z| match z {
            Ordinate::Value(z) => Ok(*z),
            Ordinate::Empty => Ok(f64::NAN),
            Ordinate::Missing => Err(GeoBlobError::parse(
                "geometry mixes 2D and 3D coordinates",
            )),
        })
        .collect::<GeoBlobResult<Vec<_>>>()
        .map(Some)
}

/// Geometry under construction.
#[derive(Debug)]
enum Frame {
    MultiPoint,
    Polygon { tagged: bool, rings: Vec<LineString> },
    MultiLineString(Vec<LineString>),
    MultiPolygon(Vec<Polygon>),
    Collection(Vec<Geometry>),
}

#[derive(Debug, Default)]
pub(crate) struct GeometryBuilder {
    stack: Vec<Frame>,
    coords: Vec<Coord>,
    ordinates: Vec<Ordinate>,
    finished: Option<Geometry>,
}

impl GeometryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The parsed geometry and the third ordinate of each of its coordinates, in order.
    pub fn finish(self) -> Result<(Geometry, Vec<Ordinate>)> {
        if !self.stack.is_empty() {
            return Err(GeozeroError::Geometry("unterminated geometry".to_string()));
        }
        let geometry = self
            .finished
            .ok_or_else(|| GeozeroError::Geometry("no geometry found".to_string()))?;
        Ok((geometry, self.ordinates))
    }

    fn emit(&mut self, geometry: Geometry) -> Result<()> {
        match self.stack.last_mut() {
            Some(Frame::Collection(members)) => {
                members.push(geometry);
                Ok(())
            }
            None if self.finished.is_none() => {
                self.finished = Some(geometry);
                Ok(())
            }
            None => Err(GeozeroError::Geometry(
                "expected a single geometry".to_string(),
            )),
            Some(frame) => Err(GeozeroError::Geometry(format!(
                "unexpected geometry inside {frame:?}"
            ))),
        }
    }

    fn take_line(&mut self) -> LineString {
        LineString::new(std::mem::take(&mut self.coords))
    }
}

fn unbalanced(what: &str) -> GeozeroError {
    GeozeroError::Geometry(format!("unbalanced {what}"))
}

impl GeomProcessor for GeometryBuilder {
    fn dimensions(&self) -> CoordDimensions {
        CoordDimensions::xyz()
    }

    fn xy(&mut self, x: f64, y: f64, _idx: usize) -> Result<()> {
        self.coords.push(Coord { x, y });
        self.ordinates.push(Ordinate::Missing);
        Ok(())
    }

    fn coordinate(
        &mut self,
        x: f64,
        y: f64,
        z: Option<f64>,
        _m: Option<f64>,
        _t: Option<f64>,
        _tm: Option<u64>,
        _idx: usize,
    ) -> Result<()> {
        self.coords.push(Coord { x, y });
        self.ordinates
            .push(z.map_or(Ordinate::Missing, Ordinate::Value));
        Ok(())
    }

    fn empty_point(&mut self, _idx: usize) -> Result<()> {
        let empty = Coord {
            x: f64::NAN,
            y: f64::NAN,
        };
        self.ordinates.push(Ordinate::Empty);
        if let Some(Frame::MultiPoint) = self.stack.last() {
            self.coords.push(empty);
            return Ok(());
        }
        self.emit(Geometry::Point(Point(empty)))
    }

    fn point_begin(&mut self, _idx: usize) -> Result<()> {
        if !matches!(self.stack.last(), Some(Frame::MultiPoint)) {
            self.coords.clear();
        }
        Ok(())
    }

    fn point_end(&mut self, _idx: usize) -> Result<()> {
        if let Some(Frame::MultiPoint) = self.stack.last() {
            return Ok(());
        }
        let coord = self.coords.pop().ok_or_else(|| unbalanced("point"))?;
        self.emit(Geometry::Point(Point(coord)))
    }

    fn multipoint_begin(&mut self, size: usize, _idx: usize) -> Result<()> {
        self.coords = Vec::with_capacity(size);
        self.stack.push(Frame::MultiPoint);
        Ok(())
    }

    fn multipoint_end(&mut self, _idx: usize) -> Result<()> {
        match self.stack.pop() {
            Some(Frame::MultiPoint) => {
                let points = std::mem::take(&mut self.coords)
                    .into_iter()
                    .map(Point)
                    .collect();
                self.emit(Geometry::MultiPoint(MultiPoint(points)))
            }
            _ => Err(unbalanced("multipoint")),
        }
    }

    fn linestring_begin(&mut self, _tagged: bool, size: usize, _idx: usize) -> Result<()> {
        self.coords = Vec::with_capacity(size);
        Ok(())
    }

    fn linestring_end(&mut self, tagged: bool, _idx: usize) -> Result<()> {
        let line = self.take_line();
        if tagged {
            return self.emit(Geometry::LineString(line));
        }
        match self.stack.last_mut() {
            Some(Frame::Polygon { rings, .. }) | Some(Frame::MultiLineString(rings)) => {
                rings.push(line);
                Ok(())
            }
            _ => Err(unbalanced("linestring")),
        }
    }

    fn multilinestring_begin(&mut self, size: usize, _idx: usize) -> Result<()> {
        self.stack
            .push(Frame::MultiLineString(Vec::with_capacity(size)));
        Ok(())
    }

    fn multilinestring_end(&mut self, _idx: usize) -> Result<()> {
        match self.stack.pop() {
            Some(Frame::MultiLineString(lines)) => {
                self.emit(Geometry::MultiLineString(MultiLineString(lines)))
            }
            _ => Err(unbalanced("multilinestring")),
        }
    }

    fn polygon_begin(&mut self, tagged: bool, size: usize, _idx: usize) -> Result<()> {
        self.stack.push(Frame::Polygon {
            tagged,
            rings: Vec::with_capacity(size),
        });
        Ok(())
    }

    fn polygon_end(&mut self, _tagged: bool, _idx: usize) -> Result<()> {
        let (tagged, rings) = match self.stack.pop() {
            Some(Frame::Polygon { tagged, rings }) => (tagged, rings),
            _ => return Err(unbalanced("polygon")),
        };
        let mut rings = rings.into_iter();
        let exterior = rings.next().unwrap_or_else(|| LineString::new(vec![]));
        let polygon = Polygon::new(exterior, rings.collect());
        if tagged {
            return self.emit(Geometry::Polygon(polygon));
        }
        match self.stack.last_mut() {
            Some(Frame::MultiPolygon(polygons)) => {
                polygons.push(polygon);
                Ok(())
            }
            _ => Err(unbalanced("polygon")),
        }
    }

    fn multipolygon_begin(&mut self, size: usize, _idx: usize) -> Result<()> {
        self.stack
            .push(Frame::MultiPolygon(Vec::with_capacity(size)));
        Ok(())
    }

    fn multipolygon_end(&mut self, _idx: usize) -> Result<()> {
        match self.stack.pop() {
            Some(Frame::MultiPolygon(polygons)) => {
                self.emit(Geometry::MultiPolygon(MultiPolygon(polygons)))
            }
            _ => Err(unbalanced("multipolygon")),
        }
    }

    fn geometrycollection_begin(&mut self, size: usize, _idx: usize) -> Result<()> {
        self.stack.push(Frame::Collection(Vec::with_capacity(size)));
        Ok(())
    }

    fn geometrycollection_end(&mut self, _idx: usize) -> Result<()> {
        match self.stack.pop() {
            Some(Frame::Collection(members)) => {
                self.emit(Geometry::GeometryCollection(GeometryCollection(members)))
            }
            _ => Err(unbalanced("geometrycollection")),
        }
    }
}
