//! GeoJSON geometry objects: input through geozero, output through `geojson` values rounded to
//! a number of decimal digits.

use geo::{Coord, Geometry, LineString, Polygon};
use geojson::{PolygonType, Position, Value};
use geozero::geojson::GeoJson;
use geozero::GeozeroGeometry;

use crate::codec::builder::{resolve_z, GeometryBuilder};
use crate::codec::wkt::is_empty_point;
use crate::error::{GeoBlobError, GeoBlobResult};
use crate::handle::{GeometryHandle, ZCursor};

pub(crate) fn read_geojson(text: &str, srid: Option<i32>) -> GeoBlobResult<GeometryHandle> {
    let mut builder = GeometryBuilder::new();
    GeoJson(text)
        .process_geom(&mut builder)
        .map_err(|err| GeoBlobError::parse(format!("invalid GeoJSON: {err}")))?;
    let (geometry, ordinates) = builder
        .finish()
        .map_err(|err| GeoBlobError::parse(format!("invalid GeoJSON: {err}")))?;
    GeometryHandle::new(geometry, srid.unwrap_or(0)).with_z_values(resolve_z(&ordinates, false)?)
}

pub(crate) fn write_geojson(handle: &GeometryHandle, precision: usize) -> GeoBlobResult<String> {
    let mut writer = Writer {
        scale: 10f64.powi(precision.min(i32::MAX as usize) as i32),
        z: handle.z_cursor(),
    };
    let value = writer.value(handle.geometry());
    serde_json::to_string(&geojson::Geometry::new(value))
        .map_err(|err| GeoBlobError::geometry(format!("cannot serialize GeoJSON: {err}")))
}

/// Rounds ordinates and hands out Z values in coordinate order.
struct Writer<'a> {
    scale: f64,
    z: ZCursor<'a>,
}

impl Writer<'_> {
    fn round(&self, value: f64) -> f64 {
        let rounded = (value * self.scale).round() / self.scale;
        if rounded.is_finite() {
            rounded
        } else {
            value
        }
    }

    fn position(&mut self, coord: Coord) -> Position {
        let mut position = vec![self.round(coord.x), self.round(coord.y)];
        if let Some(z) = self.z.next() {
            position.push(self.round(z));
        }
        position
    }

    fn line(&mut self, line: &LineString) -> Vec<Position> {
        line.0.iter().map(|coord| self.position(*coord)).collect()
    }

    fn polygon(&mut self, polygon: &Polygon) -> PolygonType {
        if polygon.exterior().0.is_empty() {
            return vec![];
        }
        std::iter::once(polygon.exterior())
            .chain(polygon.interiors())
            .map(|ring| self.line(ring))
            .collect()
    }

    fn value(&mut self, geometry: &Geometry) -> Value {
        match geometry {
            Geometry::Point(point) if is_empty_point(point) => {
                self.z.next();
                Value::Point(vec![])
            }
            Geometry::Point(point) => Value::Point(self.position(point.0)),
            Geometry::Line(line) => Value::LineString(self.line(&LineString::from(*line))),
            Geometry::LineString(line) => Value::LineString(self.line(line)),
            Geometry::Polygon(polygon) => Value::Polygon(self.polygon(polygon)),
            Geometry::Rect(rect) => Value::Polygon(self.polygon(&rect.to_polygon())),
            Geometry::Triangle(triangle) => Value::Polygon(self.polygon(&triangle.to_polygon())),
            Geometry::MultiPoint(multi_point) => Value::MultiPoint(
                multi_point
                    .0
                    .iter()
                    .map(|point| self.position(point.0))
                    .collect(),
            ),
            Geometry::MultiLineString(multi_line) => {
                Value::MultiLineString(multi_line.0.iter().map(|line| self.line(line)).collect())
            }
            Geometry::MultiPolygon(multi_polygon) => Value::MultiPolygon(
                multi_polygon
                    .0
                    .iter()
                    .map(|polygon| self.polygon(polygon))
                    .collect(),
            ),
            Geometry::GeometryCollection(collection) => Value::GeometryCollection(
                collection
                    .0
                    .iter()
                    .map(|member| geojson::Geometry::new(self.value(member)))
                    .collect(),
            ),
        }
    }
}
