//! WKT output with bounded decimal digits, and (E)WKT input through geozero.
//!
//! geozero's WKT reader only understands 2D coordinates, so 3D text goes through a dimension
//! pass first: the `Z` tags and third ordinates are taken out, the remaining 2D text is parsed
//! by geozero, and the third ordinates are attached to the result in coordinate order.

use geo::{Coord, Geometry, LineString, Point, Polygon};
use geozero::wkt::Wkt;
use geozero::GeozeroGeometry;

use crate::codec::builder::{resolve_z, GeometryBuilder, Ordinate};
use crate::error::{GeoBlobError, GeoBlobResult};
use crate::handle::{GeometryHandle, ZCursor};

const GEOMETRY_KEYWORDS: [&str; 7] = [
    "POINT",
    "LINESTRING",
    "POLYGON",
    "MULTIPOINT",
    "MULTILINESTRING",
    "MULTIPOLYGON",
    "GEOMETRYCOLLECTION",
];

/// Parse WKT, optionally prefixed with `SRID=<n>;`.
///
/// An explicit `srid` wins over the prefix; without either the SRID is 0.
pub(crate) fn read_wkt(text: &str, srid: Option<i32>) -> GeoBlobResult<GeometryHandle> {
    let (prefix_srid, wkt) = split_srid(text)?;
    let planar = PlanarText::split(wkt)?;
    let mut builder = GeometryBuilder::new();
    Wkt(planar.text.as_str())
        .process_geom(&mut builder)
        .map_err(|err| GeoBlobError::parse(format!("invalid WKT: {err}")))?;
    let (geometry, _) = builder
        .finish()
        .map_err(|err| GeoBlobError::parse(format!("invalid WKT: {err}")))?;
    let z = resolve_z(&planar.ordinates, planar.tagged)?;
    let srid = srid.or(prefix_srid).unwrap_or(0);
    GeometryHandle::new(geometry, srid).with_z_values(z)
}

fn split_srid(text: &str) -> GeoBlobResult<(Option<i32>, &str)> {
    let trimmed = text.trim_start();
    let has_prefix = trimmed
        .get(..5)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("SRID="));
    if !has_prefix {
        return Ok((None, text));
    }
    let (srid, wkt) = trimmed[5..]
        .split_once(';')
        .ok_or_else(|| GeoBlobError::parse("EWKT SRID prefix is missing its ';'"))?;
    let srid = srid
        .trim()
        .parse::<i32>()
        .map_err(|err| GeoBlobError::parse(format!("invalid EWKT SRID {srid:?}: {err}")))?;
    Ok((Some(srid), wkt.trim_start()))
}

/// WKT with dimension tags and third ordinates removed.
#[derive(Debug, Default)]
struct PlanarText {
    text: String,
    /// One entry per coordinate tuple and per empty point, in text order.
    ordinates: Vec<Ordinate>,
    /// Whether a `Z` tag was present.
    tagged: bool,
}

impl PlanarText {
    fn split(wkt: &str) -> GeoBlobResult<Self> {
        let mut planar = Self::default();
        let mut numbers: Vec<&str> = vec![];
        // Set after the `POINT` keyword until its body starts, to spot `POINT EMPTY`.
        let mut after_point = false;
        let mut rest = wkt;
        while let Some(c) = rest.chars().next() {
            let is_word = c.is_ascii_alphabetic();
            let is_numeric = c.is_ascii_digit() || matches!(c, '-' | '+' | '.');
            let token_len = if is_word {
                rest.find(|c: char| !c.is_ascii_alphabetic())
                    .unwrap_or(rest.len())
            } else if is_numeric {
                rest.find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '+' | '.')))
                    .unwrap_or(rest.len())
            } else {
                c.len_utf8()
            };
            let (token, tail) = rest.split_at(token_len);
            rest = tail;

            if is_word && !is_number(token) {
                planar.push_word(token, &mut after_point)?;
            } else if is_word || is_numeric {
                numbers.push(token);
            } else if c.is_whitespace() {
                if numbers.is_empty() {
                    planar.text.push(' ');
                }
            } else {
                planar.push_tuple(&mut numbers)?;
                if c == '(' {
                    after_point = false;
                }
                planar.text.push(c);
            }
        }
        planar.push_tuple(&mut numbers)?;
        Ok(planar)
    }

    fn push_word(&mut self, word: &str, after_point: &mut bool) -> GeoBlobResult<()> {
        let upper = word.to_ascii_uppercase();
        let (keyword, dimension) = match upper.as_str() {
            "Z" | "M" | "ZM" => (None, upper.as_str()),
            _ => match GEOMETRY_KEYWORDS
                .iter()
                .find(|keyword| upper.starts_with(*keyword))
            {
                Some(keyword) if upper.len() > keyword.len() => {
                    (Some(*keyword), &upper[keyword.len()..])
                }
                _ => (None, ""),
            },
        };
        match dimension {
            "" => {}
            "Z" => self.tagged = true,
            "M" | "ZM" => {
                return Err(GeoBlobError::parse(
                    "WKT geometries with M ordinates are not supported",
                ))
            }
            _ => return Err(GeoBlobError::parse(format!("unknown WKT keyword {word:?}"))),
        }
        match keyword {
            Some(keyword) => {
                *after_point = keyword == "POINT";
                self.text.push_str(keyword);
            }
            None if !dimension.is_empty() => {}
            None => {
                if upper == "EMPTY" && *after_point {
                    self.ordinates.push(Ordinate::Empty);
                }
                *after_point = upper == "POINT";
                self.text.push_str(word);
            }
        }
        Ok(())
    }

    /// Close the coordinate tuple collected since the last delimiter.
    fn push_tuple(&mut self, numbers: &mut Vec<&str>) -> GeoBlobResult<()> {
        match numbers.len() {
            0 => return Ok(()),
            3 => {
                let z = numbers[2]
                    .parse::<f64>()
                    .map_err(|err| GeoBlobError::parse(format!("invalid WKT ordinate: {err}")))?;
                self.ordinates.push(Ordinate::Value(z));
                numbers.truncate(2);
            }
            4 => {
                return Err(GeoBlobError::parse(
                    "WKT geometries with M ordinates are not supported",
                ))
            }
            _ => self.ordinates.push(Ordinate::Missing),
        }
        self.text.push_str(&numbers.join(" "));
        numbers.clear();
        Ok(())
    }
}

/// Words such as `NaN` or `inf` that Rust parses as numbers.
fn is_number(word: &str) -> bool {
    word.parse::<f64>().is_ok()
}

/// Render a handle as WKT, rounding every ordinate to at most `precision` decimal digits.
/// Geometries with a third ordinate are tagged `Z`, members of collections included.
pub(crate) fn write_wkt(handle: &GeometryHandle, precision: usize) -> String {
    let mut writer = WktWriter {
        out: String::new(),
        precision: precision.min(u16::MAX as usize),
        has_z: handle.has_z(),
        z: handle.z_cursor(),
    };
    writer.geometry(handle.geometry());
    writer.out
}

pub(crate) fn is_empty_point(point: &Point) -> bool {
    point.x().is_nan() && point.y().is_nan()
}

struct WktWriter<'a> {
    out: String,
    precision: usize,
    has_z: bool,
    z: ZCursor<'a>,
}

impl WktWriter<'_> {
    /// The type keyword, then either ` EMPTY` or the opening parenthesis. Returns whether the
    /// body should follow.
    fn begin(&mut self, keyword: &str, empty: bool) -> bool {
        self.out.push_str(keyword);
        if self.has_z {
            self.out.push_str(" Z");
        }
        if empty {
            self.out.push_str(" EMPTY");
            return false;
        }
        if self.has_z {
            self.out.push(' ');
        }
        self.out.push('(');
        true
    }

    fn geometry(&mut self, geometry: &Geometry) {
        match geometry {
            Geometry::Point(point) => {
                let empty = is_empty_point(point);
                if empty {
                    self.z.next();
                }
                if self.begin("POINT", empty) {
                    self.coord(point.0);
                    self.out.push(')');
                }
            }
            Geometry::Line(line) => self.line_string(&LineString::from(*line)),
            Geometry::LineString(line) => self.line_string(line),
            Geometry::Polygon(polygon) => self.polygon(polygon),
            Geometry::Rect(rect) => self.polygon(&rect.to_polygon()),
            Geometry::Triangle(triangle) => self.polygon(&triangle.to_polygon()),
            Geometry::MultiPoint(multi_point) => {
                if self.begin("MULTIPOINT", multi_point.0.is_empty()) {
                    for (i, point) in multi_point.0.iter().enumerate() {
                        if i > 0 {
                            self.out.push(',');
                        }
                        if is_empty_point(point) {
                            self.z.next();
                            self.out.push_str("EMPTY");
                        } else {
                            self.out.push('(');
                            self.coord(point.0);
                            self.out.push(')');
                        }
                    }
                    self.out.push(')');
                }
            }
            Geometry::MultiLineString(multi_line) => {
                if self.begin("MULTILINESTRING", multi_line.0.is_empty()) {
                    for (i, line) in multi_line.0.iter().enumerate() {
                        if i > 0 {
                            self.out.push(',');
                        }
                        self.coords(line);
                    }
                    self.out.push(')');
                }
            }
            Geometry::MultiPolygon(multi_polygon) => {
                if self.begin("MULTIPOLYGON", multi_polygon.0.is_empty()) {
                    for (i, polygon) in multi_polygon.0.iter().enumerate() {
                        if i > 0 {
                            self.out.push(',');
                        }
                        self.rings(polygon);
                    }
                    self.out.push(')');
                }
            }
            Geometry::GeometryCollection(collection) => {
                if self.begin("GEOMETRYCOLLECTION", collection.0.is_empty()) {
                    for (i, member) in collection.0.iter().enumerate() {
                        if i > 0 {
                            self.out.push(',');
                        }
                        self.geometry(member);
                    }
                    self.out.push(')');
                }
            }
        }
    }

    fn line_string(&mut self, line: &LineString) {
        if self.begin("LINESTRING", line.0.is_empty()) {
            self.coord_list(line);
            self.out.push(')');
        }
    }

    fn polygon(&mut self, polygon: &Polygon) {
        if self.begin("POLYGON", polygon.exterior().0.is_empty()) {
            self.ring_list(polygon);
            self.out.push(')');
        }
    }

    /// A parenthesized polygon body inside a multipolygon.
    fn rings(&mut self, polygon: &Polygon) {
        if polygon.exterior().0.is_empty() {
            self.out.push_str("EMPTY");
            return;
        }
        self.out.push('(');
        self.ring_list(polygon);
        self.out.push(')');
    }

    fn ring_list(&mut self, polygon: &Polygon) {
        self.coords(polygon.exterior());
        for interior in polygon.interiors() {
            self.out.push(',');
            self.coords(interior);
        }
    }

    /// A parenthesized coordinate list.
    fn coords(&mut self, line: &LineString) {
        if line.0.is_empty() {
            self.out.push_str("EMPTY");
            return;
        }
        self.out.push('(');
        self.coord_list(line);
        self.out.push(')');
    }

    fn coord_list(&mut self, line: &LineString) {
        for (i, coord) in line.0.iter().enumerate() {
            if i > 0 {
                self.out.push(',');
            }
            self.coord(*coord);
        }
    }

    fn coord(&mut self, coord: Coord) {
        add_number(&mut self.out, coord.x, self.precision);
        self.out.push(' ');
        add_number(&mut self.out, coord.y, self.precision);
        if self.has_z {
            let z = self.z.next().unwrap_or(f64::NAN);
            self.out.push(' ');
            add_number(&mut self.out, z, self.precision);
        }
    }
}

/// Fixed-point with trailing zeros removed, so `1.0` prints as `1`.
fn add_number(out: &mut String, value: f64, precision: usize) {
    let formatted = format!("{value:.precision$}");
    let trimmed = if formatted.contains('.') {
        formatted.trim_end_matches('0').trim_end_matches('.')
    } else {
        formatted.as_str()
    };
    if trimmed == "-0" {
        out.push('0');
    } else {
        out.push_str(trimmed);
    }
}
