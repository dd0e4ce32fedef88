//! Extended WKB, the serialized form of every geometry value in this crate, plus plain ISO WKB
//! for `ST_AsBinary` and `ST_GeomFromWKB`.
//!
//! The canonical blob is little-endian, carries the SRID (flag `0x20000000`) only when it is not
//! zero, and marks geometries with a third ordinate with the Z flag (`0x80000000`) on every
//! header. The reader accepts both byte orders and both the EWKB flag and ISO (`1000 +`)
//! dimension conventions. Measures (M) are rejected.

use std::io::Cursor;

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt};
use geo::{
    Coord, Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon,
    Point, Polygon,
};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::{GeoBlobError, GeoBlobResult};
use crate::handle::{GeometryHandle, ZCursor};

const EWKB_Z_FLAG: u32 = 0x8000_0000;
const EWKB_M_FLAG: u32 = 0x4000_0000;
const EWKB_SRID_FLAG: u32 = 0x2000_0000;
const EWKB_FLAGS: u32 = EWKB_Z_FLAG | EWKB_M_FLAG | EWKB_SRID_FLAG;

/// Byte order of a WKB buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endianness {
    BigEndian,
    #[default]
    LittleEndian,
}

impl TryFrom<u8> for Endianness {
    type Error = GeoBlobError;

    fn try_from(value: u8) -> GeoBlobResult<Self> {
        match value {
            0 => Ok(Endianness::BigEndian),
            1 => Ok(Endianness::LittleEndian),
            other => Err(GeoBlobError::parse(format!(
                "unexpected WKB byte order {other}"
            ))),
        }
    }
}

impl From<Endianness> for u8 {
    fn from(value: Endianness) -> Self {
        match value {
            Endianness::BigEndian => 0,
            Endianness::LittleEndian => 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub(crate) enum WKBType {
    Point = 1,
    LineString = 2,
    Polygon = 3,
    MultiPoint = 4,
    MultiLineString = 5,
    MultiPolygon = 6,
    GeometryCollection = 7,
}

/// Which header conventions to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dialect {
    /// SRID and Z as flag bits, SRID only when non-zero.
    Extended,
    /// ISO type codes, never an SRID.
    Iso,
}

/// Decode a serialized geometry. The caller handles the zero-length case.
pub(crate) fn read_ewkb(buf: &[u8]) -> GeoBlobResult<GeometryHandle> {
    let mut reader = WkbReader {
        cursor: Cursor::new(buf),
        has_z: None,
        z: vec![],
    };
    let header = reader.read_header()?;
    let geometry = reader.read_body(&header)?;
    if reader.cursor.position() != buf.len() as u64 {
        return Err(GeoBlobError::parse(format!(
            "{} trailing bytes after WKB geometry",
            buf.len() as u64 - reader.cursor.position()
        )));
    }
    let z = header.has_z.then_some(reader.z);
    GeometryHandle::new(geometry, header.srid.unwrap_or(0)).with_z_values(z)
}

/// Encode a handle as canonical little-endian EWKB.
pub(crate) fn write_ewkb(handle: &GeometryHandle) -> Vec<u8> {
    let mut out = Vec::with_capacity(32);
    let srid = (handle.srid() != 0).then_some(handle.srid());
    write_geometry::<LittleEndian>(
        &mut out,
        handle.geometry(),
        &mut handle.z_cursor(),
        srid,
        Dialect::Extended,
    );
    out
}

/// Encode a handle as ISO WKB in the requested byte order. The SRID is not written.
pub(crate) fn write_wkb(handle: &GeometryHandle, byte_order: Endianness) -> Vec<u8> {
    let mut out = Vec::with_capacity(32);
    match byte_order {
        Endianness::LittleEndian => write_geometry::<LittleEndian>(
            &mut out,
            handle.geometry(),
            &mut handle.z_cursor(),
            None,
            Dialect::Iso,
        ),
        Endianness::BigEndian => write_geometry::<BigEndian>(
            &mut out,
            handle.geometry(),
            &mut handle.z_cursor(),
            None,
            Dialect::Iso,
        ),
    }
    out
}

/// Read one ordinate (0 = x, 1 = y) of a serialized point straight from its bytes.
///
/// Returns `None` for anything that is not a well-formed point header followed by enough
/// coordinate bytes.
pub(crate) fn read_point_ordinate(buf: &[u8], ordinate: usize) -> Option<f64> {
    let byte_order = Endianness::try_from(*buf.first()?).ok()?;
    let type_bytes = buf.get(1..5)?;
    let raw = match byte_order {
        Endianness::BigEndian => BigEndian::read_u32(type_bytes),
        Endianness::LittleEndian => LittleEndian::read_u32(type_bytes),
    };
    if (raw & !EWKB_FLAGS) % 1000 != u32::from(WKBType::Point) {
        return None;
    }
    let mut offset = 5;
    if raw & EWKB_SRID_FLAG != 0 {
        offset += 4;
    }
    offset += ordinate * 8;
    let bytes = buf.get(offset..offset + 8)?;
    Some(match byte_order {
        Endianness::BigEndian => BigEndian::read_f64(bytes),
        Endianness::LittleEndian => LittleEndian::read_f64(bytes),
    })
}

#[derive(Debug, Clone, Copy)]
struct Header {
    byte_order: Endianness,
    geometry_type: WKBType,
    has_z: bool,
    srid: Option<i32>,
}

struct WkbReader<'a> {
    cursor: Cursor<&'a [u8]>,
    /// Dimension of the outermost header; nested headers must agree with it.
    has_z: Option<bool>,
    z: Vec<f64>,
}

impl WkbReader<'_> {
    fn read_u8(&mut self) -> GeoBlobResult<u8> {
        self.cursor.read_u8().map_err(truncated)
    }

    fn read_u32(&mut self, byte_order: Endianness) -> GeoBlobResult<u32> {
        match byte_order {
            Endianness::BigEndian => self.cursor.read_u32::<BigEndian>(),
            Endianness::LittleEndian => self.cursor.read_u32::<LittleEndian>(),
        }
        .map_err(truncated)
    }

    fn read_f64(&mut self, byte_order: Endianness) -> GeoBlobResult<f64> {
        match byte_order {
            Endianness::BigEndian => self.cursor.read_f64::<BigEndian>(),
            Endianness::LittleEndian => self.cursor.read_f64::<LittleEndian>(),
        }
        .map_err(truncated)
    }

    fn read_count(&mut self, byte_order: Endianness) -> GeoBlobResult<usize> {
        let count = self.read_u32(byte_order)? as usize;
        let remaining = self.cursor.get_ref().len() - self.cursor.position() as usize;
        // Every element takes at least one byte, so a larger count cannot be valid.
        if count > remaining {
            return Err(GeoBlobError::parse(format!(
                "WKB element count {count} exceeds the {remaining} remaining bytes"
            )));
        }
        Ok(count)
    }

    fn read_header(&mut self) -> GeoBlobResult<Header> {
        let byte_order = Endianness::try_from(self.read_u8()?)?;
        let raw = self.read_u32(byte_order)?;
        let code = raw & !EWKB_FLAGS;
        let (base, iso_dim) = (code % 1000, code / 1000);
        if iso_dim > 3 {
            return Err(GeoBlobError::parse(format!("unknown WKB type code {code}")));
        }
        let geometry_type = WKBType::try_from(base)
            .map_err(|_| GeoBlobError::parse(format!("unknown WKB geometry type {base}")))?;
        let srid = if raw & EWKB_SRID_FLAG != 0 {
            Some(self.read_u32(byte_order)? as i32)
        } else {
            None
        };
        if raw & EWKB_M_FLAG != 0 || iso_dim >= 2 {
            return Err(GeoBlobError::parse(
                "WKB geometries with M ordinates are not supported",
            ));
        }
        let has_z = raw & EWKB_Z_FLAG != 0 || iso_dim == 1;
        match self.has_z {
            None => self.has_z = Some(has_z),
            Some(outer) if outer != has_z => {
                return Err(GeoBlobError::parse("WKB geometry mixes 2D and 3D members"))
            }
            Some(_) => {}
        }
        Ok(Header {
            byte_order,
            geometry_type,
            has_z,
            srid,
        })
    }

    fn read_coord(&mut self, header: &Header) -> GeoBlobResult<Coord> {
        let x = self.read_f64(header.byte_order)?;
        let y = self.read_f64(header.byte_order)?;
        if header.has_z {
            let z = self.read_f64(header.byte_order)?;
            self.z.push(z);
        }
        Ok(Coord { x, y })
    }

    fn read_line(&mut self, header: &Header) -> GeoBlobResult<LineString> {
        let num_coords = self.read_count(header.byte_order)?;
        let mut coords = Vec::with_capacity(num_coords);
        for _ in 0..num_coords {
            coords.push(self.read_coord(header)?);
        }
        Ok(LineString::new(coords))
    }

    fn read_polygon(&mut self, header: &Header) -> GeoBlobResult<Polygon> {
        let num_rings = self.read_count(header.byte_order)?;
        if num_rings == 0 {
            return Ok(Polygon::new(LineString::new(vec![]), vec![]));
        }
        let exterior = self.read_line(header)?;
        let mut interiors = Vec::with_capacity(num_rings - 1);
        for _ in 1..num_rings {
            interiors.push(self.read_line(header)?);
        }
        Ok(Polygon::new(exterior, interiors))
    }

    /// Read a nested geometry, which must have the expected type when one is given.
    fn read_member(&mut self, expected: Option<WKBType>) -> GeoBlobResult<Geometry> {
        let header = self.read_header()?;
        if let Some(expected) = expected {
            if header.geometry_type != expected {
                return Err(GeoBlobError::parse(format!(
                    "expected a {expected:?} member, found {:?}",
                    header.geometry_type
                )));
            }
        }
        self.read_body(&header)
    }

    fn read_body(&mut self, header: &Header) -> GeoBlobResult<Geometry> {
        let geometry = match header.geometry_type {
            WKBType::Point => Geometry::Point(Point(self.read_coord(header)?)),
            WKBType::LineString => Geometry::LineString(self.read_line(header)?),
            WKBType::Polygon => Geometry::Polygon(self.read_polygon(header)?),
            WKBType::MultiPoint => {
                let count = self.read_count(header.byte_order)?;
                let mut points = Vec::with_capacity(count);
                for _ in 0..count {
                    if let Geometry::Point(point) = self.read_member(Some(WKBType::Point))? {
                        points.push(point);
                    }
                }
                Geometry::MultiPoint(MultiPoint(points))
            }
            WKBType::MultiLineString => {
                let count = self.read_count(header.byte_order)?;
                let mut lines = Vec::with_capacity(count);
                for _ in 0..count {
                    if let Geometry::LineString(line) =
                        self.read_member(Some(WKBType::LineString))?
                    {
                        lines.push(line);
                    }
                }
                Geometry::MultiLineString(MultiLineString(lines))
            }
            WKBType::MultiPolygon => {
                let count = self.read_count(header.byte_order)?;
                let mut polygons = Vec::with_capacity(count);
                for _ in 0..count {
                    if let Geometry::Polygon(polygon) = self.read_member(Some(WKBType::Polygon))? {
                        polygons.push(polygon);
                    }
                }
                Geometry::MultiPolygon(MultiPolygon(polygons))
            }
            WKBType::GeometryCollection => {
                let count = self.read_count(header.byte_order)?;
                let mut members = Vec::with_capacity(count);
                for _ in 0..count {
                    members.push(self.read_member(None)?);
                }
                Geometry::GeometryCollection(GeometryCollection(members))
            }
        };
        Ok(geometry)
    }
}

fn truncated(_: std::io::Error) -> GeoBlobError {
    GeoBlobError::parse("unexpected end of WKB buffer")
}

fn put_u32<B: ByteOrder>(out: &mut Vec<u8>, value: u32) {
    let mut bytes = [0; 4];
    B::write_u32(&mut bytes, value);
    out.extend_from_slice(&bytes);
}

fn put_f64<B: ByteOrder>(out: &mut Vec<u8>, value: f64) {
    let mut bytes = [0; 8];
    B::write_f64(&mut bytes, value);
    out.extend_from_slice(&bytes);
}

fn put_count<B: ByteOrder>(out: &mut Vec<u8>, count: usize) {
    put_u32::<B>(out, count as u32);
}

fn byte_order_marker<B: ByteOrder>() -> u8 {
    // `ByteOrder` has no runtime tag, so probe it.
    let mut probe = [0; 2];
    B::write_u16(&mut probe, 1);
    if probe[0] == 1 {
        Endianness::LittleEndian.into()
    } else {
        Endianness::BigEndian.into()
    }
}

fn put_header<B: ByteOrder>(
    out: &mut Vec<u8>,
    geometry_type: WKBType,
    has_z: bool,
    srid: Option<i32>,
    dialect: Dialect,
) {
    out.push(byte_order_marker::<B>());
    let mut code = u32::from(geometry_type);
    match dialect {
        Dialect::Extended => {
            if has_z {
                code |= EWKB_Z_FLAG;
            }
            if srid.is_some() {
                code |= EWKB_SRID_FLAG;
            }
        }
        Dialect::Iso => {
            if has_z {
                code += 1000;
            }
        }
    }
    put_u32::<B>(out, code);
    if let (Dialect::Extended, Some(srid)) = (dialect, srid) {
        put_u32::<B>(out, srid as u32);
    }
}

fn put_coord<B: ByteOrder>(out: &mut Vec<u8>, coord: Coord, z: &mut ZCursor) {
    put_f64::<B>(out, coord.x);
    put_f64::<B>(out, coord.y);
    if z.has_z() {
        put_f64::<B>(out, z.next().unwrap_or(f64::NAN));
    }
}

fn put_coords<B: ByteOrder>(out: &mut Vec<u8>, line: &LineString, z: &mut ZCursor) {
    put_count::<B>(out, line.0.len());
    for coord in &line.0 {
        put_coord::<B>(out, *coord, z);
    }
}

fn put_polygon_rings<B: ByteOrder>(out: &mut Vec<u8>, polygon: &Polygon, z: &mut ZCursor) {
    if polygon.exterior().0.is_empty() {
        put_count::<B>(out, 0);
        return;
    }
    put_count::<B>(out, 1 + polygon.interiors().len());
    put_coords::<B>(out, polygon.exterior(), z);
    for interior in polygon.interiors() {
        put_coords::<B>(out, interior, z);
    }
}

fn write_geometry<B: ByteOrder>(
    out: &mut Vec<u8>,
    geometry: &Geometry,
    z: &mut ZCursor,
    srid: Option<i32>,
    dialect: Dialect,
) {
    let has_z = z.has_z();
    match geometry {
        Geometry::Point(point) => {
            put_header::<B>(out, WKBType::Point, has_z, srid, dialect);
            put_coord::<B>(out, point.0, z);
        }
        Geometry::Line(line) => {
            put_header::<B>(out, WKBType::LineString, has_z, srid, dialect);
            put_coords::<B>(out, &LineString::from(*line), z);
        }
        Geometry::LineString(line) => {
            put_header::<B>(out, WKBType::LineString, has_z, srid, dialect);
            put_coords::<B>(out, line, z);
        }
        Geometry::Polygon(polygon) => {
            put_header::<B>(out, WKBType::Polygon, has_z, srid, dialect);
            put_polygon_rings::<B>(out, polygon, z);
        }
        Geometry::Rect(rect) => {
            put_header::<B>(out, WKBType::Polygon, has_z, srid, dialect);
            put_polygon_rings::<B>(out, &rect.to_polygon(), z);
        }
        Geometry::Triangle(triangle) => {
            put_header::<B>(out, WKBType::Polygon, has_z, srid, dialect);
            put_polygon_rings::<B>(out, &triangle.to_polygon(), z);
        }
        Geometry::MultiPoint(multi_point) => {
            put_header::<B>(out, WKBType::MultiPoint, has_z, srid, dialect);
            put_count::<B>(out, multi_point.0.len());
            for point in &multi_point.0 {
                put_header::<B>(out, WKBType::Point, has_z, None, dialect);
                put_coord::<B>(out, point.0, z);
            }
        }
        Geometry::MultiLineString(multi_line) => {
            put_header::<B>(out, WKBType::MultiLineString, has_z, srid, dialect);
            put_count::<B>(out, multi_line.0.len());
            for line in &multi_line.0 {
                put_header::<B>(out, WKBType::LineString, has_z, None, dialect);
                put_coords::<B>(out, line, z);
            }
        }
        Geometry::MultiPolygon(multi_polygon) => {
            put_header::<B>(out, WKBType::MultiPolygon, has_z, srid, dialect);
            put_count::<B>(out, multi_polygon.0.len());
            for polygon in &multi_polygon.0 {
                put_header::<B>(out, WKBType::Polygon, has_z, None, dialect);
                put_polygon_rings::<B>(out, polygon, z);
            }
        }
        Geometry::GeometryCollection(collection) => {
            put_header::<B>(out, WKBType::GeometryCollection, has_z, srid, dialect);
            put_count::<B>(out, collection.0.len());
            for member in &collection.0 {
                write_geometry::<B>(out, member, z, None, dialect);
            }
        }
    }
}
