//! GeoHash output and GeoHash cells as polygons, through the `geohash` crate.

use geo::{BoundingRect, Geometry};

use crate::error::{GeoBlobError, GeoBlobResult};
use crate::handle::GeometryHandle;

/// Longest GeoHash the `geohash` crate produces.
pub const MAX_GEOHASH_PRECISION: usize = 12;

/// GeoHash of a geometry.
///
/// A point is hashed to `precision` characters. For any other geometry, the center of its
/// bounding box is hashed to `precision` characters when given; otherwise the hash is the
/// longest prefix whose cell still contains the whole bounding box (possibly empty).
pub(crate) fn write_geohash(
    handle: &GeometryHandle,
    precision: Option<usize>,
) -> GeoBlobResult<String> {
    let rect = handle
        .geometry()
        .bounding_rect()
        .filter(|rect| !rect.min().x.is_nan() && !rect.min().y.is_nan())
        .ok_or_else(|| GeoBlobError::geometry("cannot compute a GeoHash of an empty geometry"))?;

    let encode = |coord, len: usize| {
        geohash::encode(coord, len.clamp(1, MAX_GEOHASH_PRECISION))
            .map_err(|err| GeoBlobError::geometry(format!("GeoHash requires lon/lat input: {err}")))
    };

    if rect.min() == rect.max() {
        return encode(rect.min(), precision.unwrap_or(MAX_GEOHASH_PRECISION));
    }
    if let Some(precision) = precision {
        return encode(rect.center(), precision);
    }
    let lower = encode(rect.min(), MAX_GEOHASH_PRECISION)?;
    let upper = encode(rect.max(), MAX_GEOHASH_PRECISION)?;
    Ok(lower
        .chars()
        .zip(upper.chars())
        .take_while(|(a, b)| a == b)
        .map(|(a, _)| a)
        .collect())
}

/// The cell of a GeoHash, as a polygon. Only the first `precision` characters are used when
/// given.
pub(crate) fn read_geohash(
    hash: &str,
    precision: Option<usize>,
    srid: Option<i32>,
) -> GeoBlobResult<GeometryHandle> {
    let hash = hash.trim();
    let hash = match precision {
        Some(precision) if precision > 0 && precision < hash.len() => hash
            .get(..precision)
            .ok_or_else(|| GeoBlobError::parse(format!("invalid GeoHash {hash:?}")))?,
        _ => hash,
    };
    if hash.is_empty() {
        return Err(GeoBlobError::parse("empty GeoHash"));
    }
    let rect = geohash::decode_bbox(hash)
        .map_err(|err| GeoBlobError::parse(format!("invalid GeoHash {hash:?}: {err}")))?;
    Ok(GeometryHandle::new(
        Geometry::Polygon(rect.to_polygon()),
        srid.unwrap_or(0),
    ))
}
