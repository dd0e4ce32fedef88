//! Conversion between serialized geometry blobs, [`GeometryHandle`]s and external encodings.
//!
//! A blob of zero length is never decoded: [`decode`] returns `Ok(None)` so that each function
//! can apply its own empty-input policy.

pub(crate) mod builder;
pub mod geohash;
pub(crate) mod geojson;
pub mod wkb;
pub(crate) mod wkt;

use crate::error::{GeoBlobError, GeoBlobResult};
use crate::handle::GeometryHandle;

pub use self::geohash::MAX_GEOHASH_PRECISION;
pub use self::wkb::Endianness;

/// Decimal digits used for WKT and GeoJSON output when none are requested, and the most that
/// are ever written.
pub const DEFAULT_MAX_DECIMAL_DIGITS: usize = 15;

/// Clamp a requested number of decimal digits to what an `f64` can carry.
pub fn decimal_digits(requested: Option<usize>) -> usize {
    requested
        .unwrap_or(DEFAULT_MAX_DECIMAL_DIGITS)
        .min(DEFAULT_MAX_DECIMAL_DIGITS)
}

/// External encodings a handle can be rendered to or parsed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextFormat {
    Wkt,
    /// Hex-encoded ISO WKB.
    Wkb,
    GeoJson,
    GeoHash,
}

/// Decode a blob. Zero length yields `None`; any other malformed input is a parse error.
pub fn decode(blob: &[u8]) -> GeoBlobResult<Option<GeometryHandle>> {
    if blob.is_empty() {
        return Ok(None);
    }
    wkb::read_ewkb(blob).map(Some)
}

/// Encode a handle as a canonical blob, independent of the handle's memory.
pub fn encode(handle: &GeometryHandle) -> Vec<u8> {
    wkb::write_ewkb(handle)
}

/// Binary WKB in the requested byte order.
pub fn to_wkb(handle: &GeometryHandle, byte_order: Endianness) -> Vec<u8> {
    wkb::write_wkb(handle, byte_order)
}

/// Parse binary WKB or EWKB, overriding the SRID when one is given.
pub fn from_wkb(bytes: &[u8], srid: Option<i32>) -> GeoBlobResult<GeometryHandle> {
    let handle = wkb::read_ewkb(bytes)?;
    Ok(match srid {
        Some(srid) => handle.with_srid(srid),
        None => handle,
    })
}

/// Render a handle in a text encoding.
///
/// `precision` is the number of decimal digits for WKT and GeoJSON (at most
/// [`DEFAULT_MAX_DECIMAL_DIGITS`]) and the number of characters for GeoHash. It is ignored for
/// WKB.
pub fn to_text(
    handle: &GeometryHandle,
    format: TextFormat,
    precision: Option<usize>,
) -> GeoBlobResult<String> {
    match format {
        TextFormat::Wkt => Ok(wkt::write_wkt(handle, decimal_digits(precision))),
        TextFormat::Wkb => Ok(hex::encode_upper(to_wkb(handle, Endianness::LittleEndian))),
        TextFormat::GeoJson => geojson::write_geojson(handle, decimal_digits(precision)),
        TextFormat::GeoHash => geohash::write_geohash(handle, precision),
    }
}

/// Parse text in the given encoding. The SRID defaults to 0 unless the text carries one.
pub fn from_text(
    text: &str,
    format: TextFormat,
    srid: Option<i32>,
) -> GeoBlobResult<GeometryHandle> {
    match format {
        TextFormat::Wkt => wkt::read_wkt(text, srid),
        TextFormat::Wkb => {
            let bytes = hex::decode(text.trim())
                .map_err(|err| GeoBlobError::parse(format!("invalid hex WKB: {err}")))?;
            from_wkb(&bytes, srid)
        }
        TextFormat::GeoJson => geojson::read_geojson(text, srid),
        TextFormat::GeoHash => geohash::read_geohash(text, None, srid),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::handle::live_handles;
    use crate::test::geometry::{garbage, gc0, mls0, mp0, poly1};

    #[test]
    fn zero_length_is_not_an_error() {
        assert!(decode(&[]).unwrap().is_none());
    }

    #[test]
    fn malformed_is_parse_error() {
        let before = live_handles();
        assert!(matches!(decode(&garbage()), Err(GeoBlobError::Parse(_))));
        assert_eq!(live_handles(), before);
    }

    #[test]
    fn round_trip_is_logical_and_canonical() {
        let before = live_handles();
        for geometry in [poly1(), mp0(), mls0(), gc0()] {
            let handle = GeometryHandle::new(geometry, 4326);
            let first = encode(&handle);
            let second = encode(&handle);
            assert_eq!(first, second);

            let decoded = decode(&first).unwrap().unwrap();
            assert_eq!(decoded, handle);
            assert_eq!(encode(&decoded), first);
        }
        assert_eq!(live_handles(), before);
    }

    #[test]
    fn text_formats() {
        let handle = from_text("POINT(1 2)", TextFormat::Wkt, None).unwrap();
        assert_eq!(to_text(&handle, TextFormat::Wkt, None).unwrap(), "POINT(1 2)");
        assert_eq!(
            to_text(&handle, TextFormat::Wkb, None).unwrap(),
            "0101000000000000000000F03F0000000000000040"
        );
        let hex = to_text(&handle, TextFormat::Wkb, None).unwrap();
        assert_eq!(from_text(&hex, TextFormat::Wkb, None).unwrap(), handle);
        assert_eq!(
            from_text("0101000000000000000000f03f0000000000000040", TextFormat::Wkb, None)
                .unwrap(),
            handle
        );
        for malformed in ["01ZZ", "010"] {
            assert!(matches!(
                from_text(malformed, TextFormat::Wkb, None),
                Err(GeoBlobError::Parse(_))
            ));
        }
    }

    #[test]
    fn decimal_digits_are_capped() {
        let handle = from_text("POINT(1.5 2)", TextFormat::Wkt, None).unwrap();
        assert_eq!(decimal_digits(None), DEFAULT_MAX_DECIMAL_DIGITS);
        assert_eq!(decimal_digits(Some(70_000)), DEFAULT_MAX_DECIMAL_DIGITS);
        assert_eq!(decimal_digits(Some(2)), 2);
        assert_eq!(
            to_text(&handle, TextFormat::Wkt, Some(usize::MAX)).unwrap(),
            "POINT(1.5 2)"
        );
        assert!(to_text(&handle, TextFormat::GeoJson, Some(usize::MAX)).is_ok());
    }

    #[test]
    fn three_dimensional_text_round_trips() {
        for text in ["POINT Z (1 2 3)", "LINESTRING Z (0 0 1,1 1 2)"] {
            let handle = from_text(text, TextFormat::Wkt, None).unwrap();
            assert!(handle.has_z());
            assert_eq!(to_text(&handle, TextFormat::Wkt, None).unwrap(), text);
            let reparsed = decode(&encode(&handle)).unwrap().unwrap();
            assert_eq!(reparsed, handle);
        }
    }

    #[test]
    fn srid_defaults_to_zero() {
        let handle = from_text(r#"{"type":"Point","coordinates":[1,2]}"#, TextFormat::GeoJson, None)
            .unwrap();
        assert_eq!(handle.srid(), 0);
        let handle = from_text("POINT(1 2)", TextFormat::Wkt, Some(4326)).unwrap();
        assert_eq!(handle.srid(), 4326);
    }
}
