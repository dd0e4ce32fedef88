//! Geometry input and output.

use datafusion::logical_expr::ColumnarValue;
use geo::Geometry;

use super::constructors::unsupported;
use super::{decode_present, ArgType, FunctionDef, OutputType};
use crate::binder::BatchBinder;
use crate::codec::{self, geohash, Endianness, TextFormat};
use crate::config::GeometryOptions;
use crate::error::{GeoBlobError, GeoBlobResult};

/// SRID given to geographies parsed from text without one.
const WGS84_SRID: i32 = 4326;

pub(super) static FUNCTIONS: &[FunctionDef] = &[
    FunctionDef {
        name: "st_geomfromtext",
        aliases: &[],
        arguments: &[&[ArgType::Utf8], &[ArgType::Utf8, ArgType::Int32]],
        output: OutputType::Binary,
        kernel: st_geomfromtext,
        description: "Constructs a geometry from its Well-Known Text or EWKT representation.",
        syntax: "ST_GeomFromText(text[, srid])",
        argument_docs: &[
            ("text", "WKT, optionally prefixed with SRID=n;"),
            ("srid", "spatial reference identifier, overriding the text"),
        ],
        sql_example: Some("SELECT ST_GeomFromText('LINESTRING(-71.160281 42.258729,-71.160837 42.259113)');"),
    },
    FunctionDef {
        name: "st_geogfromtext",
        aliases: &[],
        arguments: &[&[ArgType::Utf8]],
        output: OutputType::Binary,
        kernel: st_geogfromtext,
        description: "Constructs a geography from its Well-Known Text or EWKT representation. The SRID is 4326 unless the text specifies one.",
        syntax: "ST_GeogFromText(text)",
        argument_docs: &[("text", "WKT, optionally prefixed with SRID=n;")],
        sql_example: None,
    },
    FunctionDef {
        name: "st_geomfromwkb",
        aliases: &[],
        arguments: &[&[ArgType::Geometry], &[ArgType::Geometry, ArgType::Int32]],
        output: OutputType::Binary,
        kernel: st_geomfromwkb,
        description: "Constructs a geometry from Well-Known Binary or EWKB in either byte order.",
        syntax: "ST_GeomFromWKB(bytes[, srid])",
        argument_docs: &[
            ("bytes", "WKB buffer"),
            ("srid", "spatial reference identifier"),
        ],
        sql_example: None,
    },
    FunctionDef {
        name: "st_geomfromgeojson",
        aliases: &[],
        arguments: &[&[ArgType::Utf8]],
        output: OutputType::Binary,
        kernel: st_geomfromgeojson,
        description: "Constructs a geometry from a GeoJSON geometry object.",
        syntax: "ST_GeomFromGeoJSON(text)",
        argument_docs: &[("text", "GeoJSON geometry")],
        sql_example: None,
    },
    FunctionDef {
        name: "st_geomfromgeohash",
        aliases: &[],
        arguments: &[&[ArgType::Utf8], &[ArgType::Utf8, ArgType::Int32]],
        output: OutputType::Binary,
        kernel: st_geomfromgeohash,
        description: "Returns the polygon covering the cell of a GeoHash, optionally using only its first characters.",
        syntax: "ST_GeomFromGeoHash(geohash[, precision])",
        argument_docs: &[
            ("geohash", "GeoHash string"),
            ("precision", "number of characters to use"),
        ],
        sql_example: None,
    },
    FunctionDef {
        name: "st_astext",
        aliases: &[],
        arguments: &[&[ArgType::Geometry], &[ArgType::Geometry, ArgType::Int32]],
        output: OutputType::Utf8,
        kernel: st_astext,
        description: "Returns the Well-Known Text representation of the geometry, without SRID.",
        syntax: "ST_AsText(geom[, max_decimal_digits])",
        argument_docs: &[
            ("geom", "geometry"),
            ("max_decimal_digits", "maximum number of decimal digits"),
        ],
        sql_example: Some("SELECT ST_AsText(ST_MakePoint(1, 2));"),
    },
    FunctionDef {
        name: "st_asbinary",
        aliases: &[],
        arguments: &[&[ArgType::Geometry], &[ArgType::Geometry, ArgType::Utf8]],
        output: OutputType::Binary,
        kernel: st_asbinary,
        description: "Returns the OGC/ISO Well-Known Binary representation of the geometry, without SRID.",
        syntax: "ST_AsBinary(geom[, 'NDR'|'XDR'])",
        argument_docs: &[
            ("geom", "geometry"),
            ("encoding", "NDR for little-endian (default), XDR for big-endian"),
        ],
        sql_example: None,
    },
    FunctionDef {
        name: "st_asgeojson",
        aliases: &[],
        arguments: &[&[ArgType::Geometry], &[ArgType::Geometry, ArgType::Int32]],
        output: OutputType::Utf8,
        kernel: st_asgeojson,
        description: "Returns the geometry as a GeoJSON geometry object.",
        syntax: "ST_AsGeoJSON(geom[, max_decimal_digits])",
        argument_docs: &[
            ("geom", "geometry"),
            ("max_decimal_digits", "maximum number of decimal digits"),
        ],
        sql_example: None,
    },
    FunctionDef {
        name: "st_geohash",
        aliases: &[],
        arguments: &[&[ArgType::Geometry], &[ArgType::Geometry, ArgType::Int32]],
        output: OutputType::Utf8,
        kernel: st_geohash,
        description: "Computes a GeoHash representation of a geometry. A shorter GeoHash is a less precise representation of a point. Without a length, a point gets the session default and other geometries the longest hash whose cell contains their bounding box.",
        syntax: "ST_GeoHash(geom[, max_chars])",
        argument_docs: &[
            ("geom", "geometry in longitude/latitude"),
            ("max_chars", "number of characters, at most 12"),
        ],
        sql_example: Some("SELECT ST_GeoHash(ST_MakePoint(-126, 48));"),
    },
];

/// A non-negative count argument. Negative values mean "not given".
fn count(value: i32) -> Option<usize> {
    usize::try_from(value).ok()
}

/// Shared body of the text parsers. Empty text yields an empty blob.
fn from_text(
    args: &[ColumnarValue],
    num_rows: usize,
    format: TextFormat,
) -> GeoBlobResult<ColumnarValue> {
    let binder = BatchBinder::try_new(args, num_rows)?;
    let texts = binder.utf8(0)?;
    let parse = |text: &str, srid: Option<i32>| -> GeoBlobResult<Option<Vec<u8>>> {
        if text.is_empty() {
            return Ok(Some(vec![]));
        }
        let handle = codec::from_text(text, format, srid)?;
        Ok(Some(codec::encode(&handle)))
    };
    let rows = match binder.num_args() {
        1 => binder.execute1(&texts, |text| parse(text, None))?,
        2 => {
            let srids = binder.int32(1)?;
            binder.execute2(&texts, &srids, |text, srid| parse(text, Some(srid)))?
        }
        n => return Err(unsupported("text input", n)),
    };
    binder.finish(rows)
}

fn st_geomfromtext(
    args: &[ColumnarValue],
    num_rows: usize,
    _options: &GeometryOptions,
) -> GeoBlobResult<ColumnarValue> {
    from_text(args, num_rows, TextFormat::Wkt)
}

fn st_geomfromgeojson(
    args: &[ColumnarValue],
    num_rows: usize,
    _options: &GeometryOptions,
) -> GeoBlobResult<ColumnarValue> {
    from_text(args, num_rows, TextFormat::GeoJson)
}

fn st_geogfromtext(
    args: &[ColumnarValue],
    num_rows: usize,
    _options: &GeometryOptions,
) -> GeoBlobResult<ColumnarValue> {
    let binder = BatchBinder::try_new(args, num_rows)?;
    let texts = binder.utf8(0)?;
    let rows = binder.execute1(&texts, |text| {
        if text.is_empty() {
            return Ok(Some(vec![]));
        }
        let mut handle = codec::from_text(text, TextFormat::Wkt, None)?;
        if handle.srid() == 0 {
            handle = handle.with_srid(WGS84_SRID);
        }
        Ok(Some(codec::encode(&handle)))
    })?;
    binder.finish(rows)
}

fn st_geomfromwkb(
    args: &[ColumnarValue],
    num_rows: usize,
    _options: &GeometryOptions,
) -> GeoBlobResult<ColumnarValue> {
    let binder = BatchBinder::try_new(args, num_rows)?;
    let buffers = binder.binary(0)?;
    let parse = |bytes: &[u8], srid: Option<i32>| -> GeoBlobResult<Option<Vec<u8>>> {
        if bytes.is_empty() {
            return Ok(Some(vec![]));
        }
        Ok(Some(codec::encode(&codec::from_wkb(bytes, srid)?)))
    };
    let rows = match binder.num_args() {
        1 => binder.execute1(&buffers, |bytes| parse(bytes, None))?,
        2 => {
            let srids = binder.int32(1)?;
            binder.execute2(&buffers, &srids, |bytes, srid| parse(bytes, Some(srid)))?
        }
        n => return Err(unsupported("st_geomfromwkb", n)),
    };
    binder.finish(rows)
}

fn st_geomfromgeohash(
    args: &[ColumnarValue],
    num_rows: usize,
    _options: &GeometryOptions,
) -> GeoBlobResult<ColumnarValue> {
    let binder = BatchBinder::try_new(args, num_rows)?;
    let hashes = binder.utf8(0)?;
    let parse = |hash: &str, precision: Option<usize>| -> GeoBlobResult<Option<Vec<u8>>> {
        if hash.is_empty() {
            return Ok(Some(vec![]));
        }
        Ok(Some(codec::encode(&geohash::read_geohash(
            hash, precision, None,
        )?)))
    };
    let rows = match binder.num_args() {
        1 => binder.execute1(&hashes, |hash| parse(hash, None))?,
        2 => {
            let precisions = binder.int32(1)?;
            binder.execute2(&hashes, &precisions, |hash, precision| {
                parse(hash, count(precision))
            })?
        }
        n => return Err(unsupported("st_geomfromgeohash", n)),
    };
    binder.finish(rows)
}

/// Shared body of the text renderers. An empty blob renders as empty text.
fn to_text(
    args: &[ColumnarValue],
    num_rows: usize,
    format: TextFormat,
    default_precision: usize,
) -> GeoBlobResult<ColumnarValue> {
    let binder = BatchBinder::try_new(args, num_rows)?;
    let blobs = binder.binary(0)?;
    let render = |blob: &[u8], precision: usize| -> GeoBlobResult<Option<String>> {
        let Some(handle) = codec::decode(blob)? else {
            return Ok(Some(String::new()));
        };
        Ok(Some(codec::to_text(&handle, format, Some(precision))?))
    };
    let rows = match binder.num_args() {
        1 => binder.execute1(&blobs, |blob| render(blob, default_precision))?,
        2 => {
            let digits = binder.int32(1)?;
            binder.execute2(&blobs, &digits, |blob, digits| {
                render(blob, codec::decimal_digits(count(digits).or(Some(default_precision))))
            })?
        }
        n => return Err(unsupported("text output", n)),
    };
    binder.finish(rows)
}

fn st_astext(
    args: &[ColumnarValue],
    num_rows: usize,
    options: &GeometryOptions,
) -> GeoBlobResult<ColumnarValue> {
    to_text(args, num_rows, TextFormat::Wkt, options.decimal_digits())
}

fn st_asgeojson(
    args: &[ColumnarValue],
    num_rows: usize,
    options: &GeometryOptions,
) -> GeoBlobResult<ColumnarValue> {
    to_text(args, num_rows, TextFormat::GeoJson, options.decimal_digits())
}

fn byte_order(encoding: &str) -> GeoBlobResult<Endianness> {
    match encoding.to_ascii_uppercase().as_str() {
        "NDR" => Ok(Endianness::LittleEndian),
        "XDR" => Ok(Endianness::BigEndian),
        other => Err(GeoBlobError::invalid_argument(format!(
            "unknown WKB encoding {other:?}, expected NDR or XDR"
        ))),
    }
}

fn st_asbinary(
    args: &[ColumnarValue],
    num_rows: usize,
    _options: &GeometryOptions,
) -> GeoBlobResult<ColumnarValue> {
    let binder = BatchBinder::try_new(args, num_rows)?;
    let blobs = binder.binary(0)?;
    let write = |blob: &[u8], byte_order: Endianness| -> GeoBlobResult<Option<Vec<u8>>> {
        let Some(handle) = codec::decode(blob)? else {
            return Ok(Some(vec![]));
        };
        Ok(Some(codec::to_wkb(&handle, byte_order)))
    };
    let rows = match binder.num_args() {
        1 => binder.execute1(&blobs, |blob| write(blob, Endianness::LittleEndian))?,
        2 => {
            let encodings = binder.utf8(1)?;
            binder.execute2(&blobs, &encodings, |blob, encoding| {
                write(blob, byte_order(encoding)?)
            })?
        }
        n => return Err(unsupported("st_asbinary", n)),
    };
    binder.finish(rows)
}

fn st_geohash(
    args: &[ColumnarValue],
    num_rows: usize,
    options: &GeometryOptions,
) -> GeoBlobResult<ColumnarValue> {
    let binder = BatchBinder::try_new(args, num_rows)?;
    let blobs = binder.binary(0)?;
    let hash = |blob: &[u8], chars: Option<usize>| -> GeoBlobResult<Option<String>> {
        if blob.is_empty() {
            return Ok(Some(String::new()));
        }
        let handle = decode_present(blob)?;
        let chars = match handle.geometry() {
            Geometry::Point(_) => chars.or(Some(options.geohash_characters())),
            _ => chars,
        };
        Ok(Some(codec::to_text(&handle, TextFormat::GeoHash, chars)?))
    };
    let rows = match binder.num_args() {
        1 => binder.execute1(&blobs, |blob| hash(blob, None))?,
        2 => {
            let chars = binder.int32(1)?;
            binder.execute2(&blobs, &chars, |blob, chars| hash(blob, count(chars)))?
        }
        n => return Err(unsupported("st_geohash", n)),
    };
    binder.finish(rows)
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use arrow_array::cast::AsArray;
    use arrow_array::{Array, StringArray};
    use datafusion::prelude::SessionContext;
    use datafusion::scalar::ScalarValue;
    use rstest::rstest;

    use super::*;
    use crate::handle::live_handles;
    use crate::test::geometry::{garbage, point_blob, wkt_blob};
    use crate::udf::register_udfs;
    use crate::udf::test::{blob_scalar, function, invoke};

    fn text_scalar(text: &str) -> ColumnarValue {
        ColumnarValue::Scalar(ScalarValue::Utf8(Some(text.to_string())))
    }

    #[test]
    fn text_round_trip_keeps_srid() {
        let args = [text_scalar("SRID=3857;LINESTRING(0 1,1 2)")];
        let output = invoke("st_geomfromtext", &args, 1);
        let handle = codec::decode(output.as_binary::<i32>().value(0))
            .unwrap()
            .unwrap();
        assert_eq!(handle.srid(), 3857);

        let args = [
            text_scalar("POINT(1 2)"),
            ColumnarValue::Scalar(ScalarValue::Int32(Some(2154))),
        ];
        let output = invoke("st_geomfromtext", &args, 1);
        let handle = codec::decode(output.as_binary::<i32>().value(0))
            .unwrap()
            .unwrap();
        assert_eq!(handle.srid(), 2154);
    }

    #[test]
    fn geography_defaults_to_wgs84() {
        let args = [text_scalar("POINT(1 2)")];
        let output = invoke("st_geogfromtext", &args, 1);
        let handle = codec::decode(output.as_binary::<i32>().value(0))
            .unwrap()
            .unwrap();
        assert_eq!(handle.srid(), 4326);
    }

    #[rstest]
    #[case("st_geomfromtext")]
    #[case("st_geogfromtext")]
    #[case("st_geomfromgeojson")]
    #[case("st_geomfromgeohash")]
    fn empty_text_is_empty_blob(#[case] name: &str) {
        let output = invoke(name, &[text_scalar("")], 1);
        assert!(output.is_valid(0));
        assert!(output.as_binary::<i32>().value(0).is_empty());
    }

    #[test]
    fn malformed_text_is_parse_error() {
        let before = live_handles();
        let texts = StringArray::from(vec![Some("POINT(1 2)"), Some("POINT(1")]);
        let args = [ColumnarValue::Array(Arc::new(texts))];
        let result = function("st_geomfromtext").call(&args, 2);
        assert!(matches!(result, Err(GeoBlobError::Parse(_))));
        assert_eq!(live_handles(), before);
    }

    #[test]
    fn empty_blob_renders_empty() {
        for name in ["st_astext", "st_asgeojson", "st_geohash"] {
            let output = invoke(name, &[blob_scalar(vec![])], 1);
            assert_eq!(output.as_string::<i32>().value(0), "");
        }
        let output = invoke("st_asbinary", &[blob_scalar(vec![])], 1);
        assert!(output.as_binary::<i32>().value(0).is_empty());
    }

    #[test]
    fn malformed_blob_fails_output() {
        let result = function("st_astext").call(&[blob_scalar(garbage())], 1);
        assert!(matches!(result, Err(GeoBlobError::Parse(_))));
    }

    #[test]
    fn astext_precision() {
        let args = [
            blob_scalar(point_blob(1.23456, 2.)),
            ColumnarValue::Scalar(ScalarValue::Int32(Some(2))),
        ];
        let output = invoke("st_astext", &args, 1);
        assert_eq!(output.as_string::<i32>().value(0), "POINT(1.23 2)");
    }

    #[test]
    fn asbinary_byte_orders() {
        let blob = point_blob(1., 2.);
        let ndr = invoke("st_asbinary", &[blob_scalar(blob.clone())], 1);
        let ndr = ndr.as_binary::<i32>().value(0);
        assert_eq!(&ndr[..5], &[1, 1, 0, 0, 0]);

        let args = [blob_scalar(blob), text_scalar("xdr")];
        let xdr = invoke("st_asbinary", &args, 1);
        let xdr = xdr.as_binary::<i32>().value(0);
        assert_eq!(&xdr[..5], &[0, 0, 0, 0, 1]);

        let args = [blob_scalar(point_blob(1., 2.)), text_scalar("LE")];
        assert!(function("st_asbinary").call(&args, 1).is_err());
    }

    #[test]
    fn wkb_input_accepts_srid() {
        let wkb = codec::to_wkb(
            &codec::decode(&wkt_blob("LINESTRING(0 1,1 2)")).unwrap().unwrap(),
            Endianness::BigEndian,
        );
        let args = [
            blob_scalar(wkb),
            ColumnarValue::Scalar(ScalarValue::Int32(Some(4326))),
        ];
        let output = invoke("st_geomfromwkb", &args, 1);
        assert_eq!(
            output.as_binary::<i32>().value(0),
            codec::encode(
                &codec::decode(&wkt_blob("SRID=4326;LINESTRING(0 1,1 2)"))
                    .unwrap()
                    .unwrap()
            )
            .as_slice()
        );
    }

    #[test]
    fn geohash_of_point_and_cell() {
        let output = invoke("st_geohash", &[blob_scalar(point_blob(-126., 48.))], 1);
        assert_eq!(output.as_string::<i32>().value(0), "c0w3hf1s70w3");

        let args = [
            blob_scalar(point_blob(-126., 48.)),
            ColumnarValue::Scalar(ScalarValue::Int32(Some(5))),
        ];
        let output = invoke("st_geohash", &args, 1);
        assert_eq!(output.as_string::<i32>().value(0), "c0w3h");

        let output = invoke("st_geomfromgeohash", &[text_scalar("c0w3h")], 1);
        let cell = codec::decode(output.as_binary::<i32>().value(0))
            .unwrap()
            .unwrap();
        let args = [
            blob_scalar(codec::encode(&cell)),
            ColumnarValue::Scalar(ScalarValue::Int32(Some(5))),
        ];
        let output = invoke("st_geohash", &args, 1);
        assert_eq!(output.as_string::<i32>().value(0), "c0w3h");
    }

    #[tokio::test]
    async fn sql_geojson_round_trip() {
        let ctx = SessionContext::new();
        register_udfs(&ctx);

        let df = ctx
            .sql(
                r#"SELECT ST_AsText(ST_GeomFromGeoJSON('{"type":"LineString","coordinates":[[0,1],[1,2]]}'));"#,
            )
            .await
            .unwrap();
        let batches = df.collect().await.unwrap();
        assert_eq!(
            batches[0].column(0).as_string::<i32>().value(0),
            "LINESTRING(0 1,1 2)"
        );
    }

    async fn sql_text(query: &str) -> String {
        let ctx = SessionContext::new();
        register_udfs(&ctx);
        let batches = ctx.sql(query).await.unwrap().collect().await.unwrap();
        batches[0].column(0).as_string::<i32>().value(0).to_string()
    }

    #[tokio::test]
    async fn sql_three_dimensional_text_round_trip() {
        assert_eq!(
            sql_text("SELECT ST_AsText(ST_MakePoint(1, 2, 3));").await,
            "POINT Z (1 2 3)"
        );
        assert_eq!(
            sql_text("SELECT ST_AsText(ST_GeomFromText(ST_AsText(ST_MakePoint(1, 2, 3))));").await,
            "POINT Z (1 2 3)"
        );
        assert_eq!(
            sql_text("SELECT ST_AsText(ST_GeomFromText('LINESTRING(0 0 1, 1 1 2)'));").await,
            "LINESTRING Z (0 0 1,1 1 2)"
        );
    }

    #[tokio::test]
    async fn sql_large_decimal_digits_are_capped() {
        assert_eq!(
            sql_text("SELECT ST_AsText(ST_Point(1.5, 2), 70000);").await,
            "POINT(1.5 2)"
        );
        assert_eq!(
            sql_text("SELECT ST_AsText(ST_Point(1.5, 2), 2147483647);").await,
            "POINT(1.5 2)"
        );
    }

    #[tokio::test]
    async fn sql_dictionary_constant() {
        assert_eq!(
            sql_text(
                "SELECT ST_AsText(ST_GeomFromText(arrow_cast('POINT(1 2)', 'Dictionary(Int32, Utf8)')));"
            )
            .await,
            "POINT(1 2)"
        );
    }
}
