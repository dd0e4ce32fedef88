//! Geometry accessors and predicates.
//!
//! Each function decodes one blob per row and asks one question of it. A zero-length blob never
//! reaches the decoder: it gets the function's fixed empty result instead.

use datafusion::logical_expr::ColumnarValue;
use datafusion::scalar::ScalarValue;

use super::{ArgType, FunctionDef, OutputType};
use crate::algorithm::accessors;
use crate::binder::{BatchBinder, OutputValue};
use crate::codec;
use crate::codec::wkb::read_point_ordinate;
use crate::config::GeometryOptions;
use crate::error::{GeoBlobError, GeoBlobResult};
use crate::handle::GeometryHandle;

const GEOMETRY: &[&[ArgType]] = &[&[ArgType::Geometry]];

pub(super) static FUNCTIONS: &[FunctionDef] = &[
    FunctionDef {
        name: "st_dimension",
        aliases: &[],
        arguments: GEOMETRY,
        output: OutputType::Int32,
        kernel: st_dimension,
        description: "Returns the topological dimension of the geometry: 0 for points, 1 for lines, 2 for polygons. Returns -1 for an empty blob.",
        syntax: "ST_Dimension(geom)",
        argument_docs: &[("geom", "geometry")],
        sql_example: None,
    },
    FunctionDef {
        name: "st_npoints",
        aliases: &[],
        arguments: GEOMETRY,
        output: OutputType::Int32,
        kernel: st_npoints,
        description: "Returns the number of vertices in the geometry.",
        syntax: "ST_NPoints(geom)",
        argument_docs: &[("geom", "geometry")],
        sql_example: None,
    },
    FunctionDef {
        name: "st_numgeometries",
        aliases: &[],
        arguments: GEOMETRY,
        output: OutputType::Int32,
        kernel: st_numgeometries,
        description: "Returns the number of elements of a collection, or 1 for a single geometry.",
        syntax: "ST_NumGeometries(geom)",
        argument_docs: &[("geom", "geometry")],
        sql_example: None,
    },
    FunctionDef {
        name: "st_numpoints",
        aliases: &[],
        arguments: GEOMETRY,
        output: OutputType::Int32,
        kernel: st_numpoints,
        description: "Returns the number of points in a LineString, NULL for other geometry types.",
        syntax: "ST_NumPoints(linestring)",
        argument_docs: &[("linestring", "linestring geometry")],
        sql_example: None,
    },
    FunctionDef {
        name: "st_isempty",
        aliases: &[],
        arguments: GEOMETRY,
        output: OutputType::Boolean,
        kernel: st_isempty,
        description: "Returns true if the geometry has no coordinates.",
        syntax: "ST_IsEmpty(geom)",
        argument_docs: &[("geom", "geometry")],
        sql_example: None,
    },
    FunctionDef {
        name: "st_isring",
        aliases: &[],
        arguments: GEOMETRY,
        output: OutputType::Boolean,
        kernel: st_isring,
        description: "Returns true if the LineString is closed and simple.",
        syntax: "ST_IsRing(linestring)",
        argument_docs: &[("linestring", "linestring geometry")],
        sql_example: None,
    },
    FunctionDef {
        name: "st_isclosed",
        aliases: &[],
        arguments: GEOMETRY,
        output: OutputType::Boolean,
        kernel: st_isclosed,
        description: "Returns true if the start and end points of every line coincide. Points and polygons are closed.",
        syntax: "ST_IsClosed(geom)",
        argument_docs: &[("geom", "geometry")],
        sql_example: None,
    },
    FunctionDef {
        name: "st_iscollection",
        aliases: &[],
        arguments: GEOMETRY,
        output: OutputType::Boolean,
        kernel: st_iscollection,
        description: "Returns true if the geometry is a multi-geometry or a geometry collection.",
        syntax: "ST_IsCollection(geom)",
        argument_docs: &[("geom", "geometry")],
        sql_example: None,
    },
    FunctionDef {
        name: "st_geometrytype",
        aliases: &[],
        arguments: GEOMETRY,
        output: OutputType::Utf8,
        kernel: st_geometrytype,
        description: "Returns the type of the geometry as an upper-case string, e.g. POINT or MULTIPOLYGON.",
        syntax: "ST_GeometryType(geom)",
        argument_docs: &[("geom", "geometry")],
        sql_example: None,
    },
    FunctionDef {
        name: "st_pointn",
        aliases: &[],
        arguments: &[&[ArgType::Geometry, ArgType::Int32]],
        output: OutputType::Binary,
        kernel: st_pointn,
        description: "Returns the Nth point of a LineString, counting from 1. Negative values count backwards from the end, so -1 is the last point. NULL when out of range or not a LineString.",
        syntax: "ST_PointN(linestring, n)",
        argument_docs: &[
            ("linestring", "linestring geometry"),
            ("n", "1-based index"),
        ],
        sql_example: None,
    },
    FunctionDef {
        name: "st_startpoint",
        aliases: &[],
        arguments: GEOMETRY,
        output: OutputType::Binary,
        kernel: st_startpoint,
        description: "Returns the first point of a LineString.",
        syntax: "ST_StartPoint(linestring)",
        argument_docs: &[("linestring", "linestring geometry")],
        sql_example: None,
    },
    FunctionDef {
        name: "st_endpoint",
        aliases: &[],
        arguments: GEOMETRY,
        output: OutputType::Binary,
        kernel: st_endpoint,
        description: "Returns the last point of a LineString.",
        syntax: "ST_EndPoint(linestring)",
        argument_docs: &[("linestring", "linestring geometry")],
        sql_example: None,
    },
    FunctionDef {
        name: "st_x",
        aliases: &[],
        arguments: GEOMETRY,
        output: OutputType::Float64,
        kernel: st_x,
        description: "Returns the X coordinate of a point. Returns 0 for an empty blob or anything that is not a point, NULL for the empty point.",
        syntax: "ST_X(point)",
        argument_docs: &[("point", "point geometry")],
        sql_example: None,
    },
    FunctionDef {
        name: "st_y",
        aliases: &[],
        arguments: GEOMETRY,
        output: OutputType::Float64,
        kernel: st_y,
        description: "Returns the Y coordinate of a point. Returns 0 for an empty blob or anything that is not a point, NULL for the empty point.",
        syntax: "ST_Y(point)",
        argument_docs: &[("point", "point geometry")],
        sql_example: None,
    },
    FunctionDef {
        name: "st_boundary",
        aliases: &[],
        arguments: GEOMETRY,
        output: OutputType::Binary,
        kernel: st_boundary,
        description: "Returns the boundary of the geometry. Unreadable input yields an empty blob.",
        syntax: "ST_Boundary(geom)",
        argument_docs: &[("geom", "geometry")],
        sql_example: None,
    },
    FunctionDef {
        name: "st_dump",
        aliases: &[],
        arguments: GEOMETRY,
        output: OutputType::BinaryList,
        kernel: st_dump,
        description: "Returns the components of a geometry as an array, flattening nested collections. Only the first row of the argument is dumped and the result applies to every row.",
        syntax: "ST_Dump(geom)",
        argument_docs: &[("geom", "geometry")],
        sql_example: None,
    },
];

/// Decode each row and apply `op`; rows with a zero-length blob get `empty`.
fn map_geometry<O, F>(
    args: &[ColumnarValue],
    num_rows: usize,
    empty: O,
    op: F,
) -> GeoBlobResult<ColumnarValue>
where
    O: OutputValue + Clone,
    F: Fn(&GeometryHandle) -> GeoBlobResult<Option<O>>,
{
    let binder = BatchBinder::try_new(args, num_rows)?;
    let blobs = binder.binary(0)?;
    let rows = binder.execute1(&blobs, |blob| match codec::decode(blob)? {
        Some(handle) => op(&handle),
        None => Ok(Some(empty.clone())),
    })?;
    binder.finish(rows)
}

fn to_i32(count: usize) -> GeoBlobResult<i32> {
    i32::try_from(count)
        .map_err(|_| GeoBlobError::geometry(format!("count {count} does not fit in an integer")))
}

fn st_dimension(
    args: &[ColumnarValue],
    num_rows: usize,
    _options: &GeometryOptions,
) -> GeoBlobResult<ColumnarValue> {
    map_geometry(args, num_rows, -1, |handle| {
        Ok(Some(accessors::dimension(handle.geometry())))
    })
}

// The counting functions report 1 for a zero-length blob.
fn st_npoints(
    args: &[ColumnarValue],
    num_rows: usize,
    _options: &GeometryOptions,
) -> GeoBlobResult<ColumnarValue> {
    map_geometry(args, num_rows, 1, |handle| {
        to_i32(accessors::num_vertices(handle.geometry())).map(Some)
    })
}

fn st_numgeometries(
    args: &[ColumnarValue],
    num_rows: usize,
    _options: &GeometryOptions,
) -> GeoBlobResult<ColumnarValue> {
    map_geometry(args, num_rows, 1, |handle| {
        to_i32(accessors::num_geometries(handle.geometry())).map(Some)
    })
}

fn st_numpoints(
    args: &[ColumnarValue],
    num_rows: usize,
    _options: &GeometryOptions,
) -> GeoBlobResult<ColumnarValue> {
    map_geometry(args, num_rows, 1, |handle| {
        accessors::num_points(handle.geometry())
            .map(to_i32)
            .transpose()
    })
}

fn st_isempty(
    args: &[ColumnarValue],
    num_rows: usize,
    _options: &GeometryOptions,
) -> GeoBlobResult<ColumnarValue> {
    map_geometry(args, num_rows, true, |handle| {
        Ok(Some(accessors::is_empty(handle.geometry())))
    })
}

fn st_isring(
    args: &[ColumnarValue],
    num_rows: usize,
    _options: &GeometryOptions,
) -> GeoBlobResult<ColumnarValue> {
    map_geometry(args, num_rows, true, |handle| {
        Ok(Some(accessors::is_ring(handle.geometry())))
    })
}

fn st_isclosed(
    args: &[ColumnarValue],
    num_rows: usize,
    _options: &GeometryOptions,
) -> GeoBlobResult<ColumnarValue> {
    map_geometry(args, num_rows, false, |handle| {
        Ok(Some(accessors::is_closed(handle.geometry())))
    })
}

fn st_iscollection(
    args: &[ColumnarValue],
    num_rows: usize,
    _options: &GeometryOptions,
) -> GeoBlobResult<ColumnarValue> {
    map_geometry(args, num_rows, false, |handle| {
        Ok(Some(accessors::is_collection(handle.geometry())))
    })
}

fn st_geometrytype(
    args: &[ColumnarValue],
    num_rows: usize,
    _options: &GeometryOptions,
) -> GeoBlobResult<ColumnarValue> {
    map_geometry(args, num_rows, String::new(), |handle| {
        Ok(Some(accessors::geometry_type(handle.geometry()).to_string()))
    })
}

fn st_pointn(
    args: &[ColumnarValue],
    num_rows: usize,
    _options: &GeometryOptions,
) -> GeoBlobResult<ColumnarValue> {
    let binder = BatchBinder::try_new(args, num_rows)?;
    let blobs = binder.binary(0)?;
    let indices = binder.int32(1)?;
    let rows = binder.execute2(&blobs, &indices, |blob, n| {
        let Some(handle) = codec::decode(blob)? else {
            return Ok(Some(vec![]));
        };
        Ok(accessors::point_n(&handle, n).map(|point| codec::encode(&point)))
    })?;
    binder.finish(rows)
}

fn st_startpoint(
    args: &[ColumnarValue],
    num_rows: usize,
    _options: &GeometryOptions,
) -> GeoBlobResult<ColumnarValue> {
    map_geometry(args, num_rows, vec![], |handle| {
        Ok(accessors::start_point(handle).map(|point| codec::encode(&point)))
    })
}

fn st_endpoint(
    args: &[ColumnarValue],
    num_rows: usize,
    _options: &GeometryOptions,
) -> GeoBlobResult<ColumnarValue> {
    map_geometry(args, num_rows, vec![], |handle| {
        Ok(accessors::end_point(handle).map(|point| codec::encode(&point)))
    })
}

/// Read one ordinate straight from the blob bytes without building a handle.
fn point_ordinate(
    args: &[ColumnarValue],
    num_rows: usize,
    ordinate: usize,
) -> GeoBlobResult<ColumnarValue> {
    let binder = BatchBinder::try_new(args, num_rows)?;
    let blobs = binder.binary(0)?;
    let rows = binder.execute1(&blobs, |blob| {
        Ok(match read_point_ordinate(blob, ordinate) {
            Some(value) if value.is_nan() => None,
            Some(value) => Some(value),
            None => Some(0.),
        })
    })?;
    binder.finish(rows)
}

fn st_x(
    args: &[ColumnarValue],
    num_rows: usize,
    _options: &GeometryOptions,
) -> GeoBlobResult<ColumnarValue> {
    point_ordinate(args, num_rows, 0)
}

fn st_y(
    args: &[ColumnarValue],
    num_rows: usize,
    _options: &GeometryOptions,
) -> GeoBlobResult<ColumnarValue> {
    point_ordinate(args, num_rows, 1)
}

fn st_boundary(
    args: &[ColumnarValue],
    num_rows: usize,
    _options: &GeometryOptions,
) -> GeoBlobResult<ColumnarValue> {
    let binder = BatchBinder::try_new(args, num_rows)?;
    let blobs = binder.binary(0)?;
    let rows = binder.execute1(&blobs, |blob| match codec::decode(blob) {
        Ok(Some(handle)) => Ok(Some(codec::encode(&accessors::boundary(&handle)?))),
        Ok(None) | Err(GeoBlobError::Parse(_)) => Ok(Some(vec![])),
        Err(err) => Err(err),
    })?;
    binder.finish(rows)
}

fn st_dump(
    args: &[ColumnarValue],
    num_rows: usize,
    _options: &GeometryOptions,
) -> GeoBlobResult<ColumnarValue> {
    let binder = BatchBinder::try_new(args, num_rows)?;
    let blobs = binder.binary(0)?;
    let members = match blobs.get(0) {
        Some(blob) => match codec::decode(blob)? {
            Some(handle) => Some(
                accessors::dump(&handle)
                    .iter()
                    .map(codec::encode)
                    .collect::<Vec<_>>(),
            ),
            None => Some(vec![]),
        },
        None => None,
    };
    let array = <Vec<Vec<u8>> as OutputValue>::into_array(vec![members]);
    Ok(ColumnarValue::Scalar(ScalarValue::try_from_array(
        &array, 0,
    )?))
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use arrow_array::cast::AsArray;
    use arrow_array::types::{Float64Type, Int32Type};
    use arrow_array::{Array, ArrayRef, BinaryArray, DictionaryArray, Int8Array};
    use datafusion::prelude::SessionContext;
    use geo::{Geometry, Point};
    use rstest::rstest;

    use super::*;
    use crate::handle::live_handles;
    use crate::test::geometry::{blob, garbage, gc0, ls0, mp0, point_blob, poly1, ring0, wkt_blob};
    use crate::udf::register_udfs;
    use crate::udf::test::{blob_scalar, function, invoke};

    const ONE_ARG_FUNCTIONS: &[&str] = &[
        "st_dimension",
        "st_npoints",
        "st_numgeometries",
        "st_numpoints",
        "st_isempty",
        "st_isring",
        "st_isclosed",
        "st_iscollection",
        "st_geometrytype",
        "st_startpoint",
        "st_endpoint",
        "st_x",
        "st_y",
        "st_boundary",
    ];

    fn ints(array: &ArrayRef) -> Vec<Option<i32>> {
        array.as_primitive::<Int32Type>().iter().collect()
    }

    fn bools(array: &ArrayRef) -> Vec<Option<bool>> {
        array.as_boolean().iter().collect()
    }

    #[rstest]
    #[case(blob(ls0()))]
    #[case(blob(poly1()))]
    #[case(blob(gc0()))]
    #[case(point_blob(3., 4.))]
    #[case(vec![])]
    fn constant_matches_flat(#[case] value: Vec<u8>) {
        for name in ONE_ARG_FUNCTIONS {
            if *name == "st_boundary" && value == blob(gc0()) {
                continue;
            }
            let constant = invoke(name, &[blob_scalar(value.clone())], 4);
            let flat = BinaryArray::from_iter(vec![Some(value.clone()); 4]);
            let flat = invoke(name, &[ColumnarValue::Array(Arc::new(flat))], 4);
            assert_eq!(&constant, &flat, "{name}");
        }
    }

    #[test]
    fn empty_input_policies() {
        let empty = || [blob_scalar(vec![])];
        assert_eq!(ints(&invoke("st_dimension", &empty(), 1)), [Some(-1)]);
        assert_eq!(ints(&invoke("st_npoints", &empty(), 1)), [Some(1)]);
        assert_eq!(ints(&invoke("st_numgeometries", &empty(), 1)), [Some(1)]);
        assert_eq!(ints(&invoke("st_numpoints", &empty(), 1)), [Some(1)]);
        assert_eq!(bools(&invoke("st_isempty", &empty(), 1)), [Some(true)]);
        assert_eq!(bools(&invoke("st_isring", &empty(), 1)), [Some(true)]);
        assert_eq!(bools(&invoke("st_isclosed", &empty(), 1)), [Some(false)]);
        assert_eq!(
            bools(&invoke("st_iscollection", &empty(), 1)),
            [Some(false)]
        );
        let output = invoke("st_geometrytype", &empty(), 1);
        assert_eq!(output.as_string::<i32>().value(0), "");
        for name in ["st_startpoint", "st_endpoint", "st_boundary"] {
            let output = invoke(name, &empty(), 1);
            assert!(output.is_valid(0));
            assert!(output.as_binary::<i32>().value(0).is_empty());
        }
        let args = [
            blob_scalar(vec![]),
            ColumnarValue::Scalar(ScalarValue::Int32(Some(1))),
        ];
        let output = invoke("st_pointn", &args, 1);
        assert!(output.as_binary::<i32>().value(0).is_empty());
        for name in ["st_x", "st_y"] {
            let output = invoke(name, &empty(), 1);
            assert_eq!(output.as_primitive::<Float64Type>().value(0), 0.);
        }
    }

    #[rstest]
    #[case("st_dimension")]
    #[case("st_npoints")]
    #[case("st_isempty")]
    #[case("st_isclosed")]
    #[case("st_geometrytype")]
    #[case("st_endpoint")]
    fn malformed_input_is_parse_error(#[case] name: &str) {
        let before = live_handles();
        let blobs = BinaryArray::from_iter(vec![Some(blob(ls0())), Some(garbage())]);
        let result = function(name).call(&[ColumnarValue::Array(Arc::new(blobs))], 2);
        assert!(matches!(result, Err(GeoBlobError::Parse(_))));
        assert_eq!(live_handles(), before);
    }

    #[test]
    fn malformed_tolerated_by_fast_paths() {
        let output = invoke("st_x", &[blob_scalar(garbage())], 1);
        assert_eq!(output.as_primitive::<Float64Type>().value(0), 0.);
        let output = invoke("st_boundary", &[blob_scalar(garbage())], 1);
        assert!(output.as_binary::<i32>().value(0).is_empty());
    }

    #[test]
    fn coordinates() {
        let blobs = BinaryArray::from_iter(vec![
            Some(point_blob(3., 4.)),
            None,
            Some(blob(ls0())),
            Some(codec::encode(&GeometryHandle::empty_point(0))),
            Some(wkt_blob("SRID=4326;POINT(5 6)")),
        ]);
        let args = [ColumnarValue::Array(Arc::new(blobs))];
        let xs = invoke("st_x", &args, 5);
        let xs: Vec<Option<f64>> = xs.as_primitive::<Float64Type>().iter().collect();
        assert_eq!(xs, [Some(3.), None, Some(0.), None, Some(5.)]);
        let ys = invoke("st_y", &args, 5);
        let ys: Vec<Option<f64>> = ys.as_primitive::<Float64Type>().iter().collect();
        assert_eq!(ys, [Some(4.), None, Some(0.), None, Some(6.)]);
    }

    #[test]
    fn point_n_is_one_based() {
        let line = wkt_blob("LINESTRING(0 0,1 1,2 2)");
        let point_at = |n: i32| {
            let args = [
                blob_scalar(line.clone()),
                ColumnarValue::Scalar(ScalarValue::Int32(Some(n))),
            ];
            let output = invoke("st_pointn", &args, 1);
            let output = output.as_binary::<i32>();
            output.is_valid(0).then(|| {
                codec::decode(output.value(0))
                    .unwrap()
                    .unwrap()
                    .geometry()
                    .clone()
            })
        };
        assert_eq!(point_at(1), Some(Geometry::Point(Point::new(0., 0.))));
        assert_eq!(point_at(3), Some(Geometry::Point(Point::new(2., 2.))));
        assert_eq!(point_at(-1), Some(Geometry::Point(Point::new(2., 2.))));
        assert_eq!(point_at(0), None);
        assert_eq!(point_at(4), None);
    }

    #[test]
    fn dictionary_input() {
        let values = BinaryArray::from_iter(vec![Some(blob(ring0())), Some(blob(ls0()))]);
        let keys = Int8Array::from(vec![Some(1), Some(0), None, Some(1)]);
        let dictionary = DictionaryArray::try_new(keys, Arc::new(values)).unwrap();
        let args = [ColumnarValue::Array(Arc::new(dictionary))];
        let output = invoke("st_isring", &args, 4);
        assert_eq!(
            bools(&output),
            [Some(false), Some(true), None, Some(false)]
        );
    }

    #[test]
    fn dump_members() {
        let before = live_handles();
        let output = invoke("st_dump", &[blob_scalar(blob(gc0()))], 2);
        let lists = output.as_list::<i32>();
        assert_eq!(lists.len(), 2);
        let members = lists.value(1);
        let members = members.as_binary::<i32>();
        assert_eq!(members.len(), 3);
        assert!(members
            .iter()
            .all(|member| codec::decode(member.unwrap()).unwrap().is_some()));
        assert_eq!(live_handles(), before);

        let output = invoke("st_dump", &[blob_scalar(blob(mp0()))], 1);
        assert_eq!(output.as_list::<i32>().value(0).len(), 3);
    }

    #[tokio::test]
    async fn sql_accessors() {
        let ctx = SessionContext::new();
        register_udfs(&ctx);

        let df = ctx
            .sql(
                "SELECT ST_GeometryType(g), ST_NPoints(g), ST_IsClosed(g), ST_X(ST_StartPoint(g)) \
                 FROM (SELECT ST_GeomFromText('LINESTRING(3 4,10 50,20 25)') AS g);",
            )
            .await
            .unwrap();
        let batches = df.collect().await.unwrap();
        let batch = &batches[0];
        assert_eq!(batch.column(0).as_string::<i32>().value(0), "LINESTRING");
        assert_eq!(batch.column(1).as_primitive::<Int32Type>().value(0), 3);
        assert!(!batch.column(2).as_boolean().value(0));
        assert_eq!(batch.column(3).as_primitive::<Float64Type>().value(0), 3.);
    }
}
