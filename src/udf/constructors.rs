//! Geometry constructors.

use datafusion::logical_expr::ColumnarValue;

use super::{decode_present, ArgType, FunctionDef, OutputType};
use crate::aggregate::aggregate_geometries;
use crate::algorithm::constructors::{make_line, make_line_from_array, make_point, make_polygon};
use crate::binder::BatchBinder;
use crate::codec;
use crate::config::GeometryOptions;
use crate::error::{GeoBlobError, GeoBlobResult};

pub(super) static FUNCTIONS: &[FunctionDef] = &[
    FunctionDef {
        name: "st_makepoint",
        aliases: &["st_point"],
        arguments: &[
            &[ArgType::Float64, ArgType::Float64],
            &[ArgType::Float64, ArgType::Float64, ArgType::Float64],
        ],
        output: OutputType::Binary,
        kernel: st_makepoint,
        description: "Creates a 2D or 3D point geometry with SRID 0.",
        syntax: "ST_MakePoint(x, y[, z])",
        argument_docs: &[
            ("x", "x coordinate"),
            ("y", "y coordinate"),
            ("z", "optional z coordinate"),
        ],
        sql_example: Some("SELECT ST_AsText(ST_MakePoint(-71.1043443253471, 42.3150676015829));"),
    },
    FunctionDef {
        name: "st_makeline",
        aliases: &[],
        arguments: &[&[ArgType::Geometry, ArgType::Geometry], &[ArgType::GeometryList]],
        output: OutputType::Binary,
        kernel: st_makeline,
        description: "Creates a LineString containing the points of Point, MultiPoint, or LineString geometries. In the array form, missing, empty and unreadable elements are skipped.",
        syntax: "ST_MakeLine(geom1, geom2) or ST_MakeLine(geoms)",
        argument_docs: &[
            ("geom1", "first geometry"),
            ("geom2", "second geometry"),
            ("geoms", "array of geometries"),
        ],
        sql_example: None,
    },
    FunctionDef {
        name: "st_makepolygon",
        aliases: &[],
        arguments: &[&[ArgType::Geometry], &[ArgType::Geometry, ArgType::GeometryList]],
        output: OutputType::Binary,
        kernel: st_makepolygon,
        description: "Creates a Polygon formed by the given shell and optional array of holes. Input geometries must be closed LineStrings (rings).",
        syntax: "ST_MakePolygon(shell[, holes])",
        argument_docs: &[
            ("shell", "closed linestring"),
            ("holes", "array of closed linestrings"),
        ],
        sql_example: None,
    },
];

fn st_makepoint(
    args: &[ColumnarValue],
    num_rows: usize,
    _options: &GeometryOptions,
) -> GeoBlobResult<ColumnarValue> {
    let binder = BatchBinder::try_new(args, num_rows)?;
    let x = binder.float64(0)?;
    let y = binder.float64(1)?;
    let rows = match binder.num_args() {
        2 => binder.execute2(&x, &y, |x, y| {
            Ok(Some(codec::encode(&make_point(x, y, None))))
        })?,
        3 => {
            let z = binder.float64(2)?;
            binder.execute3(&x, &y, &z, |x, y, z| {
                Ok(Some(codec::encode(&make_point(x, y, Some(z)))))
            })?
        }
        n => return Err(unsupported("st_makepoint", n)),
    };
    binder.finish(rows)
}

fn st_makeline(
    args: &[ColumnarValue],
    num_rows: usize,
    _options: &GeometryOptions,
) -> GeoBlobResult<ColumnarValue> {
    let binder = BatchBinder::try_new(args, num_rows)?;
    let rows = match binder.num_args() {
        1 => {
            let lists = binder.list(0)?;
            binder.execute1(&lists, |elements| {
                let geometries = aggregate_geometries(&elements)?;
                let line = make_line_from_array(&geometries)?;
                Ok(line.map(|line| codec::encode(&line)))
            })?
        }
        2 => {
            let a = binder.binary(0)?;
            let b = binder.binary(1)?;
            binder.execute2(&a, &b, |a, b| {
                if a.is_empty() || b.is_empty() {
                    return Ok(Some(vec![]));
                }
                let a = decode_present(a)?;
                let b = decode_present(b)?;
                Ok(Some(codec::encode(&make_line(&a, &b)?)))
            })?
        }
        n => return Err(unsupported("st_makeline", n)),
    };
    binder.finish(rows)
}

fn st_makepolygon(
    args: &[ColumnarValue],
    num_rows: usize,
    _options: &GeometryOptions,
) -> GeoBlobResult<ColumnarValue> {
    let binder = BatchBinder::try_new(args, num_rows)?;
    let shells = binder.binary(0)?;
    let rows = match binder.num_args() {
        1 => binder.execute1(&shells, |shell| {
            let Some(shell) = codec::decode(shell)? else {
                return Ok(Some(vec![]));
            };
            Ok(Some(codec::encode(&make_polygon(&shell, None)?)))
        })?,
        2 => {
            let holes = binder.list(1)?;
            binder.execute2(&shells, &holes, |shell, holes| {
                let Some(shell) = codec::decode(shell)? else {
                    return Ok(Some(vec![]));
                };
                let holes = aggregate_geometries(&holes)?;
                Ok(Some(codec::encode(&make_polygon(&shell, Some(&holes))?)))
            })?
        }
        n => return Err(unsupported("st_makepolygon", n)),
    };
    binder.finish(rows)
}

pub(super) fn unsupported(name: &str, count: usize) -> GeoBlobError {
    GeoBlobError::invalid_argument(format!("{name} does not take {count} arguments"))
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use arrow_array::builder::{BinaryBuilder, ListBuilder};
    use arrow_array::cast::AsArray;
    use arrow_array::{Array, BinaryArray, Float64Array};
    use datafusion::prelude::SessionContext;
    use datafusion::scalar::ScalarValue;
    use geo::{line_string, Geometry};

    use super::*;
    use crate::handle::live_handles;
    use crate::test::geometry::{blob, garbage, point_blob, ring0, ring1};
    use crate::udf::register_udfs;
    use crate::udf::test::{blob_scalar, invoke};

    fn decoded(array: &dyn Array, row: usize) -> Geometry {
        codec::decode(array.as_binary::<i32>().value(row))
            .unwrap()
            .unwrap()
            .geometry()
            .clone()
    }

    fn list_of(rows: Vec<Option<Vec<Option<Vec<u8>>>>>) -> ColumnarValue {
        let mut builder = ListBuilder::new(BinaryBuilder::new());
        for row in rows {
            match row {
                Some(elements) => {
                    for element in elements {
                        builder.values().append_option(element);
                    }
                    builder.append(true);
                }
                None => builder.append(false),
            }
        }
        ColumnarValue::Array(Arc::new(builder.finish()))
    }

    #[test]
    fn point_with_z() {
        let args = [
            ColumnarValue::Array(Arc::new(Float64Array::from(vec![Some(1.), None]))),
            ColumnarValue::Scalar(ScalarValue::Float64(Some(2.))),
            ColumnarValue::Scalar(ScalarValue::Float64(Some(3.))),
        ];
        let output = invoke("st_makepoint", &args, 2);
        assert!(output.is_null(1));
        let handle = codec::decode(output.as_binary::<i32>().value(0))
            .unwrap()
            .unwrap();
        assert_eq!(handle.z(), Some(3.));
    }

    #[test]
    fn line_with_empty_operand_is_empty() {
        let args = [blob_scalar(vec![]), blob_scalar(garbage())];
        let output = invoke("st_makeline", &args, 1);
        assert!(output.is_valid(0));
        assert!(output.as_binary::<i32>().value(0).is_empty());
    }

    #[test]
    fn line_with_malformed_operand_fails() {
        let before = live_handles();
        let args = [blob_scalar(point_blob(0., 0.)), blob_scalar(garbage())];
        let result = crate::udf::test::function("st_makeline").call(&args, 1);
        assert!(matches!(result, Err(GeoBlobError::Parse(_))));
        assert_eq!(live_handles(), before);
    }

    #[test]
    fn line_from_array_skips_missing_elements() {
        let before = live_handles();
        let args = [list_of(vec![
            Some(vec![
                Some(point_blob(0., 1.)),
                None,
                Some(vec![]),
                Some(garbage()),
                Some(point_blob(1., 2.)),
            ]),
            None,
            Some(vec![None, Some(garbage())]),
        ])];
        let output = invoke("st_makeline", &args, 3);
        assert_eq!(
            decoded(&output, 0),
            Geometry::LineString(line_string![(x: 0., y: 1.), (x: 1., y: 2.)])
        );
        assert!(output.is_null(1));
        assert!(output.is_null(2));
        assert_eq!(live_handles(), before);
    }

    #[test]
    fn polygon_from_shell_and_holes() {
        let args = [
            blob_scalar(blob(ring0())),
            list_of(vec![Some(vec![Some(blob(ring1())), None])]),
        ];
        let output = invoke("st_makepolygon", &args, 1);
        let Geometry::Polygon(polygon) = decoded(&output, 0) else {
            panic!("expected a polygon");
        };
        assert_eq!(polygon.interiors().len(), 1);
    }

    #[test]
    fn polygon_from_open_shell_fails() {
        let shells = BinaryArray::from_iter(vec![Some(point_blob(0., 0.))]);
        let args = [ColumnarValue::Array(Arc::new(shells))];
        let result = crate::udf::test::function("st_makepolygon").call(&args, 1);
        assert!(matches!(result, Err(GeoBlobError::Geometry(_))));
    }

    #[tokio::test]
    async fn sql_make_line() {
        let ctx = SessionContext::new();
        register_udfs(&ctx);

        let df = ctx
            .sql(
                "SELECT ST_AsText(ST_MakeLine(ST_MakePoint(0, 0), ST_MakePoint(1, 1))), \
                 ST_AsText(ST_MakeLine(make_array(ST_MakePoint(0, 0), NULL, ST_MakePoint(2, 2))));",
            )
            .await
            .unwrap();
        let batches = df.collect().await.unwrap();
        assert_eq!(
            batches[0].column(0).as_string::<i32>().value(0),
            "LINESTRING(0 0,1 1)"
        );
        assert_eq!(
            batches[0].column(1).as_string::<i32>().value(0),
            "LINESTRING(0 0,2 2)"
        );
    }
}
