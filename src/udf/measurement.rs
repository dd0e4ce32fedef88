use datafusion::logical_expr::ColumnarValue;

use super::constructors::unsupported;
use super::{decode_present, ArgType, FunctionDef, OutputType};
use crate::algorithm::measurement::distance;
use crate::binder::BatchBinder;
use crate::config::GeometryOptions;
use crate::error::GeoBlobResult;

pub(super) static FUNCTIONS: &[FunctionDef] = &[FunctionDef {
    name: "st_distance",
    aliases: &[],
    arguments: &[
        &[ArgType::Geometry, ArgType::Geometry],
        &[ArgType::Geometry, ArgType::Geometry, ArgType::Boolean],
    ],
    output: OutputType::Float64,
    kernel: st_distance,
    description: "Returns the minimum distance between two geometries. Planar by default, in the units of the coordinates. With use_spheroid, coordinates are longitude/latitude and the result is in meters on the WGS84 spheroid. Returns 0 if either blob is empty.",
    syntax: "ST_Distance(geom1, geom2[, use_spheroid])",
    argument_docs: &[
        ("geom1", "geometry"),
        ("geom2", "geometry with the same SRID"),
        ("use_spheroid", "measure along the WGS84 spheroid"),
    ],
    sql_example: Some("SELECT ST_Distance(ST_MakePoint(0, 0), ST_MakePoint(3, 4));"),
}];

fn measure(a: &[u8], b: &[u8], use_spheroid: bool) -> GeoBlobResult<Option<f64>> {
    if a.is_empty() || b.is_empty() {
        return Ok(Some(0.));
    }
    let a = decode_present(a)?;
    let b = decode_present(b)?;
    distance(&a, &b, use_spheroid)
}

fn st_distance(
    args: &[ColumnarValue],
    num_rows: usize,
    _options: &GeometryOptions,
) -> GeoBlobResult<ColumnarValue> {
    let binder = BatchBinder::try_new(args, num_rows)?;
    let a = binder.binary(0)?;
    let b = binder.binary(1)?;
    let rows = match binder.num_args() {
        2 => binder.execute2(&a, &b, |a, b| measure(a, b, false))?,
        3 => {
            let use_spheroid = binder.boolean(2)?;
            binder.execute3(&a, &b, &use_spheroid, measure)?
        }
        n => return Err(unsupported("st_distance", n)),
    };
    binder.finish(rows)
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use approx::assert_relative_eq;
    use arrow_array::cast::AsArray;
    use arrow_array::types::Float64Type;
    use arrow_array::BinaryArray;
    use datafusion::prelude::SessionContext;
    use datafusion::scalar::ScalarValue;
    use rstest::rstest;

    use super::*;
    use crate::error::GeoBlobError;
    use crate::handle::live_handles;
    use crate::test::geometry::{blob, garbage, gc0, ls0, mpoly0, point_blob, poly0};
    use crate::udf::register_udfs;
    use crate::udf::test::{blob_scalar, function, invoke};

    fn distances(args: &[ColumnarValue], num_rows: usize) -> Vec<Option<f64>> {
        invoke("st_distance", args, num_rows)
            .as_primitive::<Float64Type>()
            .iter()
            .collect()
    }

    #[rstest]
    #[case(blob(ls0()))]
    #[case(blob(poly0()))]
    #[case(blob(mpoly0()))]
    #[case(blob(gc0()))]
    #[case(point_blob(-3., 7.))]
    fn distance_to_self_is_zero(#[case] value: Vec<u8>) {
        let args = [blob_scalar(value.clone()), blob_scalar(value)];
        assert_eq!(distances(&args, 1), [Some(0.)]);
    }

    #[test]
    fn empty_operand_is_zero() {
        let args = [blob_scalar(vec![]), blob_scalar(point_blob(5., 5.))];
        assert_eq!(distances(&args, 1), [Some(0.)]);
        let args = [blob_scalar(point_blob(5., 5.)), blob_scalar(vec![])];
        assert_eq!(distances(&args, 1), [Some(0.)]);
    }

    #[test]
    fn per_row_with_nulls() {
        let others = BinaryArray::from_iter(vec![
            Some(point_blob(3., 4.)),
            None,
            Some(point_blob(0., -2.)),
        ]);
        let args = [
            blob_scalar(point_blob(0., 0.)),
            ColumnarValue::Array(Arc::new(others)),
        ];
        assert_eq!(distances(&args, 3), [Some(5.), None, Some(2.)]);
    }

    #[test]
    fn spheroid() {
        let args = [
            blob_scalar(point_blob(0., 0.)),
            blob_scalar(point_blob(0., 1.)),
            ColumnarValue::Scalar(ScalarValue::Boolean(Some(true))),
        ];
        let meters = distances(&args, 1)[0].unwrap();
        assert_relative_eq!(meters, 110_574.39, epsilon = 0.01);
    }

    #[test]
    fn malformed_operand_fails() {
        let before = live_handles();
        let args = [blob_scalar(point_blob(0., 0.)), blob_scalar(garbage())];
        assert!(matches!(
            function("st_distance").call(&args, 1),
            Err(GeoBlobError::Parse(_))
        ));
        assert_eq!(live_handles(), before);
    }

    #[tokio::test]
    async fn sql_distance() {
        let ctx = SessionContext::new();
        register_udfs(&ctx);

        let df = ctx
            .sql(
                "SELECT ST_Distance(ST_GeomFromText('POINT(0 0)'), \
                 ST_GeomFromText('LINESTRING(2 -1,2 1)'));",
            )
            .await
            .unwrap();
        let batches = df.collect().await.unwrap();
        assert_eq!(
            batches[0].column(0).as_primitive::<Float64Type>().value(0),
            2.
        );
    }
}
