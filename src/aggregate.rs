//! Aggregation of a row's list-of-geometry argument into a [`GeometryArray`].
//!
//! The row itself must be valid (the binder never calls a body for a missing list). Inside the
//! list each element has its own validity: missing, zero-length and undecodable elements are
//! skipped, and the surviving handles keep their relative order without gaps.

use arrow_array::cast::AsArray;
use arrow_array::{Array, ArrayRef};
use log::debug;

use crate::codec;
use crate::error::{GeoBlobError, GeoBlobResult};
use crate::handle::GeometryArray;

/// Decode the elements of one list value.
pub(crate) fn aggregate_geometries(elements: &ArrayRef) -> GeoBlobResult<GeometryArray> {
    let blobs = elements.as_binary_opt::<i32>().ok_or_else(|| {
        GeoBlobError::invalid_argument(format!(
            "list elements must be Binary, got {}",
            elements.data_type()
        ))
    })?;

    let mut geometries = GeometryArray::with_capacity(blobs.len());
    for (i, blob) in blobs.iter().enumerate() {
        let Some(blob) = blob else {
            debug!("skipping missing list element {i}");
            continue;
        };
        match codec::decode(blob) {
            Ok(Some(handle)) => geometries.push(handle),
            Ok(None) => debug!("skipping empty list element {i}"),
            Err(err) => debug!("skipping undecodable list element {i}: {err}"),
        }
    }
    Ok(geometries)
}
