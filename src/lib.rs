//! Vectorized geometry functions for [DataFusion](https://datafusion.apache.org) over serialized
//! geometry blobs.
//!
//! Geometries are stored in `Binary` columns as little-endian EWKB. A zero-length value is the
//! empty geometry: every function maps it to a fixed result instead of failing. Register the
//! functions on a session with [`udf::register_udfs`]:
//!
//! ```
//! use datafusion::prelude::SessionContext;
//!
//! let ctx = SessionContext::new();
//! geoblob::udf::register_udfs(&ctx);
//! ```

#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![cfg_attr(not(test), deny(unused_crate_dependencies))]

pub(crate) mod aggregate;
pub mod algorithm;
pub(crate) mod binder;
pub mod codec;
pub mod config;
pub mod error;
pub mod handle;
pub mod udf;

pub use config::{add_geometry_option_extension, GeometryOptions};
pub use error::{GeoBlobError, GeoBlobResult};
pub use handle::{live_handles, GeometryArray, GeometryHandle};
pub use udf::register_udfs;
