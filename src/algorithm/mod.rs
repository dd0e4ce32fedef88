//! Geometry algorithms on [`GeometryHandle`](crate::handle::GeometryHandle)s.

pub mod accessors;
pub mod constructors;
pub mod measurement;
