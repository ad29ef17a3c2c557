//! HTTP Layer
//!
//! REST handlers, extractors and routing.

pub mod extractors;
pub mod handlers;
pub mod routes;
