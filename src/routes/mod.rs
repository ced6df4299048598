//! HTTP route handlers grouped by resource.
//!
//! Handlers are thin: they decode the request, call into
//! [`IngestService`](crate::service::IngestService) and map failures to
//! [`ApiError`](crate::error::ApiError). Each is annotated with `#[openapi]`
//! so `rocket_okapi` can derive the OpenAPI document.

pub mod health;
pub mod jobs;
pub mod members;
