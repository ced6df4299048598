//! Polling and cancellation of background imports.

use rocket::serde::json::Json;
use rocket::{State, get, post};
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::openapi;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::ingest::ProgressSnapshot;
use crate::jobs::JobId;
use crate::models::DataResponse;
use crate::service::IngestService;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct CancelResponse {
    /// False when the job is unknown or already finished.
    pub cancelled: bool,
}

/// Latest progress of a background import.
///
/// Finished jobs are forgotten shortly after completion; an expired job and
/// one that never existed both answer 404.
#[openapi(tag = "Jobs")]
#[get("/jobs/<job_id>")]
pub fn get_job(
    job_id: &str,
    service: &State<IngestService>,
) -> Result<Json<DataResponse<ProgressSnapshot>>, ApiError> {
    let job_id: JobId = job_id.parse()?;
    service
        .poll_job(&job_id)
        .map(|snapshot| Json(DataResponse::new(snapshot)))
        .ok_or_else(ApiError::job_not_found)
}

/// Stop a background import before its next group.
#[openapi(tag = "Jobs")]
#[post("/jobs/<job_id>/cancel")]
pub fn cancel_job(
    job_id: &str,
    service: &State<IngestService>,
) -> Json<DataResponse<CancelResponse>> {
    let cancelled = job_id
        .parse::<JobId>()
        .map(|job_id| service.cancel_job(&job_id))
        .unwrap_or(false);
    Json(DataResponse::new(CancelResponse { cancelled }))
}
