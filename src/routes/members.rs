//! Member import and grouping field-check endpoints.

use rocket::serde::json::Json;
use rocket::{State, post};
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::openapi;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::fields::FieldReport;
use crate::ingest::ProgressSnapshot;
use crate::jobs::JobId;
use crate::models::{BatchItem, DataResponse, MemberField};
use crate::service::IngestService;

/// Batch of member records to add to an organization.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ImportRequest {
    pub members: Vec<BatchItem>,
}

/// Handle of an import running in the background.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImportJobResponse {
    /// Poll `GET /jobs/<jobId>` with this value.
    pub job_id: JobId,
}

/// Field combination to check against a grouping.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FieldCheckRequest {
    #[serde(default)]
    pub member_ids: Vec<Uuid>,
    #[serde(default)]
    pub auth_fields: Vec<MemberField>,
    #[serde(default)]
    pub two_factor_fields: Vec<MemberField>,
}

/// Import members and wait for the batch to finish.
///
/// Records that fail validation or conflict with existing members are
/// listed in `errors`; the request only fails when the member store does.
#[openapi(tag = "Members")]
#[post("/orgs/<org>/members/import", data = "<request>")]
pub async fn import_members(
    org: &str,
    request: Json<ImportRequest>,
    service: &State<IngestService>,
) -> Result<Json<DataResponse<ProgressSnapshot>>, ApiError> {
    let snapshot = service.run_batch(org, request.into_inner().members).await?;
    Ok(Json(DataResponse::new(snapshot)))
}

/// Start a background import and return its job id immediately.
#[openapi(tag = "Members")]
#[post("/orgs/<org>/members/import/async", data = "<request>")]
pub fn import_members_async(
    org: &str,
    request: Json<ImportRequest>,
    service: &State<IngestService>,
) -> Result<Json<DataResponse<ImportJobResponse>>, ApiError> {
    let job_id = service.submit_batch_async(org, request.into_inner().members)?;
    Ok(Json(DataResponse::new(ImportJobResponse { job_id })))
}

/// Report duplicate and missing values for a field combination over the
/// members of a grouping.
#[openapi(tag = "Members")]
#[post("/orgs/<org>/groupings/<grouping>/fields/check", data = "<request>")]
pub async fn check_grouping_fields(
    org: &str,
    grouping: &str,
    request: Json<FieldCheckRequest>,
    service: &State<IngestService>,
) -> Result<Json<DataResponse<FieldReport>>, ApiError> {
    let request = request.into_inner();
    let report = service
        .check_fields(
            org,
            grouping,
            &request.member_ids,
            &request.auth_fields,
            &request.two_factor_fields,
        )
        .await?;
    Ok(Json(DataResponse::new(report)))
}
