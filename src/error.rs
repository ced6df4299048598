use rocket::http::{ContentType, Status};
use rocket::response::{self, Responder};
use rocket::{Request, Response};
use rocket_okapi::OpenApiError;
use rocket_okapi::okapi::Map;
use rocket_okapi::okapi::openapi3::{MediaType, RefOr, Response as OpenApiResponse, Responses};
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::response::OpenApiResponderInner;
use serde::Serialize;
use std::io::Cursor;

use crate::fields::FieldCheckError;
use crate::ingest::IngestError;
use crate::jobs::JobIdParseError;
use crate::store::StoreError;

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    ServiceUnavailable(String),
    InternalError(String),
}

#[derive(Serialize, JsonSchema)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl ApiError {
    pub fn status(&self) -> Status {
        match self {
            ApiError::NotFound(_) => Status::NotFound,
            ApiError::BadRequest(_) => Status::BadRequest,
            ApiError::Conflict(_) => Status::Conflict,
            ApiError::ServiceUnavailable(_) => Status::ServiceUnavailable,
            ApiError::InternalError(_) => Status::InternalServerError,
        }
    }

    pub fn job_not_found() -> Self {
        ApiError::NotFound("job not found".to_string())
    }
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        let status = self.status();
        let (error_type, message) = match self {
            ApiError::NotFound(msg) => {
                log::debug!("not found: {}", msg);
                ("NotFound", msg)
            }
            ApiError::BadRequest(msg) => {
                log::debug!("bad request: {}", msg);
                ("BadRequest", msg)
            }
            ApiError::Conflict(msg) => {
                log::info!("conflict: {}", msg);
                ("Conflict", msg)
            }
            ApiError::ServiceUnavailable(msg) => {
                log::warn!("service unavailable: {}", msg);
                ("ServiceUnavailable", msg)
            }
            ApiError::InternalError(msg) => {
                log::error!("internal error: {}", msg);
                ("InternalError", msg)
            }
        };

        let error_response = ErrorResponse {
            error: error_type.to_string(),
            message,
        };

        let json = serde_json::to_string(&error_response)
            .unwrap_or_else(|_| r#"{"error":"SerializationError","message":"Failed to serialize error"}"#.to_string());

        Response::build()
            .status(status)
            .header(ContentType::JSON)
            .sized_body(json.len(), Cursor::new(json))
            .ok()
    }
}

impl OpenApiResponderInner for ApiError {
    fn responses(generator: &mut OpenApiGenerator) -> Result<Responses, OpenApiError> {
        let schema = generator.json_schema::<ErrorResponse>();
        let mut responses = Map::new();

        for (code, description) in [
            ("400", "Malformed request"),
            ("404", "Unknown or expired resource"),
            ("409", "Batch was cancelled"),
            ("500", "Internal failure"),
            ("503", "Member store unavailable"),
        ] {
            let mut content = Map::new();
            content.insert(
                "application/json".to_string(),
                MediaType {
                    schema: Some(schema.clone()),
                    ..Default::default()
                },
            );
            responses.insert(
                code.to_string(),
                RefOr::Object(OpenApiResponse {
                    description: description.to_string(),
                    content,
                    ..Default::default()
                }),
            );
        }

        Ok(Responses {
            responses,
            ..Default::default()
        })
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(_) => ApiError::ServiceUnavailable(err.to_string()),
            StoreError::Database(_) | StoreError::Corrupt(_) => {
                ApiError::InternalError(err.to_string())
            }
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::MalformedRequest(msg) => ApiError::BadRequest(msg),
            IngestError::StoreUnavailable(store) => ApiError::from(store),
            IngestError::Cancelled => ApiError::Conflict(err.to_string()),
            IngestError::WorkerStopped(_) | IngestError::DuplicateJob(_) => {
                ApiError::InternalError(err.to_string())
            }
        }
    }
}

impl From<FieldCheckError> for ApiError {
    fn from(err: FieldCheckError) -> Self {
        match err {
            FieldCheckError::MalformedRequest(msg) => ApiError::BadRequest(msg),
            FieldCheckError::NoFields | FieldCheckError::OverlappingField(_) => {
                ApiError::BadRequest(err.to_string())
            }
            FieldCheckError::Store(store) => ApiError::from(store),
        }
    }
}

/// A malformed job id can never name a live job.
impl From<JobIdParseError> for ApiError {
    fn from(_: JobIdParseError) -> Self {
        ApiError::job_not_found()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_the_failure_taxonomy_to_statuses() {
        let cases = [
            (
                ApiError::from(IngestError::MalformedRequest("x".into())),
                Status::BadRequest,
            ),
            (
                ApiError::from(IngestError::StoreUnavailable(StoreError::Unavailable("down".into()))),
                Status::ServiceUnavailable,
            ),
            (
                ApiError::from(IngestError::StoreUnavailable(StoreError::Corrupt("bad".into()))),
                Status::InternalServerError,
            ),
            (ApiError::from(IngestError::Cancelled), Status::Conflict),
            (
                ApiError::from(IngestError::WorkerStopped("gone".into())),
                Status::InternalServerError,
            ),
            (ApiError::from(FieldCheckError::NoFields), Status::BadRequest),
            (
                ApiError::from("nope".parse::<crate::jobs::JobId>().unwrap_err()),
                Status::NotFound,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(err.status(), status, "{err:?}");
        }
    }
}
