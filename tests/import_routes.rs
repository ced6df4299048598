use member_ingest::fields::FieldReport;
use member_ingest::ingest::ProgressSnapshot;
use member_ingest::models::DataResponse;
use member_ingest::routes::jobs::{CancelResponse, cancel_job, get_job};
use member_ingest::routes::members::{
    ImportJobResponse, check_grouping_fields, import_members, import_members_async,
};
use member_ingest::store::{InMemoryMemberStore, MemberStore};
use member_ingest::test_support::{TestRocketBuilder, test_service};
use rocket::http::{ContentType, Status};
use rocket::local::asynchronous::Client;
use rocket::routes;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

async fn client_with(store: Arc<InMemoryMemberStore>) -> Client {
    let store: Arc<dyn MemberStore> = store;
    TestRocketBuilder::new()
        .manage_service(test_service(store))
        .mount_api_routes(routes![
            import_members,
            import_members_async,
            check_grouping_fields,
            get_job,
            cancel_job
        ])
        .async_client()
        .await
}

fn mixed_batch() -> serde_json::Value {
    json!({
        "members": [
            { "name": "Ada", "email": "ada@example.org", "password": "analytical" },
            { "name": "Bad Email", "email": "not-an-email" },
            { "name": "Bad Phone", "phone": "call me maybe" },
            { "name": "Grace", "phone": "+44 20 7946 0958", "groupings": ["board"] },
            { "name": "Bad Date", "email": "date@example.org", "birthDate": "2001-13-45" }
        ]
    })
}

#[tokio::test]
async fn synchronous_import_reports_failures_in_order() {
    let store = Arc::new(InMemoryMemberStore::new());
    let client = client_with(Arc::clone(&store)).await;

    let response = client
        .post("/api/v1/orgs/acme/members/import")
        .header(ContentType::JSON)
        .body(mixed_batch().to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);

    let payload: DataResponse<ProgressSnapshot> =
        response.into_json().await.expect("snapshot payload");
    let snapshot = payload.data;
    assert_eq!(snapshot.total, 5);
    assert_eq!(snapshot.added, 2);
    assert_eq!(snapshot.progress, 100);
    assert_eq!(snapshot.errors.len(), 3);
    assert!(snapshot.errors[0].starts_with("record 1: "));
    assert!(snapshot.errors[1].starts_with("record 2: "));
    assert!(snapshot.errors[2].starts_with("record 4: "));
    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn empty_import_completes_immediately() {
    let client = client_with(Arc::new(InMemoryMemberStore::new())).await;

    let response = client
        .post("/api/v1/orgs/acme/members/import")
        .header(ContentType::JSON)
        .body(json!({ "members": [] }).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);

    let payload: DataResponse<ProgressSnapshot> = response.into_json().await.unwrap();
    assert_eq!(payload.data, ProgressSnapshot {
        total: 0,
        added: 0,
        progress: 100,
        errors: Vec::new(),
    });
}

#[tokio::test]
async fn unavailable_store_fails_synchronous_imports() {
    let store = Arc::new(InMemoryMemberStore::new());
    store.set_available(false);
    let client = client_with(Arc::clone(&store)).await;

    let response = client
        .post("/api/v1/orgs/acme/members/import")
        .header(ContentType::JSON)
        .body(mixed_batch().to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::ServiceUnavailable);

    let body: serde_json::Value = response.into_json().await.unwrap();
    assert_eq!(body["error"], "ServiceUnavailable");
}

#[tokio::test]
async fn async_import_is_pollable_until_complete() {
    let client = client_with(Arc::new(InMemoryMemberStore::new())).await;

    let response = client
        .post("/api/v1/orgs/acme/members/import/async")
        .header(ContentType::JSON)
        .body(mixed_batch().to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let job: DataResponse<ImportJobResponse> = response.into_json().await.unwrap();
    let url = format!("/api/v1/jobs/{}", job.data.job_id);
    assert_eq!(job.data.job_id.to_string().len(), 32);

    let mut last_progress = 0;
    let mut finished = None;
    for _ in 0..200 {
        let response = client.get(url.as_str()).dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let payload: DataResponse<ProgressSnapshot> = response.into_json().await.unwrap();
        assert!(payload.data.progress >= last_progress);
        last_progress = payload.data.progress;
        if payload.data.is_complete() {
            finished = Some(payload.data);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let finished = finished.expect("job completes");
    assert_eq!(finished.added, 2);
    assert_eq!(finished.errors.len(), 3);
}

#[tokio::test]
async fn unknown_and_malformed_job_ids_are_not_found() {
    let client = client_with(Arc::new(InMemoryMemberStore::new())).await;

    let unknown = client
        .get(format!("/api/v1/jobs/{}", "0".repeat(32)))
        .dispatch()
        .await;
    assert_eq!(unknown.status(), Status::NotFound);

    let malformed = client.get("/api/v1/jobs/not-a-job").dispatch().await;
    assert_eq!(malformed.status(), Status::NotFound);

    let cancel = client
        .post(format!("/api/v1/jobs/{}/cancel", "0".repeat(32)))
        .dispatch()
        .await;
    assert_eq!(cancel.status(), Status::Ok);
    let payload: DataResponse<CancelResponse> = cancel.into_json().await.unwrap();
    assert!(!payload.data.cancelled);
}

#[tokio::test]
async fn field_check_rejects_empty_field_lists_and_finds_duplicates() {
    let store = Arc::new(InMemoryMemberStore::new());
    let client = client_with(Arc::clone(&store)).await;

    let batch = json!({
        "members": [
            { "id": "6f1d4c9e-4b8a-4f5e-9a51-0d3c2f1e0a01", "name": "Ada", "email": "a@example.org",
              "nationalId": "X1", "groupings": ["voters"] },
            { "id": "6f1d4c9e-4b8a-4f5e-9a51-0d3c2f1e0a02", "name": "Ada", "email": "b@example.org",
              "nationalId": "X1", "groupings": ["voters"] },
            { "id": "6f1d4c9e-4b8a-4f5e-9a51-0d3c2f1e0a03", "name": "Alan", "email": "c@example.org",
              "groupings": ["voters"] }
        ]
    });
    let response = client
        .post("/api/v1/orgs/acme/members/import")
        .header(ContentType::JSON)
        .body(batch.to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);

    let ids = [
        "6f1d4c9e-4b8a-4f5e-9a51-0d3c2f1e0a01",
        "6f1d4c9e-4b8a-4f5e-9a51-0d3c2f1e0a02",
        "6f1d4c9e-4b8a-4f5e-9a51-0d3c2f1e0a03",
    ];

    let rejected = client
        .post("/api/v1/orgs/acme/groupings/voters/fields/check")
        .header(ContentType::JSON)
        .body(json!({ "memberIds": ids, "authFields": [], "twoFactorFields": [] }).to_string())
        .dispatch()
        .await;
    assert_eq!(rejected.status(), Status::BadRequest);

    let response = client
        .post("/api/v1/orgs/acme/groupings/voters/fields/check")
        .header(ContentType::JSON)
        .body(
            json!({
                "memberIds": ids,
                "authFields": ["name", "national_id"],
                "twoFactorFields": ["phone"]
            })
            .to_string(),
        )
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);

    let report: DataResponse<FieldReport> = response.into_json().await.unwrap();
    let report = report.data;
    assert_eq!(report.duplicates.len(), 1);
    assert_eq!(
        report.duplicates[0]
            .member_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>(),
        ids[..2].to_vec()
    );
    assert_eq!(report.missing_data.len(), 3);
    assert!(report.unknown_members.is_empty());
}
