//! HTTP client behaviour against a mocked campaigns service.

use std::time::Duration;

use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use campaignctl::api::{ApiError, CampaignApi, HttpCampaignApi};
use campaignctl::session::Role;
use campaignctl::types::{CampaignQuery, CampaignStatus};
use campaignctl::workflow::ActionKind;

const TOKEN: &str = "test-token";
const TIMEOUT: Duration = Duration::from_secs(5);

fn campaign_json(id: Uuid, status: &str) -> serde_json::Value {
    json!({
        "id": id,
        "location": "0b5f8a0e-0c8e-4a55-8f0e-5d4f3a2b1c01",
        "template": "1c6a9b1f-1d9f-4b66-9a1f-6e5a4b3c2d02",
        "status": status,
        "approval_history": [],
        "created_at": "2025-05-01T09:00:00Z",
        "updated_at": "2025-05-01T10:00:00Z"
    })
}

async fn signed_in(server: &MockServer) -> HttpCampaignApi {
    Mock::given(method("GET"))
        .and(path("/api/v1/auth/me/"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 2,
            "username": "bm",
            "email": "bm@example.com",
            "role": "brand_manager",
            "brands": [7]
        })))
        .mount(server)
        .await;

    let base_url = format!("{}/api/v1", server.uri());
    let session = HttpCampaignApi::sign_in(&base_url, TIMEOUT, TOKEN)
        .await
        .unwrap();
    HttpCampaignApi::new(&base_url, TIMEOUT, session).unwrap()
}

#[tokio::test]
async fn test_sign_in_resolves_user() {
    let server = MockServer::start().await;
    let api = signed_in(&server).await;

    let user = api.session().user();
    assert_eq!(user.username, "bm");
    assert_eq!(user.role, Role::BrandManager);
    assert_eq!(user.brands, vec!["7".to_string()]);
    assert_eq!(api.session().access_token(), TOKEN);
}

#[tokio::test]
async fn test_sign_in_rejected_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/auth/me/"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"detail": "Invalid token."})),
        )
        .mount(&server)
        .await;

    let err = HttpCampaignApi::sign_in(&format!("{}/api/v1", server.uri()), TIMEOUT, "stale")
        .await
        .unwrap_err();
    assert!(err.is_auth_error());
}

#[tokio::test]
async fn test_transition_parses_envelope() {
    let server = MockServer::start().await;
    let api = signed_in(&server).await;
    let id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path(format!("/api/v1/campaigns/{id}/approve/")))
        .and(header("authorization", "Bearer test-token"))
        .and(body_json(json!({"comments": "Looks good"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "approved",
            "campaign": campaign_json(id, "approved")
        })))
        .expect(1)
        .mount(&server)
        .await;

    let campaign = api
        .transition(id, ActionKind::Approve, Some("Looks good"))
        .await
        .unwrap();
    assert_eq!(campaign.id, id);
    assert_eq!(campaign.status, CampaignStatus::Approved);
}

#[tokio::test]
async fn test_schedule_sends_empty_body() {
    let server = MockServer::start().await;
    let api = signed_in(&server).await;
    let id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path(format!("/api/v1/campaigns/{id}/schedule/")))
        .and(body_json(json!({})))
        .respond_with(ResponseTemplate::new(200).set_body_json(campaign_json(id, "scheduled")))
        .expect(1)
        .mount(&server)
        .await;

    let campaign = api
        .transition(id, ActionKind::Schedule, Some("ignored"))
        .await
        .unwrap();
    assert_eq!(campaign.status, CampaignStatus::Scheduled);
}

#[tokio::test]
async fn test_refusal_carries_server_message() {
    let server = MockServer::start().await;
    let api = signed_in(&server).await;
    let id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path(format!("/api/v1/campaigns/{id}/reject/")))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "Cannot reject campaign with status approved"
        })))
        .mount(&server)
        .await;

    let err = api
        .transition(id, ActionKind::Reject, Some("Too late"))
        .await
        .unwrap_err();
    assert!(err.is_status_refusal());
    match err {
        ApiError::BadRequest { message, .. } => {
            assert_eq!(message, "Cannot reject campaign with status approved");
        }
        other => panic!("Expected BadRequest, got {other:?}"),
    }
}

#[tokio::test]
async fn test_list_sends_filters() {
    let server = MockServer::start().await;
    let api = signed_in(&server).await;
    let id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/api/v1/campaigns/"))
        .and(query_param("status", "pending_review"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 1,
            "next": null,
            "previous": null,
            "results": [{
                "id": id,
                "location": "0b5f8a0e-0c8e-4a55-8f0e-5d4f3a2b1c01",
                "template": "1c6a9b1f-1d9f-4b66-9a1f-6e5a4b3c2d02",
                "status": "pending_review",
                "created_at": "2025-05-01T09:00:00Z"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let page = api
        .list_campaigns(&CampaignQuery::approval_queue())
        .await
        .unwrap();
    assert_eq!(page.count, 1);
    assert_eq!(page.results[0].id, id);
    assert_eq!(page.results[0].status, CampaignStatus::PendingReview);
}

#[tokio::test]
async fn test_missing_campaign_maps_to_not_found() {
    let server = MockServer::start().await;
    let api = signed_in(&server).await;
    let id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path(format!("/api/v1/campaigns/{id}/")))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Not found."})))
        .mount(&server)
        .await;

    let err = api.fetch_campaign(id).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_malformed_body_is_decode_error() {
    let server = MockServer::start().await;
    let api = signed_in(&server).await;
    let id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path(format!("/api/v1/campaigns/{id}/")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "not-a-uuid"})))
        .mount(&server)
        .await;

    let err = api.fetch_campaign(id).await.unwrap_err();
    assert!(matches!(err, ApiError::DecodeError { .. }));
}
