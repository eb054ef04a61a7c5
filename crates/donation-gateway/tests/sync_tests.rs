//! Donation sync outcomes against mock CRM and marketing backends.
//!
//! The invariant under test: a completed donation is confirmed to the donor
//! unless every backend refuses our credentials outright.

use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use donation_gateway::auth::{
    ClientCredentialsSource, RefreshTokenSource, SystemClock, TokenCache,
};
use donation_gateway::client::{build_http_client, ApiClient};
use donation_gateway::config::Config;
use donation_gateway::models::{DonationRecord, Donor};
use donation_gateway::sync::{DonationSyncService, SyncOutcome};

fn sync_service(mock_server: &MockServer) -> DonationSyncService {
    let config = Config::for_testing(&mock_server.uri());
    let http = build_http_client(&config).unwrap();
    let clock = Arc::new(SystemClock);

    let crm_tokens = Arc::new(TokenCache::new(
        Arc::new(ClientCredentialsSource::new(http.clone(), config.crm.clone(), clock.clone())),
        config.safety_margin,
    ));
    let crm = ApiClient::new(http.clone(), config.crm.base_url.clone(), crm_tokens, &config);

    let marketing_tokens = Arc::new(TokenCache::new(
        Arc::new(RefreshTokenSource::new(http.clone(), config.marketing.clone(), clock)),
        config.safety_margin,
    ));
    let marketing =
        ApiClient::new(http, config.marketing.base_url.clone(), marketing_tokens, &config);

    DonationSyncService::new(crm, marketing)
}

fn sample_donation() -> DonationRecord {
    DonationRecord {
        donor: Donor {
            name: "Maria Silva".to_string(),
            email: "maria@example.org".to_string(),
            document: Some("123.456.789-00".to_string()),
            phone: Some("+55 11 91234-5678".to_string()),
            postal_code: Some("01310-100".to_string()),
        },
        amount_cents: 5000,
        currency: "BRL".to_string(),
        campaign: Some("winter-2026".to_string()),
        recurring: true,
    }
}

async fn mount_crm_token(mock_server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/crm/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "crm-token",
            "expires_in": 3600
        })))
        .mount(mock_server)
        .await;
}

async fn mount_marketing_token(mock_server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/marketing/auth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "mkt-token",
            "expires_in": 86400,
            "refresh_token": "rotated"
        })))
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn test_both_backends_accept_means_synced() {
    let mock_server = MockServer::start().await;
    mount_crm_token(&mock_server).await;
    mount_marketing_token(&mock_server).await;

    Mock::given(method("POST"))
        .and(path("/crm/contacts/upsert"))
        .and(body_partial_json(json!({"emailaddress1": "maria@example.org"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"contactid": "c-1"})))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/marketing/platform/events"))
        .and(body_partial_json(json!({
            "payload": {"conversion_identifier": "donation-recurring", "value": 50.0}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"event_uuid": "e-1"})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let outcome = sync_service(&mock_server).record_donation(&sample_donation()).await;

    assert_eq!(outcome, SyncOutcome::Synced);
}

#[tokio::test]
async fn test_crm_outage_degrades_to_warning() {
    let mock_server = MockServer::start().await;
    mount_crm_token(&mock_server).await;
    mount_marketing_token(&mock_server).await;

    // CRM down hard; retried then given up on
    Mock::given(method("POST"))
        .and(path("/crm/contacts/upsert"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/marketing/platform/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"event_uuid": "e-1"})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let outcome = sync_service(&mock_server).record_donation(&sample_donation()).await;

    assert!(outcome.is_confirmed());
    let warning = outcome.warning().unwrap();
    assert!(warning.contains("CRM"));
    assert!(!warning.contains("conversion"));
}

#[tokio::test]
async fn test_marketing_outage_degrades_to_warning() {
    let mock_server = MockServer::start().await;
    mount_crm_token(&mock_server).await;

    Mock::given(method("POST"))
        .and(path("/crm/contacts/upsert"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"contactid": "c-1"})))
        .mount(&mock_server)
        .await;

    // Marketing token endpoint refuses the refresh token
    Mock::given(method("POST"))
        .and(path("/marketing/auth/token"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid refresh token"))
        .mount(&mock_server)
        .await;

    let outcome = sync_service(&mock_server).record_donation(&sample_donation()).await;

    assert!(outcome.is_confirmed());
    assert!(outcome.warning().unwrap().contains("conversion"));
}

#[tokio::test]
async fn test_all_backends_rejecting_credentials_is_failed() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/crm/oauth2/token"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid secret"))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/marketing/auth/token"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid refresh token"))
        .mount(&mock_server)
        .await;

    let outcome = sync_service(&mock_server).record_donation(&sample_donation()).await;

    assert!(!outcome.is_confirmed());
    assert!(matches!(outcome, SyncOutcome::Failed(_)));
}

#[tokio::test]
async fn test_single_donation_uses_single_identifier() {
    let mock_server = MockServer::start().await;
    mount_crm_token(&mock_server).await;
    mount_marketing_token(&mock_server).await;

    Mock::given(method("POST"))
        .and(path("/crm/contacts/upsert"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/marketing/platform/events"))
        .and(body_partial_json(json!({
            "payload": {"conversion_identifier": "donation-single"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut donation = sample_donation();
    donation.recurring = false;

    let outcome = sync_service(&mock_server).record_donation(&donation).await;

    assert_eq!(outcome, SyncOutcome::Synced);
}
