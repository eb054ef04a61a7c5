//! Postal-code lookup tests against a mock address service.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use donation_gateway::client::build_http_client;
use donation_gateway::config::Config;
use donation_gateway::error::PostalError;
use donation_gateway::postal::PostalClient;

fn postal_client(mock_server: &MockServer) -> PostalClient {
    let config = Config::for_testing(&mock_server.uri());
    let http = build_http_client(&config).unwrap();
    PostalClient::new(http, &config)
}

fn sample_address_json() -> serde_json::Value {
    json!({
        "cep": "01310-100",
        "logradouro": "Avenida Paulista",
        "complemento": "de 612 a 1510 - lado par",
        "bairro": "Bela Vista",
        "localidade": "Sao Paulo",
        "uf": "SP"
    })
}

#[tokio::test]
async fn test_lookup_maps_address_fields() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ws/01310100/json/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(sample_address_json()))
        .mount(&mock_server)
        .await;

    let client = postal_client(&mock_server);
    let address = client.lookup("01310-100").await.unwrap();

    assert_eq!(address.street, "Avenida Paulista");
    assert_eq!(address.city, "Sao Paulo");
    assert_eq!(address.state, "SP");
}

#[tokio::test]
async fn test_lookup_erro_flag_means_not_found() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ws/99999999/json/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"erro": true})))
        .mount(&mock_server)
        .await;

    let client = postal_client(&mock_server);
    let err = client.lookup("99999-999").await.unwrap_err();

    assert!(matches!(err, PostalError::NotFound(_)));
}

#[tokio::test]
async fn test_invalid_code_never_reaches_the_service() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let client = postal_client(&mock_server);

    assert!(matches!(client.lookup("1234").await.unwrap_err(), PostalError::InvalidCode(_)));
    assert!(matches!(client.lookup("abc").await.unwrap_err(), PostalError::InvalidCode(_)));
}

#[tokio::test]
async fn test_upstream_failure_is_classified() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ws/01310100/json/"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let client = postal_client(&mock_server);
    let err = client.lookup("01310100").await.unwrap_err();

    assert!(matches!(err, PostalError::Upstream { status: 500 }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_repeated_lookup_is_served_from_cache() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ws/01310100/json/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(sample_address_json()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut config = Config::for_testing(&mock_server.uri());
    config.postal_cache_ttl = Duration::from_secs(60);
    config.postal_cache_max_size = 100;
    let http = build_http_client(&config).unwrap();
    let client = PostalClient::new(http, &config);

    let first = client.lookup("01310-100").await.unwrap();
    // Separator placement must not defeat the cache key
    let second = client.lookup("01310100").await.unwrap();

    assert_eq!(first, second);
}
