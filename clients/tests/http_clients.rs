//! HTTP client behavior against mock oracle and catalog servers.

#![allow(clippy::unwrap_used)]

use serde_json::json;
use staysearch_clients::{ClientCredentials, CredentialCache, HttpAvailabilityOracle, HttpCatalogClient};
use staysearch_core::availability::{AvailabilityOracle, AvailabilityQuery, OracleError, StayDates};
use staysearch_core::catalog::{CatalogClient, CatalogError};
use staysearch_core::item::ItemId;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn credentials(server: &MockServer) -> ClientCredentials {
    ClientCredentials {
        token_url: format!("{}/v1/security/oauth2/token", server.uri()),
        client_id: "staysearch".to_string(),
        client_secret: "s3cret".to_string(),
    }
}

fn oracle(server: &MockServer, timeout: Duration) -> HttpAvailabilityOracle {
    HttpAvailabilityOracle::new(server.uri(), credentials(server), timeout).unwrap()
}

fn query(id: &str) -> AvailabilityQuery {
    let stay = StayDates::new("2026-05-01".parse().unwrap(), "2026-05-04".parse().unwrap()).unwrap();
    AvailabilityQuery::new(ItemId::new(id), stay, 2).unwrap()
}

async fn mount_token(server: &MockServer, expires_in: u64, times: u64) {
    Mock::given(method("POST"))
        .and(path("/v1/security/oauth2/token"))
        .and(body_string_contains("grant_type=client_credentials"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok-1",
            "token_type": "Bearer",
            "expires_in": expires_in
        })))
        .expect(times)
        .mount(server)
        .await;
}

#[tokio::test]
async fn quote_uses_cached_bearer_token_and_query_parameters() {
    let server = MockServer::start().await;
    mount_token(&server, 1799, 1).await;
    Mock::given(method("GET"))
        .and(path("/v3/availability/H1"))
        .and(header("authorization", "Bearer tok-1"))
        .and(query_param("checkin", "2026-05-01"))
        .and(query_param("checkout", "2026-05-04"))
        .and(query_param("guests", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "available": true, "price": 240.0, "currency": "EUR", "offers": 3 }
        })))
        .expect(2)
        .mount(&server)
        .await;

    let oracle = oracle(&server, Duration::from_secs(2));
    let first = oracle.quote(&query("H1")).await.unwrap();
    let second = oracle.quote(&query("H1")).await.unwrap();

    assert!(first.available);
    assert_eq!(first.offers, Some(3));
    assert_eq!(first.price, Some(240.0));
    assert_eq!(first, second);
}

#[tokio::test]
async fn token_inside_refresh_margin_is_renewed() {
    let server = MockServer::start().await;
    // Expires in one minute, which is inside the default five minute margin.
    mount_token(&server, 60, 2).await;
    Mock::given(method("GET"))
        .and(path("/v3/availability/H1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "available": false } })))
        .mount(&server)
        .await;

    let oracle = oracle(&server, Duration::from_secs(2));
    oracle.quote(&query("H1")).await.unwrap();
    oracle.quote(&query("H1")).await.unwrap();
}

#[tokio::test]
async fn short_margin_keeps_token() {
    let server = MockServer::start().await;
    mount_token(&server, 60, 1).await;
    Mock::given(method("GET"))
        .and(path("/v3/availability/H1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "available": false } })))
        .mount(&server)
        .await;

    let cache = CredentialCache::new(reqwest::Client::new(), credentials(&server))
        .with_refresh_margin(Duration::from_secs(1));
    let oracle = oracle(&server, Duration::from_secs(2)).with_credential_cache(cache);

    oracle.quote(&query("H1")).await.unwrap();
    oracle.quote(&query("H1")).await.unwrap();
}

#[tokio::test]
async fn unauthorized_lookup_drops_cached_token() {
    let server = MockServer::start().await;
    mount_token(&server, 1799, 2).await;
    Mock::given(method("GET"))
        .and(path("/v3/availability/H1"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token revoked"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v3/availability/H1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "available": true } })))
        .mount(&server)
        .await;

    let oracle = oracle(&server, Duration::from_secs(2));
    let err = oracle.quote(&query("H1")).await.unwrap_err();
    assert!(matches!(err, OracleError::Unauthorized(_)));

    assert!(oracle.quote(&query("H1")).await.unwrap().available);
}

#[tokio::test]
async fn rejected_client_credentials_fail_readiness() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/security/oauth2/token"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid_client"))
        .mount(&server)
        .await;

    let oracle = oracle(&server, Duration::from_secs(2));
    let err = oracle.ensure_ready().await.unwrap_err();

    assert!(matches!(err, OracleError::Unauthorized(_)));
    assert!(err.is_credential_failure());
}

#[tokio::test]
async fn server_error_and_malformed_body_are_reported() {
    let server = MockServer::start().await;
    mount_token(&server, 1799, 1).await;
    Mock::given(method("GET"))
        .and(path("/v3/availability/H5"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v3/availability/H6"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let oracle = oracle(&server, Duration::from_secs(2));

    assert!(matches!(
        oracle.quote(&query("H5")).await,
        Err(OracleError::Status { status: 503, .. })
    ));
    assert!(matches!(oracle.quote(&query("H6")).await, Err(OracleError::Malformed(_))));
}

#[tokio::test]
async fn slow_oracle_times_out() {
    let server = MockServer::start().await;
    mount_token(&server, 1799, 1).await;
    Mock::given(method("GET"))
        .and(path("/v3/availability/H2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "data": { "available": true } }))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let oracle = oracle(&server, Duration::from_millis(200));
    oracle.ensure_ready().await.unwrap();

    assert!(matches!(oracle.quote(&query("H2")).await, Err(OracleError::Timeout)));
}

#[tokio::test]
async fn catalog_accepts_wrapped_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/hotels/H1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "id": "H1",
                "name": "Alpha",
                "city": "Bariloche",
                "amenities": ["spa"],
                "rating": 4.5,
                "price_range": { "min_price": 80.0, "max_price": 150.0, "currency": "ARS" }
            }
        })))
        .mount(&server)
        .await;

    let client = HttpCatalogClient::new(server.uri(), Duration::from_secs(2)).unwrap();
    let snapshot = client.fetch(&ItemId::new("H1")).await.unwrap();

    assert_eq!(snapshot.name, "Alpha");
    assert_eq!(snapshot.region, "Bariloche");
    assert!(snapshot.validate(&ItemId::new("H1")).is_ok());
}

#[tokio::test]
async fn catalog_maps_status_codes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/hotels/H404"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/hotels/H503"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/hotels/Hbad"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "rating": "high" })))
        .mount(&server)
        .await;

    let client = HttpCatalogClient::new(server.uri(), Duration::from_secs(2)).unwrap();

    let not_found = client.fetch(&ItemId::new("H404")).await.unwrap_err();
    assert!(matches!(not_found, CatalogError::NotFound(_)));
    assert!(!not_found.is_transient());

    let unavailable = client.fetch(&ItemId::new("H503")).await.unwrap_err();
    assert!(unavailable.is_transient());

    assert!(matches!(
        client.fetch(&ItemId::new("Hbad")).await,
        Err(CatalogError::Malformed(_))
    ));
}

#[tokio::test]
async fn catalog_unreachable_is_transport_error() {
    let client = HttpCatalogClient::new("http://127.0.0.1:1", Duration::from_millis(200)).unwrap();
    let err = client.fetch(&ItemId::new("H1")).await.unwrap_err();
    assert!(matches!(err, CatalogError::Transport(_)));
    assert!(err.is_transient());
}
