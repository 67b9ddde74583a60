//! End-to-end tests: the real server on an ephemeral port, talking to a mock
//! identity service that checks the request signature the way the real one does.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use commtoken::config::{ConnectionString, CONNECTION_STRING_VAR};
use commtoken::identity::{CLIENT_PRINCIPAL_HEADER, REQUEST_ID_HEADER};
use commtoken::issuer::AcsIdentityClient;
use commtoken::server::{self, AppState, TOKEN_ROUTE};

const KEY: &[u8] = b"mock-access-key";

#[derive(Clone, Default)]
struct MockAcs {
    bodies: Arc<Mutex<Vec<serde_json::Value>>>,
}

fn b64(bytes: impl AsRef<[u8]>) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers.get(name).and_then(|v| v.to_str().ok()).unwrap_or("")
}

async fn mock_identities(
    State(mock): State<MockAcs>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if query.get("api-version").map(String::as_str) != Some("2023-10-01") {
        return (StatusCode::BAD_REQUEST, "unsupported api-version").into_response();
    }
    let hash = b64(Sha256::digest(&body));
    if header(&headers, "x-ms-content-sha256") != hash {
        return (StatusCode::UNAUTHORIZED, "content hash mismatch").into_response();
    }
    let string_to_sign = format!(
        "POST\n/identities?api-version=2023-10-01\n{};{};{}",
        header(&headers, "x-ms-date"),
        header(&headers, "host"),
        hash
    );
    let mut mac = Hmac::<Sha256>::new_from_slice(KEY).unwrap();
    mac.update(string_to_sign.as_bytes());
    let expected = format!(
        "HMAC-SHA256 SignedHeaders=x-ms-date;host;x-ms-content-sha256&Signature={}",
        b64(mac.finalize().into_bytes())
    );
    if header(&headers, "authorization") != expected {
        return (StatusCode::UNAUTHORIZED, Json(serde_json::json!({"error":{"code":"Denied","message":"Denied by the resource provider."}}))).into_response();
    }

    let doc: serde_json::Value = serde_json::from_slice(&body).unwrap_or_default();
    mock.bodies.lock().unwrap().push(doc);
    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "identity": {"id": "8:acs:00000000-0000-0000-0000-000000000001_00000001"},
            "accessToken": {"token": "eyJhbGciOi.mock", "expiresOn": "2030-01-02T03:04:05.1234567+00:00"}
        })),
    )
        .into_response()
}

async fn start_mock_acs() -> (MockAcs, JoinHandle<()>, String) {
    let mock = MockAcs::default();
    let app = Router::new().route("/identities", post(mock_identities)).with_state(mock.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock");
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (mock, handle, format!("http://{addr}/"))
}

async fn start_commtoken(endpoint: &str, key: &[u8]) -> (JoinHandle<()>, String) {
    let conn = ConnectionString::parse(&format!("endpoint={endpoint};accesskey={}", b64(key))).expect("connection string");
    let issuer = AcsIdentityClient::new(&conn, Duration::from_secs(5)).expect("client");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind server");
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        if let Err(e) = server::serve(listener, AppState::new(Arc::new(issuer)), std::future::pending()).await {
            eprintln!("server task error: {e:?}");
        }
    });
    (handle, format!("http://{addr}"))
}

fn principal(roles: &[&str]) -> String {
    b64(serde_json::json!({
        "identityProvider": "aad",
        "userId": "u1",
        "userDetails": "Alice",
        "userRoles": roles,
    })
    .to_string())
}

#[tokio::test]
async fn request_without_principal_is_401_with_empty_body() {
    let (mock, mock_handle, endpoint) = start_mock_acs().await;
    let (handle, base) = start_commtoken(&endpoint, KEY).await;

    let resp = reqwest::get(format!("{base}{TOKEN_ROUTE}")).await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);
    assert!(resp.headers().contains_key(REQUEST_ID_HEADER));
    assert!(resp.bytes().await.unwrap().is_empty());
    assert!(mock.bodies.lock().unwrap().is_empty());

    handle.abort();
    mock_handle.abort();
}

#[tokio::test]
async fn authenticated_principal_gets_token_from_identity_service() {
    let (mock, mock_handle, endpoint) = start_mock_acs().await;
    let (handle, base) = start_commtoken(&endpoint, KEY).await;

    let resp = reqwest::Client::new()
        .get(format!("{base}{TOKEN_ROUTE}"))
        .header(CLIENT_PRINCIPAL_HEADER, principal(&["anonymous", "authenticated"]))
        .header(REQUEST_ID_HEADER, "e2e-1")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert_eq!(resp.headers()[REQUEST_ID_HEADER], "e2e-1");
    let v: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(v["user"]["id"], "8:acs:00000000-0000-0000-0000-000000000001_00000001");
    assert_eq!(v["accessToken"]["token"], "eyJhbGciOi.mock");
    assert!(v["accessToken"]["expiresOn"].as_str().unwrap().starts_with("2030-01-02T03:04:05"));

    let bodies = mock.bodies.lock().unwrap().clone();
    assert_eq!(bodies, vec![serde_json::json!({"createTokenWithScopes": ["chat", "voip"]})]);

    handle.abort();
    mock_handle.abort();
}

#[tokio::test]
async fn principal_without_authenticated_role_never_reaches_identity_service() {
    let (mock, mock_handle, endpoint) = start_mock_acs().await;
    let (handle, base) = start_commtoken(&endpoint, KEY).await;

    let resp = reqwest::Client::new()
        .get(format!("{base}{TOKEN_ROUTE}"))
        .header(CLIENT_PRINCIPAL_HEADER, principal(&["anonymous"]))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);
    assert!(mock.bodies.lock().unwrap().is_empty());

    handle.abort();
    mock_handle.abort();
}

#[tokio::test]
async fn malformed_principal_is_400() {
    let (_mock, mock_handle, endpoint) = start_mock_acs().await;
    let (handle, base) = start_commtoken(&endpoint, KEY).await;

    let resp = reqwest::Client::new()
        .get(format!("{base}{TOKEN_ROUTE}"))
        .header(CLIENT_PRINCIPAL_HEADER, "this is not base64")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    let v: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(v["code"], "malformed_client_principal");

    handle.abort();
    mock_handle.abort();
}

#[tokio::test]
async fn rejected_signature_surfaces_as_bad_gateway() {
    let (mock, mock_handle, endpoint) = start_mock_acs().await;
    let (handle, base) = start_commtoken(&endpoint, b"some-other-key").await;

    let resp = reqwest::Client::new()
        .get(format!("{base}{TOKEN_ROUTE}"))
        .header(CLIENT_PRINCIPAL_HEADER, principal(&["authenticated"]))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_GATEWAY);
    let v: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(v["code"], "issuer_rejected");
    assert!(mock.bodies.lock().unwrap().is_empty());

    handle.abort();
    mock_handle.abort();
}

#[tokio::test]
async fn liveness_route_answers() {
    let (_mock, mock_handle, endpoint) = start_mock_acs().await;
    let (handle, base) = start_commtoken(&endpoint, KEY).await;

    let resp = reqwest::get(format!("{base}/")).await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "commtoken ok");

    handle.abort();
    mock_handle.abort();
}

#[test]
fn connection_string_variable_name_matches_hosting_convention() {
    assert_eq!(CONNECTION_STRING_VAR, "COMMUNICATION_SERVICES_CONNECTION_STRING");
}
