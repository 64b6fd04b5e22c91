use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::{Value, json};

use guidelight::{Client, Config, Payload, connect_with};

// ── Fake Endeavor server ──────────────────────────────────────────

struct Mock {
    /// Access token handed out by /v1/authenticate.
    access: String,
    refresh: String,
    /// Access token handed out by /v1/reauthenticate.
    reauth_access: String,
    authenticate_calls: AtomicUsize,
    reauthenticate_calls: AtomicUsize,
    status_calls: AtomicUsize,
    /// Body served by /v1/status; `None` answers 204.
    status_body: Mutex<Option<Value>>,
    revoked: AtomicBool,
}

impl Mock {
    fn new(access: impl Into<String>, refresh: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            access: access.into(),
            refresh: refresh.into(),
            reauth_access: "reissued".to_string(),
            authenticate_calls: AtomicUsize::new(0),
            reauthenticate_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            status_body: Mutex::new(Some(
                json!({"status": "ok", "version": "1.0.0", "region": "test"}),
            )),
            revoked: AtomicBool::new(false),
        })
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        if self.revoked.load(Ordering::SeqCst) {
            return false;
        }
        let bearer = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        bearer == Some(self.access.as_str()) || bearer == Some(self.reauth_access.as_str())
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": "invalid or expired token"})),
    )
        .into_response()
}

async fn authenticate(State(mock): State<Arc<Mock>>, Json(body): Json<Value>) -> Response {
    mock.authenticate_calls.fetch_add(1, Ordering::SeqCst);
    if body["client_id"] != "id" || body["client_secret"] != "secret" {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "invalid api key"})),
        )
            .into_response();
    }
    Json(json!({"access_token": mock.access, "refresh_token": mock.refresh})).into_response()
}

async fn reauthenticate(State(mock): State<Arc<Mock>>, Json(body): Json<Value>) -> Response {
    mock.reauthenticate_calls.fetch_add(1, Ordering::SeqCst);
    if body["refresh_token"] != mock.refresh.as_str() {
        return unauthorized();
    }
    Json(json!({"access_token": mock.reauth_access, "refresh_token": mock.refresh}))
        .into_response()
}

async fn status(State(mock): State<Arc<Mock>>, headers: HeaderMap) -> Response {
    mock.status_calls.fetch_add(1, Ordering::SeqCst);
    if !mock.authorized(&headers) {
        return unauthorized();
    }
    match mock.status_body.lock().unwrap().clone() {
        Some(body) => Json(body).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn auth_required(State(mock): State<Arc<Mock>>, headers: HeaderMap) -> Response {
    if !mock.authorized(&headers) {
        return unauthorized();
    }
    Json(json!([])).into_response()
}

async fn echo_query(
    State(mock): State<Arc<Mock>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if !mock.authorized(&headers) {
        return unauthorized();
    }
    Json(query).into_response()
}

async fn create_agent(State(mock): State<Arc<Mock>>, headers: HeaderMap) -> Response {
    if !mock.authorized(&headers) {
        return unauthorized();
    }
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "error": "invalid agent",
            "errors": [{"field": "name", "error": "this field is required"}]
        })),
    )
        .into_response()
}

async fn delete_agent(State(mock): State<Arc<Mock>>, headers: HeaderMap) -> Response {
    if !mock.authorized(&headers) {
        return unauthorized();
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn missing() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"error": "resource not found"})),
    )
        .into_response()
}

async fn boom() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "database on fire").into_response()
}

async fn plain_text() -> Response {
    ([(header::CONTENT_TYPE, "text/plain")], "pong").into_response()
}

async fn garbled_json() -> Response {
    ([(header::CONTENT_TYPE, "application/json")], "{not json").into_response()
}

async fn spawn_server(mock: Arc<Mock>) -> String {
    let app = Router::new()
        .route("/v1/authenticate", post(authenticate))
        .route("/v1/reauthenticate", post(reauthenticate))
        .route("/v1/status", get(status))
        .route("/v1/authrequired", post(auth_required))
        .route("/v1/echo", get(echo_query))
        .route("/v1/agents", post(create_agent))
        .route("/v1/agents/1", delete(delete_agent))
        .route("/v1/missing", get(missing))
        .route("/v1/boom", get(boom))
        .route("/v1/ping", get(plain_text))
        .route("/v1/garbled", get(garbled_json))
        .with_state(mock);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// An address nothing is listening on.
fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

fn jwt(exp: u64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(json!({"sub": "id", "exp": exp}).to_string());
    format!("{header}.{payload}.sig")
}

async fn setup() -> (Arc<Mock>, String) {
    let mock = Mock::new("access", "refresh");
    let url = spawn_server(mock.clone()).await;
    (mock, url)
}

// ── connect ───────────────────────────────────────────────────────

#[tokio::test]
async fn connect_then_status() {
    let (mock, url) = setup().await;

    let client = connect_with(Config::new(&url, "id", "secret")).await.unwrap();
    assert!(client.is_authenticated());
    assert_eq!(mock.authenticate_calls.load(Ordering::SeqCst), 1);

    let status = client.status().await.unwrap();
    assert_eq!(status.status.as_deref(), Some("ok"));
    assert_eq!(status.version.as_deref(), Some("1.0.0"));
    assert_eq!(status.extra["region"], "test");
}

#[tokio::test]
async fn connect_with_rejected_credentials_is_authentication_error() {
    let (_mock, url) = setup().await;

    let err = connect_with(Config::new(&url, "id", "wrong")).await.unwrap_err();
    assert!(err.is_authentication(), "{err}");
    assert!(err.to_string().contains("invalid api key"));
}

#[tokio::test]
async fn connect_with_empty_secret_makes_no_request() {
    let (mock, url) = setup().await;

    let err = connect_with(Config::new(&url, "id", "")).await.unwrap_err();
    assert!(err.is_configuration());
    assert_eq!(mock.authenticate_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn connect_to_unreachable_server_is_connection_error() {
    let err = connect_with(Config::new(closed_port_url(), "id", "secret"))
        .await
        .unwrap_err();
    assert!(err.is_connection(), "{err}");
}

#[tokio::test]
async fn connect_retries_do_not_mask_connection_error() {
    let config = Config::new(closed_port_url(), "id", "secret").with_max_retries(2);
    let err = connect_with(config).await.unwrap_err();
    assert!(err.is_connection(), "{err}");
}

// ── status ────────────────────────────────────────────────────────

#[tokio::test]
async fn status_on_unreachable_server_is_connection_error() {
    let client = Client::new(Config::new(closed_port_url(), "id", "secret")).unwrap();
    let err = client.status().await.unwrap_err();
    assert!(err.is_connection(), "{err}");
    assert!(!err.is_configuration());
}

#[tokio::test]
async fn status_accepts_any_reply_shape() {
    let (mock, url) = setup().await;
    let client = connect_with(Config::new(&url, "id", "secret")).await.unwrap();

    *mock.status_body.lock().unwrap() = Some(json!({"status": "ok", "uptime": 12345}));
    let status = client.status().await.unwrap();
    assert_eq!(status.status.as_deref(), Some("ok"));
    assert_eq!(status.uptime, Some(json!(12345)));

    *mock.status_body.lock().unwrap() = Some(json!({"state": "healthy"}));
    let status = client.status().await.unwrap();
    assert!(status.status.is_none());
    assert_eq!(status.extra["state"], "healthy");

    *mock.status_body.lock().unwrap() = None;
    let status = client.status().await.unwrap();
    assert_eq!(status.raw, Payload::Empty);
}

#[tokio::test]
async fn status_after_revocation_is_authentication_error() {
    let (mock, url) = setup().await;
    let client = connect_with(Config::new(&url, "id", "secret")).await.unwrap();

    mock.revoked.store(true, Ordering::SeqCst);
    let err = client.status().await.unwrap_err();
    assert!(err.is_authentication(), "{err}");
}

#[tokio::test]
async fn status_reuses_cached_token() {
    let (mock, url) = setup().await;
    let client = connect_with(Config::new(&url, "id", "secret")).await.unwrap();

    client.status().await.unwrap();
    client.status().await.unwrap();

    assert_eq!(mock.authenticate_calls.load(Ordering::SeqCst), 1);
    assert_eq!(mock.status_calls.load(Ordering::SeqCst), 2);
}

// ── preflight ─────────────────────────────────────────────────────

#[tokio::test]
async fn preflight_authenticates_implicitly() {
    let (mock, url) = setup().await;
    let client = Client::new(Config::new(&url, "id", "secret")).unwrap();
    assert!(!client.is_authenticated());

    let payload = client
        .post(&json!({}), &["/v1/authrequired"], &[])
        .await
        .unwrap();

    assert_eq!(payload, Payload::Json(json!([])));
    assert_eq!(mock.authenticate_calls.load(Ordering::SeqCst), 1);
    assert!(client.is_authenticated());
}

#[tokio::test]
async fn expired_access_token_is_refreshed() {
    let now = now_secs();
    let mock = Mock::new(jwt(now - 60), jwt(now + 3600));
    let url = spawn_server(mock.clone()).await;

    let client = connect_with(Config::new(&url, "id", "secret")).await.unwrap();
    assert!(!client.is_authenticated());
    assert!(client.is_refreshable());

    let status = client.status().await.unwrap();
    assert_eq!(status.status.as_deref(), Some("ok"));
    assert_eq!(mock.authenticate_calls.load(Ordering::SeqCst), 1);
    assert_eq!(mock.reauthenticate_calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        client.credentials().unwrap().access_token.as_str(),
        "reissued"
    );
}

#[tokio::test]
async fn expired_tokens_fall_back_to_api_key() {
    let now = now_secs();
    let mock = Mock::new(jwt(now - 60), jwt(now - 30));
    let url = spawn_server(mock.clone()).await;

    let client = connect_with(Config::new(&url, "id", "secret")).await.unwrap();
    assert!(!client.is_refreshable());

    // Neither token is usable, so the API key is exchanged again before the
    // status request goes out.
    client.status().await.unwrap();
    assert_eq!(mock.authenticate_calls.load(Ordering::SeqCst), 2);
    assert_eq!(mock.reauthenticate_calls.load(Ordering::SeqCst), 0);
}

// ── response handling ─────────────────────────────────────────────

#[tokio::test]
async fn query_parameters_are_sent() {
    let (_mock, url) = setup().await;
    let config = Config::new(format!("{url}?ordering=created"), "id", "secret");
    let client = Client::new(config).unwrap();

    let payload = client
        .get(&["echo"], &[("include", "archives")])
        .await
        .unwrap();
    assert_eq!(
        payload,
        Payload::Json(json!({"ordering": "created", "include": "archives"}))
    );
}

#[tokio::test]
async fn not_found_maps_to_not_found() {
    let (_mock, url) = setup().await;
    let client = Client::new(Config::new(&url, "id", "secret")).unwrap();

    match client.get(&["missing"], &[]).await.unwrap_err() {
        guidelight::Error::NotFound(message) => assert_eq!(message, "resource not found"),
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn bad_request_lists_field_errors() {
    let (_mock, url) = setup().await;
    let client = Client::new(Config::new(&url, "id", "secret")).unwrap();

    match client.post(&json!({}), &["agents"], &[]).await.unwrap_err() {
        guidelight::Error::Client { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "invalid agent:\n  name: this field is required");
        }
        other => panic!("expected Client error, got {other:?}"),
    }
}

#[tokio::test]
async fn server_error_without_json_body() {
    let (_mock, url) = setup().await;
    let client = Client::new(Config::new(&url, "id", "secret")).unwrap();

    match client.get(&["boom"], &[]).await.unwrap_err() {
        guidelight::Error::Server { status, message } => {
            assert_eq!(status, 500);
            assert!(message.starts_with("500 response from 127.0.0.1:"), "{message}");
        }
        other => panic!("expected Server error, got {other:?}"),
    }
}

#[tokio::test]
async fn no_content_is_empty_payload() {
    let (_mock, url) = setup().await;
    let client = Client::new(Config::new(&url, "id", "secret")).unwrap();

    let payload = client.delete(&["agents", "1"], &[]).await.unwrap();
    assert!(payload.is_empty());
}

#[tokio::test]
async fn non_json_body_is_returned_as_bytes() {
    let (_mock, url) = setup().await;
    let client = Client::new(Config::new(&url, "id", "secret")).unwrap();

    let payload = client.get(&["ping"], &[]).await.unwrap();
    assert_eq!(payload, Payload::Bytes(b"pong".to_vec()));
}

#[tokio::test]
async fn invalid_json_body_is_connection_error() {
    let (_mock, url) = setup().await;
    let client = Client::new(Config::new(&url, "id", "secret")).unwrap();

    let err = client.get(&["garbled"], &[]).await.unwrap_err();
    assert!(err.is_connection(), "{err}");
}
