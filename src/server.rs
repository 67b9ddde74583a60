//!
//! commtoken HTTP server
//! ---------------------
//! Axum application exposing the token endpoint.
//!
//! Responsibilities:
//! - Resolve the caller from the `x-ms-client-principal` header.
//! - Gate on the `authenticated` role; everyone else gets an empty 401.
//! - For authorized callers, create a communication user + token and relay it.
//! - Tag every response with `x-request-id`.

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::identity::{self, RequestContext, REQUEST_ID_HEADER};
use crate::issuer::{AcsIdentityClient, TokenIssuer, DEFAULT_SCOPES};

pub const TOKEN_ROUTE: &str = "/api/token";

/// Shared server state injected into all handlers. Immutable after startup.
#[derive(Clone)]
pub struct AppState {
    pub issuer: Arc<dyn TokenIssuer>,
}

impl AppState {
    pub fn new(issuer: Arc<dyn TokenIssuer>) -> Self {
        Self { issuer }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "commtoken ok" }))
        .route(TOKEN_ROUTE, get(token))
        .with_state(state)
}

/// Serve on an already-bound listener until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server terminated with an error")
}

/// Build the identity client from `config`, bind, and serve until ctrl-c.
pub async fn run_with_config(config: Config) -> anyhow::Result<()> {
    let issuer = AcsIdentityClient::new(&config.connection_string, config.request_timeout)?;
    let state = AppState::new(Arc::new(issuer));

    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(
        target: "startup",
        addr = %addr,
        endpoint = %config.connection_string.endpoint(),
        upstream_timeout_secs = config.request_timeout.as_secs(),
        "commtoken listening"
    );
    serve(listener, state, shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to install ctrl-c handler: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

async fn token(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let request_id = identity::request_id_from_headers(&headers);
    let span = info_span!("token", request_id = %request_id);
    let mut resp = issue_token(&state, &headers, request_id.clone())
        .instrument(span)
        .await
        .unwrap_or_else(|e| e.into_response());
    if let Ok(v) = HeaderValue::from_str(&request_id) {
        resp.headers_mut().insert(REQUEST_ID_HEADER, v);
    }
    resp
}

async fn issue_token(state: &AppState, headers: &HeaderMap, request_id: String) -> AppResult<Response> {
    info!("token request processed");

    let principal = identity::principal_from_headers(headers).map_err(|e| {
        warn!(error = %e, "rejecting malformed client principal");
        AppError::from(e)
    })?;
    let ctx = RequestContext::new(request_id, principal);

    if !identity::is_authorized(&ctx.principal) {
        info!(anonymous = ctx.principal.is_anonymous(), "caller is not authenticated");
        return Ok(StatusCode::UNAUTHORIZED.into_response());
    }

    let issued = state.issuer.create_user_and_token(&DEFAULT_SCOPES).await.map_err(|e| {
        error!(error = %e, "identity service call failed");
        AppError::from(e)
    })?;
    info!(
        subject = %ctx.principal.subject(),
        provider = %ctx.principal.identity_provider(),
        acs_user = %issued.user.id,
        "issued communication token"
    );
    Ok((StatusCode::OK, Json(issued)).into_response())
}
