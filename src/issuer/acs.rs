//! Communication identity REST client.
//!
//! Each call creates a brand-new communication user together with a token.
//! Nothing maps application users to communication users, so every successful
//! request yields a different identity.

use std::time::Duration;

use anyhow::Context;
use reqwest::header::{CONTENT_TYPE, AUTHORIZATION};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ConnectionString;

use super::signing::HmacSigner;
use super::{AccessToken, CommunicationUser, IssuerError, TokenIssuer, TokenScope, UserAndToken};

pub const API_VERSION: &str = "2023-10-01";
const IDENTITIES_PATH: &str = "/identities";
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateIdentityRequest<'a> {
    create_token_with_scopes: &'a [TokenScope],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateIdentityResponse {
    identity: CommunicationUser,
    #[serde(default)]
    access_token: Option<AccessToken>,
}

#[derive(Debug, Clone)]
pub struct AcsIdentityClient {
    http: reqwest::Client,
    endpoint: Url,
    signer: HmacSigner,
}

impl AcsIdentityClient {
    pub fn new(conn: &ConnectionString, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build identity service HTTP client")?;
        Ok(Self::with_client(http, conn))
    }

    pub fn with_client(http: reqwest::Client, conn: &ConnectionString) -> Self {
        Self { http, endpoint: conn.endpoint().clone(), signer: HmacSigner::new(conn.access_key().to_vec()) }
    }

    fn identities_url(&self) -> Result<Url, IssuerError> {
        let mut url = self
            .endpoint
            .join(IDENTITIES_PATH)
            .map_err(|e| IssuerError::Signing(format!("invalid identities URL: {e}")))?;
        url.query_pairs_mut().clear().append_pair("api-version", API_VERSION);
        Ok(url)
    }
}

/// `host[:port]` as sent in the Host header; default ports are omitted.
fn host_header(url: &Url) -> Result<String, IssuerError> {
    let host = url.host_str().ok_or_else(|| IssuerError::Signing("endpoint has no host".into()))?;
    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

fn truncate(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) { end -= 1; }
    format!("{}...", &body[..end])
}

#[async_trait::async_trait]
impl TokenIssuer for AcsIdentityClient {
    async fn create_user_and_token(&self, scopes: &[TokenScope]) -> Result<UserAndToken, IssuerError> {
        let url = self.identities_url()?;
        let body = serde_json::to_vec(&CreateIdentityRequest { create_token_with_scopes: scopes })
            .map_err(|e| IssuerError::Signing(format!("failed to encode request: {e}")))?;

        let path_and_query = match url.query() {
            Some(q) => format!("{}?{}", url.path(), q),
            None => url.path().to_string(),
        };
        let signed = self.signer.sign("POST", &path_and_query, &host_header(&url)?, &body, chrono::Utc::now())?;

        debug!(url = %url, scopes = ?scopes, "creating communication user and token");
        let resp = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .header("x-ms-date", &signed.date)
            .header("x-ms-content-sha256", &signed.content_hash)
            .header(AUTHORIZATION, &signed.authorization)
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(%status, "identity service returned non-success");
            return Err(IssuerError::Status { status: status.as_u16(), body: truncate(&text) });
        }

        let bytes = resp.bytes().await?;
        let parsed: CreateIdentityResponse =
            serde_json::from_slice(&bytes).map_err(|e| IssuerError::Decode(e.to_string()))?;
        let access_token = parsed
            .access_token
            .ok_or_else(|| IssuerError::Decode("response has no accessToken".into()))?;
        debug!(user = %parsed.identity.id, expires_on = %access_token.expires_on, "communication user created");
        Ok(UserAndToken { user: parsed.identity, access_token })
    }
}
