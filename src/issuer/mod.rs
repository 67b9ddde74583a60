//! Token issuer abstraction.
//!
//! Provides the [`TokenIssuer`] trait that the token endpoint calls once a caller
//! passes the role gate. The production implementation, [`AcsIdentityClient`],
//! creates a fresh communication user and token through the identity REST API;
//! tests substitute their own implementations.

pub mod acs;
pub mod signing;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use acs::AcsIdentityClient;
pub use signing::HmacSigner;

/// Capability requested for an issued token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenScope {
    #[serde(rename = "chat")]
    Chat,
    #[serde(rename = "voip")]
    VoIP,
}

impl TokenScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenScope::Chat => "chat",
            TokenScope::VoIP => "voip",
        }
    }
}

/// Scopes requested for every token issued by the endpoint.
pub const DEFAULT_SCOPES: [TokenScope; 2] = [TokenScope::Chat, TokenScope::VoIP];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunicationUser {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessToken {
    pub token: String,
    pub expires_on: DateTime<Utc>,
}

/// Body relayed to the caller on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAndToken {
    pub user: CommunicationUser,
    pub access_token: AccessToken,
}

#[derive(Debug, thiserror::Error)]
pub enum IssuerError {
    #[error("identity service request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("identity service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("identity service response could not be decoded: {0}")]
    Decode(String),
    #[error("request signing failed: {0}")]
    Signing(String),
}

#[async_trait::async_trait]
pub trait TokenIssuer: Send + Sync {
    /// Create a new communication user and an access token carrying `scopes`.
    async fn create_user_and_token(&self, scopes: &[TokenScope]) -> Result<UserAndToken, IssuerError>;
}
