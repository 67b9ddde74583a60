//! Principal resolution and the `authenticated` role gate.
//!
//! The platform always grants `anonymous`, so it is dropped before any decision.
//! A principal left with no roles is the anonymous principal; a principal with
//! roles but without `authenticated` keeps its claims yet fails the gate. Callers
//! treat both the same way.

use axum::http::HeaderMap;
use serde::Serialize;

use super::principal::{ClientPrincipal, PrincipalError, CLIENT_PRINCIPAL_HEADER};

pub const ANONYMOUS_ROLE: &str = "anonymous";
pub const AUTHENTICATED_ROLE: &str = "authenticated";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimKind {
    Subject,
    Name,
    Role,
}

/// One attributed fact about a principal, labelled with the identity provider that asserted it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Claim {
    pub kind: ClaimKind,
    pub value: String,
    pub issuer: String,
}

/// Resolved caller identity for a single request. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Principal {
    subject: String,
    display_name: String,
    identity_provider: String,
    roles: Vec<String>,
    is_authenticated: bool,
}

impl Principal {
    pub fn anonymous() -> Self { Self::default() }

    /// Apply role filtering to a decoded header record.
    pub fn from_client(client: ClientPrincipal) -> Self {
        let roles = filter_roles(client.user_roles);
        if roles.is_empty() {
            return Self::anonymous();
        }
        let is_authenticated = roles.iter().any(|r| r == AUTHENTICATED_ROLE);
        Self {
            subject: client.user_id,
            display_name: client.user_details,
            identity_provider: client.identity_provider,
            roles,
            is_authenticated,
        }
    }

    pub fn subject(&self) -> &str { &self.subject }
    pub fn display_name(&self) -> &str { &self.display_name }
    pub fn identity_provider(&self) -> &str { &self.identity_provider }
    pub fn roles(&self) -> &[String] { &self.roles }
    pub fn is_authenticated(&self) -> bool { self.is_authenticated }

    pub fn is_anonymous(&self) -> bool { self.roles.is_empty() }

    /// Case-sensitive, as the platform emits role names verbatim.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Subject, name, then one claim per role. Empty for the anonymous principal.
    pub fn claims(&self) -> Vec<Claim> {
        if self.is_anonymous() {
            return Vec::new();
        }
        let claim = |kind, value: &str| Claim { kind, value: value.to_string(), issuer: self.identity_provider.clone() };
        let mut out = Vec::with_capacity(self.roles.len() + 2);
        out.push(claim(ClaimKind::Subject, &self.subject));
        out.push(claim(ClaimKind::Name, &self.display_name));
        out.extend(self.roles.iter().map(|r| claim(ClaimKind::Role, r)));
        out
    }
}

/// Drop `anonymous` in any casing and de-duplicate case-insensitively, keeping the
/// first spelling and the original order.
pub fn filter_roles<I, S>(roles: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut seen: Vec<String> = Vec::new();
    let mut out = Vec::new();
    for role in roles {
        let role: String = role.into();
        let folded = role.to_lowercase();
        if folded == ANONYMOUS_ROLE || seen.contains(&folded) {
            continue;
        }
        seen.push(folded);
        out.push(role);
    }
    out
}

/// Resolve the principal from the raw header value. `None` is the normal anonymous
/// visitor path; malformed values are errors.
pub fn resolve_principal(header: Option<&str>) -> Result<Principal, PrincipalError> {
    let Some(raw) = header else { return Ok(Principal::anonymous()); };
    let client = ClientPrincipal::decode_header(raw)?;
    let principal = Principal::from_client(client);
    tracing::debug!(
        provider = %principal.identity_provider(),
        roles = ?principal.roles(),
        authenticated = principal.is_authenticated(),
        "resolved client principal"
    );
    Ok(principal)
}

/// Resolve from request headers; only the first `x-ms-client-principal` value is used.
pub fn principal_from_headers(headers: &HeaderMap) -> Result<Principal, PrincipalError> {
    let raw = match headers.get(CLIENT_PRINCIPAL_HEADER) {
        Some(v) => Some(v.to_str().map_err(|_| PrincipalError::HeaderEncoding)?),
        None => None,
    };
    resolve_principal(raw)
}

/// The gate used by the token endpoint.
pub fn is_authorized(principal: &Principal) -> bool {
    principal.is_authenticated()
}
