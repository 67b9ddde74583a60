use base64::Engine;
use serde_json::Value;

/// Header injected by the Static Web Apps front end for every proxied API call.
pub const CLIENT_PRINCIPAL_HEADER: &str = "x-ms-client-principal";

#[derive(Debug, thiserror::Error)]
pub enum PrincipalError {
    #[error("client principal header contains non-ASCII bytes")]
    HeaderEncoding,
    #[error("client principal is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("client principal is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("client principal is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("client principal must be a JSON object")]
    NotAnObject,
    #[error("client principal field '{field}' must be {expected}")]
    FieldType { field: &'static str, expected: &'static str },
}

/// The record carried (base64 JSON) in `x-ms-client-principal`, before role filtering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientPrincipal {
    pub identity_provider: String,
    pub user_id: String,
    pub user_details: String,
    pub user_roles: Vec<String>,
}

impl ClientPrincipal {
    /// Decode a raw header value: base64 -> UTF-8 -> JSON object.
    pub fn decode_header(value: &str) -> Result<Self, PrincipalError> {
        let bytes = base64::engine::general_purpose::STANDARD.decode(value.trim())?;
        let text = String::from_utf8(bytes)?;
        Self::from_json(&text)
    }

    /// Field names are matched case-insensitively; missing or null fields take their
    /// empty default and unknown fields are ignored.
    pub fn from_json(text: &str) -> Result<Self, PrincipalError> {
        let doc: Value = serde_json::from_str(text)?;
        let Value::Object(map) = doc else { return Err(PrincipalError::NotAnObject); };

        let mut out = ClientPrincipal::default();
        for (key, value) in map.iter() {
            if key.eq_ignore_ascii_case("identityProvider") {
                out.identity_provider = string_field("identityProvider", value)?;
            } else if key.eq_ignore_ascii_case("userId") {
                out.user_id = string_field("userId", value)?;
            } else if key.eq_ignore_ascii_case("userDetails") {
                out.user_details = string_field("userDetails", value)?;
            } else if key.eq_ignore_ascii_case("userRoles") {
                out.user_roles = roles_field(value)?;
            }
        }
        Ok(out)
    }
}

fn string_field(field: &'static str, value: &Value) -> Result<String, PrincipalError> {
    match value {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s.clone()),
        _ => Err(PrincipalError::FieldType { field, expected: "a string" }),
    }
}

fn roles_field(value: &Value) -> Result<Vec<String>, PrincipalError> {
    const EXPECTED: &str = "an array of strings";
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => Ok(s.clone()),
                _ => Err(PrincipalError::FieldType { field: "userRoles", expected: EXPECTED }),
            })
            .collect(),
        _ => Err(PrincipalError::FieldType { field: "userRoles", expected: EXPECTED }),
    }
}
