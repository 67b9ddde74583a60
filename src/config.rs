//! Service configuration
//! ---------------------
//! Built once at startup from the process environment (and CLI overrides in the
//! binary), then handed to the server. Handlers never read the environment.

use std::fmt;
use std::time::Duration;

use base64::Engine;
use reqwest::Url;

pub const CONNECTION_STRING_VAR: &str = "COMMUNICATION_SERVICES_CONNECTION_STRING";
pub const CUSTOM_HANDLER_PORT_VAR: &str = "FUNCTIONS_CUSTOMHANDLER_PORT";
pub const HTTP_PORT_VAR: &str = "COMMTOKEN_HTTP_PORT";
pub const BIND_HOST_VAR: &str = "COMMTOKEN_BIND_HOST";
pub const UPSTREAM_TIMEOUT_VAR: &str = "COMMTOKEN_UPSTREAM_TIMEOUT_SECS";

pub const DEFAULT_HTTP_PORT: u16 = 7071;
pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("the environment variable '{0}' is not set")]
    MissingVar(&'static str),
    #[error("invalid connection string: {0}")]
    InvalidConnectionString(String),
    #[error("invalid value for {var}: '{value}'")]
    InvalidValue { var: &'static str, value: String },
}

/// Parsed `endpoint=...;accesskey=...` connection string.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionString {
    endpoint: Url,
    access_key: Vec<u8>,
}

impl ConnectionString {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let mut endpoint: Option<&str> = None;
        let mut access_key: Option<&str> = None;
        for part in raw.split(';') {
            let part = part.trim();
            if part.is_empty() { continue; }
            // Keys may not contain '='; the value (a base64 key) may.
            let Some((k, v)) = part.split_once('=') else {
                return Err(ConfigError::InvalidConnectionString(format!("segment without '=': {}", redact_segment(part))));
            };
            match k.trim().to_ascii_lowercase().as_str() {
                "endpoint" => endpoint = Some(v.trim()),
                "accesskey" => access_key = Some(v.trim()),
                _ => {}
            }
        }

        let endpoint = endpoint
            .filter(|e| !e.is_empty())
            .ok_or_else(|| ConfigError::InvalidConnectionString("missing endpoint".into()))?;
        let mut endpoint = Url::parse(endpoint)
            .map_err(|e| ConfigError::InvalidConnectionString(format!("endpoint is not a URL: {e}")))?;
        if endpoint.scheme() != "https" && endpoint.scheme() != "http" {
            return Err(ConfigError::InvalidConnectionString(format!("unsupported endpoint scheme '{}'", endpoint.scheme())));
        }
        if endpoint.host_str().is_none() {
            return Err(ConfigError::InvalidConnectionString("endpoint has no host".into()));
        }
        // Normalize to the bare origin; request paths are appended later.
        endpoint.set_path("/");
        endpoint.set_query(None);

        let access_key = access_key
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ConfigError::InvalidConnectionString("missing accesskey".into()))?;
        let access_key = base64::engine::general_purpose::STANDARD
            .decode(access_key)
            .map_err(|_| ConfigError::InvalidConnectionString("accesskey is not valid base64".into()))?;

        Ok(Self { endpoint, access_key })
    }

    pub fn endpoint(&self) -> &Url { &self.endpoint }

    pub fn access_key(&self) -> &[u8] { &self.access_key }
}

impl fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionString")
            .field("endpoint", &self.endpoint.as_str())
            .field("access_key", &"<redacted>")
            .finish()
    }
}

fn redact_segment(segment: &str) -> String {
    match segment.split_once('=') {
        Some((k, _)) => format!("{k}=<redacted>"),
        None => "<redacted>".to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub bind_host: String,
    pub connection_string: ConnectionString,
    pub request_timeout: Duration,
}

impl Config {
    pub fn new(connection_string: ConnectionString) -> Self {
        Self {
            http_port: DEFAULT_HTTP_PORT,
            bind_host: DEFAULT_BIND_HOST.to_string(),
            connection_string,
            request_timeout: Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from an arbitrary variable lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let raw = get(CONNECTION_STRING_VAR).ok_or(ConfigError::MissingVar(CONNECTION_STRING_VAR))?;
        let mut cfg = Config::new(ConnectionString::parse(&raw)?);

        // The Functions host assigns the port for custom handlers; it wins over our own variable.
        if let Some(v) = get(CUSTOM_HANDLER_PORT_VAR) {
            cfg.http_port = parse_port(CUSTOM_HANDLER_PORT_VAR, &v)?;
        } else if let Some(v) = get(HTTP_PORT_VAR) {
            cfg.http_port = parse_port(HTTP_PORT_VAR, &v)?;
        }
        if let Some(v) = get(BIND_HOST_VAR) {
            cfg.bind_host = v.trim().to_string();
        }
        if let Some(v) = get(UPSTREAM_TIMEOUT_VAR) {
            let secs = v.trim().parse::<u64>().ok().filter(|s| *s > 0).ok_or_else(|| ConfigError::InvalidValue {
                var: UPSTREAM_TIMEOUT_VAR,
                value: v.clone(),
            })?;
            cfg.request_timeout = Duration::from_secs(secs);
        }
        Ok(cfg)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.http_port)
    }
}

pub fn parse_port(var: &'static str, value: &str) -> Result<u16, ConfigError> {
    value
        .trim()
        .parse::<u16>()
        .map_err(|_| ConfigError::InvalidValue { var, value: value.to_string() })
}
