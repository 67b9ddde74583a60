//!
//! commtoken server binary
//! -----------------------
//! Command-line entry point. Configuration comes from the environment; the
//! listen port and host can be overridden with CLI flags.

use anyhow::{Context, Result};
use std::env;

use commtoken::config::{self, Config};

fn parse_value_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag && i + 1 < args.len() {
            return Some(args[i + 1].as_str());
        }
        i += 1;
    }
    None
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if has_flag(&args, "--help") || has_flag(&args, "-h") {
        println!(
            "commtoken Server\n\nUSAGE:\n  commtoken_server [--http-port N] [--bind HOST]\n\nOPTIONS:\n  --http-port N   HTTP port (env: {}, then {}, default {})\n  --bind HOST     Listen address (env: {}, default {})\n\nENVIRONMENT:\n  {}  required, endpoint=...;accesskey=...\n  {}  identity service timeout in seconds (default {})\n",
            config::CUSTOM_HANDLER_PORT_VAR,
            config::HTTP_PORT_VAR,
            config::DEFAULT_HTTP_PORT,
            config::BIND_HOST_VAR,
            config::DEFAULT_BIND_HOST,
            config::CONNECTION_STRING_VAR,
            config::UPSTREAM_TIMEOUT_VAR,
            config::DEFAULT_UPSTREAM_TIMEOUT_SECS,
        );
        return Ok(());
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let mut cfg = Config::from_env().context("invalid configuration")?;

    // CLI arguments override environment
    if let Some(v) = parse_value_arg(&args, "--http-port") {
        cfg.http_port = config::parse_port("--http-port", v)?;
    }
    if let Some(v) = parse_value_arg(&args, "--bind") {
        cfg.bind_host = v.to_string();
    }

    println!("commtoken starting: addr={}, endpoint={}", cfg.bind_addr(), cfg.connection_string.endpoint());
    tracing::info!(
        rust_log = %env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string()),
        addr = %cfg.bind_addr(),
        "commtoken starting"
    );

    commtoken::server::run_with_config(cfg).await
}
