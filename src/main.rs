//! JWT gate API server.
//!
//! Serves the route table behind bearer token validation against the
//! configured identity provider.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

use jwt_gate::oidc::{JwksCache, TokenValidator, ValidationConfig};
use jwt_gate::routes::{build_router, log_routes, route_table, RouterConfig, DEFAULT_PRODUCTS_SCOPE};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "jwt-gate")]
#[command(about = "HTTP API protected by identity provider bearer tokens")]
struct Args {
    /// Identity provider tenant domain (issuer is https://<domain>/)
    #[arg(long, env = "AUTH0_DOMAIN")]
    issuer_domain: String,

    /// Audience the tokens must be issued for
    #[arg(long, env = "AUTH0_AUDIENCE")]
    audience: String,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0", env = "BIND_ADDR")]
    bind: String,

    /// Port to listen on
    #[arg(long, default_value_t = 8080, env = "PORT")]
    port: u16,

    /// Allowed clock skew in seconds
    #[arg(long, default_value_t = 60, env = "JWT_CLOCK_SKEW_SECS")]
    clock_skew_secs: u64,

    /// How long fetched signing keys are cached, in seconds
    #[arg(long, default_value_t = 300, env = "JWKS_TTL_SECS")]
    jwks_ttl_secs: u64,

    /// Timeout for fetching signing keys, in seconds
    #[arg(long, default_value_t = 10, env = "JWKS_TIMEOUT_SECS")]
    jwks_timeout_secs: u64,

    /// Minimum seconds between key set fetches triggered by unknown key ids
    #[arg(long, default_value_t = 10, env = "JWKS_MIN_REFETCH_SECS")]
    jwks_min_refetch_secs: u64,

    /// Scope required to list products
    #[arg(long, default_value = DEFAULT_PRODUCTS_SCOPE, env = "PRODUCTS_SCOPE")]
    products_scope: String,

    /// Enable verbose logging
    #[arg(short, long, env = "JWT_GATE_VERBOSE")]
    verbose: bool,
}

impl Args {
    fn validation_config(&self) -> Result<ValidationConfig> {
        let mut config = ValidationConfig::for_domain(&self.issuer_domain, &self.audience)
            .context("Failed to parse the issuer URL")?;
        config.clock_skew_secs = self.clock_skew_secs;
        config.jwks_ttl_secs = self.jwks_ttl_secs;
        config.jwks_timeout_secs = self.jwks_timeout_secs;
        config.jwks_min_refetch_secs = self.jwks_min_refetch_secs;
        config
            .validate()
            .context("Invalid token validation configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "{}={},tower_http={}",
            env!("CARGO_CRATE_NAME"),
            log_level,
            log_level
        ))
        .json()
        .init();

    info!("Starting JWT gate");

    let config = args.validation_config()?;
    info!(
        issuer = %config.issuer,
        audience = %config.audience,
        jwks_url = %config.jwks_url,
        jwks_ttl_secs = config.jwks_ttl_secs,
        clock_skew_secs = config.clock_skew_secs,
        "Configuration loaded"
    );

    let keys = Arc::new(JwksCache::new(&config).context("Failed to set up the JWKS cache")?);

    // Refuse to serve with a provider we cannot reach.
    let key_count = keys
        .refresh()
        .await
        .map_err(|e| anyhow!("Failed to fetch signing keys from {}: {}", config.jwks_url, e))?;
    if key_count == 0 {
        warn!(url = %config.jwks_url, "JWKS contains no usable signing keys");
    }

    let validator = Arc::new(TokenValidator::new(config, keys));

    let router_config = RouterConfig {
        products_scope: args.products_scope.clone(),
        ..RouterConfig::default()
    };
    log_routes(&route_table(&router_config));
    let app = build_router(validator, &router_config);

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", args.bind, args.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!(addr = %addr, "Listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
