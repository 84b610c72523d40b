use std::net::SocketAddr;

use anyhow::Context;
use axum::http::{HeaderValue, Method, header};
use clap::Args;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Args)]
pub struct DatabaseConfig {
    /// SQLite connection string.
    #[arg(long, global = true, env = "DATABASE_URL", default_value = "sqlite://roomcast.db")]
    pub database_url: String,
}

#[derive(Debug, Clone, Args)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    pub json_logs: bool,
}

impl LogConfig {
    pub fn init(&self) {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.log_level));

        if self.json_logs {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_target(true))
                .init();
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_target(false))
                .init();
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct ServeConfig {
    #[arg(long, env = "ROOMCAST_BIND", default_value = "0.0.0.0:3000")]
    pub bind: SocketAddr,

    /// Allowed browser origins, comma separated. `*` allows any origin.
    #[arg(
        long = "cors-origin",
        env = "ROOMCAST_CORS_ORIGINS",
        value_delimiter = ',',
        default_value = "http://localhost:5173"
    )]
    pub cors_origins: Vec<String>,
}

impl ServeConfig {
    pub fn cors(&self) -> anyhow::Result<CorsLayer> {
        let layer = CorsLayer::new()
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

        if self.cors_origins.iter().any(|origin| origin == "*") {
            return Ok(layer.allow_origin(AllowOrigin::any()));
        }

        let origins = self
            .cors_origins
            .iter()
            .map(|origin| {
                HeaderValue::from_str(origin.trim()).with_context(|| format!("invalid CORS origin {origin:?}"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(layer.allow_origin(AllowOrigin::list(origins)).allow_credentials(true))
    }
}
