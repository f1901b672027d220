#![forbid(unsafe_code)]

//! Relay server: exposes `/api/proxy` and, when configured, the front-end's
//! static files from the same origin.

use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
};

use anyhow::{Context, Result};
use clap::Parser;
use lesson_catalog::{
    config::{RuntimeOverrides, resolve_runtime_settings},
    logging::init_tracing,
    relay::{PROXY_ROUTE, RelayState, router},
    security::ensure_not_root,
};
use tokio::signal;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(about = "Same-origin relay for the lesson catalog API")]
struct RelayArgs {
    /// Address to listen on (RELAY_HOST).
    #[arg(long)]
    host: Option<String>,
    /// Port to listen on (RELAY_PORT).
    #[arg(long)]
    port: Option<u16>,
    /// Directory with the front-end's static files (WWW_ROOT).
    #[arg(long)]
    www_root: Option<PathBuf>,
    /// Alternate env file.
    #[arg(long)]
    env_file: Option<PathBuf>,
}

impl RelayArgs {
    fn overrides(&self) -> RuntimeOverrides {
        RuntimeOverrides {
            relay_host: self.host.clone(),
            relay_port: self.port,
            www_root: self.www_root.clone(),
            env_path: self.env_file.clone(),
            ..RuntimeOverrides::default()
        }
    }
}

fn parse_host_arg(value: &str) -> Result<IpAddr> {
    value
        .trim()
        .parse::<IpAddr>()
        .context("expected a valid IPv4 or IPv6 address for --host/RELAY_HOST")
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("info");
    let args = RelayArgs::parse();
    ensure_not_root("relay")?;

    let settings = resolve_runtime_settings(args.overrides())?;
    let host = parse_host_arg(&settings.relay_host)?;
    let addr = SocketAddr::new(host, settings.relay_port);

    if let Some(root) = &settings.www_root {
        info!(root = %root.display(), "serving static files");
    }
    let app = router(RelayState::new(settings.www_root.clone()));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    info!("relay listening on http://{addr}{PROXY_ROUTE}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running relay server")?;

    Ok(())
}

async fn shutdown_signal() {
    // Without the handler the process still dies on Ctrl+C, just not gracefully.
    if let Err(err) = signal::ctrl_c().await {
        error!(%err, "failed to install Ctrl+C handler");
    }
}
