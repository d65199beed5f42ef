use hyper::Request;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tower::{ServiceBuilder, ServiceExt};

// Error tracing
use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use proxy_detection::handlers::echo;
use proxy_detection::{ForwardingResolver, ProxyDetectionLayer};
use shared::config::load_config;

/// Echo server that reports the client-facing URI of each request,
/// resolved from X-Forwarded-* headers sent by trusted proxies.
#[derive(Parser, Debug)]
#[command(name = "proxy-detection", version)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let config = load_config(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config))?;

    let resolver =
        ForwardingResolver::from_config(&config.proxy).context("Invalid trusted proxy list")?;

    if resolver.trusted_proxies().is_empty() {
        warn!("No trusted proxies configured, X-Forwarded-* headers will always be ignored");
    }

    let addr = config.server.listen_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!(
        "Listening on http://{} ({} trusted proxy entries, port policy {:?})",
        addr,
        resolver.trusted_proxies().len(),
        resolver.port_policy()
    );

    let app = ServiceBuilder::new()
        .layer(ProxyDetectionLayer::new(resolver))
        .service_fn(echo::<Incoming>);

    let connections = Arc::new(Semaphore::new(config.server.max_connections));

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!("Failed to accept connection: {}", e);
                        continue;
                    }
                };

                let Ok(permit) = connections.clone().try_acquire_owned() else {
                    warn!("Connection limit reached, dropping {}", peer);
                    continue;
                };

                let app = app.clone();
                tokio::task::spawn(async move {
                    let _permit = permit;

                    // The peer address is the only input trusted for the proxy check
                    let service = service_fn(move |mut req: Request<Incoming>| {
                        req.extensions_mut().insert(peer);
                        app.clone().oneshot(req)
                    });

                    if let Err(err) = http1::Builder::new()
                        .timer(TokioTimer::new())
                        .serve_connection(TokioIo::new(stream), service)
                        .await
                    {
                        debug!("Error serving connection from {}: {:?}", peer, err);
                    }
                });
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    info!("Server closed!");

    Ok(())
}
