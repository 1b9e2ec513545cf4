mod cluster;
mod codec;
mod config;
mod handlers;
mod health;
mod metrics;
mod patch;
mod sidecar;
#[cfg(test)]
mod test_utils;
mod tls;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::Router;
use clap::Parser;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpBuilder;
use hyper_util::service::TowerToHyperService;
use prometheus_client::registry::Registry;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_rustls::TlsAcceptor;
use tracing::{error, info};

#[derive(Parser)]
#[command(
    name = "nginx-sidecar-injector",
    about = "Mutating webhook injecting an nginx sidecar into Pods"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, default_value = "/etc/webhook/config.yaml", env = "INJECTOR_CONFIG")]
    config: String,
}

async fn shutdown_signal(shutdown_tx: watch::Sender<()>) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("received CTRL+C, starting graceful shutdown"),
            _ = sigterm.recv() => info!("received SIGTERM, starting graceful shutdown"),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to listen for ctrl_c");
        info!("received CTRL+C, starting graceful shutdown");
    }

    let _ = shutdown_tx.send(());
}

async fn run_webhook_server(
    addr: SocketAddr,
    tls_acceptor: TlsAcceptor,
    router: Router,
    ready: Arc<AtomicBool>,
    mut shutdown_rx: watch::Receiver<()>,
) {
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(%addr, "failed to bind webhook listener: {e}");
            std::process::exit(1);
        }
    };

    info!(%addr, "HTTPS webhook server listening");
    ready.store(true, Ordering::Relaxed);

    loop {
        let (tcp_stream, remote_addr) = tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!("failed to accept TCP connection: {e}");
                        continue;
                    }
                }
            }
            _ = shutdown_rx.changed() => {
                info!("HTTPS server shutting down");
                break;
            }
        };

        let tls_acceptor = tls_acceptor.clone();
        let router = router.clone();

        tokio::spawn(async move {
            let tls_stream = match tls_acceptor.accept(tcp_stream).await {
                Ok(stream) => stream,
                Err(e) => {
                    error!(%remote_addr, "TLS handshake failed: {e}");
                    return;
                }
            };

            let io = TokioIo::new(tls_stream);
            let service = TowerToHyperService::new(router.into_service());

            if let Err(e) = HttpBuilder::new(TokioExecutor::new())
                .serve_connection(io, service)
                .await
            {
                error!(%remote_addr, "error serving connection: {e}");
            }
        });
    }

    ready.store(false, Ordering::Relaxed);
}

async fn run_health_server(
    addr: SocketAddr,
    router: Router,
    mut shutdown_rx: watch::Receiver<()>,
) {
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(%addr, "failed to bind health listener: {e}");
            std::process::exit(1);
        }
    };

    info!(%addr, "HTTP health/metrics server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
            info!("HTTP server shutting down");
        })
        .await
        .unwrap_or_else(|e| error!("HTTP server error: {e}"));
}

fn parse_addr(field: &str, value: &str) -> SocketAddr {
    value.parse().unwrap_or_else(|e| {
        eprintln!("Invalid {field} '{value}': {e}");
        std::process::exit(1);
    })
}

#[tokio::main]
async fn main() {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("failed to install default CryptoProvider");

    let cli = Cli::parse();

    let config = config::InjectorConfig::load(&cli.config).unwrap_or_else(|e| {
        eprintln!("Failed to load config from {}: {e}", cli.config);
        std::process::exit(1);
    });

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .init();

    info!(
        listen_addr = %config.listen_addr,
        metrics_addr = %config.metrics_addr,
        log_level = %config.log_level,
        request_timeout_secs = config.request_timeout_secs,
        max_body_bytes = config.max_body_bytes,
        sidecar.container = config.sidecar.container_name_or_default(),
        sidecar.image = %config.sidecar.image,
        sidecar.port = config.sidecar.container_port,
        "loaded configuration"
    );

    if config.startup_cluster_check {
        if let Err(e) = cluster::check_connectivity().await {
            error!("cluster connectivity check failed: {e}");
            std::process::exit(1);
        }
    }

    let tls_acceptor = tls::load_acceptor(
        Path::new(&config.tls_cert_path),
        Path::new(&config.tls_key_path),
    )
    .unwrap_or_else(|e| {
        error!("failed to load TLS config: {e}");
        std::process::exit(1);
    });

    let mut registry = Registry::default();
    let injector_metrics = metrics::InjectorMetrics::new(&mut registry);
    let registry = Arc::new(registry);

    let app_state = Arc::new(handlers::AppState {
        template: sidecar::SidecarTemplate::from_config(&config.sidecar),
        metrics: injector_metrics,
        max_body_bytes: config.max_body_bytes,
        request_timeout: Duration::from_secs(config.request_timeout_secs),
    });

    let ready = Arc::new(AtomicBool::new(false));
    let health_state = Arc::new(health::HealthState {
        registry,
        ready: ready.clone(),
    });

    let listen_addr = parse_addr("listen_addr", &config.listen_addr);
    let metrics_addr = parse_addr("metrics_addr", &config.metrics_addr);

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    tokio::spawn(shutdown_signal(shutdown_tx));

    tokio::join!(
        run_webhook_server(
            listen_addr,
            tls_acceptor,
            handlers::webhook_router(app_state),
            ready,
            shutdown_rx.clone(),
        ),
        run_health_server(metrics_addr, health::health_router(health_state), shutdown_rx),
    );

    info!("nginx-sidecar-injector shut down gracefully");
}
