//! Coupe Gate - session admission gateway.
//!
//! Listens for HTTP traffic destined for one compute function, asks the
//! session broker to start a session for every request, and forwards only
//! approved requests to the function upstream.

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use clap::Parser;
use coupe_gate::admin::{AdminServer, AdminServerConfig, Readiness};
use coupe_gate::config::{DEFAULT_PORT, ServerConfig, find_config_file, load_and_validate};
use coupe_gate::metrics::GateMetrics;
use coupe_gate::server::{gateway_service, serve};
use humantime::format_duration;
use prometheus_client::registry::Registry;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Command-line options.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the gate configuration file
    #[arg(short, long, env = "COUPE_GATE_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "COUPE_GATE_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Bind address
    #[arg(short, long, env = "COUPE_GATE_BIND", default_value = "0.0.0.0")]
    bind: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let server_config = ServerConfig::from_env();

    // Configuration errors are fatal before any listener is bound.
    let config = match find_config_file(cli.config.as_deref())
        .and_then(|path| load_and_validate(&path).map(|config| (path, config)))
    {
        Ok((path, config)) => {
            info!(path = %path.display(), "Loaded configuration");
            config
        }
        Err(e) => {
            error!(error = %e, "Invalid configuration, refusing to start");
            std::process::exit(1);
        }
    };

    let mut prom_registry = Registry::default();
    let metrics = Arc::new(GateMetrics::new(&mut prom_registry));
    let prom_registry = Arc::new(prom_registry);

    let service = match gateway_service(&config, Some(metrics.clone())) {
        Ok(service) => service,
        Err(e) => {
            error!(error = %e, "Failed to build gateway, refusing to start");
            std::process::exit(1);
        }
    };

    let shutdown = CancellationToken::new();
    let readiness = Arc::new(Readiness::new());

    let admin_server = AdminServer::with_config(
        readiness.clone(),
        prom_registry,
        AdminServerConfig {
            port: server_config.admin_port,
            bind_addr: cli.bind.clone(),
        },
    );
    let admin_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = admin_server.run(admin_shutdown).await {
            error!(error = %e, "Admin server error");
        }
    });

    let addr = format!("{}:{}", cli.bind, cli.port);
    let listener = TcpListener::bind(&addr).await?;
    readiness.mark_ready();

    info!(
        addr = %addr,
        admin_port = server_config.admin_port,
        function_name = %config.gate.function_name,
        session_duration = %format_duration(config.gate.session_duration),
        broker_url = %config.broker.url,
        upstream_url = %config.upstream.url,
        tcp_nodelay = server_config.tcp_nodelay,
        tcp_keepalive_secs = server_config.tcp_keepalive_secs,
        max_connections = server_config.max_connections,
        "Coupe gate starting"
    );

    spawn_signal_handlers(shutdown.clone(), readiness.clone());

    serve(listener, service, server_config, shutdown, Some(metrics)).await?;

    info!("Coupe gate stopped");
    Ok(())
}

/// Cancel `shutdown` on SIGINT or SIGTERM.
fn spawn_signal_handlers(shutdown: CancellationToken, readiness: Arc<Readiness>) {
    let sigint_shutdown = shutdown.clone();
    let sigint_readiness = readiness.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
                sigint_readiness.mark_draining();
                sigint_shutdown.cancel();
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGINT");
            }
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received SIGTERM, initiating graceful shutdown");
                readiness.mark_draining();
                shutdown.cancel();
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
            }
        }
    });
}
