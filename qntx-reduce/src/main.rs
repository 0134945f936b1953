use clap::Parser;
use qntx_reduce_plugin::proto::projection_service_server::ProjectionServiceServer;
use qntx_reduce_plugin::{registry, PluginConfig, ProjectionPluginService};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "qntx-reduce-plugin")]
#[command(about = "QNTX projection plugin (UMAP, t-SNE, PCA)")]
#[command(version)]
struct Args {
    /// gRPC server port
    #[arg(short, long, default_value = "9001")]
    port: u16,

    /// gRPC server address (overrides port)
    #[arg(short, long)]
    address: Option<String>,

    /// Log level (debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    log_level: String,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Maximum concurrent projections (overrides config)
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// Per-projection deadline in milliseconds (overrides config)
    #[arg(long)]
    timeout_ms: Option<u64>,
}

/// Max port retries when the requested port is occupied (multi-session conflicts).
const MAX_PORT_RETRIES: u16 = 10;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("PANIC: Plugin panicked during startup or execution");
        eprintln!(
            "  Location: {}",
            panic_info
                .location()
                .map(|l| l.to_string())
                .unwrap_or_else(|| "unknown".to_string())
        );
        eprintln!(
            "  Message: {}",
            panic_info
                .payload()
                .downcast_ref::<&str>()
                .unwrap_or(&"<no message>")
        );
    }));

    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level.as_str()));

    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    info!("Initializing QNTX Reduce Plugin");
    info!("  Version: {}", env!("CARGO_PKG_VERSION"));

    let config = match &args.config {
        Some(path) => {
            info!("  Config: {}", path.display());
            PluginConfig::load(path)?
        }
        None => PluginConfig::default(),
    }
    .with_overrides(args.max_concurrent, args.timeout_ms);
    config.validate()?;

    // Bind with port retry to handle multi-session port conflicts.
    let listener = if let Some(address) = args.address {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| format!("Invalid address '{}': {}", address, e))?;
        TcpListener::bind(addr).await?
    } else {
        let mut port = args.port;
        let mut last_err = None;
        let mut bound = None;
        for _ in 0..MAX_PORT_RETRIES {
            let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;
            match TcpListener::bind(addr).await {
                Ok(l) => {
                    bound = Some(l);
                    break;
                }
                Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                    warn!("Port {} in use, trying {}", port, port.saturating_add(1));
                    last_err = Some(e);
                    port = port.saturating_add(1);
                }
                Err(e) => return Err(e.into()),
            }
        }
        bound.ok_or_else(|| {
            format!(
                "failed to bind after {} attempts (last port {}): {}",
                MAX_PORT_RETRIES,
                port,
                last_err.map_or_else(|| "no attempt made".to_string(), |e| e.to_string())
            )
        })?
    };

    let local_addr = listener.local_addr()?;

    // The plugin manager reads the bound port from stdout, not from the log stream.
    println!("QNTX_PLUGIN_PORT={}", local_addr.port());

    let registry = registry();
    info!("  Algorithms: {}", registry.names().join(", "));

    let max_message_bytes = config.service.max_message_bytes;
    let service = ProjectionPluginService::from_config(&config, registry);
    info!(
        "  Max concurrent projections: {}",
        service.handlers().max_concurrent()
    );

    info!("Starting gRPC server on {}", local_addr);

    let incoming = TcpListenerStream::new(listener);
    Server::builder()
        .add_service(
            ProjectionServiceServer::new(service)
                .max_decoding_message_size(max_message_bytes)
                .max_encoding_message_size(max_message_bytes),
        )
        .serve_with_incoming_shutdown(incoming, shutdown_signal())
        .await?;

    info!("Plugin shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        }
    }
}
