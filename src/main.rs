use index_build_cluster::config::{
    CoordinatorConfig, DEFAULT_COORDINATOR_PORT, DEFAULT_WORKER_PORT, Domain, WorkerConfig,
};
use index_build_cluster::executor::builder::CommandIndexer;
use index_build_cluster::executor::handlers as worker_handlers;
use index_build_cluster::executor::manager::JobManager;
use index_build_cluster::executor::pipeline::BuildPipeline;
use index_build_cluster::membership::bootstrap::{register_with_coordinator, resolve_advertise_host};
use index_build_cluster::membership::handlers as coordinator_handlers;
use index_build_cluster::membership::heartbeat::HeartbeatMonitor;
use index_build_cluster::membership::registry::WorkerRegistry;
use index_build_cluster::membership::service::WorkerService;
use index_build_cluster::transfer::TransferManager;
use index_build_cluster::transfer::s3::S3Storage;

use anyhow::Context;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Coordinator,
    Worker,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        // .with_max_level(tracing::Level::DEBUG)
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <coordinator|worker> [--bind <addr:port>]", args[0]);
        eprintln!("Example: {} coordinator --bind 0.0.0.0:{}", args[0], DEFAULT_COORDINATOR_PORT);
        eprintln!("Example: {} worker --bind 0.0.0.0:{}", args[0], DEFAULT_WORKER_PORT);

        std::process::exit(1);
    }

    let role = match args[1].as_str() {
        "coordinator" => Role::Coordinator,
        "worker" => Role::Worker,
        other => anyhow::bail!("Unknown role '{}', expected 'coordinator' or 'worker'", other),
    };

    let mut bind_addr: Option<SocketAddr> = None;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" => {
                let value = args.get(i + 1).context("--bind needs a value")?;
                bind_addr = Some(value.parse().with_context(|| format!("Invalid --bind {}", value))?);
                i += 2;
            }
            _ => {
                i += 1;
            }
        }
    }

    let bind_addr = bind_addr.unwrap_or_else(|| {
        let port = match role {
            Role::Coordinator => DEFAULT_COORDINATOR_PORT,
            Role::Worker => DEFAULT_WORKER_PORT,
        };
        SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port)
    });

    match role {
        Role::Coordinator => run_coordinator(bind_addr).await,
        Role::Worker => run_worker(bind_addr).await,
    }
}

async fn run_coordinator(bind_addr: SocketAddr) -> anyhow::Result<()> {
    let config = CoordinatorConfig::from_env()?;
    tracing::info!("Starting coordinator on {} ({:?})", bind_addr, config.domain);

    // 1. Membership:
    let registry = WorkerRegistry::new();
    let service = WorkerService::new(registry.clone(), config.worker_request_timeout);

    if config.domain == Domain::Dev {
        service.load_seed_file(&config.seed_file).await?;
    } else {
        tracing::info!("Starting with an empty worker pool; waiting for registrations");
    }

    // 2. Heartbeat monitor:
    let heartbeat = HeartbeatMonitor::new(registry, config.heartbeat_interval, config.heartbeat_timeout).spawn();

    // 3. HTTP server:
    let app = coordinator_handlers::router(service);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("HTTP server listening on {}", bind_addr);
    tracing::info!("Press Ctrl+C to shutdown");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    heartbeat.stop().await;
    Ok(())
}

async fn run_worker(bind_addr: SocketAddr) -> anyhow::Result<()> {
    let config = WorkerConfig::from_env()?;
    tracing::info!(
        "Starting worker on {} (build type {}, {} job slots)",
        bind_addr,
        config.build_type,
        config.job_concurrency
    );

    // 1. Transfer + build pipeline:
    let storage = Arc::new(S3Storage::new(config.aws_region.clone()));
    let transfer = TransferManager::new(storage, config.transfer.clone());
    let constructor = Arc::new(CommandIndexer::new(config.builder_command.clone(), config.build_type));
    let pipeline = Arc::new(BuildPipeline::new(transfer, constructor, config.build_type));

    // 2. Job manager:
    let manager = JobManager::new(pipeline, config.job_concurrency);

    // 3. HTTP server, started before registering so the first heartbeat finds us:
    let app = worker_handlers::router(manager);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!("HTTP server listening on {}", local_addr);

    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
    });

    // 4. Self-registration:
    if config.register_with_coordinator {
        let coordinator = config
            .coordinator
            .as_ref()
            .context("COORDINATOR_NODE_URL value is empty")?;
        let host = resolve_advertise_host(config.advertise_host.as_deref(), local_addr, coordinator).await?;
        register_with_coordinator(coordinator, &host, local_addr.port()).await?;
    }

    tracing::info!("Press Ctrl+C to shutdown");
    server.await??;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
