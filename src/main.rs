use std::sync::Arc;

use timetask::api::scheduler_routes;
use timetask::config::SchedulerConfig;
use timetask::observe::{ObservabilitySink, TracingSink};
use timetask::pool::WorkerPool;
use timetask::scheduler::TaskRegistry;
use timetask::targets::TargetLocator;
use timetask::targets::builtin::HeartbeatTarget;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = SchedulerConfig::from_env()?;

    let port: u16 = std::env::var("TASK_SCHEDULER_HTTP_PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()
        .unwrap_or(8080);

    eprintln!("⏰ timetask v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://0.0.0.0:{}/task-scheduler", port);
    eprintln!(
        "   Pool: {} slots, queue {}, policy {}",
        config.pool_size, config.queue_capacity, config.overload_policy
    );

    let sink: Arc<dyn ObservabilitySink> = Arc::new(TracingSink);
    let pool = Arc::new(WorkerPool::new(config, Arc::clone(&sink)));

    // ── Targets ──────────────────────────────────────────────────────────
    let locator = Arc::new(TargetLocator::new());
    locator.register_sync(Arc::new(HeartbeatTarget::new()));
    eprintln!("   Targets: {} registered\n", locator.count());

    let registry = Arc::new(TaskRegistry::new(locator, pool, sink));

    // ── HTTP API ─────────────────────────────────────────────────────────
    let app = scheduler_routes(Arc::clone(&registry));
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    tracing::info!(port, "task scheduler API started");

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    registry.shutdown_all().await;
    Ok(())
}
