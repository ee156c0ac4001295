use cadence_scheduler::{
    HandlerResult, Job, JobFilter, JobStatus, Recurring, Scheduler, SchedulerConfig,
};
use tracing::info;

const HEARTBEAT: &str = "heartbeat";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cadence_scheduler=info,cadence_daemon=info".into()),
        )
        .init();

    // load config: CADENCE_CONFIG env > ~/.cadence/cadence.toml
    let config_path = std::env::var("CADENCE_CONFIG").ok();
    let config = SchedulerConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        SchedulerConfig::default()
    });
    if let Some(path) = &config.database_path {
        ensure_parent_dir(path);
    }

    let scheduler = Scheduler::from_config(&config)?;
    scheduler.define(HEARTBEAT, heartbeat);

    // A persistent store may already hold the heartbeat from a previous run.
    let existing = scheduler.list(
        &JobFilter::new()
            .name(HEARTBEAT)
            .status(JobStatus::Pending),
    )?;
    if existing.is_empty() {
        let data = serde_json::json!({ "message": "still alive" });
        scheduler.schedule(
            Recurring::every("1 minute"),
            HEARTBEAT,
            data.as_object().cloned(),
        )?;
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let engine = tokio::spawn(scheduler.clone().run(shutdown_rx));
    info!("cadence daemon running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;

    // signal scheduler to stop
    let _ = shutdown_tx.send(true);
    engine.await?;
    Ok(())
}

fn heartbeat(job: &Job) -> HandlerResult {
    let message = job
        .data
        .get("message")
        .and_then(|v| v.as_str())
        .unwrap_or("tick");
    info!(job_id = %job.id_str(), last_run_at = ?job.last_run_at, "{message}");
    Ok(())
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
