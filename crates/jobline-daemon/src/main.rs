use std::sync::Arc;

use clap::Parser;
use jobline_core::JoblineConfig;
use jobline_invoke::{ComponentRegistry, Invoker};
use jobline_scheduler::{
    schedule, Executor, Scheduler, ShutdownMode, SqliteLogSink, TracingSink,
};
use tokio::sync::watch;
use tracing::{error, info, warn};

mod cli;
mod demo;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "jobline=info,jobline_scheduler=info,jobline_invoke=info".into()
            }),
        )
        .init();

    let cli = Cli::parse();

    // load config: --config > JOBLINE_CONFIG env > ~/.jobline/jobline.toml
    let config_path = cli.config.clone().or_else(|| std::env::var("JOBLINE_CONFIG").ok());
    let config = JoblineConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!(code = e.code(), "Config load failed ({}), using defaults", e);
        JoblineConfig::default()
    });

    let registry = Arc::new(ComponentRegistry::new(&config.registry));
    demo::register(&registry)?;
    info!(components = ?registry.names(), "component registry ready");
    let invoker = Invoker::new(registry);

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config, invoker).await,
        Command::Check { count } => check(&config, &invoker, count),
    }
}

async fn run(config: JoblineConfig, invoker: Invoker) -> anyhow::Result<()> {
    let mut executor = Executor::new(invoker).with_sink(Arc::new(TracingSink));

    if config.database.enabled {
        let db_path = &config.database.path;
        ensure_parent_dir(db_path);
        info!(path = %db_path, "opening SQLite database");
        let db = rusqlite::Connection::open(db_path)?;
        db.execute_batch("PRAGMA journal_mode=WAL;")?;
        executor = executor.with_sink(Arc::new(SqliteLogSink::new(db)?));
    }

    let scheduler = Scheduler::new(config.scheduler.clone(), executor);
    for definition in config.jobs.iter().cloned() {
        let key = definition.key();
        if let Err(e) = scheduler.add_job(definition) {
            error!(job = %key, code = e.code(), "job not registered: {e}");
        }
    }
    info!(jobs = scheduler.list_jobs().len(), "jobs registered");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ticker = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run(shutdown_rx).await })
    };

    tokio::signal::ctrl_c().await?;
    info!("ctrl-c received");
    let _ = shutdown_tx.send(true);
    ticker.await?;

    let mode = if config.scheduler.wait_for_jobs_on_shutdown {
        ShutdownMode::Graceful
    } else {
        ShutdownMode::Forced
    };
    scheduler.shutdown(mode).await;
    Ok(())
}

/// Print each configured job with its validation status and upcoming fire
/// times. Fails when any job is invalid.
fn check(config: &JoblineConfig, invoker: &Invoker, count: usize) -> anyhow::Result<()> {
    let mut invalid = 0;
    let mut report = Vec::with_capacity(config.jobs.len());

    for definition in &config.jobs {
        let fire_times = schedule::next_fire_times(&definition.cron, count);
        let target = invoker.check(&definition.target);

        let mut entry = serde_json::json!({
            "job": definition.key().to_string(),
            "cron": definition.cron,
            "target": definition.target,
            "status": definition.status.to_string(),
            "misfire": definition.misfire.to_string(),
            "concurrent": definition.concurrent,
        });
        match fire_times {
            Ok(times) => entry["next_fire_times"] = serde_json::json!(times),
            Err(e) => {
                invalid += 1;
                entry["cron_error"] = serde_json::json!(e.to_string());
            }
        }
        match target {
            Ok(resolved) => {
                entry["resolved"] = serde_json::json!(format!(
                    "{}.{}{}",
                    resolved.component,
                    resolved.method.name(),
                    resolved.method.signature()
                ))
            }
            Err(e) => {
                invalid += 1;
                entry["target_error"] = serde_json::json!({
                    "stage": e.stage().to_string(),
                    "message": e.to_string(),
                });
            }
        }
        report.push(entry);
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    if invalid > 0 {
        anyhow::bail!("{invalid} problem(s) found in configured jobs");
    }
    Ok(())
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
