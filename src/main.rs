//! CLI entry point: thin commands over the orchestrator.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use social_collection_backend::services::task_parser::parse_task_data;
use social_collection_backend::{
    create_router, AdapterRegistry, AppState, Orchestrator, RunConfig, StatsPeriod, TaskStatus,
};

#[derive(Parser)]
#[command(
    name = "social-collection-backend",
    about = "Information and process commands for platform collection"
)]
struct Cli {
    /// Path to the run config; falls back to the RUN_CONFIG env var.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize the meta store and register all configured platforms.
    Init,
    /// Post counts and task statuses of all configured stores.
    Status {
        #[arg(long, default_value_t = true)]
        task_status: bool,
    },
    /// Per-store post counts bucketed by day, month, or year.
    DbStats {
        #[arg(long, default_value = "day")]
        period: String,
        /// Limit the report to one platform.
        #[arg(long)]
        platform: Option<String>,
    },
    /// Reset all tasks that are neither DONE nor INIT back to INIT.
    ResetUndoneTasks {
        #[arg(long)]
        platforms: Vec<String>,
    },
    /// List post or task overlaps between two store files.
    CheckConflicts {
        #[arg(long, value_parser = ["post", "task"])]
        item_type: String,
        db1: PathBuf,
        db2: PathBuf,
    },
    /// Merge the non-conflicting rows of one store file into another.
    MergeDbs { src_db: PathBuf, target_db: PathBuf },
    /// Submit a task file.
    Submit { file: PathBuf },
    /// Run one collection pass, or loop forever.
    Collect {
        #[arg(long)]
        run_forever: bool,
    },
    /// Serve the HTTP surface and run the collection loop.
    Serve {
        #[arg(long, default_value_t = 3000)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "unrecoverable error");
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // the two store-file commands work without a run config
    match &cli.command {
        Command::CheckConflicts {
            item_type,
            db1,
            db2,
        } => {
            let conflicts = if item_type == "post" {
                social_collection_backend::find_conflicting_posts(db1, db2).await?
            } else {
                social_collection_backend::find_conflicting_tasks(db1, db2).await?
            };
            println!("{}", serde_json::to_string_pretty(&conflicts)?);
            return Ok(());
        }
        Command::MergeDbs { src_db, target_db } => {
            let stats = social_collection_backend::merge_stores(src_db, target_db).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            return Ok(());
        }
        _ => {}
    }

    let config = match &cli.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::from_env()?,
    };
    let registry = AdapterRegistry::with_builtins();
    let orchestrator = Arc::new(Orchestrator::bootstrap(config, &registry).await?);

    match cli.command {
        // handled above, before the orchestrator boot
        Command::CheckConflicts { .. } | Command::MergeDbs { .. } => {}
        Command::Init => {
            for entry in orchestrator.meta().list_databases().await? {
                println!("{}\t{}", entry.platform, entry.db_path);
            }
        }
        Command::Status { task_status } => {
            let rows = orchestrator.meta().general_status(task_status).await?;
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        Command::DbStats { period, platform } => {
            let period: StatsPeriod = period
                .parse()
                .map_err(|err: String| anyhow::anyhow!(err))?;
            for (name, manager) in orchestrator.managers() {
                if platform.as_ref().is_some_and(|p| p != name) {
                    continue;
                }
                println!("{name}:");
                for bucket in manager.store().count_posts_by_period(period).await? {
                    println!("  {}\t{}", bucket.period, bucket.count);
                }
            }
        }
        Command::ResetUndoneTasks { platforms } => {
            for (name, manager) in orchestrator.managers() {
                if !platforms.is_empty() && !platforms.contains(name) {
                    continue;
                }
                let stuck = manager
                    .store()
                    .get_tasks_of_states(&[TaskStatus::Done, TaskStatus::Init], true)
                    .await?;
                let ids: Vec<i64> = stuck.iter().map(|t| t.id).collect();
                let reset = manager.store().reset_task_states(&ids).await?;
                println!("{name}: reset {reset} tasks");
            }
        }
        Command::Submit { file } => {
            let raw = std::fs::read_to_string(&file)?;
            let payload: serde_json::Value = serde_json::from_str(&raw)?;
            let tasks = parse_task_data(&payload)?;
            let (added, all_added) = orchestrator.add_tasks(tasks).await?;
            println!("added {} tasks: {:?}", added.len(), added);
            if !all_added {
                println!("warning: not all tasks were added");
            }
        }
        Command::Collect { run_forever } => {
            if run_forever {
                let mut loop_handle = {
                    let orchestrator = Arc::clone(&orchestrator);
                    tokio::spawn(async move { orchestrator.run_collect_loop().await })
                };
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("shutdown requested");
                        orchestrator.shutdown();
                        loop_handle.await??;
                    }
                    result = &mut loop_handle => result??,
                }
            } else {
                let reports = orchestrator.collect().await?;
                println!("{}", serde_json::to_string_pretty(&reports)?);
            }
        }
        Command::Serve { port } => {
            let loop_handle = {
                let orchestrator = Arc::clone(&orchestrator);
                tokio::spawn(async move { orchestrator.run_collect_loop().await })
            };

            let app = create_router(AppState {
                orchestrator: Arc::clone(&orchestrator),
            });
            let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
            tracing::info!(port, "http surface listening");
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    tokio::signal::ctrl_c().await.ok();
                })
                .await?;

            orchestrator.shutdown();
            loop_handle.await??;
        }
    }
    Ok(())
}
