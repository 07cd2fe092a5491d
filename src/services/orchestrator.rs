//! Central orchestrator: boots the platform managers from the run config,
//! drives the periodic collection loop, and reports status.
//!
//! Constructed once at program entry and passed by reference; platform
//! stores are created here and never re-created.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::RunConfig;
use crate::db::{MetaStore, PlatformStore};
use crate::error::Result;
use crate::models::NewTask;
use crate::services::platform_manager::{PlatformManager, RunState, TaskOutcome};
use crate::services::quota::QuotaRegistry;
use crate::services::registry::AdapterRegistry;
use crate::services::sink::PostSink;
use crate::services::task_manager::TaskManager;

/// Per-platform result of one collection pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlatformReport {
    pub task_names: Vec<String>,
    pub posts_added: usize,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct PlatformStatus {
    pub run_state: RunState,
    pub active: bool,
}

pub struct Orchestrator {
    config: RunConfig,
    meta: MetaStore,
    managers: Arc<BTreeMap<String, Arc<PlatformManager>>>,
    task_manager: TaskManager,
    shutdown: CancellationToken,
    current_pass: RwLock<CancellationToken>,
}

impl Orchestrator {
    /// Boot all platform managers: catalog-register every configured
    /// platform, open its store, resolve its adapter, and recover tasks left
    /// `RUNNING` by an abrupt shutdown.
    pub async fn bootstrap(config: RunConfig, registry: &AdapterRegistry) -> Result<Self> {
        config.ensure_directories()?;
        let meta = MetaStore::open(&config.meta_db_path(), true).await?;
        let quota_file = config.quota_file();
        let sink = config.sink.as_ref().and_then(PostSink::new);

        let mut managers = BTreeMap::new();
        for (platform, settings) in &config.clients {
            let db_path = config
                .platform_db_path(platform)
                .map_err(|err| crate::error::CollectError::configuration(err.to_string()))?;
            meta.add_database(platform, &db_path, true).await?;

            let store = PlatformStore::open(platform, &db_path, true).await?;
            let adapter = registry.build(platform, settings)?;
            let manager = PlatformManager::new(
                platform.clone(),
                adapter,
                store,
                settings.clone(),
                QuotaRegistry::new(quota_file.clone()),
                sink.clone(),
            );
            manager.reset_running_tasks().await?;
            managers.insert(platform.clone(), Arc::new(manager));
            tracing::debug!(platform = %platform, "initialized platform manager");
        }

        let managers = Arc::new(managers);
        let task_manager = TaskManager::new(
            Arc::clone(&managers),
            config.tasks_dir(),
            config.processed_tasks_dir(),
            config.move_processed_tasks,
        );

        let shutdown = CancellationToken::new();
        let current_pass = RwLock::new(shutdown.child_token());
        Ok(Orchestrator {
            config,
            meta,
            managers,
            task_manager,
            shutdown,
            current_pass,
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn meta(&self) -> &MetaStore {
        &self.meta
    }

    pub fn task_manager(&self) -> &TaskManager {
        &self.task_manager
    }

    pub fn managers(&self) -> &BTreeMap<String, Arc<PlatformManager>> {
        &self.managers
    }

    pub fn manager(&self, platform: &str) -> Option<&Arc<PlatformManager>> {
        self.managers.get(platform)
    }

    /// One collection pass: ingest new task files, recover stuck tasks, then
    /// progress every active platform concurrently.
    pub async fn collect(&self) -> Result<BTreeMap<String, PlatformReport>> {
        let ingested = self.task_manager.check_new_client_tasks().await?;
        if !ingested.is_empty() {
            tracing::info!(count = ingested.len(), "collection pass starts with new tasks");
        }
        self.reset_stuck_tasks().await?;
        self.progress_tasks(None).await
    }

    /// Launch every active manager's task loop concurrently and wait for all
    /// of them.
    pub async fn progress_tasks(
        &self,
        platforms: Option<&[String]>,
    ) -> Result<BTreeMap<String, PlatformReport>> {
        let pass = self.shutdown.child_token();
        *self
            .current_pass
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = pass.clone();

        let mut names = Vec::new();
        let mut futures = Vec::new();
        for (platform, manager) in self.managers.iter() {
            if let Some(filter) = platforms {
                if !filter.contains(platform) {
                    continue;
                }
            }
            if !manager.is_active() {
                tracing::info!(platform = %platform, "progress deactivated for platform");
                continue;
            }
            let manager = Arc::clone(manager);
            let token = pass.clone();
            names.push(platform.clone());
            futures.push(async move { manager.process_all_tasks(&token).await });
        }

        let results = futures::future::join_all(futures).await;

        let mut reports = BTreeMap::new();
        for (platform, result) in names.into_iter().zip(results) {
            let outcomes: Vec<TaskOutcome> = result.map_err(|err| {
                tracing::error!(platform = %platform, error = %err, "platform loop failed");
                err
            })?;
            let report = PlatformReport {
                posts_added: outcomes.iter().map(TaskOutcome::posts_added).sum(),
                task_names: outcomes
                    .iter()
                    .map(|o| o.task_name().to_string())
                    .collect(),
            };
            reports.insert(platform, report);
        }
        Ok(reports)
    }

    /// Delegate `RUNNING -> INIT` recovery to every manager.
    pub async fn reset_stuck_tasks(&self) -> Result<u64> {
        let mut total = 0;
        for manager in self.managers.values() {
            total += manager.reset_running_tasks().await?;
        }
        Ok(total)
    }

    /// Collect, sleep, repeat until shutdown. A fatal error from any
    /// platform loop ends the collection loop.
    pub async fn run_collect_loop(&self) -> Result<()> {
        tracing::info!(
            interval_secs = self.config.collect_interval_secs,
            "collection loop started"
        );
        loop {
            if self.shutdown.is_cancelled() {
                break;
            }
            let reports = self.collect().await.map_err(|err| {
                tracing::error!(error = %err, "collection pass failed; leaving collection loop");
                err
            })?;
            tracing::debug!(platforms = reports.len(), "collection pass finished");

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_secs(self.config.collect_interval_secs)) => {}
            }
        }
        tracing::info!("collection loop stopped");
        Ok(())
    }

    /// Cancel every in-flight per-platform loop of the current pass.
    /// In-flight tasks return to `INIT`; committed results are preserved.
    pub fn abort_tasks(&self) {
        self.current_pass
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .cancel();
    }

    /// Stop the collection loop and abort the current pass.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Submit already-parsed tasks (HTTP surface and CLI).
    pub async fn add_tasks(&self, tasks: Vec<NewTask>) -> Result<(Vec<String>, bool)> {
        self.task_manager.add_tasks(tasks).await
    }

    pub fn status(&self) -> BTreeMap<String, PlatformStatus> {
        self.managers
            .iter()
            .map(|(platform, manager)| {
                (
                    platform.clone(),
                    PlatformStatus {
                        run_state: manager.run_state(),
                        active: manager.is_active(),
                    },
                )
            })
            .collect()
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("platforms", &self.managers.keys().collect::<Vec<_>>())
            .finish()
    }
}
