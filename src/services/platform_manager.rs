//! Per-platform manager: one adapter, one store, one sequential task loop.
//!
//! Within a platform there is at most one in-flight adapter call; isolation
//! between platforms comes from each manager owning its store and adapter
//! exclusively for the process lifetime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::ClientSettings;
use crate::db::PlatformStore;
use crate::error::{AdapterError, CollectError, Result};
use crate::models::{CollectionResult, CollectionTask, NewPost, NewTask, TaskStatus};
use crate::services::adapter::ClientAdapter;
use crate::services::quota::QuotaRegistry;
use crate::services::sink::PostSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Idle,
    Running,
}

/// Per-task outcome of one `process_all_tasks` pass.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TaskOutcome {
    Collected {
        task_name: String,
        found: u32,
        added: usize,
    },
    Failed {
        task_name: String,
        error: String,
    },
    QuotaHalted {
        task_name: String,
        release_at: DateTime<Utc>,
    },
}

impl TaskOutcome {
    pub fn task_name(&self) -> &str {
        match self {
            TaskOutcome::Collected { task_name, .. }
            | TaskOutcome::Failed { task_name, .. }
            | TaskOutcome::QuotaHalted { task_name, .. } => task_name,
        }
    }

    pub fn posts_added(&self) -> usize {
        match self {
            TaskOutcome::Collected { added, .. } => *added,
            _ => 0,
        }
    }
}

pub struct PlatformManager {
    platform: String,
    client: Arc<dyn ClientAdapter>,
    store: PlatformStore,
    settings: ClientSettings,
    quotas: QuotaRegistry,
    sink: Option<PostSink>,
    active: AtomicBool,
    client_ready: AtomicBool,
    /// One-shot override of a quota halt persisted by a previous run.
    ignore_initial_halt: AtomicBool,
    current_quota_halt: RwLock<Option<DateTime<Utc>>>,
    run_state: RwLock<RunState>,
}

impl PlatformManager {
    pub fn new(
        platform: String,
        client: Arc<dyn ClientAdapter>,
        store: PlatformStore,
        settings: ClientSettings,
        quotas: QuotaRegistry,
        sink: Option<PostSink>,
    ) -> Self {
        let active = settings.progress;
        let ignore_initial_halt = settings.ignore_initial_quota_halt;
        PlatformManager {
            platform,
            client,
            store,
            settings,
            quotas,
            sink,
            active: AtomicBool::new(active),
            client_ready: AtomicBool::new(false),
            ignore_initial_halt: AtomicBool::new(ignore_initial_halt),
            current_quota_halt: RwLock::new(None),
            run_state: RwLock::new(RunState::Idle),
        }
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn store(&self) -> &PlatformStore {
        &self.store
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Relaxed);
    }

    pub fn run_state(&self) -> RunState {
        *self.run_state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Attach the adapter-serialized provider config to each task and insert
    /// the batch. A task whose abstract config fails adapter validation is
    /// persisted as `INVALID_CONF` (visible to the operator) but never
    /// enqueued.
    pub async fn add_tasks(&self, tasks: Vec<NewTask>) -> Result<Vec<String>> {
        let mut prepared = Vec::with_capacity(tasks.len());
        for mut task in tasks {
            match self
                .client
                .transform_config_to_serializable(&task.collection_config)
            {
                Ok(serialized) => task.platform_config = Some(serialized),
                Err(err) => {
                    tracing::warn!(
                        platform = %self.platform,
                        task = %task.task_name,
                        error = %err,
                        "abstract config failed adapter validation"
                    );
                    task.platform_config = None;
                    task.status = TaskStatus::InvalidConf;
                }
            }
            prepared.push(task);
        }
        self.store.add_tasks(&prepared).await
    }

    pub async fn reset_running_tasks(&self) -> Result<u64> {
        let reset = self.store.reset_running_tasks().await?;
        if reset > 0 {
            tracing::info!(
                platform = %self.platform,
                tasks = reset,
                "reset tasks left RUNNING by an earlier shutdown"
            );
        }
        Ok(reset)
    }

    /// Active quota halt, if any. An expired halt is cleared from the
    /// registry on observation.
    pub fn has_quota_halt(&self) -> Option<DateTime<Utc>> {
        let halt = *self
            .current_quota_halt
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let until = halt?;
        if Utc::now() < until {
            return Some(until);
        }
        *self
            .current_quota_halt
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
        if let Err(err) = self.quotas.remove_quota(&self.platform) {
            tracing::warn!(platform = %self.platform, error = %err, "failed to clear expired quota record");
        }
        None
    }

    /// One pass over the pending queue, FIFO, with pacing and quota
    /// handling. Cancellation puts the in-flight task back to `INIT` and
    /// preserves already-committed results.
    pub async fn process_all_tasks(&self, cancel: &CancellationToken) -> Result<Vec<TaskOutcome>> {
        *self.run_state.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = RunState::Running;
        let result = self.run_pending(cancel).await;
        *self.run_state.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = RunState::Idle;
        result
    }

    async fn run_pending(&self, cancel: &CancellationToken) -> Result<Vec<TaskOutcome>> {
        self.reload_quota_halt()?;
        if let Some(until) = self.has_quota_halt() {
            tracing::info!(
                platform = %self.platform,
                release_at = %until.format("%Y.%m.%d - %H:%M"),
                "progress deactivated due to quota halt"
            );
            return Ok(Vec::new());
        }

        if !self.client_ready.load(Ordering::Acquire) {
            if let Err(err) = self.client.setup().await {
                tracing::warn!(
                    platform = %self.platform,
                    error = %err,
                    "client setup failed; retrying next pass"
                );
                return Ok(Vec::new());
            }
            self.client_ready.store(true, Ordering::Release);
        }

        let tasks = self.store.pending_tasks(false).await?;
        tracing::debug!(platform = %self.platform, queued = tasks.len(), "task queue");
        if tasks.is_empty() {
            return Ok(Vec::new());
        }

        let total = tasks.len();
        let mut outcomes = Vec::new();
        for (idx, task) in tasks.into_iter().enumerate() {
            if cancel.is_cancelled() {
                break;
            }
            tracing::debug!(
                platform = %self.platform,
                task = %task.task_name,
                position = idx + 1,
                total,
                "processing task"
            );

            let execution_ts = Utc::now();
            self.store.mark_task_running(task.id, execution_ts).await?;

            let executed = if task.has_test_data() {
                Ok(self.synthesize_result(&task, execution_ts))
            } else {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        self.store.update_task_status(task.id, TaskStatus::Init).await?;
                        tracing::info!(
                            platform = %self.platform,
                            task = %task.task_name,
                            "canceled; in-flight task returned to INIT"
                        );
                        break;
                    }
                    result = self.client.execute_task(&task) => result,
                }
            };

            match executed {
                Ok(result) => {
                    let inserted = self.store.insert_posts(&result).await?;
                    if let Some(sink) = &self.sink {
                        if !inserted.added.is_empty() {
                            sink.send_posts(&inserted.added).await;
                        }
                    }
                    outcomes.push(TaskOutcome::Collected {
                        task_name: task.task_name.clone(),
                        found: result.collected_items,
                        added: inserted.added.len(),
                    });
                }
                Err(AdapterError::QuotaExceeded { release_at }) => {
                    tracing::warn!(
                        platform = %self.platform,
                        task = %task.task_name,
                        release_at = %release_at,
                        "quota exceeded; halting platform"
                    );
                    *self
                        .current_quota_halt
                        .write()
                        .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(release_at);
                    self.quotas.store_quota(&self.platform, release_at)?;
                    self.store.update_task_status(task.id, TaskStatus::Init).await?;
                    outcomes.push(TaskOutcome::QuotaHalted {
                        task_name: task.task_name.clone(),
                        release_at,
                    });
                    break;
                }
                Err(AdapterError::InvalidConfig { reason }) => {
                    tracing::warn!(
                        platform = %self.platform,
                        task = %task.task_name,
                        reason = %reason,
                        "provider rejected the task config"
                    );
                    self.store
                        .update_task_status(task.id, TaskStatus::InvalidConf)
                        .await?;
                    outcomes.push(TaskOutcome::Failed {
                        task_name: task.task_name.clone(),
                        error: reason,
                    });
                }
                Err(AdapterError::Collection { reason }) => {
                    tracing::warn!(
                        platform = %self.platform,
                        task = %task.task_name,
                        error = %reason,
                        "collection failed; continuing with next task"
                    );
                    self.store
                        .update_task_status(task.id, TaskStatus::Aborted)
                        .await?;
                    outcomes.push(TaskOutcome::Failed {
                        task_name: task.task_name.clone(),
                        error: reason,
                    });
                }
                Err(AdapterError::Fatal { reason }) => {
                    self.store
                        .update_task_status(task.id, TaskStatus::Aborted)
                        .await?;
                    tracing::error!(
                        platform = %self.platform,
                        task = %task.task_name,
                        error = %reason,
                        "fatal adapter error"
                    );
                    return Err(CollectError::fatal(reason));
                }
            }

            if idx + 1 < total {
                let delay = self.pacing_delay_secs();
                if delay > 0 {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(std::time::Duration::from_secs(delay)) => {}
                    }
                }
            }
        }

        Ok(outcomes)
    }

    fn reload_quota_halt(&self) -> Result<()> {
        let persisted = self.quotas.get(&self.platform)?;
        if persisted.is_some() && self.ignore_initial_halt.swap(false, Ordering::AcqRel) {
            tracing::info!(
                platform = %self.platform,
                "ignoring persisted quota halt once"
            );
            *self
                .current_quota_halt
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
            return Ok(());
        }
        *self
            .current_quota_halt
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = persisted;
        Ok(())
    }

    fn pacing_delay_secs(&self) -> u64 {
        let jitter = if self.settings.delay_randomize > 0 {
            rand::thread_rng().gen_range(0..=self.settings.delay_randomize)
        } else {
            0
        };
        self.settings.request_delay + jitter
    }

    /// Build a collection result from inline test data, bypassing the
    /// external API entirely.
    fn synthesize_result(
        &self,
        task: &CollectionTask,
        execution_ts: DateTime<Utc>,
    ) -> CollectionResult {
        let items = task.test_data.clone().unwrap_or_default();
        let posts: Vec<NewPost> = items
            .iter()
            .map(|raw| self.client.create_post_entry(raw.clone(), task))
            .collect();
        CollectionResult {
            task_id: task.id,
            task_name: task.task_name.clone(),
            platform: self.platform.clone(),
            transient: task.transient,
            collected_items: posts.len() as u32,
            duration_ms: 0,
            execution_ts,
            posts,
            users: Vec::new(),
        }
    }
}
