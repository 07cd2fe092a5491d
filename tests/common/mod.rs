//! Shared helpers for the integration suites: a scripted adapter and
//! orchestrator construction over temp-dir stores.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tempfile::TempDir;

use social_collection_backend::{
    AdapterError, AdapterRegistry, ClientAdapter, CollectConfig, CollectionResult,
    CollectionTask, FixtureAdapter, NewPost, NewUser, Orchestrator, RunConfig,
};

/// One scripted answer of the fake provider, consumed in FIFO order.
#[allow(dead_code)]
pub enum ScriptedResponse {
    Items(Vec<Value>),
    Quota(DateTime<Utc>),
    Error(String),
    Fatal(String),
    /// Never resolves; the caller must be cancelled from outside.
    Hang,
}

/// Adapter whose `execute_task` pops pre-seeded responses. Post mapping is
/// delegated to a [`FixtureAdapter`] so scripted and fixture runs produce
/// identical rows.
pub struct ScriptedAdapter {
    inner: FixtureAdapter,
    responses: Mutex<VecDeque<ScriptedResponse>>,
    calls: AtomicUsize,
    reject_transform: bool,
}

#[allow(dead_code)]
impl ScriptedAdapter {
    pub fn new(platform: &str, responses: Vec<ScriptedResponse>) -> Arc<Self> {
        Arc::new(ScriptedAdapter {
            inner: FixtureAdapter::new(platform, Vec::new()),
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
            reject_transform: false,
        })
    }

    /// Adapter that rejects every abstract config at validation time.
    pub fn rejecting(platform: &str) -> Arc<Self> {
        Arc::new(ScriptedAdapter {
            inner: FixtureAdapter::new(platform, Vec::new()),
            responses: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            reject_transform: true,
        })
    }

    pub fn push_responses(&self, responses: Vec<ScriptedResponse>) {
        let mut queue = self.responses.lock().unwrap();
        queue.extend(responses);
    }

    pub fn execute_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClientAdapter for ScriptedAdapter {
    fn platform_name(&self) -> &str {
        self.inner.platform_name()
    }

    fn transform_config(&self, config: &CollectConfig) -> Result<Value, AdapterError> {
        if self.reject_transform {
            return Err(AdapterError::invalid_config("scripted rejection"));
        }
        self.inner.transform_config(config)
    }

    async fn execute_task(&self, task: &CollectionTask) -> Result<CollectionResult, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let started = Instant::now();
        let response = self.responses.lock().unwrap().pop_front();
        match response {
            Some(ScriptedResponse::Items(items)) => {
                let posts: Vec<NewPost> = items
                    .iter()
                    .map(|raw| self.create_post_entry(raw.clone(), task))
                    .collect();
                Ok(CollectionResult {
                    task_id: task.id,
                    task_name: task.task_name.clone(),
                    platform: task.platform.clone(),
                    transient: task.transient,
                    collected_items: posts.len() as u32,
                    duration_ms: started.elapsed().as_millis() as u64,
                    execution_ts: Utc::now(),
                    posts,
                    users: Vec::<NewUser>::new(),
                })
            }
            Some(ScriptedResponse::Quota(release_at)) => {
                Err(AdapterError::QuotaExceeded { release_at })
            }
            Some(ScriptedResponse::Error(reason)) => Err(AdapterError::collection(reason)),
            Some(ScriptedResponse::Fatal(reason)) => Err(AdapterError::fatal(reason)),
            Some(ScriptedResponse::Hang) => std::future::pending().await,
            None => Err(AdapterError::collection("script exhausted")),
        }
    }

    fn create_post_entry(&self, raw: Value, task: &CollectionTask) -> NewPost {
        self.inner.create_post_entry(raw, task)
    }
}

/// Run config with one platform `p` backed by a scripted adapter, all paths
/// inside a temp dir.
#[allow(dead_code)]
pub fn test_run_config(dir: &Path) -> RunConfig {
    run_config_with_sink(dir, None)
}

#[allow(dead_code)]
pub fn run_config_with_sink(dir: &Path, sink: Option<Value>) -> RunConfig {
    serde_json::from_value(json!({
        "data_dir": dir.join("data"),
        "clients": {
            "p": { "adapter": "scripted" }
        },
        "sink": sink,
    }))
    .expect("test run config must deserialize")
}

#[allow(dead_code)]
pub fn registry_with(adapter: Arc<ScriptedAdapter>) -> AdapterRegistry {
    let mut registry = AdapterRegistry::with_builtins();
    registry.register("scripted", move |_platform, _settings| {
        Ok(Arc::clone(&adapter) as Arc<dyn ClientAdapter>)
    });
    registry
}

/// Temp-dir orchestrator wired to the given scripted adapter.
#[allow(dead_code)]
pub async fn scripted_orchestrator(
    responses: Vec<ScriptedResponse>,
) -> (TempDir, Arc<ScriptedAdapter>, Orchestrator) {
    let dir = tempfile::tempdir().expect("tempdir");
    let adapter = ScriptedAdapter::new("p", responses);
    let config = test_run_config(dir.path());
    let orchestrator = Orchestrator::bootstrap(config, &registry_with(Arc::clone(&adapter)))
        .await
        .expect("bootstrap");
    (dir, adapter, orchestrator)
}

/// The S1 shape: one task, three raw items.
#[allow(dead_code)]
pub fn single_task_payload(task_name: &str) -> Value {
    json!({
        "platform": "p",
        "task_name": task_name,
        "collection_config": {
            "from_time": "2023-01-01T00:00:00Z",
            "to_time": "2023-01-02T00:00:00Z",
            "limit": 3
        }
    })
}

#[allow(dead_code)]
pub fn three_items() -> Vec<Value> {
    vec![
        json!({"id": "post-1", "url": "https://p.example/1", "date": "2023-01-01T10:00:00Z"}),
        json!({"id": "post-2", "url": "https://p.example/2", "date": "2023-01-01T11:00:00Z"}),
        json!({"id": "post-3", "url": "https://p.example/3", "date": "2023-01-01T12:00:00Z"}),
    ]
}
