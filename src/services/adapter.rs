//! The client-adapter contract consumed by the platform managers.
//!
//! One adapter per platform performs the provider-specific work: config
//! translation, the actual collection call, and mapping raw items into store
//! rows. The core treats adapters as opaque and only ever observes the typed
//! error kinds of [`AdapterError`].

use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::error::AdapterError;
use crate::models::{
    CollectConfig, CollectionResult, CollectionTask, NewPost, NewUser, PostType,
};

#[async_trait]
pub trait ClientAdapter: Send + Sync {
    /// Platform symbol; matches the owning manager's platform.
    fn platform_name(&self) -> &str;

    /// Idempotent one-shot initialization (credentials, session). A failed
    /// setup is retried the next time the manager processes a batch.
    async fn setup(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    /// Pure validation/translation of the abstract config into the provider
    /// request shape.
    fn transform_config(&self, config: &CollectConfig) -> Result<Value, AdapterError>;

    /// Like [`Self::transform_config`] but guaranteed JSON-serializable; the
    /// result is persisted on the task row. Must be a one-step fixed point:
    /// re-serializing an already serialized config yields the same value.
    fn transform_config_to_serializable(
        &self,
        config: &CollectConfig,
    ) -> Result<Value, AdapterError> {
        self.transform_config(config)
    }

    /// Perform one collection step. Expected failures come back as
    /// [`AdapterError`] variants, never as panics.
    async fn execute_task(&self, task: &CollectionTask) -> Result<CollectionResult, AdapterError>;

    /// Map one raw provider item to the store row shape.
    fn create_post_entry(&self, raw: Value, task: &CollectionTask) -> NewPost;
}

/// Adapter that serves canned items without touching any external API.
///
/// Used for platforms in test mode and for tasks carrying inline
/// `test_data`; raw items are echoed into the post `content` unchanged.
pub struct FixtureAdapter {
    platform: String,
    canned_items: Vec<Value>,
}

impl FixtureAdapter {
    pub fn new(platform: impl Into<String>, canned_items: Vec<Value>) -> Self {
        FixtureAdapter {
            platform: platform.into(),
            canned_items,
        }
    }

    fn items_for(&self, task: &CollectionTask) -> Vec<Value> {
        let source = task
            .test_data
            .clone()
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| self.canned_items.clone());
        match task.collection_config.limit {
            Some(limit) => source.into_iter().take(limit as usize).collect(),
            None => source,
        }
    }
}

#[async_trait]
impl ClientAdapter for FixtureAdapter {
    fn platform_name(&self) -> &str {
        &self.platform
    }

    fn transform_config(&self, config: &CollectConfig) -> Result<Value, AdapterError> {
        Ok(json!({
            "query": config.query,
            "limit": config.limit,
            "from_time": config.from_time,
            "to_time": config.to_time,
            "language": config.language,
        }))
    }

    async fn execute_task(&self, task: &CollectionTask) -> Result<CollectionResult, AdapterError> {
        let started = Instant::now();
        let items = self.items_for(task);
        let posts: Vec<NewPost> = items
            .iter()
            .map(|raw| self.create_post_entry(raw.clone(), task))
            .collect();
        let users: Vec<NewUser> = items
            .iter()
            .filter_map(|raw| raw.get("username").and_then(Value::as_str))
            .map(|name| NewUser {
                platform: self.platform.clone(),
                platform_username: Some(name.to_string()),
            })
            .collect();

        Ok(CollectionResult {
            task_id: task.id,
            task_name: task.task_name.clone(),
            platform: self.platform.clone(),
            transient: task.transient,
            collected_items: posts.len() as u32,
            duration_ms: started.elapsed().as_millis() as u64,
            execution_ts: Utc::now(),
            posts,
            users,
        })
    }

    fn create_post_entry(&self, raw: Value, task: &CollectionTask) -> NewPost {
        let platform_id = raw
            .get("id")
            .map(json_id_to_string)
            .unwrap_or_else(|| format!("{}-{}", task.task_name, fingerprint(&raw)));
        let post_url = raw
            .get("url")
            .and_then(Value::as_str)
            .map(str::to_string);
        let date_created = raw
            .get("date")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        NewPost {
            platform: self.platform.clone(),
            platform_id,
            post_url,
            date_created,
            post_type: PostType::Regular,
            content: raw,
            metadata_content: None,
            collection_task_id: Some(task.id),
        }
    }
}

fn json_id_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn fingerprint(value: &Value) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    value.to_string().hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_with(test_data: Option<Vec<Value>>, limit: Option<u32>) -> CollectionTask {
        CollectionTask {
            id: 1,
            task_name: "t1".into(),
            platform: "fixture".into(),
            collection_config: CollectConfig {
                limit,
                ..Default::default()
            },
            platform_config: None,
            status: crate::models::TaskStatus::Init,
            found_items: None,
            added_items: None,
            collection_duration_ms: None,
            transient: false,
            test: false,
            overwrite: false,
            test_data,
            time_added: Utc::now(),
            execution_ts: None,
        }
    }

    #[tokio::test]
    async fn serves_test_data_over_canned_items() {
        let adapter = FixtureAdapter::new("fixture", vec![json!({"id": "canned"})]);
        let task = task_with(Some(vec![json!({"id": "a"}), json!({"id": "b"})]), None);
        let result = adapter.execute_task(&task).await.unwrap();
        assert_eq!(result.collected_items, 2);
        assert_eq!(result.posts[0].platform_id, "a");
    }

    #[tokio::test]
    async fn limit_truncates_served_items() {
        let items = (0..5).map(|i| json!({"id": i})).collect();
        let adapter = FixtureAdapter::new("fixture", items);
        let task = task_with(None, Some(3));
        let result = adapter.execute_task(&task).await.unwrap();
        assert_eq!(result.collected_items, 3);
    }

    #[test]
    fn serializable_config_is_a_fixed_point() {
        let adapter = FixtureAdapter::new("fixture", vec![]);
        let config = CollectConfig {
            query: Some("q".into()),
            limit: Some(5),
            ..Default::default()
        };
        let first = adapter.transform_config_to_serializable(&config).unwrap();
        let reparsed: CollectConfig = serde_json::from_value(first.clone()).unwrap();
        let second = adapter.transform_config_to_serializable(&reparsed).unwrap();
        assert_eq!(first, second);
    }
}
