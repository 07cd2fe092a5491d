//! Abstract collection configuration and per-task collection results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::post::{NewPost, NewUser};

/// Provider-agnostic collection parameters accepted at the system boundary.
///
/// Unknown keys pass through to the adapter untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_base: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_mod: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Outcome of one successful collection step, handed from an adapter to the
/// owning manager for persistence.
#[derive(Debug, Clone)]
pub struct CollectionResult {
    pub task_id: i64,
    pub task_name: String,
    pub platform: String,
    pub transient: bool,
    pub posts: Vec<NewPost>,
    pub users: Vec<NewUser>,
    /// Items the provider reported, before store-side deduplication.
    pub collected_items: u32,
    pub duration_ms: u64,
    pub execution_ts: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_config_passes_unknown_keys_through() {
        let raw = serde_json::json!({
            "query": "climate",
            "limit": 10,
            "part": ["snippet", "statistics"]
        });
        let config: CollectConfig = serde_json::from_value(raw).unwrap();
        assert_eq!(config.query.as_deref(), Some("climate"));
        assert_eq!(config.limit, Some(10));
        assert!(config.extra.contains_key("part"));

        let round = serde_json::to_value(&config).unwrap();
        assert_eq!(round["part"][0], "snippet");
    }
}
