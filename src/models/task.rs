//! Collection task records and the declarative task-spec shapes.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use validator::Validate;

use crate::models::collect::CollectConfig;

/// Lifecycle state of a collection task.
///
/// `INVALID_CONF` is terminal until an operator edits the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Init,
    Active,
    Running,
    Paused,
    Aborted,
    Done,
    InvalidConf,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Init => "INIT",
            TaskStatus::Active => "ACTIVE",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Paused => "PAUSED",
            TaskStatus::Aborted => "ABORTED",
            TaskStatus::Done => "DONE",
            TaskStatus::InvalidConf => "INVALID_CONF",
        }
    }

    /// Statuses a manager considers queueable.
    pub fn pending_statuses(include_paused: bool) -> Vec<TaskStatus> {
        let mut statuses = vec![TaskStatus::Init, TaskStatus::Active];
        if include_paused {
            statuses.push(TaskStatus::Paused);
        }
        statuses
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INIT" => Ok(TaskStatus::Init),
            "ACTIVE" => Ok(TaskStatus::Active),
            "RUNNING" => Ok(TaskStatus::Running),
            "PAUSED" => Ok(TaskStatus::Paused),
            "ABORTED" => Ok(TaskStatus::Aborted),
            "DONE" => Ok(TaskStatus::Done),
            "INVALID_CONF" => Ok(TaskStatus::InvalidConf),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// A persisted collection task, as read from a platform store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionTask {
    pub id: i64,
    pub task_name: String,
    pub platform: String,
    /// Provider-agnostic request parameters.
    pub collection_config: CollectConfig,
    /// Adapter-serialized provider request; absent when the abstract config
    /// failed adapter validation.
    pub platform_config: Option<Value>,
    pub status: TaskStatus,
    pub found_items: Option<i64>,
    pub added_items: Option<i64>,
    pub collection_duration_ms: Option<i64>,
    /// Task row is deleted on successful completion.
    pub transient: bool,
    pub test: bool,
    pub overwrite: bool,
    /// Inline raw items that bypass the external API.
    pub test_data: Option<Vec<Value>>,
    pub time_added: DateTime<Utc>,
    pub execution_ts: Option<DateTime<Utc>>,
}

impl CollectionTask {
    pub fn has_test_data(&self) -> bool {
        self.test_data.as_ref().is_some_and(|d| !d.is_empty())
    }
}

/// A task ready for insertion into a platform store.
#[derive(Debug, Clone, Serialize)]
pub struct NewTask {
    pub task_name: String,
    pub platform: String,
    pub collection_config: CollectConfig,
    pub platform_config: Option<Value>,
    pub status: TaskStatus,
    pub transient: bool,
    pub test: bool,
    pub overwrite: bool,
    pub test_data: Option<Vec<Value>>,
    /// When the name collides, re-index past the highest existing group
    /// suffix instead of rejecting. Not persisted.
    #[serde(skip)]
    pub force_new_index: bool,
}

impl From<TaskSubmission> for NewTask {
    fn from(sub: TaskSubmission) -> Self {
        NewTask {
            task_name: sub.task_name,
            platform: sub.platform,
            collection_config: sub.collection_config,
            platform_config: None,
            status: TaskStatus::Init,
            transient: sub.transient,
            test: sub.test,
            overwrite: sub.overwrite,
            test_data: sub.test_data,
            force_new_index: false,
        }
    }
}

/// Boundary shape for a single declarative task.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct TaskSubmission {
    #[validate(length(min = 1, max = 50))]
    pub task_name: String,
    #[validate(length(min = 1, max = 20))]
    pub platform: String,
    pub collection_config: CollectConfig,
    #[serde(default)]
    pub transient: bool,
    #[serde(default)]
    pub test: bool,
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default)]
    pub test_data: Option<Vec<Value>>,
}

/// One platform symbol or a list of them; a group with a list expands once
/// per platform with shared task names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlatformSelector {
    One(String),
    Many(Vec<String>),
}

impl PlatformSelector {
    pub fn platforms(&self) -> Vec<String> {
        match self {
            PlatformSelector::One(p) => vec![p.clone()],
            PlatformSelector::Many(ps) => ps.clone(),
        }
    }
}

/// Interval expressed as calendar-free components, mirroring the accepted
/// `{days: 1, hours: 6, ...}` JSON shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntervalSpec {
    #[serde(default)]
    pub weeks: i64,
    #[serde(default)]
    pub days: i64,
    #[serde(default)]
    pub hours: i64,
    #[serde(default)]
    pub minutes: i64,
    #[serde(default)]
    pub seconds: i64,
}

impl IntervalSpec {
    pub fn to_duration(&self) -> Duration {
        Duration::weeks(self.weeks)
            + Duration::days(self.days)
            + Duration::hours(self.hours)
            + Duration::minutes(self.minutes)
            + Duration::seconds(self.seconds)
    }

    pub fn is_zero(&self) -> bool {
        self.to_duration().is_zero()
    }
}

/// Time grid of a task group.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeConfig {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub interval: IntervalSpec,
    /// Collection window length; defaults to `interval` when absent.
    #[serde(default)]
    pub timespan: Option<IntervalSpec>,
    /// Clamp each window's `to_time` to the end of `from_time`'s calendar day.
    #[serde(default)]
    pub clamp_to_same_day: bool,
    /// Drop trailing grid points whose `to_time` exceeds `end`.
    #[serde(default)]
    pub truncate_overflow: bool,
}

/// Boundary shape for a declarative task group: a time grid crossed with a
/// variable-parameter grid.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct TaskGroup {
    pub platform: PlatformSelector,
    #[validate(length(min = 1, max = 40))]
    pub group_prefix: String,
    pub time_config: TimeConfig,
    #[serde(default)]
    pub static_params: Map<String, Value>,
    /// Parameter name -> list of values to permute. Declaration order drives
    /// the Cartesian product order.
    #[serde(default)]
    pub variable_params: Map<String, Value>,
    #[serde(default)]
    pub transient: bool,
    #[serde(default)]
    pub test: bool,
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default)]
    pub test_data: Option<Vec<Value>>,
    #[serde(default)]
    pub force_new_index: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            TaskStatus::Init,
            TaskStatus::Active,
            TaskStatus::Running,
            TaskStatus::Paused,
            TaskStatus::Aborted,
            TaskStatus::Done,
            TaskStatus::InvalidConf,
        ] {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
    }

    #[test]
    fn interval_spec_combines_components() {
        let spec = IntervalSpec {
            days: 1,
            hours: 6,
            ..Default::default()
        };
        assert_eq!(spec.to_duration(), Duration::hours(30));
    }

    #[test]
    fn submission_rejects_overlong_task_name() {
        let sub = TaskSubmission {
            task_name: "x".repeat(51),
            platform: "youtube".into(),
            collection_config: CollectConfig::default(),
            transient: false,
            test: false,
            overwrite: false,
            test_data: None,
        };
        assert!(sub.validate().is_err());
    }

    #[test]
    fn platform_selector_accepts_string_or_list() {
        let one: PlatformSelector = serde_json::from_str("\"tiktok\"").unwrap();
        assert_eq!(one.platforms(), vec!["tiktok".to_string()]);

        let many: PlatformSelector = serde_json::from_str("[\"a\", \"b\"]").unwrap();
        assert_eq!(many.platforms().len(), 2);
    }
}
