//! Declarative task-spec parsing and task-group expansion.
//!
//! A payload is one of three shapes: a single task, an array of entries, or
//! a task group (a time grid crossed with a variable-parameter grid). A
//! payload matching neither schema fails with both validation traces.

use chrono::{DateTime, Days, Duration, Utc};
use serde_json::{Map, Value};
use thiserror::Error;
use validator::Validate;

use crate::models::{CollectConfig, NewTask, TaskGroup, TaskStatus, TaskSubmission, TimeConfig};

#[derive(Debug, Error)]
pub enum TaskParseError {
    #[error(
        "payload matches neither a task nor a task group\n  as task: {task_error}\n  as group: {group_error}"
    )]
    Unrecognized {
        task_error: String,
        group_error: String,
    },

    #[error("invalid task spec: {0}")]
    Invalid(String),

    #[error("task spec validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Parse a task payload (single task, array, or group) into concrete tasks.
pub fn parse_task_data(data: &Value) -> Result<Vec<NewTask>, TaskParseError> {
    match data {
        Value::Array(entries) => {
            let mut tasks = Vec::new();
            for entry in entries {
                tasks.extend(parse_entry(entry)?);
            }
            Ok(tasks)
        }
        Value::Object(_) => parse_entry(data),
        _ => Err(TaskParseError::Invalid(
            "task payload must be an object or an array of objects".to_string(),
        )),
    }
}

fn parse_entry(value: &Value) -> Result<Vec<NewTask>, TaskParseError> {
    let task_error = match serde_json::from_value::<TaskSubmission>(value.clone()) {
        Ok(submission) => {
            submission.validate()?;
            return Ok(vec![submission.into()]);
        }
        Err(err) => err,
    };
    match serde_json::from_value::<TaskGroup>(value.clone()) {
        Ok(group) => {
            group.validate()?;
            expand_group(&group)
        }
        Err(group_error) => Err(TaskParseError::Unrecognized {
            task_error: task_error.to_string(),
            group_error: group_error.to_string(),
        }),
    }
}

/// Grid timestamps: `start`, `start + interval`, ... while `t <= end`.
pub fn generate_timestamps(time_config: &TimeConfig) -> Result<Vec<DateTime<Utc>>, TaskParseError> {
    let interval = time_config.interval.to_duration();
    if interval <= Duration::zero() {
        return Err(TaskParseError::Invalid(
            "time_config.interval must be positive".to_string(),
        ));
    }
    if time_config.end < time_config.start {
        return Err(TaskParseError::Invalid(
            "time_config.end precedes time_config.start".to_string(),
        ));
    }

    let mut timestamps = Vec::new();
    let mut current = time_config.start;
    while current <= time_config.end {
        timestamps.push(current);
        current = current + interval;
    }

    if time_config.truncate_overflow {
        let end = time_config.end;
        timestamps.retain(|t| *t + interval <= end);
    }
    Ok(timestamps)
}

/// Expand a task group into concrete tasks, totally ordered: timestamps
/// outer, parameter tuples inner (declaration order of `variable_params`,
/// last key varying fastest). Names are `{prefix}_{index}`; a multi-platform
/// group shares names across platforms.
pub fn expand_group(group: &TaskGroup) -> Result<Vec<NewTask>, TaskParseError> {
    let platforms = group.platform.platforms();
    if platforms.is_empty() {
        return Err(TaskParseError::Invalid(
            "task group names no platform".to_string(),
        ));
    }

    let timestamps = generate_timestamps(&group.time_config)?;
    let interval = group.time_config.interval.to_duration();
    let timespan = group.time_config.timespan.map(|spec| spec.to_duration());
    if timespan == Some(interval) {
        tracing::info!(
            group = %group.group_prefix,
            "interval and timespan are equal; the interval alone would suffice"
        );
    }

    let mut param_names: Vec<&String> = Vec::new();
    let mut param_values: Vec<&Vec<Value>> = Vec::new();
    for (name, values) in &group.variable_params {
        let list = values.as_array().ok_or_else(|| {
            TaskParseError::Invalid(format!("variable_params.{name} must be a list"))
        })?;
        if list.is_empty() {
            return Err(TaskParseError::Invalid(format!(
                "variable_params.{name} must not be empty"
            )));
        }
        param_names.push(name);
        param_values.push(list);
    }
    let combos = cartesian_product(&param_values);

    tracing::info!(
        group = %group.group_prefix,
        tasks = timestamps.len() * combos.len() * platforms.len(),
        permutations = combos.len(),
        "expanding task group"
    );

    let base_platform = &platforms[0];
    let mut tasks: Vec<NewTask> = Vec::new();
    let mut index = 0usize;
    for timestamp in &timestamps {
        for combo in &combos {
            let mut params = group.static_params.clone();
            for (name, value) in param_names.iter().zip(combo) {
                params.insert((*name).clone(), (*value).clone());
            }

            let from_time = match timespan {
                Some(span) => *timestamp + interval - span,
                None => *timestamp,
            };
            let mut to_time = *timestamp + interval;
            if group.time_config.clamp_to_same_day {
                if let Some(next_day) = (from_time.date_naive() + Days::new(1))
                    .and_hms_opt(0, 0, 0)
                    .map(|dt| dt.and_utc())
                {
                    if to_time > next_day {
                        to_time = next_day;
                    }
                }
            }
            params.insert("from_time".to_string(), Value::String(from_time.to_rfc3339()));
            params.insert("to_time".to_string(), Value::String(to_time.to_rfc3339()));

            let collection_config = config_from_params(params)?;
            tasks.push(NewTask {
                task_name: format!("{}_{}", group.group_prefix, index),
                platform: base_platform.clone(),
                collection_config,
                platform_config: None,
                status: TaskStatus::Init,
                transient: group.transient,
                test: group.test,
                overwrite: group.overwrite,
                test_data: group.test_data.clone(),
                force_new_index: group.force_new_index,
            });
            index += 1;
        }
    }

    // additional platforms get deep copies with shared names
    for platform in &platforms[1..] {
        for i in 0..index {
            let mut copy = tasks[i].clone();
            copy.platform = platform.clone();
            tasks.push(copy);
        }
    }

    Ok(tasks)
}

fn config_from_params(params: Map<String, Value>) -> Result<CollectConfig, TaskParseError> {
    serde_json::from_value(Value::Object(params))
        .map_err(|err| TaskParseError::Invalid(format!("expanded collection config: {err}")))
}

/// Cartesian product over the value lists; an empty input yields the single
/// empty tuple.
fn cartesian_product<'a>(values: &[&'a Vec<Value>]) -> Vec<Vec<&'a Value>> {
    let mut combos: Vec<Vec<&Value>> = vec![Vec::new()];
    for list in values {
        let mut next = Vec::with_capacity(combos.len() * list.len());
        for combo in &combos {
            for value in list.iter() {
                let mut extended = combo.clone();
                extended.push(value);
                next.push(extended);
            }
        }
        combos = next;
    }
    combos
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn group_payload() -> Value {
        json!({
            "platform": "p",
            "group_prefix": "g",
            "static_params": { "limit": 10 },
            "variable_params": { "language": ["en", "es"] },
            "time_config": {
                "start": "2023-01-01T00:00:00Z",
                "end": "2023-01-03T00:00:00Z",
                "interval": { "days": 1 }
            }
        })
    }

    #[test]
    fn group_expands_timestamps_outer_params_inner() {
        let tasks = parse_task_data(&group_payload()).unwrap();
        assert_eq!(tasks.len(), 6);
        let names: Vec<&str> = tasks.iter().map(|t| t.task_name.as_str()).collect();
        assert_eq!(names, ["g_0", "g_1", "g_2", "g_3", "g_4", "g_5"]);

        let g0 = &tasks[0].collection_config;
        assert_eq!(g0.language.as_deref(), Some("en"));
        assert_eq!(g0.limit, Some(10));
        assert_eq!(
            g0.from_time.unwrap(),
            "2023-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );
        assert_eq!(
            g0.to_time.unwrap(),
            "2023-01-02T00:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );

        let g1 = &tasks[1].collection_config;
        assert_eq!(g1.language.as_deref(), Some("es"));
        assert_eq!(g1.from_time, g0.from_time);

        let g2 = &tasks[2].collection_config;
        assert_eq!(
            g2.from_time.unwrap(),
            "2023-01-02T00:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );
    }

    #[test]
    fn timespan_narrows_the_collection_window() {
        let mut payload = group_payload();
        payload["variable_params"] = json!({});
        payload["time_config"]["timespan"] = json!({ "hours": 6 });
        let tasks = parse_task_data(&payload).unwrap();

        // window ends at t + interval and spans the configured timespan
        let first = &tasks[0].collection_config;
        assert_eq!(
            first.from_time.unwrap(),
            "2023-01-01T18:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );
        assert_eq!(
            first.to_time.unwrap(),
            "2023-01-02T00:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );
    }

    #[test]
    fn truncate_overflow_drops_overhanging_grid_points() {
        let mut payload = group_payload();
        payload["variable_params"] = json!({});
        payload["time_config"]["end"] = json!("2023-01-02T12:00:00Z");
        let full = parse_task_data(&payload).unwrap();
        assert_eq!(full.len(), 2); // Jan 1 and Jan 2; Jan 2 window overhangs

        payload["time_config"]["truncate_overflow"] = json!(true);
        let truncated = parse_task_data(&payload).unwrap();
        assert_eq!(truncated.len(), 1);
    }

    #[test]
    fn empty_variable_params_yield_a_single_tuple() {
        let mut payload = group_payload();
        payload["variable_params"] = json!({});
        let tasks = parse_task_data(&payload).unwrap();
        assert_eq!(tasks.len(), 3);
    }

    #[test]
    fn multi_platform_group_shares_names_per_platform() {
        let mut payload = group_payload();
        payload["platform"] = json!(["a", "b"]);
        let tasks = parse_task_data(&payload).unwrap();
        assert_eq!(tasks.len(), 12);

        let a_names: Vec<&str> = tasks
            .iter()
            .filter(|t| t.platform == "a")
            .map(|t| t.task_name.as_str())
            .collect();
        let b_names: Vec<&str> = tasks
            .iter()
            .filter(|t| t.platform == "b")
            .map(|t| t.task_name.as_str())
            .collect();
        assert_eq!(a_names, b_names);
        assert_eq!(a_names.len(), 6);
    }

    #[test]
    fn variable_param_order_drives_the_product_order() {
        let mut payload = group_payload();
        payload["time_config"]["end"] = json!("2023-01-01T00:00:00Z");
        payload["variable_params"] = json!({
            "language": ["en", "es"],
            "region": ["us", "gb"]
        });
        let tasks = parse_task_data(&payload).unwrap();
        assert_eq!(tasks.len(), 4);

        let pairs: Vec<(String, String)> = tasks
            .iter()
            .map(|t| {
                (
                    t.collection_config.language.clone().unwrap(),
                    t.collection_config.extra["region"].as_str().unwrap().to_string(),
                )
            })
            .collect();
        // last declared key varies fastest
        assert_eq!(
            pairs,
            [
                ("en".to_string(), "us".to_string()),
                ("en".to_string(), "gb".to_string()),
                ("es".to_string(), "us".to_string()),
                ("es".to_string(), "gb".to_string()),
            ]
        );
    }

    #[test]
    fn array_payload_mixes_tasks_and_groups() {
        let payload = json!([
            {
                "task_name": "single",
                "platform": "p",
                "collection_config": { "limit": 1 }
            },
            group_payload()
        ]);
        let tasks = parse_task_data(&payload).unwrap();
        assert_eq!(tasks.len(), 7);
        assert_eq!(tasks[0].task_name, "single");
    }

    #[test]
    fn unrecognized_payload_reports_both_traces() {
        let err = parse_task_data(&json!({ "bogus": true })).unwrap_err();
        match err {
            TaskParseError::Unrecognized {
                task_error,
                group_error,
            } => {
                assert!(!task_error.is_empty());
                assert!(!group_error.is_empty());
            }
            other => panic!("expected Unrecognized, got {other:?}"),
        }
    }

    #[test]
    fn clamp_to_same_day_caps_the_window() {
        let mut payload = group_payload();
        payload["variable_params"] = json!({});
        payload["time_config"] = json!({
            "start": "2023-01-01T18:00:00Z",
            "end": "2023-01-01T18:00:00Z",
            "interval": { "hours": 12 },
            "clamp_to_same_day": true
        });
        let tasks = parse_task_data(&payload).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(
            tasks[0].collection_config.to_time.unwrap(),
            "2023-01-02T00:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );
    }
}
