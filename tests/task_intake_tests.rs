//! Task-file ingest: directory scan, group expansion end to end, and the
//! processed-file move rules.

mod common;

use serde_json::json;

use common::{scripted_orchestrator, single_task_payload, ScriptedResponse};
use social_collection_backend::TaskStatus;

fn write_task_file(dir: &std::path::Path, name: &str, payload: &serde_json::Value) {
    std::fs::write(dir.join(name), serde_json::to_string_pretty(payload).unwrap()).unwrap();
}

#[tokio::test]
async fn task_files_are_ingested_and_moved() {
    let (_dir, _adapter, orchestrator) = scripted_orchestrator(Vec::new()).await;
    let tasks_dir = orchestrator.config().tasks_dir();
    let processed_dir = orchestrator.config().processed_tasks_dir();

    write_task_file(&tasks_dir, "one.json", &single_task_payload("t1"));

    let added = orchestrator
        .task_manager()
        .check_new_client_tasks()
        .await
        .unwrap();
    assert_eq!(added, vec!["t1".to_string()]);

    assert!(!tasks_dir.join("one.json").exists());
    assert!(processed_dir.join("one.json").exists());
}

#[tokio::test]
async fn partially_accepted_files_stay_in_place() {
    let (_dir, _adapter, orchestrator) = scripted_orchestrator(Vec::new()).await;
    let tasks_dir = orchestrator.config().tasks_dir();

    // second entry names a platform without a manager
    let mut foreign = single_task_payload("t2");
    foreign["platform"] = json!("unknown");
    let payload = json!([single_task_payload("t1"), foreign]);
    write_task_file(&tasks_dir, "mixed.json", &payload);

    let added = orchestrator
        .task_manager()
        .check_new_client_tasks()
        .await
        .unwrap();
    assert_eq!(added, vec!["t1".to_string()]);

    // the file is left for the operator to edit or remove
    assert!(tasks_dir.join("mixed.json").exists());
}

#[tokio::test]
async fn unparseable_files_are_skipped_and_kept() {
    let (_dir, _adapter, orchestrator) = scripted_orchestrator(Vec::new()).await;
    let tasks_dir = orchestrator.config().tasks_dir();

    write_task_file(&tasks_dir, "bogus.json", &json!({"neither": "shape"}));

    let added = orchestrator
        .task_manager()
        .check_new_client_tasks()
        .await
        .unwrap();
    assert!(added.is_empty());
    assert!(tasks_dir.join("bogus.json").exists());
}

#[tokio::test]
async fn group_file_expands_into_pending_tasks() {
    let (_dir, _adapter, orchestrator) = scripted_orchestrator(Vec::new()).await;
    let tasks_dir = orchestrator.config().tasks_dir();

    let group = json!({
        "platform": "p",
        "group_prefix": "g",
        "static_params": { "limit": 10 },
        "variable_params": { "language": ["en", "es"] },
        "time_config": {
            "start": "2023-01-01T00:00:00Z",
            "end": "2023-01-03T00:00:00Z",
            "interval": { "days": 1 }
        }
    });
    write_task_file(&tasks_dir, "group.json", &group);

    let added = orchestrator
        .task_manager()
        .check_new_client_tasks()
        .await
        .unwrap();
    assert_eq!(added.len(), 6);

    let store = orchestrator.manager("p").unwrap().store();
    let pending = store.pending_tasks(false).await.unwrap();
    assert_eq!(pending.len(), 6);
    assert_eq!(pending[0].task_name, "g_0");
    assert_eq!(pending[5].task_name, "g_5");
    assert!(pending.iter().all(|t| t.status == TaskStatus::Init));
    assert!(pending.iter().all(|t| t.platform_config.is_some()));
}

#[tokio::test]
async fn resubmitted_task_file_is_not_moved() {
    let (_dir, _adapter, orchestrator) = scripted_orchestrator(Vec::new()).await;
    let tasks_dir = orchestrator.config().tasks_dir();

    write_task_file(&tasks_dir, "one.json", &single_task_payload("t1"));
    orchestrator
        .task_manager()
        .check_new_client_tasks()
        .await
        .unwrap();

    // same payload again under a new file name: nothing added, file kept
    write_task_file(&tasks_dir, "again.json", &single_task_payload("t1"));
    let added = orchestrator
        .task_manager()
        .check_new_client_tasks()
        .await
        .unwrap();
    assert!(added.is_empty());
    assert!(tasks_dir.join("again.json").exists());
}

#[tokio::test]
async fn collected_results_count_per_platform() {
    let (_dir, _adapter, orchestrator) = scripted_orchestrator(vec![ScriptedResponse::Items(
        vec![json!({"id": "a"}), json!({"id": "b"})],
    )])
    .await;
    let tasks_dir = orchestrator.config().tasks_dir();
    write_task_file(&tasks_dir, "one.json", &single_task_payload("t1"));

    let reports = orchestrator.collect().await.unwrap();
    assert_eq!(reports["p"].task_names, vec!["t1".to_string()]);
    assert_eq!(reports["p"].posts_added, 2);
}
