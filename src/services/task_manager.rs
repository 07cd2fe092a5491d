//! Filesystem task intake.
//!
//! Scans the inbound directory for JSON task files, expands them, routes the
//! tasks to the platform managers, and moves fully-accepted files to the
//! processed directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::Result;
use crate::models::NewTask;
use crate::services::platform_manager::PlatformManager;
use crate::services::task_parser::parse_task_data;

pub struct TaskManager {
    managers: Arc<BTreeMap<String, Arc<PlatformManager>>>,
    tasks_dir: PathBuf,
    processed_dir: PathBuf,
    move_processed: bool,
}

impl TaskManager {
    pub fn new(
        managers: Arc<BTreeMap<String, Arc<PlatformManager>>>,
        tasks_dir: PathBuf,
        processed_dir: PathBuf,
        move_processed: bool,
    ) -> Self {
        TaskManager {
            managers,
            tasks_dir,
            processed_dir,
            move_processed,
        }
    }

    /// Scan the inbound directory and ingest every `*.json` task file.
    /// Returns the names of all newly-added tasks.
    pub async fn check_new_client_tasks(&self) -> Result<Vec<String>> {
        if !self.tasks_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut files: Vec<PathBuf> = std::fs::read_dir(&self.tasks_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        files.sort();

        let mut added = Vec::new();
        for file in files {
            added.extend(self.handle_task_file(&file).await?);
        }
        if !added.is_empty() {
            tracing::info!(count = added.len(), "ingested new tasks");
            tracing::debug!(tasks = ?added, "ingested new tasks");
        }
        Ok(added)
    }

    /// Ingest one task file. The file is moved to the processed directory
    /// only when every task in it was added; partial acceptance leaves it in
    /// place for the operator.
    pub async fn handle_task_file(&self, file: &Path) -> Result<Vec<String>> {
        let raw = std::fs::read_to_string(file)?;
        let payload: serde_json::Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(file = %file.display(), error = %err, "task file is not valid JSON");
                return Ok(Vec::new());
            }
        };
        let tasks = match parse_task_data(&payload) {
            Ok(tasks) => tasks,
            Err(err) => {
                tracing::warn!(file = %file.display(), error = %err, "task file cannot be parsed");
                return Ok(Vec::new());
            }
        };

        let expected = tasks.len();
        let (added, all_added) = self.add_tasks(tasks).await?;

        if all_added && expected > 0 && self.move_processed {
            let file_name = file.file_name().unwrap_or_default();
            let target = self.processed_dir.join(file_name);
            if let Err(err) = std::fs::rename(file, &target) {
                tracing::warn!(
                    file = %file.display(),
                    error = %err,
                    "could not move processed task file"
                );
            } else {
                tracing::debug!(file = %file.display(), "moved processed task file");
            }
        }
        Ok(added)
    }

    /// Group tasks by platform and delegate each group to its manager.
    /// Returns the added task names and whether every task was accepted.
    pub async fn add_tasks(&self, tasks: Vec<NewTask>) -> Result<(Vec<String>, bool)> {
        let mut all_added = true;
        let mut grouped: BTreeMap<String, Vec<NewTask>> = BTreeMap::new();
        let mut missing: std::collections::BTreeSet<String> = std::collections::BTreeSet::new();

        for task in tasks {
            if missing.contains(&task.platform) {
                all_added = false;
                continue;
            }
            if !self.managers.contains_key(&task.platform) {
                tracing::warn!(platform = %task.platform, "no manager found for platform");
                missing.insert(task.platform.clone());
                all_added = false;
                continue;
            }
            grouped.entry(task.platform.clone()).or_default().push(task);
        }

        let mut added = Vec::new();
        for (platform, group) in grouped {
            let manager = &self.managers[&platform];
            if !manager.is_active() {
                tracing::warn!(
                    platform = %platform,
                    "tasks added to a platform that is currently not active"
                );
            }
            let group_len = group.len();
            let names = manager.add_tasks(group).await?;
            if names.len() != group_len {
                tracing::warn!(
                    platform = %platform,
                    added = names.len(),
                    submitted = group_len,
                    "not all tasks were added"
                );
                all_added = false;
            }
            added.extend(names);
        }

        Ok((added, all_added))
    }
}
