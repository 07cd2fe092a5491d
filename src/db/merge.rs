//! Two-store overlap detection and merge.
//!
//! Both operations work directly on store files and are independent of the
//! orchestrator: conflicts are the raw identity overlaps (post `platform_id`,
//! task `task_name`), a merge copies the non-conflicting rows from a source
//! store into a target store while re-homing post ownership.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::Serialize;

use crate::db::platform_store::PlatformStore;
use crate::error::Result;

#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeStats {
    pub tasks_added: usize,
    pub tasks_skipped: usize,
    pub posts_added: usize,
    pub posts_skipped: usize,
}

/// `platform_id`s present in both stores.
pub async fn find_conflicting_posts(db1: &Path, db2: &Path) -> Result<Vec<String>> {
    let first = PlatformStore::open("merge-a", db1, false).await?;
    let second = PlatformStore::open("merge-b", db2, false).await?;

    let left: HashSet<String> = first
        .all_posts()
        .await?
        .into_iter()
        .map(|p| p.platform_id)
        .collect();
    let mut conflicts: Vec<String> = second
        .all_posts()
        .await?
        .into_iter()
        .map(|p| p.platform_id)
        .filter(|id| left.contains(id))
        .collect();
    conflicts.sort();
    Ok(conflicts)
}

/// `task_name`s present in both stores.
pub async fn find_conflicting_tasks(db1: &Path, db2: &Path) -> Result<Vec<String>> {
    let first = PlatformStore::open("merge-a", db1, false).await?;
    let second = PlatformStore::open("merge-b", db2, false).await?;

    let left: HashSet<String> = first
        .all_tasks()
        .await?
        .into_iter()
        .map(|t| t.task_name)
        .collect();
    let mut conflicts: Vec<String> = second
        .all_tasks()
        .await?
        .into_iter()
        .map(|t| t.task_name)
        .filter(|name| left.contains(name))
        .collect();
    conflicts.sort();
    Ok(conflicts)
}

/// Copy all non-conflicting tasks and posts from `src` into `target`.
///
/// Task rows keep their status and counters but receive fresh target-side
/// ids; copied posts follow their owning task when it was copied too, and
/// are orphaned when it was skipped as a conflict.
pub async fn merge_stores(src: &Path, target: &Path) -> Result<MergeStats> {
    let source = PlatformStore::open("merge-src", src, false).await?;
    let destination = PlatformStore::open("merge-target", target, false).await?;

    let mut stats = MergeStats::default();
    let existing_tasks: HashSet<String> = destination
        .all_tasks()
        .await?
        .into_iter()
        .map(|t| t.task_name)
        .collect();

    // source task id -> target task id, for re-homing posts
    let mut task_id_map: HashMap<i64, i64> = HashMap::new();
    for task in source.all_tasks().await? {
        if existing_tasks.contains(&task.task_name) {
            stats.tasks_skipped += 1;
            continue;
        }
        let new_id = destination.copy_task_row(&task).await?;
        task_id_map.insert(task.id, new_id);
        stats.tasks_added += 1;
    }

    for post in source.all_posts().await? {
        let owner = post
            .collection_task_id
            .and_then(|src_id| task_id_map.get(&src_id).copied());
        if destination.copy_post_row(&post, owner).await? {
            stats.posts_added += 1;
        } else {
            stats.posts_skipped += 1;
        }
    }

    tracing::info!(
        tasks_added = stats.tasks_added,
        posts_added = stats.posts_added,
        posts_skipped = stats.posts_skipped,
        "merged stores"
    );
    Ok(stats)
}
