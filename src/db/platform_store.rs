//! Per-platform relational store: tasks, posts, users, comments.
//!
//! A store is exclusively owned by one platform manager. External tools may
//! read the file in read-only mode; concurrent external writers are
//! undefined behavior, so the backend's transaction semantics are the only
//! synchronization this module needs.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::SqlitePool;
use sqlx::types::Json;
use sqlx::FromRow;

use crate::db::connection::open_sqlite_pool;
use crate::db::schema::init_platform_schema;
use crate::error::{CollectError, Result};
use crate::models::{
    CollectConfig, CollectionResult, CollectionTask, NewPost, NewTask, NewUser, Post, PostType,
    TaskStatus,
};

const TASK_COLUMNS: &str = "id, task_name, platform, collection_config, platform_config, status, \
     found_items, added_items, collection_duration_ms, transient, test, overwrite, test_data, \
     time_added, execution_ts";

const POST_COLUMNS: &str = "id, platform, platform_id, post_url, date_created, date_collected, \
     post_type, content, metadata_content, collection_task_id";

/// Grouping window for post-count statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsPeriod {
    Day,
    Month,
    Year,
}

impl StatsPeriod {
    fn strftime_format(&self) -> &'static str {
        match self {
            StatsPeriod::Day => "%Y-%m-%d",
            StatsPeriod::Month => "%Y-%m",
            StatsPeriod::Year => "%Y",
        }
    }
}

impl std::str::FromStr for StatsPeriod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "day" => Ok(StatsPeriod::Day),
            "month" => Ok(StatsPeriod::Month),
            "year" => Ok(StatsPeriod::Year),
            other => Err(format!("unknown stats period: {other}")),
        }
    }
}

/// One bucket of the per-period post counts.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PeriodBucket {
    pub period: String,
    pub count: i64,
}

/// Outcome of [`PlatformStore::insert_posts`].
#[derive(Debug)]
pub struct InsertOutcome {
    /// Posts actually inserted (store-assigned ids filled in).
    pub added: Vec<Post>,
    /// True when the owning task was transient and its row was removed.
    pub task_deleted: bool,
}

#[derive(FromRow)]
struct TaskRow {
    id: i64,
    task_name: String,
    platform: String,
    collection_config: Json<CollectConfig>,
    platform_config: Option<Json<Value>>,
    status: String,
    found_items: Option<i64>,
    added_items: Option<i64>,
    collection_duration_ms: Option<i64>,
    transient: bool,
    test: bool,
    overwrite: bool,
    test_data: Option<Json<Vec<Value>>>,
    time_added: DateTime<Utc>,
    execution_ts: Option<DateTime<Utc>>,
}

impl TaskRow {
    fn into_task(self) -> Result<CollectionTask> {
        let status = self
            .status
            .parse::<TaskStatus>()
            .map_err(CollectError::fatal)?;
        Ok(CollectionTask {
            id: self.id,
            task_name: self.task_name,
            platform: self.platform,
            collection_config: self.collection_config.0,
            platform_config: self.platform_config.map(|j| j.0),
            status,
            found_items: self.found_items,
            added_items: self.added_items,
            collection_duration_ms: self.collection_duration_ms,
            transient: self.transient,
            test: self.test,
            overwrite: self.overwrite,
            test_data: self.test_data.map(|j| j.0),
            time_added: self.time_added,
            execution_ts: self.execution_ts,
        })
    }
}

#[derive(FromRow)]
struct PostRow {
    id: i64,
    platform: String,
    platform_id: String,
    post_url: Option<String>,
    date_created: DateTime<Utc>,
    date_collected: DateTime<Utc>,
    post_type: String,
    content: Json<Value>,
    metadata_content: Option<Json<Value>>,
    collection_task_id: Option<i64>,
}

impl PostRow {
    fn into_post(self) -> Result<Post> {
        let post_type = self
            .post_type
            .parse::<PostType>()
            .map_err(CollectError::fatal)?;
        Ok(Post {
            id: self.id,
            platform: self.platform,
            platform_id: self.platform_id,
            post_url: self.post_url,
            date_created: self.date_created,
            date_collected: self.date_collected,
            post_type,
            content: self.content.0,
            metadata_content: self.metadata_content.map(|j| j.0),
            collection_task_id: self.collection_task_id,
        })
    }
}

/// Handle to one platform's SQLite store.
#[derive(Clone)]
pub struct PlatformStore {
    platform: String,
    path: PathBuf,
    pool: SqlitePool,
}

impl PlatformStore {
    /// Open the store at `path`, creating file and schema when `create` is set.
    pub async fn open(platform: &str, path: &Path, create: bool) -> Result<Self> {
        let pool = open_sqlite_pool(path, create).await?;
        init_platform_schema(&pool).await?;
        Ok(PlatformStore {
            platform: platform.to_string(),
            path: path.to_path_buf(),
            pool,
        })
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert tasks, returning the names actually inserted.
    ///
    /// A colliding `task_name` is rejected unless the incoming task has
    /// `test && overwrite` (previous task and all its posts are deleted in
    /// the same transaction) or carries `force_new_index` (renamed past the
    /// highest existing group suffix).
    pub async fn add_tasks(&self, tasks: &[NewTask]) -> Result<Vec<String>> {
        let mut added = Vec::new();
        for task in tasks {
            if let Some(name) = self.add_task(task).await? {
                added.push(name);
            }
        }
        Ok(added)
    }

    async fn add_task(&self, task: &NewTask) -> Result<Option<String>> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM collection_task WHERE task_name = ?")
                .bind(&task.task_name)
                .fetch_optional(&mut *tx)
                .await?;

        let mut name = task.task_name.clone();
        if let Some((prev_id,)) = existing {
            if task.test && task.overwrite {
                tracing::debug!(
                    platform = %self.platform,
                    task = %task.task_name,
                    "overwriting existing test task and its posts"
                );
                sqlx::query("DELETE FROM post WHERE collection_task_id = ?")
                    .bind(prev_id)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query("DELETE FROM collection_task WHERE id = ?")
                    .bind(prev_id)
                    .execute(&mut *tx)
                    .await?;
            } else if task.force_new_index {
                name = self.next_free_name(&mut tx, &task.task_name).await?;
            } else {
                tracing::info!(
                    platform = %self.platform,
                    task = %task.task_name,
                    "collection task exists already"
                );
                return Ok(None);
            }
        }

        sqlx::query(
            "INSERT INTO collection_task \
             (task_name, platform, collection_config, platform_config, status, \
              transient, test, overwrite, test_data, time_added) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&name)
        .bind(&task.platform)
        .bind(Json(&task.collection_config))
        .bind(task.platform_config.as_ref().map(Json))
        .bind(task.status.as_str())
        .bind(task.transient)
        .bind(task.test)
        .bind(task.overwrite)
        .bind(task.test_data.as_ref().map(Json))
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(platform = %self.platform, task = %name, "added collection task");
        Ok(Some(name))
    }

    async fn next_free_name(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        wanted: &str,
    ) -> Result<String> {
        let prefix = match wanted.rsplit_once('_') {
            Some((prefix, suffix)) if suffix.chars().all(|c| c.is_ascii_digit()) => prefix,
            _ => wanted,
        };
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT task_name FROM collection_task WHERE task_name LIKE ?")
                .bind(format!("{prefix}_%"))
                .fetch_all(&mut **tx)
                .await?;
        let next = next_index(rows.into_iter().map(|(n,)| n), prefix);
        Ok(format!("{prefix}_{next}"))
    }

    /// Tasks in `{INIT, ACTIVE}` (plus `PAUSED` when requested), FIFO by id.
    pub async fn pending_tasks(&self, include_paused: bool) -> Result<Vec<CollectionTask>> {
        let statuses = TaskStatus::pending_statuses(include_paused);
        let placeholders = vec!["?"; statuses.len()].join(", ");
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM collection_task \
             WHERE status IN ({placeholders}) ORDER BY id ASC"
        );
        let mut query = sqlx::query_as::<_, TaskRow>(&sql);
        for status in &statuses {
            query = query.bind(status.as_str());
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(TaskRow::into_task).collect()
    }

    pub async fn get_task(&self, id: i64) -> Result<Option<CollectionTask>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM collection_task WHERE id = ?");
        let row = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TaskRow::into_task).transpose()
    }

    pub async fn get_task_by_name(&self, task_name: &str) -> Result<Option<CollectionTask>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM collection_task WHERE task_name = ?");
        let row = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(task_name)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TaskRow::into_task).transpose()
    }

    /// Unconditional status set.
    pub async fn update_task_status(&self, id: i64, status: TaskStatus) -> Result<()> {
        sqlx::query("UPDATE collection_task SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Mark a task `RUNNING` and stamp its execution time.
    pub async fn mark_task_running(&self, id: i64, execution_ts: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE collection_task SET status = ?, execution_ts = ? WHERE id = ?")
            .bind(TaskStatus::Running.as_str())
            .bind(execution_ts)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Recovery from an abrupt shutdown: any `RUNNING` row goes back to `INIT`.
    pub async fn reset_running_tasks(&self) -> Result<u64> {
        let result = sqlx::query("UPDATE collection_task SET status = ? WHERE status = ?")
            .bind(TaskStatus::Init.as_str())
            .bind(TaskStatus::Running.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Persist a collection result and settle the owning task row, in one
    /// transaction.
    ///
    /// Duplicate `platform_id`s (within the batch or already in the store)
    /// are dropped silently; the remaining rows are inserted with a
    /// per-row conflict guard so a concurrent duplicate never rolls back
    /// its batch siblings.
    pub async fn insert_posts(&self, result: &CollectionResult) -> Result<InsertOutcome> {
        let mut seen: HashSet<&str> = HashSet::new();
        let batch: Vec<&NewPost> = result
            .posts
            .iter()
            .filter(|p| seen.insert(p.platform_id.as_str()))
            .collect();

        let mut tx = self.pool.begin().await?;

        let mut existing: HashSet<String> = HashSet::new();
        for chunk in batch.chunks(400) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql =
                format!("SELECT platform_id FROM post WHERE platform_id IN ({placeholders})");
            let mut query = sqlx::query_as::<_, (String,)>(&sql);
            for post in chunk {
                query = query.bind(&post.platform_id);
            }
            existing.extend(query.fetch_all(&mut *tx).await?.into_iter().map(|(id,)| id));
        }

        let now = Utc::now();
        let mut added = Vec::new();
        for post in batch
            .iter()
            .filter(|p| !existing.contains(&p.platform_id))
        {
            let inserted: Option<(i64,)> = sqlx::query_as(
                "INSERT INTO post \
                 (platform, platform_id, post_url, date_created, date_collected, post_type, \
                  content, metadata_content, collection_task_id) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
                 ON CONFLICT(platform_id) DO NOTHING \
                 RETURNING id",
            )
            .bind(&post.platform)
            .bind(&post.platform_id)
            .bind(&post.post_url)
            .bind(post.date_created)
            .bind(now)
            .bind(post.post_type.as_str())
            .bind(Json(&post.content))
            .bind(post.metadata_content.as_ref().map(Json))
            .bind(post.collection_task_id)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some((id,)) = inserted {
                added.push(Post {
                    id,
                    platform: post.platform.clone(),
                    platform_id: post.platform_id.clone(),
                    post_url: post.post_url.clone(),
                    date_created: post.date_created,
                    date_collected: now,
                    post_type: post.post_type,
                    content: post.content.clone(),
                    metadata_content: post.metadata_content.clone(),
                    collection_task_id: if result.transient {
                        None
                    } else {
                        post.collection_task_id
                    },
                });
            }
        }

        self.insert_users(&mut tx, &result.users).await?;

        let task_deleted = if result.transient {
            sqlx::query("UPDATE post SET collection_task_id = NULL WHERE collection_task_id = ?")
                .bind(result.task_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM collection_task WHERE id = ?")
                .bind(result.task_id)
                .execute(&mut *tx)
                .await?;
            true
        } else {
            sqlx::query(
                "UPDATE collection_task \
                 SET status = ?, found_items = ?, added_items = ?, \
                     collection_duration_ms = ?, execution_ts = ? \
                 WHERE id = ?",
            )
            .bind(TaskStatus::Done.as_str())
            .bind(result.collected_items as i64)
            .bind(added.len() as i64)
            .bind(result.duration_ms as i64)
            .bind(result.execution_ts)
            .bind(result.task_id)
            .execute(&mut *tx)
            .await?;
            false
        };

        tx.commit().await?;

        tracing::debug!(
            platform = %self.platform,
            task = %result.task_name,
            found = result.collected_items,
            added = added.len(),
            "persisted collection result"
        );
        Ok(InsertOutcome {
            added,
            task_deleted,
        })
    }

    async fn insert_users(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        users: &[NewUser],
    ) -> Result<()> {
        let mut seen: HashSet<&str> = HashSet::new();
        for user in users {
            let Some(username) = user.platform_username.as_deref() else {
                continue;
            };
            if !seen.insert(username) {
                continue;
            }
            let exists: Option<(i64,)> = sqlx::query_as(
                "SELECT id FROM user WHERE platform = ? AND platform_username = ?",
            )
            .bind(&user.platform)
            .bind(username)
            .fetch_optional(&mut **tx)
            .await?;
            if exists.is_none() {
                sqlx::query("INSERT INTO user (platform, platform_username) VALUES (?, ?)")
                    .bind(&user.platform)
                    .bind(username)
                    .execute(&mut **tx)
                    .await?;
            }
        }
        Ok(())
    }

    pub async fn all_tasks(&self) -> Result<Vec<CollectionTask>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM collection_task ORDER BY id ASC");
        let rows = sqlx::query_as::<_, TaskRow>(&sql).fetch_all(&self.pool).await?;
        rows.into_iter().map(TaskRow::into_task).collect()
    }

    pub async fn all_posts(&self) -> Result<Vec<Post>> {
        let sql = format!("SELECT {POST_COLUMNS} FROM post ORDER BY id ASC");
        let rows = sqlx::query_as::<_, PostRow>(&sql).fetch_all(&self.pool).await?;
        rows.into_iter().map(PostRow::into_post).collect()
    }

    /// Insert a full task row from another store, preserving status and
    /// counters; a fresh id is assigned.
    pub(crate) async fn copy_task_row(&self, task: &CollectionTask) -> Result<i64> {
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO collection_task \
             (task_name, platform, collection_config, platform_config, status, found_items, \
              added_items, collection_duration_ms, transient, test, overwrite, test_data, \
              time_added, execution_ts) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             RETURNING id",
        )
        .bind(&task.task_name)
        .bind(&task.platform)
        .bind(Json(&task.collection_config))
        .bind(task.platform_config.as_ref().map(Json))
        .bind(task.status.as_str())
        .bind(task.found_items)
        .bind(task.added_items)
        .bind(task.collection_duration_ms)
        .bind(task.transient)
        .bind(task.test)
        .bind(task.overwrite)
        .bind(task.test_data.as_ref().map(Json))
        .bind(task.time_added)
        .bind(task.execution_ts)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Insert a full post row from another store under a new owner; returns
    /// false when the `platform_id` already exists here.
    pub(crate) async fn copy_post_row(&self, post: &Post, owner: Option<i64>) -> Result<bool> {
        let inserted: Option<(i64,)> = sqlx::query_as(
            "INSERT INTO post \
             (platform, platform_id, post_url, date_created, date_collected, post_type, \
              content, metadata_content, collection_task_id) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(platform_id) DO NOTHING \
             RETURNING id",
        )
        .bind(&post.platform)
        .bind(&post.platform_id)
        .bind(&post.post_url)
        .bind(post.date_created)
        .bind(post.date_collected)
        .bind(post.post_type.as_str())
        .bind(Json(&post.content))
        .bind(post.metadata_content.as_ref().map(Json))
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?;
        Ok(inserted.is_some())
    }

    /// Posts owned by a task; pass `None` for orphaned posts.
    pub async fn posts_for_task(&self, task_id: Option<i64>) -> Result<Vec<Post>> {
        let sql = match task_id {
            Some(_) => format!(
                "SELECT {POST_COLUMNS} FROM post WHERE collection_task_id = ? ORDER BY id"
            ),
            None => {
                format!("SELECT {POST_COLUMNS} FROM post WHERE collection_task_id IS NULL ORDER BY id")
            }
        };
        let mut query = sqlx::query_as::<_, PostRow>(&sql);
        if let Some(id) = task_id {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(PostRow::into_post).collect()
    }

    pub async fn count_posts(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM post")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn count_states(&self) -> Result<HashMap<TaskStatus, i64>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM collection_task GROUP BY status")
                .fetch_all(&self.pool)
                .await?;
        let mut counts = HashMap::new();
        for (status, count) in rows {
            let status = status.parse::<TaskStatus>().map_err(CollectError::fatal)?;
            counts.insert(status, count);
        }
        Ok(counts)
    }

    pub fn file_size(&self) -> Result<u64> {
        Ok(std::fs::metadata(&self.path)?.len())
    }

    /// Post counts bucketed by creation date.
    pub async fn count_posts_by_period(&self, period: StatsPeriod) -> Result<Vec<PeriodBucket>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT strftime(?, date_created) AS bucket, COUNT(*) \
             FROM post GROUP BY bucket ORDER BY bucket",
        )
        .bind(period.strftime_format())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(period, count)| PeriodBucket { period, count })
            .collect())
    }

    /// Tasks whose status is in `states`, or outside them when `negate` is set.
    pub async fn get_tasks_of_states(
        &self,
        states: &[TaskStatus],
        negate: bool,
    ) -> Result<Vec<CollectionTask>> {
        if states.is_empty() {
            if !negate {
                return Ok(Vec::new());
            }
            let sql = format!("SELECT {TASK_COLUMNS} FROM collection_task ORDER BY id ASC");
            let rows = sqlx::query_as::<_, TaskRow>(&sql)
                .fetch_all(&self.pool)
                .await?;
            return rows.into_iter().map(TaskRow::into_task).collect();
        }
        let placeholders = vec!["?"; states.len()].join(", ");
        let not = if negate { "NOT" } else { "" };
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM collection_task \
             WHERE status {not} IN ({placeholders}) ORDER BY id ASC"
        );
        let mut query = sqlx::query_as::<_, TaskRow>(&sql);
        for state in states {
            query = query.bind(state.as_str());
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(TaskRow::into_task).collect()
    }

    /// Reset the given tasks to `INIT`.
    pub async fn reset_task_states(&self, ids: &[i64]) -> Result<u64> {
        let mut affected = 0;
        for chunk in ids.chunks(400) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "UPDATE collection_task SET status = ? WHERE id IN ({placeholders})"
            );
            let mut query = sqlx::query(&sql).bind(TaskStatus::Init.as_str());
            for id in chunk {
                query = query.bind(id);
            }
            affected += query.execute(&self.pool).await?.rows_affected();
        }
        Ok(affected)
    }
}

/// Next free numeric suffix for `{prefix}_{n}` names.
fn next_index(names: impl Iterator<Item = String>, prefix: &str) -> u64 {
    let lead = format!("{prefix}_");
    names
        .filter_map(|name| {
            name.strip_prefix(&lead)
                .and_then(|suffix| suffix.parse::<u64>().ok())
        })
        .max()
        .map(|max| max + 1)
        .unwrap_or(0)
}
