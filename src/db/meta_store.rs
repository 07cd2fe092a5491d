//! Catalog of per-platform stores.
//!
//! Single source of truth mapping a platform symbol to the filesystem path
//! of its store. Registration is idempotent.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sqlx::sqlite::SqlitePool;
use sqlx::FromRow;

use crate::db::connection::open_sqlite_pool;
use crate::db::platform_store::PlatformStore;
use crate::db::schema::init_meta_schema;
use crate::error::Result;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PlatformCatalogEntry {
    pub id: i64,
    pub platform: String,
    pub db_path: String,
    pub is_default: bool,
}

/// One row of the general status report. A missing or unreadable store is
/// reported through `error` instead of failing the whole call.
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseStatusRow {
    pub platform: String,
    pub db_path: String,
    pub total_posts: Option<i64>,
    pub size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_counts: Option<BTreeMap<String, i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct MetaStore {
    pool: SqlitePool,
    path: PathBuf,
}

impl MetaStore {
    pub async fn open(path: &Path, create: bool) -> Result<Self> {
        let pool = open_sqlite_pool(path, create).await?;
        init_meta_schema(&pool).await?;
        Ok(MetaStore {
            pool,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn list_databases(&self) -> Result<Vec<PlatformCatalogEntry>> {
        let entries = sqlx::query_as::<_, PlatformCatalogEntry>(
            "SELECT id, platform, db_path, is_default FROM platform_database ORDER BY platform",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    /// Register a platform store. Adding an existing `(platform)` is a no-op.
    pub async fn add_database(&self, platform: &str, db_path: &Path, is_default: bool) -> Result<()> {
        let existing: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM platform_database WHERE platform = ?")
                .bind(platform)
                .fetch_optional(&self.pool)
                .await?;
        if existing.is_some() {
            return Ok(());
        }
        sqlx::query("INSERT INTO platform_database (platform, db_path, is_default) VALUES (?, ?, ?)")
            .bind(platform)
            .bind(db_path.to_string_lossy().as_ref())
            .bind(is_default)
            .execute(&self.pool)
            .await?;
        tracing::info!(platform = %platform, path = %db_path.display(), "registered platform store");
        Ok(())
    }

    /// Join the catalog with per-store counts. Stores that cannot be opened
    /// yield an error row rather than failing the call.
    pub async fn general_status(&self, include_task_counts: bool) -> Result<Vec<DatabaseStatusRow>> {
        let mut rows = Vec::new();
        for entry in self.list_databases().await? {
            rows.push(status_row(&entry, include_task_counts).await);
        }
        Ok(rows)
    }
}

async fn status_row(entry: &PlatformCatalogEntry, include_task_counts: bool) -> DatabaseStatusRow {
    let path = Path::new(&entry.db_path);
    let mut row = DatabaseStatusRow {
        platform: entry.platform.clone(),
        db_path: entry.db_path.clone(),
        total_posts: None,
        size_bytes: None,
        task_counts: None,
        error: None,
    };

    if !path.exists() {
        row.error = Some("store file missing".to_string());
        return row;
    }

    let store = match PlatformStore::open(&entry.platform, path, false).await {
        Ok(store) => store,
        Err(err) => {
            row.error = Some(err.to_string());
            return row;
        }
    };

    match store.count_posts().await {
        Ok(count) => row.total_posts = Some(count),
        Err(err) => {
            row.error = Some(err.to_string());
            return row;
        }
    }
    row.size_bytes = store.file_size().ok();

    if include_task_counts {
        match store.count_states().await {
            Ok(counts) => {
                row.task_counts = Some(
                    counts
                        .into_iter()
                        .map(|(status, count)| (status.as_str().to_string(), count))
                        .collect(),
                );
            }
            Err(err) => row.error = Some(err.to_string()),
        }
    }
    row
}
