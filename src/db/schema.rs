//! Table definitions, applied idempotently at store open.

use sqlx::SqlitePool;

const PLATFORM_TABLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS collection_task (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        task_name TEXT NOT NULL,
        platform TEXT NOT NULL,
        collection_config TEXT NOT NULL,
        platform_config TEXT,
        status TEXT NOT NULL DEFAULT 'INIT',
        found_items INTEGER,
        added_items INTEGER,
        collection_duration_ms INTEGER,
        transient INTEGER NOT NULL DEFAULT 0,
        test INTEGER NOT NULL DEFAULT 0,
        overwrite INTEGER NOT NULL DEFAULT 0,
        test_data TEXT,
        time_added TEXT NOT NULL,
        execution_ts TEXT,
        CONSTRAINT uq_task_name UNIQUE (task_name)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS post (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        platform TEXT NOT NULL,
        platform_id TEXT NOT NULL,
        post_url TEXT,
        date_created TEXT NOT NULL,
        date_collected TEXT NOT NULL,
        post_type TEXT NOT NULL DEFAULT 'REGULAR',
        content TEXT NOT NULL,
        metadata_content TEXT,
        collection_task_id INTEGER
            REFERENCES collection_task(id) ON DELETE SET NULL,
        CONSTRAINT uq_platform_id UNIQUE (platform_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        platform TEXT NOT NULL,
        platform_username TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS comment (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        date_created TEXT,
        content TEXT NOT NULL,
        date_collected TEXT NOT NULL,
        post_id INTEGER NOT NULL REFERENCES post(id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS ix_task_status ON collection_task(status)",
    "CREATE INDEX IF NOT EXISTS ix_post_task ON post(collection_task_id)",
];

const META_TABLES: &[&str] = &[r#"
    CREATE TABLE IF NOT EXISTS platform_database (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        platform TEXT NOT NULL,
        db_path TEXT NOT NULL,
        is_default INTEGER NOT NULL DEFAULT 0,
        CONSTRAINT uq_platform UNIQUE (platform)
    )
    "#];

pub async fn init_platform_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for statement in PLATFORM_TABLES {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

pub async fn init_meta_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for statement in META_TABLES {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
