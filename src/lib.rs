//! Social Collection Backend
//!
//! A multi-platform social-media collection orchestrator: declarative task
//! specs are expanded into concrete collection tasks, dispatched to
//! per-platform adapter clients, and persisted into per-platform SQLite
//! stores under quota, pacing, and deduplication constraints.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use config::{ClientSettings, ConfigError, DbConnection, DbSettings, RunConfig, SinkSettings};
pub use db::{
    find_conflicting_posts, find_conflicting_tasks, merge_stores, DatabaseStatusRow,
    InsertOutcome, MergeStats, MetaStore, PeriodBucket, PlatformCatalogEntry, PlatformStore,
    StatsPeriod,
};
pub use error::{AdapterError, ApiError, CollectError, ErrorResponse, Result};
pub use handlers::{create_router, AppState};
pub use models::*;
pub use services::{
    parse_task_data, AdapterRegistry, ClientAdapter, FixtureAdapter, Orchestrator,
    PlatformManager, PlatformReport, PlatformStatus, PostSink, QuotaRegistry, RunState,
    TaskManager, TaskOutcome, TaskParseError,
};
