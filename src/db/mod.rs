//! SQLite-backed stores.
//!
//! One platform store per platform, exclusively owned by its manager, plus a
//! process-wide meta store cataloguing them.

pub mod connection;
pub mod merge;
pub mod meta_store;
pub mod platform_store;
mod schema;

pub use connection::open_sqlite_pool;
pub use merge::{find_conflicting_posts, find_conflicting_tasks, merge_stores, MergeStats};
pub use meta_store::{DatabaseStatusRow, MetaStore, PlatformCatalogEntry};
pub use platform_store::{InsertOutcome, PeriodBucket, PlatformStore, StatsPeriod};
