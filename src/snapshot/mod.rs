//! 快照：manifest、存储后端（内存 / 文件 / SQLite）与快照服务

pub mod file_store;
pub mod manifest;
pub mod service;
#[cfg(feature = "async-sqlite")]
pub mod sqlite_store;
pub mod storage;

pub use file_store::FileSnapshotStorage;
pub use manifest::{
    meta, snapshot_metadata, ManifestQuery, ManifestScan, SnapshotId, SnapshotManifest,
};
pub use service::SnapshotService;
#[cfg(feature = "async-sqlite")]
pub use sqlite_store::SqliteSnapshotStorage;
pub use storage::{create_snapshot_storage, InMemorySnapshotStorage, SnapshotStorage};
