//! 快照存储抽象层
//!
//! 追加写的 manifest 索引 + 以快照 id 为键的 blob 存储。支持按 id 点查与有界扫描；
//! 缺失 id 返回 None，而不是默认构造的空状态。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::core::SnapshotError;
use crate::snapshot::manifest::{ManifestQuery, ManifestScan, SnapshotManifest};

#[cfg(feature = "async-sqlite")]
use crate::snapshot::sqlite_store::SqliteSnapshotStorage;
use crate::snapshot::file_store::FileSnapshotStorage;

/// 快照存储接口
#[async_trait]
pub trait SnapshotStorage: Send + Sync {
    /// 写入 manifest 与对应 blob；id 已存在时返回 DuplicateId
    async fn put(&self, manifest: &SnapshotManifest, blob: Vec<u8>) -> Result<(), SnapshotError>;

    async fn manifest(&self, id: &str) -> Result<Option<SnapshotManifest>, SnapshotError>;

    async fn blob(&self, id: &str) -> Result<Option<Vec<u8>>, SnapshotError>;

    /// 按写入顺序扫描匹配的 manifest
    async fn scan(&self, query: &ManifestQuery) -> Result<ManifestScan, SnapshotError>;
}

#[derive(Default)]
struct MemoryInner {
    manifests: Vec<SnapshotManifest>,
    index: HashMap<String, usize>,
    blobs: HashMap<String, Vec<u8>>,
}

/// 内存快照存储（测试与单进程场景）
#[derive(Default)]
pub struct InMemorySnapshotStorage {
    inner: RwLock<MemoryInner>,
}

impl InMemorySnapshotStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.manifests.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl SnapshotStorage for InMemorySnapshotStorage {
    async fn put(&self, manifest: &SnapshotManifest, blob: Vec<u8>) -> Result<(), SnapshotError> {
        let mut inner = self.inner.write().await;
        if inner.index.contains_key(&manifest.id) {
            return Err(SnapshotError::DuplicateId(manifest.id.clone()));
        }
        let position = inner.manifests.len();
        inner.index.insert(manifest.id.clone(), position);
        inner.blobs.insert(manifest.blob_ref.clone(), blob);
        inner.manifests.push(manifest.clone());
        Ok(())
    }

    async fn manifest(&self, id: &str) -> Result<Option<SnapshotManifest>, SnapshotError> {
        let inner = self.inner.read().await;
        Ok(inner.index.get(id).map(|&i| inner.manifests[i].clone()))
    }

    async fn blob(&self, id: &str) -> Result<Option<Vec<u8>>, SnapshotError> {
        let inner = self.inner.read().await;
        let Some(&i) = inner.index.get(id) else {
            return Ok(None);
        };
        Ok(inner.blobs.get(&inner.manifests[i].blob_ref).cloned())
    }

    async fn scan(&self, query: &ManifestQuery) -> Result<ManifestScan, SnapshotError> {
        let inner = self.inner.read().await;
        let matched = inner
            .manifests
            .iter()
            .filter(|m| query.matches(m))
            .cloned()
            .collect();
        Ok(ManifestScan::from_matched(matched, query.limit))
    }
}

/// 根据配置创建快照存储
///
/// backend 为 file 时使用 dir；为 sqlite 且启用了 async-sqlite feature 时使用 db_path；
/// 创建失败或未知后端回退到内存存储。
pub async fn create_snapshot_storage(
    backend: &str,
    dir: &std::path::Path,
    db_path: &std::path::Path,
) -> Arc<dyn SnapshotStorage> {
    match backend.to_lowercase().as_str() {
        "file" => match FileSnapshotStorage::open(dir).await {
            Ok(store) => {
                tracing::info!("Using file snapshot storage: {:?}", dir);
                return Arc::new(store);
            }
            Err(e) => {
                tracing::warn!("Failed to open file snapshot storage, falling back to memory: {}", e);
            }
        },
        "sqlite" => {
            #[cfg(feature = "async-sqlite")]
            match SqliteSnapshotStorage::new(db_path).await {
                Ok(store) => {
                    tracing::info!("Using sqlite snapshot storage: {:?}", db_path);
                    return Arc::new(store);
                }
                Err(e) => {
                    tracing::warn!("Failed to open sqlite snapshot storage, falling back to memory: {}", e);
                }
            }

            #[cfg(not(feature = "async-sqlite"))]
            tracing::warn!(
                "Sqlite snapshot storage requested ({:?}) but async-sqlite feature not enabled, using memory storage",
                db_path
            );
        }
        "memory" => {}
        other => tracing::warn!("Unknown snapshot backend '{}', using memory storage", other),
    }

    tracing::info!("Using in-memory snapshot storage");
    Arc::new(InMemorySnapshotStorage::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::manifest::new_snapshot_id;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn manifest(corr: &str) -> SnapshotManifest {
        let id = new_snapshot_id();
        SnapshotManifest {
            blob_ref: id.clone(),
            id,
            trigger: "unit".to_string(),
            correlation_id: corr.to_string(),
            run_id: "run_1".to_string(),
            created_at: Utc::now(),
            metadata: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_put_and_lookup() {
        let store = InMemorySnapshotStorage::new();
        let m = manifest("c");
        store.put(&m, b"{}".to_vec()).await.unwrap();

        assert_eq!(store.manifest(&m.id).await.unwrap(), Some(m.clone()));
        assert_eq!(store.blob(&m.id).await.unwrap(), Some(b"{}".to_vec()));
        assert!(store.manifest("snap_missing").await.unwrap().is_none());
        assert!(store.blob("snap_missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_once() {
        let store = InMemorySnapshotStorage::new();
        let m = manifest("c");
        store.put(&m, b"1".to_vec()).await.unwrap();
        let err = store.put(&m, b"2".to_vec()).await.unwrap_err();
        assert!(matches!(err, SnapshotError::DuplicateId(_)));
        assert_eq!(store.blob(&m.id).await.unwrap(), Some(b"1".to_vec()));
    }

    #[tokio::test]
    async fn test_scan_is_complete_below_limit() {
        let store = InMemorySnapshotStorage::new();
        for i in 0..10 {
            let corr = if i % 2 == 0 { "even" } else { "odd" };
            store.put(&manifest(corr), Vec::new()).await.unwrap();
        }
        let scan = store.scan(&ManifestQuery::for_correlation("even", 100)).await.unwrap();
        assert_eq!(scan.manifests.len(), 5);
        assert!(!scan.truncated);

        let scan = store.scan(&ManifestQuery::all(3)).await.unwrap();
        assert_eq!(scan.manifests.len(), 3);
        assert_eq!(scan.total, 10);
        assert!(scan.truncated);
    }

    #[tokio::test]
    async fn test_create_unknown_backend_falls_back() {
        let dir = std::path::Path::new("unused");
        let store = create_snapshot_storage("redis", dir, dir).await;
        assert!(store.scan(&ManifestQuery::all(10)).await.unwrap().manifests.is_empty());
    }
}
