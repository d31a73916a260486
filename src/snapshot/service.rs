//! 快照服务
//!
//! 包装 SnapshotStorage：序列化 RunState、写 manifest、按 id 读回状态。
//! take_snapshot / load_snapshot_state 从不把存储错误抛给调用方，只记录日志并返回 None；
//! 需要错误细节的调用方使用 try_ 版本。

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;

use crate::core::{RunState, SnapshotError};
use crate::snapshot::manifest::{
    new_snapshot_id, ManifestQuery, ManifestScan, SnapshotId, SnapshotManifest,
};
use crate::snapshot::storage::SnapshotStorage;

/// 扫描默认上限
pub const DEFAULT_SCAN_LIMIT: usize = 1000;

pub struct SnapshotService {
    storage: Arc<dyn SnapshotStorage>,
    scan_limit: usize,
}

impl SnapshotService {
    pub fn new(storage: Arc<dyn SnapshotStorage>) -> Self {
        Self {
            storage,
            scan_limit: DEFAULT_SCAN_LIMIT,
        }
    }

    pub fn with_scan_limit(mut self, limit: usize) -> Self {
        self.scan_limit = limit.max(1);
        self
    }

    pub fn scan_limit(&self) -> usize {
        self.scan_limit
    }

    /// 拍快照；失败返回 None（调用方将其视为“快照不可用”并继续）
    pub async fn take_snapshot(
        &self,
        trigger: &str,
        state: &RunState,
        metadata: BTreeMap<String, String>,
    ) -> Option<SnapshotId> {
        match self.try_take_snapshot(trigger, state, metadata).await {
            Ok(id) => {
                tracing::debug!(
                    snapshot_id = %id,
                    run_id = %state.run_id,
                    trigger,
                    "snapshot taken"
                );
                Some(id)
            }
            Err(e) => {
                tracing::warn!(
                    run_id = %state.run_id,
                    correlation_id = %state.correlation_id,
                    trigger,
                    "snapshot unavailable: {}",
                    e
                );
                None
            }
        }
    }

    pub async fn try_take_snapshot(
        &self,
        trigger: &str,
        state: &RunState,
        metadata: BTreeMap<String, String>,
    ) -> Result<SnapshotId, SnapshotError> {
        let blob = serde_json::to_vec(state)?;
        let id = new_snapshot_id();
        let manifest = SnapshotManifest {
            id: id.clone(),
            trigger: trigger.to_string(),
            correlation_id: state.correlation_id.clone(),
            run_id: state.run_id.clone(),
            created_at: Utc::now(),
            metadata,
            blob_ref: id.clone(),
        };
        self.storage.put(&manifest, blob).await?;
        Ok(id)
    }

    /// 读回快照中的 RunState；不存在或读取失败返回 None
    pub async fn load_snapshot_state(&self, id: &str) -> Option<RunState> {
        match self.try_load_snapshot_state(id).await {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(snapshot_id = id, "failed to load snapshot: {}", e);
                None
            }
        }
    }

    pub async fn try_load_snapshot_state(&self, id: &str) -> Result<Option<RunState>, SnapshotError> {
        match self.storage.blob(id).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// 原始 blob（用于校验同一 id 重复读取字节一致）
    pub async fn raw_state(&self, id: &str) -> Result<Option<Vec<u8>>, SnapshotError> {
        self.storage.blob(id).await
    }

    pub async fn manifest(&self, id: &str) -> Result<Option<SnapshotManifest>, SnapshotError> {
        self.storage.manifest(id).await
    }

    /// 列出最近的 manifest（最多 limit 条，旧 → 新）
    pub async fn list_manifests(&self, limit: usize) -> Result<ManifestScan, SnapshotError> {
        self.storage.scan(&ManifestQuery::all(limit)).await
    }

    /// 某个 correlation_id 下的全部 manifest，上限为 scan_limit
    pub async fn manifests_for_correlation(&self, correlation_id: &str) -> Result<ManifestScan, SnapshotError> {
        let scan = self
            .storage
            .scan(&ManifestQuery::for_correlation(correlation_id, self.scan_limit))
            .await?;
        if scan.truncated {
            tracing::warn!(
                correlation_id,
                total = scan.total,
                limit = self.scan_limit,
                "manifest scan truncated to most recent entries"
            );
        }
        Ok(scan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::manifest::snapshot_metadata;
    use crate::snapshot::storage::InMemorySnapshotStorage;
    use async_trait::async_trait;

    /// 所有写入都失败的存储
    struct FailingStorage;

    #[async_trait]
    impl SnapshotStorage for FailingStorage {
        async fn put(&self, _m: &SnapshotManifest, _b: Vec<u8>) -> Result<(), SnapshotError> {
            Err(SnapshotError::Backend("disk full".to_string()))
        }
        async fn manifest(&self, _id: &str) -> Result<Option<SnapshotManifest>, SnapshotError> {
            Ok(None)
        }
        async fn blob(&self, _id: &str) -> Result<Option<Vec<u8>>, SnapshotError> {
            Err(SnapshotError::Backend("unreadable".to_string()))
        }
        async fn scan(&self, _q: &ManifestQuery) -> Result<ManifestScan, SnapshotError> {
            Ok(ManifestScan::default())
        }
    }

    #[tokio::test]
    async fn test_roundtrip_deep_equal() {
        let service = SnapshotService::new(Arc::new(InMemorySnapshotStorage::new()));
        let mut state = RunState::new("classify", serde_json::json!({"doc": 7}));
        state.record_snapshot("run_start", None);
        state.active_component = Some("a".to_string());

        let id = service
            .take_snapshot("unit", &state, snapshot_metadata([("node", "test")]))
            .await
            .unwrap();
        let loaded = service.load_snapshot_state(&id).await.unwrap();
        assert_eq!(loaded, state);

        let first = service.raw_state(&id).await.unwrap();
        let second = service.raw_state(&id).await.unwrap();
        assert_eq!(first, second);

        let manifest = service.manifest(&id).await.unwrap().unwrap();
        assert_eq!(manifest.correlation_id, state.correlation_id);
        assert_eq!(manifest.meta("node"), Some("test"));
    }

    #[tokio::test]
    async fn test_storage_failure_returns_none() {
        let service = SnapshotService::new(Arc::new(FailingStorage));
        let state = RunState::new("t", serde_json::Value::Null);
        assert!(service.take_snapshot("unit", &state, BTreeMap::new()).await.is_none());
        assert!(service.load_snapshot_state("snap_x").await.is_none());
    }

    #[tokio::test]
    async fn test_missing_id_is_none() {
        let service = SnapshotService::new(Arc::new(InMemorySnapshotStorage::new()));
        assert!(service.load_snapshot_state("snap_missing").await.is_none());
    }
}
