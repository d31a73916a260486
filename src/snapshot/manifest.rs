//! 快照清单（manifest）
//!
//! manifest 描述一次快照的触发原因与标识，写入后不可变；序列化后的 RunState 另存为 blob，
//! 通过 blob_ref 关联。

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type SnapshotId = String;

/// 回滚管理器依赖的 metadata 键，保持稳定
pub mod meta {
    pub const NODE: &str = "node";
    pub const STEP: &str = "step";
    pub const COMPONENT_ID: &str = "component_id";
    pub const ACTION_NAME: &str = "action_name";
    pub const ORIGINAL_CORRELATION_ID: &str = "original_correlation_id";
    /// 仅出现在自动回滚后的 manifest 上
    pub const REVERTED_TO_SNAPSHOT_ID: &str = "reverted_to_snapshot_id";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub id: SnapshotId,
    /// 自由文本的触发原因，如 `pre-Compromise`
    pub trigger: String,
    pub correlation_id: String,
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// 序列化状态在存储中的引用
    pub blob_ref: String,
}

impl SnapshotManifest {
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

pub fn new_snapshot_id() -> SnapshotId {
    format!("snap_{}", uuid::Uuid::new_v4().simple())
}

/// 由键值对构造 metadata
pub fn snapshot_metadata<I, K, V>(pairs: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// 清单扫描条件
#[derive(Debug, Clone, Default)]
pub struct ManifestQuery {
    pub correlation_id: Option<String>,
    /// 最多返回条数；超出时保留最新的 limit 条并标记 truncated
    pub limit: usize,
}

impl ManifestQuery {
    pub fn all(limit: usize) -> Self {
        Self {
            correlation_id: None,
            limit,
        }
    }

    pub fn for_correlation(correlation_id: impl Into<String>, limit: usize) -> Self {
        Self {
            correlation_id: Some(correlation_id.into()),
            limit,
        }
    }

    pub fn matches(&self, manifest: &SnapshotManifest) -> bool {
        self.correlation_id
            .as_deref()
            .map_or(true, |c| manifest.correlation_id == c)
    }
}

/// 扫描结果：按写入顺序（旧 → 新）
#[derive(Debug, Clone, Default)]
pub struct ManifestScan {
    pub manifests: Vec<SnapshotManifest>,
    /// 匹配的总条数（可能大于 manifests.len()）
    pub total: usize,
    pub truncated: bool,
}

impl ManifestScan {
    /// 由按写入顺序排列的全部匹配项构造，超出 limit 时截取尾部
    pub fn from_matched(mut matched: Vec<SnapshotManifest>, limit: usize) -> Self {
        let total = matched.len();
        let truncated = total > limit;
        if truncated {
            matched.drain(..total - limit);
        }
        Self {
            manifests: matched,
            total,
            truncated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(id: &str, corr: &str) -> SnapshotManifest {
        SnapshotManifest {
            id: id.to_string(),
            trigger: "t".to_string(),
            correlation_id: corr.to_string(),
            run_id: "run".to_string(),
            created_at: Utc::now(),
            metadata: BTreeMap::new(),
            blob_ref: id.to_string(),
        }
    }

    #[test]
    fn test_scan_keeps_most_recent_when_truncated() {
        let matched = (0..5).map(|i| manifest(&format!("s{i}"), "c")).collect();
        let scan = ManifestScan::from_matched(matched, 2);
        assert!(scan.truncated);
        assert_eq!(scan.total, 5);
        let ids: Vec<_> = scan.manifests.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["s3", "s4"]);
    }

    #[test]
    fn test_query_matches_correlation() {
        let q = ManifestQuery::for_correlation("c1", 10);
        assert!(q.matches(&manifest("a", "c1")));
        assert!(!q.matches(&manifest("b", "c2")));
        assert!(ManifestQuery::all(10).matches(&manifest("b", "c2")));
    }

    #[test]
    fn test_snapshot_ids_unique() {
        assert_ne!(new_snapshot_id(), new_snapshot_id());
    }
}
