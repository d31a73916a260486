//! 回滚管理
//!
//! 唯一支持的"撤销"方式：载入一个历史快照，以它为种子启动一次新的控制循环运行
//! （新 run_id，相同 correlation_id）。已有状态从不原地修改。

pub mod predicates;

use std::sync::Arc;

use serde::Serialize;

use crate::control::ControlLoop;
use crate::core::{ReversalError, RunState};
use crate::snapshot::{SnapshotId, SnapshotManifest};

pub use predicates::{metadata_eq, pre_action, trigger_is};

/// 手动回滚的结果
#[derive(Debug, Clone, Serialize)]
pub struct ReversalOutcome {
    pub success: bool,
    pub message: String,
    pub snapshot_id_used: Option<SnapshotId>,
    /// 新运行的最终状态（载入失败时为 None）
    pub final_state: Option<RunState>,
}

impl ReversalOutcome {
    fn failed(err: &ReversalError, snapshot_id: Option<SnapshotId>, final_state: Option<RunState>) -> Self {
        Self {
            success: false,
            message: err.to_string(),
            snapshot_id_used: snapshot_id,
            final_state,
        }
    }
}

pub struct ReversalManager {
    control: Arc<ControlLoop>,
}

impl ReversalManager {
    pub fn new(control: Arc<ControlLoop>) -> Self {
        Self { control }
    }

    /// 在 correlation_id 下找最近一个满足条件的快照；扫描失败视为未找到
    pub async fn identify_pre_action_snapshot<P>(
        &self,
        correlation_id: &str,
        predicate: P,
    ) -> Option<SnapshotId>
    where
        P: Fn(&SnapshotManifest) -> bool + Send + Sync,
    {
        let scan = match self
            .control
            .snapshots()
            .manifests_for_correlation(correlation_id)
            .await
        {
            Ok(scan) => scan,
            Err(e) => {
                tracing::warn!(correlation_id, "manifest scan failed: {}", e);
                return None;
            }
        };
        // 扫描结果按写入顺序，从尾部开始即最近
        scan.manifests
            .iter()
            .rev()
            .find(|m| predicate(m))
            .map(|m| m.id.clone())
    }

    /// 以快照为种子启动一次新运行
    pub async fn revert_to_snapshot(&self, snapshot_id: &str) -> ReversalOutcome {
        let seed = match self.control.snapshots().try_load_snapshot_state(snapshot_id).await {
            Ok(Some(state)) => state,
            Ok(None) => {
                let err = ReversalError::LoadFailed(format!("{snapshot_id}: not found"));
                tracing::warn!("{}", err);
                return ReversalOutcome::failed(&err, Some(snapshot_id.to_string()), None);
            }
            Err(e) => {
                let err = ReversalError::LoadFailed(format!("{snapshot_id}: {e}"));
                tracing::warn!("{}", err);
                return ReversalOutcome::failed(&err, Some(snapshot_id.to_string()), None);
            }
        };

        if let Err(e) = self
            .control
            .executor()
            .restore_active(seed.active_component.as_deref())
            .await
        {
            tracing::warn!(snapshot_id, "failed to restore active component: {}", e);
        }

        let seed = seed.reseed(snapshot_id);
        tracing::info!(
            snapshot_id,
            run_id = %seed.run_id,
            correlation_id = %seed.correlation_id,
            "starting reverted run"
        );
        let final_state = self.control.start_new_run(seed).await;

        match final_state.error.as_ref().map(|e| e.message.clone()) {
            Some(message) => {
                let err = ReversalError::RunFailed(message);
                ReversalOutcome::failed(&err, Some(snapshot_id.to_string()), Some(final_state))
            }
            None => ReversalOutcome {
                success: true,
                message: format!(
                    "Reverted to snapshot {snapshot_id}; new run {} completed",
                    final_state.run_id
                ),
                snapshot_id_used: Some(snapshot_id.to_string()),
                final_state: Some(final_state),
            },
        }
    }

    /// identify + revert 的组合
    pub async fn revert_to_latest<P>(&self, correlation_id: &str, predicate: P) -> ReversalOutcome
    where
        P: Fn(&SnapshotManifest) -> bool + Send + Sync,
    {
        match self.identify_pre_action_snapshot(correlation_id, predicate).await {
            Some(id) => self.revert_to_snapshot(&id).await,
            None => {
                let err = ReversalError::NoMatchingSnapshot(correlation_id.to_string());
                tracing::warn!("{}", err);
                ReversalOutcome::failed(&err, None, None)
            }
        }
    }
}
