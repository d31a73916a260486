//! 控制循环错误类型
//!
//! 决策期错误（IncompleteRequirements / ComponentNotFound / InvalidDecision）路由到 Fallback；
//! 执行期错误（ComponentExecutionError）按动作决定是否自动回滚；快照错误只记录缺口，不终止运行。

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 快照存储 / 序列化失败
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 快照 id 只能写一次
    #[error("Snapshot id already exists: {0}")]
    DuplicateId(String),

    #[error("Snapshot backend error: {0}")]
    Backend(String),
}

/// 手动回滚失败原因（对调用方表现为 success=false）
#[derive(Error, Debug)]
pub enum ReversalError {
    #[error("No snapshot matches correlation id {0}")]
    NoMatchingSnapshot(String),

    #[error("Failed to load snapshot {0}")]
    LoadFailed(String),

    #[error("Reverted run failed: {0}")]
    RunFailed(String),
}

/// 控制循环内部错误
#[derive(Error, Debug)]
pub enum ControlError {
    #[error("Incomplete requirements: missing {0}")]
    IncompleteRequirements(String),

    #[error("Component not found: {0}")]
    ComponentNotFound(String),

    #[error("Component execution failed: {0}")]
    ComponentExecutionError(String),

    #[error("Invalid decision: {0}")]
    InvalidDecision(String),

    /// 外部决策函数（规则引擎或生成模型）失败
    #[error("Decider error: {0}")]
    Decider(String),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Reversal(#[from] ReversalError),

    #[error("Config error: {0}")]
    Config(String),
}

impl ControlError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ControlError::IncompleteRequirements(_) => ErrorKind::IncompleteRequirements,
            ControlError::ComponentNotFound(_) => ErrorKind::ComponentNotFound,
            ControlError::ComponentExecutionError(_) => ErrorKind::ComponentExecutionError,
            ControlError::InvalidDecision(_) | ControlError::Decider(_) => ErrorKind::InvalidDecision,
            ControlError::Snapshot(_) => ErrorKind::SnapshotError,
            ControlError::Reversal(_) => ErrorKind::ReversalError,
            ControlError::Config(_) => ErrorKind::Config,
        }
    }
}

/// RunState 中记录的错误类别（可序列化，随快照持久化）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    IncompleteRequirements,
    ComponentNotFound,
    ComponentExecutionError,
    InvalidDecision,
    SnapshotError,
    ReversalError,
    Config,
}

/// 附着在 RunState 上的结构化错误
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepError {
    pub kind: ErrorKind,
    pub message: String,
    /// 出错的步骤名
    pub step: String,
}

impl StepError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, step: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            step: step.into(),
        }
    }

    pub fn from_control(err: &ControlError, step: impl Into<String>) -> Self {
        Self::new(err.kind(), err.to_string(), step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err = ControlError::ComponentNotFound("ghost".to_string());
        assert_eq!(err.kind(), ErrorKind::ComponentNotFound);
        assert!(err.to_string().contains("ghost"));

        let err = ControlError::from(SnapshotError::DuplicateId("snap_1".to_string()));
        assert_eq!(err.kind(), ErrorKind::SnapshotError);
    }

    #[test]
    fn test_step_error_from_control() {
        let err = ControlError::IncompleteRequirements("max_cost".to_string());
        let step_err = StepError::from_control(&err, "decide");
        assert_eq!(step_err.kind, ErrorKind::IncompleteRequirements);
        assert_eq!(step_err.step, "decide");
        assert!(step_err.message.contains("max_cost"));
    }
}
