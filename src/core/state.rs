//! 运行状态：RunState 在单次控制循环内按值在步骤间传递
//!
//! 所有映射使用 BTreeMap，保证同一状态序列化后字节一致（快照可重复读取比对）。

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::error::StepError;
use crate::decision::Decision;
use crate::monitor::{ComponentMetrics, Performance, Requirements};

/// 控制循环的步骤
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopStep {
    Monitor,
    Decide,
    Fallback,
    Execute,
    Reflect,
}

impl LoopStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopStep::Monitor => "monitor",
            LoopStep::Decide => "decide",
            LoopStep::Fallback => "fallback",
            LoopStep::Execute => "execute",
            LoopStep::Reflect => "reflect",
        }
    }
}

impl std::fmt::Display for LoopStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 当前活跃组件是如何被选中的
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationReason {
    /// 由 Decision 选中
    Decided,
    /// 被回滚等外部动作覆盖
    Overridden,
    /// 注册表默认组件（Fallback 或未决策）
    Default,
}

/// 可审阅的步骤轨迹
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub step: String,
    pub at: DateTime<Utc>,
    pub note: String,
}

/// 一次控制循环执行的完整状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    /// 每次执行尝试生成（回滚后会重新生成）
    pub run_id: String,
    /// 整个多轮交互内保持不变
    pub correlation_id: String,
    pub task_name: String,
    /// 本次工作单元的输入参数
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub requirements: Requirements,
    /// 本轮观测到的各组件指标
    #[serde(default)]
    pub performance_snapshot: BTreeMap<String, ComponentMetrics>,
    #[serde(default)]
    pub decision: Option<Decision>,
    #[serde(default)]
    pub active_component: Option<String>,
    #[serde(default)]
    pub activation_reason: Option<ActivationReason>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub measured_performance: Option<Performance>,
    #[serde(default)]
    pub error: Option<StepError>,
    #[serde(default)]
    pub done: bool,
    /// 已完成的 Reflect 轮数
    #[serde(default)]
    pub cycle: usize,
    /// 步骤名 -> 快照 id；None 表示该点快照缺失
    #[serde(default)]
    pub last_snapshot_ids: BTreeMap<String, Option<String>>,
    /// 仅由自动回滚设置
    #[serde(default)]
    pub reverted_from_snapshot: Option<String>,
    /// 手动回滚时作为种子的快照
    #[serde(default)]
    pub restored_from_snapshot: Option<String>,
    #[serde(default)]
    pub reflection: Option<String>,
    #[serde(default)]
    pub trace: Vec<TraceEntry>,
}

impl RunState {
    /// 新建一次全新的运行（新的 run_id 与 correlation_id）
    pub fn new(task_name: impl Into<String>, params: Value) -> Self {
        Self::with_correlation(task_name, params, new_correlation_id())
    }

    pub fn with_correlation(
        task_name: impl Into<String>,
        params: Value,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self {
            run_id: new_run_id(),
            correlation_id: correlation_id.into(),
            task_name: task_name.into(),
            params,
            requirements: Requirements::default(),
            performance_snapshot: BTreeMap::new(),
            decision: None,
            active_component: None,
            activation_reason: None,
            result: None,
            measured_performance: None,
            error: None,
            done: false,
            cycle: 0,
            last_snapshot_ids: BTreeMap::new(),
            reverted_from_snapshot: None,
            restored_from_snapshot: None,
            reflection: None,
            trace: Vec::new(),
        }
    }

    /// 以已有状态为种子开启新一次执行：新 run_id，保留 correlation_id，清除终态与结果字段
    pub fn reseed(mut self, from_snapshot: &str) -> Self {
        self.run_id = new_run_id();
        self.done = false;
        self.error = None;
        self.result = None;
        self.measured_performance = None;
        self.reverted_from_snapshot = None;
        self.restored_from_snapshot = Some(from_snapshot.to_string());
        self.cycle = 0;
        self
    }

    pub fn record(&mut self, step: LoopStep, note: impl Into<String>) {
        self.trace.push(TraceEntry {
            step: step.as_str().to_string(),
            at: Utc::now(),
            note: note.into(),
        });
    }

    /// 记录某个快照点的结果；None 表示快照不可用
    pub fn record_snapshot(&mut self, point: &str, id: Option<String>) {
        self.last_snapshot_ids.insert(point.to_string(), id);
    }

    pub fn snapshot_id(&self, point: &str) -> Option<&str> {
        self.last_snapshot_ids.get(point).and_then(|id| id.as_deref())
    }
}

pub fn new_run_id() -> String {
    format!("run_{}", uuid::Uuid::new_v4())
}

pub fn new_correlation_id() -> String {
    format!("corr_{}", uuid::Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reseed_keeps_correlation() {
        let mut state = RunState::new("summarize", serde_json::json!({"text": "hi"}));
        state.done = true;
        state.result = Some(serde_json::json!("out"));
        let correlation = state.correlation_id.clone();
        let run_id = state.run_id.clone();

        let seeded = state.reseed("snap_1");
        assert_eq!(seeded.correlation_id, correlation);
        assert_ne!(seeded.run_id, run_id);
        assert!(!seeded.done);
        assert!(seeded.result.is_none());
        assert_eq!(seeded.restored_from_snapshot.as_deref(), Some("snap_1"));
    }

    #[test]
    fn test_snapshot_gap_is_recorded() {
        let mut state = RunState::new("t", Value::Null);
        state.record_snapshot("pre_execute", None);
        state.record_snapshot("post_decide", Some("snap_a".to_string()));
        assert!(state.last_snapshot_ids.contains_key("pre_execute"));
        assert_eq!(state.snapshot_id("pre_execute"), None);
        assert_eq!(state.snapshot_id("post_decide"), Some("snap_a"));
    }
}
