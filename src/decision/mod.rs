//! 决策层：Decision 类型、规则引擎与 Decider 接口
//!
//! Decider 是控制循环可替换的外部协作者：可以是规则引擎（RuleDecider），
//! 也可以是文本生成模型（见 llm::GenerativeDecider）。

pub mod engine;
pub mod types;

use async_trait::async_trait;

use crate::core::{ControlError, RunState};

pub use engine::DecisionEngine;
pub use types::{Action, Decision};

/// 决策函数：读取 RunState，返回 Decision
#[async_trait]
pub trait Decider: Send + Sync {
    async fn decide(&self, state: &RunState) -> Result<Decision, ControlError>;
}

/// 基于 DecisionEngine 的规则决策
#[derive(Debug, Default, Clone)]
pub struct RuleDecider {
    engine: DecisionEngine,
}

impl RuleDecider {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Decider for RuleDecider {
    async fn decide(&self, state: &RunState) -> Result<Decision, ControlError> {
        self.engine
            .decide(&state.requirements, &state.performance_snapshot)
    }
}
