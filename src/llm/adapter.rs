//! 基于文本生成器的 Decider / Reflector
//!
//! 生成器输出中提取 JSON（```json 代码块或首尾花括号之间），解析为 Decision。
//! 解析失败返回 InvalidDecision，由控制循环路由到 Fallback。

use std::sync::Arc;

use async_trait::async_trait;

use crate::control::Reflector;
use crate::core::{ControlError, RunState};
use crate::decision::{Decider, Decision};
use crate::llm::{Purpose, TextGenerator};

/// 从生成文本中解析 Decision
pub fn parse_decision(output: &str) -> Result<Decision, ControlError> {
    let trimmed = output.trim();

    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```")
            .map(|end| rest[..end].trim())
            .unwrap_or(rest.trim())
    } else if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            &trimmed[start..=end]
        } else {
            trimmed
        }
    } else {
        return Err(ControlError::InvalidDecision(format!(
            "no JSON object in generator output: {}",
            preview(trimmed)
        )));
    };

    let decision: Decision = serde_json::from_str(json_str)
        .map_err(|e| ControlError::InvalidDecision(format!("{}: {}", e, preview(json_str))))?;
    decision.validate()?;
    Ok(decision)
}

fn preview(s: &str) -> String {
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s.to_string()
    }
}

/// 用文本生成器做决策；上下文为整个 RunState 的 JSON
pub struct GenerativeDecider {
    generator: Arc<dyn TextGenerator>,
}

impl GenerativeDecider {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Decider for GenerativeDecider {
    async fn decide(&self, state: &RunState) -> Result<Decision, ControlError> {
        let context = serde_json::to_value(state)
            .map_err(|e| ControlError::Decider(format!("state serialization failed: {e}")))?;
        let output = self
            .generator
            .generate(Purpose::Decide, &context)
            .await
            .map_err(ControlError::Decider)?;
        parse_decision(&output)
    }
}

/// 用文本生成器做反思（仅供参考，不影响控制流）
pub struct GenerativeReflector {
    generator: Arc<dyn TextGenerator>,
}

impl GenerativeReflector {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Reflector for GenerativeReflector {
    async fn reflect(&self, state: &RunState) -> Result<String, String> {
        let context = serde_json::to_value(state).map_err(|e| e.to_string())?;
        self.generator.generate(Purpose::Reflect, &context).await
    }
}
