//! Mock 文本生成器（用于测试，无需 API）
//!
//! 按用途返回预设文本；未设置时 decide 返回 NoAction 的 JSON，reflect 回显任务名。

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::llm::{Purpose, TextGenerator};

#[derive(Debug, Default)]
pub struct MockTextGenerator {
    decide_reply: Option<String>,
    reflect_reply: Option<String>,
    calls: Mutex<Vec<Purpose>>,
}

impl MockTextGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_decide_reply(mut self, reply: impl Into<String>) -> Self {
        self.decide_reply = Some(reply.into());
        self
    }

    pub fn with_reflect_reply(mut self, reply: impl Into<String>) -> Self {
        self.reflect_reply = Some(reply.into());
        self
    }

    /// 已收到的调用用途
    pub fn calls(&self) -> Vec<Purpose> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl TextGenerator for MockTextGenerator {
    async fn generate(&self, purpose: Purpose, context: &Value) -> Result<String, String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(purpose);
        }
        let reply = match purpose {
            Purpose::Decide => self.decide_reply.clone().unwrap_or_else(|| {
                r#"{"action": "NoAction", "reasoning": "Mock decider", "confidence": 1.0}"#.to_string()
            }),
            Purpose::Reflect => self.reflect_reply.clone().unwrap_or_else(|| {
                let task = context
                    .get("task_name")
                    .and_then(Value::as_str)
                    .unwrap_or("(unknown task)");
                format!("Mock reflection for {task}")
            }),
        };
        Ok(reply)
    }
}
