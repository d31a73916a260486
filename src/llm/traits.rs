//! 文本生成器抽象
//!
//! 控制循环把生成模型视为不透明的异步函数：输入用途与 JSON 上下文，输出文本。
//! 提示词构造与具体模型调用都在实现方。

use async_trait::async_trait;
use serde_json::Value;

/// 生成用途
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    Decide,
    Reflect,
}

impl Purpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Purpose::Decide => "decide",
            Purpose::Reflect => "reflect",
        }
    }
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, purpose: Purpose, context: &Value) -> Result<String, String>;
}
