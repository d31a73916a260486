//! 反思：对本轮结果做摘要，纯参考信息，不影响控制流

use async_trait::async_trait;

use crate::core::RunState;

#[async_trait]
pub trait Reflector: Send + Sync {
    async fn reflect(&self, state: &RunState) -> Result<String, String>;
}

/// 默认反思：由状态字段拼出一行摘要
#[derive(Debug, Default, Clone)]
pub struct SummaryReflector;

#[async_trait]
impl Reflector for SummaryReflector {
    async fn reflect(&self, state: &RunState) -> Result<String, String> {
        let decision = state
            .decision
            .as_ref()
            .map(|d| match &d.target_component {
                Some(t) => format!("{} {} (confidence {:.2})", d.action, t, d.confidence),
                None => format!("{} (confidence {:.2})", d.action, d.confidence),
            })
            .unwrap_or_else(|| "no decision".to_string());
        let performance = state
            .measured_performance
            .map(|p| format!("quality {:.3}, cost {:.3}s", p.quality, p.cost))
            .unwrap_or_else(|| "not measured".to_string());
        Ok(format!(
            "Task '{}' cycle {}: {}; active component {}; {}",
            state.task_name,
            state.cycle + 1,
            decision,
            state.active_component.as_deref().unwrap_or("<none>"),
            performance
        ))
    }
}
