//! 执行引擎
//!
//! apply_decision 把 Decision 落到注册表（切换默认组件），execute 解析当前活跃组件并运行一次工作单元，
//! 返回输出与实测表现；每次调用输出一行 JSON 审计日志。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::components::ComponentRegistry;
use crate::core::{ControlError, ErrorKind, RunState};
use crate::decision::{Action, Decision};
use crate::monitor::Performance;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Error,
}

/// 一次执行的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    /// 实际运行的组件
    pub component: Option<String>,
    pub output: Option<Value>,
    pub performance: Performance,
    pub message: Option<String>,
    pub error_type: Option<ErrorKind>,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }

    fn failure(component: Option<String>, err: &ControlError, elapsed: f64) -> Self {
        Self {
            status: ExecutionStatus::Error,
            component,
            output: None,
            performance: Performance {
                quality: 0.0,
                cost: elapsed,
            },
            message: Some(err.to_string()),
            error_type: Some(err.kind()),
        }
    }
}

/// 执行引擎：持有注册表与当前活跃组件 key
pub struct ExecutionEngine {
    registry: Arc<ComponentRegistry>,
    active: RwLock<Option<String>>,
    clear_on_retire: AtomicBool,
}

impl ExecutionEngine {
    /// 活跃组件初始化为注册表当前默认组件
    pub async fn new(registry: Arc<ComponentRegistry>) -> Self {
        let active = registry.default_key().await;
        Self {
            registry,
            active: RwLock::new(active),
            clear_on_retire: AtomicBool::new(false),
        }
    }

    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    /// Retire 命中当前组件时是否真正清空活跃组件（默认只记录意图）
    pub fn set_clear_on_retire(&self, enabled: bool) {
        self.clear_on_retire.store(enabled, Ordering::Relaxed);
    }

    pub async fn active_component(&self) -> Option<String> {
        self.active.read().await.clone()
    }

    /// 强制设置活跃组件（回滚恢复时使用）；同时替换注册表默认组件
    pub async fn restore_active(&self, key: Option<&str>) -> Result<(), ControlError> {
        let mut active = self.active.write().await;
        match key {
            Some(k) => {
                self.registry.set_default(k).await?;
                *active = Some(k.to_string());
            }
            None => {
                self.registry.clear_default().await;
                *active = None;
            }
        }
        Ok(())
    }

    /// 将决策应用到注册表，返回应用后的活跃组件
    pub async fn apply_decision(&self, decision: &Decision) -> Result<Option<String>, ControlError> {
        let mut active = self.active.write().await;
        match decision.action {
            Action::Adopt | Action::Compromise => {
                decision.validate()?;
                let target = decision.target_component.as_deref().unwrap_or_default();
                self.registry.set_default(target).await?;
                tracing::info!(action = %decision.action, component = %target, "component activated");
                *active = Some(target.to_string());
            }
            Action::Retire => {
                let target = decision.target_component.as_deref();
                if target.is_some() && target == active.as_deref() {
                    if self.clear_on_retire.load(Ordering::Relaxed) {
                        tracing::info!(component = ?target, "retiring active component");
                        self.registry.clear_default().await;
                        *active = None;
                    } else {
                        tracing::info!(component = ?target, "retire requested for active component (advisory)");
                    }
                }
            }
            Action::NoAction => {}
        }
        Ok(active.clone())
    }

    /// 应用决策后运行当前活跃组件
    pub async fn execute(
        &self,
        action: Action,
        target: Option<&str>,
        params: Value,
        state: &RunState,
    ) -> ExecutionResult {
        let decision = Decision::new(action, target.map(str::to_string), "", 1.0);
        if let Err(e) = self.apply_decision(&decision).await {
            return ExecutionResult::failure(target.map(str::to_string), &e, 0.0);
        }

        let resolved = match self.active_component().await {
            Some(key) => self.registry.get(&key).await.map(|c| (key, c)),
            None => self.registry.resolve_default().await,
        };
        let Some((key, component)) = resolved else {
            let err = ControlError::ComponentNotFound(
                target.map(str::to_string).unwrap_or_else(|| "<active>".to_string()),
            );
            return ExecutionResult::failure(None, &err, 0.0);
        };

        let preview = params_preview(&params);
        let start = Instant::now();
        let outcome = component.invoke(params).await.and_then(|out| {
            // 质量分必须可序列化往返
            if out.quality.is_finite() {
                Ok(out)
            } else {
                Err(format!("component reported non-finite quality {}", out.quality))
            }
        });
        let elapsed = start.elapsed().as_secs_f64();

        let audit = serde_json::json!({
            "event": "component_audit",
            "run_id": state.run_id,
            "component": key,
            "action": action.as_str(),
            "ok": outcome.is_ok(),
            "duration_ms": (elapsed * 1000.0) as u64,
            "params_preview": preview,
        });
        tracing::info!(audit = %audit.to_string(), "component");

        match outcome {
            Ok(out) => ExecutionResult {
                status: ExecutionStatus::Success,
                component: Some(key),
                output: Some(out.output),
                performance: Performance {
                    quality: out.quality,
                    cost: elapsed,
                },
                message: None,
                error_type: None,
            },
            Err(e) => {
                tracing::error!(component = %key, error = %e, "component execution failed");
                ExecutionResult::failure(
                    Some(key),
                    &ControlError::ComponentExecutionError(e),
                    elapsed,
                )
            }
        }
    }
}

fn params_preview(params: &Value) -> String {
    let s = params.to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Component, ComponentOutput};

    async fn engine() -> ExecutionEngine {
        let registry = ComponentRegistry::new()
            .with_default("base", Component::immediate(|p| Ok(ComponentOutput::new(p, 0.5))))
            .with_component("alt", Component::immediate(|_| Ok(ComponentOutput::new(Value::from("alt"), 0.9))))
            .with_component("broken", Component::immediate(|_| Err("exploded".to_string())));
        ExecutionEngine::new(Arc::new(registry)).await
    }

    #[tokio::test]
    async fn test_adopt_switches_default() {
        let engine = engine().await;
        assert_eq!(engine.active_component().await.as_deref(), Some("base"));
        let decision = Decision::new(Action::Adopt, Some("alt".into()), "", 0.9);
        let active = engine.apply_decision(&decision).await.unwrap();
        assert_eq!(active.as_deref(), Some("alt"));
        assert_eq!(engine.registry().default_key().await.as_deref(), Some("alt"));
    }

    #[tokio::test]
    async fn test_missing_target_is_hard_failure() {
        let engine = engine().await;
        let decision = Decision::new(Action::Compromise, Some("ghost".into()), "", 0.6);
        let err = engine.apply_decision(&decision).await.unwrap_err();
        assert!(matches!(err, ControlError::ComponentNotFound(_)));
        assert_eq!(engine.active_component().await.as_deref(), Some("base"));
    }

    #[tokio::test]
    async fn test_retire_is_advisory_by_default() {
        let engine = engine().await;
        let retire = Decision::new(Action::Retire, Some("base".into()), "", 0.8);
        assert_eq!(engine.apply_decision(&retire).await.unwrap().as_deref(), Some("base"));

        engine.set_clear_on_retire(true);
        assert!(engine.apply_decision(&retire).await.unwrap().is_none());
        assert!(engine.registry().default_key().await.is_none());
    }

    #[tokio::test]
    async fn test_execute_success_and_failure() {
        let engine = engine().await;
        let state = RunState::new("t", Value::Null);

        let ok = engine
            .execute(Action::Adopt, Some("alt"), Value::Null, &state)
            .await;
        assert!(ok.is_success());
        assert_eq!(ok.component.as_deref(), Some("alt"));
        assert_eq!(ok.performance.quality, 0.9);
        assert!(ok.performance.cost >= 0.0);

        let failed = engine
            .execute(Action::Compromise, Some("broken"), Value::Null, &state)
            .await;
        assert_eq!(failed.status, ExecutionStatus::Error);
        assert_eq!(failed.error_type, Some(ErrorKind::ComponentExecutionError));
        assert_eq!(failed.performance.quality, 0.0);
    }

    #[tokio::test]
    async fn test_no_action_runs_active() {
        let engine = engine().await;
        let state = RunState::new("t", Value::Null);
        let result = engine
            .execute(Action::NoAction, None, serde_json::json!("in"), &state)
            .await;
        assert!(result.is_success());
        assert_eq!(result.component.as_deref(), Some("base"));
        assert_eq!(result.output, Some(serde_json::json!("in")));
    }

    #[tokio::test]
    async fn test_non_finite_quality_is_failure() {
        let registry = ComponentRegistry::new().with_default(
            "nan",
            Component::immediate(|_| Ok(ComponentOutput::new(Value::Null, f64::NAN))),
        );
        let engine = ExecutionEngine::new(Arc::new(registry)).await;
        let state = RunState::new("t", Value::Null);

        let result = engine.execute(Action::NoAction, None, Value::Null, &state).await;
        assert_eq!(result.error_type, Some(ErrorKind::ComponentExecutionError));
        assert!(result.performance.is_finite());
        assert!(result.message.unwrap().contains("non-finite"));
    }
}
