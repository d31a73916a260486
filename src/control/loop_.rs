//! 控制循环主状态机
//!
//! Monitor -> Decide -> (Fallback | Execute) -> Reflect -> (Monitor | 结束)。
//! 每步都返回 RunState，任何错误都不会越过步骤边界；done 在每步开始前检查。
//! 快照点：run_start、post_decide、pre_execute、post_auto_reversal、run_end。

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::components::ComponentRegistry;
use crate::control::{ControlSettings, Reflector, SettingsHandle};
use crate::core::{ActivationReason, ErrorKind, LoopStep, RunState, StepError};
use crate::decision::{Action, Decider, Decision};
use crate::execution::{ExecutionEngine, ExecutionResult};
use crate::monitor::PerformanceMonitor;
use crate::snapshot::{meta, SnapshotService};

/// 快照点名称（last_snapshot_ids 的键）
pub mod points {
    pub const RUN_START: &str = "run_start";
    pub const POST_DECIDE: &str = "post_decide";
    pub const PRE_EXECUTE: &str = "pre_execute";
    pub const POST_AUTO_REVERSAL: &str = "post_auto_reversal";
    pub const RUN_END: &str = "run_end";
}

pub const POST_AUTO_REVERSAL_TRIGGER: &str = "post-auto-reversal";

/// 自动回滚前置快照的触发名，如 `pre-Compromise`
pub fn pre_action_trigger(action: Action) -> String {
    format!("pre-{}", action)
}

/// 步骤之间的转移
#[derive(Debug)]
enum Transition {
    Monitor,
    Decide,
    Execute,
    Reflect,
    /// 进入 Fallback，附带原因
    Fallback(String),
    Finish,
}

impl Transition {
    fn step(&self) -> Option<LoopStep> {
        match self {
            Transition::Monitor => Some(LoopStep::Monitor),
            Transition::Decide => Some(LoopStep::Decide),
            Transition::Execute => Some(LoopStep::Execute),
            Transition::Reflect => Some(LoopStep::Reflect),
            Transition::Fallback(_) => Some(LoopStep::Fallback),
            Transition::Finish => None,
        }
    }
}

pub struct ControlLoop {
    monitor: Arc<dyn PerformanceMonitor>,
    decider: Arc<dyn Decider>,
    reflector: Arc<dyn Reflector>,
    executor: Arc<ExecutionEngine>,
    snapshots: Arc<SnapshotService>,
    settings: SettingsHandle,
}

impl ControlLoop {
    pub fn new(
        monitor: Arc<dyn PerformanceMonitor>,
        decider: Arc<dyn Decider>,
        reflector: Arc<dyn Reflector>,
        executor: Arc<ExecutionEngine>,
        snapshots: Arc<SnapshotService>,
        settings: SettingsHandle,
    ) -> Self {
        Self {
            monitor,
            decider,
            reflector,
            executor,
            snapshots,
            settings,
        }
    }

    pub fn snapshots(&self) -> &Arc<SnapshotService> {
        &self.snapshots
    }

    pub fn executor(&self) -> &Arc<ExecutionEngine> {
        &self.executor
    }

    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        self.executor.registry()
    }

    pub fn settings(&self) -> &SettingsHandle {
        &self.settings
    }

    /// 唯一对外入口：从初始状态跑到 done，返回最终状态
    pub async fn start_new_run(&self, initial: RunState) -> RunState {
        let mut state = initial;
        tracing::info!(
            run_id = %state.run_id,
            correlation_id = %state.correlation_id,
            task = %state.task_name,
            "control loop run started"
        );

        if self.settings.get().await.snapshot_run_boundaries {
            let mut metadata = base_metadata("control_loop", points::RUN_START, &state);
            if let Some(from) = &state.restored_from_snapshot {
                metadata.insert("restored_from_snapshot_id".to_string(), from.clone());
            }
            self.snapshot_point(&mut state, points::RUN_START, points::RUN_START, metadata)
                .await;
        }

        let mut next = Transition::Monitor;
        loop {
            if state.done {
                break;
            }
            if let Some(step) = next.step() {
                tracing::info!(run_id = %state.run_id, step = %step, "entering step");
            }
            let (next_state, transition) = match next {
                Transition::Monitor => self.monitor_step(state).await,
                Transition::Decide => self.decide_step(state).await,
                Transition::Execute => self.execute_step(state).await,
                Transition::Reflect => self.reflect_step(state).await,
                Transition::Fallback(cause) => {
                    tracing::warn!(run_id = %state.run_id, cause = %cause, "routing to fallback");
                    self.fallback_step(state, &cause).await
                }
                Transition::Finish => break,
            };
            state = next_state;
            next = transition;
        }
        state.done = true;

        if self.settings.get().await.snapshot_run_boundaries {
            let metadata = base_metadata("control_loop", points::RUN_END, &state);
            self.snapshot_point(&mut state, points::RUN_END, points::RUN_END, metadata)
                .await;
        }

        tracing::info!(
            run_id = %state.run_id,
            correlation_id = %state.correlation_id,
            cycles = state.cycle,
            error = ?state.error.as_ref().map(|e| e.kind),
            reverted_from = ?state.reverted_from_snapshot,
            "control loop run finished"
        );
        state
    }

    async fn monitor_step(&self, mut state: RunState) -> (RunState, Transition) {
        // error 只描述当前这一轮，上一轮的错误转入轨迹
        if let Some(previous) = state.error.take() {
            state.record(
                LoopStep::Monitor,
                format!("cleared {:?} from {}: {}", previous.kind, previous.step, previous.message),
            );
        }
        state.requirements = self.monitor.get_requirements(&state.task_name).await;
        state.performance_snapshot = self.monitor.get_performance(None).await;

        if state.active_component.is_none() {
            if let Some(active) = self.executor.active_component().await {
                state.active_component = Some(active);
                state.activation_reason = Some(ActivationReason::Default);
            }
        }

        let note = format!(
            "observed {} component(s) for task '{}'",
            state.performance_snapshot.len(),
            state.task_name
        );
        state.record(LoopStep::Monitor, note);
        (state, Transition::Decide)
    }

    async fn decide_step(&self, mut state: RunState) -> (RunState, Transition) {
        let threshold = self.settings.get().await.confidence_threshold;

        let decision = match self.decider.decide(&state).await.and_then(|d| {
            d.validate()?;
            Ok(d)
        }) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(run_id = %state.run_id, "decision failed: {}", e);
                state.decision = None;
                state.error = Some(StepError::from_control(&e, LoopStep::Decide.as_str()));
                state.record(LoopStep::Decide, format!("no decision: {e}"));
                return (state, Transition::Fallback(e.to_string()));
            }
        };

        state.record(
            LoopStep::Decide,
            format!(
                "{} {} (confidence {:.2}): {}",
                decision.action,
                decision.target_component.as_deref().unwrap_or("-"),
                decision.confidence,
                decision.reasoning
            ),
        );
        let low_confidence = decision.confidence < threshold;
        let confidence = decision.confidence;
        state.decision = Some(decision);

        let metadata = base_metadata(LoopStep::Decide.as_str(), points::POST_DECIDE, &state);
        self.snapshot_point(&mut state, points::POST_DECIDE, points::POST_DECIDE, metadata)
            .await;

        if low_confidence {
            return (
                state,
                Transition::Fallback(format!(
                    "confidence {confidence:.2} below threshold {threshold:.2}"
                )),
            );
        }
        (state, Transition::Execute)
    }

    /// 使用注册表默认组件继续完成本次工作单元
    async fn fallback_step(&self, mut state: RunState, cause: &str) -> (RunState, Transition) {
        let default = self.registry().default_key().await;
        let mut decision = Decision::no_action(format!("Fallback: {cause}"));
        if let Some(original) = &state.decision {
            decision = decision.with_error_info(format!(
                "superseded {} {}",
                original.action,
                original.target_component.as_deref().unwrap_or("-")
            ));
        }
        state.decision = Some(decision);
        state.active_component = default.clone();
        state.activation_reason = default.as_ref().map(|_| ActivationReason::Default);
        state.record(
            LoopStep::Fallback,
            format!(
                "{cause}; using default component {}",
                default.as_deref().unwrap_or("<none>")
            ),
        );
        (state, Transition::Execute)
    }

    async fn execute_step(&self, mut state: RunState) -> (RunState, Transition) {
        let settings = self.settings.get().await;
        let decision = state
            .decision
            .clone()
            .unwrap_or_else(|| Decision::no_action("no decision recorded"));
        let action = decision.action;
        let target = decision.target_component.clone();

        if action != Action::NoAction {
            let metadata = base_metadata(LoopStep::Execute.as_str(), points::PRE_EXECUTE, &state);
            self.snapshot_point(
                &mut state,
                points::PRE_EXECUTE,
                &pre_action_trigger(action),
                metadata,
            )
            .await;
        }

        self.executor.set_clear_on_retire(settings.clear_active_on_retire);
        let result = self
            .executor
            .execute(action, target.as_deref(), state.params.clone(), &state)
            .await;

        if result.is_success() {
            return self.on_success(state, decision, result, &settings).await;
        }

        let message = result
            .message
            .clone()
            .unwrap_or_else(|| "execution failed".to_string());
        match result.error_type {
            Some(ErrorKind::ComponentNotFound) | Some(ErrorKind::InvalidDecision)
                if action != Action::NoAction =>
            {
                state.error = Some(StepError::new(
                    result.error_type.unwrap_or(ErrorKind::ComponentNotFound),
                    message.clone(),
                    LoopStep::Execute.as_str(),
                ));
                state.record(LoopStep::Execute, format!("cannot apply {action}: {message}"));
                (state, Transition::Fallback(message))
            }
            Some(ErrorKind::ComponentExecutionError) if settings.auto_reverts(action) => {
                let state = self.auto_revert(state, &decision, &result).await;
                (state, Transition::Finish)
            }
            kind => {
                state.measured_performance = Some(result.performance);
                state.error = Some(StepError::new(
                    kind.unwrap_or(ErrorKind::ComponentExecutionError),
                    message.clone(),
                    LoopStep::Execute.as_str(),
                ));
                state.record(LoopStep::Execute, format!("{action} failed: {message}"));
                state.done = true;
                (state, Transition::Finish)
            }
        }
    }

    async fn on_success(
        &self,
        mut state: RunState,
        decision: Decision,
        result: ExecutionResult,
        settings: &ControlSettings,
    ) -> (RunState, Transition) {
        if let Some(component) = &result.component {
            if decision.action.requires_target() {
                state.activation_reason = Some(ActivationReason::Decided);
            } else if state.active_component.as_deref() != Some(component.as_str()) {
                state.activation_reason = Some(ActivationReason::Default);
            }
            state.active_component = Some(component.clone());
            if settings.record_measurements {
                self.monitor.record(component, result.performance).await;
            }
        }
        state.result = result.output;
        state.measured_performance = Some(result.performance);
        state.record(
            LoopStep::Execute,
            format!(
                "{} via {}: quality {:.3}, cost {:.3}s",
                decision.action,
                state.active_component.as_deref().unwrap_or("<none>"),
                result.performance.quality,
                result.performance.cost
            ),
        );
        (state, Transition::Reflect)
    }

    /// 执行失败后的自动回滚：载入 pre_execute 快照，改写为 NoAction 决策并结束运行
    async fn auto_revert(
        &self,
        mut state: RunState,
        decision: &Decision,
        result: &ExecutionResult,
    ) -> RunState {
        let target = decision.target_component.as_deref().unwrap_or("<none>");
        let message = result.message.clone().unwrap_or_default();

        let pre_id = state.snapshot_id(points::PRE_EXECUTE).map(str::to_string);
        let restored = match &pre_id {
            Some(id) => self.snapshots.load_snapshot_state(id).await,
            None => None,
        };
        let (Some(pre_id), Some(mut restored)) = (pre_id, restored) else {
            tracing::error!(
                run_id = %state.run_id,
                "auto-reversal unavailable: no loadable pre-execution snapshot"
            );
            state.measured_performance = Some(result.performance);
            state.error = Some(StepError::new(
                ErrorKind::ComponentExecutionError,
                format!("{message}; auto-reversal unavailable (no pre-execution snapshot)"),
                LoopStep::Execute.as_str(),
            ));
            state.record(LoopStep::Execute, "auto-reversal skipped: snapshot unavailable");
            state.done = true;
            return state;
        };

        if let Err(e) = self
            .executor
            .restore_active(restored.active_component.as_deref())
            .await
        {
            tracing::warn!(run_id = %state.run_id, "failed to restore active component: {}", e);
        }

        tracing::warn!(
            run_id = %state.run_id,
            snapshot_id = %pre_id,
            component = target,
            "auto-reverting failed {}",
            decision.action
        );

        // 快照拍摄时尚未记录自身 id，沿用当前的 id 表与轨迹
        restored.last_snapshot_ids = state.last_snapshot_ids;
        restored.trace = state.trace;
        restored.decision = Some(
            Decision::no_action(format!(
                "Auto-reverted: {} on '{}' failed during execution; restored state from snapshot {}",
                decision.action, target, pre_id
            ))
            .with_error_info(message.clone()),
        );
        restored.activation_reason = restored
            .active_component
            .as_ref()
            .map(|_| ActivationReason::Overridden);
        restored.measured_performance = Some(result.performance);
        restored.reverted_from_snapshot = Some(pre_id.clone());
        restored.done = true;
        restored.record(
            LoopStep::Execute,
            format!("{} on {} failed ({message}); reverted to {pre_id}", decision.action, target),
        );

        let mut metadata = base_metadata(LoopStep::Execute.as_str(), points::POST_AUTO_REVERSAL, &restored);
        metadata.insert(meta::COMPONENT_ID.to_string(), target.to_string());
        metadata.insert(
            meta::ORIGINAL_CORRELATION_ID.to_string(),
            restored.correlation_id.clone(),
        );
        metadata.insert(meta::REVERTED_TO_SNAPSHOT_ID.to_string(), pre_id);
        self.snapshot_point(
            &mut restored,
            points::POST_AUTO_REVERSAL,
            POST_AUTO_REVERSAL_TRIGGER,
            metadata,
        )
        .await;
        restored
    }

    async fn reflect_step(&self, mut state: RunState) -> (RunState, Transition) {
        match self.reflector.reflect(&state).await {
            Ok(text) => {
                tracing::info!(run_id = %state.run_id, reflection = %text, "reflection");
                state.reflection = Some(text);
            }
            Err(e) => tracing::warn!(run_id = %state.run_id, "reflection failed: {}", e),
        }

        state.cycle += 1;
        let max_cycles = self.settings.get().await.effective_max_cycles();
        state.record(LoopStep::Reflect, format!("cycle {}/{}", state.cycle, max_cycles));
        if state.cycle >= max_cycles {
            state.done = true;
            (state, Transition::Finish)
        } else {
            (state, Transition::Monitor)
        }
    }

    /// 拍快照并记录 id；失败时记录缺口继续运行
    async fn snapshot_point(
        &self,
        state: &mut RunState,
        point: &str,
        trigger: &str,
        metadata: BTreeMap<String, String>,
    ) {
        let id = self.snapshots.take_snapshot(trigger, state, metadata).await;
        if id.is_none() {
            tracing::warn!(run_id = %state.run_id, point, "snapshot gap recorded");
        }
        state.record_snapshot(point, id);
    }
}

/// 每个快照都带的 metadata：node / step，以及当前决策的动作与组件
fn base_metadata(node: &str, step: &str, state: &RunState) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::from([
        (meta::NODE.to_string(), node.to_string()),
        (meta::STEP.to_string(), step.to_string()),
    ]);
    if let Some(decision) = &state.decision {
        metadata.insert(meta::ACTION_NAME.to_string(), decision.action.to_string());
        if let Some(target) = &decision.target_component {
            metadata.insert(meta::COMPONENT_ID.to_string(), target.clone());
        }
    }
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_metadata_tracks_decision() {
        let mut state = RunState::new("t", serde_json::Value::Null);
        let bare = base_metadata("control_loop", points::RUN_START, &state);
        assert_eq!(bare.len(), 2);

        state.decision = Some(Decision::new(Action::Compromise, Some("b".into()), "", 0.6));
        let metadata = base_metadata("execute", points::PRE_EXECUTE, &state);
        assert_eq!(metadata.get(meta::ACTION_NAME).map(String::as_str), Some("Compromise"));
        assert_eq!(metadata.get(meta::COMPONENT_ID).map(String::as_str), Some("b"));
        assert_eq!(pre_action_trigger(Action::Compromise), "pre-Compromise");
    }
}
