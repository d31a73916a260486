//! Bee Control 演示入口
//!
//! 用三个模拟组件跑一次控制循环：首轮 Compromise 选中不稳定组件并自动回滚，
//! 第二轮在同一 correlation_id 下选中稳定组件，最后手动回滚到最近的 pre-Compromise 快照。
//! 最终状态与 manifest 列表以 JSON 输出到 stdout。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Value};

use bee_control::components::{AsyncComponent, Component, ComponentOutput, ComponentRegistry};
use bee_control::config::load_config;
use bee_control::control::ControlLoopBuilder;
use bee_control::core::RunState;
use bee_control::decision::Action;
use bee_control::monitor::{ComponentMetrics, InMemoryPerformanceMonitor, Requirements};
use bee_control::reversal::{pre_action, ReversalManager};

/// 模拟一个较慢但精确的远程组件
struct PreciseSummarizer;

#[async_trait]
impl AsyncComponent for PreciseSummarizer {
    async fn invoke(&self, params: Value) -> Result<ComponentOutput, String> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let text = params.get("text").and_then(Value::as_str).unwrap_or_default();
        Ok(ComponentOutput::new(
            json!({ "summary": text.split('.').next().unwrap_or_default().trim() }),
            0.95,
        ))
    }
}

fn registry() -> ComponentRegistry {
    ComponentRegistry::new()
        .with_default(
            "fast",
            Component::immediate(|params| {
                let text = params.get("text").and_then(Value::as_str).unwrap_or_default();
                let words: Vec<&str> = text.split_whitespace().take(5).collect();
                Ok(ComponentOutput::new(json!({ "summary": words.join(" ") }), 0.7))
            }),
        )
        .with_component("precise", Component::suspending(PreciseSummarizer))
        .with_component(
            "experimental",
            Component::immediate(|_| Err("experimental model unavailable".to_string())),
        )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    bee_control::observability::init();

    let config_path = std::env::args().nth(1).map(std::path::PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;
    if cfg.snapshot.backend == "file" {
        std::fs::create_dir_all(&cfg.snapshot.dir).context("Failed to create snapshot dir")?;
    }

    let monitor = Arc::new(
        InMemoryPerformanceMonitor::new()
            .with_requirements("default", Requirements::new(0.9, 1.0))
            .with_metrics("fast", ComponentMetrics::new(0.7, 0.2))
            .with_metrics("precise", ComponentMetrics::new(0.95, 1.5))
            .with_metrics("experimental", ComponentMetrics::new(0.97, 2.0)),
    );
    let control = Arc::new(
        ControlLoopBuilder::from_config(&cfg, Arc::new(registry()))
            .await
            .monitor(monitor.clone())
            .build()
            .await,
    );

    let params = json!({ "text": "Control loops pick components. They also roll back bad choices." });

    // 首轮：experimental 质量最高但成本超标 -> Compromise -> 执行失败 -> 自动回滚
    let first = control
        .start_new_run(RunState::new("summarize", params.clone()))
        .await;

    // 第二轮：同一交互，experimental 已下线
    monitor.remove_metrics("experimental").await;
    let second = control
        .start_new_run(RunState::with_correlation(
            "summarize",
            params,
            first.correlation_id.clone(),
        ))
        .await;

    let reversal = ReversalManager::new(control.clone());
    let reverted = reversal
        .revert_to_latest(&first.correlation_id, pre_action(Action::Compromise))
        .await;

    let manifests = control
        .snapshots()
        .manifests_for_correlation(&first.correlation_id)
        .await
        .context("Failed to list manifests")?;

    let report = json!({
        "first_run": first,
        "second_run": second,
        "manual_reversal": reverted,
        "manifests": {
            "total": manifests.total,
            "truncated": manifests.truncated,
            "items": manifests.manifests,
        },
        "registry": control.registry().entries().await.iter()
            .map(|e| json!({ "key": e.key, "is_default": e.is_default }))
            .collect::<Vec<_>>(),
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Failed to render report")?
    );
    Ok(())
}
