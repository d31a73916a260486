//! 性能监视器
//!
//! 提供各组件当前指标与各任务的阈值要求。未知任务只精确回落到名为 `default` 的任务；
//! 未知组件返回空映射而不是报错。

pub mod types;

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

pub use types::{ComponentMetrics, Performance, Requirements};

/// 任务未注册时回落的任务名（仅精确匹配）
pub const DEFAULT_TASK: &str = "default";

/// 性能监视器接口：无副作用的读取；record 供执行后回写实测值
#[async_trait]
pub trait PerformanceMonitor: Send + Sync {
    /// component 为 None 时返回所有组件；指定组件无数据时返回空映射
    async fn get_performance(&self, component: Option<&str>) -> BTreeMap<String, ComponentMetrics>;

    /// 任务阈值；未知任务回落到 `default`，两者都没有时返回空要求
    async fn get_requirements(&self, task_name: &str) -> Requirements;

    /// 记录一次实测表现（默认忽略）
    async fn record(&self, _component: &str, _performance: Performance) {}
}

fn checked_metrics(component: &str, metrics: ComponentMetrics) -> ComponentMetrics {
    if !metrics.is_finite() {
        tracing::warn!(component, ?metrics, "dropping non-finite metric values");
    }
    metrics.finite()
}

/// 内存实现：指标与要求都可在运行时更新
#[derive(Default)]
pub struct InMemoryPerformanceMonitor {
    metrics: RwLock<BTreeMap<String, ComponentMetrics>>,
    requirements: RwLock<HashMap<String, Requirements>>,
}

impl InMemoryPerformanceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 非有限的指标值按缺失处理
    pub async fn set_metrics(&self, component: impl Into<String>, metrics: ComponentMetrics) {
        let component = component.into();
        let metrics = checked_metrics(&component, metrics);
        self.metrics.write().await.insert(component, metrics);
    }

    pub async fn remove_metrics(&self, component: &str) {
        self.metrics.write().await.remove(component);
    }

    pub async fn set_requirements(&self, task_name: impl Into<String>, requirements: Requirements) {
        self.requirements
            .write()
            .await
            .insert(task_name.into(), requirements);
    }

    /// 构建器风格：同步初始化（尚无并发访问）
    pub fn with_metrics(mut self, component: impl Into<String>, metrics: ComponentMetrics) -> Self {
        let component = component.into();
        let metrics = checked_metrics(&component, metrics);
        self.metrics.get_mut().insert(component, metrics);
        self
    }

    pub fn with_requirements(mut self, task_name: impl Into<String>, requirements: Requirements) -> Self {
        self.requirements.get_mut().insert(task_name.into(), requirements);
        self
    }
}

#[async_trait]
impl PerformanceMonitor for InMemoryPerformanceMonitor {
    async fn get_performance(&self, component: Option<&str>) -> BTreeMap<String, ComponentMetrics> {
        let metrics = self.metrics.read().await;
        match component {
            None => metrics.clone(),
            Some(key) => metrics
                .get(key)
                .map(|m| BTreeMap::from([(key.to_string(), *m)]))
                .unwrap_or_default(),
        }
    }

    async fn get_requirements(&self, task_name: &str) -> Requirements {
        let requirements = self.requirements.read().await;
        requirements
            .get(task_name)
            .or_else(|| requirements.get(DEFAULT_TASK))
            .copied()
            .unwrap_or_default()
    }

    async fn record(&self, component: &str, performance: Performance) {
        if !performance.is_finite() {
            tracing::warn!(component, ?performance, "ignoring non-finite measurement");
            return;
        }
        self.metrics
            .write()
            .await
            .insert(component.to_string(), performance.into());
    }
}
