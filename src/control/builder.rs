//! 控制循环构建器：统一的初始化逻辑
//!
//! 未显式指定的协作者使用默认实现：内存监视器、规则决策、摘要反思、内存快照存储。

use std::sync::Arc;

use crate::components::ComponentRegistry;
use crate::config::AppConfig;
use crate::control::{ControlLoop, ControlSettings, Reflector, SettingsHandle, SummaryReflector};
use crate::decision::{Decider, RuleDecider};
use crate::execution::ExecutionEngine;
use crate::monitor::{InMemoryPerformanceMonitor, PerformanceMonitor};
use crate::snapshot::{
    create_snapshot_storage, InMemorySnapshotStorage, SnapshotService, SnapshotStorage,
};

pub struct ControlLoopBuilder {
    registry: Arc<ComponentRegistry>,
    monitor: Option<Arc<dyn PerformanceMonitor>>,
    decider: Option<Arc<dyn Decider>>,
    reflector: Option<Arc<dyn Reflector>>,
    storage: Option<Arc<dyn SnapshotStorage>>,
    settings: Option<SettingsHandle>,
    scan_limit: Option<usize>,
}

impl ControlLoopBuilder {
    pub fn new(registry: Arc<ComponentRegistry>) -> Self {
        Self {
            registry,
            monitor: None,
            decider: None,
            reflector: None,
            storage: None,
            settings: None,
            scan_limit: None,
        }
    }

    /// 按配置选择快照后端并注入控制参数
    pub async fn from_config(cfg: &AppConfig, registry: Arc<ComponentRegistry>) -> Self {
        let storage =
            create_snapshot_storage(&cfg.snapshot.backend, &cfg.snapshot.dir, &cfg.snapshot.db_path)
                .await;
        Self::new(registry)
            .storage(storage)
            .settings(ControlSettings::from(cfg))
            .scan_limit(cfg.snapshot.scan_limit)
    }

    pub fn monitor(mut self, monitor: Arc<dyn PerformanceMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn decider(mut self, decider: Arc<dyn Decider>) -> Self {
        self.decider = Some(decider);
        self
    }

    pub fn reflector(mut self, reflector: Arc<dyn Reflector>) -> Self {
        self.reflector = Some(reflector);
        self
    }

    pub fn storage(mut self, storage: Arc<dyn SnapshotStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn settings(mut self, settings: ControlSettings) -> Self {
        self.settings = Some(SettingsHandle::new(settings));
        self
    }

    /// 共享一个已有的设置句柄（便于外部实时调参）
    pub fn settings_handle(mut self, handle: SettingsHandle) -> Self {
        self.settings = Some(handle);
        self
    }

    pub fn scan_limit(mut self, limit: usize) -> Self {
        self.scan_limit = Some(limit);
        self
    }

    pub async fn build(self) -> ControlLoop {
        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(InMemorySnapshotStorage::new()));
        let mut snapshots = SnapshotService::new(storage);
        if let Some(limit) = self.scan_limit {
            snapshots = snapshots.with_scan_limit(limit);
        }
        let executor = ExecutionEngine::new(self.registry).await;

        ControlLoop::new(
            self.monitor
                .unwrap_or_else(|| Arc::new(InMemoryPerformanceMonitor::new())),
            self.decider.unwrap_or_else(|| Arc::new(RuleDecider::new())),
            self.reflector.unwrap_or_else(|| Arc::new(SummaryReflector)),
            Arc::new(executor),
            Arc::new(snapshots),
            self.settings
                .unwrap_or_else(|| SettingsHandle::new(ControlSettings::default())),
        )
    }
}
