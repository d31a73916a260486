//! 控制循环的可调参数
//!
//! 构造时显式注入；SettingsHandle 允许运行中修改，下一步骤生效。

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::config::{AppConfig, ControlSection};
use crate::decision::Action;

#[derive(Debug, Clone, PartialEq)]
pub struct ControlSettings {
    pub confidence_threshold: f64,
    pub max_cycles: usize,
    pub clear_active_on_retire: bool,
    pub auto_revert_actions: Vec<Action>,
    pub record_measurements: bool,
    pub snapshot_run_boundaries: bool,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self::from(ControlSection::default())
    }
}

impl From<ControlSection> for ControlSettings {
    fn from(section: ControlSection) -> Self {
        Self {
            confidence_threshold: section.confidence_threshold,
            max_cycles: section.max_cycles,
            clear_active_on_retire: section.clear_active_on_retire,
            auto_revert_actions: section.auto_revert_actions,
            record_measurements: section.record_measurements,
            snapshot_run_boundaries: true,
        }
    }
}

impl From<&AppConfig> for ControlSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            snapshot_run_boundaries: cfg.snapshot.snapshot_run_boundaries,
            ..Self::from(cfg.control.clone())
        }
    }
}

impl ControlSettings {
    pub fn auto_reverts(&self, action: Action) -> bool {
        self.auto_revert_actions.contains(&action)
    }

    /// 至少一轮
    pub fn effective_max_cycles(&self) -> usize {
        self.max_cycles.max(1)
    }
}

/// 共享的设置句柄
#[derive(Debug, Clone, Default)]
pub struct SettingsHandle {
    inner: Arc<RwLock<ControlSettings>>,
}

impl SettingsHandle {
    pub fn new(settings: ControlSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    pub async fn get(&self) -> ControlSettings {
        self.inner.read().await.clone()
    }

    pub async fn update(&self, f: impl FnOnce(&mut ControlSettings)) {
        let mut settings = self.inner.write().await;
        f(&mut settings);
        tracing::info!(?settings, "control settings updated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_update_is_visible_to_clones() {
        let handle = SettingsHandle::new(ControlSettings::default());
        let other = handle.clone();
        handle.update(|s| s.confidence_threshold = 0.95).await;
        assert_eq!(other.get().await.confidence_threshold, 0.95);
    }

    #[test]
    fn test_defaults_follow_config() {
        let settings = ControlSettings::default();
        assert!(settings.auto_reverts(Action::Compromise));
        assert!(!settings.auto_reverts(Action::Adopt));
        assert_eq!(ControlSettings { max_cycles: 0, ..settings }.effective_max_cycles(), 1);
    }
}
