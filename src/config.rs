//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `BEE__*` 覆盖（双下划线表示嵌套，如 `BEE__CONTROL__MAX_CYCLES=3`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::decision::Action;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub control: ControlSection,
    #[serde(default)]
    pub snapshot: SnapshotSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [control] 段：控制循环参数（运行时可通过 SettingsHandle 调整）
#[derive(Debug, Clone, Deserialize)]
pub struct ControlSection {
    /// 低于此置信度的决策走 Fallback
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    /// Reflect 达到此轮数后结束运行
    #[serde(default = "default_max_cycles")]
    pub max_cycles: usize,
    /// Retire 命中活跃组件时是否真正清空（默认仅记录）
    #[serde(default)]
    pub clear_active_on_retire: bool,
    /// 执行失败时自动回滚的动作
    #[serde(default = "default_auto_revert_actions")]
    pub auto_revert_actions: Vec<Action>,
    /// 执行成功后把实测表现写回性能监视器
    #[serde(default = "default_true")]
    pub record_measurements: bool,
}

fn default_confidence_threshold() -> f64 {
    0.5
}

fn default_max_cycles() -> usize {
    1
}

fn default_auto_revert_actions() -> Vec<Action> {
    vec![Action::Compromise]
}

fn default_true() -> bool {
    true
}

impl Default for ControlSection {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            max_cycles: default_max_cycles(),
            clear_active_on_retire: false,
            auto_revert_actions: default_auto_revert_actions(),
            record_measurements: true,
        }
    }
}

/// [snapshot] 段：存储后端与扫描上限
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotSection {
    /// memory / file / sqlite
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_snapshot_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_scan_limit")]
    pub scan_limit: usize,
    /// 运行开始 / 结束时是否拍快照
    #[serde(default = "default_true")]
    pub snapshot_run_boundaries: bool,
}

fn default_backend() -> String {
    "memory".to_string()
}

fn default_snapshot_dir() -> PathBuf {
    PathBuf::from("workspace/snapshots")
}

fn default_db_path() -> PathBuf {
    PathBuf::from("workspace/snapshots.db")
}

fn default_scan_limit() -> usize {
    crate::snapshot::service::DEFAULT_SCAN_LIMIT
}

impl Default for SnapshotSection {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            dir: default_snapshot_dir(),
            db_path: default_db_path(),
            scan_limit: default_scan_limit(),
            snapshot_run_boundaries: true,
        }
    }
}

/// 从 config 目录加载配置，环境变量 BEE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 BEE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("BEE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 重新从磁盘与环境变量加载配置（调用方可用新值更新 SettingsHandle）
pub fn reload_config() -> Result<AppConfig, config::ConfigError> {
    load_config(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.control.confidence_threshold, 0.5);
        assert_eq!(cfg.control.max_cycles, 1);
        assert_eq!(cfg.control.auto_revert_actions, vec![Action::Compromise]);
        assert!(cfg.control.record_measurements);
        assert_eq!(cfg.snapshot.backend, "memory");
        assert_eq!(cfg.snapshot.scan_limit, 1000);
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("control.toml");
        std::fs::write(
            &path,
            r#"
[control]
confidence_threshold = 0.7
max_cycles = 3
auto_revert_actions = ["Compromise", "Adopt"]

[snapshot]
backend = "file"
"#,
        )
        .unwrap();

        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.control.confidence_threshold, 0.7);
        assert_eq!(cfg.control.max_cycles, 3);
        assert_eq!(
            cfg.control.auto_revert_actions,
            vec![Action::Compromise, Action::Adopt]
        );
        assert!(!cfg.control.clear_active_on_retire);
        assert_eq!(cfg.snapshot.backend, "file");
        assert_eq!(cfg.snapshot.scan_limit, 1000);
    }
}
