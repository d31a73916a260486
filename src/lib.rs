//! Bee Control - 自适应组件选择控制循环
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **observability**: tracing 初始化
//! - **core**: 错误分类、运行状态
//! - **components**: 组件调用接口与组件注册表
//! - **monitor**: 性能监视器（组件指标、任务阈值）
//! - **decision**: Decision 类型、规则决策引擎、Decider 接口
//! - **llm**: 文本生成器接口与基于它的 Decider / Reflector
//! - **execution**: 执行引擎（应用决策、运行组件、计量）
//! - **snapshot**: 快照 manifest、存储后端、快照服务
//! - **reversal**: 回滚管理
//! - **control**: 控制循环状态机、设置与构建器

pub mod components;
pub mod config;
pub mod control;
pub mod core;
pub mod decision;
pub mod execution;
pub mod llm;
pub mod monitor;
pub mod observability;
pub mod reversal;
pub mod snapshot;

pub use components::{Component, ComponentOutput, ComponentRegistry};
pub use control::{ControlLoop, ControlLoopBuilder, ControlSettings, SettingsHandle};
pub use core::{ControlError, RunState};
pub use decision::{Action, Decision};
pub use reversal::{ReversalManager, ReversalOutcome};
