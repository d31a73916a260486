//! 核心类型：错误分类与运行状态

pub mod error;
pub mod state;

pub use error::{ControlError, ErrorKind, ReversalError, SnapshotError, StepError};
pub use state::{ActivationReason, LoopStep, RunState, TraceEntry};
