//! 控制循环：Monitor -> Decide -> (Fallback | Execute) -> Reflect

pub mod builder;
pub mod loop_;
pub mod reflect;
pub mod settings;

pub use builder::ControlLoopBuilder;
pub use loop_::{points, pre_action_trigger, ControlLoop, POST_AUTO_REVERSAL_TRIGGER};
pub use reflect::{Reflector, SummaryReflector};
pub use settings::{ControlSettings, SettingsHandle};
