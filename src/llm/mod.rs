//! 生成模型接入：不透明的文本生成器接口、Mock 实现，以及基于它的 Decider / Reflector

pub mod adapter;
pub mod mock;
pub mod traits;

pub use adapter::{parse_decision, GenerativeDecider, GenerativeReflector};
pub use mock::MockTextGenerator;
pub use traits::{Purpose, TextGenerator};
