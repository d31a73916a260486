//! 组件：统一调用约定与注册表

pub mod component;
pub mod registry;

pub use component::{AsyncComponent, Component, ComponentOutput};
pub use registry::{ComponentRegistry, RegistryEntry};
