//! 组件注册表
//!
//! 按 key 存储 Component，并维护唯一的默认（当前服务中的）组件。
//! 默认组件是跨运行共享的可变状态，所有修改都在同一把写锁内完成，
//! 并发运行的竞争表现为锁争用而不是静默覆盖。

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::components::Component;
use crate::core::ControlError;

/// 注册表条目视图
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub key: String,
    pub is_default: bool,
}

#[derive(Default)]
struct RegistryInner {
    components: HashMap<String, Component>,
    default_key: Option<String>,
}

#[derive(Default)]
pub struct ComponentRegistry {
    inner: RwLock<RegistryInner>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 构建期注册（尚未共享，不需要加锁）
    pub fn with_component(mut self, key: impl Into<String>, component: Component) -> Self {
        self.inner.get_mut().components.insert(key.into(), component);
        self
    }

    /// 构建期注册并设为默认
    pub fn with_default(mut self, key: impl Into<String>, component: Component) -> Self {
        let key = key.into();
        let inner = self.inner.get_mut();
        inner.components.insert(key.clone(), component);
        inner.default_key = Some(key);
        self
    }

    pub async fn register(&self, key: impl Into<String>, component: Component) {
        let key = key.into();
        tracing::debug!(component = %key, "register component");
        self.inner.write().await.components.insert(key, component);
    }

    /// 移除组件；若它是默认组件则同时清空默认
    pub async fn unregister(&self, key: &str) -> Option<Component> {
        let mut inner = self.inner.write().await;
        if inner.default_key.as_deref() == Some(key) {
            inner.default_key = None;
        }
        inner.components.remove(key)
    }

    pub async fn get(&self, key: &str) -> Option<Component> {
        self.inner.read().await.components.get(key).cloned()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.inner.read().await.components.contains_key(key)
    }

    pub async fn default_key(&self) -> Option<String> {
        self.inner.read().await.default_key.clone()
    }

    /// 原子替换默认组件，返回之前的默认 key；组件不存在时不做任何修改
    pub async fn set_default(&self, key: &str) -> Result<Option<String>, ControlError> {
        let mut inner = self.inner.write().await;
        if !inner.components.contains_key(key) {
            return Err(ControlError::ComponentNotFound(key.to_string()));
        }
        Ok(inner.default_key.replace(key.to_string()))
    }

    pub async fn clear_default(&self) -> Option<String> {
        self.inner.write().await.default_key.take()
    }

    /// 解析默认组件（key 与实现一起取出，避免两次加锁之间被替换）
    pub async fn resolve_default(&self) -> Option<(String, Component)> {
        let inner = self.inner.read().await;
        let key = inner.default_key.as_ref()?;
        inner
            .components
            .get(key)
            .map(|c| (key.clone(), c.clone()))
    }

    /// 按 key 排序的条目列表
    pub async fn entries(&self) -> Vec<RegistryEntry> {
        let inner = self.inner.read().await;
        let mut entries: Vec<RegistryEntry> = inner
            .components
            .keys()
            .map(|key| RegistryEntry {
                key: key.clone(),
                is_default: inner.default_key.as_deref() == Some(key.as_str()),
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        entries
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.components.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
