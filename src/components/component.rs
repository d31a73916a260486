//! 组件调用约定
//!
//! 组件是可插拔的工作单元：invoke(params) -> (output, quality)。
//! 同步实现放到 blocking 线程池执行，异步实现直接 await，二者都不会阻塞其它运行。

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use serde_json::Value;

/// 组件一次调用的产出：输出内容与组件自报的质量分
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentOutput {
    pub output: Value,
    pub quality: f64,
}

impl ComponentOutput {
    pub fn new(output: Value, quality: f64) -> Self {
        Self { output, quality }
    }
}

/// 可挂起的组件实现
#[async_trait]
pub trait AsyncComponent: Send + Sync {
    async fn invoke(&self, params: Value) -> Result<ComponentOutput, String>;
}

pub type ImmediateFn = dyn Fn(Value) -> Result<ComponentOutput, String> + Send + Sync;

/// 同步 / 异步两种实现的统一包装
#[derive(Clone)]
pub enum Component {
    Immediate(Arc<ImmediateFn>),
    Suspending(Arc<dyn AsyncComponent>),
}

impl Component {
    pub fn immediate<F>(f: F) -> Self
    where
        F: Fn(Value) -> Result<ComponentOutput, String> + Send + Sync + 'static,
    {
        Component::Immediate(Arc::new(f))
    }

    pub fn suspending(component: impl AsyncComponent + 'static) -> Self {
        Component::Suspending(Arc::new(component))
    }

    pub fn is_suspending(&self) -> bool {
        matches!(self, Component::Suspending(_))
    }

    /// 调用组件；两种实现 panic 时都转为 Err
    pub async fn invoke(&self, params: Value) -> Result<ComponentOutput, String> {
        match self {
            Component::Immediate(f) => {
                let f = Arc::clone(f);
                tokio::task::spawn_blocking(move || f(params))
                    .await
                    .map_err(|e| format!("component task aborted: {e}"))?
            }
            Component::Suspending(c) => AssertUnwindSafe(c.invoke(params))
                .catch_unwind()
                .await
                .map_err(|panic| format!("component task aborted: {}", panic_message(&*panic)))?,
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panicked".to_string())
}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Component::Immediate(_) => f.write_str("Component::Immediate"),
            Component::Suspending(_) => f.write_str("Component::Suspending"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Doubler;

    #[async_trait]
    impl AsyncComponent for Doubler {
        async fn invoke(&self, params: Value) -> Result<ComponentOutput, String> {
            tokio::task::yield_now().await;
            let n = params.get("n").and_then(Value::as_i64).ok_or("missing n")?;
            Ok(ComponentOutput::new(serde_json::json!(n * 2), 0.8))
        }
    }

    #[tokio::test]
    async fn test_immediate_and_suspending() {
        let sync = Component::immediate(|p| Ok(ComponentOutput::new(p, 1.0)));
        let out = sync.invoke(serde_json::json!("x")).await.unwrap();
        assert_eq!(out.output, serde_json::json!("x"));
        assert!(!sync.is_suspending());

        let suspending = Component::suspending(Doubler);
        let out = suspending.invoke(serde_json::json!({"n": 21})).await.unwrap();
        assert_eq!(out.output, serde_json::json!(42));
        assert!(suspending.invoke(serde_json::json!({})).await.is_err());
    }

    #[tokio::test]
    async fn test_immediate_panic_becomes_error() {
        let broken = Component::immediate(|_| panic!("boom"));
        let err = broken.invoke(Value::Null).await.unwrap_err();
        assert!(err.contains("aborted"));
    }

    struct Exploding;

    #[async_trait]
    impl AsyncComponent for Exploding {
        async fn invoke(&self, _params: Value) -> Result<ComponentOutput, String> {
            tokio::task::yield_now().await;
            panic!("remote model crashed");
        }
    }

    #[tokio::test]
    async fn test_suspending_panic_becomes_error() {
        let broken = Component::suspending(Exploding);
        let err = broken.invoke(Value::Null).await.unwrap_err();
        assert!(err.contains("aborted"));
        assert!(err.contains("remote model crashed"));
    }
}
