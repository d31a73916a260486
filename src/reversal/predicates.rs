//! 常用的 manifest 匹配条件

use crate::control::pre_action_trigger;
use crate::decision::Action;
use crate::snapshot::SnapshotManifest;

pub fn trigger_is(trigger: impl Into<String>) -> impl Fn(&SnapshotManifest) -> bool + Send + Sync {
    let trigger = trigger.into();
    move |m| m.trigger == trigger
}

/// 某动作执行前的快照，如 `pre-Compromise`
pub fn pre_action(action: Action) -> impl Fn(&SnapshotManifest) -> bool + Send + Sync {
    trigger_is(pre_action_trigger(action))
}

pub fn metadata_eq(
    key: impl Into<String>,
    value: impl Into<String>,
) -> impl Fn(&SnapshotManifest) -> bool + Send + Sync {
    let key = key.into();
    let value = value.into();
    move |m| m.meta(&key) == Some(value.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{meta, snapshot_metadata};

    fn manifest(trigger: &str, component: &str) -> SnapshotManifest {
        SnapshotManifest {
            id: "snap_x".to_string(),
            trigger: trigger.to_string(),
            correlation_id: "corr".to_string(),
            run_id: "run".to_string(),
            created_at: chrono::Utc::now(),
            metadata: snapshot_metadata([(meta::COMPONENT_ID, component)]),
            blob_ref: "snap_x".to_string(),
        }
    }

    #[test]
    fn test_predicates() {
        let m = manifest("pre-Compromise", "b");
        assert!(pre_action(Action::Compromise)(&m));
        assert!(!pre_action(Action::Adopt)(&m));
        assert!(metadata_eq(meta::COMPONENT_ID, "b")(&m));
        assert!(!metadata_eq(meta::COMPONENT_ID, "a")(&m));
        assert!(!metadata_eq("missing", "b")(&m));
    }
}
