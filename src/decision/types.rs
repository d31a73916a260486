use serde::{Deserialize, Serialize};

use crate::core::ControlError;

/// 决策动作；历史标签（Marry / Fuck / Kill / No Action）仅在反序列化时兼容
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// 满足全部阈值
    #[serde(alias = "Marry", alias = "adopt")]
    Adopt,
    /// 只满足部分阈值，视为可回滚的临时选择
    #[serde(alias = "Fuck", alias = "compromise")]
    Compromise,
    /// 没有可接受的组件；不强制停用
    #[serde(alias = "Kill", alias = "retire")]
    Retire,
    #[serde(alias = "No Action", alias = "no_action", alias = "none")]
    NoAction,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Adopt => "Adopt",
            Action::Compromise => "Compromise",
            Action::Retire => "Retire",
            Action::NoAction => "NoAction",
        }
    }

    /// 该动作是否必须带 target_component
    pub fn requires_target(&self) -> bool {
        matches!(self, Action::Adopt | Action::Compromise)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Action {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Adopt" | "adopt" | "Marry" => Ok(Action::Adopt),
            "Compromise" | "compromise" | "Fuck" => Ok(Action::Compromise),
            "Retire" | "retire" | "Kill" => Ok(Action::Retire),
            "NoAction" | "no_action" | "No Action" | "none" => Ok(Action::NoAction),
            other => Err(ControlError::InvalidDecision(format!("unknown action '{other}'"))),
        }
    }
}

/// 决策记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: Action,
    #[serde(default)]
    pub target_component: Option<String>,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_info: Option<String>,
}

impl Decision {
    pub fn new(
        action: Action,
        target_component: Option<String>,
        reasoning: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            action,
            target_component,
            reasoning: reasoning.into(),
            confidence,
            error_info: None,
        }
    }

    pub fn no_action(reasoning: impl Into<String>) -> Self {
        Self::new(Action::NoAction, None, reasoning, 1.0)
    }

    pub fn with_error_info(mut self, info: impl Into<String>) -> Self {
        self.error_info = Some(info.into());
        self
    }

    /// Adopt / Compromise 必须指定目标组件
    pub fn validate(&self) -> Result<(), ControlError> {
        let has_target = self
            .target_component
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty());
        if self.action.requires_target() && !has_target {
            return Err(ControlError::InvalidDecision(format!(
                "{} requires a target component",
                self.action
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_labels_deserialize() {
        let d: Decision = serde_json::from_str(
            r#"{"action": "Marry", "target_component": "a", "reasoning": "ok", "confidence": 0.9}"#,
        )
        .unwrap();
        assert_eq!(d.action, Action::Adopt);

        let d: Decision = serde_json::from_str(r#"{"action": "No Action"}"#).unwrap();
        assert_eq!(d.action, Action::NoAction);
        assert!(d.target_component.is_none());
    }

    #[test]
    fn test_validate_requires_target() {
        assert!(Decision::new(Action::Compromise, None, "", 0.6).validate().is_err());
        assert!(Decision::new(Action::Adopt, Some(" ".into()), "", 0.9).validate().is_err());
        assert!(Decision::new(Action::Retire, None, "", 0.8).validate().is_ok());
        assert!(Decision::no_action("idle").validate().is_ok());
    }

    #[test]
    fn test_action_from_str() {
        assert_eq!("Kill".parse::<Action>().unwrap(), Action::Retire);
        assert!("Divorce".parse::<Action>().is_err());
    }
}
