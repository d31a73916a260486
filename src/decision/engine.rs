//! 规则决策引擎
//!
//! 按两项阈值把组件分为 Adopt 候选（两项都满足）与 Compromise 候选（恰好满足一项），
//! 各层内按 (quality, -cost) 字典序取最优；都没有则 Retire。

use std::collections::BTreeMap;

use crate::core::ControlError;
use crate::decision::{Action, Decision};
use crate::monitor::{ComponentMetrics, Requirements};

/// 规则决策的置信度（Fallback 路由按配置阈值比较）
pub const ADOPT_CONFIDENCE: f64 = 0.9;
pub const COMPROMISE_CONFIDENCE: f64 = 0.6;
pub const RETIRE_CONFIDENCE: f64 = 0.8;

#[derive(Debug, Default, Clone)]
pub struct DecisionEngine;

#[derive(Debug, Clone, Copy)]
struct Candidate<'a> {
    key: &'a str,
    quality: f64,
    cost: f64,
}

impl Candidate<'_> {
    /// quality 更高者胜；quality 相同则 cost 更低者胜；完全相同保留先到者
    fn beats(&self, other: &Candidate<'_>) -> bool {
        self.quality > other.quality || (self.quality == other.quality && self.cost < other.cost)
    }
}

impl DecisionEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn decide(
        &self,
        requirements: &Requirements,
        components: &BTreeMap<String, ComponentMetrics>,
    ) -> Result<Decision, ControlError> {
        if components.is_empty() {
            return Ok(Decision::new(
                Action::Retire,
                None,
                "No components available",
                RETIRE_CONFIDENCE,
            ));
        }

        let min_quality = requirements
            .min_quality
            .ok_or_else(|| ControlError::IncompleteRequirements("min_quality".to_string()))?;
        let max_cost = requirements
            .max_cost
            .ok_or_else(|| ControlError::IncompleteRequirements("max_cost".to_string()))?;

        let mut best_adopt: Option<Candidate> = None;
        let mut best_compromise: Option<Candidate> = None;

        for (key, metrics) in components {
            let candidate = Candidate {
                key,
                quality: metrics.quality_or_default(),
                cost: metrics.cost_or_default(),
            };
            let quality_ok = candidate.quality >= min_quality;
            let cost_ok = candidate.cost <= max_cost;

            let slot = if quality_ok && cost_ok {
                &mut best_adopt
            } else if quality_ok ^ cost_ok {
                &mut best_compromise
            } else {
                continue;
            };
            if slot.map_or(true, |current| candidate.beats(&current)) {
                *slot = Some(candidate);
            }
        }

        if let Some(c) = best_adopt {
            return Ok(Decision::new(
                Action::Adopt,
                Some(c.key.to_string()),
                format!(
                    "{} meets all requirements (quality {:.3} >= {:.3}, cost {:.3} <= {:.3})",
                    c.key, c.quality, min_quality, c.cost, max_cost
                ),
                ADOPT_CONFIDENCE,
            ));
        }

        if let Some(c) = best_compromise {
            let met = if c.quality >= min_quality { "quality" } else { "cost" };
            return Ok(Decision::new(
                Action::Compromise,
                Some(c.key.to_string()),
                format!("{} meets only the {} requirement", c.key, met),
                COMPROMISE_CONFIDENCE,
            ));
        }

        Ok(Decision::new(
            Action::Retire,
            None,
            "No component meets any requirement",
            RETIRE_CONFIDENCE,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(entries: &[(&str, Option<f64>, Option<f64>)]) -> BTreeMap<String, ComponentMetrics> {
        entries
            .iter()
            .map(|(k, q, c)| (k.to_string(), ComponentMetrics { quality: *q, cost: *c }))
            .collect()
    }

    #[test]
    fn test_adopt_wins_over_compromise() {
        let engine = DecisionEngine::new();
        let req = Requirements::new(0.8, 1.0);
        let comps = metrics(&[
            ("fast", Some(0.85), Some(0.5)),
            ("precise", Some(0.99), Some(3.0)),
        ]);
        let d = engine.decide(&req, &comps).unwrap();
        assert_eq!(d.action, Action::Adopt);
        assert_eq!(d.target_component.as_deref(), Some("fast"));
    }

    #[test]
    fn test_both_compromise_higher_quality_wins() {
        let engine = DecisionEngine::new();
        let req = Requirements::new(0.8, 1.0);
        let comps = metrics(&[("A", Some(0.9), Some(1.5)), ("B", Some(0.95), Some(1.5))]);
        let d = engine.decide(&req, &comps).unwrap();
        assert_eq!(d.action, Action::Compromise);
        assert_eq!(d.target_component.as_deref(), Some("B"));
    }

    #[test]
    fn test_tie_break_lower_cost() {
        let engine = DecisionEngine::new();
        let req = Requirements::new(0.5, 1.0);
        let adopt = metrics(&[("a", Some(0.9), Some(0.8)), ("b", Some(0.9), Some(0.3))]);
        assert_eq!(
            engine.decide(&req, &adopt).unwrap().target_component.as_deref(),
            Some("b")
        );

        let compromise = metrics(&[("a", Some(0.9), Some(2.0)), ("b", Some(0.9), Some(1.5))]);
        let d = engine.decide(&req, &compromise).unwrap();
        assert_eq!(d.action, Action::Compromise);
        assert_eq!(d.target_component.as_deref(), Some("b"));
    }

    #[test]
    fn test_empty_components_retire_regardless_of_requirements() {
        let engine = DecisionEngine::new();
        let d = engine.decide(&Requirements::default(), &BTreeMap::new()).unwrap();
        assert_eq!(d.action, Action::Retire);
        assert!(d.target_component.is_none());
    }

    #[test]
    fn test_incomplete_requirements() {
        let engine = DecisionEngine::new();
        let comps = metrics(&[("a", Some(0.9), Some(0.1))]);
        let req = Requirements {
            min_quality: Some(0.5),
            max_cost: None,
        };
        assert!(matches!(
            engine.decide(&req, &comps),
            Err(ControlError::IncompleteRequirements(_))
        ));
    }

    #[test]
    fn test_missing_cost_cannot_qualify_on_cost() {
        let engine = DecisionEngine::new();
        let req = Requirements::new(0.99, 1.0);
        let comps = metrics(&[("slow", Some(0.5), None)]);
        let d = engine.decide(&req, &comps).unwrap();
        assert_eq!(d.action, Action::Retire);
        assert!(d.target_component.is_none());
    }

    #[test]
    fn test_missing_quality_defaults_to_zero() {
        let engine = DecisionEngine::new();
        // quality 缺失视为 0，只有 cost 满足 → Compromise
        let d = engine
            .decide(&Requirements::new(0.5, 1.0), &metrics(&[("cheap", None, Some(0.2))]))
            .unwrap();
        assert_eq!(d.action, Action::Compromise);

        // min_quality 为 0 时任意非负 quality 都通过
        let d = engine
            .decide(&Requirements::new(0.0, 1.0), &metrics(&[("cheap", None, Some(0.2))]))
            .unwrap();
        assert_eq!(d.action, Action::Adopt);
    }

    #[test]
    fn test_never_retire_or_compromise_when_adopt_exists() {
        let engine = DecisionEngine::new();
        let req = Requirements::new(0.6, 1.0);
        for extra in [0.0, 0.3, 0.7, 1.0] {
            let comps = metrics(&[
                ("good", Some(0.7), Some(0.9)),
                ("half", Some(extra), Some(5.0)),
                ("none", Some(0.1), None),
                ("cheap", Some(0.2), Some(0.1)),
            ]);
            let d = engine.decide(&req, &comps).unwrap();
            assert_eq!(d.action, Action::Adopt);
        }
    }
}
