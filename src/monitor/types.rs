use serde::{Deserialize, Serialize};

/// 某个组件的观测指标；缺失字段在决策时取默认（quality=0，cost=+inf）
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
}

impl ComponentMetrics {
    pub fn new(quality: f64, cost: f64) -> Self {
        Self {
            quality: Some(quality),
            cost: Some(cost),
        }
    }

    /// 非有限值（NaN / ±inf）无法经 JSON 往返，视为缺失
    pub fn finite(self) -> Self {
        Self {
            quality: self.quality.filter(|q| q.is_finite()),
            cost: self.cost.filter(|c| c.is_finite()),
        }
    }

    pub fn is_finite(&self) -> bool {
        self.quality.map_or(true, f64::is_finite) && self.cost.map_or(true, f64::is_finite)
    }

    pub fn quality_or_default(&self) -> f64 {
        self.quality.unwrap_or(0.0)
    }

    pub fn cost_or_default(&self) -> f64 {
        self.cost.unwrap_or(f64::INFINITY)
    }
}

/// 任务的阈值要求
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Requirements {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_quality: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cost: Option<f64>,
}

impl Requirements {
    pub fn new(min_quality: f64, max_cost: f64) -> Self {
        Self {
            min_quality: Some(min_quality),
            max_cost: Some(max_cost),
        }
    }
}

/// 执行后实测的表现：quality 由组件声明，cost 为耗时（秒）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    pub quality: f64,
    pub cost: f64,
}

impl Performance {
    pub fn is_finite(&self) -> bool {
        self.quality.is_finite() && self.cost.is_finite()
    }
}

impl From<Performance> for ComponentMetrics {
    fn from(p: Performance) -> Self {
        ComponentMetrics::new(p.quality, p.cost)
    }
}
