//! Composite score aggregation.
//!
//! Each service contributes a sub-score of `100 - metric * penalty`,
//! clamped to `[0, 100]`. The composite is the weighted sum of the three
//! sub-scores, clamped and rounded to two decimals.

use crate::models::{NormalizedResult, ServiceKind, Services};

/// Weight and penalty for one service.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServiceWeighting {
    /// Share of the composite score.
    pub weight: f64,
    /// Points deducted per unit of the service's metric.
    pub penalty: f64,
}

/// Scoring parameters for the three services.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreModel {
    pub static_analysis: ServiceWeighting,
    pub dependency: ServiceWeighting,
    pub ai: ServiceWeighting,
}

impl Default for ScoreModel {
    fn default() -> Self {
        Self {
            static_analysis: ServiceWeighting {
                weight: 0.2,
                penalty: default_penalty(ServiceKind::Static),
            },
            dependency: ServiceWeighting {
                weight: 0.3,
                penalty: default_penalty(ServiceKind::Dependency),
            },
            ai: ServiceWeighting {
                weight: 0.5,
                penalty: default_penalty(ServiceKind::Ai),
            },
        }
    }
}

/// Points deducted per issue, vulnerability or risk point.
pub fn default_penalty(kind: ServiceKind) -> f64 {
    match kind {
        ServiceKind::Static => 3.0,
        ServiceKind::Dependency => 5.0,
        ServiceKind::Ai => 8.0,
    }
}

impl ScoreModel {
    /// Build a model from descriptor weights and configured penalties.
    pub fn new(services: &Services, penalties: [f64; 3]) -> Self {
        let [static_penalty, dependency_penalty, ai_penalty] = penalties;
        Self {
            static_analysis: ServiceWeighting {
                weight: services.static_analysis.weight,
                penalty: static_penalty,
            },
            dependency: ServiceWeighting {
                weight: services.dependency.weight,
                penalty: dependency_penalty,
            },
            ai: ServiceWeighting {
                weight: services.ai.weight,
                penalty: ai_penalty,
            },
        }
    }

    fn weighting(&self, kind: ServiceKind) -> ServiceWeighting {
        match kind {
            ServiceKind::Static => self.static_analysis,
            ServiceKind::Dependency => self.dependency,
            ServiceKind::Ai => self.ai,
        }
    }

    /// Sub-score for one normalized result.
    ///
    /// A failed service carries its zero default and therefore scores 100.
    pub fn sub_score(&self, result: &NormalizedResult) -> f64 {
        let weighting = self.weighting(result.service);
        (100.0 - result.metric() * weighting.penalty).clamp(0.0, 100.0)
    }

    /// Weighted composite of the three services.
    pub fn aggregate(
        &self,
        static_analysis: &NormalizedResult,
        dependency: &NormalizedResult,
        ai: &NormalizedResult,
    ) -> f64 {
        let total: f64 = [static_analysis, dependency, ai]
            .into_iter()
            .map(|result| self.weighting(result.service).weight * self.sub_score(result))
            .sum();

        round2(total.clamp(0.0, 100.0))
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
