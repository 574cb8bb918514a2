use serde::{Deserialize, Serialize};

use super::scoring::Features;

/// Adaptive per-feature weights. Non-negative, sums to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightVector {
    pub content_relevance: f64,
    pub version_recency: f64,
    pub human_rating: f64,
    pub author_trust: f64,
}

impl WeightVector {
    /// Unnormalized starting priors. Human rating is trusted most, recency least.
    pub const PRIORS: WeightVector = WeightVector {
        content_relevance: 1.0,
        version_recency: 0.8,
        human_rating: 1.2,
        author_trust: 0.9,
    };

    pub const UNIFORM: WeightVector = WeightVector {
        content_relevance: 0.25,
        version_recency: 0.25,
        human_rating: 0.25,
        author_trust: 0.25,
    };

    pub fn initial() -> Self {
        Self::PRIORS.normalized()
    }

    pub fn sum(&self) -> f64 {
        self.content_relevance + self.version_recency + self.human_rating + self.author_trust
    }

    /// Scale so the weights sum to 1. Negative or non-finite entries are
    /// treated as 0; an all-zero vector becomes uniform.
    pub fn normalized(self) -> Self {
        let clean = |w: f64| if w.is_finite() && w > 0.0 { w } else { 0.0 };
        let raw = WeightVector {
            content_relevance: clean(self.content_relevance),
            version_recency: clean(self.version_recency),
            human_rating: clean(self.human_rating),
            author_trust: clean(self.author_trust),
        };
        let total = raw.sum();
        if !(total.is_finite() && total > 0.0) {
            return Self::UNIFORM;
        }
        WeightVector {
            content_relevance: raw.content_relevance / total,
            version_recency: raw.version_recency / total,
            human_rating: raw.human_rating / total,
            author_trust: raw.author_trust / total,
        }
    }

    /// Linear online update: `w += learning_rate * feature`, then renormalize.
    pub fn apply_feedback(&mut self, features: &Features, learning_rate: f64) {
        let updated = WeightVector {
            content_relevance: self.content_relevance + learning_rate * features.content_relevance,
            version_recency: self.version_recency + learning_rate * features.version_recency,
            human_rating: self.human_rating + learning_rate * features.human_rating,
            author_trust: self.author_trust + learning_rate * features.author_trust,
        };
        *self = updated.normalized();
    }
}

impl Default for WeightVector {
    fn default() -> Self {
        Self::initial()
    }
}
