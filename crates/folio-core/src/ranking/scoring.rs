//! Candidate scoring and feature extraction.
//!
//! Scoring and weight updates read the same [`Signals`] so the two can
//! never disagree about recency or trust.
//!
//! ```text
//! score = (1 − distance) · W.content_relevance
//!       + recency(age)   · W.version_recency     if timestamp
//!       + rating         · W.human_rating        if rating
//! score ×= W.author_trust                         if trusted author
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{keys, parse_timestamp, SearchCandidate};

use super::weights::WeightVector;

/// Age at which the recency signal reaches 0.
pub const RECENCY_HORIZON_DAYS: f64 = 365.0;

/// Feature value for an unrated version during weight updates.
pub const NEUTRAL_RATING: f64 = 0.5;

/// Feature value for an untrusted author during weight updates.
pub const UNTRUSTED_AUTHOR: f64 = 0.5;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Linear decay from 1 (now) to 0 (one horizon old). Future timestamps give 1.
pub fn recency(age_days: f64) -> f64 {
    (1.0 - age_days / RECENCY_HORIZON_DAYS).clamp(0.0, 1.0)
}

/// Typed signals parsed from a candidate's metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Signals {
    pub similarity: f64,
    pub age_days: Option<f64>,
    pub rating: Option<f64>,
    pub trusted_author: bool,
}

impl Signals {
    /// Parse a candidate. Errors name the metadata field that was malformed.
    pub fn extract(
        candidate: &SearchCandidate,
        trusted_author: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, String> {
        let age_days = match candidate.meta(keys::TIMESTAMP).trim() {
            "" => None,
            raw => {
                let ts = parse_timestamp(raw)?;
                Some((now - ts).num_milliseconds() as f64 / 1000.0 / SECONDS_PER_DAY)
            }
        };

        let rating = match candidate.meta(keys::HUMAN_RATING).trim() {
            "" => None,
            raw => {
                let r: f64 = raw
                    .parse()
                    .map_err(|_| format!("human_rating '{}' is not a number", raw))?;
                if !r.is_finite() {
                    return Err(format!("human_rating '{}' is not finite", raw));
                }
                Some(r.clamp(0.0, 1.0))
            }
        };

        Ok(Self {
            similarity: 1.0 - candidate.distance,
            age_days,
            rating,
            trusted_author: candidate.author() == trusted_author,
        })
    }

    pub fn score(&self, w: &WeightVector) -> f64 {
        let mut score = self.similarity * w.content_relevance;
        if let Some(age) = self.age_days {
            score += recency(age) * w.version_recency;
        }
        if let Some(rating) = self.rating {
            score += rating * w.human_rating;
        }
        if self.trusted_author {
            score *= w.author_trust;
        }
        score
    }

    pub fn features(&self) -> Features {
        Features {
            content_relevance: self.similarity.clamp(0.0, 1.0),
            version_recency: self.age_days.map(recency).unwrap_or(0.0),
            human_rating: self.rating.unwrap_or(NEUTRAL_RATING),
            author_trust: if self.trusted_author {
                1.0
            } else {
                UNTRUSTED_AUTHOR
            },
        }
    }
}

/// Per-feature values in `[0, 1]` used for weight updates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Features {
    pub content_relevance: f64,
    pub version_recency: f64,
    pub human_rating: f64,
    pub author_trust: f64,
}

impl Features {
    /// Features of a candidate whose metadata could not be parsed: only
    /// similarity is known, the rest take neutral values.
    pub fn similarity_only(distance: f64) -> Self {
        Features {
            content_relevance: (1.0 - distance).clamp(0.0, 1.0),
            version_recency: 0.0,
            human_rating: NEUTRAL_RATING,
            author_trust: UNTRUSTED_AUTHOR,
        }
    }
}

/// Score with fallback: malformed metadata contributes base similarity only.
pub fn score_candidate(
    candidate: &SearchCandidate,
    weights: &WeightVector,
    trusted_author: &str,
    now: DateTime<Utc>,
) -> f64 {
    match Signals::extract(candidate, trusted_author, now) {
        Ok(signals) => signals.score(weights),
        Err(reason) => {
            tracing::warn!(
                version_id = %candidate.version_id,
                %reason,
                "malformed candidate metadata, scoring on similarity only"
            );
            (1.0 - candidate.distance) * weights.content_relevance
        }
    }
}
