//! Chapter version records and their storage-boundary encoding.
//!
//! Internally every field is typed ([`VersionStatus`], parsed timestamps,
//! numeric ratings). The embedding index only stores string metadata, so
//! conversion to and from [`Metadata`] happens in exactly two places:
//! [`ChapterVersion::to_metadata`] on the write path and
//! [`StoredVersion::from_metadata`] on the read path.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// String-only metadata as persisted by the embedding index.
pub type Metadata = BTreeMap<String, String>;

/// Metadata keys written by [`ChapterVersion::to_metadata`].
pub mod keys {
    pub const CHAPTER: &str = "chapter";
    pub const VERSION: &str = "version";
    pub const STATUS: &str = "status";
    pub const AUTHOR: &str = "author";
    pub const TIMESTAMP: &str = "timestamp";
    pub const SOURCE_URL: &str = "source_url";
    pub const SCREENSHOT: &str = "screenshot";
    pub const HUMAN_FEEDBACK: &str = "human_feedback";
    pub const HUMAN_RATING: &str = "human_rating";
    pub const CONTENT_HASH: &str = "content_hash";
}

pub const DEFAULT_AUTHOR: &str = "ai_writer";
pub const DEFAULT_VERSION_LABEL: &str = "1.0";

/// Workflow stage a chapter version was produced in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionStatus {
    Scraped,
    AiRewritten,
    Reviewed,
    Approved,
    AutoApproved,
}

impl VersionStatus {
    pub const ALL: [VersionStatus; 5] = [
        VersionStatus::Scraped,
        VersionStatus::AiRewritten,
        VersionStatus::Reviewed,
        VersionStatus::Approved,
        VersionStatus::AutoApproved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VersionStatus::Scraped => "scraped",
            VersionStatus::AiRewritten => "ai_rewritten",
            VersionStatus::Reviewed => "reviewed",
            VersionStatus::Approved => "approved",
            VersionStatus::AutoApproved => "auto_approved",
        }
    }
}

impl fmt::Display for VersionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VersionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        VersionStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s.trim())
            .ok_or_else(|| {
                format!(
                    "unknown status '{}'. Must be one of: scraped, ai_rewritten, reviewed, approved, auto_approved",
                    s
                )
            })
    }
}

fn default_author() -> String {
    DEFAULT_AUTHOR.to_string()
}

fn default_version_label() -> String {
    DEFAULT_VERSION_LABEL.to_string()
}

/// One revision of a chapter, as handed to the version store.
///
/// Optional text fields are empty strings when absent, never a null
/// placeholder. `human_rating` is normalized to `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterVersion {
    pub chapter_name: String,
    pub content: String,
    pub status: VersionStatus,
    #[serde(default = "default_author")]
    pub author: String,
    #[serde(default = "default_version_label")]
    pub version_label: String,
    /// Creation/update time. Defaulted to store time when `None`.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source_url: String,
    #[serde(default)]
    pub screenshot_path: String,
    /// Opaque reviewer payload (rating notes, free text, edited body).
    #[serde(default)]
    pub human_feedback: String,
    #[serde(default)]
    pub human_rating: Option<f64>,
}

impl ChapterVersion {
    pub fn new(
        chapter_name: impl Into<String>,
        content: impl Into<String>,
        status: VersionStatus,
    ) -> Self {
        Self {
            chapter_name: chapter_name.into(),
            content: content.into(),
            status,
            author: default_author(),
            version_label: default_version_label(),
            timestamp: None,
            source_url: String::new(),
            screenshot_path: String::new(),
            human_feedback: String::new(),
            human_rating: None,
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn with_version_label(mut self, label: impl Into<String>) -> Self {
        self.version_label = label.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = url.into();
        self
    }

    pub fn with_screenshot_path(mut self, path: impl Into<String>) -> Self {
        self.screenshot_path = path.into();
        self
    }

    pub fn with_human_feedback(mut self, feedback: impl Into<String>) -> Self {
        self.human_feedback = feedback.into();
        self
    }

    pub fn with_human_rating(mut self, rating: f64) -> Self {
        self.human_rating = Some(rating);
        self
    }

    /// Set the rating from a 1–5 star review (stars / 5).
    pub fn with_star_rating(self, stars: u8) -> Self {
        let stars = stars.clamp(1, 5);
        self.with_human_rating(f64::from(stars) / 5.0)
    }

    pub fn content_hash(&self) -> String {
        content_hash(&self.content)
    }

    pub fn version_id(&self) -> String {
        version_id(&self.chapter_name, &self.content)
    }

    /// Encode as string metadata for the embedding index.
    ///
    /// `stored_at` fills in a missing timestamp. Ratings are clamped to
    /// `[0, 1]`; a non-finite rating is dropped rather than persisted.
    pub fn to_metadata(&self, stored_at: DateTime<Utc>) -> Metadata {
        let timestamp = self.timestamp.unwrap_or(stored_at);
        let mut meta = Metadata::new();
        meta.insert(keys::CHAPTER.to_string(), self.chapter_name.clone());
        meta.insert(keys::VERSION.to_string(), self.version_label.clone());
        meta.insert(keys::STATUS.to_string(), self.status.as_str().to_string());
        meta.insert(keys::AUTHOR.to_string(), self.author.clone());
        meta.insert(keys::TIMESTAMP.to_string(), format_timestamp(timestamp));
        meta.insert(keys::SOURCE_URL.to_string(), self.source_url.clone());
        meta.insert(keys::SCREENSHOT.to_string(), self.screenshot_path.clone());
        meta.insert(
            keys::HUMAN_FEEDBACK.to_string(),
            self.human_feedback.clone(),
        );
        meta.insert(keys::CONTENT_HASH.to_string(), self.content_hash());
        if let Some(rating) = self.human_rating.filter(|r| r.is_finite()) {
            meta.insert(
                keys::HUMAN_RATING.to_string(),
                rating.clamp(0.0, 1.0).to_string(),
            );
        }
        meta
    }
}

/// A version as read back from the index, with its content address.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredVersion {
    pub version_id: String,
    pub content: String,
    pub version: ChapterVersion,
}

impl StoredVersion {
    /// Decode a persisted record. Unknown status values and unparsable
    /// timestamps or ratings are reported as [`Error::MalformedRecord`].
    pub fn from_metadata(version_id: &str, content: String, meta: &Metadata) -> Result<Self> {
        let field = |key: &str| meta.get(key).cloned().unwrap_or_default();

        let status = meta
            .get(keys::STATUS)
            .ok_or_else(|| Error::malformed(version_id, "missing status"))?
            .parse::<VersionStatus>()
            .map_err(|e| Error::malformed(version_id, e))?;

        let timestamp = match meta.get(keys::TIMESTAMP).map(|s| s.trim()) {
            None | Some("") => None,
            Some(raw) => {
                Some(parse_timestamp(raw).map_err(|e| Error::malformed(version_id, e))?)
            }
        };

        let human_rating = match meta.get(keys::HUMAN_RATING).map(|s| s.trim()) {
            None | Some("") => None,
            Some(raw) => Some(
                raw.parse::<f64>()
                    .map_err(|e| Error::malformed(version_id, format!("human_rating: {}", e)))?,
            ),
        };

        let version = ChapterVersion {
            chapter_name: field(keys::CHAPTER),
            content: content.clone(),
            status,
            author: field(keys::AUTHOR),
            version_label: field(keys::VERSION),
            timestamp,
            source_url: field(keys::SOURCE_URL),
            screenshot_path: field(keys::SCREENSHOT),
            human_feedback: field(keys::HUMAN_FEEDBACK),
            human_rating,
        };

        Ok(Self {
            version_id: version_id.to_string(),
            content,
            version,
        })
    }
}

/// A raw similarity hit, as returned by the version store.
///
/// `distance` is in `[0, ∞)`; 0 means an identical embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchCandidate {
    pub version_id: String,
    pub content: String,
    pub metadata: Metadata,
    pub distance: f64,
}

impl SearchCandidate {
    /// Metadata value for `key`, or `""` when absent.
    pub fn meta(&self, key: &str) -> &str {
        self.metadata.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn chapter(&self) -> &str {
        self.meta(keys::CHAPTER)
    }

    pub fn author(&self) -> &str {
        self.meta(keys::AUTHOR)
    }

    pub fn status(&self) -> &str {
        self.meta(keys::STATUS)
    }

    /// First `max_chars` characters of the content, for display.
    pub fn preview(&self, max_chars: usize) -> String {
        preview(&self.content, max_chars)
    }
}

/// SHA-256 of the content, truncated to 128 bits and hex encoded.
pub fn content_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    hex::encode(&digest[..16])
}

/// Content address of a chapter revision: `chapter + "_" + content_hash`.
pub fn version_id(chapter_name: &str, content: &str) -> String {
    format!("{}_{}", chapter_name, content_hash(content))
}

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an ISO-8601 timestamp.
///
/// Accepts RFC 3339 with an offset, or a naive `YYYY-MM-DDTHH:MM:SS[.f]`
/// which is taken as UTC.
pub fn parse_timestamp(raw: &str) -> std::result::Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(naive.and_utc());
        }
    }
    Err(format!("invalid timestamp '{}'", raw))
}

/// Truncate on a character boundary, appending `...` when shortened.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_version_id_is_deterministic() {
        let a = version_id("chapter-1", "It was a dark and stormy night.");
        let b = version_id("chapter-1", "It was a dark and stormy night.");
        assert_eq!(a, b);
        assert!(a.starts_with("chapter-1_"));
        assert_eq!(a.len(), "chapter-1_".len() + 32);
    }

    #[test]
    fn test_version_id_differs_by_one_char() {
        let a = version_id("chapter-1", "The sea was calm.");
        let b = version_id("chapter-1", "The sea was calm!");
        assert_ne!(a, b);
    }

    #[test]
    fn test_version_id_scoped_by_chapter() {
        assert_ne!(version_id("one", "same"), version_id("two", "same"));
    }

    #[test]
    fn test_status_parse_and_display() {
        for status in VersionStatus::ALL {
            assert_eq!(status.as_str().parse::<VersionStatus>().unwrap(), status);
        }
        assert!("draft".parse::<VersionStatus>().is_err());
        assert_eq!(VersionStatus::AiRewritten.to_string(), "ai_rewritten");
    }

    #[test]
    fn test_status_serde_snake_case() {
        let json = serde_json::to_string(&VersionStatus::AutoApproved).unwrap();
        assert_eq!(json, "\"auto_approved\"");
    }

    #[test]
    fn test_to_metadata_normalizes_absent_fields() {
        let stored_at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let meta =
            ChapterVersion::new("ch1", "body", VersionStatus::Scraped).to_metadata(stored_at);

        assert_eq!(meta[keys::SOURCE_URL], "");
        assert_eq!(meta[keys::SCREENSHOT], "");
        assert_eq!(meta[keys::HUMAN_FEEDBACK], "");
        assert_eq!(meta[keys::AUTHOR], DEFAULT_AUTHOR);
        assert_eq!(meta[keys::VERSION], DEFAULT_VERSION_LABEL);
        assert_eq!(meta[keys::STATUS], "scraped");
        assert_eq!(meta[keys::TIMESTAMP], "2024-03-01T12:00:00.000000Z");
        assert!(!meta.contains_key(keys::HUMAN_RATING));
        assert!(meta.values().all(|v| v != "None"));
    }

    #[test]
    fn test_to_metadata_clamps_rating() {
        let now = Utc::now();
        let meta = ChapterVersion::new("ch1", "body", VersionStatus::Reviewed)
            .with_human_rating(1.7)
            .to_metadata(now);
        assert_eq!(meta[keys::HUMAN_RATING], "1");

        let meta = ChapterVersion::new("ch1", "body", VersionStatus::Reviewed)
            .with_human_rating(f64::NAN)
            .to_metadata(now);
        assert!(!meta.contains_key(keys::HUMAN_RATING));
    }

    #[test]
    fn test_star_rating() {
        let v = ChapterVersion::new("ch1", "body", VersionStatus::Reviewed).with_star_rating(4);
        assert_eq!(v.human_rating, Some(0.8));
        let v = ChapterVersion::new("ch1", "body", VersionStatus::Reviewed).with_star_rating(9);
        assert_eq!(v.human_rating, Some(1.0));
    }

    #[test]
    fn test_stored_version_roundtrips_typed_fields() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        let original = ChapterVersion::new("ch2", "text", VersionStatus::Reviewed)
            .with_author("human_reviewer")
            .with_timestamp(ts)
            .with_human_feedback("{\"rating\": 4}")
            .with_star_rating(4);
        let id = original.version_id();
        let meta = original.to_metadata(Utc::now());

        let stored = StoredVersion::from_metadata(&id, "text".to_string(), &meta).unwrap();
        assert_eq!(stored.version, original);
        assert_eq!(stored.version_id, id);
    }

    #[test]
    fn test_stored_version_rejects_bad_status() {
        let mut meta = Metadata::new();
        meta.insert(keys::STATUS.to_string(), "draft".to_string());
        let err = StoredVersion::from_metadata("x", String::new(), &meta).unwrap_err();
        assert!(matches!(err, Error::MalformedRecord { .. }));
    }

    #[test]
    fn test_parse_timestamp_accepts_naive_iso() {
        let ts = parse_timestamp("2024-01-02T03:04:05.123456").unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
            + chrono::Duration::microseconds(123456);
        assert_eq!(ts, expected);
        assert!(parse_timestamp("2024-01-02T03:04:05+02:00").is_ok());
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_preview_respects_char_boundaries() {
        assert_eq!(preview("héllo wörld", 5), "héllo...");
        assert_eq!(preview("short", 200), "short");
        assert_eq!(preview("", 3), "");
    }
}
