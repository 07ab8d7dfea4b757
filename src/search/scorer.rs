//! Multiplicative post-scoring on top of the index's BM25 text score.

use std::time::{SystemTime, UNIX_EPOCH};

const FILENAME_MATCH_BOOST: f32 = 1.5;
const RECENCY_HALF_LIFE_DAYS: f64 = 30.0;
const SIZE_PENALTY_CEILING_BYTES: f64 = 1024.0 * 1024.0;

/// Applies the filename, recency and size factors to a base text score.
///
/// The clock is captured once per search so scoring is deterministic
/// within a snapshot.
#[derive(Debug, Clone)]
pub struct Scorer {
    now_epoch_secs: i64,
    query_lower: String,
}

impl Scorer {
    pub fn new(query_text: &str) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Self::at(query_text, now)
    }

    /// Construct against a fixed clock.
    pub fn at(query_text: &str, now_epoch_secs: i64) -> Self {
        Self {
            now_epoch_secs,
            query_lower: query_text.trim().to_lowercase(),
        }
    }

    /// `text * filename * recency * size`.
    pub fn score(&self, text_score: f32, filename: &str, modified_epoch_secs: i64, size_bytes: i64) -> f32 {
        text_score
            * self.filename_boost(filename)
            * self.recency_factor(modified_epoch_secs)
            * size_penalty(size_bytes)
    }

    /// 1.5 when the query text is a case-insensitive substring of the
    /// file name, else 1.0.
    fn filename_boost(&self, filename: &str) -> f32 {
        if !self.query_lower.is_empty() && filename.to_lowercase().contains(&self.query_lower) {
            FILENAME_MATCH_BOOST
        } else {
            1.0
        }
    }

    /// `exp(-age_days / 30)`, clamped to `[0.5, 1.5]`.
    fn recency_factor(&self, modified_epoch_secs: i64) -> f32 {
        let age_secs = (self.now_epoch_secs - modified_epoch_secs).max(0) as f64;
        let age_days = age_secs / 86_400.0;
        let factor = (-age_days / RECENCY_HALF_LIFE_DAYS).exp();
        factor.clamp(0.5, 1.5) as f32
    }
}

/// Linear from 1.0 at zero bytes down to 0.5 at 1 MiB and beyond, to
/// deprioritize huge generated files.
fn size_penalty(size_bytes: i64) -> f32 {
    let ratio = (size_bytes.max(0) as f64 / SIZE_PENALTY_CEILING_BYTES).min(1.0);
    (1.0 - 0.5 * ratio) as f32
}
