//! # Feedback Record
//!
//! The structured critique returned to the learner, plus the three fixed
//! fallback templates used when normal generation cannot complete.
//!
//! ## Wire Shape:
//! `score_breakdown` and `timings_ms` are skipped when absent, so a client that
//! only knows the simple variant can still parse an extended record.

use serde::{Deserialize, Serialize};

/// Maximum number of issues a record may carry.
pub const MAX_ISSUES: usize = 3;

/// Maximum number of alternative phrasings a record may carry.
pub const MAX_BETTER_OPTIONS: usize = 2;

/// Upper bound for the overall score and every sub-score.
pub const MAX_SCORE: u8 = 100;

pub const NO_SPEECH_MESSAGE: &str = "No speech detected";
pub const PARSE_FAILURE_MESSAGE: &str = "LLM response parsing failed";

/// Structured feedback for one spoken utterance.
///
/// ## Lifecycle:
/// Built fresh per request, either from a validated model reply or from one
/// of the fallback constructors below. Only `timings_ms` is attached later,
/// by the request handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    /// Verbatim speech-to-text output
    pub raw_transcript: String,

    /// Natural English rewrite (1-2 sentences)
    pub corrected: String,

    /// Short issue descriptions (at most 3)
    pub issues: Vec<String>,

    /// Alternative phrasings (at most 2)
    pub better_options: Vec<String>,

    /// Practice sentence using the same structure
    pub drill: String,

    /// Overall score, 0-100
    pub score: u8,

    /// Per-category scores (extended variant only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_breakdown: Option<ScoreBreakdown>,

    /// Pipeline timings, filled in by the caller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timings_ms: Option<TimingsMs>,
}

/// Three-way score split used by the strict prompt variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub vocabulary: SubScore,
    pub grammar: SubScore,
    pub understandability: SubScore,
}

/// One category score with the model's justification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubScore {
    pub score: u8,
    pub reason: String,
}

/// Stage durations in milliseconds. Any stage may be unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingsMs {
    pub stt: Option<u64>,
    pub llm: Option<u64>,
    pub total: Option<u64>,
}

impl ScoreBreakdown {
    /// Same score and reason for every category.
    pub fn uniform(score: u8, reason: &str) -> Self {
        let sub = SubScore {
            score,
            reason: reason.to_string(),
        };
        Self {
            vocabulary: sub.clone(),
            grammar: sub.clone(),
            understandability: sub,
        }
    }

    /// Rounded arithmetic mean of the three sub-scores.
    pub fn mean_score(&self) -> u8 {
        let total = self.vocabulary.score as f64
            + self.grammar.score as f64
            + self.understandability.score as f64;
        (total / 3.0).round() as u8
    }

    fn sub_scores(&self) -> [&SubScore; 3] {
        [&self.vocabulary, &self.grammar, &self.understandability]
    }
}

impl FeedbackRecord {
    /// Record returned when the transcript is empty or whitespace-only.
    pub fn no_speech(raw_transcript: &str, with_breakdown: bool) -> Self {
        Self {
            raw_transcript: raw_transcript.to_string(),
            corrected: "(empty)".to_string(),
            issues: vec![NO_SPEECH_MESSAGE.to_string()],
            better_options: Vec::new(),
            drill: "Please try speaking again.".to_string(),
            score: 0,
            score_breakdown: with_breakdown.then(|| ScoreBreakdown::uniform(0, NO_SPEECH_MESSAGE)),
            timings_ms: None,
        }
    }

    /// Record returned when the model reply is not valid, schema-conformant JSON.
    pub fn parse_failure(raw_transcript: &str, with_breakdown: bool) -> Self {
        Self::degraded(raw_transcript, PARSE_FAILURE_MESSAGE.to_string(), with_breakdown)
    }

    /// Record returned when the language-model call itself failed.
    pub fn upstream_failure(raw_transcript: &str, error: &str, with_breakdown: bool) -> Self {
        Self::degraded(raw_transcript, format!("LLM error: {}", error), with_breakdown)
    }

    /// Shared shape of the two score-50 fallbacks: the transcript is echoed
    /// uncorrected and the diagnostic becomes the only issue.
    fn degraded(raw_transcript: &str, issue: String, with_breakdown: bool) -> Self {
        Self {
            raw_transcript: raw_transcript.to_string(),
            corrected: raw_transcript.to_string(),
            score_breakdown: with_breakdown.then(|| ScoreBreakdown::uniform(50, &issue)),
            issues: vec![issue],
            better_options: Vec::new(),
            drill: "Please try again.".to_string(),
            score: 50,
            timings_ms: None,
        }
    }

    /// Check every record invariant.
    ///
    /// Records produced by [`crate::feedback::parse`] already satisfy these;
    /// this is the single place the bounds are spelled out.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.issues.len() > MAX_ISSUES {
            return Err(format!("issues has {} entries (max {})", self.issues.len(), MAX_ISSUES));
        }
        if self.better_options.len() > MAX_BETTER_OPTIONS {
            return Err(format!(
                "better_options has {} entries (max {})",
                self.better_options.len(),
                MAX_BETTER_OPTIONS
            ));
        }
        if self.score > MAX_SCORE {
            return Err(format!("score {} out of range", self.score));
        }
        if let Some(breakdown) = &self.score_breakdown {
            if let Some(sub) = breakdown.sub_scores().iter().find(|s| s.score > MAX_SCORE) {
                return Err(format!("sub-score {} out of range", sub.score));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_speech_fallback_matches_contract() {
        let record = FeedbackRecord::no_speech("", false);
        assert_eq!(record.raw_transcript, "");
        assert_eq!(record.corrected, "(empty)");
        assert_eq!(record.issues, vec!["No speech detected".to_string()]);
        assert!(record.better_options.is_empty());
        assert_eq!(record.drill, "Please try speaking again.");
        assert_eq!(record.score, 0);
        assert!(record.score_breakdown.is_none());

        let extended = FeedbackRecord::no_speech("  ", true);
        let breakdown = extended.score_breakdown.unwrap();
        assert_eq!(breakdown.grammar.score, 0);
        assert_eq!(breakdown.vocabulary.reason, "No speech detected");
    }

    #[test]
    fn test_degraded_fallbacks_echo_transcript() {
        let parse = FeedbackRecord::parse_failure("I goes home", true);
        assert_eq!(parse.corrected, "I goes home");
        assert_eq!(parse.score, 50);
        assert_eq!(parse.issues, vec!["LLM response parsing failed".to_string()]);
        assert_eq!(parse.score_breakdown.unwrap().understandability.score, 50);

        let upstream = FeedbackRecord::upstream_failure("I goes home", "connection refused", false);
        assert_eq!(upstream.issues, vec!["LLM error: connection refused".to_string()]);
        assert_eq!(upstream.drill, "Please try again.");
        assert!(upstream.check_invariants().is_ok());
    }

    #[test]
    fn test_mean_score_rounds() {
        let breakdown = ScoreBreakdown {
            vocabulary: SubScore { score: 80, reason: String::new() },
            grammar: SubScore { score: 70, reason: String::new() },
            understandability: SubScore { score: 71, reason: String::new() },
        };
        // 221 / 3 = 73.67
        assert_eq!(breakdown.mean_score(), 74);
    }

    #[test]
    fn test_optional_fields_are_skipped_when_absent() {
        let record = FeedbackRecord::no_speech("", false);
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("score_breakdown").is_none());
        assert!(json.get("timings_ms").is_none());

        let extended = serde_json::to_value(FeedbackRecord::no_speech("", true)).unwrap();
        assert_eq!(extended["score_breakdown"]["grammar"]["score"], 0);
    }

    #[test]
    fn test_invariant_violations_are_reported() {
        let mut record = FeedbackRecord::parse_failure("x", false);
        record.issues = vec!["a".into(), "b".into(), "c".into(), "d".into()];
        assert!(record.check_invariants().is_err());

        let mut record = FeedbackRecord::parse_failure("x", false);
        record.score = 101;
        assert!(record.check_invariants().is_err());
    }
}
