//! # Model Reply Parsing
//!
//! Turns untrusted model text into a [`FeedbackRecord`] in two stages:
//! 1. **Deserialize** the (unfenced) text into a generic `serde_json::Value`
//! 2. **Convert** field by field into the record type, failing closed on the
//!    first missing field, wrong type or out-of-range value
//!
//! Score reconciliation for the breakdown variant runs between the two stages.

use crate::feedback::prompt::ScoringMode;
use crate::feedback::record::{FeedbackRecord, ScoreBreakdown, SubScore};
use serde_json::{Map, Value};
use thiserror::Error;

/// Reason shown on synthesized sub-scores when the model skipped the breakdown.
pub const MISSING_BREAKDOWN_REASON: &str = "Breakdown not provided by model; overall score applied";

const FENCE: &str = "```";

/// Why a model reply could not become a record.
#[derive(Debug, Error)]
pub enum ReplyError {
    #[error("reply is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("reply is not a JSON object")]
    NotAnObject,

    #[error("field `{0}` is missing")]
    MissingField(&'static str),

    #[error("field `{field}` has the wrong type: {expected} expected")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("record invariant violated: {0}")]
    Invariant(String),
}

/// Strip an optional fenced-code wrapper from the model reply.
///
/// Handles a leading fence with or without a language tag (```json,
/// ```JSON, plain ```) and a trailing fence, ignoring surrounding whitespace.
pub fn extract_json_text(reply: &str) -> &str {
    let mut text = reply.trim();

    if let Some(rest) = text.strip_prefix(FENCE) {
        // Only the tag goes; the body may start on the fence line.
        text = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    }

    if let Some(rest) = text.trim_end().strip_suffix(FENCE) {
        text = rest;
    }

    text.trim()
}

/// Parse a model reply into a validated record for `raw_transcript`.
///
/// `raw_transcript` always overwrites whatever the model echoed back, and any
/// `timings_ms` in the reply is ignored.
pub fn parse_reply(
    reply: &str,
    raw_transcript: &str,
    mode: ScoringMode,
) -> Result<FeedbackRecord, ReplyError> {
    let mut value: Value = serde_json::from_str(extract_json_text(reply))?;
    let object = value.as_object_mut().ok_or(ReplyError::NotAnObject)?;

    if mode.has_breakdown() {
        reconcile_scores(object);
    }

    let record = FeedbackRecord {
        raw_transcript: raw_transcript.to_string(),
        corrected: string_field(object, "corrected")?,
        issues: string_list_field(object, "issues")?,
        better_options: string_list_field(object, "better_options")?,
        drill: string_field(object, "drill")?,
        score: score_value(object.get("score"), "score")?,
        score_breakdown: if mode.has_breakdown() {
            Some(breakdown_field(object)?)
        } else {
            None
        },
        timings_ms: None,
    };

    record.check_invariants().map_err(ReplyError::Invariant)?;
    Ok(record)
}

/// Fill in whichever half of the score/breakdown pair the model left out.
///
/// - breakdown present, `score` absent or 0: `score` becomes the rounded mean
/// - breakdown absent: the flat `score` is copied into all three categories
///
/// Malformed values are left untouched so conversion rejects them afterwards.
fn reconcile_scores(object: &mut Map<String, Value>) {
    match object.get("score_breakdown") {
        Some(Value::Object(breakdown)) => {
            // NOTE: a genuine overall score of 0 is indistinguishable from a
            // missing one here and gets recomputed. Kept for compatibility with
            // existing clients; this is a latent bug.
            let score_missing = match object.get("score") {
                None | Some(Value::Null) => true,
                Some(score) => score.as_f64() == Some(0.0),
            };
            if !score_missing {
                return;
            }

            let subs: Option<Vec<f64>> = ["vocabulary", "grammar", "understandability"]
                .iter()
                .map(|key| breakdown.get(*key).and_then(|c| c.get("score")).and_then(Value::as_f64))
                .collect();

            if let Some(subs) = subs {
                let mean = (subs.iter().sum::<f64>() / 3.0).round();
                object.insert("score".to_string(), Value::from(mean as i64));
            }
        }
        Some(_) => {}
        None => {
            if let Some(score) = object.get("score").cloned() {
                let sub = serde_json::json!({
                    "score": score,
                    "reason": MISSING_BREAKDOWN_REASON,
                });
                object.insert(
                    "score_breakdown".to_string(),
                    serde_json::json!({
                        "vocabulary": sub,
                        "grammar": sub,
                        "understandability": sub,
                    }),
                );
            }
        }
    }
}

fn string_field(object: &Map<String, Value>, field: &'static str) -> Result<String, ReplyError> {
    match object.get(field) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(ReplyError::WrongType { field, expected: "string" }),
        None => Err(ReplyError::MissingField(field)),
    }
}

fn string_list_field(
    object: &Map<String, Value>,
    field: &'static str,
) -> Result<Vec<String>, ReplyError> {
    let wrong_type = ReplyError::WrongType {
        field,
        expected: "array of strings",
    };

    let items = match object.get(field) {
        Some(Value::Array(items)) => items,
        Some(_) => return Err(wrong_type),
        None => return Err(ReplyError::MissingField(field)),
    };

    items
        .iter()
        .map(|item| item.as_str().map(str::to_string))
        .collect::<Option<Vec<_>>>()
        .ok_or(wrong_type)
}

/// Accept an integer, or a float with no fractional part, that fits in `u8`.
/// Range against 0-100 is checked by the record invariants.
fn score_value(value: Option<&Value>, field: &'static str) -> Result<u8, ReplyError> {
    let wrong_type = ReplyError::WrongType {
        field,
        expected: "integer 0-100",
    };

    let value = value.ok_or(ReplyError::MissingField(field))?;
    let number = if let Some(n) = value.as_u64() {
        n
    } else {
        match value.as_f64() {
            Some(f) if f.fract() == 0.0 && f >= 0.0 => f as u64,
            _ => return Err(wrong_type),
        }
    };

    u8::try_from(number).map_err(|_| wrong_type)
}

fn breakdown_field(object: &Map<String, Value>) -> Result<ScoreBreakdown, ReplyError> {
    let breakdown = match object.get("score_breakdown") {
        Some(Value::Object(b)) => b,
        Some(_) => {
            return Err(ReplyError::WrongType {
                field: "score_breakdown",
                expected: "object",
            })
        }
        None => return Err(ReplyError::MissingField("score_breakdown")),
    };

    Ok(ScoreBreakdown {
        vocabulary: sub_score_field(breakdown, "vocabulary")?,
        grammar: sub_score_field(breakdown, "grammar")?,
        understandability: sub_score_field(breakdown, "understandability")?,
    })
}

fn sub_score_field(
    breakdown: &Map<String, Value>,
    field: &'static str,
) -> Result<SubScore, ReplyError> {
    let category = match breakdown.get(field) {
        Some(Value::Object(c)) => c,
        Some(_) => return Err(ReplyError::WrongType { field, expected: "object" }),
        None => return Err(ReplyError::MissingField(field)),
    };

    Ok(SubScore {
        score: score_value(category.get("score"), field)?,
        reason: string_field(category, "reason")?,
    })
}
