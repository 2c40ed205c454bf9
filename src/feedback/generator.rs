//! # Feedback Generator
//!
//! Queries the language model with a transcript and always comes back with a
//! usable [`FeedbackRecord`]. Every failure mode resolves to one of the
//! fallback templates; nothing is returned as an error.
//!
//! ## Branches:
//! - **Empty input**: zero-score record, the model is never contacted
//! - **Normal**: prompt → model → parse/reconcile/validate
//! - **Parse failure**: score-50 record, transcript echoed uncorrected
//! - **Upstream failure**: same shape, carrying the client error text

use crate::feedback::parse::parse_reply;
use crate::feedback::prompt::{build_prompt, ScoringMode};
use crate::feedback::FeedbackRecord;
use crate::llm::{GenerateRequest, LlmClient, SamplingOptions};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Sampling temperature for every feedback request. Low for repeatable output.
pub const FEEDBACK_TEMPERATURE: f32 = 0.3;

pub struct FeedbackGenerator {
    client: Arc<dyn LlmClient>,

    /// Active model identifier. Swapped whole, so a reader always sees one
    /// complete, previously-set name.
    model: RwLock<Arc<str>>,

    mode: ScoringMode,
}

impl FeedbackGenerator {
    pub fn new(client: Arc<dyn LlmClient>, model: &str, mode: ScoringMode) -> Self {
        Self {
            client,
            model: RwLock::new(Arc::from(model)),
            mode,
        }
    }

    /// Currently configured model identifier.
    pub fn model(&self) -> Arc<str> {
        self.model.read().clone()
    }

    pub fn mode(&self) -> ScoringMode {
        self.mode
    }

    /// Switch to another model identifier.
    ///
    /// No-op when the name is unchanged. Does not check that the model exists
    /// upstream; callers that care must verify before calling.
    pub fn change_model(&self, new_model: &str) {
        let mut current = self.model.write();
        if current.as_ref() == new_model {
            return;
        }

        info!(from = %current, to = %new_model, "Changing LLM model");
        *current = Arc::from(new_model);
    }

    /// Produce feedback for `raw_transcript` and the time spent on the model
    /// call in milliseconds (0 for empty input).
    pub async fn generate_feedback(&self, raw_transcript: &str) -> (FeedbackRecord, f64) {
        let with_breakdown = self.mode.has_breakdown();

        if raw_transcript.trim().is_empty() {
            debug!("Empty transcript, skipping LLM call");
            return (FeedbackRecord::no_speech(raw_transcript, with_breakdown), 0.0);
        }

        // Read once so the whole request uses one identifier.
        let model = self.model();
        let request = GenerateRequest {
            model: model.to_string(),
            prompt: build_prompt(raw_transcript, self.mode),
            options: SamplingOptions {
                temperature: FEEDBACK_TEMPERATURE,
            },
        };

        let start_time = Instant::now();

        let record = match self.client.generate(request).await {
            Ok(reply) => match parse_reply(&reply, raw_transcript, self.mode) {
                Ok(record) => record,
                Err(e) => {
                    warn!(model = %model, error = %e, "LLM reply rejected, using fallback");
                    debug!(reply = %reply, "Rejected LLM reply");
                    FeedbackRecord::parse_failure(raw_transcript, with_breakdown)
                }
            },
            Err(e) => {
                warn!(model = %model, error = %e, "LLM call failed, using fallback");
                FeedbackRecord::upstream_failure(raw_transcript, &e.to_string(), with_breakdown)
            }
        };

        let elapsed_ms = start_time.elapsed().as_secs_f64() * 1000.0;

        info!(
            model = %model,
            mode = %self.mode,
            score = record.score,
            elapsed_ms = elapsed_ms.round() as u64,
            "Feedback generated"
        );

        (record, elapsed_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays a fixed reply (or error) and records every request it sees.
    struct ScriptedClient {
        reply: Result<String, String>,
        calls: AtomicUsize,
        seen: Mutex<Vec<GenerateRequest>>,
    }

    impl ScriptedClient {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(message.to_string()),
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        async fn generate(&self, request: GenerateRequest) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().push(request);
            self.reply.clone().map_err(LlmError::Request)
        }

        async fn list_models(&self) -> Result<Vec<String>, LlmError> {
            Ok(vec!["llama3.2:3b".to_string()])
        }
    }

    const SAMPLE_REPLY: &str = r#"{"corrected":"I went to school yesterday.","issues":["Past tense error"],"better_options":["I attended school yesterday."],"drill":"I went to the store yesterday.","score":75}"#;

    fn generator(client: Arc<ScriptedClient>, mode: ScoringMode) -> FeedbackGenerator {
        FeedbackGenerator::new(client, "llama3.2:3b", mode)
    }

    #[tokio::test]
    async fn test_empty_input_skips_model() {
        let client = ScriptedClient::replying(SAMPLE_REPLY);
        let generator = generator(client.clone(), ScoringMode::WithBreakdown);

        for transcript in ["", "   ", "\n\t "] {
            let (record, elapsed) = generator.generate_feedback(transcript).await;
            assert_eq!(record.score, 0);
            assert_eq!(record.issues, vec!["No speech detected".to_string()]);
            assert_eq!(record.raw_transcript, transcript);
            assert_eq!(elapsed, 0.0);
            assert_eq!(record.score_breakdown.unwrap().vocabulary.score, 0);
        }
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_sample_reply_simple_mode() {
        let client = ScriptedClient::replying(SAMPLE_REPLY);
        let generator = generator(client.clone(), ScoringMode::Simple);

        let (record, _) = generator.generate_feedback("I go to school yesterday").await;
        assert_eq!(record.raw_transcript, "I go to school yesterday");
        assert_eq!(record.corrected, "I went to school yesterday.");
        assert_eq!(record.issues, vec!["Past tense error".to_string()]);
        assert_eq!(record.better_options, vec!["I attended school yesterday.".to_string()]);
        assert_eq!(record.drill, "I went to the store yesterday.");
        assert_eq!(record.score, 75);
        assert!(record.score_breakdown.is_none());
        assert!(record.timings_ms.is_none());
    }

    #[tokio::test]
    async fn test_request_carries_model_prompt_and_temperature() {
        let client = ScriptedClient::replying(SAMPLE_REPLY);
        let generator = generator(client.clone(), ScoringMode::Simple);

        generator.generate_feedback("I go to school yesterday").await;

        let seen = client.seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].model, "llama3.2:3b");
        assert!(seen[0].prompt.contains("\"I go to school yesterday\""));
        assert_eq!(seen[0].options.temperature, 0.3);
    }

    #[tokio::test]
    async fn test_fenced_reply_matches_plain_reply() {
        let plain = generator(ScriptedClient::replying(SAMPLE_REPLY), ScoringMode::WithBreakdown);
        let fenced = generator(
            ScriptedClient::replying(&format!("```json\n{}\n```", SAMPLE_REPLY)),
            ScoringMode::WithBreakdown,
        );

        let (a, _) = plain.generate_feedback("I go to school yesterday").await;
        let (b, _) = fenced.generate_feedback("I go to school yesterday").await;
        assert_eq!(a, b);
        assert_eq!(b.score_breakdown.unwrap().grammar.score, 75);
    }

    #[tokio::test]
    async fn test_every_fence_variant_matches_plain_reply() {
        let pretty = serde_json::to_string_pretty(
            &serde_json::from_str::<serde_json::Value>(SAMPLE_REPLY).unwrap(),
        )
        .unwrap();
        let plain = generator(ScriptedClient::replying(&pretty), ScoringMode::WithBreakdown);
        let (expected, _) = plain.generate_feedback("I go to school yesterday").await;
        assert_eq!(expected.score, 75);

        for open in ["```json\n", "```JSON ", "```json", "```\n", "```"] {
            let reply = format!("{}{}\n```", open, pretty);
            let fenced = generator(ScriptedClient::replying(&reply), ScoringMode::WithBreakdown);
            let (record, _) = fenced.generate_feedback("I go to school yesterday").await;
            assert_eq!(record, expected, "fence {:?}", open);
        }
    }

    #[tokio::test]
    async fn test_malformed_reply_uses_parse_fallback() {
        let client = ScriptedClient::replying("Sure! Here is your feedback: great job");
        let generator = generator(client, ScoringMode::WithBreakdown);

        let (record, _) = generator.generate_feedback("me like apple").await;
        assert_eq!(record.score, 50);
        assert_eq!(record.corrected, "me like apple");
        assert_eq!(record.issues, vec!["LLM response parsing failed".to_string()]);
        assert_eq!(record.drill, "Please try again.");
        let breakdown = record.score_breakdown.unwrap();
        assert_eq!(breakdown.understandability.score, 50);
        assert_eq!(breakdown.understandability.reason, "LLM response parsing failed");
    }

    #[tokio::test]
    async fn test_oversized_lists_use_parse_fallback() {
        let reply = r#"{"corrected":"c","issues":["a","b","c","d"],"better_options":["x"],"drill":"d","score":70}"#;
        let generator = generator(ScriptedClient::replying(reply), ScoringMode::Simple);

        let (record, _) = generator.generate_feedback("some words").await;
        assert_eq!(record.issues, vec!["LLM response parsing failed".to_string()]);
        assert!(record.issues.len() <= 3 && record.better_options.len() <= 2);
    }

    #[tokio::test]
    async fn test_upstream_failure_carries_message() {
        let client = ScriptedClient::failing("connection refused");
        let generator = generator(client, ScoringMode::Simple);

        let (record, elapsed) = generator.generate_feedback("hello world").await;
        assert_eq!(record.score, 50);
        assert_eq!(record.corrected, "hello world");
        assert_eq!(record.issues.len(), 1);
        assert!(record.issues[0].starts_with("LLM error: "));
        assert!(record.issues[0].contains("connection refused"));
        assert!(elapsed >= 0.0);
    }

    #[tokio::test]
    async fn test_change_model_swaps_identifier() {
        let client = ScriptedClient::replying(SAMPLE_REPLY);
        let generator = generator(client.clone(), ScoringMode::Simple);

        generator.change_model("llama3.2:3b");
        assert_eq!(generator.model().as_ref(), "llama3.2:3b");

        // Unknown names are accepted as-is.
        generator.change_model("does-not-exist:1b");
        assert_eq!(generator.model().as_ref(), "does-not-exist:1b");

        generator.generate_feedback("hi there").await;
        assert_eq!(client.seen.lock()[0].model, "does-not-exist:1b");
    }

    #[tokio::test]
    async fn test_concurrent_reads_see_whole_identifiers() {
        let generator = Arc::new(generator(ScriptedClient::replying(SAMPLE_REPLY), ScoringMode::Simple));
        let names = ["model-a:1b", "model-bbbbbbbbbbbbbbbb:70b"];

        let writer = {
            let generator = generator.clone();
            tokio::spawn(async move {
                for i in 0..500 {
                    generator.change_model(names[i % 2]);
                    tokio::task::yield_now().await;
                }
            })
        };

        for _ in 0..500 {
            let current = generator.model();
            assert!(current.as_ref() == "llama3.2:3b" || names.contains(&current.as_ref()));
            tokio::task::yield_now().await;
        }
        writer.await.unwrap();
    }
}
