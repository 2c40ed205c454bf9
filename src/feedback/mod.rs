//! # Feedback Module
//!
//! Turns a raw transcript into a structured critique:
//! - **prompt**: prompt templates for the two scoring modes
//! - **parse**: fence stripping, JSON decoding, score reconciliation
//! - **record**: the record type and its fallback templates
//! - **generator**: the model call with graceful degradation

pub mod generator;
pub mod parse;
pub mod prompt;
pub mod record;

pub use generator::FeedbackGenerator;
pub use prompt::ScoringMode;
pub use record::{FeedbackRecord, TimingsMs};
