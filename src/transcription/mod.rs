//! # Transcription Module
//!
//! Speech-to-text with Whisper models running on Candle, a pure Rust
//! inference stack with no whisper.cpp bindings.
//!
//! ## Key Components:
//! - **model**: the selectable checkpoints and the loaded model with its decoder loop
//! - **engine**: the [`Transcriber`] service used by the HTTP handlers
//!
//! ## Whisper Checkpoints:
//! - **tiny.en / base.en**: fast, fine for development
//! - **small.en / medium.en**: better accuracy on learner speech
//! - **large-v2 / large-v3**: multilingual, slowest

pub mod engine;
pub mod model;

pub use engine::{Transcriber, Transcript, TranscriptionEngine};
pub use model::SttModel;
