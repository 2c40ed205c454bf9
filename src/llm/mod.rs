//! # Language Model Client
//!
//! Narrow request/reply interface to the language-model service used by the
//! feedback generator and the model-management endpoints.
//!
//! ## Components:
//! - **client**: the `LlmClient` trait, request types and `LlmError`
//! - **ollama**: HTTP implementation against an Ollama server

pub mod client;
pub mod ollama;

pub use client::{GenerateRequest, LlmClient, LlmError, SamplingOptions};
pub use ollama::OllamaClient;
