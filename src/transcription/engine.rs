//! # Transcription Engine
//!
//! Owns the loaded Whisper model and exposes it through the [`Transcriber`]
//! trait the request handlers depend on.
//!
//! ## Key Responsibilities:
//! - **WAV decoding**: normalized upload bytes to float samples
//! - **Off-runtime inference**: decoding runs on a blocking thread so the
//!   actix workers stay responsive
//! - **Model switching**: the replacement is fully loaded before it is swapped
//!   in, so requests never see a half-initialized model

use crate::audio::decode_wav_to_samples;
use crate::device::device_label;
use crate::transcription::model::{SttModel, WhisperModel};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use candle_core::Device;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

/// Text recognised in one upload.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub text: String,
    pub elapsed_ms: f64,
}

/// Speech-to-text service used by the HTTP layer.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe normalized (16kHz mono 16-bit) WAV bytes.
    async fn transcribe(&self, wav: &[u8]) -> Result<Transcript>;

    /// Load `model` and make it the active one. No-op if already active.
    async fn change_model(&self, model: SttModel) -> Result<()>;

    fn current_model(&self) -> SttModel;

    fn device_label(&self) -> &'static str;
}

/// Candle-backed [`Transcriber`].
///
/// ## Thread Safety:
/// The model sits behind a tokio `Mutex`; inference takes it with
/// `blocking_lock` inside `spawn_blocking`. `switching` serializes model
/// changes so two concurrent requests cannot both download and swap.
pub struct TranscriptionEngine {
    model: Arc<Mutex<WhisperModel>>,
    current: parking_lot::RwLock<SttModel>,
    switching: Mutex<()>,
    device: Device,
    language: String,
}

impl TranscriptionEngine {
    /// Load the initial model and build the engine around it.
    pub async fn load(kind: SttModel, device: Device, language: &str) -> Result<Self> {
        let model = WhisperModel::load(kind, device.clone(), language).await?;

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            current: parking_lot::RwLock::new(kind),
            switching: Mutex::new(()),
            device,
            language: language.to_string(),
        })
    }
}

#[async_trait]
impl Transcriber for TranscriptionEngine {
    async fn transcribe(&self, wav: &[u8]) -> Result<Transcript> {
        let start_time = Instant::now();
        let samples = decode_wav_to_samples(wav)?;

        let model = self.model.clone();
        let text = tokio::task::spawn_blocking(move || {
            let mut model = model.blocking_lock();
            model.transcribe(&samples)
        })
        .await
        .map_err(|e| anyhow!("Transcription task failed: {}", e))??;

        let transcript = Transcript {
            text: text.trim().to_string(),
            elapsed_ms: start_time.elapsed().as_secs_f64() * 1000.0,
        };

        tracing::info!(
            model = %self.current_model(),
            chars = transcript.text.len(),
            elapsed_ms = transcript.elapsed_ms.round() as u64,
            "Transcription complete"
        );
        Ok(transcript)
    }

    async fn change_model(&self, kind: SttModel) -> Result<()> {
        let _switching = self.switching.lock().await;
        if self.current_model() == kind {
            return Ok(());
        }

        tracing::info!(from = %self.current_model(), to = %kind, "Changing STT model");
        let replacement = WhisperModel::load(kind, self.device.clone(), &self.language).await?;

        *self.model.lock().await = replacement;
        *self.current.write() = kind;
        Ok(())
    }

    fn current_model(&self) -> SttModel {
        *self.current.read()
    }

    fn device_label(&self) -> &'static str {
        device_label(&self.device)
    }
}
