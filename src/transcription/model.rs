//! # Whisper Model Management
//!
//! Loads Whisper checkpoints from the HuggingFace hub and runs greedy decoding
//! with Candle.
//!
//! ## Model Loading Process:
//! 1. Download `config.json`, `tokenizer.json` and `model.safetensors`
//!    (cached locally by hf-hub)
//! 2. Build the mel filter bank for the model's `num_mel_bins`
//! 3. Resolve the special tokens from the tokenizer
//! 4. Map the weights onto the selected device
//!
//! ## Decoding:
//! Audio is cut into 30 second windows (3000 mel frames). Each window is
//! encoded once and decoded greedily until end-of-text, the context limit, or
//! a repetition loop.

use anyhow::{anyhow, Context, Result};
use candle_core::{Device, IndexOp, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::whisper::{self as m, Config};
use hf_hub::api::tokio::ApiBuilder;
use std::path::PathBuf;
use std::time::Instant;
use tokenizers::Tokenizer;

/// Whisper checkpoints that can be selected at runtime.
///
/// ## Naming:
/// `.en` variants are English-only and take no language token; the
/// `large-*` variants are multilingual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SttModel {
    TinyEn,
    BaseEn,
    SmallEn,
    MediumEn,
    LargeV2,
    LargeV3,
}

impl SttModel {
    /// Every selectable model, in the order `/models` lists them.
    pub const ALL: [SttModel; 6] = [
        SttModel::TinyEn,
        SttModel::BaseEn,
        SttModel::SmallEn,
        SttModel::MediumEn,
        SttModel::LargeV2,
        SttModel::LargeV3,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SttModel::TinyEn => "tiny.en",
            SttModel::BaseEn => "base.en",
            SttModel::SmallEn => "small.en",
            SttModel::MediumEn => "medium.en",
            SttModel::LargeV2 => "large-v2",
            SttModel::LargeV3 => "large-v3",
        }
    }

    /// HuggingFace repository holding the checkpoint.
    pub fn repo_name(self) -> &'static str {
        match self {
            SttModel::TinyEn => "openai/whisper-tiny.en",
            SttModel::BaseEn => "openai/whisper-base.en",
            SttModel::SmallEn => "openai/whisper-small.en",
            SttModel::MediumEn => "openai/whisper-medium.en",
            SttModel::LargeV2 => "openai/whisper-large-v2",
            SttModel::LargeV3 => "openai/whisper-large-v3",
        }
    }

    pub fn is_multilingual(self) -> bool {
        matches!(self, SttModel::LargeV2 | SttModel::LargeV3)
    }

    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|m| m.name()).collect()
    }
}

impl std::str::FromStr for SttModel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.name() == s)
            .ok_or_else(|| anyhow!("Unknown Whisper model: {}", s))
    }
}

impl std::fmt::Display for SttModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Token ids that frame every decoding pass.
#[derive(Debug, Clone)]
struct SpecialTokens {
    sot: u32,
    transcribe: u32,
    eot: u32,
    no_timestamps: u32,
    language: Option<u32>,
}

impl SpecialTokens {
    fn resolve(tokenizer: &Tokenizer, language: Option<&str>) -> Result<Self> {
        let language = match language {
            Some(lang) => Some(token_id(tokenizer, &format!("<|{}|>", lang))?),
            None => None,
        };

        Ok(Self {
            sot: token_id(tokenizer, m::SOT_TOKEN)?,
            transcribe: token_id(tokenizer, m::TRANSCRIBE_TOKEN)?,
            eot: token_id(tokenizer, m::EOT_TOKEN)?,
            no_timestamps: token_id(tokenizer, m::NO_TIMESTAMPS_TOKEN)?,
            language,
        })
    }

    /// `<|startoftranscript|> [<|lang|>] <|transcribe|> <|notimestamps|>`
    fn prompt(&self) -> Vec<u32> {
        let mut tokens = vec![self.sot];
        tokens.extend(self.language);
        tokens.push(self.transcribe);
        tokens.push(self.no_timestamps);
        tokens
    }
}

fn token_id(tokenizer: &Tokenizer, token: &str) -> Result<u32> {
    tokenizer
        .token_to_id(token)
        .ok_or_else(|| anyhow!("Tokenizer has no id for {}", token))
}

/// A loaded Whisper model ready for transcription.
///
/// ## Thread Safety:
/// Decoding mutates the encoder/decoder caches, so callers hold it behind a
/// mutex and run it on a blocking thread.
pub struct WhisperModel {
    model: m::model::Whisper,
    kind: SttModel,
    device: Device,
    tokenizer: Tokenizer,
    mel_filters: Vec<f32>,
    special: SpecialTokens,

    /// Additive logit mask, `-inf` on the tokens the checkpoint suppresses.
    suppress_tokens: Tensor,
}

impl WhisperModel {
    /// Download (or reuse from cache) and load a checkpoint.
    ///
    /// `language` only applies to multilingual checkpoints.
    pub async fn load(kind: SttModel, device: Device, language: &str) -> Result<Self> {
        tracing::info!(model = %kind, repo = kind.repo_name(), "Loading Whisper model");
        let start_time = Instant::now();

        let mut builder = ApiBuilder::new()
            .with_token(std::env::var("HF_TOKEN").ok())
            .with_progress(false);
        if let Ok(cache_dir) = std::env::var("HF_HUB_CACHE") {
            builder = builder.with_cache_dir(PathBuf::from(cache_dir));
        } else if let Ok(hf_home) = std::env::var("HF_HOME") {
            builder = builder.with_cache_dir(PathBuf::from(hf_home).join("hub"));
        }
        let api = builder.build().context("Failed to create HuggingFace API client")?;
        let repo = api.model(kind.repo_name().to_string());

        let config_filename = repo
            .get("config.json")
            .await
            .with_context(|| format!("Failed to download config.json from {}", kind.repo_name()))?;
        let tokenizer_filename = repo
            .get("tokenizer.json")
            .await
            .with_context(|| format!("Failed to download tokenizer.json from {}", kind.repo_name()))?;
        let weights_filename = repo
            .get("model.safetensors")
            .await
            .with_context(|| format!("Failed to download model weights from {}", kind.repo_name()))?;

        let config: Config = serde_json::from_reader(std::fs::File::open(config_filename)?)
            .context("Invalid Whisper config.json")?;
        let tokenizer = Tokenizer::from_file(tokenizer_filename)
            .map_err(|e| anyhow!("Failed to load tokenizer: {}", e))?;

        let language = kind.is_multilingual().then_some(language);
        let special = SpecialTokens::resolve(&tokenizer, language)?;
        let mel_filters = mel_filter_bank(config.num_mel_bins, m::N_FFT, m::SAMPLE_RATE);

        let suppress: Vec<f32> = (0..config.vocab_size as u32)
            .map(|id| {
                if config.suppress_tokens.contains(&id) {
                    f32::NEG_INFINITY
                } else {
                    0.0
                }
            })
            .collect();
        let suppress_tokens = Tensor::new(suppress.as_slice(), &device)?;

        // SAFETY: the safetensors file is owned by the hf-hub cache and not
        // modified while mapped.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights_filename], m::DTYPE, &device)? };
        let model = m::model::Whisper::load(&vb, config)?;

        tracing::info!(
            model = %kind,
            elapsed_secs = format!("{:.2}", start_time.elapsed().as_secs_f64()),
            "Whisper model loaded"
        );

        Ok(Self {
            model,
            kind,
            device,
            tokenizer,
            mel_filters,
            special,
            suppress_tokens,
        })
    }

    /// Transcribe 16kHz mono samples in `[-1.0, 1.0]`.
    pub fn transcribe(&mut self, samples: &[f32]) -> Result<String> {
        if samples.is_empty() {
            return Ok(String::new());
        }

        let start_time = Instant::now();
        let n_mels = self.model.config.num_mel_bins;
        let mel = m::audio::pcm_to_mel(&self.model.config, samples, &self.mel_filters);
        let mel_len = mel.len();
        let mel = Tensor::from_vec(mel, (1, n_mels, mel_len / n_mels), &self.device)?;
        let (_, _, content_frames) = mel.dims3()?;

        let mut segments = Vec::new();
        let mut seek = 0;
        while seek < content_frames {
            let segment_size = usize::min(content_frames - seek, m::N_FRAMES);
            let mel_segment = mel.narrow(2, seek, segment_size)?;
            let text = self.decode_segment(&mel_segment)?;
            if !text.is_empty() {
                segments.push(text);
            }
            seek += segment_size;
        }

        let text = segments.join(" ");
        tracing::debug!(
            model = %self.kind,
            audio_secs = format!("{:.2}", samples.len() as f64 / m::SAMPLE_RATE as f64),
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Transcribed audio"
        );
        Ok(text)
    }

    fn decode_segment(&mut self, mel_segment: &Tensor) -> Result<String> {
        let audio_features = self.model.encoder.forward(mel_segment, true)?;

        let max_tokens = self.model.config.max_target_positions;
        let mut tokens = self.special.prompt();
        let prompt_len = tokens.len();

        for i in 0..max_tokens / 2 {
            let tokens_t = Tensor::new(tokens.as_slice(), &self.device)?.unsqueeze(0)?;
            let ys = self.model.decoder.forward(&tokens_t, &audio_features, i == 0)?;

            let (_, seq_len, _) = ys.dims3()?;
            let logits = self
                .model
                .decoder
                .final_linear(&ys.i((..1, seq_len - 1..))?)?
                .i(0)?
                .i(0)?
                .broadcast_add(&self.suppress_tokens)?;
            let next_token = logits.argmax(0)?.to_scalar::<u32>()?;

            if next_token == self.special.eot || tokens.len() >= max_tokens {
                break;
            }
            if is_repetitive(&tokens[prompt_len..], next_token) {
                tracing::debug!("Repetition detected, cutting segment short");
                break;
            }
            tokens.push(next_token);
        }

        let text = self
            .tokenizer
            .decode(&tokens[prompt_len..], true)
            .map_err(|e| anyhow!("Tokenizer decode error: {}", e))?;
        Ok(text.trim().to_string())
    }
}

/// True when appending `next` would repeat a token three times in a row or
/// repeat the previous three-token run.
fn is_repetitive(tokens: &[u32], next: u32) -> bool {
    let n = tokens.len();
    if n >= 2 && tokens[n - 2..] == [next, next] {
        return true;
    }
    if n >= 5 {
        let candidate = [tokens[n - 2], tokens[n - 1], next];
        if tokens[n - 5..n - 2] == candidate {
            return true;
        }
    }
    false
}

fn hz_to_mel(hz: f64) -> f64 {
    const F_SP: f64 = 200.0 / 3.0;
    const MIN_LOG_HZ: f64 = 1000.0;
    let min_log_mel = MIN_LOG_HZ / F_SP;
    let log_step = 6.4f64.ln() / 27.0;

    if hz >= MIN_LOG_HZ {
        min_log_mel + (hz / MIN_LOG_HZ).ln() / log_step
    } else {
        hz / F_SP
    }
}

fn mel_to_hz(mel: f64) -> f64 {
    const F_SP: f64 = 200.0 / 3.0;
    const MIN_LOG_HZ: f64 = 1000.0;
    let min_log_mel = MIN_LOG_HZ / F_SP;
    let log_step = 6.4f64.ln() / 27.0;

    if mel >= min_log_mel {
        MIN_LOG_HZ * (log_step * (mel - min_log_mel)).exp()
    } else {
        mel * F_SP
    }
}

/// Slaney-normalized mel filter bank, `n_mels` rows of `n_fft / 2 + 1` bins.
///
/// Matches the filters Whisper was trained with, so the bank is computed
/// rather than shipped as a binary asset.
fn mel_filter_bank(n_mels: usize, n_fft: usize, sample_rate: usize) -> Vec<f32> {
    let n_freqs = n_fft / 2 + 1;
    let fft_freqs: Vec<f64> = (0..n_freqs)
        .map(|k| k as f64 * sample_rate as f64 / n_fft as f64)
        .collect();

    let mel_max = hz_to_mel(sample_rate as f64 / 2.0);
    let hz_points: Vec<f64> = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_max * i as f64 / (n_mels + 1) as f64))
        .collect();

    let mut filters = vec![0.0f32; n_mels * n_freqs];
    for mel in 0..n_mels {
        let (left, center, right) = (hz_points[mel], hz_points[mel + 1], hz_points[mel + 2]);
        let norm = 2.0 / (right - left);
        for (k, &freq) in fft_freqs.iter().enumerate() {
            let lower = (freq - left) / (center - left);
            let upper = (right - freq) / (right - center);
            let weight = lower.min(upper).max(0.0);
            filters[mel * n_freqs + k] = (weight * norm) as f32;
        }
    }
    filters
}
