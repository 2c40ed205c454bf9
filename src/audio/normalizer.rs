//! # Format Normalization
//!
//! Converts whatever the browser uploaded into 16kHz mono 16-bit WAV, the only
//! input the transcription engine accepts.
//!
//! ## Strategy:
//! 1. **Pass-through**: WAV already in the target format is returned untouched
//! 2. **Declared format**: `ffmpeg -f <demuxer>` reading from stdin
//! 3. **Auto-detect**: same command without `-f`, for mislabelled uploads
//!
//! ffmpeg emits raw little-endian PCM which is then wrapped in a WAV header
//! here, since a WAV written to a pipe cannot carry valid chunk sizes.

use crate::audio::format::AudioFormat;
use async_trait::async_trait;
use std::io::Cursor;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

pub const TARGET_SAMPLE_RATE: u32 = 16_000;
pub const TARGET_CHANNELS: u16 = 1;
pub const TARGET_BITS_PER_SAMPLE: u16 = 16;

const WAV_FORMAT_PCM: u16 = 1;
const WAV_FORMAT_IEEE_FLOAT: u16 = 3;

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("audio payload is empty")]
    EmptyInput,

    #[error("failed to run ffmpeg: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("ffmpeg could not decode the audio: {0}")]
    Ffmpeg(String),

    #[error("invalid WAV data: {0}")]
    InvalidWav(String),
}

/// Converts uploaded audio into normalized WAV bytes.
#[async_trait]
pub trait FormatNormalizer: Send + Sync {
    async fn normalize(&self, data: &[u8], declared: AudioFormat) -> Result<Vec<u8>, NormalizeError>;
}

/// Normalizer backed by an `ffmpeg` subprocess.
#[derive(Debug, Clone)]
pub struct FfmpegNormalizer {
    ffmpeg_path: String,
}

impl FfmpegNormalizer {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    /// Run ffmpeg once, optionally forcing the input demuxer, and return raw PCM.
    async fn run_ffmpeg(&self, data: &[u8], demuxer: Option<&str>) -> Result<Vec<u8>, NormalizeError> {
        let mut command = Command::new(&self.ffmpeg_path);
        command.args(["-hide_banner", "-loglevel", "error"]);
        if let Some(demuxer) = demuxer {
            command.args(["-f", demuxer]);
        }
        let sample_rate = TARGET_SAMPLE_RATE.to_string();
        command
            .args(["-i", "pipe:0", "-ar", &sample_rate, "-ac", "1", "-f", "s16le", "pipe:1"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn()?;

        // Feed stdin concurrently so a full stdout pipe cannot stall the write.
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| NormalizeError::Ffmpeg("stdin not captured".to_string()))?;
        let input = data.to_vec();
        let writer = tokio::spawn(async move {
            // ffmpeg may close stdin early once it has read enough; that is not fatal.
            let _ = stdin.write_all(&input).await;
            let _ = stdin.shutdown().await;
        });

        let output = child.wait_with_output().await?;
        let _ = writer.await;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(NormalizeError::Ffmpeg(stderr.trim().to_string()));
        }
        if output.stdout.is_empty() {
            return Err(NormalizeError::Ffmpeg("no audio stream decoded".to_string()));
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl FormatNormalizer for FfmpegNormalizer {
    async fn normalize(&self, data: &[u8], declared: AudioFormat) -> Result<Vec<u8>, NormalizeError> {
        if data.is_empty() {
            return Err(NormalizeError::EmptyInput);
        }

        if declared == AudioFormat::Wav && is_normalized_wav(data) {
            debug!(bytes = data.len(), "WAV already normalized, skipping ffmpeg");
            return Ok(data.to_vec());
        }

        let pcm = match self.run_ffmpeg(data, Some(declared.ffmpeg_demuxer())).await {
            Ok(pcm) => pcm,
            Err(NormalizeError::Ffmpeg(reason)) => {
                warn!(format = %declared, error = %reason, "Declared format failed, retrying with auto-detect");
                self.run_ffmpeg(data, None).await?
            }
            Err(e) => return Err(e),
        };

        debug!(format = %declared, pcm_bytes = pcm.len(), "Audio normalized");
        pcm_to_wav(&pcm)
    }
}

fn is_normalized_wav(data: &[u8]) -> bool {
    match wav::read(&mut Cursor::new(data)) {
        Ok((header, _)) => {
            header.audio_format == WAV_FORMAT_PCM
                && header.sampling_rate == TARGET_SAMPLE_RATE
                && header.channel_count == TARGET_CHANNELS
                && header.bits_per_sample == TARGET_BITS_PER_SAMPLE
        }
        Err(_) => false,
    }
}

/// Wrap raw 16-bit little-endian mono PCM at the target rate in a WAV container.
pub fn pcm_to_wav(pcm: &[u8]) -> Result<Vec<u8>, NormalizeError> {
    let samples: Vec<i16> = pcm
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    let header = wav::Header::new(
        WAV_FORMAT_PCM,
        TARGET_CHANNELS,
        TARGET_SAMPLE_RATE,
        TARGET_BITS_PER_SAMPLE,
    );
    let mut out = Cursor::new(Vec::with_capacity(pcm.len() + 44));
    wav::write(header, &wav::BitDepth::Sixteen(samples), &mut out)
        .map_err(|e| NormalizeError::InvalidWav(e.to_string()))?;

    Ok(out.into_inner())
}

/// Decode WAV bytes into mono `f32` samples in `[-1.0, 1.0]`.
///
/// Multi-channel input is downmixed by averaging. The sample rate is not
/// checked here; callers feed this normalized audio.
pub fn decode_wav_to_samples(data: &[u8]) -> Result<Vec<f32>, NormalizeError> {
    let (header, track) =
        wav::read(&mut Cursor::new(data)).map_err(|e| NormalizeError::InvalidWav(e.to_string()))?;

    let interleaved: Vec<f32> = match track {
        wav::BitDepth::Eight(samples) => samples.iter().map(|&s| (s as f32 - 128.0) / 128.0).collect(),
        wav::BitDepth::Sixteen(samples) => samples.iter().map(|&s| s as f32 / 32768.0).collect(),
        wav::BitDepth::TwentyFour(samples) => samples.iter().map(|&s| s as f32 / 8_388_608.0).collect(),
        wav::BitDepth::ThirtyTwoFloat(samples) if header.audio_format == WAV_FORMAT_IEEE_FLOAT => samples,
        wav::BitDepth::ThirtyTwoFloat(_) => {
            return Err(NormalizeError::InvalidWav("unsupported 32-bit sample format".to_string()))
        }
        wav::BitDepth::Empty => return Err(NormalizeError::InvalidWav("no samples".to_string())),
    };

    let channels = header.channel_count.max(1) as usize;
    if channels == 1 {
        return Ok(interleaved);
    }

    Ok(interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect())
}
