//! # Audio Module
//!
//! Prepares uploaded recordings for transcription.
//!
//! ## Key Components:
//! - **format**: maps the upload's content type to a declared container format
//! - **normalizer**: converts any supported container to 16kHz mono 16-bit WAV
//!   and decodes WAV into model-ready float samples
//!
//! ## Target Format:
//! - **Sample Rate**: 16kHz (16,000 Hz)
//! - **Bit Depth**: 16-bit PCM
//! - **Channels**: Mono (1 channel)

pub mod format;
pub mod normalizer;

pub use format::AudioFormat;
pub use normalizer::{decode_wav_to_samples, FfmpegNormalizer, FormatNormalizer, NormalizeError};
