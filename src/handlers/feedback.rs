//! # Feedback Handler
//!
//! `POST /feedback` runs the whole pipeline for one recording:
//! upload → format normalization → transcription → feedback generation.
//!
//! ## Request:
//! Multipart form data with the recording in a field named `audio`. The
//! field's content type selects the declared input format.
//!
//! ## Response:
//! A feedback record with `timings_ms` filled in:
//! ```json
//! {
//!   "raw_transcript": "I go to school yesterday",
//!   "corrected": "I went to school yesterday.",
//!   "issues": ["Past tense error"],
//!   "better_options": ["I attended school yesterday."],
//!   "drill": "I went to the store yesterday.",
//!   "score": 75,
//!   "timings_ms": { "stt": 412, "llm": 1830, "total": 2297 }
//! }
//! ```
//!
//! Language-model failures never surface as HTTP errors; they come back as a
//! score-50 record. Only upload, normalization and transcription failures do.

use crate::audio::AudioFormat;
use crate::error::{AppError, AppResult};
use crate::feedback::TimingsMs;
use crate::state::AppState;
use actix_multipart::{Field, Multipart};
use actix_web::{web, HttpResponse};
use futures_util::stream::StreamExt;
use std::time::Instant;
use tracing::{debug, info};

const AUDIO_FIELD: &str = "audio";

struct AudioUpload {
    data: Vec<u8>,
    content_type: Option<String>,
}

pub async fn create_feedback(
    state: web::Data<AppState>,
    mut payload: Multipart,
) -> AppResult<HttpResponse> {
    let total_start = Instant::now();
    let _in_flight = state.begin_feedback_request();

    let upload = read_audio_upload(&mut payload, state.config.audio.max_upload_bytes).await?;
    if upload.data.is_empty() {
        return Err(AppError::BadRequest("Empty audio file".to_string()));
    }

    let format = AudioFormat::from_content_type(upload.content_type.as_deref());
    debug!(bytes = upload.data.len(), content_type = ?upload.content_type, %format, "Audio received");

    let wav = state.normalizer.normalize(&upload.data, format).await?;

    let transcript = state
        .transcriber
        .transcribe(&wav)
        .await
        .map_err(|e| AppError::AudioProcessing(format!("Error processing audio: {}", e)))?;

    let (mut record, llm_ms) = state.feedback.generate_feedback(&transcript.text).await;

    let timings = TimingsMs {
        stt: Some(round_ms(transcript.elapsed_ms)),
        llm: Some(round_ms(llm_ms)),
        total: Some(round_ms(total_start.elapsed().as_secs_f64() * 1000.0)),
    };
    record.timings_ms = Some(timings);

    info!(
        score = record.score,
        stt_ms = timings.stt,
        llm_ms = timings.llm,
        total_ms = timings.total,
        "Feedback request complete"
    );

    Ok(HttpResponse::Ok().json(record))
}

/// Collect the `audio` field, enforcing the upload limit while streaming.
async fn read_audio_upload(payload: &mut Multipart, max_bytes: usize) -> AppResult<AudioUpload> {
    while let Some(item) = payload.next().await {
        let mut field: Field =
            item.map_err(|e| AppError::BadRequest(format!("Multipart error: {}", e)))?;

        let is_audio = field
            .content_disposition()
            .and_then(|cd| cd.get_name())
            .is_some_and(|name| name == AUDIO_FIELD);
        if !is_audio {
            continue;
        }

        let content_type = field.content_type().map(|mime| mime.to_string());
        let mut data = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| AppError::BadRequest(format!("Chunk error: {}", e)))?;
            if data.len() + chunk.len() > max_bytes {
                return Err(AppError::ValidationError(format!(
                    "File too large (max: {} bytes)",
                    max_bytes
                )));
            }
            data.extend_from_slice(&chunk);
        }

        return Ok(AudioUpload { data, content_type });
    }

    Err(AppError::BadRequest("No audio file provided".to_string()))
}

fn round_ms(ms: f64) -> u64 {
    ms.max(0.0).round() as u64
}
