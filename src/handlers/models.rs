//! # Model Management REST API Handlers
//!
//! Lets the frontend list and switch the speech-to-text and language models
//! at runtime.
//!
//! ## Available Endpoints:
//! - `GET /models` - Selectable Whisper checkpoints and installed Ollama models
//! - `POST /models/change` - Switch either model (or both)
//!
//! ## Verification:
//! The generator's `change_model` accepts any name. The existence check
//! against Ollama's installed models happens here, before the switch.

use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::transcription::SttModel;
use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Request body for `POST /models/change`. Absent or empty fields are left as is.
#[derive(Debug, Deserialize)]
pub struct ModelChangeRequest {
    pub stt_model: Option<String>,
    pub llm_model: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub stt_models: Vec<&'static str>,
    pub llm_models: Vec<String>,
    pub current_stt_model: &'static str,
    pub current_llm_model: String,
}

#[derive(Debug, Serialize)]
pub struct ModelChangeResponse {
    pub status: &'static str,
    pub stt_model: &'static str,
    pub llm_model: String,
}

/// List available models.
///
/// ## Endpoint: `GET /models`
///
/// ## Response:
/// ```json
/// {
///   "stt_models": ["tiny.en", "base.en", "small.en", "medium.en", "large-v2", "large-v3"],
///   "llm_models": ["llama3.2:3b"],
///   "current_stt_model": "base.en",
///   "current_llm_model": "llama3.2:3b"
/// }
/// ```
///
/// If Ollama cannot be reached, `llm_models` is empty rather than the request failing.
pub async fn list_models(state: web::Data<AppState>) -> HttpResponse {
    let llm_models = match state.llm.list_models().await {
        Ok(models) => models,
        Err(e) => {
            warn!(error = %e, "Failed to list LLM models");
            Vec::new()
        }
    };

    HttpResponse::Ok().json(ModelsResponse {
        stt_models: SttModel::names(),
        llm_models,
        current_stt_model: state.transcriber.current_model().name(),
        current_llm_model: state.feedback.model().to_string(),
    })
}

/// Change the active models.
///
/// ## Endpoint: `POST /models/change`
///
/// ## Request Body:
/// ```json
/// { "stt_model": "small.en", "llm_model": "qwen2.5:7b" }
/// ```
///
/// ## Errors:
/// - 400 `Invalid STT model: <name>` for an unknown checkpoint
/// - 400 `Model <name> not found in Ollama. Available: [...]`
/// - 500 `Error verifying LLM model: <err>` when Ollama cannot list models
/// - 500 `Error changing models: <err>` when the new checkpoint fails to load
pub async fn change_models(
    state: web::Data<AppState>,
    request: web::Json<ModelChangeRequest>,
) -> AppResult<HttpResponse> {
    let request = request.into_inner();

    if let Some(name) = request.stt_model.as_deref().filter(|s| !s.is_empty()) {
        let model: SttModel = name
            .parse()
            .map_err(|_| AppError::BadRequest(format!("Invalid STT model: {}", name)))?;

        state
            .transcriber
            .change_model(model)
            .await
            .map_err(|e| AppError::Internal(format!("Error changing models: {}", e)))?;
    }

    if let Some(name) = request.llm_model.as_deref().filter(|s| !s.is_empty()) {
        let available = state
            .llm
            .list_models()
            .await
            .map_err(|e| AppError::Upstream(format!("Error verifying LLM model: {}", e)))?;

        if !available.iter().any(|m| m == name) {
            return Err(AppError::BadRequest(format!(
                "Model {} not found in Ollama. Available: {:?}",
                name, available
            )));
        }

        state.feedback.change_model(name);
    }

    let response = ModelChangeResponse {
        status: "ok",
        stt_model: state.transcriber.current_model().name(),
        llm_model: state.feedback.model().to_string(),
    };
    info!(stt_model = response.stt_model, llm_model = %response.llm_model, "Models active");

    Ok(HttpResponse::Ok().json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::TestStateBuilder;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use serde_json::json;

    macro_rules! models_app {
        ($state:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($state))
                    .route("/models", web::get().to(list_models))
                    .route("/models/change", web::post().to(change_models)),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_list_models() {
        let (state, _) = TestStateBuilder::default().build();
        let app = models_app!(state);

        let req = test::TestRequest::get().uri("/models").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["stt_models"].as_array().unwrap().len(), 6);
        assert_eq!(body["llm_models"], json!(["llama3.2:3b", "qwen2.5:7b"]));
        assert_eq!(body["current_stt_model"], "base.en");
        assert_eq!(body["current_llm_model"], "llama3.2:3b");
    }

    #[actix_web::test]
    async fn test_list_models_survives_upstream_failure() {
        let (state, _) = TestStateBuilder {
            models: Err("connection refused".to_string()),
            ..Default::default()
        }
        .build();
        let app = models_app!(state);

        let req = test::TestRequest::get().uri("/models").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["llm_models"], json!([]));
        assert_eq!(body["stt_models"][0], "tiny.en");
    }

    #[actix_web::test]
    async fn test_change_both_models() {
        let (state, _) = TestStateBuilder::default().build();
        let app = models_app!(state.clone());

        let req = test::TestRequest::post()
            .uri("/models/change")
            .set_json(json!({"stt_model": "small.en", "llm_model": "qwen2.5:7b"}))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, json!({"status": "ok", "stt_model": "small.en", "llm_model": "qwen2.5:7b"}));
        assert_eq!(state.feedback.model().as_ref(), "qwen2.5:7b");
    }

    #[actix_web::test]
    async fn test_invalid_stt_model_is_rejected() {
        let (state, _) = TestStateBuilder::default().build();
        let app = models_app!(state);

        let req = test::TestRequest::post()
            .uri("/models/change")
            .set_json(json!({"stt_model": "huge"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["detail"], "Invalid STT model: huge");
    }

    #[actix_web::test]
    async fn test_unknown_llm_model_is_rejected() {
        let (state, _) = TestStateBuilder::default().build();
        let app = models_app!(state.clone());

        let req = test::TestRequest::post()
            .uri("/models/change")
            .set_json(json!({"llm_model": "mistral:7b"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = test::read_body_json(resp).await;
        let detail = body["detail"].as_str().unwrap();
        assert!(detail.starts_with("Model mistral:7b not found in Ollama. Available: "));
        assert!(detail.contains("llama3.2:3b"));
        assert_eq!(state.feedback.model().as_ref(), "llama3.2:3b");
    }

    #[actix_web::test]
    async fn test_listing_failure_during_change_is_server_error() {
        let (state, _) = TestStateBuilder {
            models: Err("connection refused".to_string()),
            ..Default::default()
        }
        .build();
        let app = models_app!(state);

        let req = test::TestRequest::post()
            .uri("/models/change")
            .set_json(json!({"llm_model": "qwen2.5:7b"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert!(body["detail"].as_str().unwrap().starts_with("Error verifying LLM model: "));
    }
}
