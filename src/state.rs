//! # Application State Management
//!
//! Shared state handed to every HTTP request handler through `web::Data`.
//!
//! ## Key Rust Concepts:
//!
//! ### Arc (Atomically Reference Counted)
//! - **Purpose**: lets every actix worker hold the same services
//! - **Trait objects**: `Arc<dyn Transcriber>` and friends let tests swap in
//!   mock services without touching the handlers
//!
//! ### RwLock (Reader-Writer Lock)
//! - Metrics are written on every request and read by `/metrics`
//! - `parking_lot::RwLock` never poisons, so no `.unwrap()` on lock access
//!
//! ## What is NOT here:
//! The active model identifiers live inside the services that use them
//! (`FeedbackGenerator`, `Transcriber`), not in this struct.

use crate::audio::FormatNormalizer;
use crate::config::AppConfig;
use crate::feedback::FeedbackGenerator;
use crate::llm::LlmClient;
use crate::transcription::Transcriber;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Shared state cloned into every actix worker.
#[derive(Clone)]
pub struct AppState {
    /// Startup configuration (read-only after load)
    pub config: Arc<AppConfig>,

    pub metrics: Arc<RwLock<AppMetrics>>,

    pub start_time: Instant,

    pub feedback: Arc<FeedbackGenerator>,
    pub transcriber: Arc<dyn Transcriber>,
    pub normalizer: Arc<dyn FormatNormalizer>,

    /// Same client the generator uses; handlers need it to list models.
    pub llm: Arc<dyn LlmClient>,
}

/// Counters collected across all HTTP requests.
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    pub request_count: u64,
    pub error_count: u64,

    /// Feedback requests currently between upload and response
    pub active_feedback_requests: u32,

    pub feedback_count: u64,

    /// Key: endpoint name (e.g., "POST /feedback")
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        feedback: Arc<FeedbackGenerator>,
        transcriber: Arc<dyn Transcriber>,
        normalizer: Arc<dyn FormatNormalizer>,
        llm: Arc<dyn LlmClient>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
            feedback,
            transcriber,
            normalizer,
            llm,
        }
    }

    pub fn increment_request_count(&self) {
        self.metrics.write().request_count += 1;
    }

    pub fn increment_error_count(&self) {
        self.metrics.write().error_count += 1;
    }

    /// Record one finished request against its endpoint.
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics.write();
        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();

        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;
        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Mark a feedback request as in flight until the returned guard drops.
    ///
    /// The guard also decrements on early returns and panics, so the gauge
    /// cannot drift.
    pub fn begin_feedback_request(&self) -> InFlightGuard {
        {
            let mut metrics = self.metrics.write();
            metrics.active_feedback_requests += 1;
            metrics.feedback_count += 1;
        }
        InFlightGuard {
            metrics: self.metrics.clone(),
        }
    }

    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.metrics.read().clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

/// Decrements the in-flight feedback gauge on drop.
pub struct InFlightGuard {
    metrics: Arc<RwLock<AppMetrics>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut metrics = self.metrics.write();
        metrics.active_feedback_requests = metrics.active_feedback_requests.saturating_sub(1);
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Fraction of requests that failed, 0.0 to 1.0.
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}
