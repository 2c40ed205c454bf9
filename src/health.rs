use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "stt_device": state.transcriber.device_label(),
        "stt_model": state.transcriber.current_model().name(),
        "llm_model": state.feedback.model().as_ref(),
        "scoring_mode": state.feedback.mode(),
        "uptime_seconds": state.get_uptime_seconds(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let uptime_seconds = state.get_uptime_seconds();

    let mut endpoint_stats: Vec<_> = metrics
        .endpoint_metrics
        .iter()
        .map(|(endpoint, metric)| {
            json!({
                "endpoint": endpoint,
                "request_count": metric.request_count,
                "error_count": metric.error_count,
                "error_rate": metric.error_rate(),
                "average_duration_ms": metric.average_duration_ms(),
                "total_duration_ms": metric.total_duration_ms
            })
        })
        .collect();
    endpoint_stats.sort_by(|a, b| a["endpoint"].as_str().cmp(&b["endpoint"].as_str()));

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "overall": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": if metrics.request_count > 0 {
                metrics.error_count as f64 / metrics.request_count as f64
            } else {
                0.0
            },
            "requests_per_second": if uptime_seconds > 0 {
                metrics.request_count as f64 / uptime_seconds as f64
            } else {
                0.0
            }
        },
        "feedback": {
            "in_flight": metrics.active_feedback_requests,
            "total": metrics.feedback_count
        },
        "endpoints": endpoint_stats
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::TestStateBuilder;
    use actix_web::{test, App};

    #[actix_web::test]
    async fn test_health_reports_active_models() {
        let (state, _) = TestStateBuilder::default().build();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/health", web::get().to(health_check)),
        )
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["stt_device"], "cpu");
        assert_eq!(body["stt_model"], "base.en");
        assert_eq!(body["llm_model"], "llama3.2:3b");
        assert_eq!(body["scoring_mode"], "simple");
    }

    #[actix_web::test]
    async fn test_metrics_lists_endpoints() {
        let (state, _) = TestStateBuilder::default().build();
        state.record_endpoint_request("POST /feedback", 40, false);
        let _in_flight = state.begin_feedback_request();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/metrics", web::get().to(detailed_metrics)),
        )
        .await;

        let req = test::TestRequest::get().uri("/metrics").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["feedback"]["in_flight"], 1);
        assert_eq!(body["endpoints"][0]["endpoint"], "POST /feedback");
        assert_eq!(body["endpoints"][0]["average_duration_ms"], 40.0);
    }
}
