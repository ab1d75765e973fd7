//! Job control surface.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive},
        Json, Sse,
    },
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};
use tracing::{debug, warn};

use sowpilot::cache::CacheEntry;
use sowpilot::{AnalysisJob, HotelMatchResult, LogEntry, LogSink, ResultStore};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/runs", post(start_run))
        .route("/jobs/{id}", get(get_job))
        .route("/jobs/{id}/logs", get(get_logs))
        .route("/jobs/{id}/logs/stream", get(stream_logs))
        .route("/decision-cache/lookup", post(cache_lookup))
        .route("/decision-cache/save", post(cache_save))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunRequest {
    #[serde(alias = "opportunity_ref")]
    opportunity_ref: String,
    #[serde(alias = "analysis_type")]
    analysis_type: String,
    #[serde(default)]
    options: Value,
}

async fn start_run(
    State(state): State<AppState>,
    Json(request): Json<RunRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let handle = state.orchestrator.run(
        &request.opportunity_ref,
        &request.analysis_type,
        request.options,
    )?;
    debug!(job_id = %handle.job_id, "Run accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "jobId": handle.job_id, "status": handle.status })),
    ))
}

async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<AnalysisJob>> {
    state
        .orchestrator
        .store()
        .get(&id)?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("Job '{}' not found", id)))
}

#[derive(Debug, Deserialize)]
struct LogsQuery {
    limit: Option<u64>,
}

async fn get_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> AppResult<Json<Vec<LogEntry>>> {
    if state.orchestrator.store().get(&id)?.is_none() {
        return Err(AppError::not_found(format!("Job '{}' not found", id)));
    }
    Ok(Json(state.orchestrator.logs().tail(&id, query.limit)?))
}

/// Server-sent events for entries appended after the client connected.
async fn stream_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.log_feed.subscribe();
    let stream = BroadcastStream::new(receiver).filter_map(move |item| match item {
        Ok(entry) if entry.job_id == id => Event::default()
            .event("log")
            .json_data(&entry)
            .ok()
            .map(Ok),
        Ok(_) => None,
        Err(err) => {
            warn!("log feed lagged: {err}");
            None
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

#[derive(Debug, Deserialize)]
struct LookupRequest {
    context: Value,
}

async fn cache_lookup(
    State(state): State<AppState>,
    Json(request): Json<LookupRequest>,
) -> AppResult<Json<CacheEntry>> {
    state
        .orchestrator
        .cache()
        .lookup(&request.context)
        .map(Json)
        .ok_or_else(|| AppError::not_found("No decision cache entry for this context"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveRequest {
    context: Value,
    #[serde(alias = "recommended_hotels")]
    recommended_hotels: Vec<HotelMatchResult>,
    #[serde(default, alias = "pattern_description")]
    pattern_description: Option<String>,
    #[serde(default, alias = "extra_metadata")]
    extra_metadata: Value,
}

async fn cache_save(
    State(state): State<AppState>,
    Json(request): Json<SaveRequest>,
) -> AppResult<Json<CacheEntry>> {
    if !request.context.is_object() {
        return Err(AppError::bad_request("context must be a JSON object"));
    }
    state
        .orchestrator
        .cache()
        .try_save(
            &request.context,
            &request.recommended_hotels,
            request.pattern_description.as_deref(),
            request.extra_metadata,
        )
        .map(Json)
        .map_err(|e| AppError::unavailable(format!("Decision cache unavailable: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use sowpilot::db::Database;
    use sowpilot::testing::{self, StubDocuments};
    use sowpilot::{Hotel, LogBroadcaster};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app() -> Router {
        let db = Database::open_in_memory().unwrap();
        let hotels = vec![Hotel {
            room_count: Some(120),
            rating: Some(4.2),
            ..Hotel::new("Hyatt Regency", "Denver", Some("CO"))
        }];
        let collaborators = testing::collaborators(
            StubDocuments::text("Training event in Denver, CO for 40 attendees."),
            json!({"location": "Denver, CO", "headcount": 40}),
            hotels,
        );
        let orchestrator = Arc::new(testing::orchestrator(&db, collaborators));
        router(AppState::new(orchestrator, LogBroadcaster::default()))
    }

    fn post(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app().oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_analysis_type_is_bad_request() {
        let response = app()
            .oneshot(post(
                "/runs",
                json!({"opportunityRef": "opp-1", "analysisType": "pricing"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["status"], 400);
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("unknown analysis type"));
    }

    #[tokio::test]
    async fn test_run_then_poll_until_terminal() {
        let app = app();
        let response = app
            .clone()
            .oneshot(post(
                "/runs",
                json!({"opportunityRef": "opp-1", "analysisType": "hotel_match"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let accepted = body_json(response).await;
        assert_eq!(accepted["status"], "running");
        let job_id = accepted["jobId"].as_str().unwrap().to_string();

        let mut job = Value::Null;
        for _ in 0..200 {
            let response = app
                .clone()
                .oneshot(get(&format!("/jobs/{}", job_id)))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            job = body_json(response).await;
            if job["status"] == "completed" || job["status"] == "failed" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(job["status"], "completed");
        assert_eq!(
            job["resultPayload"]["hotels"][0]["hotel"]["name"],
            "Hyatt Regency"
        );

        let response = app
            .oneshot(get(&format!("/jobs/{}/logs?limit=2", job_id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let logs = body_json(response).await;
        assert_eq!(logs.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let app = app();
        let response = app.clone().oneshot(get("/jobs/nope")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app.oneshot(get("/jobs/nope/logs")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_decision_cache_save_then_lookup() {
        let app = app();
        let hotels = json!([{
            "hotel": {"name": "Hyatt Regency", "city": "Denver", "state": "CO", "roomCount": 120},
            "score": 1.0
        }]);

        let response = app
            .clone()
            .oneshot(post(
                "/decision-cache/lookup",
                json!({"context": {"location": "Denver, CO"}}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .clone()
            .oneshot(post(
                "/decision-cache/save",
                json!({
                    "context": {"location": "Denver, CO", "headcount": 40},
                    "recommendedHotels": hotels,
                    "patternDescription": "Denver training events"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let saved = body_json(response).await;

        let response = app
            .oneshot(post(
                "/decision-cache/lookup",
                json!({"context": {" LOCATION ": "denver,  co", "headcount": 40.0}}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let found = body_json(response).await;
        assert_eq!(found["keyHash"], saved["keyHash"]);
        assert_eq!(found["recommendedHotels"], hotels);
        assert_eq!(found["patternDescription"], "Denver training events");
    }
}
