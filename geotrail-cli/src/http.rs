//! HTTP adapter over the tracking service.
//!
//! A thin translation layer: each route parses the request, calls one
//! service operation, and shapes the JSON response. No tracking logic lives
//! here.
//!
//! # Routes
//!
//! - `POST /location` - ingest a report; device ids from the `id`/`ids`
//!   header or query parameter (comma-separated), default `default`
//! - `GET /location[?id=]` - current position and history
//! - `GET /trips?id=` - trips with points, including the open trip
//! - `GET /ids` - known device ids
//! - `DELETE /locations` - clear live state
//! - `GET /events[?ids=]` - Server-Sent Events stream, catch-up then live

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures::stream::Stream;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;

use geotrail::broadcast::SubscriberFilter;
use geotrail::model::Fix;
use geotrail::service::TrackingService;

type AppState = Arc<TrackingService>;

/// Build the HTTP router over the service.
pub fn router(service: AppState) -> Router {
    Router::new()
        .route("/location", post(post_location).get(get_location))
        .route("/locations", delete(delete_locations))
        .route("/trips", get(get_trips))
        .route("/ids", get(get_ids))
        .route("/events", get(get_events))
        .with_state(service)
}

#[derive(Debug, Serialize)]
struct IngestResponse {
    status: &'static str,
    message: &'static str,
    locations: Vec<Fix>,
}

/// Split a comma-separated id list, dropping empty segments.
fn parse_ids(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Accept a coordinate as a JSON number or a numeric string.
fn coerce_coord(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Resolve device ids from header or query, header first.
fn device_ids(headers: &HeaderMap, params: &HashMap<String, String>) -> Vec<String> {
    let raw = headers
        .get("id")
        .or_else(|| headers.get("ids"))
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| params.get("id").cloned())
        .or_else(|| params.get("ids").cloned());

    raw.map(|s| parse_ids(&s)).unwrap_or_default()
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

async fn post_location(
    State(service): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Response {
    let lat = coerce_coord(body.get("lat"));
    let lng = coerce_coord(body.get("lng"));
    let (Some(lat), Some(lng)) = (lat, lng) else {
        return error_response(StatusCode::BAD_REQUEST, "lat and lng required");
    };

    let ids = device_ids(&headers, &params);
    match service.ingest(&ids, lat, lng) {
        Ok(accepted) => Json(IngestResponse {
            status: "success",
            message: "Location(s) updated",
            locations: accepted.into_iter().map(|a| a.fix).collect(),
        })
        .into_response(),
        Err(e) => error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    }
}

async fn get_location(
    State(service): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    match params.get("id") {
        Some(id) => Json(service.current_and_history(id)).into_response(),
        None => Json(service.all_current_and_history()).into_response(),
    }
}

async fn get_trips(
    State(service): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(id) = params.get("id") else {
        return error_response(StatusCode::BAD_REQUEST, "id query param required");
    };

    match service.list_trips(id).await {
        Ok(trips) => Json(json!({ "trips": trips })).into_response(),
        Err(e) => {
            warn!(device_id = %id, error = %e, "Trip listing failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "trip store unavailable")
        }
    }
}

async fn get_ids(State(service): State<AppState>) -> Json<Vec<String>> {
    Json(service.device_ids())
}

async fn delete_locations(State(service): State<AppState>) -> Json<Value> {
    service.reset_all();
    Json(json!({ "status": "success", "message": "Locations cleared" }))
}

async fn get_events(
    State(service): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let raw = params
        .get("ids")
        .or_else(|| params.get("id"))
        .cloned()
        .unwrap_or_default();
    let ids = parse_ids(&raw);
    let filter = if ids.is_empty() {
        SubscriberFilter::all()
    } else {
        SubscriberFilter::devices(ids)
    };

    let subscription = service.subscribe(filter);
    let stream = futures::stream::unfold(subscription, |mut subscription| async move {
        let fix = subscription.recv().await?;
        let event = Event::default().json_data(&fix).ok()?;
        Some((Ok(event), subscription))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geotrail::app::{AppConfig, TrackerApp};

    async fn make_service() -> (TrackerApp, AppState) {
        let app = TrackerApp::start(AppConfig::default()).await.unwrap();
        let service = app.service();
        (app, service)
    }

    #[test]
    fn test_parse_ids_splits_and_trims() {
        assert_eq!(parse_ids("a, b ,c"), vec!["a", "b", "c"]);
        assert_eq!(parse_ids("solo"), vec!["solo"]);
        assert!(parse_ids("").is_empty());
        assert_eq!(parse_ids(",a,,"), vec!["a"]);
    }

    #[test]
    fn test_coerce_coord_accepts_numbers_and_numeric_strings() {
        assert_eq!(coerce_coord(Some(&json!(41.5))), Some(41.5));
        assert_eq!(coerce_coord(Some(&json!("41.5"))), Some(41.5));
        assert_eq!(coerce_coord(Some(&json!(" 41.5 "))), Some(41.5));
        assert_eq!(coerce_coord(Some(&json!("north"))), None);
        assert_eq!(coerce_coord(Some(&json!(null))), None);
        assert_eq!(coerce_coord(None), None);
    }

    #[test]
    fn test_device_ids_header_beats_query() {
        let mut headers = HeaderMap::new();
        headers.insert("id", "bike1,bike2".parse().unwrap());
        let mut params = HashMap::new();
        params.insert("id".to_string(), "car9".to_string());

        assert_eq!(device_ids(&headers, &params), vec!["bike1", "bike2"]);
        assert_eq!(device_ids(&HeaderMap::new(), &params), vec!["car9"]);
        assert!(device_ids(&HeaderMap::new(), &HashMap::new()).is_empty());
    }

    #[tokio::test]
    async fn test_post_location_requires_coordinates() {
        let (_app, service) = make_service().await;
        let response = post_location(
            State(service.clone()),
            HeaderMap::new(),
            Query(HashMap::new()),
            Json(json!({ "lat": 41.0 })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        // The rejected report left no trace.
        assert!(service.device_ids().is_empty());
    }

    #[tokio::test]
    async fn test_post_location_ingests_for_header_ids() {
        let (_app, service) = make_service().await;
        let mut headers = HeaderMap::new();
        headers.insert("ids", "bike1,car2".parse().unwrap());

        let response = post_location(
            State(service.clone()),
            headers,
            Query(HashMap::new()),
            Json(json!({ "lat": "41.0", "lng": 29.0 })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(service.device_ids(), vec!["bike1", "car2"]);
    }

    #[tokio::test]
    async fn test_post_location_defaults_device_id() {
        let (_app, service) = make_service().await;
        let response = post_location(
            State(service.clone()),
            HeaderMap::new(),
            Query(HashMap::new()),
            Json(json!({ "lat": 41.0, "lng": 29.0 })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(service.device_ids(), vec!["default"]);
    }

    #[tokio::test]
    async fn test_get_trips_requires_id() {
        let (_app, service) = make_service().await;
        let response = get_trips(State(service), Query(HashMap::new())).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_delete_locations_clears_live_state() {
        let (_app, service) = make_service().await;
        service
            .ingest(&["bike1".to_string()], 41.0, 29.0)
            .unwrap();

        delete_locations(State(service.clone())).await;
        assert!(service.device_ids().is_empty());
    }
}
