//! Request handlers for the API endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::NaiveDate;

use super::AppState;
use super::types::{
    ApiError, CapacityRequest, LocateQuery, LocateResponse, RangeQuery, RegionsQuery,
    RenewableQuery, SelectionRequest,
};
use crate::forecast::{ForecastPoint, MonthlyLoad, parse_calendar_date};
use crate::geo::Region;
use crate::renewable::{self, RenewableEstimate};
use crate::selection::{Command, SelectionSnapshot};

/// Returns sorted state names.
///
/// `GET /states` → 200 + `Vec<String>`
pub async fn get_states(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    Json(state.catalog.states())
}

/// Returns regions, optionally filtered by state.
///
/// `GET /regions` → every region, sorted by id
/// `GET /regions?state=Delhi` → regions of that state (`All` = no filter)
pub async fn get_regions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RegionsQuery>,
) -> Json<Vec<Region>> {
    let regions = state
        .catalog
        .regions_in_state(query.state.as_deref())
        .into_iter()
        .cloned()
        .collect();
    Json(regions)
}

/// Resolves a point to its state and nearest region.
///
/// `GET /locate?lat=26.9&lon=75.8` → 200 + `LocateResponse`
/// Latitude outside ±90 or longitude outside ±180 → 400
pub async fn get_locate(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LocateQuery>,
) -> Result<Json<LocateResponse>, ApiError> {
    let LocateQuery { lat, lon } = query;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(ApiError::BadRequest(format!("({lat}, {lon}) is not a coordinate")));
    }
    Ok(Json(LocateResponse {
        state: state.catalog.state_at(lat, lon).map(str::to_string),
        nearest: state.catalog.nearest(lat, lon).cloned(),
    }))
}

/// Returns the dataset series for a region, optionally limited to a range.
///
/// `GET /forecast/{region}?from=YYYY-MM-DD&to=YYYY-MM-DD` → 200 + points
/// `from > to` or a bad date → 400; region absent from the dataset → 404
pub async fn get_forecast(
    State(state): State<Arc<AppState>>,
    Path(region): Path<String>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<Vec<ForecastPoint>>, ApiError> {
    let from = parse_day(query.from.as_deref(), "from")?.unwrap_or(NaiveDate::MIN);
    let to = parse_day(query.to.as_deref(), "to")?.unwrap_or(NaiveDate::MAX);
    if from > to {
        return Err(ApiError::BadRequest(format!(
            "`from` ({from}) must be <= `to` ({to})"
        )));
    }
    if state.forecasts.series(&region).is_empty() {
        return Err(ApiError::NotFound(format!("no forecast data for `{region}`")));
    }

    let points = state
        .forecasts
        .series_between(&region, from, to)
        .into_iter()
        .cloned()
        .collect();
    Ok(Json(points))
}

/// Returns per-month load totals for a region.
///
/// `GET /forecast/{region}/monthly` → 200 + `Vec<MonthlyLoad>`, 404 if unknown
pub async fn get_monthly(
    State(state): State<Arc<AppState>>,
    Path(region): Path<String>,
) -> Result<Json<Vec<MonthlyLoad>>, ApiError> {
    let months = state.forecasts.monthly_load(&region);
    if months.is_empty() {
        return Err(ApiError::NotFound(format!("no forecast data for `{region}`")));
    }
    Ok(Json(months))
}

/// Computes a solar estimate from query parameters.
///
/// `GET /renewable?capacity_kw=4&month=2&state=Rājasthān&price=8` → 200
/// Positive capacity is clamped to the 1–8 kW panel range.
/// Non-positive or non-finite capacity, a bad month, or a bad price → 400
pub async fn get_renewable(
    Query(query): Query<RenewableQuery>,
) -> Result<Json<RenewableEstimate>, ApiError> {
    let capacity_kw = if query.capacity_kw.is_finite() && query.capacity_kw > 0.0 {
        renewable::clamp_capacity(query.capacity_kw)
    } else {
        query.capacity_kw
    };
    let estimate = renewable::estimate(
        capacity_kw,
        query.month,
        query.state.as_deref(),
        query.price,
    )?;
    Ok(Json(estimate))
}

/// Starts a new selection.
///
/// `POST /selection {region, date}` → 202
pub async fn post_selection(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SelectionRequest>,
) -> Result<StatusCode, ApiError> {
    send(
        &state,
        Command::Select {
            region: body.region,
            date: body.date,
        },
    )
    .await
}

/// Clears the selection.
///
/// `DELETE /selection` → 202
pub async fn delete_selection(
    State(state): State<Arc<AppState>>,
) -> Result<StatusCode, ApiError> {
    send(&state, Command::Reset).await
}

/// Changes the panel capacity.
///
/// `PUT /selection/capacity {capacity_kw}` → 202, 400 for non-finite values
pub async fn put_capacity(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CapacityRequest>,
) -> Result<StatusCode, ApiError> {
    if !body.capacity_kw.is_finite() {
        return Err(ApiError::BadRequest("`capacity_kw` must be finite".into()));
    }
    send(&state, Command::SetCapacity(body.capacity_kw)).await
}

/// Re-issues the current selection.
///
/// `POST /selection/retry` → 202
pub async fn post_retry(State(state): State<Arc<AppState>>) -> Result<StatusCode, ApiError> {
    send(&state, Command::Retry).await
}

/// Returns the latest published snapshot.
///
/// `GET /snapshot` → 200 + `SelectionSnapshot`
pub async fn get_snapshot(State(state): State<Arc<AppState>>) -> Json<SelectionSnapshot> {
    Json(state.snapshot.borrow().clone())
}

async fn send(state: &AppState, command: Command) -> Result<StatusCode, ApiError> {
    state
        .commands
        .send(command)
        .await
        .map_err(|_| ApiError::Unavailable)?;
    Ok(StatusCode::ACCEPTED)
}

fn parse_day(value: Option<&str>, field: &str) -> Result<Option<NaiveDate>, ApiError> {
    value
        .map(|s| {
            parse_calendar_date(s)
                .ok_or_else(|| ApiError::BadRequest(format!("`{field}` is not a YYYY-MM-DD date")))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::future::Future;

    use axum::body::Body;
    use axum::http::{Method, Request};
    use tower::util::ServiceExt;

    use super::*;
    use crate::api::router;
    use crate::error::PredictionError;
    use crate::forecast::ForecastStore;
    use crate::gateway::{PredictionResult, Predictor, validate_request};
    use crate::geo::GeoCatalog;
    use crate::selection::{SelectionCoordinator, SelectionState};

    /// Predictor answering immediately with fixed values.
    struct Fixed;

    impl Predictor for Fixed {
        fn predict(
            &self,
            region: &str,
            date: &str,
        ) -> impl Future<Output = Result<PredictionResult, PredictionError>> + Send {
            let out = validate_request(region, date)
                .map_err(PredictionError::from)
                .map(|date| PredictionResult {
                    region: region.to_string(),
                    date,
                    load_mw: 3100.0,
                    price_inr_per_kwh: 8.0,
                    blackout_chance_pct: 1.5,
                });
            std::future::ready(out)
        }
    }

    const CITIES: &str = r#"[
        {"city": "Jaipur", "state": "Rājasthān", "latitude": 26.9, "longitude": 75.8},
        {"city": "Delhi", "state": "Delhi", "latitude": 28.6, "longitude": 77.2},
        {"city": "Udaipur", "state": "Rājasthān", "latitude": 24.6, "longitude": 73.7}
    ]"#;

    const CSV: &str = "\
date,region,load_kwh,price_inr_per_kwh
2025-03-01,Jaipur,80000,7.5
2025-03-02,Jaipur,82000,7.6
2025-04-01,Jaipur,90000,8.0
2025-03-01,Delhi,150000,9.1
";

    fn make_test_state() -> Arc<AppState> {
        let catalog = GeoCatalog::from_json_strs(r#"{"features": []}"#, CITIES).unwrap();
        let forecasts = ForecastStore::load(CSV.as_bytes()).unwrap();
        let coordinator =
            SelectionCoordinator::new(Arc::new(Fixed), Arc::new(catalog), Arc::new(forecasts), 4.0);
        AppState::start(coordinator)
    }

    async fn call(
        state: &Arc<AppState>,
        method: Method,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let builder = Request::builder().method(method).uri(uri);
        let req = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let resp = router(Arc::clone(state)).oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn states_are_sorted_and_distinct() {
        let state = make_test_state();
        let (status, json) = call(&state, Method::GET, "/states", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, serde_json::json!(["Delhi", "Rājasthān"]));
    }

    #[tokio::test]
    async fn regions_filter_by_state() {
        let state = make_test_state();
        let (_, all) = call(&state, Method::GET, "/regions?state=All", None).await;
        assert_eq!(all.as_array().map(Vec::len), Some(3));

        let (status, json) = call(&state, Method::GET, "/regions?state=Delhi", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json[0]["id"], "Delhi");
        assert_eq!(json.as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn forecast_range_query() {
        let state = make_test_state();
        let (status, json) = call(
            &state,
            Method::GET,
            "/forecast/Jaipur?from=2025-03-02&to=2025-04-30",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let points = json.as_array().unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0]["date"], "2025-03-02");
        assert_eq!(points[1]["date"], "2025-04-01");
    }

    #[tokio::test]
    async fn forecast_invalid_range_returns_400() {
        let state = make_test_state();
        let (status, json) = call(
            &state,
            Method::GET,
            "/forecast/Jaipur?from=2025-04-01&to=2025-03-01",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json.get("error").is_some());

        let (status, _) = call(&state, Method::GET, "/forecast/Jaipur?from=April", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn forecast_range_requires_padded_dates() {
        let state = make_test_state();
        let (status, json) = call(&state, Method::GET, "/forecast/Jaipur?from=2025-4-1", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("from"));

        let (status, _) = call(
            &state,
            Method::GET,
            "/forecast/Jaipur?to=2025-03-02%20junk",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_region_returns_404() {
        let state = make_test_state();
        let (status, _) = call(&state, Method::GET, "/forecast/Atlantis", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&state, Method::GET, "/forecast/Atlantis/monthly", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn monthly_totals_in_mwh() {
        let state = make_test_state();
        let (status, json) = call(&state, Method::GET, "/forecast/Jaipur/monthly", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json[0]["month"], 3);
        assert_eq!(json[0]["load_mwh"], 162.0);
        assert_eq!(json[1]["load_mwh"], 90.0);
    }

    #[tokio::test]
    async fn renewable_estimate_and_rejections() {
        let state = make_test_state();
        let (status, json) = call(
            &state,
            Method::GET,
            "/renewable?capacity_kw=4&month=2&state=R%C4%81jasth%C4%81n&price=8",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let generation = json["daily_generation_kwh"].as_f64().unwrap();
        assert!((generation - 18.24).abs() < 1e-9);

        let (status, _) = call(
            &state,
            Method::GET,
            "/renewable?capacity_kw=0&month=2&price=8",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = call(
            &state,
            Method::GET,
            "/renewable?capacity_kw=4&month=12&price=8",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn renewable_capacity_is_clamped_to_panel_range() {
        let state = make_test_state();
        let (status, json) = call(
            &state,
            Method::GET,
            "/renewable?capacity_kw=100&month=2&state=R%C4%81jasth%C4%81n&price=8",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["panel_capacity_kw"], 8.0);
        // 8 kW * 4 h * March 0.95 * Rājasthān 1.2
        let generation = json["daily_generation_kwh"].as_f64().unwrap();
        assert!((generation - 36.48).abs() < 1e-9);

        let (status, json) = call(
            &state,
            Method::GET,
            "/renewable?capacity_kw=0.5&month=2&price=8",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["panel_capacity_kw"], 1.0);

        let (status, _) = call(
            &state,
            Method::GET,
            "/renewable?capacity_kw=inf&month=2&price=8",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn selection_flow_through_snapshot() {
        let state = make_test_state();
        let (status, json) = call(&state, Method::GET, "/snapshot", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["prediction"]["status"], "idle");

        let body = serde_json::json!({"region": "Jaipur", "date": "2025-03-01"});
        let (status, _) = call(&state, Method::POST, "/selection", Some(body)).await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let mut rx = state.snapshot.clone();
        rx.wait_for(|s| s.state() == SelectionState::SettledOk)
            .await
            .unwrap();
        let (_, json) = call(&state, Method::GET, "/snapshot", None).await;
        assert_eq!(json["region"], "Jaipur");
        assert_eq!(json["recorded"]["load_kwh"], 80000.0);
        assert_eq!(json["renewable"]["panel_capacity_kw"], 4.0);

        let body = serde_json::json!({"capacity_kw": 2.0});
        let (status, _) = call(&state, Method::PUT, "/selection/capacity", Some(body)).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        rx.wait_for(|s| s.renewable.map(|e| e.panel_capacity_kw) == Some(2.0))
            .await
            .unwrap();

        let (status, _) = call(&state, Method::DELETE, "/selection", None).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        rx.wait_for(|s| s.state() == SelectionState::Idle)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn invalid_date_settles_as_invalid_input() {
        let state = make_test_state();
        let body = serde_json::json!({"region": "Delhi", "date": "2025-02-30"});
        call(&state, Method::POST, "/selection", Some(body)).await;

        let mut rx = state.snapshot.clone();
        let snap = rx
            .wait_for(|s| matches!(s.state(), SelectionState::SettledError(_)))
            .await
            .unwrap()
            .clone();
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["prediction"]["detail"], "invalid_input");
        assert!(json["renewable"].is_null());
    }
}
