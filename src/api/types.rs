//! API request, query, and error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::error::InvalidInput;
use crate::geo::Region;

/// Optional date range for the forecast series endpoint.
#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    /// First day (inclusive), `YYYY-MM-DD`.
    pub from: Option<String>,
    /// Last day (inclusive), `YYYY-MM-DD`.
    pub to: Option<String>,
}

/// State filter for the regions endpoint.
#[derive(Debug, Deserialize)]
pub struct RegionsQuery {
    /// State name; absent or `All` means no filter.
    pub state: Option<String>,
}

/// Inputs for the renewable estimate endpoint.
#[derive(Debug, Deserialize)]
pub struct RenewableQuery {
    /// Panel capacity (kW).
    pub capacity_kw: f64,
    /// Month, 0 = January.
    pub month: u32,
    /// State for the location factor.
    pub state: Option<String>,
    /// Electricity price (INR/kWh).
    pub price: f64,
}

/// Point for the locate endpoint.
#[derive(Debug, Deserialize)]
pub struct LocateQuery {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}

/// What lies at a point.
#[derive(Debug, Serialize)]
pub struct LocateResponse {
    /// State whose outline contains the point.
    pub state: Option<String>,
    /// Closest region by great-circle distance.
    pub nearest: Option<Region>,
}

/// Body of `POST /selection`.
#[derive(Debug, Deserialize, Serialize)]
pub struct SelectionRequest {
    /// Region id.
    pub region: String,
    /// Day as `YYYY-MM-DD`.
    pub date: String,
}

/// Body of `PUT /selection/capacity`.
#[derive(Debug, Deserialize, Serialize)]
pub struct CapacityRequest {
    /// Panel capacity (kW); clamped to 1–8.
    pub capacity_kw: f64,
}

/// Error body for 4xx/5xx responses.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
}

/// Errors returned by API handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Bad query or body value.
    #[error("{0}")]
    BadRequest(String),
    /// Unknown region.
    #[error("{0}")]
    NotFound(String),
    /// The coordinator task is gone.
    #[error("selection coordinator is not running")]
    Unavailable,
}

impl From<InvalidInput> for ApiError {
    fn from(e: InvalidInput) -> Self {
        Self::BadRequest(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        };
        let body = ErrorResponse {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
