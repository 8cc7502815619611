//! HTTP client for the external prediction service.
//!
//! Each [`PredictionGateway::predict`] call is one `POST` round trip with no
//! retry and no caching. Failures come back as [`PredictionError`] values so
//! the caller decides how to present them.

use std::future::Future;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::GatewayConfig;
use crate::error::{GatewayInitError, InvalidInput, PredictionError};
use crate::forecast::parse_calendar_date;

/// Longest slice of an error body kept in [`PredictionError::Server`].
const MAX_ERROR_BODY: usize = 512;

/// Prediction for one region on one day, normalized from the wire response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    /// Region (city) the prediction is for.
    pub region: String,
    /// Day the prediction is for.
    pub date: NaiveDate,
    /// Predicted load (MW).
    pub load_mw: f64,
    /// Predicted price (INR/kWh).
    pub price_inr_per_kwh: f64,
    /// Predicted blackout chance (percent).
    pub blackout_chance_pct: f64,
}

/// Request body sent to the prediction service.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PredictionRequest {
    /// Region identifier.
    pub district: String,
    /// Day as `YYYY-MM-DD`.
    pub date: String,
}

/// Source of predictions the selection coordinator is generic over.
pub trait Predictor: Send + Sync + 'static {
    /// Requests a prediction for `region` on `date` (`YYYY-MM-DD`).
    fn predict(
        &self,
        region: &str,
        date: &str,
    ) -> impl Future<Output = Result<PredictionResult, PredictionError>> + Send;
}

/// Validates a region/date pair before any I/O.
///
/// # Errors
///
/// Returns [`InvalidInput`] for a blank region or a date that is not a
/// `YYYY-MM-DD` calendar date.
pub fn validate_request(region: &str, date: &str) -> Result<NaiveDate, InvalidInput> {
    if region.trim().is_empty() {
        return Err(InvalidInput::new("region", "must not be blank"));
    }
    parse_calendar_date(date)
        .ok_or_else(|| InvalidInput::new("date", format!("`{date}` is not a YYYY-MM-DD calendar date")))
}

/// `reqwest`-backed [`Predictor`] for the configured endpoint.
#[derive(Debug, Clone)]
pub struct PredictionGateway {
    client: reqwest::Client,
    endpoint: String,
}

impl PredictionGateway {
    /// Builds a gateway with the configured endpoint and timeout.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayInitError`] if the endpoint is not an `http(s)` URL
    /// or the HTTP client cannot be constructed.
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayInitError> {
        let invalid = |message: String| GatewayInitError::Endpoint {
            endpoint: config.endpoint.clone(),
            message,
        };
        let url = reqwest::Url::parse(&config.endpoint).map_err(|e| invalid(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme `{}`", url.scheme())));
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }

    /// Endpoint requests are posted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Issues one prediction request.
    ///
    /// # Errors
    ///
    /// * [`PredictionError::InvalidInput`] - blank region or bad date, no request sent
    /// * [`PredictionError::Network`] - connection failure or timeout
    /// * [`PredictionError::Server`] - non-success HTTP status
    /// * [`PredictionError::MalformedResponse`] - body lacks numeric `load`,
    ///   `price`, or `blackout_chance`
    pub async fn predict(
        &self,
        region: &str,
        date: &str,
    ) -> Result<PredictionResult, PredictionError> {
        let day = validate_request(region, date)?;
        let body = PredictionRequest {
            district: region.to_string(),
            date: date.to_string(),
        };

        debug!(endpoint = %self.endpoint, region, date, "requesting prediction");
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| network_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            warn!(region, date, status = status.as_u16(), "prediction service error");
            let body = response.text().await.unwrap_or_default();
            return Err(PredictionError::Server {
                status: status.as_u16(),
                body: truncate(&body, MAX_ERROR_BODY),
            });
        }

        let text = response.text().await.map_err(|e| network_error(&e))?;
        parse_response(region, day, &text)
    }
}

impl Predictor for PredictionGateway {
    fn predict(
        &self,
        region: &str,
        date: &str,
    ) -> impl Future<Output = Result<PredictionResult, PredictionError>> + Send {
        PredictionGateway::predict(self, region, date)
    }
}

fn network_error(e: &reqwest::Error) -> PredictionError {
    if e.is_timeout() {
        PredictionError::Network(format!("request timed out: {e}"))
    } else {
        PredictionError::Network(e.to_string())
    }
}

/// Normalizes a success body into a [`PredictionResult`].
fn parse_response(
    region: &str,
    date: NaiveDate,
    text: &str,
) -> Result<PredictionResult, PredictionError> {
    let json: Value = serde_json::from_str(text)
        .map_err(|e| PredictionError::MalformedResponse(format!("body is not JSON: {e}")))?;
    let number = |key: &str| {
        json.get(key)
            .and_then(Value::as_f64)
            .filter(|v| v.is_finite())
            .ok_or_else(|| PredictionError::MalformedResponse(format!("missing numeric `{key}`")))
    };
    Ok(PredictionResult {
        region: region.to_string(),
        date,
        load_mw: number("load")?,
        price_inr_per_kwh: number("price")?,
        blackout_chance_pct: number("blackout_chance")?,
    })
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((i, _)) => format!("{}…", &s[..i]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, 15).unwrap()
    }

    #[test]
    fn validate_accepts_calendar_dates_only() {
        assert_eq!(validate_request("Mumbai", "2025-04-15"), Ok(day()));
        for bad in ["2025-02-30", "2025-4-15", "15-04-2025", "", "2025-04-15T00:00"] {
            let err = validate_request("Mumbai", bad).unwrap_err();
            assert_eq!(err.field, "date", "{bad}");
        }
        assert_eq!(validate_request("  ", "2025-04-15").unwrap_err().field, "region");
    }

    #[test]
    fn parses_full_response_ignoring_extra_fields() {
        let body = r#"{"district":"Mumbai","date":"2025-04-15","load":4321.5,"price":8.25,"blackout_chance":3.1}"#;
        let r = parse_response("Mumbai", day(), body).unwrap();
        assert_eq!(r.region, "Mumbai");
        assert_eq!(r.load_mw, 4321.5);
        assert_eq!(r.price_inr_per_kwh, 8.25);
        assert_eq!(r.blackout_chance_pct, 3.1);
    }

    #[test]
    fn missing_or_stringly_fields_are_malformed() {
        for body in [
            r#"{"load":1.0,"price":2.0}"#,
            r#"{"load":"1.0","price":2.0,"blackout_chance":0.5}"#,
            r#"{"load":null,"price":2.0,"blackout_chance":0.5}"#,
            "<html>oops</html>",
        ] {
            let err = parse_response("Delhi", day(), body).unwrap_err();
            assert!(
                matches!(err, PredictionError::MalformedResponse(_)),
                "{body}: {err:?}"
            );
        }
    }

    #[test]
    fn request_body_matches_wire_contract() {
        let body = PredictionRequest {
            district: "Delhi".into(),
            date: "2025-04-15".into(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json, serde_json::json!({"district": "Delhi", "date": "2025-04-15"}));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("Rājasthān", 3), "Rāj…");
    }

    #[tokio::test]
    async fn invalid_date_fails_before_network() {
        // Nothing listens on port 9; a request would surface as a network error.
        let gw = PredictionGateway::new(&GatewayConfig {
            endpoint: "http://127.0.0.1:9/predict".into(),
            timeout_ms: 100,
        })
        .unwrap();
        let err = gw.predict("Mumbai", "2025-13-01").await.unwrap_err();
        assert!(matches!(err, PredictionError::InvalidInput(_)));
    }

    #[test]
    fn unpadded_date_is_invalid_input() {
        let err = validate_request("Delhi", "2025-4-1").unwrap_err();
        assert_eq!(err.field, "date");
        assert!(validate_request("Delhi", "2025-04-01").is_ok());
    }

    #[test]
    fn bad_endpoint_is_an_init_error() {
        for endpoint in ["not a url", "ftp://127.0.0.1/predict"] {
            let err = PredictionGateway::new(&GatewayConfig {
                endpoint: endpoint.into(),
                timeout_ms: 100,
            })
            .unwrap_err();
            assert!(
                matches!(err, GatewayInitError::Endpoint { .. }),
                "{endpoint}: {err}"
            );
        }
    }
}
