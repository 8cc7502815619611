//! Shared test fixtures for integration tests.
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use gridcast::config::GatewayConfig;
use gridcast::forecast::ForecastStore;
use gridcast::gateway::{PredictionGateway, PredictionRequest};
use gridcast::geo::GeoCatalog;

/// Delay applied by the stub to `Delhi` requests.
pub const DELHI_DELAY: Duration = Duration::from_millis(300);

/// Path of a bundled sample data file.
pub fn data_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data").join(name)
}

/// Catalog built from the bundled sample data.
pub fn sample_catalog() -> Arc<GeoCatalog> {
    let catalog =
        GeoCatalog::load_from_paths(&data_path("states.geojson"), &data_path("cities.json"))
            .expect("sample catalog loads");
    Arc::new(catalog)
}

/// Forecast dataset built from the bundled sample data.
pub fn sample_forecasts() -> Arc<ForecastStore> {
    let store =
        ForecastStore::load_from_path(&data_path("forecast.csv")).expect("sample dataset loads");
    Arc::new(store)
}

/// Gateway pointed at `endpoint` with the given timeout.
pub fn gateway(endpoint: &str, timeout_ms: u64) -> PredictionGateway {
    PredictionGateway::new(&GatewayConfig {
        endpoint: endpoint.to_string(),
        timeout_ms,
    })
    .expect("client builds")
}

/// Stub prediction service keyed on the requested district.
///
/// - `Mumbai` → HTTP 500
/// - `Broken` → 200 with a non-numeric `load`
/// - `Slowtown` → answers after 2 s
/// - `Delhi` → answers after [`DELHI_DELAY`]
/// - anything else → immediate success, price ₹8/kWh
async fn stub_predict(Json(req): Json<PredictionRequest>) -> Response {
    let ok = |req: &PredictionRequest| {
        Json(serde_json::json!({
            "district": req.district,
            "date": req.date,
            "load": 4100.5,
            "price": 8.0,
            "blackout_chance": 2.5,
        }))
        .into_response()
    };
    match req.district.as_str() {
        "Mumbai" => (StatusCode::INTERNAL_SERVER_ERROR, "model crashed").into_response(),
        "Broken" => Json(serde_json::json!({"load": "n/a", "price": 7.0})).into_response(),
        "Slowtown" => {
            tokio::time::sleep(Duration::from_secs(2)).await;
            ok(&req)
        }
        "Delhi" => {
            tokio::time::sleep(DELHI_DELAY).await;
            ok(&req)
        }
        _ => ok(&req),
    }
}

/// Serves the stub on an ephemeral port and returns its `/predict` URL.
pub async fn spawn_stub() -> String {
    let app = Router::new().route("/predict", post(stub_predict));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub");
    let addr = listener.local_addr().expect("stub address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("stub server");
    });
    format!("http://{addr}/predict")
}

/// URL of a local port with nothing listening on it.
pub async fn closed_endpoint() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind closed port");
    let addr = listener.local_addr().expect("closed port address");
    drop(listener);
    format!("http://{addr}/predict")
}

/// Serves one request with a 503 whose body is cut off mid-stream.
///
/// The status line and headers arrive intact; the connection closes before
/// the advertised `Content-Length` is reached.
pub async fn spawn_truncated_error() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind truncating server");
    let addr = listener.local_addr().expect("truncating server address");
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.ends_with(b"}") {
            let n = socket.read(&mut buf).await.expect("read request");
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }
        socket
            .write_all(
                b"HTTP/1.1 503 Service Unavailable\r\n\
                  content-type: text/plain\r\n\
                  content-length: 64\r\n\r\n\
                  overlo",
            )
            .await
            .expect("write partial response");
        socket.shutdown().await.ok();
    });
    format!("http://{addr}/predict")
}
