//! REST API over the region catalog, forecast dataset, and live selection.
//!
//! Read endpoints:
//! - `/states`, `/regions?state=`, `/locate?lat=&lon=` - catalog
//! - `/forecast/{region}?from=&to=`, `/forecast/{region}/monthly` - dataset
//! - `/renewable?capacity_kw=&month=&state=&price=` - solar estimate
//! - `/snapshot` - current selection snapshot
//!
//! Selection endpoints forward commands to a coordinator task and answer
//! `202 Accepted`; the outcome shows up in `/snapshot`.

mod handlers;
mod types;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use tokio::sync::{mpsc, watch};
use tracing::info;

use crate::forecast::ForecastStore;
use crate::gateway::Predictor;
use crate::geo::GeoCatalog;
use crate::selection::{Command, SelectionCoordinator, SelectionSnapshot};

pub use types::ApiError;

/// Depth of the command queue between handlers and the coordinator task.
const COMMAND_QUEUE: usize = 32;

/// Application state shared across all request handlers.
///
/// Catalog and dataset are immutable. The selection is owned by a coordinator
/// task; handlers talk to it through `commands` and read its latest snapshot
/// from `snapshot`.
pub struct AppState {
    /// Region catalog.
    pub catalog: Arc<GeoCatalog>,
    /// Forecast dataset.
    pub forecasts: Arc<ForecastStore>,
    /// Command queue into the coordinator task.
    pub commands: mpsc::Sender<Command>,
    /// Latest published selection snapshot.
    pub snapshot: watch::Receiver<SelectionSnapshot>,
}

impl AppState {
    /// Spawns `coordinator` on the current runtime and wires it to a new state.
    pub fn start<P: Predictor>(mut coordinator: SelectionCoordinator<P>) -> Arc<Self> {
        let (snapshot_tx, snapshot) = watch::channel(coordinator.snapshot().clone());
        coordinator.subscribe(snapshot_tx);
        let (commands, rx) = mpsc::channel(COMMAND_QUEUE);
        let state = Arc::new(Self {
            catalog: Arc::clone(coordinator.catalog()),
            forecasts: Arc::clone(coordinator.forecasts()),
            commands,
            snapshot,
        });
        tokio::spawn(coordinator.run(rx));
        state
    }
}

/// Builds the axum router with all API routes.
///
/// # Arguments
///
/// * `state` - Shared application state
///
/// # Returns
///
/// Configured `Router` ready to serve.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/states", get(handlers::get_states))
        .route("/regions", get(handlers::get_regions))
        .route("/locate", get(handlers::get_locate))
        .route("/forecast/{region}", get(handlers::get_forecast))
        .route("/forecast/{region}/monthly", get(handlers::get_monthly))
        .route("/renewable", get(handlers::get_renewable))
        .route(
            "/selection",
            post(handlers::post_selection).delete(handlers::delete_selection),
        )
        .route("/selection/capacity", put(handlers::put_capacity))
        .route("/selection/retry", post(handlers::post_retry))
        .route("/snapshot", get(handlers::get_snapshot))
        .with_state(state)
}

/// Binds to the given address and serves the API until the server stops.
///
/// # Errors
///
/// Returns the I/O error if the listener cannot bind or the server fails.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> std::io::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");
    axum::serve(listener, app).await
}
