//! Selection state machine and snapshot publishing.
//!
//! [`SelectionCoordinator`] owns the one current [`SelectionSnapshot`]. Every
//! `select` moves to `Pending`, spawns a prediction tagged with a fresh
//! sequence number, and the completion is applied only if that number is
//! still the latest. Older completions are dropped on arrival; the requests
//! themselves are never aborted.

use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::error::{FailureKind, PredictionError};
use crate::forecast::{ForecastPoint, ForecastStore};
use crate::gateway::{PredictionResult, Predictor};
use crate::geo::{GeoCatalog, Region};
use crate::renewable::{self, RenewableEstimate};

/// Prediction status carried by a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum PredictionStatus {
    /// Nothing selected.
    Idle,
    /// Request in flight.
    Pending,
    /// Request succeeded.
    Ready(PredictionResult),
    /// Request failed with this kind.
    Failed(FailureKind),
}

/// Coarse state of the coordinator, derived from the current snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionState {
    /// No selection.
    Idle,
    /// Waiting on the latest request.
    Pending,
    /// Latest request succeeded.
    SettledOk,
    /// Latest request failed.
    SettledError(FailureKind),
}

/// Immutable published view of the current selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionSnapshot {
    /// Sequence number of the selection this snapshot belongs to.
    pub sequence: u64,
    /// Selected region id, `None` when idle.
    pub region: Option<String>,
    /// Selected date as given, `None` when idle.
    pub date: Option<String>,
    /// Catalog entry for the region, if known.
    pub location: Option<Region>,
    /// Dataset row for (region, date), if present.
    pub recorded: Option<ForecastPoint>,
    /// Prediction status.
    pub prediction: PredictionStatus,
    /// Solar estimate; only present alongside a ready prediction.
    pub renewable: Option<RenewableEstimate>,
}

impl SelectionSnapshot {
    /// Snapshot with no selection.
    pub const fn idle(sequence: u64) -> Self {
        Self {
            sequence,
            region: None,
            date: None,
            location: None,
            recorded: None,
            prediction: PredictionStatus::Idle,
            renewable: None,
        }
    }

    /// Coarse state of this snapshot.
    pub const fn state(&self) -> SelectionState {
        match &self.prediction {
            PredictionStatus::Idle => SelectionState::Idle,
            PredictionStatus::Pending => SelectionState::Pending,
            PredictionStatus::Ready(_) => SelectionState::SettledOk,
            PredictionStatus::Failed(kind) => SelectionState::SettledError(*kind),
        }
    }
}

/// Receives every snapshot the coordinator publishes.
///
/// Called once per state transition, in order, never twice for the same
/// snapshot value.
pub trait SnapshotListener: Send {
    /// Handles a newly published snapshot.
    fn on_snapshot_change(&mut self, snapshot: &SelectionSnapshot);
}

impl<F: FnMut(&SelectionSnapshot) + Send> SnapshotListener for F {
    fn on_snapshot_change(&mut self, snapshot: &SelectionSnapshot) {
        self(snapshot);
    }
}

impl SnapshotListener for mpsc::UnboundedSender<SelectionSnapshot> {
    fn on_snapshot_change(&mut self, snapshot: &SelectionSnapshot) {
        // A dropped receiver just means that consumer went away.
        let _ = self.send(snapshot.clone());
    }
}

impl SnapshotListener for watch::Sender<SelectionSnapshot> {
    fn on_snapshot_change(&mut self, snapshot: &SelectionSnapshot) {
        self.send_replace(snapshot.clone());
    }
}

/// Instruction for a coordinator driven by [`SelectionCoordinator::run`].
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Select a region and date.
    Select {
        /// Region id.
        region: String,
        /// Date as `YYYY-MM-DD`.
        date: String,
    },
    /// Clear the selection.
    Reset,
    /// Change the panel capacity (kW, clamped to 1–8).
    SetCapacity(f64),
    /// Re-issue the current selection.
    Retry,
}

/// What happened to a completion taken by [`SelectionCoordinator::settle_next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// The completion belonged to the latest selection and was published.
    Applied {
        /// Its sequence number.
        sequence: u64,
    },
    /// The completion was superseded and dropped.
    Discarded {
        /// Its sequence number.
        sequence: u64,
    },
}

struct Completion {
    sequence: u64,
    outcome: Result<PredictionResult, PredictionError>,
}

/// Single owner and mutator of the current selection snapshot.
///
/// Generic over `P: Predictor` for static dispatch, so tests can drive it
/// with a scripted predictor and production uses the HTTP gateway.
pub struct SelectionCoordinator<P: Predictor> {
    predictor: Arc<P>,
    catalog: Arc<GeoCatalog>,
    forecasts: Arc<ForecastStore>,
    capacity_kw: f64,
    latest: u64,
    in_flight: usize,
    current: SelectionSnapshot,
    listeners: Vec<Box<dyn SnapshotListener>>,
    done_tx: mpsc::UnboundedSender<Completion>,
    done_rx: mpsc::UnboundedReceiver<Completion>,
}

impl<P: Predictor> SelectionCoordinator<P> {
    /// Creates an idle coordinator.
    ///
    /// # Arguments
    ///
    /// * `predictor` - Source of predictions
    /// * `catalog` - Region catalog merged into snapshots
    /// * `forecasts` - Dataset merged into snapshots
    /// * `capacity_kw` - Initial panel capacity, clamped to 1–8 kW
    pub fn new(
        predictor: Arc<P>,
        catalog: Arc<GeoCatalog>,
        forecasts: Arc<ForecastStore>,
        capacity_kw: f64,
    ) -> Self {
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        Self {
            predictor,
            catalog,
            forecasts,
            capacity_kw: renewable::clamp_capacity(capacity_kw),
            latest: 0,
            in_flight: 0,
            current: SelectionSnapshot::idle(0),
            listeners: Vec::new(),
            done_tx,
            done_rx,
        }
    }

    /// Registers a consumer of published snapshots.
    pub fn subscribe(&mut self, listener: impl SnapshotListener + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> &SelectionSnapshot {
        &self.current
    }

    /// Coarse current state.
    pub const fn state(&self) -> SelectionState {
        self.current.state()
    }

    /// Catalog merged into snapshots.
    pub fn catalog(&self) -> &Arc<GeoCatalog> {
        &self.catalog
    }

    /// Dataset merged into snapshots.
    pub fn forecasts(&self) -> &Arc<ForecastStore> {
        &self.forecasts
    }

    /// Current panel capacity (kW).
    pub const fn capacity_kw(&self) -> f64 {
        self.capacity_kw
    }

    /// Sequence number of the latest selection.
    pub const fn latest_sequence(&self) -> u64 {
        self.latest
    }

    /// Number of spawned requests whose completion has not been taken yet.
    pub const fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Selects `region` on `date` and starts its prediction.
    ///
    /// Publishes a `Pending` snapshot immediately and returns the sequence
    /// number tagging the request. Must be called within a Tokio runtime.
    pub fn select(&mut self, region: &str, date: &str) -> u64 {
        self.latest += 1;
        let sequence = self.latest;

        let location = self.catalog.lookup(region).cloned();
        let recorded = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .ok()
            .and_then(|d| self.forecasts.query(region, d))
            .cloned();
        if location.is_none() {
            debug!(region, "region not in catalog, using default location factor");
        }

        info!(sequence, region, date, "selection pending");
        self.publish(SelectionSnapshot {
            sequence,
            region: Some(region.to_string()),
            date: Some(date.to_string()),
            location,
            recorded,
            prediction: PredictionStatus::Pending,
            renewable: None,
        });

        let predictor = Arc::clone(&self.predictor);
        let done = self.done_tx.clone();
        let (region, date) = (region.to_string(), date.to_string());
        self.in_flight += 1;
        tokio::spawn(async move {
            let outcome = predictor.predict(&region, &date).await;
            // The coordinator may have been dropped; nothing left to update.
            let _ = done.send(Completion { sequence, outcome });
        });
        sequence
    }

    /// Re-issues the current selection under a new sequence number.
    ///
    /// Returns `None` when idle.
    pub fn retry(&mut self) -> Option<u64> {
        let region = self.current.region.clone()?;
        let date = self.current.date.clone()?;
        Some(self.select(&region, &date))
    }

    /// Returns to `Idle` and invalidates every in-flight request.
    ///
    /// Idle is published at most once; a reset while already idle only
    /// invalidates whatever is still in flight.
    pub fn reset(&mut self) {
        if self.current.prediction == PredictionStatus::Idle {
            if self.in_flight > 0 {
                self.latest += 1;
                debug!(sequence = self.latest, "reset while idle, in-flight work invalidated");
            }
            return;
        }
        self.latest += 1;
        info!(sequence = self.latest, "selection reset");
        self.publish(SelectionSnapshot::idle(self.latest));
    }

    /// Changes the panel capacity, clamped to 1–8 kW.
    ///
    /// When the current prediction is ready, a replacement snapshot with a
    /// recomputed estimate is published.
    pub fn set_capacity(&mut self, capacity_kw: f64) {
        let capacity_kw = renewable::clamp_capacity(capacity_kw);
        if capacity_kw == self.capacity_kw {
            return;
        }
        self.capacity_kw = capacity_kw;

        if let PredictionStatus::Ready(result) = &self.current.prediction {
            let estimate = self.estimate_for(result);
            let next = SelectionSnapshot {
                renewable: estimate,
                ..self.current.clone()
            };
            if next != self.current {
                self.publish(next);
            }
        }
    }

    /// Waits for the next request to finish and applies or discards it.
    ///
    /// Returns `None` immediately when nothing is in flight.
    pub async fn settle_next(&mut self) -> Option<Settlement> {
        if self.in_flight == 0 {
            return None;
        }
        let done = self.done_rx.recv().await?;
        Some(self.apply(done))
    }

    /// Drives the coordinator from a command channel until it closes.
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.handle(cmd),
                    None => break,
                },
                Some(done) = self.done_rx.recv() => {
                    self.apply(done);
                }
            }
        }
        debug!("command channel closed, coordinator stopping");
    }

    /// Applies one command synchronously.
    pub fn handle(&mut self, command: Command) {
        match command {
            Command::Select { region, date } => {
                self.select(&region, &date);
            }
            Command::Reset => self.reset(),
            Command::SetCapacity(kw) => self.set_capacity(kw),
            Command::Retry => {
                self.retry();
            }
        }
    }

    fn apply(&mut self, done: Completion) -> Settlement {
        self.in_flight = self.in_flight.saturating_sub(1);
        let sequence = done.sequence;
        if sequence != self.latest {
            debug!(sequence, latest = self.latest, "stale prediction discarded");
            return Settlement::Discarded { sequence };
        }

        let next = match done.outcome {
            Ok(result) => {
                let renewable = self.estimate_for(&result);
                info!(
                    sequence,
                    region = %result.region,
                    load_mw = result.load_mw,
                    "prediction ready"
                );
                SelectionSnapshot {
                    prediction: PredictionStatus::Ready(result),
                    renewable,
                    ..self.current.clone()
                }
            }
            Err(e) => {
                warn!(sequence, error = %e, "prediction failed");
                SelectionSnapshot {
                    prediction: PredictionStatus::Failed(e.kind()),
                    renewable: None,
                    ..self.current.clone()
                }
            }
        };
        self.publish(next);
        Settlement::Applied { sequence }
    }

    /// Estimate for a ready prediction using the selection's month and state.
    fn estimate_for(&self, result: &PredictionResult) -> Option<RenewableEstimate> {
        let state = self.current.location.as_ref().map(|r| r.state.as_str());
        match renewable::estimate(
            self.capacity_kw,
            result.date.month0(),
            state,
            result.price_inr_per_kwh,
        ) {
            Ok(est) => Some(est),
            Err(e) => {
                warn!(error = %e, "no renewable estimate for prediction");
                None
            }
        }
    }

    fn publish(&mut self, snapshot: SelectionSnapshot) {
        if snapshot == self.current {
            return;
        }
        self.current = snapshot;
        for listener in &mut self.listeners {
            listener.on_snapshot_change(&self.current);
        }
    }
}
