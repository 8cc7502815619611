//! Region catalog: cities with coordinates and parent state, plus state outlines.

mod boundary;

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;

use geo::{Distance, Haversine, Point};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{info, warn};

pub use boundary::StateBoundary;

use crate::error::DataLoadError;

/// Filter value meaning "every state".
pub const ALL_STATES: &str = "All";

/// A named service area (city) with coordinates and parent state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Region {
    /// City name; unique within a catalog.
    pub id: String,
    /// Parent state name.
    pub state: String,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

/// Which input an entry was skipped from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// The city catalog array.
    Cities,
    /// The boundary feature collection.
    Boundaries,
}

/// An individual entry dropped during load.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedEntry {
    /// Source the entry came from.
    pub source: SourceKind,
    /// Zero-based position of the entry within its source.
    pub index: usize,
    /// Why the entry was dropped.
    pub reason: String,
}

/// Immutable index of regions and state boundaries, built once at startup.
#[derive(Debug, Default)]
pub struct GeoCatalog {
    regions: Vec<Region>,
    by_id: HashMap<String, usize>,
    boundaries: Vec<StateBoundary>,
    skipped: Vec<SkippedEntry>,
}

impl GeoCatalog {
    /// Loads the catalog from a boundary GeoJSON file and a city JSON file.
    ///
    /// # Errors
    ///
    /// Returns a [`DataLoadError`] if either file cannot be read or is not of
    /// the expected top-level shape. Malformed individual entries are skipped
    /// and listed in [`GeoCatalog::skipped`].
    pub fn load_from_paths(boundaries: &Path, cities: &Path) -> Result<Self, DataLoadError> {
        let read = |path: &Path| {
            fs::read_to_string(path).map_err(|source| DataLoadError::Io {
                path: path.to_path_buf(),
                source,
            })
        };
        let geometry = read(boundaries)?;
        let catalog = read(cities)?;
        Self::from_json_strs(&geometry, &catalog)
    }

    /// Loads the catalog from in-memory JSON documents.
    ///
    /// # Errors
    ///
    /// Same as [`GeoCatalog::load_from_paths`], minus I/O failures.
    pub fn from_json_strs(boundaries: &str, cities: &str) -> Result<Self, DataLoadError> {
        let geometry: Value =
            serde_json::from_str(boundaries).map_err(|source| DataLoadError::Json {
                what: "boundary geometry",
                source,
            })?;
        let catalog: Value = serde_json::from_str(cities).map_err(|source| DataLoadError::Json {
            what: "city catalog",
            source,
        })?;

        let features = geometry
            .get("features")
            .and_then(Value::as_array)
            .ok_or_else(|| DataLoadError::Malformed {
                what: "boundary geometry",
                message: "expected a FeatureCollection with a `features` array".to_string(),
            })?;
        let entries = catalog.as_array().ok_or_else(|| DataLoadError::Malformed {
            what: "city catalog",
            message: "expected a top-level array".to_string(),
        })?;

        let mut out = Self::default();

        for (index, feature) in features.iter().enumerate() {
            match StateBoundary::from_feature(feature) {
                Ok(b) => out.boundaries.push(b),
                Err(reason) => out.skip(SourceKind::Boundaries, index, reason),
            }
        }

        for (index, entry) in entries.iter().enumerate() {
            match parse_city(entry) {
                Ok(region) if out.by_id.contains_key(&region.id) => {
                    let reason = format!("duplicate city `{}`", region.id);
                    out.skip(SourceKind::Cities, index, reason);
                }
                Ok(region) => {
                    out.by_id.insert(region.id.clone(), out.regions.len());
                    out.regions.push(region);
                }
                Err(reason) => out.skip(SourceKind::Cities, index, reason),
            }
        }

        info!(
            regions = out.regions.len(),
            boundaries = out.boundaries.len(),
            skipped = out.skipped.len(),
            "geo catalog loaded"
        );
        Ok(out)
    }

    fn skip(&mut self, source: SourceKind, index: usize, reason: String) {
        warn!(?source, index, %reason, "skipping catalog entry");
        self.skipped.push(SkippedEntry {
            source,
            index,
            reason,
        });
    }

    /// All regions in source order.
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// All parsed state boundaries.
    pub fn boundaries(&self) -> &[StateBoundary] {
        &self.boundaries
    }

    /// Entries dropped during load.
    pub fn skipped(&self) -> &[SkippedEntry] {
        &self.skipped
    }

    /// Finds a region by city name. `None` means not found.
    pub fn lookup(&self, id: &str) -> Option<&Region> {
        self.by_id.get(id).and_then(|&i| self.regions.get(i))
    }

    /// Sorted, de-duplicated state names of this catalog's regions.
    pub fn states(&self) -> Vec<String> {
        states_of(&self.regions)
    }

    /// Regions belonging to `state`, sorted by id.
    ///
    /// `None` or [`ALL_STATES`] returns every region.
    pub fn regions_in_state(&self, state: Option<&str>) -> Vec<&Region> {
        let mut out: Vec<&Region> = self
            .regions
            .iter()
            .filter(|r| match state {
                None | Some(ALL_STATES) => true,
                Some(s) => r.state == s,
            })
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// Name of the state whose outline contains the point, if any.
    pub fn state_at(&self, latitude: f64, longitude: f64) -> Option<&str> {
        self.boundaries
            .iter()
            .find(|b| b.contains(latitude, longitude))
            .map(|b| b.state.as_str())
    }

    /// Region closest to the point by great-circle distance.
    pub fn nearest(&self, latitude: f64, longitude: f64) -> Option<&Region> {
        let origin = Point::new(longitude, latitude);
        let meters = |r: &Region| Haversine.distance(origin, Point::new(r.longitude, r.latitude));
        self.regions
            .iter()
            .min_by(|a, b| meters(*a).total_cmp(&meters(*b)))
    }
}

/// Sorted set of distinct state names, used to populate the state filter.
pub fn states_of(regions: &[Region]) -> Vec<String> {
    regions
        .iter()
        .map(|r| r.state.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// One element of the city catalog array.
#[derive(Debug, Deserialize)]
struct CityEntry {
    city: String,
    state: String,
    #[serde(deserialize_with = "coordinate")]
    latitude: f64,
    #[serde(deserialize_with = "coordinate")]
    longitude: f64,
}

/// Accepts a coordinate given as a JSON number or numeric string.
fn coordinate<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("`{s}` is not a number"))),
    }
}

fn parse_city(entry: &Value) -> Result<Region, String> {
    let entry = CityEntry::deserialize(entry).map_err(|e| e.to_string())?;
    let id = entry.city.trim();
    let state = entry.state.trim();
    if id.is_empty() {
        return Err("blank `city`".to_string());
    }
    if state.is_empty() {
        return Err("blank `state`".to_string());
    }
    check_range("latitude", entry.latitude, 90.0)?;
    check_range("longitude", entry.longitude, 180.0)?;
    Ok(Region {
        id: id.to_string(),
        state: state.to_string(),
        latitude: entry.latitude,
        longitude: entry.longitude,
    })
}

fn check_range(key: &str, value: f64, limit: f64) -> Result<(), String> {
    if !value.is_finite() || value.abs() > limit {
        return Err(format!("`{key}` {value} is outside ±{limit}"));
    }
    Ok(())
}
