//! Historical and forecast load/price series keyed by (region, date).

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{Datelike, NaiveDate, NaiveTime};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::DataLoadError;

const DATE_COLUMNS: &[&str] = &["date", "ds"];
const REGION_COLUMNS: &[&str] = &["region", "district", "city"];
const LOAD_COLUMNS: &[&str] = &["load_kwh", "load_yhat_kwh"];
const PRICE_COLUMNS: &[&str] = &["price_inr_per_kwh", "price"];

/// One dataset row: load and price for a region on a day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastPoint {
    /// Region (city) identifier.
    pub region: String,
    /// Calendar day.
    pub date: NaiveDate,
    /// Load for the day (kWh).
    pub load_kwh: f64,
    /// Electricity price (INR/kWh).
    pub price_inr_per_kwh: f64,
}

/// Per-month load aggregate for one region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MonthlyLoad {
    /// Calendar year.
    pub year: i32,
    /// Calendar month, 1 = January.
    pub month: u32,
    /// Summed load (MWh).
    pub load_mwh: f64,
}

/// Immutable (region, date) index over the forecast dataset.
#[derive(Debug, Default)]
pub struct ForecastStore {
    points: HashMap<(String, NaiveDate), ForecastPoint>,
    dropped_rows: usize,
}

/// Column positions resolved from the header row.
struct Columns {
    date: usize,
    region: usize,
    load: usize,
    price: usize,
}

impl Columns {
    fn resolve(headers: &csv::StringRecord) -> Result<Self, DataLoadError> {
        let find = |aliases: &[&str], name: &'static str| {
            headers
                .iter()
                .position(|h| aliases.iter().any(|a| h.trim().eq_ignore_ascii_case(a)))
                .ok_or(DataLoadError::MissingColumn(name))
        };
        Ok(Self {
            date: find(DATE_COLUMNS, "date")?,
            region: find(REGION_COLUMNS, "region")?,
            load: find(LOAD_COLUMNS, "load_kwh")?,
            price: find(PRICE_COLUMNS, "price_inr_per_kwh")?,
        })
    }
}

impl ForecastStore {
    /// Loads the dataset from a CSV file.
    ///
    /// # Errors
    ///
    /// Returns a [`DataLoadError`] if the file cannot be opened or the header
    /// lacks a required column.
    pub fn load_from_path(path: &Path) -> Result<Self, DataLoadError> {
        let file = File::open(path).map_err(|source| DataLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::load(file)
    }

    /// Loads the dataset from any CSV reader.
    ///
    /// Rows with a blank region, an unparseable date, or a load/price that is
    /// missing or not a finite number are dropped and counted. A repeated
    /// (region, date) key keeps the first row; the repeat is counted as
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns a [`DataLoadError`] if the header cannot be read or lacks a
    /// required column.
    pub fn load(source: impl Read) -> Result<Self, DataLoadError> {
        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(source);
        let cols = Columns::resolve(rdr.headers()?)?;

        let mut store = Self::default();
        for (line, record) in rdr.records().enumerate() {
            let parsed = record
                .map_err(|e| e.to_string())
                .and_then(|r| parse_row(&r, &cols));
            match parsed {
                Ok(point) => {
                    let key = (point.region.clone(), point.date);
                    if store.points.contains_key(&key) {
                        debug!(
                            row = line + 1,
                            region = %key.0,
                            date = %key.1,
                            "duplicate key dropped"
                        );
                        store.dropped_rows += 1;
                    } else {
                        store.points.insert(key, point);
                    }
                }
                Err(reason) => {
                    debug!(row = line + 1, %reason, "row dropped");
                    store.dropped_rows += 1;
                }
            }
        }

        info!(
            points = store.points.len(),
            dropped = store.dropped_rows,
            "forecast dataset loaded"
        );
        Ok(store)
    }

    /// Number of indexed points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of rows dropped during load.
    pub fn dropped_rows(&self) -> usize {
        self.dropped_rows
    }

    /// Point for `region` on `date`. `None` means not found.
    pub fn query(&self, region: &str, date: NaiveDate) -> Option<&ForecastPoint> {
        self.points.get(&(region.to_string(), date))
    }

    /// Sorted distinct region ids present in the dataset.
    pub fn regions(&self) -> Vec<&str> {
        self.points
            .keys()
            .map(|(r, _)| r.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Every point for `region`, ordered by date.
    pub fn series(&self, region: &str) -> Vec<&ForecastPoint> {
        self.series_between(region, NaiveDate::MIN, NaiveDate::MAX)
    }

    /// Points for `region` with `from <= date <= to`, ordered by date.
    pub fn series_between(
        &self,
        region: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Vec<&ForecastPoint> {
        let mut out: Vec<&ForecastPoint> = self
            .points
            .values()
            .filter(|p| p.region == region && p.date >= from && p.date <= to)
            .collect();
        out.sort_by_key(|p| p.date);
        out
    }

    /// Load for `region` summed per calendar month, in MWh.
    pub fn monthly_load(&self, region: &str) -> Vec<MonthlyLoad> {
        let mut months: BTreeMap<(i32, u32), f64> = BTreeMap::new();
        for p in self.points.values().filter(|p| p.region == region) {
            *months.entry((p.date.year(), p.date.month())).or_default() += p.load_kwh / 1000.0;
        }
        months
            .into_iter()
            .map(|((year, month), load_mwh)| MonthlyLoad {
                year,
                month,
                load_mwh,
            })
            .collect()
    }
}

fn parse_row(record: &csv::StringRecord, cols: &Columns) -> Result<ForecastPoint, String> {
    let field = |i: usize, name: &str| {
        record
            .get(i)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| format!("missing {name}"))
    };
    let region = field(cols.region, "region")?;
    let date = parse_date(field(cols.date, "date")?)?;
    let load_kwh = parse_finite(field(cols.load, "load")?, "load")?;
    let price_inr_per_kwh = parse_finite(field(cols.price, "price")?, "price")?;
    Ok(ForecastPoint {
        region: region.to_string(),
        date,
        load_kwh,
        price_inr_per_kwh,
    })
}

/// Parses a zero-padded `YYYY-MM-DD` calendar date and nothing else.
///
/// ```
/// use gridcast::forecast::parse_calendar_date;
///
/// assert!(parse_calendar_date("2025-04-01").is_some());
/// assert!(parse_calendar_date("2025-4-1").is_none());
/// assert!(parse_calendar_date("2025-02-30").is_none());
/// ```
pub fn parse_calendar_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .filter(|d| d.format("%Y-%m-%d").to_string() == s)
}

/// Parses a dataset date: `YYYY-MM-DD`, optionally followed by a time of
/// day after a space or `T`. The time is checked and then discarded.
fn parse_date(s: &str) -> Result<NaiveDate, String> {
    let invalid = || format!("`{s}` is not a calendar date");
    let (day, time) = match s.find([' ', 'T']) {
        Some(i) => (&s[..i], Some(&s[i + 1..])),
        None => (s, None),
    };
    if let Some(time) = time {
        NaiveTime::parse_from_str(time, "%H:%M:%S%.f")
            .or_else(|_| NaiveTime::parse_from_str(time, "%H:%M"))
            .map_err(|_| invalid())?;
    }
    parse_calendar_date(day).ok_or_else(invalid)
}

fn parse_finite(s: &str, name: &str) -> Result<f64, String> {
    match s.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        Ok(v) => Err(format!("{name} {v} is not finite")),
        Err(e) => Err(format!("{name} `{s}`: {e}")),
    }
}
