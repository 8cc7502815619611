//! Rooftop solar generation and savings estimate.
//!
//! The estimate is a pure function of panel capacity, calendar month, state,
//! and electricity price. Both factor tables are static configuration data.

use serde::Serialize;

use crate::error::InvalidInput;

/// Smallest panel capacity offered to the user (kW).
pub const MIN_CAPACITY_KW: f64 = 1.0;
/// Largest panel capacity offered to the user (kW).
pub const MAX_CAPACITY_KW: f64 = 8.0;

/// Peak-sun-hours per installed kW on a reference day.
const PEAK_SUN_HOURS: f64 = 4.0;

/// Month-of-year multiplier, January first.
pub const SEASONAL_FACTOR: [f64; 12] = [
    0.8, 0.85, 0.95, 1.1, 1.2, 1.1, 1.0, 0.9, 0.95, 0.9, 0.85, 0.8,
];

/// Multiplier applied when the state is absent or not in [`GEO_FACTOR`].
pub const DEFAULT_GEO_FACTOR: f64 = 1.0;

/// Location multiplier keyed by state name, as spelled in the city catalog.
pub const GEO_FACTOR: &[(&str, f64)] = &[
    ("Rājasthān", 1.2),
    ("Gujarāt", 1.15),
    ("Mahārāshtra", 1.1),
    ("Karnātaka", 1.05),
    ("Andhra Pradesh", 1.05),
    ("Telangana", 1.05),
    ("Tamil Nādu", 1.0),
    ("Kerala", 0.95),
    ("Odisha", 0.95),
    ("West Bengal", 0.9),
    ("Jharkhand", 0.9),
    ("Bihār", 0.85),
    ("Uttar Pradesh", 0.85),
    ("Madhya Pradesh", 1.0),
    ("Chhattīsgarh", 0.95),
    ("Haryāna", 0.9),
    ("Punjab", 0.9),
    ("Uttarakhand", 0.8),
    ("Himāchal Pradesh", 0.75),
    ("Jammu and Kashmīr", 0.7),
    ("Delhi", 0.9),
    ("Chandīgarh", 0.9),
    ("Assam", 0.8),
    ("Tripura", 0.8),
    ("Mizoram", 0.8),
    ("Manipur", 0.8),
    ("Nāgāland", 0.8),
    ("Meghālaya", 0.75),
    ("Sikkim", 0.7),
    ("Arunāchal Pradesh", 0.75),
    ("Goa", 1.0),
    ("Puducherry", 1.0),
    ("Andaman and Nicobar Islands", 1.0),
    ("Lakshadweep", 1.1),
];

/// Derived solar metrics for one panel capacity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RenewableEstimate {
    /// Installed panel capacity (kW).
    pub panel_capacity_kw: f64,
    /// Expected generation per day (kWh).
    pub daily_generation_kwh: f64,
    /// Expected savings per day (INR).
    pub daily_savings_inr: f64,
}

/// Looks up the location multiplier for a state.
///
/// Returns [`DEFAULT_GEO_FACTOR`] for `None` and for unmapped names.
pub fn geo_factor(state: Option<&str>) -> f64 {
    state
        .and_then(|s| GEO_FACTOR.iter().find(|(name, _)| *name == s))
        .map_or(DEFAULT_GEO_FACTOR, |(_, factor)| *factor)
}

/// Clamps a user-chosen capacity to the offered range.
///
/// Non-finite input falls back to [`MIN_CAPACITY_KW`].
pub fn clamp_capacity(capacity_kw: f64) -> f64 {
    if capacity_kw.is_finite() {
        capacity_kw.clamp(MIN_CAPACITY_KW, MAX_CAPACITY_KW)
    } else {
        MIN_CAPACITY_KW
    }
}

/// Estimates daily solar generation and savings.
///
/// `daily_generation = capacity_kw * 4 * SEASONAL_FACTOR[month] * geo_factor(state)`
/// and `daily_savings = daily_generation * price_per_kwh`.
///
/// # Arguments
///
/// * `capacity_kw` - Installed capacity; callers clamp it with [`clamp_capacity`]
/// * `month` - Zero-based month index (0 = January)
/// * `state` - State of the selected region, `None` for the default factor
/// * `price_per_kwh` - Electricity price (INR/kWh)
///
/// # Errors
///
/// Returns [`InvalidInput`] if capacity is not a positive finite number, the
/// month is outside `0..=11`, or the price is negative or non-finite.
///
/// # Examples
///
/// ```
/// use gridcast::renewable::estimate;
///
/// let est = estimate(4.0, 2, Some("Rājasthān"), 8.0).unwrap();
/// assert!((est.daily_generation_kwh - 18.24).abs() < 1e-9);
/// assert!((est.daily_savings_inr - 145.92).abs() < 1e-9);
/// ```
pub fn estimate(
    capacity_kw: f64,
    month: u32,
    state: Option<&str>,
    price_per_kwh: f64,
) -> Result<RenewableEstimate, InvalidInput> {
    if !capacity_kw.is_finite() || capacity_kw <= 0.0 {
        return Err(InvalidInput::new(
            "capacity_kw",
            format!("must be a positive number, got {capacity_kw}"),
        ));
    }
    let seasonal = usize::try_from(month)
        .ok()
        .and_then(|m| SEASONAL_FACTOR.get(m))
        .copied()
        .ok_or_else(|| InvalidInput::new("month", format!("must be in 0..=11, got {month}")))?;
    if !price_per_kwh.is_finite() || price_per_kwh < 0.0 {
        return Err(InvalidInput::new(
            "price_per_kwh",
            format!("must be a non-negative number, got {price_per_kwh}"),
        ));
    }

    let daily_generation_kwh = capacity_kw * PEAK_SUN_HOURS * seasonal * geo_factor(state);
    Ok(RenewableEstimate {
        panel_capacity_kw: capacity_kw,
        daily_generation_kwh,
        daily_savings_inr: daily_generation_kwh * price_per_kwh,
    })
}
