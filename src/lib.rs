//! Region energy forecasts, live predictions, and rooftop solar estimates.

pub mod config;
pub mod error;
pub mod forecast;
pub mod gateway;
/// Region catalog and state boundaries.
pub mod geo;
pub mod renewable;
pub mod selection;

#[cfg(feature = "api")]
pub mod api;
