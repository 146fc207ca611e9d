//! Request and response bodies of the control endpoints.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use tc_core::Rhythm;
use tc_core::config::TuningConfig;
use tc_core::error::TcError;

/// Range the producer clamps sensitivity into.
pub const SENSITIVITY_RANGE: RangeInclusive<f64> = 0.1..=10.0;
/// Range the producer clamps the price-noise multiplier into.
pub const PRICE_NOISE_RANGE: RangeInclusive<f64> = 0.1..=5.0;

fn clamp_to(value: f64, range: &RangeInclusive<f64>, fallback: f64) -> f64 {
    if value.is_finite() {
        value.clamp(*range.start(), *range.end())
    } else {
        fallback
    }
}

/// `POST /config` body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConfigRequest {
    pub sensitivity: f64,
    pub price_noise: f64,
    pub soprano_rhythm: Rhythm,
}

impl ConfigRequest {
    /// Build a request with the same clamping the producer applies.
    pub fn new(sensitivity: f64, price_noise: f64, soprano_rhythm: Rhythm) -> Self {
        Self {
            sensitivity: clamp_to(sensitivity, &SENSITIVITY_RANGE, 1.0),
            price_noise: clamp_to(price_noise, &PRICE_NOISE_RANGE, 1.0),
            soprano_rhythm,
        }
    }

    pub fn from_tuning(tuning: &TuningConfig) -> Result<Self, TcError> {
        let steps = tuning.soprano_rhythm;
        let Some(rhythm) = Rhythm::from_steps(steps) else {
            return Err(TcError::Config(format!(
                "soprano_rhythm must be 4, 8 or 16 (got {steps})"
            )));
        };
        Ok(Self::new(tuning.sensitivity, tuning.price_noise, rhythm))
    }
}

/// `POST /config` response: the values the producer applied.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConfigResponse {
    pub sensitivity: f64,
    #[serde(default)]
    pub qqq_step_pct: Option<f64>,
    #[serde(default)]
    pub spy_step_pct: Option<f64>,
    pub price_noise: f64,
    pub soprano_rhythm: u8,
}

impl ConfigResponse {
    /// The echoed rhythm, if it is one the client understands.
    pub fn rhythm(&self) -> Option<Rhythm> {
        Rhythm::from_steps(self.soprano_rhythm)
    }
}

/// `GET /build` response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BuildInfo {
    pub build_id: String,
    #[serde(default)]
    pub server_path: Option<String>,
    #[serde(default)]
    pub server_time: Option<String>,
}
