//! Distance units.
//!
//! Everything is stored in kilometers; miles are only accepted at the edge
//! and converted immediately.

use serde::{Deserialize, Serialize};

use super::types::SquadError;

/// Kilometers in one statute mile.
pub const KM_PER_MILE: f64 = 1.60934;

/// Convert miles to kilometers.
pub fn miles_to_km(miles: f64) -> f64 {
    miles * KM_PER_MILE
}

/// Convert kilometers to miles.
pub fn km_to_miles(km: f64) -> f64 {
    km / KM_PER_MILE
}

/// Unit a distance was entered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DistanceUnit {
    #[default]
    #[serde(rename = "km")]
    Kilometers,
    #[serde(rename = "mi")]
    Miles,
}

impl DistanceUnit {
    /// Storage code.
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceUnit::Kilometers => "km",
            DistanceUnit::Miles => "mi",
        }
    }

    /// Parse a storage code.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "km" => Some(DistanceUnit::Kilometers),
            "mi" => Some(DistanceUnit::Miles),
            _ => None,
        }
    }

    /// Normalize a value in this unit to kilometers.
    ///
    /// Rejects negative and non-finite input.
    pub fn to_km(&self, value: f64) -> Result<f64, SquadError> {
        if !value.is_finite() || value < 0.0 {
            return Err(SquadError::InvalidDistance(value));
        }
        Ok(match self {
            DistanceUnit::Kilometers => value,
            DistanceUnit::Miles => miles_to_km(value),
        })
    }

    /// Express a kilometer value in this unit.
    pub fn from_km(&self, km: f64) -> f64 {
        match self {
            DistanceUnit::Kilometers => km,
            DistanceUnit::Miles => km_to_miles(km),
        }
    }
}

impl std::fmt::Display for DistanceUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DistanceUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(&s.to_ascii_lowercase())
            .ok_or_else(|| format!("unknown distance unit '{s}', expected km or mi"))
    }
}
