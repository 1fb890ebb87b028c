use anyhow::ensure;
use serde::{Deserialize, Serialize};

use crate::prelude::*;

/// A "part" of a location
pub type LocationComponent = f64;

/// Coordinates of the Kaaba in Mecca
pub const KAABA: Coordinates = Coordinates {
    lat: 21.4225,
    long: 39.8262,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
/// A point on the globe, in degrees
pub struct Coordinates {
    /// Latitude, -90 to 90
    pub lat: LocationComponent,
    /// Longitude, -180 to 180
    pub long: LocationComponent,
}

impl Coordinates {
    /// Create checked coordinates, fails on non-finite or out of range components
    pub fn new(lat: LocationComponent, long: LocationComponent) -> Result<Self> {
        ensure!(
            lat.is_finite() && (-90.0..=90.0).contains(&lat),
            "Latitude {lat} is out of range"
        );
        ensure!(
            long.is_finite() && (-180.0..=180.0).contains(&long),
            "Longitude {long} is out of range"
        );
        Ok(Self { lat, long })
    }

    pub fn is_valid(&self) -> bool {
        Self::new(self.lat, self.long).is_ok()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// A single position observation as reported by a provider (or rebuilt from the cache)
pub struct Fix {
    pub coords: Coordinates,
    /// Time of the observation as Unix epoch milliseconds, 0 if unknown
    pub timestamp_ms: u64,
    /// Name of the provider that produced this fix
    pub provider: String,
}

impl Fix {
    pub fn new(coords: Coordinates, timestamp_ms: u64, provider: impl Into<String>) -> Self {
        Self {
            coords,
            timestamp_ms,
            provider: provider.into(),
        }
    }

    pub fn lat(&self) -> LocationComponent {
        self.coords.lat
    }

    pub fn long(&self) -> LocationComponent {
        self.coords.long
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinates_validation() {
        assert!(Coordinates::new(21.0, 40.0).is_ok());
        assert!(Coordinates::new(90.0, -180.0).is_ok());
        assert!(Coordinates::new(90.1, 0.0).is_err());
        assert!(Coordinates::new(0.0, 180.5).is_err());
        assert!(Coordinates::new(f64::NAN, 0.0).is_err());
        assert!(Coordinates::new(0.0, f64::INFINITY).is_err());
        assert!(KAABA.is_valid());
    }
}
