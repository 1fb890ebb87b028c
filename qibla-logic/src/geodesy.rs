//! Spherical geometry used to point at the qibla.
//!
//! Everything here is pure, angles are in degrees on the way in and out.
//! Whenever two angles are compared the difference goes through
//! [normalize_signed_degrees] so wrapping across 0°/360° or ±180° longitude
//! never produces a 358° "turn".

use serde::{Deserialize, Serialize};

use crate::location::{Coordinates, LocationComponent};

/// Mean radius of the Earth in kilometers
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Bearing differences smaller than this (in degrees) count as facing the target
pub const ALIGNED_TOLERANCE_DEGREES: f64 = 2.0;

/// Normalize any finite angle into `[0, 360)`
pub fn normalize_degrees(degrees: f64) -> f64 {
    let normalized = ((degrees % 360.0) + 360.0) % 360.0;
    // Tiny negative inputs round up to exactly 360 in the addition above
    if normalized >= 360.0 { 0.0 } else { normalized }
}

/// Normalize any finite angle into `(-180, 180]`, the shortest signed rotation
pub fn normalize_signed_degrees(degrees: f64) -> f64 {
    let normalized = normalize_degrees(degrees);
    if normalized > 180.0 {
        normalized - 360.0
    } else {
        normalized
    }
}

fn clamped_lat_radians(lat: LocationComponent) -> f64 {
    lat.clamp(-90.0, 90.0).to_radians()
}

/// Initial great-circle bearing from `from` to `to`, in `[0, 360)`
pub fn initial_bearing(from: Coordinates, to: Coordinates) -> f64 {
    let phi1 = clamped_lat_radians(from.lat);
    let phi2 = clamped_lat_radians(to.lat);
    let delta_long = normalize_signed_degrees(to.long - from.long).to_radians();

    let y = delta_long.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * delta_long.cos();

    normalize_degrees(y.atan2(x).to_degrees())
}

/// Great-circle distance between two points in kilometers (haversine)
pub fn great_circle_distance_km(from: Coordinates, to: Coordinates) -> f64 {
    let phi1 = clamped_lat_radians(from.lat);
    let phi2 = clamped_lat_radians(to.lat);
    let delta_lat = phi2 - phi1;
    // sin² of the half angle is 360° periodic, no wrapping needed
    let delta_long = (to.long - from.long).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_long / 2.0).sin().powi(2);
    // Rounding can push `a` a hair outside [0, 1] near antipodes
    let a = a.clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Signed rotation from `heading` to `bearing`, positive means the target is to the right
pub fn bearing_difference(heading: f64, bearing: f64) -> f64 {
    normalize_signed_degrees(bearing - heading)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
/// Bearing and distance from a fix to the target
pub struct BearingResult {
    /// Initial bearing in degrees, `[0, 360)`
    pub initial_bearing: f64,
    pub distance_km: f64,
}

impl BearingResult {
    pub fn between(from: Coordinates, to: Coordinates) -> Self {
        Self {
            initial_bearing: initial_bearing(from, to),
            distance_km: great_circle_distance_km(from, to),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
/// What the user should do to face the target
pub enum TurnGuidance {
    /// Within [ALIGNED_TOLERANCE_DEGREES] of the target
    Aligned,
    /// Turn clockwise by the given number of degrees
    TurnRight(f64),
    /// Turn counter-clockwise by the given number of degrees
    TurnLeft(f64),
}

impl TurnGuidance {
    /// Guidance for a signed difference as returned by [bearing_difference]
    pub fn from_difference(difference: f64) -> Self {
        let magnitude = difference.abs();
        if magnitude < ALIGNED_TOLERANCE_DEGREES {
            Self::Aligned
        } else if difference > 0.0 {
            Self::TurnRight(magnitude)
        } else {
            Self::TurnLeft(magnitude)
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
/// 8-point compass label
pub enum CardinalDirection {
    N,
    NE,
    E,
    SE,
    S,
    SW,
    W,
    NW,
}

impl CardinalDirection {
    const ALL: [Self; 8] = [
        Self::N,
        Self::NE,
        Self::E,
        Self::SE,
        Self::S,
        Self::SW,
        Self::W,
        Self::NW,
    ];

    /// Sector containing `bearing`, each sector is 45° wide and centred on its direction
    pub fn from_bearing(bearing: f64) -> Self {
        let sector = (normalize_degrees(bearing + 22.5) / 45.0).floor() as usize;
        Self::ALL[sector % Self::ALL.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::KAABA;

    fn coords(lat: f64, long: f64) -> Coordinates {
        Coordinates { lat, long }
    }

    fn assert_close(actual: f64, expected: f64, rel: f64) {
        let tolerance = expected.abs() * rel;
        assert!(
            (actual - expected).abs() <= tolerance,
            "Expected {expected} (±{tolerance}), got {actual}"
        );
    }

    #[test]
    fn test_normalize_degrees() {
        assert_eq!(normalize_degrees(370.0), 10.0);
        assert_eq!(normalize_degrees(-10.0), 350.0);
        assert_eq!(normalize_degrees(0.0), 0.0);
        assert_eq!(normalize_degrees(360.0), 0.0);
        assert_eq!(normalize_degrees(-360.0), 0.0);
        assert_eq!(normalize_degrees(720.0), 0.0);
        assert_eq!(normalize_degrees(-1e-20), 0.0);

        for x in [-1e9, -725.5, -359.999, -0.5, 0.0, 12.3, 359.999, 1e9] {
            let n = normalize_degrees(x);
            assert!((0.0..360.0).contains(&n), "{x} normalized to {n}");
        }
    }

    #[test]
    fn test_normalize_signed_degrees() {
        assert_eq!(normalize_signed_degrees(180.0), 180.0);
        assert_eq!(normalize_signed_degrees(-180.0), 180.0);
        assert_eq!(normalize_signed_degrees(181.0), -179.0);
        assert_eq!(normalize_signed_degrees(-340.0), 20.0);
        assert_eq!(normalize_signed_degrees(540.0), 180.0);

        for x in [-1e6, -540.0, -181.0, -0.1, 0.0, 90.0, 179.9, 1e6] {
            let n = normalize_signed_degrees(x);
            assert!(n > -180.0 && n <= 180.0, "{x} normalized to {n}");
        }
    }

    #[test]
    fn test_bearing_difference() {
        assert_eq!(bearing_difference(350.0, 10.0), 20.0);
        assert_eq!(bearing_difference(10.0, 350.0), -20.0);
        assert_eq!(bearing_difference(90.0, 90.0), 0.0);
        assert_eq!(bearing_difference(0.0, 180.0), 180.0);
    }

    #[test]
    fn test_distance_same_point() {
        for p in [coords(0.0, 0.0), coords(90.0, 0.0), coords(-33.9, 151.2), KAABA] {
            let d = great_circle_distance_km(p, p);
            assert_eq!(d, 0.0, "Distance from {p:?} to itself was {d}");
        }
    }

    #[test]
    fn test_distance_symmetric() {
        let pairs = [
            (coords(51.5074, -0.1278), KAABA),
            (coords(40.7128, -74.006), coords(-33.8688, 151.2093)),
            (coords(0.0, -179.5), coords(0.0, 179.5)),
        ];
        for (a, b) in pairs {
            let there = great_circle_distance_km(a, b);
            let back = great_circle_distance_km(b, a);
            assert!((there - back).abs() < 1e-9, "{there} != {back}");
        }
    }

    #[test]
    fn test_distance_antipodal_and_wrap() {
        let d = great_circle_distance_km(coords(0.0, 0.0), coords(0.0, 180.0));
        assert!(d.is_finite());
        assert_close(d, std::f64::consts::PI * EARTH_RADIUS_KM, 1e-9);

        // One degree of longitude on the equator, across the antimeridian
        let d = great_circle_distance_km(coords(0.0, -179.5), coords(0.0, 179.5));
        assert_close(d, 111.194_926_644, 1e-4);
    }

    #[test]
    fn test_kaaba_fixture() {
        let from = coords(21.0, 40.0);
        let result = BearingResult::between(from, KAABA);

        assert!(result.distance_km < 60.0);
        assert_close(result.distance_km, 50.315_962, 1e-4);
        assert_close(result.initial_bearing, 339.049_945, 1e-4);
        // Just west of north
        assert_eq!(
            CardinalDirection::from_bearing(result.initial_bearing),
            CardinalDirection::N
        );
    }

    #[test]
    fn test_known_cities() {
        let london = BearingResult::between(coords(51.5074, -0.1278), KAABA);
        assert_close(london.initial_bearing, 118.987_219, 1e-4);
        assert_close(london.distance_km, 4793.775, 1e-4);

        let new_york = BearingResult::between(coords(40.7128, -74.006), KAABA);
        assert_close(new_york.initial_bearing, 58.481_701, 1e-4);
        assert_close(new_york.distance_km, 10306.306, 1e-4);
    }

    #[test]
    fn test_bearing_from_poles() {
        for pole in [coords(90.0, 0.0), coords(-90.0, 0.0)] {
            let bearing = initial_bearing(pole, KAABA);
            assert!(
                bearing.is_finite() && (0.0..360.0).contains(&bearing),
                "Bearing from {pole:?} was {bearing}"
            );
            let distance = great_circle_distance_km(pole, KAABA);
            assert!(distance.is_finite() && distance > 0.0);
        }

        // Out of range latitudes are clamped rather than producing NaN
        assert!(initial_bearing(coords(95.0, 0.0), KAABA).is_finite());
    }

    #[test]
    fn test_turn_guidance() {
        assert_eq!(TurnGuidance::from_difference(0.0), TurnGuidance::Aligned);
        assert_eq!(TurnGuidance::from_difference(-1.9), TurnGuidance::Aligned);
        assert_eq!(
            TurnGuidance::from_difference(20.0),
            TurnGuidance::TurnRight(20.0)
        );
        assert_eq!(
            TurnGuidance::from_difference(-45.0),
            TurnGuidance::TurnLeft(45.0)
        );
        assert_eq!(
            TurnGuidance::from_difference(2.0),
            TurnGuidance::TurnRight(2.0)
        );
    }

    #[test]
    fn test_cardinal_directions() {
        assert_eq!(CardinalDirection::from_bearing(0.0), CardinalDirection::N);
        assert_eq!(CardinalDirection::from_bearing(359.0), CardinalDirection::N);
        assert_eq!(CardinalDirection::from_bearing(22.4), CardinalDirection::N);
        assert_eq!(CardinalDirection::from_bearing(22.5), CardinalDirection::NE);
        assert_eq!(CardinalDirection::from_bearing(90.0), CardinalDirection::E);
        assert_eq!(CardinalDirection::from_bearing(200.0), CardinalDirection::S);
        assert_eq!(CardinalDirection::from_bearing(-90.0), CardinalDirection::W);
        assert_eq!(CardinalDirection::from_bearing(337.5), CardinalDirection::N);
    }
}
