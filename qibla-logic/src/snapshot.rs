use serde::{Deserialize, Serialize};

use crate::{
    geodesy::{BearingResult, CardinalDirection, TurnGuidance, bearing_difference, normalize_degrees},
    location::{Coordinates, Fix},
    status::QiblaStatus,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// Everything the compass screen needs at one instant. Never mutated, every change produces a
/// new one through [reduce].
pub struct QiblaSnapshot {
    /// Where the compass points, fixed per session
    pub target: Coordinates,
    /// Device heading in `[0, 360)`
    pub heading: Option<f32>,
    /// Initial bearing from [QiblaSnapshot::fix] to the target, present iff there's a fix
    pub bearing: Option<f64>,
    /// Signed turn from heading to bearing, needs both
    pub bearing_difference: Option<f64>,
    pub fix: Option<Fix>,
    /// Last resolved "City, Country", may be from the cache and older than the fix
    pub place_name: Option<String>,
    /// Distance to the target, present iff there's a fix
    pub distance_km: Option<f64>,
    pub status: QiblaStatus,
}

#[derive(Debug, Clone, PartialEq)]
/// A change to one input of a [QiblaSnapshot]
pub enum SnapshotEvent {
    HeadingChanged(Option<f32>),
    FixChanged(Option<Fix>),
    /// [None] means the lookup failed, which leaves the name alone
    PlaceNameResolved(Option<String>),
    StatusChanged(QiblaStatus),
}

/// Drop non-finite headings and bring the rest into `[0, 360)`
fn sanitize_heading(heading: Option<f32>) -> Option<f32> {
    let heading = heading.filter(|h| h.is_finite())?;
    let normalized = normalize_degrees(heading as f64) as f32;
    // Values just under 360 can round up when narrowed back to f32
    Some(if normalized >= 360.0 { 0.0 } else { normalized })
}

impl QiblaSnapshot {
    /// Build a snapshot from scratch, deriving the geometry from `fix` and `heading`
    pub fn assemble(
        target: Coordinates,
        heading: Option<f32>,
        fix: Option<Fix>,
        place_name: Option<String>,
        status: QiblaStatus,
    ) -> Self {
        let heading = sanitize_heading(heading);
        let result = fix
            .as_ref()
            .map(|fix| BearingResult::between(fix.coords, target));
        let bearing = result.map(|r| r.initial_bearing);
        let difference = heading
            .zip(bearing)
            .map(|(heading, bearing)| bearing_difference(heading as f64, bearing));

        Self {
            target,
            heading,
            bearing,
            bearing_difference: difference,
            fix,
            place_name,
            distance_km: result.map(|r| r.distance_km),
            status,
        }
    }

    /// Nothing known yet
    pub fn empty(target: Coordinates, status: QiblaStatus) -> Self {
        Self::assemble(target, None, None, None, status)
    }

    pub fn turn_guidance(&self) -> Option<TurnGuidance> {
        self.bearing_difference.map(TurnGuidance::from_difference)
    }

    pub fn cardinal_direction(&self) -> Option<CardinalDirection> {
        self.bearing.map(CardinalDirection::from_bearing)
    }

    /// The part of the place name before the first comma, usually the city
    pub fn short_place_name(&self) -> Option<&str> {
        self.place_name
            .as_deref()
            .and_then(|name| name.split(',').next())
            .map(str::trim)
    }
}

/// Apply one input change to `previous`, recomputing whatever depends on it
pub fn reduce(previous: &QiblaSnapshot, event: SnapshotEvent) -> QiblaSnapshot {
    let mut heading = previous.heading;
    let mut fix = previous.fix.clone();
    let mut place_name = previous.place_name.clone();
    let mut status = previous.status;

    match event {
        SnapshotEvent::HeadingChanged(new_heading) => heading = new_heading,
        SnapshotEvent::FixChanged(new_fix) => fix = new_fix,
        SnapshotEvent::PlaceNameResolved(Some(name)) => place_name = Some(name),
        SnapshotEvent::PlaceNameResolved(None) => {}
        SnapshotEvent::StatusChanged(new_status) => status = new_status,
    }

    QiblaSnapshot::assemble(previous.target, heading, fix, place_name, status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{location::KAABA, tests::mk_fix};

    fn base() -> QiblaSnapshot {
        QiblaSnapshot::empty(KAABA, QiblaStatus::Calibrating)
    }

    #[test]
    fn test_geometry_only_with_fix() {
        let snapshot = reduce(&base(), SnapshotEvent::HeadingChanged(Some(90.0)));
        assert_eq!(snapshot.heading, Some(90.0));
        assert!(snapshot.bearing.is_none());
        assert!(snapshot.distance_km.is_none());
        assert!(snapshot.bearing_difference.is_none());
        assert!(snapshot.turn_guidance().is_none());

        let snapshot = reduce(
            &snapshot,
            SnapshotEvent::FixChanged(Some(mk_fix(21.0, 40.0, 1, "gps"))),
        );
        let bearing = snapshot.bearing.expect("No bearing with a fix");
        assert!((bearing - 339.05).abs() < 0.01);
        assert!(snapshot.distance_km.expect("No distance") < 60.0);
        let difference = snapshot.bearing_difference.expect("No difference");
        assert!((difference - -110.95).abs() < 0.01, "Difference was {difference}");
        assert!(matches!(
            snapshot.turn_guidance(),
            Some(TurnGuidance::TurnLeft(_))
        ));
        assert_eq!(snapshot.cardinal_direction(), Some(CardinalDirection::N));

        let cleared = reduce(&snapshot, SnapshotEvent::FixChanged(None));
        assert!(cleared.bearing.is_none());
        assert!(cleared.distance_km.is_none());
        assert!(cleared.bearing_difference.is_none());
        assert_eq!(cleared.heading, Some(90.0));
    }

    #[test]
    fn test_failed_place_name_keeps_previous() {
        let snapshot = reduce(
            &base(),
            SnapshotEvent::PlaceNameResolved(Some("Mecca, Saudi Arabia".into())),
        );
        let snapshot = reduce(&snapshot, SnapshotEvent::PlaceNameResolved(None));
        assert_eq!(snapshot.place_name.as_deref(), Some("Mecca, Saudi Arabia"));
        assert_eq!(snapshot.short_place_name(), Some("Mecca"));

        let snapshot = reduce(
            &snapshot,
            SnapshotEvent::PlaceNameResolved(Some("Jeddah, Saudi Arabia".into())),
        );
        assert_eq!(snapshot.short_place_name(), Some("Jeddah"));
    }

    #[test]
    fn test_reduce_leaves_previous_untouched() {
        let before = base();
        let after = reduce(&before, SnapshotEvent::StatusChanged(QiblaStatus::Ok));
        assert_eq!(before.status, QiblaStatus::Calibrating);
        assert_eq!(after.status, QiblaStatus::Ok);
    }

    #[test]
    fn test_heading_sanitized() {
        let snapshot = reduce(&base(), SnapshotEvent::HeadingChanged(Some(-10.0)));
        assert_eq!(snapshot.heading, Some(350.0));

        let snapshot = reduce(&snapshot, SnapshotEvent::HeadingChanged(Some(f32::NAN)));
        assert!(snapshot.heading.is_none());

        let snapshot = reduce(&snapshot, SnapshotEvent::HeadingChanged(Some(720.0)));
        assert_eq!(snapshot.heading, Some(0.0));
    }

    #[test]
    fn test_wraparound_difference() {
        let fix = mk_fix(21.0, 40.0, 1, "gps");
        let snapshot = QiblaSnapshot::assemble(
            KAABA,
            Some(350.0),
            Some(fix),
            None,
            QiblaStatus::Ok,
        );
        let difference = snapshot.bearing_difference.expect("No difference");
        // Bearing ~339°, heading 350° is just to the right of it
        assert!((difference - -10.95).abs() < 0.01, "Difference was {difference}");
    }
}
