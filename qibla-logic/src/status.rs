use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Coarse state of the compass, exactly one applies at a time
pub enum QiblaStatus {
    Ok,
    Calibrating,
    LowAccuracy,
    NoSensor,
    LocationDenied,
    LocationDisabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Problems reported by the heading source itself
pub enum SensorStatus {
    /// The heading is available but unreliable
    LowAccuracy,
    /// The device has no usable heading sensor
    NoSensor,
}

impl From<SensorStatus> for QiblaStatus {
    fn from(value: SensorStatus) -> Self {
        match value {
            SensorStatus::LowAccuracy => Self::LowAccuracy,
            SensorStatus::NoSensor => Self::NoSensor,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// Everything [classify] looks at
pub struct StatusInputs {
    pub has_permission: bool,
    /// At least one provider is switched on
    pub location_enabled: bool,
    pub has_fix: bool,
    pub has_heading: bool,
    pub sensor: Option<SensorStatus>,
}

/// Pick the status for `inputs`, first match wins:
///
/// 1. no permission: [QiblaStatus::LocationDenied]
/// 2. no enabled provider: [QiblaStatus::LocationDisabled]
/// 3. heading source problem: passed through as is. Checked before the fix and heading, so
///    a missing fix with [SensorStatus::LowAccuracy] reports [QiblaStatus::LowAccuracy]
/// 4. no fix: [QiblaStatus::Calibrating]
/// 5. no heading: [QiblaStatus::Calibrating]
/// 6. [QiblaStatus::Ok]
pub fn classify(inputs: &StatusInputs) -> QiblaStatus {
    if !inputs.has_permission {
        QiblaStatus::LocationDenied
    } else if !inputs.location_enabled {
        QiblaStatus::LocationDisabled
    } else if let Some(sensor) = inputs.sensor {
        sensor.into()
    } else if !inputs.has_fix || !inputs.has_heading {
        QiblaStatus::Calibrating
    } else {
        QiblaStatus::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_inputs() -> impl Iterator<Item = StatusInputs> {
        let sensors = [None, Some(SensorStatus::LowAccuracy), Some(SensorStatus::NoSensor)];
        (0..16u8).flat_map(move |bits| {
            sensors.into_iter().map(move |sensor| StatusInputs {
                has_permission: bits & 1 != 0,
                location_enabled: bits & 2 != 0,
                has_fix: bits & 4 != 0,
                has_heading: bits & 8 != 0,
                sensor,
            })
        })
    }

    #[test]
    fn test_priority_order() {
        for inputs in all_inputs() {
            let status = classify(&inputs);
            let expected = if !inputs.has_permission {
                QiblaStatus::LocationDenied
            } else if !inputs.location_enabled {
                QiblaStatus::LocationDisabled
            } else if let Some(sensor) = inputs.sensor {
                QiblaStatus::from(sensor)
            } else if !(inputs.has_fix && inputs.has_heading) {
                QiblaStatus::Calibrating
            } else {
                QiblaStatus::Ok
            };
            assert_eq!(status, expected, "Wrong status for {inputs:?}");
        }
    }

    #[test]
    fn test_denied_beats_everything() {
        for inputs in all_inputs().filter(|i| !i.has_permission) {
            assert_eq!(classify(&inputs), QiblaStatus::LocationDenied);
        }
    }

    #[test]
    fn test_disabled_beats_fix_and_heading() {
        let inputs = StatusInputs {
            has_permission: true,
            location_enabled: false,
            has_fix: false,
            has_heading: false,
            sensor: Some(SensorStatus::NoSensor),
        };
        assert_eq!(classify(&inputs), QiblaStatus::LocationDisabled);
    }

    #[test]
    fn test_ok_needs_everything() {
        let mut inputs = StatusInputs {
            has_permission: true,
            location_enabled: true,
            has_fix: true,
            has_heading: true,
            sensor: None,
        };
        assert_eq!(classify(&inputs), QiblaStatus::Ok);

        inputs.has_heading = false;
        assert_eq!(classify(&inputs), QiblaStatus::Calibrating);

        inputs.has_heading = true;
        inputs.has_fix = false;
        assert_eq!(classify(&inputs), QiblaStatus::Calibrating);

        inputs.has_fix = true;
        inputs.sensor = Some(SensorStatus::LowAccuracy);
        assert_eq!(classify(&inputs), QiblaStatus::LowAccuracy);
    }

    #[test]
    fn test_sensor_problem_beats_missing_fix() {
        let inputs = StatusInputs {
            has_permission: true,
            location_enabled: true,
            has_fix: false,
            has_heading: false,
            sensor: Some(SensorStatus::LowAccuracy),
        };
        assert_eq!(classify(&inputs), QiblaStatus::LowAccuracy);
    }
}
