use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    location::{Coordinates, KAABA},
    prelude::*,
};

/// Satellite provider name
pub const GPS_PROVIDER: &str = "gps";
/// Cell / Wi-Fi provider name
pub const NETWORK_PROVIDER: &str = "network";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
/// Tunables for location acquisition and the qibla computation
pub struct QiblaSettings {
    /// Providers to use, in priority order (ties in last-known lookups go to the earlier one)
    pub providers: Vec<String>,
    /// Minimum time between live updates
    pub min_update_interval_ms: u64,
    /// Minimum movement between live updates
    pub min_distance_m: f32,
    /// Where to point
    pub target: Coordinates,
    /// Give up on a place name lookup after this long
    pub geocode_timeout_secs: u64,
}

impl QiblaSettings {
    /// Read settings from a JSON file, missing fields take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        let settings: Self = serde_json::from_slice(&raw).context("Failed to parse settings")?;
        Coordinates::new(settings.target.lat, settings.target.long)
            .context("Invalid target in settings")?;
        Ok(settings)
    }

    pub fn min_update_interval(&self) -> Duration {
        Duration::from_millis(self.min_update_interval_ms)
    }

    pub fn geocode_timeout(&self) -> Duration {
        Duration::from_secs(self.geocode_timeout_secs)
    }
}

impl Default for QiblaSettings {
    fn default() -> Self {
        Self {
            providers: vec![GPS_PROVIDER.to_string(), NETWORK_PROVIDER.to_string()],
            min_update_interval_ms: 1000,
            min_distance_m: 1.0,
            target: KAABA,
            geocode_timeout_secs: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings: QiblaSettings =
            serde_json::from_str(r#"{ "providers": ["fused"] }"#).expect("Failed to parse");
        assert_eq!(settings.providers, vec!["fused".to_string()]);
        assert_eq!(settings.min_update_interval(), Duration::from_secs(1));
        assert_eq!(settings.min_distance_m, 1.0);
        assert_eq!(settings.target, KAABA);
    }

    #[test]
    fn test_invalid_target_rejected() {
        let path =
            std::env::temp_dir().join(format!("qibla-settings-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, r#"{ "target": { "lat": 100.0, "long": 0.0 } }"#).expect("write");
        assert!(QiblaSettings::from_json_file(&path).is_err());
        std::fs::remove_file(&path).ok();
    }
}
