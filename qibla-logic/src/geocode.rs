use std::time::Duration;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{location::Coordinates, prelude::*};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
/// The parts of a reverse geocoding result we care about
pub struct Address {
    /// City or town
    pub locality: Option<String>,
    /// County / district, used when there's no locality
    pub sub_admin_area: Option<String>,
    pub country_name: Option<String>,
}

impl Address {
    /// "City, Country", "City" or "Country", [None] when neither is known
    pub fn place_name(&self) -> Option<String> {
        let city = self.locality.as_deref().or(self.sub_admin_area.as_deref());
        let parts = [city, self.country_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }
}

/// Reverse geocoding service, best effort
pub trait Geocoder: Send + Sync + 'static {
    fn resolve(
        &self,
        coords: Coordinates,
    ) -> impl Future<Output = Result<Option<Address>>> + Send;
}

/// Look up a place name for `coords`, any failure (including taking longer than `timeout`)
/// comes back as [None]
pub async fn resolve_place_name<G: Geocoder>(
    geocoder: &G,
    coords: Coordinates,
    timeout: Duration,
) -> Option<String> {
    match tokio::time::timeout(timeout, geocoder.resolve(coords)).await {
        Ok(Ok(address)) => address.and_then(|a| a.place_name()),
        Ok(Err(why)) => {
            warn!("Failed to resolve place name for {coords:?}: {why:?}");
            None
        }
        Err(_) => {
            debug!("Place name lookup for {coords:?} timed out after {timeout:?}");
            None
        }
    }
}
