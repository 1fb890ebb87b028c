use std::sync::Arc;

use chrono::Utc;
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    UtcDT,
    location::{Coordinates, Fix, LocationComponent},
    store::KeyValueStore,
};

const KEY_LOCATION: &str = "last_location";
const KEY_PLACE_NAME: &str = "last_place_name";

/// Provider name given to fixes rebuilt from the cache
pub const CACHE_PROVIDER: &str = "cache";

#[derive(Debug, Clone, Serialize, Deserialize)]
/// One stored entry, written as a unit so a failed write keeps the whole previous position
struct CachedLocation {
    lat: LocationComponent,
    long: LocationComponent,
    saved_at: UtcDT,
}

/// Single slot cache of the last trusted position and place name.
///
/// Saves never clear anything, a stale value is better than an empty one. Write failures are
/// logged and otherwise ignored.
pub struct LocationCache<S: KeyValueStore> {
    store: Arc<S>,
}

impl<S: KeyValueStore> Clone for LocationCache<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: KeyValueStore> LocationCache<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    fn set(&self, key: &str, value: Value) {
        if let Err(why) = self.store.set(key, value) {
            warn!("Failed to write {key} to location cache: {why:?}");
        }
    }

    fn entry(&self) -> Option<CachedLocation> {
        let value = self.store.get(KEY_LOCATION)?;
        serde_json::from_value(value)
            .inspect_err(|why| warn!("Ignoring unreadable cached location: {why}"))
            .ok()
    }

    /// Persist the position of `fix`, does nothing for [None]
    pub fn save(&self, fix: Option<&Fix>) {
        let Some(fix) = fix else {
            return;
        };
        let entry = CachedLocation {
            lat: fix.lat(),
            long: fix.long(),
            saved_at: Utc::now(),
        };
        match serde_json::to_value(entry) {
            Ok(value) => self.set(KEY_LOCATION, value),
            Err(why) => warn!("Failed to encode cached location: {why:?}"),
        }
    }

    /// Last saved position, [None] if nothing (valid) was ever saved
    pub fn load(&self) -> Option<Coordinates> {
        let entry = self.entry()?;
        Coordinates::new(entry.lat, entry.long)
            .inspect_err(|why| warn!("Ignoring invalid cached location: {why}"))
            .ok()
    }

    /// When the cached position was written
    pub fn saved_at(&self) -> Option<UtcDT> {
        self.entry().map(|entry| entry.saved_at)
    }

    /// The cached position as a [Fix] stamped with its write time
    pub fn load_fix(&self) -> Option<Fix> {
        let coords = self.load()?;
        let timestamp_ms = self
            .saved_at()
            .and_then(|dt| u64::try_from(dt.timestamp_millis()).ok())
            .unwrap_or(0);
        Some(Fix::new(coords, timestamp_ms, CACHE_PROVIDER))
    }

    /// Persist a resolved place name, does nothing for [None]
    pub fn save_place_name(&self, name: Option<&str>) {
        if let Some(name) = name {
            self.set(KEY_PLACE_NAME, Value::from(name));
        }
    }

    pub fn load_place_name(&self) -> Option<String> {
        self.store
            .get(KEY_PLACE_NAME)
            .and_then(|v| v.as_str().map(str::to_string))
    }
}
