mod cache;
mod controller;
mod geocode;
mod geodesy;
mod location;
mod provider;
mod session;
mod settings;
mod snapshot;
mod status;
mod store;

pub use cache::{CACHE_PROVIDER, LocationCache};
pub use controller::{AcquisitionState, ActivationInputs, EventOutcome, LocationController};
pub use geocode::{Address, Geocoder, resolve_place_name};
pub use geodesy::{
    ALIGNED_TOLERANCE_DEGREES, BearingResult, CardinalDirection, EARTH_RADIUS_KM, TurnGuidance,
    bearing_difference, great_circle_distance_km, initial_bearing, normalize_degrees,
    normalize_signed_degrees,
};
pub use location::{Coordinates, Fix, KAABA, LocationComponent};
pub use provider::{
    FixSink, LocationProvider, ProviderEvent, ProviderEventKind, Subscription,
    SubscriptionHandle, SubscriptionRequest,
};
pub use session::{QiblaSession, SessionEvent, StateUpdateSender};
pub use settings::{GPS_PROVIDER, NETWORK_PROVIDER, QiblaSettings};
pub use snapshot::{QiblaSnapshot, SnapshotEvent, reduce};
pub use status::{QiblaStatus, SensorStatus, StatusInputs, classify};
pub use store::{JsonFileStore, KeyValueStore, MemoryStore};

pub type UtcDT = chrono::DateTime<chrono::Utc>;

pub mod prelude {
    use anyhow::Error as AnyhowError;
    use std::result::Result as StdResult;
    pub type Result<T = (), E = AnyhowError> = StdResult<T, E>;
    pub use anyhow::Context;
}
