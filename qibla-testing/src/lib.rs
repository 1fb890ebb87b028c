use interprocess::local_socket::{GenericNamespaced, Name, ToNsName};
use qibla_logic::{Address, AcquisitionState, Fix, QiblaSnapshot, SensorStatus};
use serde::{Deserialize, Serialize};

pub mod prelude {
    pub use anyhow::{Context, anyhow, bail};
    pub type Result<T = (), E = anyhow::Error> = std::result::Result<T, E>;
}

pub use prelude::*;

pub fn get_socket_name(base_name: String) -> Result<Name<'static>> {
    base_name
        .to_ns_name::<GenericNamespaced>()
        .context("Failed to parse socket name")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Changes to the simulated platform the session runs on
pub enum PlatformRequest {
    SetProviderEnabled { provider: String, enabled: bool },
    SetLastKnown { provider: String, fix: Option<Fix> },
    FailSubscribe(bool),
    PushFix(Fix),
    /// What every following place name lookup answers, [None] makes them fail
    SetGeocodeResult(Option<Address>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Inputs the compass screen would feed the session
pub enum SessionRequest {
    SetPermission(bool),
    SetLocationEnabled(bool),
    SetHeading(Option<f32>),
    SetSensorStatus(Option<SensorStatus>),
    Reactivate,
    GetSnapshot,
    Quit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TestingRequest {
    Platform(PlatformRequest),
    Session(SessionRequest),
}

impl From<PlatformRequest> for TestingRequest {
    fn from(val: PlatformRequest) -> Self {
        TestingRequest::Platform(val)
    }
}

impl From<SessionRequest> for TestingRequest {
    fn from(val: SessionRequest) -> Self {
        TestingRequest::Session(val)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TestingResponse {
    Complete,
    Snapshot {
        snapshot: QiblaSnapshot,
        acquisition: AcquisitionState,
        /// Number of snapshot changes published so far
        updates: usize,
    },
    SessionEnded,
    Error(String),
}

impl From<anyhow::Error> for TestingResponse {
    fn from(value: anyhow::Error) -> Self {
        TestingResponse::Error(format!("{value:#}"))
    }
}
