use std::{sync::Arc, time::Duration};

use log::{debug, info};
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;

use crate::{
    cache::LocationCache,
    controller::{AcquisitionState, ActivationInputs, EventOutcome, LocationController},
    geocode::{Geocoder, resolve_place_name},
    location::Fix,
    prelude::*,
    provider::{LocationProvider, ProviderEvent, ProviderEventRx},
    settings::QiblaSettings,
    snapshot::{QiblaSnapshot, SnapshotEvent, reduce},
    status::{QiblaStatus, SensorStatus, StatusInputs, classify},
    store::KeyValueStore,
};

/// Notified whenever the session's [QiblaSnapshot] changes
pub trait StateUpdateSender {
    fn send_update(&self);
}

#[derive(Debug, Clone, PartialEq)]
/// Input to the session, applied one at a time by [QiblaSession::main_loop]
pub enum SessionEvent {
    PermissionChanged(bool),
    LocationEnabledChanged(bool),
    HeadingChanged(Option<f32>),
    SensorStatusChanged(Option<SensorStatus>),
    /// Run activation again with the current inputs (e.g. the screen became visible)
    Reactivate,
    /// A place name lookup finished, keyed by the serial of the fix that started it
    PlaceNameResolved {
        fix_serial: u64,
        name: Option<String>,
    },
}

type PlaceLookups = JoinSet<(u64, Option<String>)>;

struct SessionState<P: LocationProvider, S: KeyValueStore> {
    controller: LocationController<P, S>,
    cache: LocationCache<S>,
    inputs: ActivationInputs,
    sensor: Option<SensorStatus>,
    snapshot: QiblaSnapshot,
    /// Bumped every time the held fix changes, provider timestamps can go backwards
    fix_serial: u64,
    /// Serial of the fix the displayed place name was resolved for
    place_name_key: Option<u64>,
}

impl<P: LocationProvider, S: KeyValueStore> SessionState<P, S> {
    fn status(&self) -> QiblaStatus {
        classify(&StatusInputs {
            has_permission: self.inputs.has_permission,
            location_enabled: self.inputs.location_enabled
                && self.controller.state() != AcquisitionState::Disabled,
            has_fix: self.controller.fix().is_some(),
            has_heading: self.snapshot.heading.is_some(),
            sensor: self.sensor,
        })
    }

    fn activate(&mut self) {
        let state = self.controller.activate(self.inputs);
        info!("Location acquisition is now {state:?}");
    }
}

/// One compass screen's worth of state: owns a [LocationController], combines its fix with the
/// heading and place name into [QiblaSnapshot]s, and resolves place names in the background.
pub struct QiblaSession<P: LocationProvider, S: KeyValueStore, G: Geocoder, U: StateUpdateSender>
{
    state: Mutex<SessionState<P, S>>,
    geocoder: Arc<G>,
    state_update_sender: U,
    events: mpsc::UnboundedSender<SessionEvent>,
    event_rx: Mutex<mpsc::UnboundedReceiver<SessionEvent>>,
    provider_rx: Mutex<ProviderEventRx>,
    geocode_timeout: Duration,
    cancel: CancellationToken,
}

impl<P: LocationProvider, S: KeyValueStore, G: Geocoder, U: StateUpdateSender>
    QiblaSession<P, S, G, U>
{
    pub fn new(
        settings: QiblaSettings,
        inputs: ActivationInputs,
        provider: Arc<P>,
        store: Arc<S>,
        geocoder: Arc<G>,
        state_update_sender: U,
    ) -> Self {
        let (provider_tx, provider_rx) = mpsc::unbounded_channel();
        let (events, event_rx) = mpsc::unbounded_channel();

        let cache = LocationCache::new(store);
        let geocode_timeout = settings.geocode_timeout();
        let target = settings.target;
        let controller = LocationController::new(provider, cache.clone(), settings, provider_tx);

        let snapshot = QiblaSnapshot::assemble(
            target,
            None,
            controller.fix().cloned(),
            cache.load_place_name(),
            QiblaStatus::Calibrating,
        );

        let mut state = SessionState {
            controller,
            cache,
            inputs,
            sensor: None,
            snapshot,
            fix_serial: 0,
            place_name_key: None,
        };
        state.snapshot = reduce(&state.snapshot, SnapshotEvent::StatusChanged(state.status()));

        Self {
            state: Mutex::new(state),
            geocoder,
            state_update_sender,
            events,
            event_rx: Mutex::new(event_rx),
            provider_rx: Mutex::new(provider_rx),
            geocode_timeout,
            cancel: CancellationToken::new(),
        }
    }

    fn push_event(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!("Session event channel closed");
        }
    }

    pub fn set_permission(&self, granted: bool) {
        self.push_event(SessionEvent::PermissionChanged(granted));
    }

    pub fn set_location_enabled(&self, enabled: bool) {
        self.push_event(SessionEvent::LocationEnabledChanged(enabled));
    }

    /// Latest heading from the compass, [None] when it isn't available
    pub fn update_heading(&self, heading: Option<f32>) {
        self.push_event(SessionEvent::HeadingChanged(heading));
    }

    pub fn update_sensor_status(&self, sensor: Option<SensorStatus>) {
        self.push_event(SessionEvent::SensorStatusChanged(sensor));
    }

    /// Retry acquisition, the only way out of [AcquisitionState::RegistrationFailed]
    pub fn reactivate(&self) {
        self.push_event(SessionEvent::Reactivate);
    }

    pub async fn get_snapshot(&self) -> QiblaSnapshot {
        self.state.lock().await.snapshot.clone()
    }

    pub async fn acquisition_state(&self) -> AcquisitionState {
        self.state.lock().await.controller.state()
    }

    pub async fn quit(&self) {
        self.cancel.cancel();
    }

    fn spawn_lookup(&self, lookups: &mut PlaceLookups, key: u64, fix: &Fix) {
        let geocoder = self.geocoder.clone();
        let coords = fix.coords;
        let timeout = self.geocode_timeout;
        lookups.spawn(async move {
            let name = resolve_place_name(geocoder.as_ref(), coords, timeout).await;
            (key, name)
        });
    }

    /// Bring the snapshot in line with the controller's fix and the current status
    fn settle(&self, state: &mut SessionState<P, S>, lookups: &mut PlaceLookups) {
        let fix = state.controller.fix().cloned();
        if fix != state.snapshot.fix {
            state.fix_serial += 1;
            if let Some(fix) = &fix {
                self.spawn_lookup(lookups, state.fix_serial, fix);
            }
            state.snapshot = reduce(&state.snapshot, SnapshotEvent::FixChanged(fix));
        }

        let status = state.status();
        if status != state.snapshot.status {
            state.snapshot = reduce(&state.snapshot, SnapshotEvent::StatusChanged(status));
        }
    }

    fn consume_provider_event(&self, state: &mut SessionState<P, S>, event: ProviderEvent) {
        match state.controller.handle_event(event) {
            EventOutcome::Reactivate => state.activate(),
            EventOutcome::FixChanged | EventOutcome::Ignored => {}
        }
    }

    fn consume_event(&self, state: &mut SessionState<P, S>, event: SessionEvent) {
        match event {
            SessionEvent::PermissionChanged(granted) => {
                if state.inputs.has_permission != granted {
                    state.inputs.has_permission = granted;
                    state.activate();
                }
            }
            SessionEvent::LocationEnabledChanged(enabled) => {
                if state.inputs.location_enabled != enabled {
                    state.inputs.location_enabled = enabled;
                    state.activate();
                }
            }
            SessionEvent::HeadingChanged(heading) => {
                state.snapshot = reduce(&state.snapshot, SnapshotEvent::HeadingChanged(heading));
            }
            SessionEvent::SensorStatusChanged(sensor) => state.sensor = sensor,
            SessionEvent::Reactivate => state.activate(),
            SessionEvent::PlaceNameResolved {
                fix_serial,
                name: Some(name),
            } => {
                // A lookup for an older fix must not clobber one for a newer fix
                if state
                    .place_name_key
                    .is_some_and(|shown| fix_serial < shown)
                {
                    debug!("Discarding place name {name:?} for superseded fix");
                    return;
                }
                state.cache.save_place_name(Some(&name));
                state.place_name_key = Some(fix_serial);
                state.snapshot = reduce(
                    &state.snapshot,
                    SnapshotEvent::PlaceNameResolved(Some(name)),
                );
            }
            SessionEvent::PlaceNameResolved { name: None, .. } => {}
        }
    }

    /// Run an event handler against the locked state and notify if the snapshot changed
    async fn apply(
        &self,
        lookups: &mut PlaceLookups,
        f: impl FnOnce(&Self, &mut SessionState<P, S>),
    ) {
        let mut state = self.state.lock().await;
        let before = state.snapshot.clone();
        f(self, &mut state);
        self.settle(&mut state, lookups);
        if state.snapshot != before {
            self.state_update_sender.send_update();
        }
    }

    /// Main loop of the session, activates acquisition and applies events until
    /// [QiblaSession::quit] is called. The subscription and any pending place name lookups
    /// are released on the way out.
    pub async fn main_loop(&self) -> Result {
        let mut event_rx = self.event_rx.lock().await;
        let mut provider_rx = self.provider_rx.lock().await;
        let mut lookups = PlaceLookups::new();

        {
            let mut state = self.state.lock().await;
            // The cached fix deserves a fresh place name too
            if let Some(fix) = state.controller.fix() {
                self.spawn_lookup(&mut lookups, state.fix_serial, fix);
            }
        }
        self.apply(&mut lookups, |_, state| state.activate()).await;

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    break;
                }

                Some(event) = provider_rx.recv() => {
                    self.apply(&mut lookups, |this, state| this.consume_provider_event(state, event)).await;
                }

                Some(event) = event_rx.recv() => {
                    self.apply(&mut lookups, |this, state| this.consume_event(state, event)).await;
                }

                Some(res) = lookups.join_next(), if !lookups.is_empty() => {
                    match res {
                        Ok((fix_serial, name)) => {
                            let event = SessionEvent::PlaceNameResolved { fix_serial, name };
                            self.apply(&mut lookups, |this, state| this.consume_event(state, event)).await;
                        }
                        Err(why) => debug!("Place name lookup didn't finish: {why}"),
                    }
                }
            }
        }

        lookups.abort_all();
        self.state.lock().await.controller.deactivate();

        Ok(())
    }
}
