use std::sync::Arc;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    cache::LocationCache,
    location::Fix,
    provider::{
        FixSink, LocationProvider, ProviderEvent, ProviderEventKind, ProviderEventTx,
        Subscription, SubscriptionRequest,
    },
    settings::QiblaSettings,
    store::KeyValueStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Where the controller is in acquiring a position
pub enum AcquisitionState {
    /// Never activated, or deactivated
    Idle,
    /// Location permission hasn't been granted
    NoPermission,
    /// Every configured provider is switched off
    Disabled,
    /// Subscribed but no live fix yet this session, may still hold a cached / last known fix
    AcquiringLive,
    /// Subscribed and at least one live fix has arrived
    Tracking,
    /// Subscribing raised an error, only a last known fix (if any) is held until reactivated
    RegistrationFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Signals owned by the caller that decide how the controller activates
pub struct ActivationInputs {
    pub has_permission: bool,
    /// Global location services toggle, when off every provider counts as disabled
    pub location_enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Result of feeding a [ProviderEvent] to the controller
pub enum EventOutcome {
    /// The held fix was replaced
    FixChanged,
    /// Provider availability changed, the owner should call [LocationController::activate]
    /// again with its current inputs
    Reactivate,
    /// Stale or invalid, nothing changed
    Ignored,
}

/// State machine deciding which position fix to trust.
///
/// Starts from whatever fix the [LocationCache] holds, falls back to providers' last known
/// fixes when nothing better is around, and holds at most one live [Subscription] at a time.
/// Errors from the provider never escape, they degrade to the fallbacks described on
/// [LocationController::activate].
pub struct LocationController<P: LocationProvider, S: KeyValueStore> {
    provider: Arc<P>,
    cache: LocationCache<S>,
    settings: QiblaSettings,
    state: AcquisitionState,
    fix: Option<Fix>,
    subscription: Option<Subscription<P>>,
    /// Bumped on every activation so events from released subscriptions can be told apart
    generation: u64,
    events: ProviderEventTx,
}

impl<P: LocationProvider, S: KeyValueStore> LocationController<P, S> {
    pub fn new(
        provider: Arc<P>,
        cache: LocationCache<S>,
        settings: QiblaSettings,
        events: ProviderEventTx,
    ) -> Self {
        let fix = cache.load_fix();
        if let Some(fix) = &fix {
            debug!("Starting from cached fix {:?}", fix.coords);
        }
        Self {
            provider,
            cache,
            settings,
            state: AcquisitionState::Idle,
            fix,
            subscription: None,
            generation: 0,
            events,
        }
    }

    pub fn state(&self) -> AcquisitionState {
        self.state
    }

    pub fn fix(&self) -> Option<&Fix> {
        self.fix.as_ref()
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    /// Most recent fix any of `providers` knows about. Ties keep the earlier provider,
    /// providers that fail or know nothing are skipped.
    fn best_last_known(&self, providers: &[String]) -> Option<Fix> {
        let mut best: Option<Fix> = None;

        for name in providers {
            let fix = match self.provider.last_known_fix(name) {
                Ok(Some(fix)) if fix.coords.is_valid() => fix,
                Ok(Some(fix)) => {
                    warn!("Provider {name} returned an invalid last known fix {:?}", fix.coords);
                    continue;
                }
                Ok(None) => continue,
                Err(why) => {
                    debug!("Provider {name} failed last known lookup: {why:?}");
                    continue;
                }
            };

            if best
                .as_ref()
                .is_none_or(|current| fix.timestamp_ms > current.timestamp_ms)
            {
                best = Some(fix);
            }
        }

        best
    }

    /// (Re)start acquisition for the given inputs.
    ///
    /// - No permission: [AcquisitionState::NoPermission], the held fix stays.
    /// - No enabled provider: [AcquisitionState::Disabled], a last known fix from *any*
    ///   configured provider is adopted and cached unless the held one is newer. The lookup
    ///   runs even when a fix is held, but a held fix is never traded for an older one.
    /// - Otherwise: with nothing held, the best last known fix of the enabled providers is
    ///   adopted right away, then live updates are requested. If that fails the best last
    ///   known fix of any provider replaces the held one and the state is
    ///   [AcquisitionState::RegistrationFailed]. There's no automatic retry, call this again.
    pub fn activate(&mut self, inputs: ActivationInputs) -> AcquisitionState {
        self.deactivate();
        self.generation = self.generation.wrapping_add(1);

        if !inputs.has_permission {
            self.state = AcquisitionState::NoPermission;
            return self.state;
        }

        let enabled = if inputs.location_enabled {
            self.settings
                .providers
                .iter()
                .filter(|name| self.provider.is_provider_enabled(name))
                .cloned()
                .collect::<Vec<_>>()
        } else {
            Vec::new()
        };

        if enabled.is_empty() {
            self.state = AcquisitionState::Disabled;
            // Disabled providers can still remember where they last were
            if let Some(fix) = self.best_last_known(&self.settings.providers) {
                let newer = self
                    .fix
                    .as_ref()
                    .is_none_or(|held| fix.timestamp_ms >= held.timestamp_ms);
                if newer {
                    self.cache.save(Some(&fix));
                    self.fix = Some(fix);
                }
            }
            return self.state;
        }

        if self.fix.is_none() {
            self.fix = self.best_last_known(&enabled);
        }

        let request = SubscriptionRequest {
            providers: enabled,
            min_interval: self.settings.min_update_interval(),
            min_distance_m: self.settings.min_distance_m,
        };
        let sink = FixSink::new(self.generation, self.events.clone());

        match Subscription::start(self.provider.clone(), &request, sink) {
            Ok(subscription) => {
                info!(
                    "Subscribed to {:?} ({:?})",
                    request.providers,
                    subscription.handle()
                );
                self.subscription = Some(subscription);
                self.state = AcquisitionState::AcquiringLive;
            }
            Err(why) => {
                warn!("Failed to subscribe to location updates: {why:?}");
                if let Some(fix) = self.best_last_known(&self.settings.providers) {
                    self.fix = Some(fix);
                }
                self.state = AcquisitionState::RegistrationFailed;
            }
        }

        self.state
    }

    /// Release the live subscription, if any, and go back to [AcquisitionState::Idle].
    /// The held fix is kept.
    pub fn deactivate(&mut self) {
        // Dropping the guard unsubscribes
        self.subscription = None;
        self.state = AcquisitionState::Idle;
    }

    /// Apply an event delivered to a [FixSink] handed out by this controller
    pub fn handle_event(&mut self, event: ProviderEvent) -> EventOutcome {
        if event.generation != self.generation || self.subscription.is_none() {
            debug!("Ignoring event from released subscription {}", event.generation);
            return EventOutcome::Ignored;
        }

        match event.kind {
            ProviderEventKind::Fix(fix) => {
                if !fix.coords.is_valid() {
                    warn!("Ignoring invalid fix from {}: {:?}", fix.provider, fix.coords);
                    return EventOutcome::Ignored;
                }
                self.cache.save(Some(&fix));
                self.fix = Some(fix);
                self.state = AcquisitionState::Tracking;
                EventOutcome::FixChanged
            }
            ProviderEventKind::ProvidersChanged => EventOutcome::Reactivate,
        }
    }
}
