use std::{sync::Arc, time::Duration};

use log::debug;
use tokio::sync::mpsc;

use crate::{location::Fix, prelude::*};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Opaque id for one live update registration, handed out by the [LocationProvider]
pub struct SubscriptionHandle(pub u64);

#[derive(Debug, Clone, PartialEq)]
/// What to subscribe to and how often updates are wanted
pub struct SubscriptionRequest {
    pub providers: Vec<String>,
    pub min_interval: Duration,
    pub min_distance_m: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEventKind {
    /// A new live fix
    Fix(Fix),
    /// A provider was switched on or off
    ProvidersChanged,
}

#[derive(Debug, Clone, PartialEq)]
/// Event delivered through a [FixSink], tagged with the activation that created the sink
pub struct ProviderEvent {
    pub generation: u64,
    pub kind: ProviderEventKind,
}

pub type ProviderEventTx = mpsc::UnboundedSender<ProviderEvent>;
pub type ProviderEventRx = mpsc::UnboundedReceiver<ProviderEvent>;

#[derive(Debug, Clone)]
/// Callback target given to [LocationProvider::subscribe]. Sending never blocks, so it's safe
/// to call from whatever thread the platform delivers updates on.
pub struct FixSink {
    generation: u64,
    tx: ProviderEventTx,
}

impl FixSink {
    pub fn new(generation: u64, tx: ProviderEventTx) -> Self {
        Self { generation, tx }
    }

    fn send(&self, kind: ProviderEventKind) {
        let event = ProviderEvent {
            generation: self.generation,
            kind,
        };
        if self.tx.send(event).is_err() {
            debug!("Dropping provider event, receiver is gone");
        }
    }

    pub fn send_fix(&self, fix: Fix) {
        self.send(ProviderEventKind::Fix(fix));
    }

    pub fn providers_changed(&self) {
        self.send(ProviderEventKind::ProvidersChanged);
    }
}

/// Platform location service
pub trait LocationProvider: Send + Sync {
    /// Whether the named provider is currently switched on
    fn is_provider_enabled(&self, provider: &str) -> bool;
    /// The last fix the named provider knows about, possibly stale
    fn last_known_fix(&self, provider: &str) -> Result<Option<Fix>>;
    /// Register for live updates from all providers in `request`, delivered to `sink` until
    /// [LocationProvider::unsubscribe] is called with the returned handle
    fn subscribe(&self, request: &SubscriptionRequest, sink: FixSink) -> Result<SubscriptionHandle>;
    fn unsubscribe(&self, handle: SubscriptionHandle);
}

/// An active registration, unsubscribes when dropped
pub struct Subscription<P: LocationProvider> {
    provider: Arc<P>,
    handle: SubscriptionHandle,
}

impl<P: LocationProvider> Subscription<P> {
    /// Subscribe through `provider`, the registration is released when the guard drops
    pub fn start(provider: Arc<P>, request: &SubscriptionRequest, sink: FixSink) -> Result<Self> {
        let handle = provider.subscribe(request, sink)?;
        Ok(Self { provider, handle })
    }

    pub fn handle(&self) -> SubscriptionHandle {
        self.handle
    }
}

impl<P: LocationProvider> Drop for Subscription<P> {
    fn drop(&mut self) {
        debug!("Releasing location subscription {:?}", self.handle);
        self.provider.unsubscribe(self.handle);
    }
}
