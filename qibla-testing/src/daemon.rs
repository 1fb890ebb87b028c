use std::{
    collections::{HashMap, HashSet},
    path::PathBuf,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use clap::Parser;
use interprocess::local_socket::{ListenerOptions, tokio::prelude::*};
use log::{debug, error, info, warn};
use qibla_logic::{
    ActivationInputs, Address, Coordinates, Fix, FixSink, Geocoder, JsonFileStore,
    LocationProvider, QiblaSession, QiblaSettings, StateUpdateSender, SubscriptionHandle,
    SubscriptionRequest,
};
use qibla_test_shared::*;
use tokio::{
    io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    task::{JoinHandle, yield_now},
};

#[derive(Default)]
struct PlatformState {
    enabled: HashSet<String>,
    last_known: HashMap<String, Fix>,
    fail_subscribe: bool,
    sinks: HashMap<SubscriptionHandle, FixSink>,
    next_handle: u64,
}

/// Location service driven entirely by testing requests
struct SimulatedProvider(Mutex<PlatformState>);

impl SimulatedProvider {
    fn new(enabled: &[String]) -> Self {
        Self(Mutex::new(PlatformState {
            enabled: enabled.iter().cloned().collect(),
            ..Default::default()
        }))
    }

    fn lock(&self) -> MutexGuard<'_, PlatformState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_enabled(&self, provider: String, enabled: bool) {
        let mut state = self.lock();
        let changed = if enabled {
            state.enabled.insert(provider)
        } else {
            state.enabled.remove(&provider)
        };
        if changed {
            for sink in state.sinks.values() {
                sink.providers_changed();
            }
        }
    }

    fn set_last_known(&self, provider: String, fix: Option<Fix>) {
        let mut state = self.lock();
        match fix {
            Some(fix) => state.last_known.insert(provider, fix),
            None => state.last_known.remove(&provider),
        };
    }

    fn push_fix(&self, fix: Fix) {
        let state = self.lock();
        if state.sinks.is_empty() {
            warn!("No active subscription, fix at {:?} goes nowhere", fix.coords);
        }
        for sink in state.sinks.values() {
            sink.send_fix(fix.clone());
        }
    }
}

impl LocationProvider for SimulatedProvider {
    fn is_provider_enabled(&self, provider: &str) -> bool {
        self.lock().enabled.contains(provider)
    }

    fn last_known_fix(&self, provider: &str) -> Result<Option<Fix>> {
        Ok(self.lock().last_known.get(provider).cloned())
    }

    fn subscribe(&self, request: &SubscriptionRequest, sink: FixSink) -> Result<SubscriptionHandle> {
        let mut state = self.lock();
        if state.fail_subscribe {
            bail!("Simulated registration failure");
        }
        state.next_handle += 1;
        let handle = SubscriptionHandle(state.next_handle);
        state.sinks.insert(handle, sink);
        info!("Subscribed {handle:?} to {:?}", request.providers);
        Ok(handle)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        if self.lock().sinks.remove(&handle).is_some() {
            info!("Unsubscribed {handle:?}");
        }
    }
}

struct SimulatedGeocoder {
    result: Mutex<Option<Address>>,
    delay: Duration,
}

impl Geocoder for SimulatedGeocoder {
    fn resolve(&self, coords: Coordinates) -> impl Future<Output = Result<Option<Address>>> + Send {
        let result = self
            .result
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let delay = self.delay;
        async move {
            tokio::time::sleep(delay).await;
            debug!("Resolving {coords:?} to {result:?}");
            result
                .map(Some)
                .ok_or_else(|| anyhow!("Geocoder unavailable"))
        }
    }
}

#[derive(Clone)]
struct UpdateCounter(Arc<AtomicUsize>);

impl StateUpdateSender for UpdateCounter {
    fn send_update(&self) {
        let count = self.0.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Snapshot update #{count}");
    }
}

type Session = QiblaSession<SimulatedProvider, JsonFileStore, SimulatedGeocoder, UpdateCounter>;

struct DaemonState {
    provider: Arc<SimulatedProvider>,
    geocoder: Arc<SimulatedGeocoder>,
    session: Arc<Session>,
    updates: Arc<AtomicUsize>,
    main_loop: Option<JoinHandle<Result>>,
}

impl DaemonState {
    fn new(cli: &Cli) -> Result<Self> {
        let settings = match &cli.settings {
            Some(path) => QiblaSettings::from_json_file(path)?,
            None => QiblaSettings::default(),
        };
        let store = Arc::new(JsonFileStore::open(&cli.store)?);
        info!("Location cache at {}", store.path().display());
        let provider = Arc::new(SimulatedProvider::new(&settings.providers));
        let geocoder = Arc::new(SimulatedGeocoder {
            result: Mutex::new(None),
            delay: Duration::from_millis(cli.geocode_delay_ms),
        });
        let updates = Arc::new(AtomicUsize::new(0));
        let inputs = ActivationInputs {
            has_permission: cli.granted,
            location_enabled: true,
        };

        let session = Arc::new(Session::new(
            settings,
            inputs,
            provider.clone(),
            store,
            geocoder.clone(),
            UpdateCounter(updates.clone()),
        ));

        let session2 = session.clone();
        let main_loop = tokio::spawn(async move { session2.main_loop().await });

        Ok(Self {
            provider,
            geocoder,
            session,
            updates,
            main_loop: Some(main_loop),
        })
    }

    /// Let the session loop drain whatever the last request queued
    async fn settle() {
        for _ in 0..32 {
            yield_now().await;
        }
    }

    fn process_platform_req(&self, req: PlatformRequest) {
        match req {
            PlatformRequest::SetProviderEnabled { provider, enabled } => {
                self.provider.set_enabled(provider, enabled)
            }
            PlatformRequest::SetLastKnown { provider, fix } => {
                self.provider.set_last_known(provider, fix)
            }
            PlatformRequest::FailSubscribe(fail) => self.provider.lock().fail_subscribe = fail,
            PlatformRequest::PushFix(fix) => self.provider.push_fix(fix),
            PlatformRequest::SetGeocodeResult(address) => {
                *self
                    .geocoder
                    .result
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = address;
            }
        }
    }

    async fn process_session_req(&mut self, req: SessionRequest) -> Result<TestingResponse> {
        match req {
            SessionRequest::SetPermission(granted) => self.session.set_permission(granted),
            SessionRequest::SetLocationEnabled(enabled) => {
                self.session.set_location_enabled(enabled)
            }
            SessionRequest::SetHeading(heading) => self.session.update_heading(heading),
            SessionRequest::SetSensorStatus(sensor) => self.session.update_sensor_status(sensor),
            SessionRequest::Reactivate => self.session.reactivate(),
            SessionRequest::GetSnapshot => {
                return Ok(TestingResponse::Snapshot {
                    snapshot: self.session.get_snapshot().await,
                    acquisition: self.session.acquisition_state().await,
                    updates: self.updates.load(Ordering::SeqCst),
                });
            }
            SessionRequest::Quit => {
                self.session.quit().await;
                if let Some(main_loop) = self.main_loop.take() {
                    main_loop.await.context("Session task panicked")??;
                }
                return Ok(TestingResponse::SessionEnded);
            }
        }
        Ok(TestingResponse::Complete)
    }

    async fn process_req(&mut self, req: TestingRequest) -> Result<TestingResponse> {
        if self.main_loop.is_none() {
            bail!("Session has already ended");
        }
        let resp = match req {
            TestingRequest::Platform(req) => {
                self.process_platform_req(req);
                TestingResponse::Complete
            }
            TestingRequest::Session(req) => self.process_session_req(req).await?,
        };
        Self::settle().await;
        Ok(resp)
    }
}

#[derive(Parser)]
struct Cli {
    /// Name of the local socket to listen on
    socket: String,
    /// File the location cache is persisted to
    #[arg(long, default_value = "qibla-test-cache.json")]
    store: PathBuf,
    /// JSON settings file, defaults are used when omitted
    #[arg(long)]
    settings: Option<PathBuf>,
    /// Start with location permission already granted
    #[arg(long)]
    granted: bool,
    /// How long every place name lookup takes
    #[arg(long, default_value_t = 0)]
    geocode_delay_ms: u64,
}

async fn write_resp(mut send: impl AsyncWrite + Unpin, resp: &TestingResponse) -> Result {
    let mut encoded = serde_json::to_vec(resp).context("Failed to encode response")?;
    encoded.push(b'\n');
    send.write_all(&encoded)
        .await
        .context("Failed to send response")
}

#[tokio::main(flavor = "current_thread")]
pub async fn main() -> Result {
    colog::init();

    let cli = Cli::parse();
    let socket_name = get_socket_name(cli.socket.clone())?;
    let opts = ListenerOptions::new().name(socket_name);
    let listener = opts.create_tokio().context("Failed to bind to socket")?;

    let mut state = DaemonState::new(&cli).context("Failed to start session")?;

    info!("Testing Daemon Ready");

    'server: loop {
        let res = tokio::select! {
            res = listener.accept() => {
                res
            },
            Ok(_) = tokio::signal::ctrl_c() => {
                break 'server;
            }
        };

        let stream = match res {
            Ok(stream) => stream,
            Err(why) => {
                error!("Error from connection: {why:?}");
                continue;
            }
        };

        let mut recv = BufReader::new(&stream);
        let send = &stream;
        let mut buffer = String::with_capacity(256);

        loop {
            tokio::select! {
                Ok(_) = tokio::signal::ctrl_c() => {
                    break 'server;
                }
                res = recv.read_line(&mut buffer) => {
                    match res {
                        Ok(0) => break,
                        Ok(_amnt) => {
                            let resp = match serde_json::from_str::<TestingRequest>(&buffer) {
                                Ok(req) => state.process_req(req).await.unwrap_or_else(Into::into),
                                Err(why) => TestingResponse::Error(format!("Bad request: {why}")),
                            };
                            buffer.clear();
                            write_resp(send, &resp).await?;
                            if matches!(resp, TestingResponse::SessionEnded) {
                                break 'server;
                            }
                        }
                        Err(why) => {
                            error!("Read Error: {why:?}");
                            break;
                        }
                    }
                }
            }
        }
    }

    if state.main_loop.is_some() {
        state.session.quit().await;
        if let Some(main_loop) = state.main_loop.take() {
            main_loop.await.context("Session task panicked")??;
        }
    }

    Ok(())
}
