//! Guider session
//!
//! [`GuiderSession`] owns the connection to one guider instance. It moves
//! between three phases:
//!
//! ```text
//! NoClient --connect--> ConnectInFlight --success--> Connected
//!    ^                        |                          |
//!    +---- exhausted / cancelled / deadline              |
//!    +------------------- disconnect / link lost --------+
//! ```
//!
//! Only one connect sequence runs at a time. It is spawned as its own task
//! and publishes its outcome on a `watch` channel, so every caller that
//! asked for a connect while it was running receives the same result.
//!
//! Control commands never trigger or wait for a connect: without a live
//! link they fail with [`SessionError::NotConnected`]. Queries first wait
//! for a connect already in flight.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;

use gl_core::config::GuiderConfig;
use gl_core::SessionError;

use crate::backoff::LinearBackoff;
use crate::client::{GuiderConnector, GuiderLink, TcpConnector};
use crate::commands::{
    adjust_param_value, Axis, DecGuideMode, GuiderProfile, GuiderStatus, SettleParams,
    PARAM_VERIFY_TOLERANCE,
};

type ConnectOutcome = Result<(), SessionError>;

/// Observable connection phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    NoClient,
    ConnectInFlight,
    Connected,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionPhase::NoClient => "disconnected",
            SessionPhase::ConnectInFlight => "connecting",
            SessionPhase::Connected => "connected",
        })
    }
}

/// Handle on a running connect sequence
struct InFlight {
    id: u64,
    outcome: watch::Receiver<Option<ConnectOutcome>>,
    cancel: CancellationToken,
}

enum Phase {
    NoClient,
    ConnectInFlight(InFlight),
    Connected,
}

struct SessionState<L> {
    phase: Phase,
    client: Option<Arc<L>>,
    last_error: Option<String>,
    next_flight: u64,
}

impl<L: GuiderLink> SessionState<L> {
    fn is_flight(&self, id: u64) -> bool {
        matches!(&self.phase, Phase::ConnectInFlight(flight) if flight.id == id)
    }

    /// Drop a Connected client that has seen end of stream
    fn release_dead_client(&mut self) {
        if !matches!(self.phase, Phase::Connected) {
            return;
        }
        let alive = self.client.as_ref().map_or(false, |c| c.is_connected());
        if !alive {
            tracing::warn!("Guider connection lost");
            self.phase = Phase::NoClient;
            self.client = None;
            self.last_error = Some("connection lost".to_string());
        }
    }

    fn live_client(&mut self) -> Option<Arc<L>> {
        self.release_dead_client();
        match self.phase {
            Phase::Connected => self.client.clone(),
            _ => None,
        }
    }

    fn public_phase(&self) -> SessionPhase {
        match self.phase {
            Phase::NoClient => SessionPhase::NoClient,
            Phase::ConnectInFlight(_) => SessionPhase::ConnectInFlight,
            Phase::Connected => SessionPhase::Connected,
        }
    }
}

enum AttemptError {
    Cancelled,
    Failed(String),
}

struct SessionInner<C: GuiderConnector> {
    config: GuiderConfig,
    connector: C,
    state: Mutex<SessionState<C::Link>>,
    attempts: AtomicU32,
    shutdown: CancellationToken,
}

impl<C: GuiderConnector> SessionInner<C> {
    /// Body of the spawned connect task
    async fn run_connect(self: Arc<Self>, flight: u64, cancel: CancellationToken) -> ConnectOutcome {
        let sequence = self.attempt_sequence(flight, &cancel);
        let result = match self.config.connect_deadline {
            Some(deadline) => tokio::select! {
                biased;
                result = sequence => result,
                _ = tokio::time::sleep(deadline) => {
                    tracing::warn!(
                        "Connect to guider at {} did not finish within {:?}",
                        self.config.address(),
                        deadline
                    );
                    Err(SessionError::ConnectDeadline {
                        seconds: deadline.as_secs(),
                    })
                }
            },
            None => sequence.await,
        };

        if let Err(e) = &result {
            cancel.cancel();
            let mut state = self.state.lock().await;
            if state.is_flight(flight) {
                state.phase = Phase::NoClient;
                if !matches!(e, SessionError::ConnectExhausted { .. }) {
                    state.last_error = Some(e.to_string());
                }
            }
        }
        result
    }

    async fn attempt_sequence(&self, flight: u64, cancel: &CancellationToken) -> ConnectOutcome {
        let backoff = LinearBackoff::from_config(&self.config.retry);
        let mut last_error = String::new();

        for attempt in 1..=backoff.max_attempts() {
            match self.attempt(flight, attempt, cancel).await {
                Ok(()) => return Ok(()),
                Err(AttemptError::Cancelled) => {
                    tracing::debug!("Connect to guider cancelled");
                    return Err(SessionError::ConnectCancelled);
                }
                Err(AttemptError::Failed(e)) => last_error = e,
            }

            match backoff.delay_after(attempt) {
                Some(delay) => {
                    tracing::warn!(
                        "Connect attempt {}/{} failed: {}. Retrying in {:?}",
                        attempt,
                        backoff.max_attempts(),
                        last_error,
                        delay
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(SessionError::ConnectCancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                None => tracing::warn!(
                    "Connect attempt {}/{} failed: {}",
                    attempt,
                    backoff.max_attempts(),
                    last_error
                ),
            }
        }

        Err(SessionError::ConnectExhausted {
            host: self.config.host.clone(),
            port: self.config.port(),
            attempts: backoff.max_attempts(),
            last_error,
        })
    }

    /// One physical attempt. The replace decision is made under the state
    /// lock; the open itself runs outside it and its link is only installed
    /// if this sequence is still the current one.
    async fn attempt(
        &self,
        flight: u64,
        attempt: u32,
        cancel: &CancellationToken,
    ) -> Result<(), AttemptError> {
        let previous = {
            let mut state = self.state.lock().await;
            if cancel.is_cancelled() || !state.is_flight(flight) {
                return Err(AttemptError::Cancelled);
            }
            state.client.take()
        };
        if let Some(previous) = previous {
            teardown(&*previous).await;
        }

        self.attempts.fetch_add(1, Ordering::SeqCst);
        let host = self.config.host.as_str();
        let port = self.config.port();
        tracing::debug!("Connect attempt {} to {}:{}", attempt, host, port);

        let timeout = self.config.connect_timeout;
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AttemptError::Cancelled),
            opened = tokio::time::timeout(timeout, self.connector.open(host, port)) => opened,
        };
        let link = match opened {
            Ok(Ok(link)) => link,
            Ok(Err(e)) => return Err(self.record_failure(flight, e.to_string()).await),
            Err(_) => {
                let message = format!("connect timed out after {:?}", timeout);
                return Err(self.record_failure(flight, message).await);
            }
        };

        let mut state = self.state.lock().await;
        if cancel.is_cancelled() || !state.is_flight(flight) {
            drop(state);
            teardown(&link).await;
            return Err(AttemptError::Cancelled);
        }
        state.client = Some(Arc::new(link));
        state.last_error = None;
        state.phase = Phase::Connected;
        tracing::info!("Connected to guider at {}:{}", host, port);
        Ok(())
    }

    async fn record_failure(&self, flight: u64, message: String) -> AttemptError {
        let mut state = self.state.lock().await;
        if state.is_flight(flight) {
            state.last_error = Some(message.clone());
        }
        AttemptError::Failed(message)
    }
}

async fn teardown<L: GuiderLink>(link: &L) {
    if let Err(e) = link.close().await {
        tracing::warn!("Error closing guider connection: {}", e);
    }
}

async fn wait_for_outcome(mut outcome: watch::Receiver<Option<ConnectOutcome>>) -> ConnectOutcome {
    let published = match outcome.wait_for(Option::is_some).await {
        Ok(value) => value.clone(),
        // The connect task went away without publishing
        Err(_) => None,
    };
    published.unwrap_or(Err(SessionError::ConnectCancelled))
}

fn decode<T: DeserializeOwned>(method: &str, value: Value) -> Result<T, SessionError> {
    serde_json::from_value(value).map_err(|e| SessionError::UnexpectedResponse {
        method: method.to_string(),
        detail: e.to_string(),
    })
}

/// Owner of the shared session state. The connect task only holds the
/// state itself, so dropping the last owner cancels any running connect.
struct SessionOwner<C: GuiderConnector> {
    shared: Arc<SessionInner<C>>,
}

impl<C: GuiderConnector> std::ops::Deref for SessionOwner<C> {
    type Target = SessionInner<C>;

    fn deref(&self) -> &SessionInner<C> {
        &self.shared
    }
}

impl<C: GuiderConnector> Drop for SessionOwner<C> {
    fn drop(&mut self) {
        if !self.shared.shutdown.is_cancelled() {
            tracing::debug!("Guider session for {} dropped", self.shared.config.address());
            self.shared.shutdown.cancel();
        }
    }
}

/// Connection to one guider instance
///
/// Clones share one connection. When the last clone is dropped, a running
/// connect is cancelled and the link is closed once the connect task exits.
pub struct GuiderSession<C: GuiderConnector = TcpConnector> {
    inner: Arc<SessionOwner<C>>,
}

impl<C: GuiderConnector> Clone for GuiderSession<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl GuiderSession<TcpConnector> {
    /// Session talking TCP to the configured guider instance
    pub fn new(config: GuiderConfig) -> Self {
        let connector = TcpConnector::from_config(&config);
        Self::with_connector(config, connector)
    }
}

impl<C: GuiderConnector> GuiderSession<C> {
    pub fn with_connector(config: GuiderConfig, connector: C) -> Self {
        Self {
            inner: Arc::new(SessionOwner {
                shared: Arc::new(SessionInner {
                    config,
                    connector,
                    state: Mutex::new(SessionState {
                        phase: Phase::NoClient,
                        client: None,
                        last_error: None,
                        next_flight: 0,
                    }),
                    attempts: AtomicU32::new(0),
                    shutdown: CancellationToken::new(),
                }),
            }),
        }
    }

    pub fn config(&self) -> &GuiderConfig {
        &self.inner.config
    }

    /// `host:port` of the guider instance
    pub fn address(&self) -> String {
        self.inner.config.address()
    }

    pub async fn phase(&self) -> SessionPhase {
        let mut state = self.inner.state.lock().await;
        state.release_dead_client();
        state.public_phase()
    }

    /// Most recent connect failure, cleared by a successful connect
    pub async fn last_error(&self) -> Option<String> {
        self.inner.state.lock().await.last_error.clone()
    }

    /// Physical connect attempts made over the session's lifetime
    pub fn connect_attempts(&self) -> u32 {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    pub async fn is_connected(&self) -> bool {
        self.phase().await == SessionPhase::Connected
    }

    /// Connect to the guider, or join the connect already running.
    ///
    /// Returns immediately when a live link exists. Otherwise starts one
    /// retry sequence (or attaches to the running one) and waits for its
    /// outcome, which every concurrent caller receives identically.
    pub async fn connect(&self) -> Result<(), SessionError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(SessionError::ConnectCancelled);
        }

        let outcome = {
            let mut state = self.inner.state.lock().await;
            state.release_dead_client();
            let joined = match &state.phase {
                Phase::Connected => return Ok(()),
                Phase::ConnectInFlight(flight) => Some(flight.outcome.clone()),
                Phase::NoClient => None,
            };
            match joined {
                Some(outcome) => {
                    tracing::debug!("Joining in-flight connect to {}", self.address());
                    outcome
                }
                None => self.start_connect(&mut state),
            }
        };

        wait_for_outcome(outcome).await
    }

    fn start_connect(
        &self,
        state: &mut SessionState<C::Link>,
    ) -> watch::Receiver<Option<ConnectOutcome>> {
        state.next_flight += 1;
        let id = state.next_flight;
        let (tx, rx) = watch::channel(None);
        let cancel = self.inner.shutdown.child_token();

        state.phase = Phase::ConnectInFlight(InFlight {
            id,
            outcome: rx.clone(),
            cancel: cancel.clone(),
        });
        tracing::info!("Connecting to guider at {}", self.address());

        let inner = Arc::clone(&self.inner.shared);
        tokio::spawn(async move {
            let outcome = inner.run_connect(id, cancel).await;
            tx.send_replace(Some(outcome));
        });
        rx
    }

    /// Cancel a running connect sequence. Returns whether one was running.
    pub async fn cancel_connect(&self) -> bool {
        let mut state = self.inner.state.lock().await;
        if let Phase::ConnectInFlight(flight) = &state.phase {
            flight.cancel.cancel();
            state.phase = Phase::NoClient;
            state.last_error = Some(SessionError::ConnectCancelled.to_string());
            tracing::info!("Cancelled connect to guider at {}", self.address());
            true
        } else {
            false
        }
    }

    /// Drop the link (closing it) and cancel any running connect
    pub async fn disconnect(&self) {
        let client = {
            let mut state = self.inner.state.lock().await;
            if let Phase::ConnectInFlight(flight) = &state.phase {
                flight.cancel.cancel();
            }
            state.phase = Phase::NoClient;
            state.client.take()
        };

        if let Some(client) = client {
            teardown(&*client).await;
            tracing::info!("Disconnected from guider at {}", self.address());
        }
    }

    /// Cancel all work and close the link. Later connects are refused.
    pub async fn shutdown(&self) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        self.inner.shutdown.cancel();
        self.disconnect().await;
        tracing::debug!("Guider session for {} shut down", self.address());
    }

    /// Live link, or `NotConnected` without waiting
    async fn control_link(&self) -> Result<Arc<C::Link>, SessionError> {
        self.inner
            .state
            .lock()
            .await
            .live_client()
            .ok_or(SessionError::NotConnected)
    }

    /// Live link after any in-flight connect has finished
    async fn query_link(&self) -> Result<Arc<C::Link>, SessionError> {
        let pending = match &self.inner.state.lock().await.phase {
            Phase::ConnectInFlight(flight) => Some(flight.outcome.clone()),
            _ => None,
        };
        if let Some(outcome) = pending {
            tracing::debug!("Query waiting for in-flight connect");
            // The query reports its own failure below
            let _ = wait_for_outcome(outcome).await;
        }
        self.control_link().await
    }

    async fn command(&self, method: &str, params: Option<Value>) -> Result<Value, SessionError> {
        let link = self.control_link().await?;
        link.call(method, params).await
    }

    async fn query(&self, method: &str, params: Option<Value>) -> Result<Value, SessionError> {
        let link = self.query_link().await?;
        link.call(method, params).await
    }

    // Control commands

    /// Start guiding and settle
    pub async fn guide(&self, settle: SettleParams, recalibrate: bool) -> Result<(), SessionError> {
        let params = json!({ "settle": settle, "recalibrate": recalibrate });
        self.command("guide", Some(params)).await.map(drop)
    }

    /// Shift the lock position by up to `amount` pixels and settle
    pub async fn dither(
        &self,
        amount: f64,
        ra_only: bool,
        settle: SettleParams,
    ) -> Result<(), SessionError> {
        let params = json!({ "amount": amount, "raOnly": ra_only, "settle": settle });
        self.command("dither", Some(params)).await.map(drop)
    }

    pub async fn pause(&self) -> Result<(), SessionError> {
        self.command("set_paused", Some(json!([true]))).await.map(drop)
    }

    pub async fn unpause(&self) -> Result<(), SessionError> {
        self.command("set_paused", Some(json!([false]))).await.map(drop)
    }

    /// Start looping exposures
    pub async fn start_looping(&self) -> Result<(), SessionError> {
        self.command("loop", None).await.map(drop)
    }

    /// Stop looping and guiding
    pub async fn stop_capture(&self) -> Result<(), SessionError> {
        self.command("stop_capture", None).await.map(drop)
    }

    pub async fn set_exposure(&self, exposure_ms: u32) -> Result<(), SessionError> {
        self.command("set_exposure", Some(json!([exposure_ms])))
            .await
            .map(drop)
    }

    pub async fn set_dec_guide_mode(&self, mode: DecGuideMode) -> Result<(), SessionError> {
        self.command("set_dec_guide_mode", Some(json!([mode.as_str()])))
            .await
            .map(drop)
    }

    pub async fn set_lock_position(&self, x: f64, y: f64, exact: bool) -> Result<(), SessionError> {
        self.command("set_lock_position", Some(json!([x, y, exact])))
            .await
            .map(drop)
    }

    /// Switch the guider to one of its equipment profiles
    pub async fn set_profile(&self, profile_id: u32) -> Result<(), SessionError> {
        self.command("set_profile", Some(json!([profile_id])))
            .await
            .map(drop)
    }

    /// Set a guide algorithm parameter and read it back.
    ///
    /// The value is rounded to three decimals and nudged by
    /// [`PARAM_EPSILON`](crate::PARAM_EPSILON) before sending. A read-back
    /// that disagrees is logged, never returned as an error.
    pub async fn set_algo_param(&self, axis: Axis, name: &str, value: f64) -> Result<(), SessionError> {
        let link = self.control_link().await?;
        let sent = adjust_param_value(value);

        link.call(
            "set_algo_param",
            Some(json!([axis.as_str(), name, sent])),
        )
        .await?;

        match link
            .call("get_algo_param", Some(json!([axis.as_str(), name])))
            .await
        {
            Ok(readback) => match readback.as_f64() {
                Some(stored) if (stored - sent).abs() <= PARAM_VERIFY_TOLERANCE => {
                    tracing::debug!("{} {} set to {}", axis, name, stored);
                }
                Some(stored) => tracing::warn!(
                    "Guider stored {} {} = {} after we sent {}",
                    axis,
                    name,
                    stored,
                    sent
                ),
                None => tracing::warn!("Non-numeric read-back for {} {}: {}", axis, name, readback),
            },
            Err(e) => tracing::warn!("Could not read back {} {}: {}", axis, name, e),
        }
        Ok(())
    }

    // Queries

    /// Application state plus what events have told us
    pub async fn status(&self) -> Result<GuiderStatus, SessionError> {
        let link = self.query_link().await?;
        let reported = link.call("get_app_state", None).await?;
        let events = link.snapshot();

        let app_state = match reported {
            Value::String(state) => state,
            _ => events
                .app_state
                .clone()
                .unwrap_or_else(|| "Unknown".to_string()),
        };
        Ok(GuiderStatus { app_state, events })
    }

    /// Image scale in arc-seconds per pixel; 0.0 while not yet known
    pub async fn pixel_scale(&self) -> Result<f64, SessionError> {
        self.optics_value("get_pixel_scale").await
    }

    /// Guide scope focal length in millimetres; 0.0 while not yet known
    pub async fn focal_length(&self) -> Result<f64, SessionError> {
        self.optics_value("get_focal_length").await
    }

    async fn optics_value(&self, method: &str) -> Result<f64, SessionError> {
        match self.query(method, None).await {
            Ok(Value::Null) => {
                tracing::debug!("{} returned null, using 0", method);
                Ok(0.0)
            }
            Ok(value) => decode(method, value),
            Err(SessionError::Protocol(e)) if e.is_transient_unavailable() => {
                tracing::debug!("{} unavailable ({}), using 0", method, e.kind);
                Ok(0.0)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn get_algo_param(&self, axis: Axis, name: &str) -> Result<f64, SessionError> {
        let value = self
            .query("get_algo_param", Some(json!([axis.as_str(), name])))
            .await?;
        decode("get_algo_param", value)
    }

    /// Names of the algorithm parameters available on `axis`
    pub async fn algo_param_names(&self, axis: Axis) -> Result<Vec<String>, SessionError> {
        let value = self
            .query("get_algo_param_names", Some(json!([axis.as_str()])))
            .await?;
        decode("get_algo_param_names", value)
    }

    /// Current exposure in milliseconds
    pub async fn get_exposure(&self) -> Result<u32, SessionError> {
        let value = self.query("get_exposure", None).await?;
        decode("get_exposure", value)
    }

    /// Equipment profiles known to the running guider
    pub async fn guider_profiles(&self) -> Result<Vec<GuiderProfile>, SessionError> {
        let value = self.query("get_profiles", None).await?;
        decode("get_profiles", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    use async_trait::async_trait;
    use gl_core::config::RetryConfig;
    use gl_protocol::RpcError;

    /// Guider-side state shared by every link a mock connector hands out
    #[derive(Default)]
    struct MockGuider {
        connected: AtomicBool,
        closed: AtomicBool,
        calls: std::sync::Mutex<Vec<(String, Option<Value>)>>,
        params: std::sync::Mutex<HashMap<String, f64>>,
        /// Value the guider stores instead of what it was sent
        store_override: Option<f64>,
        pixel_scale: Option<Result<Value, RpcError>>,
    }

    impl MockGuider {
        fn methods(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|(m, _)| m.clone()).collect()
        }
    }

    struct MockLink {
        guider: Arc<MockGuider>,
    }

    #[async_trait]
    impl GuiderLink for MockLink {
        async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, SessionError> {
            self.guider
                .calls
                .lock()
                .unwrap()
                .push((method.to_string(), params.clone()));

            let params = params.unwrap_or(Value::Null);
            match method {
                "get_app_state" => Ok(json!("Guiding")),
                "get_pixel_scale" => match &self.guider.pixel_scale {
                    Some(result) => result.clone().map_err(SessionError::from),
                    None => Ok(json!(1.94)),
                },
                "set_algo_param" => {
                    let name = params[1].as_str().unwrap().to_string();
                    let value = self.guider.store_override.unwrap_or(params[2].as_f64().unwrap());
                    self.guider.params.lock().unwrap().insert(name, value);
                    Ok(json!(0))
                }
                "get_algo_param" => {
                    let params_map = self.guider.params.lock().unwrap();
                    match params_map.get(params[1].as_str().unwrap()) {
                        Some(value) => Ok(json!(value)),
                        None => Err(RpcError::new(1, "could not get param").into()),
                    }
                }
                _ => Ok(json!(0)),
            }
        }

        fn is_connected(&self) -> bool {
            self.guider.connected.load(Ordering::SeqCst)
        }

        async fn close(&self) -> Result<(), SessionError> {
            self.guider.connected.store(false, Ordering::SeqCst);
            self.guider.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct MockConnector {
        opens: Arc<AtomicU32>,
        /// Opens numbered up to this fail
        fail_first: u32,
        open_delay: Duration,
        hang: bool,
        guider: Arc<MockGuider>,
    }

    impl MockConnector {
        fn new(guider: MockGuider) -> Self {
            Self {
                opens: Arc::new(AtomicU32::new(0)),
                fail_first: 0,
                open_delay: Duration::ZERO,
                hang: false,
                guider: Arc::new(guider),
            }
        }

        fn refusing() -> Self {
            Self {
                fail_first: u32::MAX,
                ..Self::new(MockGuider::default())
            }
        }
    }

    #[async_trait]
    impl GuiderConnector for MockConnector {
        type Link = MockLink;

        async fn open(&self, _host: &str, _port: u16) -> Result<MockLink, SessionError> {
            let n = self.opens.fetch_add(1, Ordering::SeqCst) + 1;
            if self.hang {
                std::future::pending::<()>().await;
            }
            if !self.open_delay.is_zero() {
                tokio::time::sleep(self.open_delay).await;
            }
            if n <= self.fail_first {
                return Err(SessionError::Transport("Connection refused".into()));
            }
            self.guider.connected.store(true, Ordering::SeqCst);
            Ok(MockLink {
                guider: Arc::clone(&self.guider),
            })
        }
    }

    fn test_config() -> GuiderConfig {
        GuiderConfig {
            connect_timeout: Duration::from_secs(5),
            connect_deadline: None,
            retry: RetryConfig {
                max_attempts: 3,
                delay: Duration::from_millis(10),
            },
            ..GuiderConfig::default()
        }
    }

    async fn wait_for_phase<C: GuiderConnector>(session: &GuiderSession<C>, phase: SessionPhase) {
        while session.phase().await != phase {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_connects_share_one_sequence() {
        let connector = MockConnector::refusing();
        let opens = Arc::clone(&connector.opens);
        let session = GuiderSession::with_connector(test_config(), connector);

        let (first, second) = tokio::join!(session.connect(), session.connect());

        assert_eq!(opens.load(Ordering::SeqCst), 3);
        assert_eq!(session.connect_attempts(), 3);
        assert_eq!(first, second);
        match first {
            Err(SessionError::ConnectExhausted {
                host,
                port,
                attempts,
                last_error,
            }) => {
                assert_eq!(host, "localhost");
                assert_eq!(port, 4400);
                assert_eq!(attempts, 3);
                assert!(last_error.contains("Connection refused"));
            }
            other => panic!("expected ConnectExhausted, got {:?}", other),
        }
        assert_eq!(session.phase().await, SessionPhase::NoClient);
        assert!(session.last_error().await.unwrap().contains("refused"));

        // A later connect starts a fresh sequence
        let _ = session.connect().await;
        assert_eq!(opens.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_control_command_fails_fast_without_client() {
        let connector = MockConnector::new(MockGuider::default());
        let opens = Arc::clone(&connector.opens);
        let session = GuiderSession::with_connector(test_config(), connector);

        assert_eq!(session.pause().await, Err(SessionError::NotConnected));
        assert_eq!(
            session.guide(SettleParams::default(), false).await,
            Err(SessionError::NotConnected)
        );
        assert_eq!(
            session.set_algo_param(Axis::Ra, "MinMove", 0.2).await,
            Err(SessionError::NotConnected)
        );
        assert_eq!(opens.load(Ordering::SeqCst), 0);
        assert_eq!(session.phase().await, SessionPhase::NoClient);
    }

    #[tokio::test]
    async fn test_query_without_connect_is_not_connected() {
        let session =
            GuiderSession::with_connector(test_config(), MockConnector::new(MockGuider::default()));
        assert_eq!(session.pixel_scale().await, Err(SessionError::NotConnected));
        assert_eq!(session.connect_attempts(), 0);
    }

    #[tokio::test]
    async fn test_connect_when_connected_is_noop() {
        let connector = MockConnector::new(MockGuider::default());
        let opens = Arc::clone(&connector.opens);
        let session = GuiderSession::with_connector(test_config(), connector);

        session.connect().await.unwrap();
        session.connect().await.unwrap();

        assert_eq!(opens.load(Ordering::SeqCst), 1);
        assert!(session.is_connected().await);
        assert_eq!(session.last_error().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_after_failures() {
        let connector = MockConnector {
            fail_first: 2,
            ..MockConnector::new(MockGuider::default())
        };
        let session = GuiderSession::with_connector(test_config(), connector);

        session.connect().await.unwrap();
        assert_eq!(session.connect_attempts(), 3);
        assert_eq!(session.last_error().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_waits_for_in_flight_connect() {
        let connector = MockConnector {
            open_delay: Duration::from_millis(100),
            ..MockConnector::new(MockGuider::default())
        };
        let session = GuiderSession::with_connector(test_config(), connector);

        let background = {
            let session = session.clone();
            tokio::spawn(async move { session.connect().await })
        };
        wait_for_phase(&session, SessionPhase::ConnectInFlight).await;

        // Control commands do not wait
        assert_eq!(session.pause().await, Err(SessionError::NotConnected));

        let status = session.status().await.unwrap();
        assert_eq!(status.app_state, "Guiding");
        assert_eq!(background.await.unwrap(), Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_connect() {
        let connector = MockConnector {
            open_delay: Duration::from_secs(3),
            ..MockConnector::new(MockGuider::default())
        };
        let session = GuiderSession::with_connector(test_config(), connector);

        let background = {
            let session = session.clone();
            tokio::spawn(async move { session.connect().await })
        };
        wait_for_phase(&session, SessionPhase::ConnectInFlight).await;

        assert!(session.cancel_connect().await);
        assert!(!session.cancel_connect().await);
        assert_eq!(background.await.unwrap(), Err(SessionError::ConnectCancelled));
        assert_eq!(session.phase().await, SessionPhase::NoClient);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_deadline() {
        let connector = MockConnector {
            hang: true,
            ..MockConnector::new(MockGuider::default())
        };
        let config = GuiderConfig {
            connect_timeout: Duration::from_secs(30),
            connect_deadline: Some(Duration::from_secs(2)),
            ..test_config()
        };
        let session = GuiderSession::with_connector(config, connector);

        let result = session.connect().await;
        assert_eq!(result, Err(SessionError::ConnectDeadline { seconds: 2 }));
        assert_eq!(session.phase().await, SessionPhase::NoClient);
        assert!(session.last_error().await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_counts_as_failure() {
        let connector = MockConnector {
            hang: true,
            ..MockConnector::new(MockGuider::default())
        };
        let config = GuiderConfig {
            connect_timeout: Duration::from_secs(1),
            ..test_config()
        };
        let session = GuiderSession::with_connector(config, connector);

        match session.connect().await {
            Err(SessionError::ConnectExhausted { last_error, .. }) => {
                assert!(last_error.contains("timed out"));
            }
            other => panic!("expected ConnectExhausted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dead_link_is_released() {
        let connector = MockConnector::new(MockGuider::default());
        let guider = Arc::clone(&connector.guider);
        let session = GuiderSession::with_connector(test_config(), connector);
        session.connect().await.unwrap();

        guider.connected.store(false, Ordering::SeqCst);

        assert_eq!(session.stop_capture().await, Err(SessionError::NotConnected));
        assert_eq!(session.phase().await, SessionPhase::NoClient);
        assert_eq!(session.last_error().await.as_deref(), Some("connection lost"));
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let connector = MockConnector::new(MockGuider::default());
        let guider = Arc::clone(&connector.guider);
        let session = GuiderSession::with_connector(test_config(), connector);
        session.connect().await.unwrap();

        session.shutdown().await;
        session.shutdown().await;

        assert!(guider.closed.load(Ordering::SeqCst));
        assert_eq!(session.phase().await, SessionPhase::NoClient);
        assert_eq!(session.connect().await, Err(SessionError::ConnectCancelled));
    }

    #[tokio::test]
    async fn test_set_algo_param_sends_adjusted_value_and_reads_back() {
        let connector = MockConnector::new(MockGuider::default());
        let guider = Arc::clone(&connector.guider);
        let session = GuiderSession::with_connector(test_config(), connector);
        session.connect().await.unwrap();

        session.set_algo_param(Axis::Ra, "MinMove", 0.7).await.unwrap();

        assert_eq!(guider.methods(), vec!["set_algo_param", "get_algo_param"]);
        let calls = guider.calls.lock().unwrap();
        let sent = calls[0].1.as_ref().unwrap();
        assert_eq!(sent[0], "ra");
        assert_eq!(sent[1], "MinMove");
        assert!((sent[2].as_f64().unwrap() - 0.701).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_set_algo_param_mismatch_is_not_an_error() {
        let connector = MockConnector::new(MockGuider {
            store_override: Some(0.5),
            ..MockGuider::default()
        });
        let session = GuiderSession::with_connector(test_config(), connector);
        session.connect().await.unwrap();

        assert_eq!(session.set_algo_param(Axis::Dec, "Aggressiveness", 0.9).await, Ok(()));
        assert_eq!(session.get_algo_param(Axis::Dec, "Aggressiveness").await, Ok(0.5));
    }

    #[tokio::test]
    async fn test_pixel_scale_downgrades_benign_errors() {
        let connector = MockConnector::new(MockGuider {
            pixel_scale: Some(Err(RpcError::new(1, "pixel scale metadata not available"))),
            ..MockGuider::default()
        });
        let session = GuiderSession::with_connector(test_config(), connector);
        session.connect().await.unwrap();

        assert_eq!(session.pixel_scale().await, Ok(0.0));
    }

    #[tokio::test]
    async fn test_pixel_scale_null_and_real_errors() {
        let connector = MockConnector::new(MockGuider {
            pixel_scale: Some(Ok(Value::Null)),
            ..MockGuider::default()
        });
        let session = GuiderSession::with_connector(test_config(), connector);
        session.connect().await.unwrap();
        assert_eq!(session.pixel_scale().await, Ok(0.0));

        let connector = MockConnector::new(MockGuider {
            pixel_scale: Some(Err(RpcError::new(1, "camera not connected"))),
            ..MockGuider::default()
        });
        let session = GuiderSession::with_connector(test_config(), connector);
        session.connect().await.unwrap();
        assert!(matches!(
            session.pixel_scale().await,
            Err(SessionError::Protocol(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_session_stops_connect_retries() {
        let connector = MockConnector::refusing();
        let opens = Arc::clone(&connector.opens);
        let config = GuiderConfig {
            retry: RetryConfig {
                max_attempts: 50,
                delay: Duration::from_secs(1),
            },
            ..test_config()
        };
        let session = GuiderSession::with_connector(config, connector);

        let caller = {
            let session = session.clone();
            tokio::spawn(async move { session.connect().await })
        };
        while opens.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        caller.abort();
        let _ = caller.await;
        drop(session);

        let at_drop = opens.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(opens.load(Ordering::SeqCst), at_drop);
        assert!(at_drop < 50);
    }

    #[tokio::test]
    async fn test_dropping_session_closes_link_after_connect_task_exits() {
        let connector = MockConnector {
            open_delay: Duration::from_millis(50),
            ..MockConnector::new(MockGuider::default())
        };
        let guider = Arc::clone(&connector.guider);
        let session = GuiderSession::with_connector(test_config(), connector);

        let other = session.clone();
        drop(session);
        // A remaining clone keeps the session usable
        other.connect().await.unwrap();
        assert!(other.is_connected().await);
        assert!(!guider.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_disconnect_closes_link() {
        let connector = MockConnector::new(MockGuider::default());
        let guider = Arc::clone(&connector.guider);
        let session = GuiderSession::with_connector(test_config(), connector);
        session.connect().await.unwrap();

        session.disconnect().await;

        assert!(guider.closed.load(Ordering::SeqCst));
        assert_eq!(session.phase().await, SessionPhase::NoClient);
        // A disconnected session can connect again
        session.connect().await.unwrap();
        assert!(session.is_connected().await);
    }
}
