//! Guider client connection
//!
//! A [`GuiderLink`] is one live connection to the guider's event server.
//! Requests are written as JSON lines and matched to their responses by
//! id; events arriving in between are folded into an [`EventSnapshot`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};

use gl_core::config::GuiderConfig;
use gl_core::SessionError;
use gl_protocol::{GuideStep, GuiderCodec, GuiderEvent, GuiderMessage, RpcRequest, RpcResponse};

/// Settling progress reported while a guide or dither settles
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettleProgress {
    pub distance: f64,
    pub time: f64,
    pub settle_time: f64,
    pub star_locked: bool,
}

/// Result of the last completed settle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettleOutcome {
    /// 0 on success
    pub status: i32,
    pub error: Option<String>,
}

/// Latest state learned from guider events
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EventSnapshot {
    pub app_state: Option<String>,
    pub version: Option<String>,
    pub last_step: Option<GuideStep>,
    pub settling: Option<SettleProgress>,
    pub last_settle: Option<SettleOutcome>,
    pub last_alert: Option<String>,
}

impl EventSnapshot {
    /// Fold one event into the snapshot
    pub fn apply(&mut self, event: &GuiderEvent) {
        if let Some(state) = event.implied_state() {
            self.app_state = Some(state.to_string());
        }

        match event {
            GuiderEvent::Version { version, .. } => self.version = Some(version.clone()),
            GuiderEvent::GuideStep(step) => self.last_step = Some(step.clone()),
            GuiderEvent::SettleBegin => {
                self.settling = None;
                self.last_settle = None;
            }
            GuiderEvent::Settling {
                distance,
                time,
                settle_time,
                star_locked,
            } => {
                self.settling = Some(SettleProgress {
                    distance: *distance,
                    time: *time,
                    settle_time: *settle_time,
                    star_locked: *star_locked,
                });
            }
            GuiderEvent::SettleDone { status, error } => {
                self.settling = None;
                self.last_settle = Some(SettleOutcome {
                    status: *status,
                    error: error.clone(),
                });
            }
            GuiderEvent::Alert { message, .. } => self.last_alert = Some(message.clone()),
            _ => {}
        }
    }
}

/// One live connection to the guider
#[async_trait]
pub trait GuiderLink: Send + Sync + 'static {
    /// Send a request and wait for its response
    async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, SessionError>;

    /// Whether the connection is still usable
    fn is_connected(&self) -> bool;

    /// Latest state learned from events
    fn snapshot(&self) -> EventSnapshot {
        EventSnapshot::default()
    }

    /// Close the connection
    async fn close(&self) -> Result<(), SessionError>;
}

/// Opens links to the guider
#[async_trait]
pub trait GuiderConnector: Send + Sync + 'static {
    type Link: GuiderLink;

    /// Open one connection; a single attempt, no retry
    async fn open(&self, host: &str, port: u16) -> Result<Self::Link, SessionError>;
}

/// Connector for the guider's TCP event server
#[derive(Debug, Clone)]
pub struct TcpConnector {
    request_timeout: Duration,
}

impl TcpConnector {
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }

    pub fn from_config(config: &GuiderConfig) -> Self {
        Self::new(config.request_timeout)
    }
}

#[async_trait]
impl GuiderConnector for TcpConnector {
    type Link = TcpGuiderClient;

    async fn open(&self, host: &str, port: u16) -> Result<Self::Link, SessionError> {
        TcpGuiderClient::connect(host, port, self.request_timeout).await
    }
}

type PendingMap = Mutex<HashMap<u64, oneshot::Sender<RpcResponse>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared between the client and its reader task
struct Shared {
    address: String,
    pending: PendingMap,
    snapshot: Mutex<EventSnapshot>,
    connected: AtomicBool,
}

/// Guider connection over TCP
pub struct TcpGuiderClient {
    shared: Arc<Shared>,
    writer: tokio::sync::Mutex<FramedWrite<OwnedWriteHalf, GuiderCodec>>,
    next_id: AtomicU64,
    request_timeout: Duration,
    reader: JoinHandle<()>,
}

impl TcpGuiderClient {
    /// Connect to the event server at `host:port`
    pub async fn connect(
        host: &str,
        port: u16,
        request_timeout: Duration,
    ) -> Result<Self, SessionError> {
        let address = format!("{}:{}", host, port);
        tracing::debug!("Opening guider connection to {}", address);

        let stream = TcpStream::connect(&address)
            .await
            .map_err(|e| SessionError::Transport(format!("Failed to connect to {}: {}", address, e)))?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("Could not set TCP_NODELAY on {}: {}", address, e);
        }

        let (read_half, write_half) = stream.into_split();
        let shared = Arc::new(Shared {
            address,
            pending: Mutex::new(HashMap::new()),
            snapshot: Mutex::new(EventSnapshot::default()),
            connected: AtomicBool::new(true),
        });

        let reader = tokio::spawn(read_loop(
            FramedRead::new(read_half, GuiderCodec::new()),
            Arc::clone(&shared),
        ));

        Ok(Self {
            shared,
            writer: tokio::sync::Mutex::new(FramedWrite::new(write_half, GuiderCodec::new())),
            next_id: AtomicU64::new(1),
            request_timeout,
            reader,
        })
    }

    /// `host:port` this client is connected to
    pub fn address(&self) -> &str {
        &self.shared.address
    }

    fn forget(&self, id: u64) {
        lock(&self.shared.pending).remove(&id);
    }
}

/// Route responses to their waiters and fold events into the snapshot
/// until the stream ends
async fn read_loop(mut frames: FramedRead<OwnedReadHalf, GuiderCodec>, shared: Arc<Shared>) {
    while let Some(item) = frames.next().await {
        match item {
            Ok(GuiderMessage::Response(response)) => {
                let waiter = lock(&shared.pending).remove(&response.id);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(response);
                    }
                    None => tracing::debug!("Response for unknown request id {}", response.id),
                }
            }
            Ok(GuiderMessage::Event(event)) => {
                tracing::trace!(?event, "Guider event");
                lock(&shared.snapshot).apply(&event);
            }
            Ok(GuiderMessage::Malformed { line, reason }) => {
                tracing::warn!("Ignoring malformed line from guider ({}): {:.80}", reason, line);
            }
            Err(e) => {
                tracing::warn!("Guider stream error from {}: {}", shared.address, e);
                break;
            }
        }
    }

    // Mark dead before dropping waiters so a racing call sees one or the other
    shared.connected.store(false, Ordering::SeqCst);
    lock(&shared.pending).clear();
    tracing::info!("Guider connection to {} closed", shared.address);
}

#[async_trait]
impl GuiderLink for TcpGuiderClient {
    async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, SessionError> {
        if !self.is_connected() {
            return Err(SessionError::NotConnected);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        lock(&self.shared.pending).insert(id, tx);
        if !self.is_connected() {
            self.forget(id);
            return Err(SessionError::NotConnected);
        }

        tracing::debug!("-> {} (id {})", method, id);
        let sent = {
            let mut writer = self.writer.lock().await;
            writer.send(RpcRequest::new(id, method, params)).await
        };
        if let Err(e) = sent {
            self.forget(id);
            return Err(SessionError::Transport(format!(
                "Failed to send '{}': {}",
                method, e
            )));
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => {
                tracing::debug!("<- {} (id {})", method, id);
                response.into_result().map_err(SessionError::from)
            }
            Ok(Err(_)) => Err(SessionError::Transport(format!(
                "Connection closed while waiting for '{}'",
                method
            ))),
            Err(_) => {
                self.forget(id);
                Err(SessionError::Timeout {
                    method: method.to_string(),
                })
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    fn snapshot(&self) -> EventSnapshot {
        lock(&self.shared.snapshot).clone()
    }

    async fn close(&self) -> Result<(), SessionError> {
        self.shared.connected.store(false, Ordering::SeqCst);
        let result = {
            let mut writer = self.writer.lock().await;
            writer.get_mut().shutdown().await
        };
        self.reader.abort();
        lock(&self.shared.pending).clear();
        tracing::debug!("Closed guider connection to {}", self.shared.address);

        result.map_err(|e| {
            SessionError::Transport(format!("Failed to close {}: {}", self.shared.address, e))
        })
    }
}

impl Drop for TcpGuiderClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_tracks_state_and_settle() {
        let mut snapshot = EventSnapshot::default();

        snapshot.apply(&GuiderEvent::AppState {
            state: "Looping".into(),
        });
        assert_eq!(snapshot.app_state.as_deref(), Some("Looping"));

        snapshot.apply(&GuiderEvent::StartGuiding);
        snapshot.apply(&GuiderEvent::SettleBegin);
        snapshot.apply(&GuiderEvent::Settling {
            distance: 2.5,
            time: 3.0,
            settle_time: 10.0,
            star_locked: true,
        });
        assert_eq!(snapshot.app_state.as_deref(), Some("Guiding"));
        assert_eq!(snapshot.settling.as_ref().map(|s| s.distance), Some(2.5));

        snapshot.apply(&GuiderEvent::SettleDone {
            status: 0,
            error: None,
        });
        assert!(snapshot.settling.is_none());
        assert_eq!(snapshot.last_settle.as_ref().map(|s| s.status), Some(0));
    }

    #[test]
    fn test_snapshot_ignores_unknown_events() {
        let mut snapshot = EventSnapshot::default();
        snapshot.apply(&GuiderEvent::Unknown);
        assert_eq!(snapshot, EventSnapshot::default());
    }

    #[tokio::test]
    async fn test_connect_refused_is_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = TcpGuiderClient::connect("127.0.0.1", port, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(SessionError::Transport(_))));
    }
}
