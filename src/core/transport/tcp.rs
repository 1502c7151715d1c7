//! TCP transport with automatic reconnection
//!
//! One supervisor task owns connection establishment and recovery; one reader
//! task drains the socket into the receive buffer while the link is up. Both
//! first connection and reconnection go through the same supervisor loop, so
//! there is a single state machine to reason about. The supervisor retries
//! forever (bounded back-off) until an explicit disconnect.

use super::{ConnectionState, LinkEvent, Transport, TransportError};
use crate::core::buffer::{ReceiveBuffer, SOCKET_BUFFER_CAPACITY};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// TCP connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpConfig {
    /// Host address: a literal IP or `localhost`
    pub host: String,
    /// Port number
    pub port: u16,
    /// Per-attempt connect timeout in seconds
    #[serde(rename = "connectTimeoutSecs", default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Back-off between reconnect attempts in milliseconds
    #[serde(rename = "retryDelayMs", default = "default_retry_delay")]
    pub retry_delay_ms: u64,
    /// Receive buffer capacity in bytes
    #[serde(rename = "bufferCapacity", default = "default_socket_capacity")]
    pub buffer_capacity: usize,
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_retry_delay() -> u64 {
    2000
}

fn default_socket_capacity() -> usize {
    SOCKET_BUFFER_CAPACITY
}

impl TcpConfig {
    /// Create a new TCP configuration with default timings.
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            connect_timeout_secs: default_connect_timeout(),
            retry_delay_ms: default_retry_delay(),
            buffer_capacity: SOCKET_BUFFER_CAPACITY,
        }
    }

    /// Set per-attempt connect timeout
    #[must_use]
    pub fn connect_timeout(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    /// Set reconnect back-off
    #[must_use]
    pub fn retry_delay(mut self, ms: u64) -> Self {
        self.retry_delay_ms = ms;
        self
    }

    /// Set receive buffer capacity
    #[must_use]
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self::new("localhost", 5025)
    }
}

/// State shared between the transport handle and its background workers.
struct Shared {
    config: TcpConfig,
    stream: tokio::sync::Mutex<Option<TcpStream>>,
    buffer: ReceiveBuffer,
    state: RwLock<ConnectionState>,
    running: AtomicBool,
    reconnect: AtomicBool,
    supervising: AtomicBool,
    event_tx: broadcast::Sender<LinkEvent>,
}

impl Shared {
    fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
    }

    fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    fn emit(&self, event: LinkEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Drop the stream and fall back to `Connecting` after a mid-stream
    /// failure. No-op when the transport was explicitly closed.
    async fn mark_lost(&self) {
        *self.stream.lock().await = None;
        if self.running.load(Ordering::SeqCst) {
            self.set_state(ConnectionState::Connecting);
        }
        self.emit(LinkEvent::Disconnected);
    }
}

/// TCP transport with a reconnect supervisor
pub struct TcpTransport {
    shared: Arc<Shared>,
    cancel: parking_lot::Mutex<CancellationToken>,
}

impl TcpTransport {
    /// Create a transport for the given endpoint. Nothing is connected until
    /// [`Transport::connect`] is called.
    pub fn new(config: TcpConfig) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        let buffer = ReceiveBuffer::new(config.buffer_capacity);
        Self {
            shared: Arc::new(Shared {
                config,
                stream: tokio::sync::Mutex::new(None),
                buffer,
                state: RwLock::new(ConnectionState::Idle),
                running: AtomicBool::new(false),
                reconnect: AtomicBool::new(false),
                supervising: AtomicBool::new(false),
                event_tx,
            }),
            cancel: parking_lot::Mutex::new(CancellationToken::new()),
        }
    }

    /// Current position in the connection state machine.
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    fn validate_config(&self) -> Result<(), TransportError> {
        let host = &self.shared.config.host;
        if host.parse::<IpAddr>().is_err() && !host.eq_ignore_ascii_case("localhost") {
            let message = format!("invalid host: {host}");
            self.shared.emit(LinkEvent::Error(message.clone()));
            return Err(TransportError::InvalidConfiguration(message));
        }
        if self.shared.config.port == 0 {
            let message = "invalid port: 0".to_string();
            self.shared.emit(LinkEvent::Error(message.clone()));
            return Err(TransportError::InvalidConfiguration(message));
        }
        Ok(())
    }

    /// Start the supervisor task unless one is already active.
    fn spawn_supervisor(shared: Arc<Shared>, cancel: CancellationToken) {
        if shared.supervising.swap(true, Ordering::SeqCst) {
            return;
        }
        tokio::spawn(async move {
            Self::supervisor_loop(&shared, &cancel).await;
            shared.supervising.store(false, Ordering::SeqCst);
        });
    }

    /// Establish the connection, retrying with back-off until it comes up or
    /// the transport is told to stop. Handles both first connection and
    /// recovery; on success it hands off to the reader task and exits.
    async fn supervisor_loop(shared: &Arc<Shared>, cancel: &CancellationToken) {
        let addr = format!("{}:{}", shared.config.host, shared.config.port);

        while shared.running.load(Ordering::SeqCst)
            && shared.reconnect.load(Ordering::SeqCst)
            && !cancel.is_cancelled()
        {
            if shared.state() == ConnectionState::Connected {
                return;
            }

            shared.set_state(ConnectionState::Connecting);
            debug!("attempting to connect to {addr}");

            let attempt = tokio::time::timeout(
                Duration::from_secs(shared.config.connect_timeout_secs),
                TcpStream::connect(&addr),
            )
            .await;

            match attempt {
                Ok(Ok(stream)) => {
                    stream.set_nodelay(true).ok();
                    *shared.stream.lock().await = Some(stream);
                    shared.set_state(ConnectionState::Connected);
                    info!("connected to {addr}");
                    shared.emit(LinkEvent::Connected);

                    let reader_shared = shared.clone();
                    let reader_cancel = cancel.clone();
                    tokio::spawn(async move {
                        Self::reader_loop(&reader_shared, &reader_cancel).await;
                    });
                    return;
                }
                Ok(Err(e)) => {
                    warn!("connect to {addr} failed: {e}");
                    shared.emit(LinkEvent::Error(format!("connect failed: {e}")));
                }
                Err(_) => {
                    warn!(
                        "connect to {addr} timed out after {}s",
                        shared.config.connect_timeout_secs
                    );
                    shared.emit(LinkEvent::Error("connect timed out".to_string()));
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(Duration::from_millis(shared.config.retry_delay_ms)) => {}
            }
        }
    }

    /// Drain the socket into the receive buffer while the link is up. A peer
    /// close or I/O failure re-enters the supervisor and ends this task.
    async fn reader_loop(shared: &Arc<Shared>, cancel: &CancellationToken) {
        let mut chunk = [0u8; 2048];

        loop {
            if !shared.running.load(Ordering::SeqCst) || cancel.is_cancelled() {
                return;
            }

            let read = {
                let guard = shared.stream.lock().await;
                match guard.as_ref() {
                    Some(stream) => stream.try_read(&mut chunk),
                    None => {
                        // Stream was torn down underneath us.
                        return;
                    }
                }
            };

            match read {
                Ok(0) => {
                    warn!("peer closed the connection");
                    shared.emit(LinkEvent::Error("peer closed the connection".to_string()));
                    shared.mark_lost().await;
                    break;
                }
                Ok(n) => {
                    debug!(bytes = n, "socket data received");
                    // Overflow is logged and swallowed inside the buffer.
                    let _ = shared.buffer.append(&chunk[..n]);
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(Duration::from_millis(5)) => {}
                    }
                }
                Err(e) => {
                    warn!("socket read failed: {e}");
                    shared.emit(LinkEvent::Error(format!("socket read failed: {e}")));
                    shared.mark_lost().await;
                    break;
                }
            }
        }

        if shared.running.load(Ordering::SeqCst) && shared.reconnect.load(Ordering::SeqCst) {
            Self::spawn_supervisor(shared.clone(), cancel.clone());
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    /// Validate the endpoint and start the connection supervisor. Returns as
    /// soon as supervision is underway; the `Connected` event signals the
    /// link actually coming up.
    async fn connect(&self) -> Result<(), TransportError> {
        self.validate_config()?;

        if self.is_connected() {
            self.disconnect().await;
        }

        self.shared.running.store(true, Ordering::SeqCst);
        self.shared.reconnect.store(true, Ordering::SeqCst);

        let token = CancellationToken::new();
        *self.cancel.lock() = token.clone();

        Self::spawn_supervisor(self.shared.clone(), token);
        Ok(())
    }

    async fn disconnect(&self) {
        let was_active = self.shared.running.swap(false, Ordering::SeqCst);
        self.shared.reconnect.store(false, Ordering::SeqCst);
        self.cancel.lock().cancel();

        if let Some(mut stream) = self.shared.stream.lock().await.take() {
            stream.shutdown().await.ok();
        }

        self.shared.set_state(ConnectionState::Closed);
        if was_active {
            info!("disconnected from {}", self.connection_info());
            self.shared.emit(LinkEvent::Disconnected);
        }
    }

    fn is_connected(&self) -> bool {
        self.shared.state() == ConnectionState::Connected
    }

    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        if !self.shared.running.load(Ordering::SeqCst) || !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        if data.is_empty() {
            return Err(TransportError::EmptyPayload);
        }

        let result = {
            let mut guard = self.shared.stream.lock().await;
            match guard.as_mut() {
                Some(stream) => {
                    let write = stream.write_all(data).await;
                    match write {
                        Ok(()) => stream.flush().await,
                        Err(e) => Err(e),
                    }
                }
                None => return Err(TransportError::NotConnected),
            }
        };

        match result {
            Ok(()) => {
                debug!(bytes = data.len(), "socket data sent");
                Ok(())
            }
            Err(e) => {
                warn!("socket send failed: {e}");
                self.shared
                    .emit(LinkEvent::Error(format!("send failed: {e}")));
                self.shared.mark_lost().await;
                Self::spawn_supervisor(self.shared.clone(), self.cancel.lock().clone());
                Err(TransportError::SendError(e.to_string()))
            }
        }
    }

    fn poll(&self, as_hex: bool) -> String {
        self.shared.buffer.render(as_hex)
    }

    fn clear(&self) {
        self.shared.buffer.clear();
    }

    fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.shared.event_tx.subscribe()
    }

    fn connection_info(&self) -> String {
        format!("{}:{}", self.shared.config.host, self.shared.config.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejects_invalid_host() {
        let transport = TcpTransport::new(TcpConfig::new("not a host", 8080));
        let err = transport.connect().await.unwrap_err();
        assert!(matches!(err, TransportError::InvalidConfiguration(_)));
        assert_eq!(transport.state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn test_rejects_port_zero() {
        let transport = TcpTransport::new(TcpConfig::new("127.0.0.1", 0));
        let err = transport.connect().await.unwrap_err();
        assert!(matches!(err, TransportError::InvalidConfiguration(_)));
    }

    #[tokio::test]
    async fn test_accepts_localhost_literal() {
        let transport = TcpTransport::new(TcpConfig::new("LocalHost", 1));
        assert!(transport.validate_config().is_ok());
    }

    #[tokio::test]
    async fn test_send_fails_fast_when_idle() {
        let transport = TcpTransport::new(TcpConfig::default());
        let err = transport.send(b"payload").await.unwrap_err();
        assert!(matches!(err, TransportError::NotConnected));
    }

    #[tokio::test]
    async fn test_disconnect_is_safe_when_never_connected() {
        let transport = TcpTransport::new(TcpConfig::default());
        transport.disconnect().await;
        transport.disconnect().await;
        assert_eq!(transport.state(), ConnectionState::Closed);
        assert!(!transport.is_connected());
    }
}
