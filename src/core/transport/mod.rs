//! Transport layer for reaching the device under test
//!
//! Two media are supported:
//! - Serial lines (RS-232, RS-485, USB-Serial)
//! - Raw TCP connections, with automatic reconnection
//!
//! Both variants buffer received bytes into a [`ReceiveBuffer`](crate::core::buffer::ReceiveBuffer)
//! and expose the same capability set, so the sequencer never cares which
//! medium it is driving.

mod serial;
mod tcp;

pub use serial::{SerialConfig, SerialParity, SerialStopBits, SerialTransport};
pub use tcp::{TcpConfig, TcpTransport};

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use tokio::sync::broadcast;

/// Transport error types
#[derive(Error, Debug)]
pub enum TransportError {
    /// Connection failed
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection timeout
    #[error("connection timeout after {0} seconds")]
    Timeout(u64),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Port not found
    #[error("port not found: {0}")]
    PortNotFound(String),

    /// Permission denied
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Not connected
    #[error("not connected")]
    NotConnected,

    /// Empty payload
    #[error("refusing to send an empty payload")]
    EmptyPayload,

    /// Send error
    #[error("send error: {0}")]
    SendError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Connection life-cycle notifications, consumed by whoever drives the run.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// The link came up
    Connected,
    /// The link went down (peer close, explicit disconnect)
    Disconnected,
    /// A transport-level failure; never fatal to the process
    Error(String),
}

/// Socket connection state machine.
///
/// `Closed` is terminal and only entered through an explicit disconnect;
/// recovery after a mid-stream failure goes back through `Connecting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never started
    Idle,
    /// Supervisor is attempting to establish the link
    Connecting,
    /// Link is up
    Connected,
    /// Explicitly torn down
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// The capability the sequencer depends on, regardless of medium.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Bring the link up. Tears down any existing connection first; for the
    /// socket variant this starts the supervisor and returns immediately.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Tear the link down. Idempotent; stops all background workers.
    async fn disconnect(&self);

    /// Whether the link is currently usable.
    fn is_connected(&self) -> bool;

    /// Send one payload. Fails fast when closed or when `data` is empty.
    async fn send(&self, data: &[u8]) -> Result<(), TransportError>;

    /// Render the receive buffer without consuming it.
    fn poll(&self, as_hex: bool) -> String;

    /// Reset the receive buffer to empty.
    fn clear(&self);

    /// Subscribe to connection life-cycle events.
    fn subscribe(&self) -> broadcast::Receiver<LinkEvent>;

    /// Human-readable endpoint description.
    fn connection_info(&self) -> String;
}
