//! # Probekit Core Library
//!
//! A scripted functional-test runner for hardware devices reachable over a
//! serial line or a TCP socket:
//!
//! - Transports with buffered reception and automatic socket reconnection
//! - Opaque byte payloads: literal text or hex-pair strings
//! - Step scripts (send / receive / delay / clear) with reply validation
//! - Single-shot or looping execution with cooperative cancellation
//!
//! ## Example
//!
//! ```rust,no_run
//! use probekit::{NullObserver, Step, StepSequencer, TcpConfig, TcpTransport,
//!                Transport, TransportIo, Validation};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let transport: Arc<dyn Transport> =
//!         Arc::new(TcpTransport::new(TcpConfig::new("192.168.1.50", 5025)));
//!     transport.connect().await?;
//!
//!     let sequencer = StepSequencer::new(
//!         Arc::new(TransportIo(transport.clone())),
//!         Arc::new(NullObserver),
//!     );
//!
//!     let script = vec![
//!         Step::send("AA BB", true),
//!         Step::delay(50),
//!         Step::receive(false, Some(Validation::contains("OK"))),
//!     ];
//!     sequencer.run_task(true, 0, script).await;
//!
//!     transport.disconnect().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod core;

// Re-exports for convenience
pub use crate::config::{ConfigError, RunProfile, TransportProfile};
pub use crate::core::buffer::{ReceiveBuffer, SERIAL_BUFFER_CAPACITY, SOCKET_BUFFER_CAPACITY};
pub use crate::core::codec::{decode_hex, encode_hex, CodecError};
pub use crate::core::script::{
    parse_script, ScriptStore, Step, StepKind, Validation, ValidationKind,
};
pub use crate::core::sequencer::{
    NullObserver, RunObserver, SequencerConfig, StepIo, StepSequencer, StepStatus, TransportIo,
};
pub use crate::core::transport::{
    ConnectionState, LinkEvent, SerialConfig, SerialParity, SerialStopBits, SerialTransport,
    TcpConfig, TcpTransport, Transport, TransportError,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
