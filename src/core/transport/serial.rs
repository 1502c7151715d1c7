//! Serial line transport
//!
//! One blocking reader thread per open line appends incoming bytes into the
//! shared receive buffer. The line itself has no reconnect supervisor; a
//! dropped USB adapter surfaces as an error event and the line stays closed
//! until reopened.

use super::{LinkEvent, Transport, TransportError};
use crate::core::buffer::{ReceiveBuffer, SERIAL_BUFFER_CAPACITY};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Fixed read/write timeout for serial I/O.
const IO_TIMEOUT: Duration = Duration::from_millis(500);

/// Serial parity setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerialParity {
    /// No parity
    #[default]
    None,
    /// Odd parity
    Odd,
    /// Even parity
    Even,
}

impl std::str::FromStr for SerialParity {
    type Err = std::convert::Infallible;

    /// Unrecognized values fall back to no parity with a logged warning.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "none" | "n" => Self::None,
            "odd" | "o" => Self::Odd,
            "even" | "e" => Self::Even,
            other => {
                warn!("unrecognized parity {other:?}, falling back to none");
                Self::None
            }
        })
    }
}

/// Serial stop bits setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SerialStopBits {
    /// One stop bit
    #[default]
    #[serde(rename = "1")]
    One,
    /// One and a half stop bits (unsupported by the host driver layer;
    /// mapped to one stop bit at open)
    #[serde(rename = "1.5")]
    OnePointFive,
    /// Two stop bits
    #[serde(rename = "2")]
    Two,
}

impl std::str::FromStr for SerialStopBits {
    type Err = std::convert::Infallible;

    /// Unrecognized values fall back to one stop bit with a logged warning.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "1" => Self::One,
            "1.5" => Self::OnePointFive,
            "2" => Self::Two,
            other => {
                warn!("unrecognized stop bits {other:?}, falling back to 1");
                Self::One
            }
        })
    }
}

/// Serial line configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Port name (e.g., COM3, /dev/ttyUSB0)
    pub port: String,
    /// Baud rate
    #[serde(rename = "baudRate")]
    pub baud_rate: u32,
    /// Data bits (5, 6, 7, 8)
    #[serde(rename = "dataBits", default = "default_data_bits")]
    pub data_bits: u8,
    /// Parity
    #[serde(default)]
    pub parity: SerialParity,
    /// Stop bits
    #[serde(rename = "stopBits", default)]
    pub stop_bits: SerialStopBits,
    /// Receive buffer capacity in bytes
    #[serde(rename = "bufferCapacity", default = "default_serial_capacity")]
    pub buffer_capacity: usize,
}

fn default_data_bits() -> u8 {
    8
}

fn default_serial_capacity() -> usize {
    SERIAL_BUFFER_CAPACITY
}

impl SerialConfig {
    /// Create a configuration with 8-N-1 framing.
    pub fn new(port: &str, baud_rate: u32) -> Self {
        Self {
            port: port.to_string(),
            baud_rate,
            data_bits: 8,
            parity: SerialParity::None,
            stop_bits: SerialStopBits::One,
            buffer_capacity: SERIAL_BUFFER_CAPACITY,
        }
    }

    /// Set data bits
    #[must_use]
    pub fn data_bits(mut self, bits: u8) -> Self {
        self.data_bits = bits;
        self
    }

    /// Set parity
    #[must_use]
    pub fn parity(mut self, parity: SerialParity) -> Self {
        self.parity = parity;
        self
    }

    /// Set stop bits
    #[must_use]
    pub fn stop_bits(mut self, stop_bits: SerialStopBits) -> Self {
        self.stop_bits = stop_bits;
        self
    }

    /// Set receive buffer capacity
    #[must_use]
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self::new("/dev/ttyUSB0", 115200)
    }
}

/// Serial line transport
pub struct SerialTransport {
    config: SerialConfig,
    port: Arc<Mutex<Option<Box<dyn SerialPort>>>>,
    buffer: Arc<ReceiveBuffer>,
    running: Arc<AtomicBool>,
    reader: Mutex<Option<JoinHandle<()>>>,
    event_tx: broadcast::Sender<LinkEvent>,
}

impl SerialTransport {
    /// Create a transport for the given line. The line is not opened until
    /// [`Transport::connect`] is called.
    pub fn new(config: SerialConfig) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        let buffer = Arc::new(ReceiveBuffer::new(config.buffer_capacity));
        Self {
            config,
            port: Arc::new(Mutex::new(None)),
            buffer,
            running: Arc::new(AtomicBool::new(false)),
            reader: Mutex::new(None),
            event_tx,
        }
    }

    fn map_data_bits(&self) -> DataBits {
        match self.config.data_bits {
            5 => DataBits::Five,
            6 => DataBits::Six,
            7 => DataBits::Seven,
            8 => DataBits::Eight,
            other => {
                warn!("unrecognized data bits {other}, falling back to 8");
                DataBits::Eight
            }
        }
    }

    fn map_stop_bits(&self) -> StopBits {
        match self.config.stop_bits {
            SerialStopBits::One => StopBits::One,
            SerialStopBits::Two => StopBits::Two,
            SerialStopBits::OnePointFive => {
                warn!("1.5 stop bits not supported, falling back to 1");
                StopBits::One
            }
        }
    }

    fn map_parity(&self) -> Parity {
        match self.config.parity {
            SerialParity::None => Parity::None,
            SerialParity::Odd => Parity::Odd,
            SerialParity::Even => Parity::Even,
        }
    }

    /// Surface a synchronous open failure as an error event before returning
    /// it to the caller.
    fn fail_connect(&self, err: TransportError) -> TransportError {
        let _ = self.event_tx.send(LinkEvent::Error(err.to_string()));
        err
    }

    fn spawn_reader(&self, mut port: Box<dyn SerialPort>) {
        let buffer = self.buffer.clone();
        let running = self.running.clone();
        let event_tx = self.event_tx.clone();

        let handle = std::thread::spawn(move || {
            let mut chunk = [0u8; 512];
            while running.load(Ordering::SeqCst) {
                match port.read(&mut chunk) {
                    Ok(0) => std::thread::sleep(Duration::from_millis(5)),
                    Ok(n) => {
                        debug!(bytes = n, "serial data received");
                        // Overflow is logged and swallowed inside the buffer.
                        let _ = buffer.append(&chunk[..n]);
                    }
                    Err(ref e)
                        if e.kind() == std::io::ErrorKind::TimedOut
                            || e.kind() == std::io::ErrorKind::Interrupted =>
                    {
                        continue;
                    }
                    Err(e) => {
                        if running.load(Ordering::SeqCst) {
                            warn!("serial read failed: {e}");
                            let _ = event_tx.send(LinkEvent::Error(format!("serial read failed: {e}")));
                        }
                        break;
                    }
                }
            }
        });

        *self.reader.lock() = Some(handle);
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        if self.is_connected() {
            self.disconnect().await;
        }

        let opened = serialport::new(&self.config.port, self.config.baud_rate)
            .data_bits(self.map_data_bits())
            .stop_bits(self.map_stop_bits())
            .parity(self.map_parity())
            .flow_control(FlowControl::None)
            .timeout(IO_TIMEOUT)
            .open();

        let port = match opened {
            Ok(port) => port,
            Err(e) => {
                let err = match e.kind() {
                    serialport::ErrorKind::NoDevice => {
                        TransportError::PortNotFound(self.config.port.clone())
                    }
                    serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
                        TransportError::PermissionDenied(self.config.port.clone())
                    }
                    _ => TransportError::ConnectionFailed(e.to_string()),
                };
                return Err(self.fail_connect(err));
            }
        };

        let reader_port = port
            .try_clone()
            .map_err(|e| self.fail_connect(TransportError::ConnectionFailed(e.to_string())))?;

        self.buffer.clear();
        self.running.store(true, Ordering::SeqCst);
        *self.port.lock() = Some(port);
        self.spawn_reader(reader_port);

        info!("opened {}", self.connection_info());
        let _ = self.event_tx.send(LinkEvent::Connected);
        Ok(())
    }

    async fn disconnect(&self) {
        let was_open = self.port.lock().is_some();
        self.running.store(false, Ordering::SeqCst);

        // Reader exits within one read timeout once the flag drops.
        if let Some(handle) = self.reader.lock().take() {
            let _ = handle.join();
        }

        *self.port.lock() = None;
        self.buffer.clear();

        if was_open {
            info!("closed {}", self.config.port);
            let _ = self.event_tx.send(LinkEvent::Disconnected);
        }
    }

    fn is_connected(&self) -> bool {
        self.port.lock().is_some()
    }

    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        if data.is_empty() {
            return Err(TransportError::EmptyPayload);
        }

        let mut guard = self.port.lock();
        let port = guard.as_mut().ok_or(TransportError::NotConnected)?;

        port.write_all(data).map_err(TransportError::IoError)?;
        port.flush().map_err(TransportError::IoError)?;
        debug!(bytes = data.len(), "serial data sent");
        Ok(())
    }

    fn poll(&self, as_hex: bool) -> String {
        self.buffer.render(as_hex)
    }

    fn clear(&self) {
        self.buffer.clear();
    }

    fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.event_tx.subscribe()
    }

    fn connection_info(&self) -> String {
        format!(
            "{} @ {} baud ({}{}{})",
            self.config.port,
            self.config.baud_rate,
            self.config.data_bits,
            match self.config.parity {
                SerialParity::None => "N",
                SerialParity::Odd => "O",
                SerialParity::Even => "E",
            },
            match self.config.stop_bits {
                SerialStopBits::One => "1",
                SerialStopBits::OnePointFive => "1.5",
                SerialStopBits::Two => "2",
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parity_parse_with_fallback() {
        assert_eq!("odd".parse::<SerialParity>().unwrap(), SerialParity::Odd);
        assert_eq!("E".parse::<SerialParity>().unwrap(), SerialParity::Even);
        assert_eq!("bogus".parse::<SerialParity>().unwrap(), SerialParity::None);
    }

    #[test]
    fn test_stop_bits_parse_with_fallback() {
        assert_eq!("2".parse::<SerialStopBits>().unwrap(), SerialStopBits::Two);
        assert_eq!(
            "1.5".parse::<SerialStopBits>().unwrap(),
            SerialStopBits::OnePointFive
        );
        assert_eq!("9".parse::<SerialStopBits>().unwrap(), SerialStopBits::One);
    }

    #[test]
    fn test_unsupported_framing_maps_to_safe_default() {
        let transport = SerialTransport::new(
            SerialConfig::new("/dev/null", 9600)
                .data_bits(9)
                .stop_bits(SerialStopBits::OnePointFive),
        );
        assert_eq!(transport.map_data_bits(), DataBits::Eight);
        assert_eq!(transport.map_stop_bits(), StopBits::One);
    }

    #[test]
    fn test_send_fails_fast_when_closed() {
        let transport = SerialTransport::new(SerialConfig::default());
        let err = tokio_test::block_on(transport.send(b"AT")).unwrap_err();
        assert!(matches!(err, TransportError::NotConnected));
        let err = tokio_test::block_on(transport.send(b"")).unwrap_err();
        assert!(matches!(err, TransportError::EmptyPayload));
    }

    #[test]
    fn test_open_failure_emits_error_event() {
        let transport =
            SerialTransport::new(SerialConfig::new("/definitely/not/a/port0", 9600));
        let mut rx = transport.subscribe();

        let err = tokio_test::block_on(transport.connect()).unwrap_err();
        assert!(matches!(
            err,
            TransportError::PortNotFound(_) | TransportError::ConnectionFailed(_)
        ));
        assert!(matches!(rx.try_recv(), Ok(LinkEvent::Error(_))));
        assert!(!transport.is_connected());
    }

    #[test]
    fn test_connection_info_format() {
        let transport = SerialTransport::new(SerialConfig::new("COM3", 9600));
        assert_eq!(transport.connection_info(), "COM3 @ 9600 baud (8N1)");
    }
}
