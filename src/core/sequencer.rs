//! Scripted step execution engine
//!
//! The sequencer consumes a list of steps and an injected I/O capability,
//! runs the steps strictly in order, applies validation to replies, and
//! reports progress through an observer. Runs are single-shot or looping
//! with a fixed interval; `stop` is the one cancellation entry point and all
//! waits go through one cancellable sleep primitive.

use crate::core::codec;
use crate::core::script::{Step, StepKind, Validation, ValidationKind};
use crate::core::transport::Transport;
use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// The I/O capability a run drives, regardless of transport medium.
#[async_trait]
pub trait StepIo: Send + Sync {
    /// Send one payload; `true` on success.
    async fn send(&self, data: &[u8]) -> bool;

    /// Render whatever has been received so far, without consuming it.
    fn read(&self, as_hex: bool) -> String;

    /// Reset the receive buffer.
    fn clear(&self);
}

/// Adapter from any [`Transport`] to the sequencer's I/O capability.
pub struct TransportIo(pub Arc<dyn Transport>);

#[async_trait]
impl StepIo for TransportIo {
    async fn send(&self, data: &[u8]) -> bool {
        self.0.send(data).await.is_ok()
    }

    fn read(&self, as_hex: bool) -> String {
        self.0.poll(as_hex)
    }

    fn clear(&self) {
        self.0.clear();
    }
}

/// Outcome of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    /// The step succeeded
    Pass,
    /// The step failed (send error, validation miss, malformed payload)
    Fail,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => write!(f, "pass"),
            Self::Fail => write!(f, "fail"),
        }
    }
}

/// Progress notifications emitted by a run.
///
/// All methods default to no-ops, so a partially interested observer only
/// implements what it needs and the sequencer never fails for lack of one.
pub trait RunObserver: Send + Sync {
    /// A step finished with the given status.
    fn on_step(&self, _index: usize, _status: StepStatus) {}

    /// A full pass finished; `success` is the AND of all step results.
    fn on_result(&self, _success: bool) {}

    /// The run terminated. Fired exactly once per run.
    fn on_stop(&self) {}

    /// A new pass is starting; step displays should reset.
    fn on_reset(&self) {}

    /// Raw text received by a `receive` step, pass or fail.
    fn on_info(&self, _message: &str) {}
}

/// Observer that ignores everything.
pub struct NullObserver;

impl RunObserver for NullObserver {}

/// Tunable execution parameters.
///
/// The defaults mirror long-standing behavior (30 polls at 10 ms); they are
/// exposed rather than re-derived.
#[derive(Debug, Clone, Copy)]
pub struct SequencerConfig {
    /// Maximum poll attempts for a `receive` step
    pub receive_attempts: u32,
    /// Sleep between poll attempts in milliseconds
    pub receive_poll_ms: u64,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            receive_attempts: 30,
            receive_poll_ms: 10,
        }
    }
}

/// Drives scripted passes against an injected I/O capability.
pub struct StepSequencer {
    io: Arc<dyn StepIo>,
    observer: Arc<dyn RunObserver>,
    config: SequencerConfig,
    running: AtomicBool,
    stop_fired: AtomicBool,
    cancel: parking_lot::Mutex<CancellationToken>,
}

impl StepSequencer {
    /// Create a sequencer over the given I/O and observer.
    pub fn new(io: Arc<dyn StepIo>, observer: Arc<dyn RunObserver>) -> Self {
        Self {
            io,
            observer,
            config: SequencerConfig::default(),
            running: AtomicBool::new(false),
            stop_fired: AtomicBool::new(true),
            cancel: parking_lot::Mutex::new(CancellationToken::new()),
        }
    }

    /// Override the execution parameters.
    #[must_use]
    pub fn with_config(mut self, config: SequencerConfig) -> Self {
        self.config = config;
        self
    }

    /// Whether a run is in progress.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Terminate the current run.
    ///
    /// Idempotent and safe from any thread: the first call flips the running
    /// flag, cancels in-flight waits, and fires the stopped notification;
    /// later calls before a new run are no-ops.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            self.cancel.lock().cancel();
            self.fire_stop();
        }
    }

    /// Run the script once, or loop with `interval_secs` between passes
    /// until [`stop`](Self::stop) is called. A result is reported after
    /// every pass; the stopped notification fires exactly once on exit.
    pub async fn run_task(&self, once: bool, interval_secs: u64, steps: Vec<Step>) {
        self.running.store(true, Ordering::SeqCst);
        self.stop_fired.store(false, Ordering::SeqCst);
        *self.cancel.lock() = CancellationToken::new();

        if once {
            let result = self.run_once(&steps).await;
            self.observer.on_result(result);
        } else {
            while self.is_running() && !self.cancelled() {
                let result = self.run_once(&steps).await;
                self.observer.on_result(result);

                if !self.is_running() {
                    break;
                }
                self.paced_delay(interval_secs * 1000).await;
            }
        }

        self.running.store(false, Ordering::SeqCst);
        self.fire_stop();
    }

    /// Execute one pass over `steps` strictly in order.
    ///
    /// An empty script is an immediate failure with no step notifications.
    /// Every step runs to completion even after a failure; the pass result
    /// is the AND of all step results.
    pub async fn run_once(&self, steps: &[Step]) -> bool {
        if steps.is_empty() {
            return false;
        }

        self.observer.on_reset();
        let mut success = true;

        for (index, step) in steps.iter().enumerate() {
            let passed = self.execute_step(step).await;
            let status = if passed { StepStatus::Pass } else { StepStatus::Fail };
            debug!(index, %status, "step finished");
            self.observer.on_step(index, status);
            if !passed {
                success = false;
            }
        }

        success
    }

    async fn execute_step(&self, step: &Step) -> bool {
        match &step.kind {
            StepKind::Send => match codec::to_bytes(&step.content, step.is_hex) {
                Ok(data) => self.io.send(&data).await,
                Err(e) => {
                    warn!(step = %step.name, "cannot encode payload: {e}");
                    false
                }
            },
            StepKind::Receive => {
                let mut received = String::new();
                for _ in 0..self.config.receive_attempts {
                    received = self.io.read(step.is_hex);
                    if !received.is_empty() {
                        break;
                    }
                    self.paced_delay(self.config.receive_poll_ms).await;
                }
                let passed = validate(&received, step.validation.as_ref());
                self.observer.on_info(&received);
                passed
            }
            StepKind::Delay => {
                // Cancellation ends the run, not the step.
                self.paced_delay(step.delay_ms).await;
                true
            }
            StepKind::Clear => {
                self.io.clear();
                true
            }
            StepKind::Unknown(kind) => {
                warn!("unknown step type {kind:?}");
                false
            }
        }
    }

    /// The single cancellable sleep behind receive polling, delay steps and
    /// the inter-pass interval.
    async fn paced_delay(&self, ms: u64) {
        if ms == 0 {
            return;
        }
        let token = self.cancel.lock().clone();
        tokio::select! {
            _ = token.cancelled() => {}
            _ = tokio::time::sleep(Duration::from_millis(ms)) => {}
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel.lock().is_cancelled()
    }

    fn fire_stop(&self) {
        if !self.stop_fired.swap(true, Ordering::SeqCst) {
            self.observer.on_stop();
        }
    }
}

/// Judge a received reply against a step's validation rule. Absence of a
/// rule always passes; an unknown rule type always fails.
fn validate(received: &str, validation: Option<&Validation>) -> bool {
    let Some(validation) = validation else {
        return true;
    };
    match &validation.kind {
        ValidationKind::Exists => !received.is_empty(),
        ValidationKind::Equals => received == validation.value,
        ValidationKind::Contains => received.contains(&validation.value),
        ValidationKind::Unknown(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::script::Validation;

    #[test]
    fn test_validate_missing_rule_passes() {
        assert!(validate("", None));
        assert!(validate("anything", None));
    }

    #[test]
    fn test_validate_exists() {
        assert!(validate("x", Some(&Validation::exists())));
        assert!(!validate("", Some(&Validation::exists())));
    }

    #[test]
    fn test_validate_equals() {
        assert!(validate("OK", Some(&Validation::equals("OK"))));
        assert!(!validate("OK\r\n", Some(&Validation::equals("OK"))));
    }

    #[test]
    fn test_validate_contains() {
        assert!(validate("RESPONSE OK", Some(&Validation::contains("OK"))));
        assert!(!validate("ERROR", Some(&Validation::contains("OK"))));
    }

    #[test]
    fn test_validate_unknown_rule_fails() {
        let rule = Validation {
            kind: ValidationKind::Unknown("regex".to_string()),
            value: "OK".to_string(),
        };
        assert!(!validate("OK", Some(&rule)));
    }
}
