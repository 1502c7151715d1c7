//! Probekit - scripted functional test runner
//!
//! Feeds a step script to a device over serial or TCP and reports pass/fail
//! per step and per pass. The heavy lifting lives in the library; this binary
//! only parses arguments, wires the transport to the sequencer and renders
//! notifications as log lines.

use anyhow::Context;
use clap::{Parser, Subcommand};
use probekit::{
    LinkEvent, RunObserver, RunProfile, SerialConfig, SerialParity, SerialStopBits,
    SerialTransport, Step, StepSequencer, StepStatus, TcpConfig, TcpTransport, Transport,
    TransportIo,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "probekit", version, about = "Scripted functional test runner for serial and TCP devices")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a script against a device on a serial line
    Serial {
        /// Port name (e.g., COM3, /dev/ttyUSB0)
        #[arg(long)]
        port: String,
        /// Baud rate
        #[arg(long, default_value_t = 115200)]
        baud: u32,
        /// Data bits
        #[arg(long, default_value_t = 8)]
        data_bits: u8,
        /// Parity: none, odd or even
        #[arg(long, default_value = "none")]
        parity: SerialParity,
        /// Stop bits: 1, 1.5 or 2
        #[arg(long, default_value = "1")]
        stop_bits: SerialStopBits,
        /// Path to the script JSON
        #[arg(long)]
        script: PathBuf,
        /// Loop forever with this many seconds between passes
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Run a script against a device on a TCP socket
    Tcp {
        /// Host: a literal IP or `localhost`
        #[arg(long)]
        host: String,
        /// Port number
        #[arg(long)]
        port: u16,
        /// Path to the script JSON
        #[arg(long)]
        script: PathBuf,
        /// Loop forever with this many seconds between passes
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Run from a TOML profile
    Run {
        /// Path to the profile
        #[arg(long)]
        profile: PathBuf,
    },
}

/// Renders sequencer notifications as log lines and remembers the last pass
/// result for the exit code.
struct CliObserver {
    last_result: AtomicBool,
}

impl CliObserver {
    fn new() -> Self {
        Self {
            last_result: AtomicBool::new(false),
        }
    }
}

impl RunObserver for CliObserver {
    fn on_step(&self, index: usize, status: StepStatus) {
        match status {
            StepStatus::Pass => info!("step {index}: pass"),
            StepStatus::Fail => warn!("step {index}: fail"),
        }
    }

    fn on_result(&self, success: bool) {
        self.last_result.store(success, Ordering::SeqCst);
        if success {
            info!("pass result: success");
        } else {
            warn!("pass result: failure");
        }
    }

    fn on_stop(&self) {
        info!("run stopped");
    }

    fn on_reset(&self) {
        info!("starting pass");
    }

    fn on_info(&self, message: &str) {
        info!("received: {message:?}");
    }
}

fn load_script(path: &Path) -> anyhow::Result<Vec<Step>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read script {}", path.display()))?;
    probekit::parse_script(&text)
        .with_context(|| format!("cannot parse script {}", path.display()))
}

/// Forward transport events to the log until the channel closes.
fn spawn_event_logger(transport: &Arc<dyn Transport>) {
    let mut rx = transport.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            match event {
                LinkEvent::Connected => info!("link up"),
                LinkEvent::Disconnected => info!("link down"),
                LinkEvent::Error(message) => error!("link error: {message}"),
            }
        }
    });
}

/// Give the socket supervisor a moment to bring the link up before the first
/// pass; sends simply fail until then, so this is a courtesy, not a gate.
async fn wait_for_link(transport: &Arc<dyn Transport>) {
    for _ in 0..100 {
        if transport.is_connected() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    warn!("link still down after 10s, running anyway");
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let (transport, script_path, once, interval_secs): (Arc<dyn Transport>, PathBuf, bool, u64) =
        match cli.command {
            Command::Serial {
                port,
                baud,
                data_bits,
                parity,
                stop_bits,
                script,
                interval,
            } => {
                let config = SerialConfig::new(&port, baud)
                    .data_bits(data_bits)
                    .parity(parity)
                    .stop_bits(stop_bits);
                (
                    Arc::new(SerialTransport::new(config)),
                    script,
                    interval.is_none(),
                    interval.unwrap_or(0),
                )
            }
            Command::Tcp {
                host,
                port,
                script,
                interval,
            } => (
                Arc::new(TcpTransport::new(TcpConfig::new(&host, port))),
                script,
                interval.is_none(),
                interval.unwrap_or(0),
            ),
            Command::Run { profile } => {
                let profile = RunProfile::load(&profile)?;
                let transport = profile.transport.build();
                (transport, profile.script, profile.once, profile.interval_secs)
            }
        };

    let steps = load_script(&script_path)?;
    info!("loaded {} steps from {}", steps.len(), script_path.display());

    spawn_event_logger(&transport);
    transport
        .connect()
        .await
        .with_context(|| format!("cannot connect to {}", transport.connection_info()))?;
    wait_for_link(&transport).await;

    let observer = Arc::new(CliObserver::new());
    let sequencer = Arc::new(
        StepSequencer::new(Arc::new(TransportIo(transport.clone())), observer.clone()),
    );

    let mut runner = {
        let sequencer = sequencer.clone();
        tokio::spawn(async move {
            sequencer.run_task(once, interval_secs, steps).await;
        })
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, stopping");
            sequencer.stop();
            let _ = (&mut runner).await;
        }
        result = &mut runner => {
            result.context("sequencer task panicked")?;
        }
    }

    transport.disconnect().await;

    if once && !observer.last_result.load(Ordering::SeqCst) {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
