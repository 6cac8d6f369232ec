//! BLE oximeter session
//!
//! [`OximeterSession`] owns the lifecycle of one oximeter link: connect,
//! probe the known wire formats in priority order, stream notifications
//! through the matching decoder, and tear down. The BLE transport itself is
//! behind the [`OximeterTransport`] trait so the whole state machine is
//! testable against scripted byte streams.
//!
//! Probing is strictly sequential; the session holds the transport
//! exclusively, so overlapping GATT operations against one device cannot be
//! expressed.

use std::time::Instant;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use vitalscan_core::smoothing::MedianSmoother;
use vitalscan_core::types::{OximeterReading, ProtocolId};
use vitalscan_core::wire::PROBE_ORDER;

// ============================================================================
// State and Errors
// ============================================================================

/// Connection lifecycle of an oximeter link.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No device attached
    #[default]
    Disconnected,
    /// Establishing the BLE link
    Connecting,
    /// Link up, trying wire formats in priority order
    Probing,
    /// Receiving notifications decoded with the given protocol
    Streaming(ProtocolId),
    /// Connection attempt failed
    Error(String),
}

/// Errors from connecting to an oximeter.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// No Bluetooth adapter is available on this host.
    #[error("no bluetooth adapter available")]
    AdapterUnavailable,

    /// A connection attempt is already in progress or active.
    #[error("connection attempt already in progress")]
    AlreadyConnecting,

    /// Scanning finished without finding a candidate device.
    #[error("no oximeter found nearby")]
    NoDeviceFound,

    /// The device exposes none of the supported services.
    #[error("device offers no supported oximeter service")]
    UnsupportedDevice,

    /// The user aborted the connection attempt.
    #[error("connection cancelled")]
    Cancelled,

    /// The BLE link failed.
    #[error("transport failure: {0}")]
    Transport(String),
}

// ============================================================================
// Transport
// ============================================================================

/// Stream of raw notification payloads from one characteristic.
pub type NotificationStream = BoxStream<'static, Vec<u8>>;

/// Exclusive handle on one BLE oximeter link.
///
/// `subscribe` is called once per probe attempt; an `Err` means the device
/// does not offer that (service, characteristic) pair and the caller moves
/// to the next candidate. Returning [`ConnectionError::Cancelled`] from any
/// method aborts the whole attempt. `disconnect` must be safe to call in
/// any state, repeatedly.
#[async_trait]
pub trait OximeterTransport: Send {
    /// Find and connect a device, returning its advertised name.
    async fn connect(&mut self) -> Result<Option<String>, ConnectionError>;

    /// Subscribe to notifications on one characteristic.
    async fn subscribe(
        &mut self,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<NotificationStream, ConnectionError>;

    /// Tear the link down.
    async fn disconnect(&mut self);
}

// ============================================================================
// Snapshot
// ============================================================================

/// Observable state of the oximeter pipeline.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct OximeterSnapshot {
    /// Current connection state
    pub state: ConnectionState,
    /// Advertised name of the connected device
    pub device_name: Option<String>,
    /// Latest smoothed reading
    pub reading: Option<OximeterReading>,
    /// Last connection error, if any
    pub error: Option<String>,
}

impl OximeterSnapshot {
    /// Whether readings are flowing.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self.state, ConnectionState::Streaming(_))
    }

    /// Whether a connection attempt is in progress.
    #[must_use]
    pub fn is_connecting(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Probing
        )
    }
}

// ============================================================================
// Session
// ============================================================================

/// Owns one oximeter link end to end.
pub struct OximeterSession<T> {
    transport: T,
    snapshot_tx: watch::Sender<OximeterSnapshot>,
    connecting: bool,
    pump: Option<JoinHandle<()>>,
    started_at: Instant,
}

impl<T: OximeterTransport> OximeterSession<T> {
    /// Create a session over the given transport.
    #[must_use]
    pub fn new(transport: T) -> Self {
        let (snapshot_tx, _) = watch::channel(OximeterSnapshot::default());
        Self {
            transport,
            snapshot_tx,
            connecting: false,
            pump: None,
            started_at: Instant::now(),
        }
    }

    /// Subscribe to pipeline snapshots.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<OximeterSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Whether notifications are currently being streamed.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.pump.as_ref().is_some_and(|p| !p.is_finished())
    }

    /// Connect a device and start streaming readings.
    ///
    /// Probes the supported wire formats in priority order and returns the
    /// protocol that matched. Every attempt starts the probe sequence from
    /// the top; a device may be replaced between connections, so nothing
    /// about the previous protocol is assumed.
    ///
    /// # Errors
    ///
    /// [`ConnectionError::AlreadyConnecting`] if an attempt is in progress
    /// or a stream is active; [`ConnectionError::UnsupportedDevice`] if no
    /// wire format matched; [`ConnectionError::Cancelled`] if the attempt
    /// was aborted (this leaves the session cleanly disconnected, with no
    /// error recorded).
    pub async fn connect(&mut self) -> Result<ProtocolId, ConnectionError> {
        if self.connecting || self.is_streaming() {
            return Err(ConnectionError::AlreadyConnecting);
        }

        self.connecting = true;
        let result = self.try_connect().await;
        self.connecting = false;

        match result {
            Ok(protocol) => Ok(protocol),
            Err(ConnectionError::Cancelled) => {
                self.transport.disconnect().await;
                self.snapshot_tx.send_replace(OximeterSnapshot::default());
                Err(ConnectionError::Cancelled)
            }
            Err(e) => {
                self.transport.disconnect().await;
                warn!(error = %e, "oximeter connection failed");
                self.snapshot_tx.send_replace(OximeterSnapshot {
                    state: ConnectionState::Error(e.to_string()),
                    error: Some(e.to_string()),
                    ..OximeterSnapshot::default()
                });
                Err(e)
            }
        }
    }

    async fn try_connect(&mut self) -> Result<ProtocolId, ConnectionError> {
        self.snapshot_tx.send_replace(OximeterSnapshot {
            state: ConnectionState::Connecting,
            ..OximeterSnapshot::default()
        });

        let device_name = self.transport.connect().await?;
        info!(name = device_name.as_deref().unwrap_or("<unnamed>"), "oximeter connected");

        self.snapshot_tx.send_modify(|s| {
            s.state = ConnectionState::Probing;
            s.device_name = device_name.clone();
        });

        for target in PROBE_ORDER {
            debug!(protocol = target.label, "probing");

            match self
                .transport
                .subscribe(target.service, target.characteristic)
                .await
            {
                Ok(stream) => {
                    info!(protocol = target.label, "oximeter streaming");
                    self.snapshot_tx
                        .send_modify(|s| s.state = ConnectionState::Streaming(target.protocol));
                    self.spawn_pump(stream, target.protocol);
                    return Ok(target.protocol);
                }
                Err(ConnectionError::Cancelled) => return Err(ConnectionError::Cancelled),
                Err(e) => {
                    debug!(protocol = target.label, error = %e, "probe failed");
                }
            }
        }

        Err(ConnectionError::UnsupportedDevice)
    }

    fn spawn_pump(&mut self, mut stream: NotificationStream, protocol: ProtocolId) {
        let tx = self.snapshot_tx.clone();
        let started_at = self.started_at;

        self.pump = Some(tokio::spawn(async move {
            let mut spo2_smoother = MedianSmoother::new();
            let mut rate_smoother = MedianSmoother::new();

            while let Some(payload) = stream.next().await {
                let Some(raw) = protocol.decode(&payload) else {
                    // Malformed or out-of-range packet; wait for the next one
                    continue;
                };

                let reading = OximeterReading {
                    spo2: spo2_smoother.push(u16::from(raw.spo2)) as u8,
                    pulse_rate: rate_smoother.push(raw.pulse_rate),
                    protocol,
                    timestamp_us: started_at.elapsed().as_micros() as u64,
                };

                tx.send_modify(|s| s.reading = Some(reading));
            }

            // The device went away (or the link was closed locally)
            info!("oximeter stream ended");
            tx.send_replace(OximeterSnapshot::default());
        }));
    }

    /// Tear down the link and stop streaming.
    ///
    /// Safe to call in any state, repeatedly.
    pub async fn disconnect(&mut self) {
        self.transport.disconnect().await;

        if let Some(pump) = self.pump.take() {
            pump.abort();
            let _ = pump.await;
        }

        self.snapshot_tx.send_replace(OximeterSnapshot::default());
    }
}

impl<T> Drop for OximeterSession<T> {
    fn drop(&mut self) {
        // The transport's own Drop closes the link; the pump task must not
        // outlive the session
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
