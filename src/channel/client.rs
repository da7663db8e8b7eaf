use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rand::Rng;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ChannelConfig;

use super::message::{decode, Inbound, PatientLookup, PushMessage};
use super::mode::{LinkState, Mode, ModePublisher, ModeReader};
use super::transport::{PushConnection, PushTransport};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

const PATIENT_BUFFER: usize = 16;

/// Delay before reconnect `attempt` (1-based): doubles from `min` up to `max`,
/// then stretched by `jitter` (a fraction in `0.0..=1.0`).
pub fn reconnect_delay(attempt: u32, min: Duration, max: Duration, jitter: f64) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let base = min.saturating_mul(1u32 << exponent).min(max);
    base.mul_f64(1.0 + jitter.clamp(0.0, 1.0))
}

/// Handle to the running channel task.
pub struct EventChannel {
    modes: ModeReader,
    patients: broadcast::Sender<PatientLookup>,
    cancel_token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl EventChannel {
    /// Open the channel in the background. It keeps reconnecting until `shutdown`.
    pub fn spawn(transport: Arc<dyn PushTransport>, config: ChannelConfig) -> Self {
        let (publisher, modes) = ModePublisher::new();
        let (patients, _) = broadcast::channel(PATIENT_BUFFER);
        let cancel_token = CancellationToken::new();

        let worker = ChannelWorker {
            transport,
            config,
            publisher,
            patients: patients.clone(),
        };
        let handle = tokio::spawn(worker.run(cancel_token.clone()));

        Self {
            modes,
            patients,
            cancel_token,
            handle: Some(handle),
        }
    }

    pub fn modes(&self) -> ModeReader {
        self.modes.clone()
    }

    pub fn subscribe_patients(&self) -> broadcast::Receiver<PatientLookup> {
        self.patients.subscribe()
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.cancel_token.cancel();
        if let Some(handle) = self.handle.take() {
            handle.await.context("event channel task failed to join")?;
        }
        Ok(())
    }
}

impl Drop for EventChannel {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

struct ChannelWorker {
    transport: Arc<dyn PushTransport>,
    config: ChannelConfig,
    publisher: ModePublisher,
    patients: broadcast::Sender<PatientLookup>,
}

enum Disconnect {
    Shutdown,
    Lost,
}

impl ChannelWorker {
    async fn run(self, cancel_token: CancellationToken) {
        let min = Duration::from_millis(self.config.reconnect_min_ms.max(1));
        let max = Duration::from_millis(self.config.reconnect_max_ms).max(min);
        let mut attempt: u32 = 0;

        loop {
            if attempt == 0 {
                self.publisher.set_link(LinkState::Connecting);
            }

            let connected = tokio::select! {
                biased;
                _ = cancel_token.cancelled() => break,
                connected = self.transport.connect() => connected,
            };

            match connected {
                Ok(connection) => {
                    log_info!("event channel connected");
                    attempt = 0;
                    if self.publisher.connected() {
                        log_info!("mode -> idle (fresh connection)");
                    }
                    if let Disconnect::Shutdown = self.pump(connection, &cancel_token).await {
                        break;
                    }
                }
                Err(err) => log_warn!("event channel connect failed: {err:#}"),
            }

            attempt = attempt.saturating_add(1);
            let jitter = rand::thread_rng().gen_range(0.0..=0.2);
            let delay = reconnect_delay(attempt, min, max, jitter);
            self.publisher.set_link(LinkState::Reconnecting {
                attempt,
                retry_in_ms: delay.as_millis() as u64,
            });
            log_debug!("event channel retry {attempt} in {delay:?}");

            tokio::select! {
                biased;
                _ = cancel_token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.publisher.set_link(LinkState::Closed);
        log_info!("event channel closed");
    }

    async fn pump(
        &self,
        mut connection: Box<dyn PushConnection>,
        cancel_token: &CancellationToken,
    ) -> Disconnect {
        loop {
            let frame = tokio::select! {
                biased;
                _ = cancel_token.cancelled() => return Disconnect::Shutdown,
                frame = connection.next_text() => frame,
            };

            match frame {
                Some(Ok(text)) => self.apply(&text),
                Some(Err(err)) => {
                    log_warn!("event channel dropped: {err:#}");
                    return Disconnect::Lost;
                }
                None => {
                    log_info!("event channel closed by peer");
                    return Disconnect::Lost;
                }
            }
        }
    }

    fn apply(&self, text: &str) {
        match decode(text) {
            Inbound::Message(message) => match &message {
                PushMessage::PersonDetected => {
                    if self.publisher.set_mode(Mode::Active) {
                        log_info!("mode -> active");
                    }
                }
                PushMessage::ResetIdle => {
                    if self.publisher.set_mode(Mode::Idle) {
                        log_info!("mode -> idle");
                    }
                }
                PushMessage::QrFound { .. } | PushMessage::QrNotFound { .. } => {
                    if let Some(lookup) = PatientLookup::from_message(&message) {
                        log_debug!("patient lookup for {}", lookup.hn());
                        // no receivers just means nobody is showing patient details
                        let _ = self.patients.send(lookup);
                    }
                }
            },
            Inbound::Unrecognized(kind) => log_debug!("ignoring push message {kind}"),
            Inbound::Malformed(err) => log_warn!("ignoring malformed push message: {err}"),
        }
    }
}
