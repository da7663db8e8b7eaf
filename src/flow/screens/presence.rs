use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::detection::{DetectionController, ReadingReceiver};
use crate::device::{DeviceSession, DeviceStatus};
use crate::flow::{Navigator, Screen, ScreenBoard, ScreenContext, ScreenStatus};
use crate::gate::{ScreenScope, TransitionGate};

use super::ScreenController;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Idle screen: watch for a visitor stepping close, then move on to scanning.
pub struct PresenceScreen {
    context: ScreenContext,
    device: Arc<DeviceSession>,
    detection: Arc<Mutex<DetectionController>>,
    gate: Arc<TransitionGate>,
}

impl PresenceScreen {
    pub fn new(context: ScreenContext) -> Self {
        let device = Arc::new(context.device_session());
        Self {
            context,
            device,
            detection: Arc::new(Mutex::new(DetectionController::new())),
            gate: Arc::new(TransitionGate::new()),
        }
    }
}

#[async_trait]
impl ScreenController for PresenceScreen {
    async fn mount(&mut self) -> Result<()> {
        let board = self.context.board.clone();
        board.update(|snapshot| snapshot.camera = DeviceStatus::Requesting);

        let acquired = self.device.acquire(None).await;
        let camera = self.device.current_status();
        board.update(|snapshot| snapshot.camera = camera);

        let stream = match acquired {
            Ok(stream) => stream,
            // surfaced through the camera status; Retry remounts
            Err(_) => return Ok(()),
        };
        if !self.context.scope.is_mounted() {
            return Ok(());
        }

        let readings = self.detection.lock().await.start(
            stream,
            self.context.capabilities.detector.clone(),
            self.context.config.detection.clone(),
        );

        let watcher = PresenceWatcher {
            board,
            navigator: self.context.navigator.clone(),
            scope: self.context.scope.clone(),
            device: self.device.clone(),
            detection: self.detection.clone(),
            gate: self.gate.clone(),
            confirm_ticks: self.context.config.detection.confirm_ticks,
            redirect_after: Duration::from_millis(self.context.config.flow.presence_redirect_ms),
        };
        self.context.scope.spawn(watcher.run(readings));
        Ok(())
    }

    async fn unmount(&mut self) {
        self.context.scope.mark_unmounted();
        if let Err(err) = self.detection.lock().await.stop().await {
            log_warn!("detection stop failed: {err:#}");
        }
        self.device.release().await;
        self.context.scope.close();
    }
}

struct PresenceWatcher {
    board: ScreenBoard,
    navigator: Navigator,
    scope: ScreenScope,
    device: Arc<DeviceSession>,
    detection: Arc<Mutex<DetectionController>>,
    gate: Arc<TransitionGate>,
    confirm_ticks: u32,
    redirect_after: Duration,
}

impl PresenceWatcher {
    async fn run(self, mut readings: ReadingReceiver) {
        while readings.changed().await.is_ok() {
            let Some(reading) = readings.borrow_and_update().clone() else {
                continue;
            };
            if !self.scope.is_mounted() {
                return;
            }

            let confirmed = reading.confirmed(self.confirm_ticks);
            self.board.update(|snapshot| {
                if let ScreenStatus::Idle { reading: shown, .. } = &mut snapshot.status {
                    *shown = Some(reading);
                }
            });

            if !self.gate.try_fire(confirmed) {
                continue;
            }

            log_info!("visitor close enough; leaving idle");
            self.board.update(|snapshot| {
                if let ScreenStatus::Idle {
                    presence_detected, ..
                } = &mut snapshot.status
                {
                    *presence_detected = true;
                }
            });

            if let Err(err) = self.detection.lock().await.stop().await {
                log_warn!("detection stop failed: {err:#}");
            }
            self.device.release().await;
            let camera = self.device.current_status();
            self.board.update(|snapshot| snapshot.camera = camera);

            let navigator = self.navigator.clone();
            self.scope.schedule(self.redirect_after, async move {
                navigator.go(Screen::QrScan);
            });
            return;
        }
    }
}
