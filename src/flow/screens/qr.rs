use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use serde_json::json;
use tokio::sync::Mutex;

use crate::api::Backend;
use crate::db::{SubmissionKind, SubmissionStatus};
use crate::device::{preferred_camera, DeviceError, DeviceSession, DeviceStatus};
use crate::flow::{
    Journal, Navigator, PendingSubmission, ScanPhase, Screen, ScreenBoard, ScreenContext,
    ScreenStatus, Session, SubmissionState,
};
use crate::gate::{ScreenScope, TransitionGate};
use crate::scan::{AcceptedReceiver, CodeGrammar, ScanController, ScanDeduper};

use super::ScreenController;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Scan one visitor code, announce it to the backend, then go to rating.
pub struct QrScreen {
    context: ScreenContext,
    device: Arc<DeviceSession>,
    scanner: Arc<Mutex<ScanController>>,
    gate: Arc<TransitionGate>,
}

impl QrScreen {
    pub fn new(context: ScreenContext) -> Self {
        let device = Arc::new(context.device_session());
        Self {
            context,
            device,
            scanner: Arc::new(Mutex::new(ScanController::new())),
            gate: Arc::new(TransitionGate::new()),
        }
    }

    fn set_phase(&self, phase: ScanPhase) {
        self.context.board.update(|snapshot| {
            if let ScreenStatus::QrScan { phase: shown, .. } = &mut snapshot.status {
                *shown = phase;
            }
        });
    }

    /// Rear-facing camera when one is labelled as such, else the first listed.
    async fn pick_camera(&self) -> Result<String, DeviceError> {
        let cameras = self.context.capabilities.cameras.list_cameras().await?;
        let chosen = match Regex::new(&self.context.config.scan.preferred_camera_pattern) {
            Ok(pattern) => preferred_camera(&cameras, &pattern),
            Err(err) => {
                log_warn!("bad camera pattern, using first camera: {err}");
                cameras.first()
            }
        };
        chosen
            .map(|camera| camera.id.clone())
            .ok_or(DeviceError::NotFound)
    }
}

#[async_trait]
impl ScreenController for QrScreen {
    async fn mount(&mut self) -> Result<()> {
        let board = self.context.board.clone();
        board.update(|snapshot| snapshot.camera = DeviceStatus::Requesting);

        let acquired = match self.pick_camera().await {
            Ok(camera_id) => self.device.acquire(Some(&camera_id)).await,
            Err(err) => Err(err),
        };
        let stream = match acquired {
            Ok(stream) => stream,
            Err(err) => {
                log_warn!("scanner camera unavailable: {err}");
                board.update(|snapshot| snapshot.camera = DeviceStatus::Error { error: err });
                self.set_phase(ScanPhase::Error);
                return Ok(());
            }
        };
        let camera = self.device.current_status();
        board.update(|snapshot| snapshot.camera = camera);
        if !self.context.scope.is_mounted() {
            return Ok(());
        }

        let scan = &self.context.config.scan;
        let deduper = ScanDeduper::new(
            CodeGrammar::new(&scan.policy)?,
            scan.dedupe_window(),
            scan.single_fire,
        );
        let accepted = match self
            .scanner
            .lock()
            .await
            .start(self.context.capabilities.decoder.clone(), stream, deduper)
            .await
        {
            Ok(accepted) => accepted,
            Err(err) => {
                log_warn!("scanner failed to start: {err:#}");
                self.set_phase(ScanPhase::Error);
                return Ok(());
            }
        };
        self.set_phase(ScanPhase::Scanning);

        let watcher = ScanWatcher {
            session: self.context.session.clone(),
            board,
            navigator: self.context.navigator.clone(),
            scope: self.context.scope.clone(),
            device: self.device.clone(),
            scanner: self.scanner.clone(),
            gate: self.gate.clone(),
            backend: self.context.capabilities.backend.clone(),
            journal: self.context.journal.clone(),
            redirect_after: Duration::from_millis(self.context.config.flow.scan_redirect_ms),
            station: self.context.config.flow.station.clone(),
        };
        self.context.scope.spawn(watcher.run(accepted));
        Ok(())
    }

    async fn unmount(&mut self) {
        self.context.scope.mark_unmounted();
        if let Err(err) = self.scanner.lock().await.stop().await {
            log_warn!("scanner stop failed: {err:#}");
        }
        self.device.release().await;
        self.context.scope.close();
    }
}

struct ScanWatcher {
    session: Session,
    board: ScreenBoard,
    navigator: Navigator,
    scope: ScreenScope,
    device: Arc<DeviceSession>,
    scanner: Arc<Mutex<ScanController>>,
    gate: Arc<TransitionGate>,
    backend: Arc<dyn Backend>,
    journal: Journal,
    redirect_after: Duration,
    station: String,
}

impl ScanWatcher {
    async fn run(self, mut accepted: AcceptedReceiver) {
        let code = loop {
            if accepted.changed().await.is_err() {
                return;
            }
            let Some(candidate) = accepted.borrow_and_update().clone() else {
                continue;
            };
            if self.gate.try_fire(self.scope.is_mounted()) {
                break candidate.code;
            }
        };

        log_info!("code {code} accepted for session {}", self.session.id);
        let payload = json!({ "hn": code });
        self.board.update(|snapshot| {
            if let ScreenStatus::QrScan {
                phase,
                code: shown,
                submission,
            } = &mut snapshot.status
            {
                *phase = ScanPhase::Scanned;
                *shown = Some(code.clone());
                *submission = Some(PendingSubmission::new(code.clone(), payload.clone()));
            }
        });

        if let Err(err) = self.scanner.lock().await.stop().await {
            log_warn!("scanner stop failed: {err:#}");
        }
        self.device.release().await;
        let camera = self.device.current_status();
        self.board.update(|snapshot| snapshot.camera = camera);

        if !self.scope.is_mounted() {
            return;
        }

        let row = self
            .journal
            .submission_started(&self.session, SubmissionKind::TriggerQr, &code, &payload)
            .await;
        let outcome = self.backend.trigger_qr(&code).await;

        let (state, journal_status, error) = match &outcome {
            Ok(()) => (SubmissionState::Ok, SubmissionStatus::Ok, None),
            Err(err) => {
                log_warn!("trigger for {code} failed: {err}");
                (SubmissionState::Failed, SubmissionStatus::Failed, Some(err.to_string()))
            }
        };
        self.journal.submission_settled(row, journal_status, error).await;

        self.board.update(|snapshot| {
            if let ScreenStatus::QrScan {
                submission: Some(submission),
                ..
            } = &mut snapshot.status
            {
                submission.status = state;
            }
        });

        if state == SubmissionState::Ok && self.scope.is_mounted() {
            let navigator = self.navigator.clone();
            let station = self.station.clone();
            self.scope.schedule(self.redirect_after, async move {
                navigator.go(Screen::Rating { station });
            });
        }
    }
}
