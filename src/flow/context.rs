use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::api::Backend;
use crate::config::KioskConfig;
use crate::db::{Database, JournalError, Submission, SubmissionKind, SubmissionStatus, Visit, VisitStatus};
use crate::detection::PresenceDetector;
use crate::device::{CameraLease, CameraProvider, DeviceSession};
use crate::gate::ScreenScope;
use crate::scan::QrDecoder;

use super::{FlowSnapshot, Screen, Session};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_warn};

/// The black-box providers the flow is built on.
#[derive(Clone)]
pub struct Capabilities {
    pub cameras: Arc<dyn CameraProvider>,
    pub detector: Arc<dyn PresenceDetector>,
    pub decoder: Arc<dyn QrDecoder>,
    pub backend: Arc<dyn Backend>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavRequest {
    pub from: Uuid,
    pub to: Screen,
}

/// "Go to screen X", stamped with the session asking for it.
#[derive(Clone)]
pub struct Navigator {
    tx: mpsc::UnboundedSender<NavRequest>,
    session_id: Uuid,
    scope: ScreenScope,
}

impl Navigator {
    pub fn new(tx: mpsc::UnboundedSender<NavRequest>, session_id: Uuid, scope: ScreenScope) -> Self {
        Self {
            tx,
            session_id,
            scope,
        }
    }

    /// Returns false when the screen is already unmounted and nothing was sent.
    pub fn go(&self, to: Screen) -> bool {
        if !self.scope.is_mounted() {
            log_debug!("dropping navigation to {} from unmounted screen", to.name());
            return false;
        }
        self.tx
            .send(NavRequest {
                from: self.session_id,
                to,
            })
            .is_ok()
    }
}

/// A screen's write access to the shared snapshot.
///
/// Writes are dropped once the screen is unmounted or once another session
/// owns the snapshot.
#[derive(Clone)]
pub struct ScreenBoard {
    tx: Arc<watch::Sender<FlowSnapshot>>,
    session_id: Uuid,
    scope: ScreenScope,
}

impl ScreenBoard {
    pub fn new(tx: Arc<watch::Sender<FlowSnapshot>>, session_id: Uuid, scope: ScreenScope) -> Self {
        Self {
            tx,
            session_id,
            scope,
        }
    }

    pub fn update(&self, apply: impl FnOnce(&mut FlowSnapshot)) -> bool {
        if !self.scope.is_mounted() {
            return false;
        }
        let session_id = self.session_id;
        self.tx.send_if_modified(|snapshot| {
            if snapshot.session_id != session_id {
                return false;
            }
            apply(snapshot);
            true
        })
    }

    pub fn snapshot(&self) -> FlowSnapshot {
        self.tx.borrow().clone()
    }
}

/// Best-effort visit journal. Failures are logged and never stop the flow.
/// Once the journal thread is gone the journal goes quiet instead of
/// logging one failure per write.
#[derive(Clone, Default)]
pub struct Journal {
    db: Option<Database>,
    offline: Arc<AtomicBool>,
}

impl Journal {
    pub fn new(db: Option<Database>) -> Self {
        Self {
            db,
            offline: Arc::new(AtomicBool::new(false)),
        }
    }

    /// True when a database was configured but its thread has died.
    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    fn live_db(&self) -> Option<&Database> {
        let db = self.db.as_ref()?;
        if self.is_offline() {
            return None;
        }
        if !db.is_alive() {
            self.go_offline();
            return None;
        }
        Some(db)
    }

    fn go_offline(&self) {
        if !self.offline.swap(true, Ordering::SeqCst) {
            log_error!("visit journal stopped; visits are no longer recorded");
        }
    }

    fn report(&self, what: &str, err: anyhow::Error) {
        match err.downcast_ref::<JournalError>() {
            Some(JournalError::WorkerGone) => self.go_offline(),
            Some(JournalError::Backlogged) => log_debug!("journal backlogged; skipped {what}"),
            None => log_warn!("failed to {what}: {err:#}"),
        }
    }

    pub async fn visit_started(&self, session: &Session, screen: &Screen) {
        let Some(db) = self.live_db() else { return };
        let visit = Visit::start(session.id.to_string(), screen.name(), session.started_at);
        if let Err(err) = db.insert_visit(&visit).await {
            self.report(&format!("journal visit {}", session.id), err);
        }
    }

    pub async fn visit_ended(&self, session: &Session, status: VisitStatus) {
        let Some(db) = self.live_db() else { return };
        if let Err(err) = db.finish_visit(&session.id.to_string(), status, Utc::now()).await {
            self.report(&format!("close visit {}", session.id), err);
        }
    }

    /// Record a POST about to be sent. Returns the row id to settle later.
    pub async fn submission_started(
        &self,
        session: &Session,
        kind: SubmissionKind,
        code: &str,
        payload: &Value,
    ) -> Option<String> {
        let db = self.live_db()?;
        let now = Utc::now();
        let submission = Submission {
            id: Uuid::new_v4().to_string(),
            visit_id: session.id.to_string(),
            kind,
            code: code.to_string(),
            payload: payload.clone(),
            status: SubmissionStatus::Pending,
            error: None,
            created_at: now,
            updated_at: now,
        };
        match db.insert_submission(&submission).await {
            Ok(()) => Some(submission.id),
            Err(err) => {
                self.report(&format!("journal submission for {code}"), err);
                None
            }
        }
    }

    pub async fn submission_settled(
        &self,
        submission_id: Option<String>,
        status: SubmissionStatus,
        error: Option<String>,
    ) {
        let Some(id) = submission_id else { return };
        let Some(db) = self.live_db() else { return };
        if let Err(err) = db.update_submission_status(&id, status, error, Utc::now()).await {
            self.report(&format!("settle submission {id}"), err);
        }
    }
}

/// What a mounted screen gets to work with.
#[derive(Clone)]
pub struct ScreenContext {
    pub session: Session,
    pub scope: ScreenScope,
    pub navigator: Navigator,
    pub board: ScreenBoard,
    pub capabilities: Capabilities,
    pub config: Arc<KioskConfig>,
    pub lease: CameraLease,
    pub journal: Journal,
}

impl ScreenContext {
    pub fn device_session(&self) -> DeviceSession {
        DeviceSession::new(self.capabilities.cameras.clone(), self.lease.clone())
    }
}
