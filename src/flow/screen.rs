use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::channel::{LinkState, Mode, ModeSnapshot};
use crate::detection::ProximityReading;
use crate::device::DeviceStatus;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "name", rename_all = "camelCase")]
pub enum Screen {
    Idle,
    QrScan,
    Rating { station: String },
    ThankYou,
}

impl Screen {
    pub fn name(&self) -> &'static str {
        match self {
            Screen::Idle => "Idle",
            Screen::QrScan => "QrScan",
            Screen::Rating { .. } => "Rating",
            Screen::ThankYou => "ThankYou",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SubmissionState {
    Pending,
    Ok,
    Failed,
}

/// A dispatched POST as the screen shows it. Settles once; never retried.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingSubmission {
    pub code: String,
    pub payload: Value,
    pub status: SubmissionState,
}

impl PendingSubmission {
    pub fn new(code: impl Into<String>, payload: Value) -> Self {
        Self {
            code: code.into(),
            payload,
            status: SubmissionState::Pending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ScanPhase {
    Init,
    Scanning,
    Scanned,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum QuestionState {
    Loading,
    Ready { text: String },
    Failed { reason: String },
}

/// Screen-specific part of the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "screen", rename_all = "camelCase")]
pub enum ScreenStatus {
    #[serde(rename_all = "camelCase")]
    Idle {
        reading: Option<ProximityReading>,
        presence_detected: bool,
    },
    #[serde(rename_all = "camelCase")]
    QrScan {
        phase: ScanPhase,
        code: Option<String>,
        submission: Option<PendingSubmission>,
    },
    #[serde(rename_all = "camelCase")]
    Rating {
        station: String,
        question: QuestionState,
        hn: Option<String>,
        rating: Option<u8>,
        submission: Option<PendingSubmission>,
    },
    ThankYou,
}

impl ScreenStatus {
    pub fn initial(screen: &Screen) -> Self {
        match screen {
            Screen::Idle => ScreenStatus::Idle {
                reading: None,
                presence_detected: false,
            },
            Screen::QrScan => ScreenStatus::QrScan {
                phase: ScanPhase::Init,
                code: None,
                submission: None,
            },
            Screen::Rating { station } => ScreenStatus::Rating {
                station: station.clone(),
                question: QuestionState::Loading,
                hn: None,
                rating: None,
                submission: None,
            },
            Screen::ThankYou => ScreenStatus::ThankYou,
        }
    }

    pub fn submission(&self) -> Option<&PendingSubmission> {
        match self {
            ScreenStatus::QrScan { submission, .. } | ScreenStatus::Rating { submission, .. } => {
                submission.as_ref()
            }
            _ => None,
        }
    }
}

/// Everything the renderer needs to draw the current screen.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowSnapshot {
    pub screen: Screen,
    pub session_id: Uuid,
    pub camera: DeviceStatus,
    pub channel: ModeSnapshot,
    pub status: ScreenStatus,
}

impl FlowSnapshot {
    pub fn mounting(screen: Screen, session_id: Uuid, channel: ModeSnapshot) -> Self {
        Self {
            status: ScreenStatus::initial(&screen),
            screen,
            session_id,
            camera: DeviceStatus::Idle,
            channel,
        }
    }

    /// Shown before anything is mounted.
    pub fn blank() -> Self {
        Self::mounting(
            Screen::Idle,
            Uuid::nil(),
            ModeSnapshot {
                mode: Mode::Idle,
                link: LinkState::Connecting,
            },
        )
    }
}
