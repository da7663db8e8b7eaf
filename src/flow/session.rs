use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// One activation of one screen. A remount always gets a new id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub active: bool,
}

impl Session {
    pub fn start() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            active: true,
        }
    }

    pub fn end(&mut self) {
        self.active = false;
    }
}

/// What the visitor can do on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserInput {
    /// Tear the current screen down and mount it again from scratch.
    Retry,
    /// Rating button, 1 to 5.
    Rate(u8),
}
