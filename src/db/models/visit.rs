use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum VisitStatus {
    Active,
    Completed,
    Interrupted,
}

impl VisitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisitStatus::Active => "Active",
            VisitStatus::Completed => "Completed",
            VisitStatus::Interrupted => "Interrupted",
        }
    }
}

/// One mounted screen Session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Visit {
    pub id: String,
    pub screen: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: VisitStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Visit {
    pub fn start(id: impl Into<String>, screen: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            screen: screen.into(),
            started_at: at,
            ended_at: None,
            status: VisitStatus::Active,
            created_at: at,
            updated_at: at,
        }
    }
}
