use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};

use crate::db::models::{SubmissionKind, SubmissionStatus, VisitStatus};

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_optional_datetime(
    value: Option<String>,
    field: &str,
) -> Result<Option<DateTime<Utc>>> {
    match value {
        Some(raw) => parse_datetime(&raw, field).map(Some),
        None => Ok(None),
    }
}

pub fn parse_visit_status(value: &str) -> Result<VisitStatus> {
    match value {
        "Active" => Ok(VisitStatus::Active),
        "Completed" => Ok(VisitStatus::Completed),
        "Interrupted" => Ok(VisitStatus::Interrupted),
        other => Err(anyhow!("unknown visit status {other}")),
    }
}

pub fn parse_submission_kind(value: &str) -> Result<SubmissionKind> {
    match value {
        "TriggerQr" => Ok(SubmissionKind::TriggerQr),
        "Rating" => Ok(SubmissionKind::Rating),
        other => Err(anyhow!("unknown submission kind {other}")),
    }
}

pub fn parse_submission_status(value: &str) -> Result<SubmissionStatus> {
    match value {
        "Pending" => Ok(SubmissionStatus::Pending),
        "Ok" => Ok(SubmissionStatus::Ok),
        "Failed" => Ok(SubmissionStatus::Failed),
        other => Err(anyhow!("unknown submission status {other}")),
    }
}
