use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use crate::db::{
    worker::Database,
    helpers::{parse_datetime, parse_submission_kind, parse_submission_status},
    models::{Submission, SubmissionStatus},
};

fn row_to_submission(row: &Row) -> Result<Submission> {
    let kind: String = row.get("kind")?;
    let payload: String = row.get("payload")?;
    let status: String = row.get("status")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(Submission {
        id: row.get("id")?,
        visit_id: row.get("visit_id")?,
        kind: parse_submission_kind(&kind)?,
        code: row.get("code")?,
        payload: serde_json::from_str(&payload).context("failed to parse payload")?,
        status: parse_submission_status(&status)?,
        error: row.get("error")?,
        created_at: parse_datetime(&created_at, "created_at")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
    })
}

impl Database {
    pub async fn insert_submission(&self, submission: &Submission) -> Result<()> {
        let record = submission.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO submissions (id, visit_id, kind, code, payload, status, error, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    record.id,
                    record.visit_id,
                    record.kind.as_str(),
                    record.code,
                    serde_json::to_string(&record.payload)?,
                    record.status.as_str(),
                    record.error,
                    record.created_at.to_rfc3339(),
                    record.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn update_submission_status(
        &self,
        submission_id: &str,
        status: SubmissionStatus,
        error: Option<String>,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let submission_id = submission_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "UPDATE submissions
                 SET status = ?1,
                     error = ?2,
                     updated_at = ?3
                 WHERE id = ?4",
                params![status.as_str(), error, updated_at.to_rfc3339(), submission_id],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn submissions_for_visit(&self, visit_id: &str) -> Result<Vec<Submission>> {
        let visit_id = visit_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, visit_id, kind, code, payload, status, error, created_at, updated_at
                 FROM submissions
                 WHERE visit_id = ?1
                 ORDER BY created_at ASC, rowid ASC",
            )?;
            let mut rows = stmt.query(params![visit_id])?;
            let mut submissions = Vec::new();
            while let Some(row) = rows.next()? {
                submissions.push(row_to_submission(row)?);
            }
            Ok(submissions)
        })
        .await
    }

    /// Submissions left Pending by a previous run are closed as Failed, not re-sent.
    pub async fn fail_pending_submissions(&self, at: DateTime<Utc>) -> Result<usize> {
        self.execute(move |conn| {
            let changed = conn.execute(
                "UPDATE submissions
                 SET status = 'Failed',
                     error = COALESCE(error, 'interrupted before completion'),
                     updated_at = ?1
                 WHERE status = 'Pending'",
                params![at.to_rfc3339()],
            )?;
            Ok(changed)
        })
        .await
    }
}
