use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{
    worker::Database,
    helpers::{parse_datetime, parse_optional_datetime, parse_visit_status},
    models::{Visit, VisitStatus},
};

fn row_to_visit(row: &Row) -> Result<Visit> {
    let started_at: String = row.get("started_at")?;
    let ended_at: Option<String> = row.get("ended_at")?;
    let status: String = row.get("status")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(Visit {
        id: row.get("id")?,
        screen: row.get("screen")?,
        started_at: parse_datetime(&started_at, "started_at")?,
        ended_at: parse_optional_datetime(ended_at, "ended_at")?,
        status: parse_visit_status(&status)?,
        created_at: parse_datetime(&created_at, "created_at")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
    })
}

impl Database {
    pub async fn insert_visit(&self, visit: &Visit) -> Result<()> {
        let record = visit.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO visits (id, screen, started_at, ended_at, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.id,
                    record.screen,
                    record.started_at.to_rfc3339(),
                    record.ended_at.as_ref().map(|dt| dt.to_rfc3339()),
                    record.status.as_str(),
                    record.created_at.to_rfc3339(),
                    record.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Close an Active visit. A visit that already ended keeps its first outcome.
    pub async fn finish_visit(
        &self,
        visit_id: &str,
        status: VisitStatus,
        ended_at: DateTime<Utc>,
    ) -> Result<bool> {
        let visit_id = visit_id.to_string();
        self.execute(move |conn| {
            let changed = conn.execute(
                "UPDATE visits
                 SET status = ?1,
                     ended_at = ?2,
                     updated_at = ?2
                 WHERE id = ?3 AND status = 'Active'",
                params![status.as_str(), ended_at.to_rfc3339(), visit_id],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    pub async fn get_visit(&self, visit_id: &str) -> Result<Option<Visit>> {
        let visit_id = visit_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, screen, started_at, ended_at, status, created_at, updated_at
                 FROM visits
                 WHERE id = ?1",
            )?;
            let visit = stmt
                .query_row(params![visit_id], |row| Ok(row_to_visit(row)))
                .optional()?
                .transpose()?;
            Ok(visit)
        })
        .await
    }

    pub async fn recent_visits(&self, limit: usize) -> Result<Vec<Visit>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, screen, started_at, ended_at, status, created_at, updated_at
                 FROM visits
                 ORDER BY started_at DESC, rowid DESC
                 LIMIT ?1",
            )?;
            let mut rows = stmt.query(params![limit as i64])?;
            let mut visits = Vec::new();
            while let Some(row) = rows.next()? {
                visits.push(row_to_visit(row)?);
            }
            Ok(visits)
        })
        .await
    }

    /// Visits still Active from a previous run become Interrupted.
    pub async fn interrupt_active_visits(&self, at: DateTime<Utc>) -> Result<usize> {
        self.execute(move |conn| {
            let changed = conn.execute(
                "UPDATE visits
                 SET status = 'Interrupted',
                     ended_at = ?1,
                     updated_at = ?1
                 WHERE status = 'Active'",
                params![at.to_rfc3339()],
            )?;
            Ok(changed)
        })
        .await
    }
}
