mod helpers;
mod migrations;
pub mod models;
mod repositories;
mod worker;

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{info, warn};

pub use worker::{Database, JournalError, QUEUE_DEPTH};
pub use models::{Submission, SubmissionKind, SubmissionStatus, Visit, VisitStatus};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub interrupted_visits: usize,
    pub failed_submissions: usize,
}

impl Database {
    /// Close out whatever a crashed or killed run left open.
    pub async fn recover_incomplete(&self, at: DateTime<Utc>) -> Result<RecoveryReport> {
        let report = RecoveryReport {
            interrupted_visits: self.interrupt_active_visits(at).await?,
            failed_submissions: self.fail_pending_submissions(at).await?,
        };

        if report.interrupted_visits > 0 || report.failed_submissions > 0 {
            warn!(
                "Recovered journal: {} visits interrupted, {} submissions failed",
                report.interrupted_visits, report.failed_submissions
            );
        } else {
            info!("Journal clean, nothing to recover");
        }
        Ok(report)
    }
}
