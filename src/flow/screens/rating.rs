use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::api::RatingSubmission;
use crate::db::{SubmissionKind, SubmissionStatus};
use crate::flow::{
    PendingSubmission, QuestionState, Screen, ScreenContext, ScreenStatus, SubmissionState,
    UserInput,
};
use crate::gate::TransitionGate;

use super::ScreenController;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

const RATING_RANGE: std::ops::RangeInclusive<u8> = 1..=5;

/// Ask the backend's question and submit exactly one rating for it.
pub struct RatingScreen {
    context: ScreenContext,
    station: String,
    gate: Arc<TransitionGate>,
}

impl RatingScreen {
    pub fn new(context: ScreenContext, station: String) -> Self {
        Self {
            context,
            station,
            gate: Arc::new(TransitionGate::new()),
        }
    }

    /// Visitor number from the loaded question, if there is one yet.
    fn visitor(&self) -> Option<String> {
        match self.context.board.snapshot().status {
            ScreenStatus::Rating { hn, .. } => hn,
            _ => None,
        }
    }

    fn submit(&self, rating: u8, hn: String) {
        let submission = RatingSubmission {
            hn: hn.clone(),
            status: self.station.clone(),
            rating,
            comment: String::new(),
        };
        let payload = serde_json::to_value(&submission).unwrap_or_default();

        self.context.board.update(|snapshot| {
            if let ScreenStatus::Rating {
                rating: shown,
                submission: pending,
                ..
            } = &mut snapshot.status
            {
                *shown = Some(rating);
                *pending = Some(PendingSubmission::new(hn.clone(), payload.clone()));
            }
        });

        let context = self.context.clone();
        let redirect_after = Duration::from_millis(context.config.flow.submit_redirect_ms);
        self.context.scope.spawn(async move {
            let row = context
                .journal
                .submission_started(&context.session, SubmissionKind::Rating, &hn, &payload)
                .await;
            let outcome = context.capabilities.backend.submit_rating(&submission).await;

            let (state, journal_status, error) = match &outcome {
                Ok(()) => (SubmissionState::Ok, SubmissionStatus::Ok, None),
                Err(err) => {
                    log_warn!("rating submit for {hn} failed: {err}");
                    (SubmissionState::Failed, SubmissionStatus::Failed, Some(err.to_string()))
                }
            };
            context.journal.submission_settled(row, journal_status, error).await;

            context.board.update(|snapshot| {
                if let ScreenStatus::Rating {
                    submission: Some(pending),
                    ..
                } = &mut snapshot.status
                {
                    pending.status = state;
                }
            });

            if state == SubmissionState::Ok && context.scope.is_mounted() {
                let navigator = context.navigator.clone();
                context.scope.schedule(redirect_after, async move {
                    navigator.go(Screen::ThankYou);
                });
            }
        });
    }
}

#[async_trait]
impl ScreenController for RatingScreen {
    async fn mount(&mut self) -> Result<()> {
        let board = self.context.board.clone();
        let scope = self.context.scope.clone();
        let backend = self.context.capabilities.backend.clone();

        self.context.scope.spawn(async move {
            let fetched = backend.fetch_question().await;
            if !scope.is_mounted() {
                return;
            }
            if let Err(err) = &fetched {
                log_warn!("question fetch failed: {err}");
            }
            board.update(|snapshot| {
                if let ScreenStatus::Rating { question, hn, .. } = &mut snapshot.status {
                    match fetched {
                        Ok(loaded) => {
                            *question = QuestionState::Ready {
                                text: loaded.question,
                            };
                            *hn = loaded.hn;
                        }
                        Err(err) => {
                            *question = QuestionState::Failed {
                                reason: err.to_string(),
                            };
                        }
                    }
                }
            });
        });
        Ok(())
    }

    async fn handle_input(&mut self, input: UserInput) {
        let UserInput::Rate(rating) = input else {
            return;
        };
        if !RATING_RANGE.contains(&rating) {
            log_warn!("ignoring out-of-range rating {rating}");
            return;
        }

        let visitor = self.visitor();
        if !self.gate.try_fire(visitor.is_some() && self.context.scope.is_mounted()) {
            log_debug!("rating {rating} ignored (already sent or no visitor yet)");
            return;
        }
        if let Some(hn) = visitor {
            log_info!("submitting rating {rating} for {hn}");
            self.submit(rating, hn);
        }
    }

    async fn unmount(&mut self) {
        self.context.scope.mark_unmounted();
        self.context.scope.close();
    }
}
