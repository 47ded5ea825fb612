use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use db::models::penalty_record;
use db::progression;
use db::repositories::{
    AttendanceRepository, AttendanceTransaction, NewPenalty, RecordQuery, SessionOrder,
    SessionQuery,
};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::{AttendanceError, AttendanceResult};
use crate::retry::with_read_retry;
use crate::settings::ServiceSettings;

/// Outcome of reconciling one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PenaltyReport {
    pub session_id: i64,
    /// Users penalized by this run, in id order.
    pub penalized: Vec<String>,
    /// Expected users without a profile; nothing was recorded for them.
    pub skipped: Vec<String>,
    /// EXP actually removed per penalized user.
    pub exp_lost: BTreeMap<String, i64>,
    /// Whether this run closed the session.
    pub deactivated: bool,
}

/// Outcome of one sweep over ended sessions.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SweepReport {
    pub reports: Vec<PenaltyReport>,
    /// Sessions that could not be reconciled, with the reason.
    pub failures: Vec<(i64, String)>,
}

impl SweepReport {
    pub fn penalized_total(&self) -> usize {
        self.reports.iter().map(|r| r.penalized.len()).sum()
    }
}

pub struct PenaltyService<R> {
    repo: Arc<R>,
    settings: ServiceSettings,
}

impl<R> PenaltyService<R>
where
    R: AttendanceRepository,
{
    pub fn new(repo: Arc<R>, settings: ServiceSettings) -> Self {
        Self { repo, settings }
    }

    /// Penalizes every expected user of an ended session who neither checked
    /// in nor has been penalized already. Running it again is a no-op.
    pub async fn apply_penalties(
        &self,
        session_id: i64,
        now: DateTime<Utc>,
    ) -> AttendanceResult<PenaltyReport> {
        self.reconcile(session_id, now, false).await
    }

    /// Reconciles and deactivates every active session that has ended by `now`.
    ///
    /// A failing session is logged and recorded in the report; the sweep moves
    /// on to the next one.
    pub async fn sweep_ended_sessions(&self, now: DateTime<Utc>) -> AttendanceResult<SweepReport> {
        let query = SessionQuery {
            active_only: true,
            ended_by: Some(now),
            order: SessionOrder::EarliestEnd,
            ..Default::default()
        };
        let ended = with_read_retry(self.settings.read_retry, || {
            self.repo.find_sessions(&query)
        })
        .await?;

        let mut sweep = SweepReport::default();
        for detail in ended {
            let session_id = detail.session.id;
            match self.reconcile(session_id, now, true).await {
                Ok(report) => sweep.reports.push(report),
                Err(err) => {
                    error!(session_id, error = %err, "failed to reconcile ended session");
                    sweep.failures.push((session_id, err.to_string()));
                }
            }
        }

        info!(
            sessions = sweep.reports.len(),
            penalized = sweep.penalized_total(),
            failures = sweep.failures.len(),
            "penalty sweep finished"
        );
        Ok(sweep)
    }

    /// A user's penalties, newest first.
    pub async fn penalty_history(
        &self,
        user_id: &str,
        limit: Option<u64>,
    ) -> AttendanceResult<Vec<penalty_record::Model>> {
        let query = RecordQuery {
            user_id: Some(user_id.to_owned()),
            limit: Some(limit.unwrap_or(self.settings.history_limit)),
            ..Default::default()
        };
        Ok(with_read_retry(self.settings.read_retry, || {
            self.repo.find_penalties(&query)
        })
        .await?)
    }

    async fn reconcile(
        &self,
        session_id: i64,
        now: DateTime<Utc>,
        deactivate: bool,
    ) -> AttendanceResult<PenaltyReport> {
        let attempts = self.settings.write_retry_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.reconcile_once(session_id, now, deactivate).await {
                Err(err) if err.is_write_conflict() && attempt < attempts => {
                    warn!(session_id, attempt, "penalty write lost a race, retrying from a fresh read");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn reconcile_once(
        &self,
        session_id: i64,
        now: DateTime<Utc>,
        deactivate: bool,
    ) -> AttendanceResult<PenaltyReport> {
        let mut tx = self.repo.begin().await?;
        let detail = tx
            .reload_session(session_id)
            .await?
            .ok_or_else(|| AttendanceError::session_not_found(session_id))?;

        if !detail.session.has_ended(now) {
            return Err(AttendanceError::SessionStillActive {
                session_id,
                ends_at: detail.session.end_date_time,
            });
        }

        let reason = format!("Missed check-in: {}", detail.session.title);
        let mut report = PenaltyReport {
            session_id,
            ..Default::default()
        };

        for user_id in detail.penalty_candidates() {
            let Some(profile) = tx.find_user(&user_id).await? else {
                warn!(session_id, %user_id, "expected user has no profile, skipping penalty");
                report.skipped.push(user_id);
                continue;
            };

            let debit = progression::debit(&profile, detail.session.penalty_exp, now);
            tx.insert_penalty(NewPenalty {
                user_id: user_id.clone(),
                session_id,
                penalty_applied_at: now,
                exp_lost: debit.exp_lost,
                reason: reason.clone(),
            })
            .await?;
            tx.update_user(&debit.profile).await?;

            report.exp_lost.insert(user_id.clone(), debit.exp_lost);
            report.penalized.push(user_id);
        }

        if deactivate {
            report.deactivated = tx.deactivate_session(session_id).await?;
        }
        tx.commit().await?;

        if !report.penalized.is_empty() || report.deactivated {
            info!(
                session_id,
                penalized = report.penalized.len(),
                skipped = report.skipped.len(),
                deactivated = report.deactivated,
                "penalties applied for \"{}\"",
                detail.session.title
            );
        }
        Ok(report)
    }
}
