use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use db::models::check_in_record;
use db::models::qr_session::WindowState;
use db::progression;
use db::repositories::{
    AttendanceRepository, AttendanceTransaction, NewCheckIn, QrSessionDetail, RecordQuery,
    StoreError,
};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{AttendanceError, AttendanceResult};
use crate::retry::with_read_retry;
use crate::session_service::{current_session, next_session};
use crate::settings::ServiceSettings;

/// What a successful scan earned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckInReceipt {
    pub session_id: i64,
    pub session_title: String,
    pub exp_earned: i64,
    pub new_exp: i64,
    pub new_level: i32,
    pub leveled_up: bool,
    pub checked_in_at: DateTime<Utc>,
}

/// A user's view of the check-in schedule at a given instant.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckInStatus {
    /// The live session the user can still scan into.
    pub current_session: Option<QrSessionDetail>,
    pub next_session: Option<QrSessionDetail>,
    pub today_check_ins: usize,
    pub checked_in_today: bool,
}

pub struct CheckInService<R> {
    repo: Arc<R>,
    settings: ServiceSettings,
}

/// `[00:00, 24:00)` of the UTC day containing `now`.
fn utc_day(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc())
        .unwrap_or(now);
    (start, start + Duration::days(1))
}

/// Rejects scans outside the session window, by a user who already attended,
/// or by a user already penalized for missing the session.
fn ensure_can_check_in(
    detail: &QrSessionDetail,
    user_id: &str,
    now: DateTime<Utc>,
) -> AttendanceResult<()> {
    let session = &detail.session;
    let ended = || AttendanceError::SessionEnded {
        title: session.title.clone(),
        ended_at: session.end_date_time,
    };
    match session.window_state(now) {
        WindowState::NotStarted => Err(AttendanceError::SessionNotStarted {
            title: session.title.clone(),
            starts_at: session.start_date_time,
        }),
        WindowState::Ended => Err(ended()),
        // Reconciliation already ran for this user; a late commit must not
        // leave them both attended and penalized.
        WindowState::Open if detail.penalized_users.contains(user_id) => Err(ended()),
        WindowState::Open if detail.has_attended(user_id) => Err(AttendanceError::AlreadyCheckedIn {
            session_id: session.id,
            user_id: user_id.to_owned(),
        }),
        WindowState::Open => Ok(()),
    }
}

impl<R> CheckInService<R>
where
    R: AttendanceRepository,
{
    pub fn new(repo: Arc<R>, settings: ServiceSettings) -> Self {
        Self { repo, settings }
    }

    /// Validates a scanned token and credits the session reward to `user_id`.
    ///
    /// The record insert and the profile update commit together. Concurrent
    /// scans by the same user produce exactly one credit; the others fail with
    /// [`AttendanceError::AlreadyCheckedIn`].
    pub async fn check_in(
        &self,
        token: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> AttendanceResult<CheckInReceipt> {
        let token = token.trim();
        let found = self
            .read(|| self.repo.find_active_session_by_token(token))
            .await?;
        let Some(detail) = found else {
            debug!(user_id, "scan rejected: unknown or inactive token");
            return Err(AttendanceError::InvalidToken);
        };
        if let Err(err) = ensure_can_check_in(&detail, user_id, now) {
            debug!(user_id, session_id = detail.session.id, error = %err, "scan rejected");
            return Err(err);
        }

        let mut tx = self.repo.begin().await?;

        // The session may have been deactivated, attended or reconciled since the first read.
        let detail = tx
            .reload_session(detail.session.id)
            .await?
            .filter(|d| d.session.is_active)
            .ok_or(AttendanceError::InvalidToken)?;
        ensure_can_check_in(&detail, user_id, now)?;
        let session = detail.session;

        let profile = tx
            .find_user(user_id)
            .await?
            .ok_or_else(|| AttendanceError::user_not_found(user_id))?;

        let record = tx
            .insert_check_in(NewCheckIn {
                user_id: user_id.to_owned(),
                session_id: session.id,
                checked_in_at: now,
                exp_earned: session.exp_reward,
            })
            .await
            .map_err(|err| match err {
                StoreError::Conflict(_) => AttendanceError::AlreadyCheckedIn {
                    session_id: session.id,
                    user_id: user_id.to_owned(),
                },
                other => other.into(),
            })?;

        let credited = progression::credit(&profile, record.exp_earned, now);
        let stored = tx.update_user(&credited).await?;
        tx.commit().await?;

        info!(
            user_id,
            session_id = session.id,
            exp_earned = record.exp_earned,
            new_exp = stored.exp,
            new_level = stored.level,
            "checked in to \"{}\"",
            session.title
        );

        Ok(CheckInReceipt {
            session_id: session.id,
            session_title: session.title,
            exp_earned: record.exp_earned,
            new_exp: stored.exp,
            new_level: stored.level,
            leveled_up: stored.level > profile.level,
            checked_in_at: record.checked_in_at,
        })
    }

    pub async fn user_status(&self, user_id: &str, now: DateTime<Utc>) -> AttendanceResult<CheckInStatus> {
        let read_retry = self.settings.read_retry;
        let current_session = current_session(self.repo.as_ref(), user_id, now, read_retry).await?;
        let next_session = next_session(self.repo.as_ref(), now, read_retry).await?;

        let (from, until) = utc_day(now);
        let query = RecordQuery {
            user_id: Some(user_id.to_owned()),
            from: Some(from),
            until: Some(until),
            ..Default::default()
        };
        let today_check_ins = self.read(|| self.repo.find_check_ins(&query)).await?.len();

        Ok(CheckInStatus {
            current_session,
            next_session,
            today_check_ins,
            checked_in_today: today_check_ins > 0,
        })
    }

    /// Check-ins by anyone during the UTC day containing `now`.
    pub async fn today_check_in_count(&self, now: DateTime<Utc>) -> AttendanceResult<usize> {
        let (from, until) = utc_day(now);
        let query = RecordQuery {
            from: Some(from),
            until: Some(until),
            ..Default::default()
        };
        Ok(self.read(|| self.repo.find_check_ins(&query)).await?.len())
    }

    /// A user's check-ins, newest first.
    pub async fn check_in_history(
        &self,
        user_id: &str,
        limit: Option<u64>,
    ) -> AttendanceResult<Vec<check_in_record::Model>> {
        let query = RecordQuery {
            user_id: Some(user_id.to_owned()),
            limit: Some(limit.unwrap_or(self.settings.history_limit)),
            ..Default::default()
        };
        Ok(self.read(|| self.repo.find_check_ins(&query)).await?)
    }

    async fn read<T, F, Fut>(&self, op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, StoreError>>,
    {
        with_read_retry(self.settings.read_retry, op).await
    }
}
