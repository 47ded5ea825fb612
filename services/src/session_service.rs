use std::sync::Arc;

use chrono::{DateTime, Utc};
use db::repositories::{
    AttendanceRepository, AttendanceTransaction, NewQrSession, QrSessionDetail, SessionOrder,
    SessionQuery, StoreError,
};
use rand::{Rng, distr::Alphanumeric};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use validator::Validate;

use crate::error::{AttendanceError, AttendanceResult};
use crate::retry::{RetryPolicy, with_read_retry};
use crate::settings::ServiceSettings;
use crate::user_selection::{SelectionPreview, UserSelection};

/// A freshly generated token colliding with a stored one is astronomically
/// unlikely, but the unique index would reject it, so regenerate a few times.
const TOKEN_ATTEMPTS: u32 = 3;
const TOKEN_SUFFIX_LEN: usize = 9;

#[derive(Debug, Clone, Validate, Deserialize)]
pub struct CreateQrSession {
    #[validate(length(min = 1, message = "title cannot be empty"))]
    pub title: String,
    pub description: Option<String>,
    pub start_date_time: DateTime<Utc>,
    pub end_date_time: DateTime<Utc>,
    #[validate(range(min = 0, message = "exp reward cannot be negative"))]
    pub exp_reward: i64,
    #[validate(range(min = 0, message = "penalty cannot be negative"))]
    pub penalty_exp: i64,
    #[validate(length(min = 1, message = "creator id cannot be empty"))]
    pub generated_by: String,
    pub selection: UserSelection,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStats {
    pub session_id: i64,
    pub total_attendees: usize,
    pub total_users: usize,
    /// Attendees as a percentage of expected users, 0 when nobody was expected.
    pub attendance_rate: f64,
    pub penalties_applied: usize,
}

pub struct SessionService<R> {
    repo: Arc<R>,
    settings: ServiceSettings,
}

/// `CHECKIN_qr_<creation millis>_<random suffix>`
pub fn generate_token(now: DateTime<Utc>) -> String {
    let suffix: String = rand::rng()
        .sample_iter(Alphanumeric)
        .take(TOKEN_SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("CHECKIN_qr_{}_{}", now.timestamp_millis(), suffix)
}

/// The live session with the latest start, unless `user_id` already attended it.
pub(crate) async fn current_session<R>(
    repo: &R,
    user_id: &str,
    now: DateTime<Utc>,
    read_retry: RetryPolicy,
) -> AttendanceResult<Option<QrSessionDetail>>
where
    R: AttendanceRepository,
{
    let query = SessionQuery {
        active_only: true,
        live_at: Some(now),
        order: SessionOrder::LatestStart,
        limit: Some(1),
        ..Default::default()
    };
    let session = with_read_retry(read_retry, || repo.find_sessions(&query))
        .await?
        .into_iter()
        .next();

    Ok(session.filter(|s| !s.has_attended(user_id)))
}

/// The active session starting soonest after `now`.
pub(crate) async fn next_session<R>(
    repo: &R,
    now: DateTime<Utc>,
    read_retry: RetryPolicy,
) -> AttendanceResult<Option<QrSessionDetail>>
where
    R: AttendanceRepository,
{
    let query = SessionQuery {
        active_only: true,
        starts_after: Some(now),
        order: SessionOrder::EarliestStart,
        limit: Some(1),
        ..Default::default()
    };
    Ok(with_read_retry(read_retry, || repo.find_sessions(&query))
        .await?
        .into_iter()
        .next())
}

impl<R> SessionService<R>
where
    R: AttendanceRepository,
{
    pub fn new(repo: Arc<R>, settings: ServiceSettings) -> Self {
        Self { repo, settings }
    }

    /// Schedules a session and returns its check-in token.
    ///
    /// The participant list is resolved from `params.selection` now and stored
    /// with the session. The start may lie in the past.
    pub async fn create_session(
        &self,
        mut params: CreateQrSession,
        now: DateTime<Utc>,
    ) -> AttendanceResult<String> {
        params.title = params.title.trim().to_owned();
        params.generated_by = params.generated_by.trim().to_owned();
        params.validate()?;

        if params.end_date_time <= params.start_date_time {
            return Err(AttendanceError::InvalidSelection(format!(
                "session must end after it starts ({} <= {})",
                params.end_date_time, params.start_date_time
            )));
        }

        let all_users = params
            .selection
            .resolve(self.repo.as_ref(), self.settings.read_retry)
            .await?;

        let mut attempt = 1;
        loop {
            let new = NewQrSession {
                title: params.title.clone(),
                description: params.description.clone(),
                start_date_time: params.start_date_time,
                end_date_time: params.end_date_time,
                qr_code_data: generate_token(now),
                generated_by: params.generated_by.clone(),
                created_at: now,
                exp_reward: params.exp_reward,
                penalty_exp: params.penalty_exp,
                all_users: all_users.clone(),
            };

            let mut tx = self.repo.begin().await?;
            match tx.insert_session(new).await {
                Ok(detail) => {
                    tx.commit().await?;
                    info!(
                        session_id = detail.session.id,
                        participants = detail.all_users.len(),
                        "QR session \"{}\" created",
                        detail.session.title
                    );
                    return Ok(detail.session.qr_code_data);
                }
                Err(StoreError::Conflict(reason)) if attempt < TOKEN_ATTEMPTS => {
                    warn!(attempt, %reason, "token collision, regenerating");
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Shows who a selection would currently resolve to.
    pub async fn preview_selection(
        &self,
        selection: &UserSelection,
    ) -> AttendanceResult<SelectionPreview> {
        selection
            .preview(self.repo.as_ref(), self.settings.read_retry)
            .await
    }

    /// Every session, newest first.
    pub async fn list_sessions(&self) -> AttendanceResult<Vec<QrSessionDetail>> {
        let query = SessionQuery::default();
        Ok(self.read(|| self.repo.find_sessions(&query)).await?)
    }

    /// Active sessions that have not ended yet, soonest ending first.
    pub async fn active_sessions(&self, now: DateTime<Utc>) -> AttendanceResult<Vec<QrSessionDetail>> {
        let query = SessionQuery {
            active_only: true,
            ends_after: Some(now),
            order: SessionOrder::EarliestEnd,
            ..Default::default()
        };
        Ok(self.read(|| self.repo.find_sessions(&query)).await?)
    }

    pub async fn find_session(&self, id: i64) -> AttendanceResult<QrSessionDetail> {
        self.read(|| self.repo.find_session(id))
            .await?
            .ok_or_else(|| AttendanceError::session_not_found(id))
    }

    /// The active session behind a scanned token.
    pub async fn find_by_token(&self, token: &str) -> AttendanceResult<Option<QrSessionDetail>> {
        Ok(self
            .read(|| self.repo.find_active_session_by_token(token))
            .await?)
    }

    pub async fn current_session_for(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> AttendanceResult<Option<QrSessionDetail>> {
        current_session(self.repo.as_ref(), user_id, now, self.settings.read_retry).await
    }

    pub async fn next_session(&self, now: DateTime<Utc>) -> AttendanceResult<Option<QrSessionDetail>> {
        next_session(self.repo.as_ref(), now, self.settings.read_retry).await
    }

    /// Closes a session for scanning. Returns false when it was already inactive.
    pub async fn deactivate_session(&self, id: i64) -> AttendanceResult<bool> {
        let mut tx = self.repo.begin().await?;
        if tx.reload_session(id).await?.is_none() {
            return Err(AttendanceError::session_not_found(id));
        }
        let changed = tx.deactivate_session(id).await?;
        tx.commit().await?;

        if changed {
            info!(session_id = id, "QR session deactivated");
        }
        Ok(changed)
    }

    pub async fn session_stats(&self, id: i64) -> AttendanceResult<SessionStats> {
        let detail = self.find_session(id).await?;
        let total_attendees = detail.attendees.len();
        let total_users = detail.all_users.len();
        let attendance_rate = if total_users > 0 {
            total_attendees as f64 / total_users as f64 * 100.0
        } else {
            0.0
        };

        Ok(SessionStats {
            session_id: id,
            total_attendees,
            total_users,
            attendance_rate,
            penalties_applied: detail.penalized_users.len(),
        })
    }

    async fn read<T, F, Fut>(&self, op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, StoreError>>,
    {
        with_read_retry(self.settings.read_retry, op).await
    }
}
