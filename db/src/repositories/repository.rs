//! Persistence interface of the check-in workflow.
//!
//! [`AttendanceRepository`] answers point reads and queries,
//! [`AttendanceTransaction`] is a unit of work: every read made through it sees
//! the writes made through it, and nothing is visible to anyone else until
//! [`AttendanceTransaction::commit`]. Dropping a transaction without committing
//! rolls it back.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{DbErr, SqlErr};

use crate::models::{check_in_record, penalty_record, qr_session, user};

/// Errors raised by a repository implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    /// A uniqueness guarantee rejected the write, usually because a concurrent
    /// operation got there first.
    #[error("Conflicting write: {0}")]
    Conflict(String),
}

impl StoreError {
    /// Classifies a failed write, turning unique-constraint violations into
    /// [`StoreError::Conflict`].
    pub fn from_write(err: DbErr) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(detail)) => {
                tracing::debug!(%detail, "write rejected by unique index");
                StoreError::Conflict(detail)
            }
            _ => StoreError::Database(err),
        }
    }

    /// Connection-level failures that may succeed when simply tried again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Database(DbErr::ConnectionAcquire(_) | DbErr::Conn(_))
        )
    }
}

/// Filter over the user directory. All set criteria must match.
#[derive(Debug, Clone, Default)]
pub struct DirectoryQuery {
    pub ids: Option<Vec<String>>,
    pub active_only: bool,
    pub role: Option<user::Role>,
    /// Inclusive lower level bound.
    pub min_level: Option<i32>,
    /// Inclusive upper level bound.
    pub max_level: Option<i32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionOrder {
    #[default]
    NewestCreated,
    LatestStart,
    EarliestStart,
    EarliestEnd,
}

/// Filter over sessions. All set criteria must match; ties in the chosen
/// order are broken by id so results are deterministic.
#[derive(Debug, Clone, Default)]
pub struct SessionQuery {
    pub active_only: bool,
    /// `start <= t < end`
    pub live_at: Option<DateTime<Utc>>,
    /// `start > t`
    pub starts_after: Option<DateTime<Utc>>,
    /// `end > t`
    pub ends_after: Option<DateTime<Utc>>,
    /// `end <= t`
    pub ended_by: Option<DateTime<Utc>>,
    pub order: SessionOrder,
    pub limit: Option<u64>,
}

/// Filter over check-in or penalty records, newest first.
#[derive(Debug, Clone, Default)]
pub struct RecordQuery {
    pub user_id: Option<String>,
    pub session_id: Option<i64>,
    /// Inclusive lower time bound.
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper time bound.
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<u64>,
}

/// A session together with its member sets.
#[derive(Debug, Clone, PartialEq)]
pub struct QrSessionDetail {
    pub session: qr_session::Model,
    /// Users expected to attend, frozen at creation.
    pub all_users: BTreeSet<String>,
    /// Users holding a check-in record for the session.
    pub attendees: BTreeSet<String>,
    /// Users holding a penalty record for the session.
    pub penalized_users: BTreeSet<String>,
}

impl QrSessionDetail {
    pub fn new(session: qr_session::Model) -> Self {
        Self {
            session,
            all_users: BTreeSet::new(),
            attendees: BTreeSet::new(),
            penalized_users: BTreeSet::new(),
        }
    }

    pub fn has_attended(&self, user_id: &str) -> bool {
        self.attendees.contains(user_id)
    }

    /// Expected users who neither attended nor have been penalized yet, in id order.
    pub fn penalty_candidates(&self) -> Vec<String> {
        self.all_users
            .iter()
            .filter(|id| !self.attendees.contains(*id) && !self.penalized_users.contains(*id))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct NewQrSession {
    pub title: String,
    pub description: Option<String>,
    pub start_date_time: DateTime<Utc>,
    pub end_date_time: DateTime<Utc>,
    pub qr_code_data: String,
    pub generated_by: String,
    pub created_at: DateTime<Utc>,
    pub exp_reward: i64,
    pub penalty_exp: i64,
    pub all_users: BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub struct NewCheckIn {
    pub user_id: String,
    pub session_id: i64,
    pub checked_in_at: DateTime<Utc>,
    pub exp_earned: i64,
}

#[derive(Debug, Clone)]
pub struct NewPenalty {
    pub user_id: String,
    pub session_id: i64,
    pub penalty_applied_at: DateTime<Utc>,
    pub exp_lost: i64,
    pub reason: String,
}

#[async_trait]
pub trait AttendanceRepository: Send + Sync {
    type Transaction: AttendanceTransaction;

    async fn begin(&self) -> Result<Self::Transaction, StoreError>;

    async fn find_users(&self, query: &DirectoryQuery) -> Result<Vec<user::Model>, StoreError>;

    async fn find_user(&self, user_id: &str) -> Result<Option<user::Model>, StoreError>;

    async fn find_session(&self, id: i64) -> Result<Option<QrSessionDetail>, StoreError>;

    /// The active session whose token equals `token`, if any.
    async fn find_active_session_by_token(
        &self,
        token: &str,
    ) -> Result<Option<QrSessionDetail>, StoreError>;

    async fn find_sessions(&self, query: &SessionQuery) -> Result<Vec<QrSessionDetail>, StoreError>;

    async fn find_check_ins(
        &self,
        query: &RecordQuery,
    ) -> Result<Vec<check_in_record::Model>, StoreError>;

    async fn find_penalties(
        &self,
        query: &RecordQuery,
    ) -> Result<Vec<penalty_record::Model>, StoreError>;
}

#[async_trait]
pub trait AttendanceTransaction: Send {
    /// Persists a session and its participant list. A token collision is a
    /// [`StoreError::Conflict`].
    async fn insert_session(&mut self, new: NewQrSession) -> Result<QrSessionDetail, StoreError>;

    /// Re-reads a session inside the transaction.
    async fn reload_session(&mut self, id: i64) -> Result<Option<QrSessionDetail>, StoreError>;

    async fn find_user(&mut self, user_id: &str) -> Result<Option<user::Model>, StoreError>;

    /// Fails with [`StoreError::Conflict`] if the user already checked in to the session.
    async fn insert_check_in(
        &mut self,
        record: NewCheckIn,
    ) -> Result<check_in_record::Model, StoreError>;

    /// Fails with [`StoreError::Conflict`] if the user was already penalized for the session.
    async fn insert_penalty(
        &mut self,
        record: NewPenalty,
    ) -> Result<penalty_record::Model, StoreError>;

    /// Stores the progression fields (EXP, level, counters, timestamps) of `profile`.
    async fn update_user(&mut self, profile: &user::Model) -> Result<user::Model, StoreError>;

    /// Flips `is_active` to false. Returns whether this call did the flip.
    async fn deactivate_session(&mut self, id: i64) -> Result<bool, StoreError>;

    async fn commit(self) -> Result<(), StoreError>;
}
