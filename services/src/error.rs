use chrono::{DateTime, Utc};
use db::repositories::StoreError;
use validator::ValidationErrors;

pub type AttendanceResult<T> = Result<T, AttendanceError>;

/// Everything the check-in workflow can refuse or fail with.
///
/// All variants except [`AttendanceError::Store`] are expected, user-facing
/// outcomes and carry what a client needs to render a specific message.
#[derive(Debug, thiserror::Error)]
pub enum AttendanceError {
    #[error("Invalid participant selection: {0}")]
    InvalidSelection(String),

    #[error("Invalid session details: {0}")]
    Validation(String),

    #[error("QR code does not match any active session")]
    InvalidToken,

    #[error("Check-in for \"{title}\" opens at {starts_at}")]
    SessionNotStarted {
        title: String,
        starts_at: DateTime<Utc>,
    },

    #[error("Check-in for \"{title}\" closed at {ended_at}")]
    SessionEnded {
        title: String,
        ended_at: DateTime<Utc>,
    },

    #[error("User {user_id} already checked in to session {session_id}")]
    AlreadyCheckedIn { session_id: i64, user_id: String },

    #[error("Session {session_id} is still running until {ends_at}")]
    SessionStillActive {
        session_id: i64,
        ends_at: DateTime<Utc>,
    },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Storage failure: {0}")]
    Store(#[from] StoreError),
}

impl AttendanceError {
    pub fn session_not_found(id: i64) -> Self {
        AttendanceError::NotFound {
            entity: "Session",
            id: id.to_string(),
        }
    }

    pub fn user_not_found(id: &str) -> Self {
        AttendanceError::NotFound {
            entity: "User",
            id: id.to_string(),
        }
    }

    /// False only for storage failures, where the outcome of a write is unknown.
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, AttendanceError::Store(_))
    }

    pub(crate) fn is_write_conflict(&self) -> bool {
        matches!(self, AttendanceError::Store(StoreError::Conflict(_)))
    }
}

impl From<ValidationErrors> for AttendanceError {
    fn from(errors: ValidationErrors) -> Self {
        AttendanceError::Validation(format_validation_errors(&errors))
    }
}

pub fn format_validation_errors(errors: &ValidationErrors) -> String {
    let mut messages: Vec<String> = errors
        .field_errors()
        .values()
        .flat_map(|errs| {
            errs.iter()
                .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
        })
        .collect();
    messages.sort();
    messages.join("; ")
}
