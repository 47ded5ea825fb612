//! QR check-in workflow.
//!
//! Sessions are created by [`SessionService`], scanned through
//! [`CheckInService`] and reconciled by [`PenaltyService`]. All three are
//! generic over [`db::repositories::AttendanceRepository`].

pub mod check_in_service;
pub mod error;
pub mod penalty_service;
pub mod retry;
pub mod session_service;
pub mod settings;
pub mod user_selection;

pub use check_in_service::{CheckInReceipt, CheckInService, CheckInStatus};
pub use error::{AttendanceError, AttendanceResult};
pub use penalty_service::{PenaltyReport, PenaltyService, SweepReport};
pub use session_service::{CreateQrSession, SessionService, SessionStats};
pub use retry::RetryPolicy;
pub use settings::ServiceSettings;
pub use user_selection::{SelectionPreview, UserSelection};
