pub mod check_in_record;
pub mod penalty_record;
pub mod qr_session;
pub mod qr_session_participant;
pub mod user;

pub use check_in_record::Entity as CheckInRecord;
pub use penalty_record::Entity as PenaltyRecord;
pub use qr_session::Entity as QrSession;
pub use qr_session_participant::Entity as QrSessionParticipant;
pub use user::Entity as User;
