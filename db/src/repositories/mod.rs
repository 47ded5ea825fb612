pub mod repository;
pub mod sea_orm_repository;

pub use repository::{
    AttendanceRepository, AttendanceTransaction, DirectoryQuery, NewCheckIn, NewPenalty,
    NewQrSession, QrSessionDetail, RecordQuery, SessionOrder, SessionQuery, StoreError,
};
pub use sea_orm_repository::{SeaOrmRepository, SeaOrmTransaction};
