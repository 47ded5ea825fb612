pub mod m202510160001_create_users;
pub mod m202510160002_create_qr_sessions;
pub mod m202510160003_create_check_in_records;
pub mod m202510160004_create_penalty_records;
