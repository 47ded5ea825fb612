use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A scheduled, time-boxed QR check-in window.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "qr_sessions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    /// First instant at which a scan is accepted.
    pub start_date_time: DateTime<Utc>,
    /// First instant at which scans are rejected again (exclusive bound).
    pub end_date_time: DateTime<Utc>,
    /// Opaque token rendered as the scannable code.
    #[sea_orm(unique)]
    pub qr_code_data: String,
    /// Id of the admin who scheduled the session.
    pub generated_by: String,
    pub created_at: DateTime<Utc>,
    /// Only ever flips from `true` to `false`.
    pub is_active: bool,
    pub exp_reward: i64,
    pub penalty_exp: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::qr_session_participant::Entity")]
    Participants,
    #[sea_orm(has_many = "super::check_in_record::Entity")]
    CheckIns,
    #[sea_orm(has_many = "super::penalty_record::Entity")]
    Penalties,
}

impl Related<super::qr_session_participant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Participants.def()
    }
}

impl Related<super::check_in_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CheckIns.def()
    }
}

impl Related<super::penalty_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Penalties.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Where an instant falls relative to a session's `[start, end)` window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    NotStarted,
    Open,
    Ended,
}

impl Model {
    pub fn window_state(&self, now: DateTime<Utc>) -> WindowState {
        if now < self.start_date_time {
            WindowState::NotStarted
        } else if now < self.end_date_time {
            WindowState::Open
        } else {
            WindowState::Ended
        }
    }

    #[inline]
    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        self.window_state(now) == WindowState::Ended
    }
}
