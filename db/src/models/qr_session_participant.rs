use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One expected participant of a session, resolved once when the session is created.
///
/// `user_id` is intentionally not a foreign key: explicit selections may name
/// users whose profile does not exist (yet).
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "qr_session_participants")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub session_id: i64,
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::qr_session::Entity",
        from = "Column::SessionId",
        to = "super::qr_session::Column::Id",
        on_delete = "Cascade"
    )]
    Session,
}

impl Related<super::qr_session::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Session.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
