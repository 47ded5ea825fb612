use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ConnectionTrait, DbErr, Set};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Directory-wide role of a user.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Display, EnumString, Deserialize, Serialize,
)]
#[serde(rename_all = "snake_case")]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "user_role_type")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Role {
    #[sea_orm(string_value = "user")]
    User,

    #[sea_orm(string_value = "admin")]
    Admin,
}

/// A user profile in the `users` table.
///
/// The id is the opaque uid issued by the identity provider. EXP and level are
/// only ever changed through [`crate::progression`].
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// Display name.
    pub name: String,
    pub email: String,
    pub role: Role,
    /// Experience points, never negative.
    pub exp: i64,
    /// Current level, never below 1.
    pub level: i32,
    /// Activity flag used by the "active users only" selection.
    pub is_active: bool,
    pub total_check_ins: i32,
    pub total_penalties: i32,
    pub last_check_in: Option<DateTime<Utc>>,
    pub last_penalty: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::check_in_record::Entity")]
    CheckIns,
    #[sea_orm(has_many = "super::penalty_record::Entity")]
    Penalties,
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

impl Model {
    /// Inserts a fresh profile with 0 EXP at level 1.
    pub async fn create<C>(
        db: &C,
        id: &str,
        name: &str,
        email: &str,
        role: Role,
        is_active: bool,
    ) -> Result<Model, DbErr>
    where
        C: ConnectionTrait,
    {
        let now = Utc::now();
        let active = ActiveModel {
            id: Set(id.to_owned()),
            name: Set(name.to_owned()),
            email: Set(email.to_owned()),
            role: Set(role),
            exp: Set(0),
            level: Set(1),
            is_active: Set(is_active),
            total_check_ins: Set(0),
            total_penalties: Set(0),
            last_check_in: Set(None),
            last_penalty: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        active.insert(db).await
    }

    pub async fn find_by_id<C>(db: &C, id: &str) -> Result<Option<Model>, DbErr>
    where
        C: ConnectionTrait,
    {
        Entity::find_by_id(id.to_owned()).one(db).await
    }

    /// Overwrites the stored EXP and level, bypassing the progression rules.
    ///
    /// Meant for seeding and admin corrections only.
    pub async fn set_exp<C>(db: &C, id: &str, exp: i64, level: i32) -> Result<Model, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active: ActiveModel = Entity::find_by_id(id.to_owned())
            .one(db)
            .await?
            .ok_or(DbErr::RecordNotFound(format!("User {id} not found")))?
            .into();
        active.exp = Set(exp.max(0));
        active.level = Set(level.max(1));
        active.updated_at = Set(Utc::now());
        active.update(db).await
    }
}
