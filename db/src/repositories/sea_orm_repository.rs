//! SeaORM implementation of the attendance repository.
//!
//! Works against any SeaORM backend; the workspace runs it on SQLite (a file
//! in production, `sqlite::memory:` in tests).

use std::collections::HashMap;

use async_trait::async_trait;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    DbErr, EntityTrait, NotSet, QueryFilter, QueryOrder, QuerySelect, Select, Set,
    TransactionTrait,
};

use crate::models::{check_in_record, penalty_record, qr_session, qr_session_participant, user};
use crate::repositories::repository::{
    AttendanceRepository, AttendanceTransaction, DirectoryQuery, NewCheckIn, NewPenalty,
    NewQrSession, QrSessionDetail, RecordQuery, SessionOrder, SessionQuery, StoreError,
};

#[derive(Debug, Clone)]
pub struct SeaOrmRepository {
    db: DatabaseConnection,
}

impl SeaOrmRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

/// Transaction handle; rolled back by SeaORM when dropped uncommitted.
pub struct SeaOrmTransaction {
    txn: DatabaseTransaction,
}

fn session_select(query: &SessionQuery) -> Select<qr_session::Entity> {
    use qr_session::Column;

    let mut select = qr_session::Entity::find();
    if query.active_only {
        select = select.filter(Column::IsActive.eq(true));
    }
    if let Some(t) = query.live_at {
        select = select
            .filter(Column::StartDateTime.lte(t))
            .filter(Column::EndDateTime.gt(t));
    }
    if let Some(t) = query.starts_after {
        select = select.filter(Column::StartDateTime.gt(t));
    }
    if let Some(t) = query.ends_after {
        select = select.filter(Column::EndDateTime.gt(t));
    }
    if let Some(t) = query.ended_by {
        select = select.filter(Column::EndDateTime.lte(t));
    }

    select = match query.order {
        SessionOrder::NewestCreated => select
            .order_by_desc(Column::CreatedAt)
            .order_by_desc(Column::Id),
        SessionOrder::LatestStart => select
            .order_by_desc(Column::StartDateTime)
            .order_by_desc(Column::Id),
        SessionOrder::EarliestStart => select
            .order_by_asc(Column::StartDateTime)
            .order_by_asc(Column::Id),
        SessionOrder::EarliestEnd => select
            .order_by_asc(Column::EndDateTime)
            .order_by_asc(Column::StartDateTime)
            .order_by_asc(Column::Id),
    };

    if let Some(limit) = query.limit {
        select = select.limit(limit);
    }
    select
}

/// Attaches participants, attendees and penalized users to each session,
/// keeping the input order.
async fn load_details<C>(
    db: &C,
    sessions: Vec<qr_session::Model>,
) -> Result<Vec<QrSessionDetail>, DbErr>
where
    C: ConnectionTrait,
{
    if sessions.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<i64> = sessions.iter().map(|s| s.id).collect();
    let participants = qr_session_participant::Entity::find()
        .filter(qr_session_participant::Column::SessionId.is_in(ids.clone()))
        .all(db)
        .await?;
    let check_ins = check_in_record::Entity::find()
        .filter(check_in_record::Column::SessionId.is_in(ids.clone()))
        .all(db)
        .await?;
    let penalties = penalty_record::Entity::find()
        .filter(penalty_record::Column::SessionId.is_in(ids))
        .all(db)
        .await?;

    let index: HashMap<i64, usize> = sessions
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id, i))
        .collect();
    let mut details: Vec<QrSessionDetail> =
        sessions.into_iter().map(QrSessionDetail::new).collect();

    for p in participants {
        if let Some(&i) = index.get(&p.session_id) {
            details[i].all_users.insert(p.user_id);
        }
    }
    for c in check_ins {
        if let Some(&i) = index.get(&c.session_id) {
            details[i].attendees.insert(c.user_id);
        }
    }
    for p in penalties {
        if let Some(&i) = index.get(&p.session_id) {
            details[i].penalized_users.insert(p.user_id);
        }
    }

    Ok(details)
}

async fn load_one<C>(db: &C, id: i64) -> Result<Option<QrSessionDetail>, DbErr>
where
    C: ConnectionTrait,
{
    let Some(session) = qr_session::Entity::find_by_id(id).one(db).await? else {
        return Ok(None);
    };
    Ok(load_details(db, vec![session]).await?.into_iter().next())
}

#[async_trait]
impl AttendanceRepository for SeaOrmRepository {
    type Transaction = SeaOrmTransaction;

    async fn begin(&self) -> Result<SeaOrmTransaction, StoreError> {
        let txn = self.db.begin().await?;
        Ok(SeaOrmTransaction { txn })
    }

    async fn find_users(&self, query: &DirectoryQuery) -> Result<Vec<user::Model>, StoreError> {
        use user::Column;

        let mut select = user::Entity::find();
        if let Some(ids) = &query.ids {
            select = select.filter(Column::Id.is_in(ids.clone()));
        }
        if query.active_only {
            select = select.filter(Column::IsActive.eq(true));
        }
        if let Some(role) = query.role {
            select = select.filter(Column::Role.eq(role));
        }
        if let Some(min) = query.min_level {
            select = select.filter(Column::Level.gte(min));
        }
        if let Some(max) = query.max_level {
            select = select.filter(Column::Level.lte(max));
        }

        Ok(select.order_by_asc(Column::Id).all(&self.db).await?)
    }

    async fn find_user(&self, user_id: &str) -> Result<Option<user::Model>, StoreError> {
        Ok(user::Model::find_by_id(&self.db, user_id).await?)
    }

    async fn find_session(&self, id: i64) -> Result<Option<QrSessionDetail>, StoreError> {
        Ok(load_one(&self.db, id).await?)
    }

    async fn find_active_session_by_token(
        &self,
        token: &str,
    ) -> Result<Option<QrSessionDetail>, StoreError> {
        let session = qr_session::Entity::find()
            .filter(qr_session::Column::QrCodeData.eq(token))
            .filter(qr_session::Column::IsActive.eq(true))
            .one(&self.db)
            .await?;

        match session {
            Some(session) => Ok(load_details(&self.db, vec![session]).await?.into_iter().next()),
            None => Ok(None),
        }
    }

    async fn find_sessions(&self, query: &SessionQuery) -> Result<Vec<QrSessionDetail>, StoreError> {
        let sessions = session_select(query).all(&self.db).await?;
        Ok(load_details(&self.db, sessions).await?)
    }

    async fn find_check_ins(
        &self,
        query: &RecordQuery,
    ) -> Result<Vec<check_in_record::Model>, StoreError> {
        use check_in_record::Column;

        let mut select = check_in_record::Entity::find();
        if let Some(user_id) = &query.user_id {
            select = select.filter(Column::UserId.eq(user_id.as_str()));
        }
        if let Some(session_id) = query.session_id {
            select = select.filter(Column::SessionId.eq(session_id));
        }
        if let Some(from) = query.from {
            select = select.filter(Column::CheckedInAt.gte(from));
        }
        if let Some(until) = query.until {
            select = select.filter(Column::CheckedInAt.lt(until));
        }
        select = select
            .order_by_desc(Column::CheckedInAt)
            .order_by_desc(Column::Id);
        if let Some(limit) = query.limit {
            select = select.limit(limit);
        }

        Ok(select.all(&self.db).await?)
    }

    async fn find_penalties(
        &self,
        query: &RecordQuery,
    ) -> Result<Vec<penalty_record::Model>, StoreError> {
        use penalty_record::Column;

        let mut select = penalty_record::Entity::find();
        if let Some(user_id) = &query.user_id {
            select = select.filter(Column::UserId.eq(user_id.as_str()));
        }
        if let Some(session_id) = query.session_id {
            select = select.filter(Column::SessionId.eq(session_id));
        }
        if let Some(from) = query.from {
            select = select.filter(Column::PenaltyAppliedAt.gte(from));
        }
        if let Some(until) = query.until {
            select = select.filter(Column::PenaltyAppliedAt.lt(until));
        }
        select = select
            .order_by_desc(Column::PenaltyAppliedAt)
            .order_by_desc(Column::Id);
        if let Some(limit) = query.limit {
            select = select.limit(limit);
        }

        Ok(select.all(&self.db).await?)
    }
}

#[async_trait]
impl AttendanceTransaction for SeaOrmTransaction {
    async fn insert_session(&mut self, new: NewQrSession) -> Result<QrSessionDetail, StoreError> {
        let session = qr_session::ActiveModel {
            id: NotSet,
            title: Set(new.title),
            description: Set(new.description),
            start_date_time: Set(new.start_date_time),
            end_date_time: Set(new.end_date_time),
            qr_code_data: Set(new.qr_code_data),
            generated_by: Set(new.generated_by),
            created_at: Set(new.created_at),
            is_active: Set(true),
            exp_reward: Set(new.exp_reward),
            penalty_exp: Set(new.penalty_exp),
        }
        .insert(&self.txn)
        .await
        .map_err(StoreError::from_write)?;

        if !new.all_users.is_empty() {
            let rows = new
                .all_users
                .iter()
                .map(|user_id| qr_session_participant::ActiveModel {
                    session_id: Set(session.id),
                    user_id: Set(user_id.clone()),
                });
            qr_session_participant::Entity::insert_many(rows)
                .exec(&self.txn)
                .await
                .map_err(StoreError::from_write)?;
        }

        let mut detail = QrSessionDetail::new(session);
        detail.all_users = new.all_users;
        Ok(detail)
    }

    async fn reload_session(&mut self, id: i64) -> Result<Option<QrSessionDetail>, StoreError> {
        Ok(load_one(&self.txn, id).await?)
    }

    async fn find_user(&mut self, user_id: &str) -> Result<Option<user::Model>, StoreError> {
        Ok(user::Model::find_by_id(&self.txn, user_id).await?)
    }

    async fn insert_check_in(
        &mut self,
        record: NewCheckIn,
    ) -> Result<check_in_record::Model, StoreError> {
        check_in_record::ActiveModel {
            id: NotSet,
            user_id: Set(record.user_id),
            session_id: Set(record.session_id),
            checked_in_at: Set(record.checked_in_at),
            exp_earned: Set(record.exp_earned),
        }
        .insert(&self.txn)
        .await
        .map_err(StoreError::from_write)
    }

    async fn insert_penalty(
        &mut self,
        record: NewPenalty,
    ) -> Result<penalty_record::Model, StoreError> {
        penalty_record::ActiveModel {
            id: NotSet,
            user_id: Set(record.user_id),
            session_id: Set(record.session_id),
            penalty_applied_at: Set(record.penalty_applied_at),
            exp_lost: Set(record.exp_lost),
            reason: Set(record.reason),
        }
        .insert(&self.txn)
        .await
        .map_err(StoreError::from_write)
    }

    async fn update_user(&mut self, profile: &user::Model) -> Result<user::Model, StoreError> {
        let mut active: user::ActiveModel = profile.clone().into();
        active.exp = Set(profile.exp);
        active.level = Set(profile.level);
        active.total_check_ins = Set(profile.total_check_ins);
        active.total_penalties = Set(profile.total_penalties);
        active.last_check_in = Set(profile.last_check_in);
        active.last_penalty = Set(profile.last_penalty);
        active.updated_at = Set(profile.updated_at);
        Ok(active.update(&self.txn).await?)
    }

    async fn deactivate_session(&mut self, id: i64) -> Result<bool, StoreError> {
        let result = qr_session::Entity::update_many()
            .col_expr(qr_session::Column::IsActive, Expr::value(false))
            .filter(qr_session::Column::Id.eq(id))
            .filter(qr_session::Column::IsActive.eq(true))
            .exec(&self.txn)
            .await?;
        Ok(result.rows_affected > 0)
    }

    async fn commit(self) -> Result<(), StoreError> {
        Ok(self.txn.commit().await?)
    }
}
