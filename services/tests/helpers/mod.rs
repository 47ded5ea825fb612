#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use db::models::user::{self, Role};
use db::repositories::{QrSessionDetail, SeaOrmRepository};
use db::test_utils::setup_test_db;
use services::{
    CheckInService, CreateQrSession, PenaltyService, ServiceSettings, SessionService,
    UserSelection,
};

pub struct TestEnv {
    pub repo: Arc<SeaOrmRepository>,
    pub sessions: SessionService<SeaOrmRepository>,
    pub check_ins: CheckInService<SeaOrmRepository>,
    pub penalties: PenaltyService<SeaOrmRepository>,
}

pub async fn setup() -> TestEnv {
    let repo = Arc::new(SeaOrmRepository::new(setup_test_db().await));
    let settings = ServiceSettings::default();
    TestEnv {
        sessions: SessionService::new(repo.clone(), settings),
        check_ins: CheckInService::new(repo.clone(), settings),
        penalties: PenaltyService::new(repo.clone(), settings),
        repo,
    }
}

/// 2026-10-16 09:00:00 UTC
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap()
}

pub fn minutes(n: i64) -> Duration {
    Duration::minutes(n)
}

impl TestEnv {
    pub async fn profile(&self, id: &str, exp: i64, level: i32) -> user::Model {
        self.profile_with(id, exp, level, Role::User, true).await
    }

    pub async fn profile_with(
        &self,
        id: &str,
        exp: i64,
        level: i32,
        role: Role,
        is_active: bool,
    ) -> user::Model {
        let db = self.repo.connection();
        user::Model::create(db, id, &format!("User {id}"), &format!("{id}@example.com"), role, is_active)
            .await
            .expect("Failed to create profile");
        user::Model::set_exp(db, id, exp, level)
            .await
            .expect("Failed to set profile EXP")
    }

    pub async fn reload_profile(&self, id: &str) -> user::Model {
        user::Model::find_by_id(self.repo.connection(), id)
            .await
            .expect("Failed to load profile")
            .expect("Profile missing")
    }

    /// Creates a session for `user_ids` and returns its token and id.
    pub async fn session(
        &self,
        title: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exp_reward: i64,
        penalty_exp: i64,
        user_ids: &[&str],
    ) -> (String, i64) {
        let params = session_params(
            title,
            start,
            end,
            exp_reward,
            penalty_exp,
            UserSelection::Explicit {
                user_ids: user_ids.iter().map(|id| id.to_string()).collect(),
            },
        );
        let token = self
            .sessions
            .create_session(params, base_time() - minutes(60))
            .await
            .expect("Failed to create session");
        let id = self.detail_by_token(&token).await.session.id;
        (token, id)
    }

    pub async fn detail_by_token(&self, token: &str) -> QrSessionDetail {
        self.sessions
            .find_by_token(token)
            .await
            .expect("Failed to look up token")
            .expect("No active session for token")
    }
}

pub fn session_params(
    title: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    exp_reward: i64,
    penalty_exp: i64,
    selection: UserSelection,
) -> CreateQrSession {
    CreateQrSession {
        title: title.to_string(),
        description: None,
        start_date_time: start,
        end_date_time: end,
        exp_reward,
        penalty_exp,
        generated_by: "admin-1".to_string(),
        selection,
    }
}
