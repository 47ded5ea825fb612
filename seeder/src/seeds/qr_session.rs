use std::sync::Arc;

use crate::seed::{SeedResult, Seeder};
use chrono::{Duration, Utc};
use db::repositories::{AttendanceRepository, DirectoryQuery, SeaOrmRepository};
use rand::seq::IndexedRandom;
use sea_orm::DatabaseConnection;
use services::{
    CheckInService, CreateQrSession, PenaltyService, ServiceSettings, SessionService,
    UserSelection,
};

pub struct QrSessionSeeder;

fn params(title: &str, starts_in: Duration, length: Duration, selection: UserSelection) -> CreateQrSession {
    let start = Utc::now() + starts_in;
    CreateQrSession {
        title: title.to_string(),
        description: Some(format!("{title} (seeded)")),
        start_date_time: start,
        end_date_time: start + length,
        exp_reward: 10,
        penalty_exp: 5,
        generated_by: "admin-0001".to_string(),
        selection,
    }
}

#[async_trait::async_trait]
impl Seeder for QrSessionSeeder {
    async fn seed(&self, db: &DatabaseConnection) -> SeedResult {
        let repo = Arc::new(SeaOrmRepository::new(db.clone()));
        let settings = ServiceSettings::default();
        let sessions = SessionService::new(repo.clone(), settings);
        let check_ins = CheckInService::new(repo.clone(), settings);
        let penalties = PenaltyService::new(repo.clone(), settings);
        let now = Utc::now();

        // Yesterday's session: half the active members attended, the rest get penalized.
        let past = params(
            "Yesterday's stand-up",
            Duration::days(-1),
            Duration::hours(1),
            UserSelection::ActiveUsers,
        );
        let past_start = past.start_date_time;
        let token = sessions.create_session(past, now - Duration::days(2)).await?;

        let active = repo
            .find_users(&DirectoryQuery {
                active_only: true,
                ..Default::default()
            })
            .await?;
        let attending: Vec<_> = active
            .choose_multiple(&mut rand::rng(), (active.len() / 2).min(30))
            .cloned()
            .collect();
        for (i, user) in attending.iter().enumerate() {
            let at = past_start + Duration::minutes(i as i64 + 1);
            check_ins.check_in(&token, &user.id, at).await?;
        }
        if let Some(detail) = sessions.find_by_token(&token).await? {
            penalties.apply_penalties(detail.session.id, now).await?;
            sessions.deactivate_session(detail.session.id).await?;
        }

        // One running now, one later today.
        sessions
            .create_session(
                params("Live workshop", Duration::minutes(-15), Duration::hours(2), UserSelection::ActiveUsers),
                now,
            )
            .await?;
        sessions
            .create_session(
                params("Evening review", Duration::hours(6), Duration::hours(1), UserSelection::AllUsers),
                now,
            )
            .await?;

        Ok(())
    }
}
