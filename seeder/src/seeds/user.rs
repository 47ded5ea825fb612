use crate::seed::{SeedResult, Seeder};
use db::models::user::{Model, Role};
use db::progression::level_for_exp;
use fake::{
    Fake,
    faker::{internet::en::SafeEmail, name::en::Name},
};
use rand::Rng;
use sea_orm::DatabaseConnection;

pub struct UserSeeder;

#[async_trait::async_trait]
impl Seeder for UserSeeder {
    async fn seed(&self, db: &DatabaseConnection) -> SeedResult {
        // Fixed admin and member
        if Model::find_by_id(db, "admin-0001").await?.is_none() {
            Model::create(db, "admin-0001", "Admin", "admin@example.com", Role::Admin, true).await?;
        }
        if Model::find_by_id(db, "user-0001").await?.is_none() {
            Model::create(db, "user-0001", "Demo User", "user@example.com", Role::User, true).await?;
        }

        // Random members with some EXP, a couple of them inactive
        for i in 0..10 {
            let id = format!("user-{:04}", rand::rng().random_range(1000..10_000));
            if Model::find_by_id(db, &id).await?.is_some() {
                continue;
            }
            let name: String = Name().fake();
            let email: String = SafeEmail().fake();
            Model::create(db, &id, &name, &email, Role::User, i % 5 != 0).await?;

            let exp = rand::rng().random_range(0..450);
            Model::set_exp(db, &id, exp, level_for_exp(exp)).await?;
        }
        Ok(())
    }
}
