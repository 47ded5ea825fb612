use crate::seed::{Seeder, run_seeder};
use crate::seeds::{qr_session::QrSessionSeeder, user::UserSeeder};
use migration::Migrator;
use sea_orm_migration::MigratorTrait;

mod seed;
mod seeds;

#[tokio::main]
async fn main() {
    let db = match db::connect().await {
        Ok(db) => db,
        Err(err) => {
            eprintln!("Failed to connect to database: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = Migrator::up(&db, None).await {
        eprintln!("Failed to migrate database: {err}");
        std::process::exit(1);
    }

    for (seeder, name) in [
        (Box::new(UserSeeder) as Box<dyn Seeder + Send + Sync>, "User"),
        (Box::new(QrSessionSeeder), "QrSession"),
    ] {
        run_seeder(&*seeder, name, &db).await;
    }
}
