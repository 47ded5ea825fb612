use sea_orm_migration::prelude::*;

use crate::migrations;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(migrations::m202510160001_create_users::Migration),
            Box::new(migrations::m202510160002_create_qr_sessions::Migration),
            Box::new(migrations::m202510160003_create_check_in_records::Migration),
            Box::new(migrations::m202510160004_create_penalty_records::Migration),
        ]
    }
}
