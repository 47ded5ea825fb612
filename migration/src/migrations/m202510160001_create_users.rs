use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m202510160001_create_users"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Alias::new("users"))
                    .if_not_exists()
                    // Opaque uid issued by the identity provider.
                    .col(ColumnDef::new(Alias::new("id")).string().not_null().primary_key())
                    .col(ColumnDef::new(Alias::new("name")).string().not_null())
                    .col(ColumnDef::new(Alias::new("email")).string().not_null())
                    .col(ColumnDef::new(Alias::new("role")).string().not_null().default("user"))
                    .col(ColumnDef::new(Alias::new("exp")).big_integer().not_null().default(0))
                    .col(ColumnDef::new(Alias::new("level")).integer().not_null().default(1))
                    .col(ColumnDef::new(Alias::new("is_active")).boolean().not_null().default(true))
                    .col(ColumnDef::new(Alias::new("total_check_ins")).integer().not_null().default(0))
                    .col(ColumnDef::new(Alias::new("total_penalties")).integer().not_null().default(0))
                    .col(ColumnDef::new(Alias::new("last_check_in")).timestamp().null())
                    .col(ColumnDef::new(Alias::new("last_penalty")).timestamp().null())
                    .col(ColumnDef::new(Alias::new("created_at")).timestamp().not_null().default(Expr::cust("CURRENT_TIMESTAMP")))
                    .col(ColumnDef::new(Alias::new("updated_at")).timestamp().not_null().default(Expr::cust("CURRENT_TIMESTAMP")))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_users_role_level")
                    .if_not_exists()
                    .table(Alias::new("users"))
                    .col(Alias::new("role"))
                    .col(Alias::new("level"))
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Alias::new("users")).to_owned())
            .await
    }
}
