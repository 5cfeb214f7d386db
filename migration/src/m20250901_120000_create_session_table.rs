use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Session::Table)
                    .if_not_exists()
                    .col(big_integer(Session::UserId).primary_key())
                    .col(string(Session::Username))
                    .col(string(Session::Name))
                    .col(string_null(Session::Email))
                    .col(string_null(Session::Mobile))
                    .col(string(Session::Role))
                    .col(text(Session::AccessToken))
                    .col(text(Session::RefreshToken))
                    .col(timestamp_with_time_zone(Session::SignedInAt))
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Session::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Session {
    Table,
    UserId,
    Username,
    Name,
    Email,
    Mobile,
    Role,
    AccessToken,
    RefreshToken,
    SignedInAt,
}
