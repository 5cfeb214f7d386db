// Persistence for the signed-in session; sqlite via sea-orm

use std::str::FromStr;

use entities::session;
use sea_orm::{ActiveValue::Set, DatabaseConnection, DbErr, EntityTrait, QueryOrder};
use thiserror::Error;

use crate::{
    domain::models::{Role, User},
    session::Session,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] DbErr),

    #[error("stored session is corrupt: {0}")]
    Corrupt(String),
}

#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self) -> Result<Option<Session>, StoreError>;
    /// Replace whatever session was stored before
    async fn save(&self, session: &Session) -> Result<(), StoreError>;
    async fn clear(&self) -> Result<(), StoreError>;
}

pub struct SqliteSessionStore {
    db: DatabaseConnection,
}

impl SqliteSessionStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl SessionStore for SqliteSessionStore {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn load(&self) -> Result<Option<Session>, StoreError> {
        let row = session::Entity::find()
            .order_by_desc(session::Column::SignedInAt)
            .one(&self.db)
            .await?;
        row.map(session_from_row).transpose()
    }

    #[tracing::instrument(level = "debug", skip(self, session), fields(user_id = session.user.id))]
    async fn save(&self, session: &Session) -> Result<(), StoreError> {
        session::Entity::delete_many().exec(&self.db).await?;
        let row = session::ActiveModel {
            user_id: Set(session.user.id),
            username: Set(session.user.username.clone()),
            name: Set(session.user.name.clone()),
            email: Set(session.user.email.clone()),
            mobile: Set(session.user.mobile.clone()),
            role: Set(session.user.role.as_str().to_string()),
            access_token: Set(session.access.clone()),
            refresh_token: Set(session.refresh.clone()),
            signed_in_at: Set(session.signed_in_at),
        };
        session::Entity::insert(row).exec(&self.db).await?;
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn clear(&self) -> Result<(), StoreError> {
        let res = session::Entity::delete_many().exec(&self.db).await?;
        tracing::debug!(rows = res.rows_affected, "cleared stored session");
        Ok(())
    }
}

fn session_from_row(row: session::Model) -> Result<Session, StoreError> {
    let role = Role::from_str(&row.role).map_err(StoreError::Corrupt)?;
    Ok(Session {
        access: row.access_token,
        refresh: row.refresh_token,
        user: User {
            id: row.user_id,
            name: row.name,
            username: row.username,
            mobile: row.mobile,
            email: row.email,
            role,
        },
        signed_in_at: row.signed_in_at,
    })
}
