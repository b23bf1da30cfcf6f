use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::RunQueryDsl;
use serde_json::Value;

use crate::db::{PgPool, connection};
use crate::schema::sessions;

use super::ModelResult;

pub type SessionData = serde_json::Map<String, Value>;

/// Persistence for session payloads keyed by cookie token.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Expired sessions are reported as absent.
    async fn find(&self, token: &str) -> ModelResult<Option<SessionData>>;

    /// Upserts the session. Expired rows are purged on the way.
    async fn commit(&self, token: &str, data: &SessionData, expiry: DateTime<Utc>)
    -> ModelResult<()>;

    async fn delete(&self, token: &str) -> ModelResult<()>;
}

pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn find(&self, token: &str) -> ModelResult<Option<SessionData>> {
        let mut conn = connection(&self.pool).await?;

        let data: Option<Value> = sessions::table
            .filter(sessions::token.eq(token))
            .filter(sessions::expiry.gt(Utc::now()))
            .select(sessions::data)
            .first(&mut conn)
            .await
            .optional()?;

        Ok(data.map(|value| match value {
            Value::Object(map) => map,
            _ => SessionData::new(),
        }))
    }

    async fn commit(
        &self,
        token: &str,
        data: &SessionData,
        expiry: DateTime<Utc>,
    ) -> ModelResult<()> {
        let mut conn = connection(&self.pool).await?;

        diesel::insert_into(sessions::table)
            .values((
                sessions::token.eq(token),
                sessions::data.eq(Value::Object(data.clone())),
                sessions::expiry.eq(expiry),
            ))
            .on_conflict(sessions::token)
            .do_update()
            .set((
                sessions::data.eq(excluded(sessions::data)),
                sessions::expiry.eq(excluded(sessions::expiry)),
            ))
            .execute(&mut conn)
            .await?;

        let purged = diesel::delete(sessions::table.filter(sessions::expiry.lt(Utc::now())))
            .execute(&mut conn)
            .await?;
        if purged > 0 {
            tracing::debug!(purged, "Removed expired sessions");
        }

        Ok(())
    }

    async fn delete(&self, token: &str) -> ModelResult<()> {
        let mut conn = connection(&self.pool).await?;

        diesel::delete(sessions::table.filter(sessions::token.eq(token)))
            .execute(&mut conn)
            .await?;

        Ok(())
    }
}
