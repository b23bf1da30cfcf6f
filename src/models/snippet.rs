use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::Serialize;

use crate::db::{PgPool, connection};
use crate::schema::snippets;

use super::ModelResult;

pub const LATEST_LIMIT: i64 = 10;

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = snippets)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Snippet {
    pub id: i32,
    pub title: String,
    pub content: String,
    pub created: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = snippets)]
struct NewSnippet<'a> {
    title: &'a str,
    content: &'a str,
    created: DateTime<Utc>,
    expires: DateTime<Utc>,
}

#[async_trait]
pub trait SnippetStore: Send + Sync {
    /// Up to [`LATEST_LIMIT`] unexpired snippets, newest first.
    async fn latest(&self) -> ModelResult<Vec<Snippet>>;

    /// Returns [`super::ModelError::NoRecord`] for unknown or expired ids.
    async fn get(&self, id: i32) -> ModelResult<Snippet>;

    async fn insert(&self, title: &str, content: &str, expires_in_days: i32) -> ModelResult<i32>;
}

pub struct SnippetModel {
    pool: PgPool,
}

impl SnippetModel {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnippetStore for SnippetModel {
    async fn latest(&self) -> ModelResult<Vec<Snippet>> {
        let mut conn = connection(&self.pool).await?;

        let results = snippets::table
            .filter(snippets::expires.gt(Utc::now()))
            .order(snippets::id.desc())
            .limit(LATEST_LIMIT)
            .select(Snippet::as_select())
            .load(&mut conn)
            .await?;

        Ok(results)
    }

    async fn get(&self, id: i32) -> ModelResult<Snippet> {
        let mut conn = connection(&self.pool).await?;

        let snippet = snippets::table
            .filter(snippets::id.eq(id))
            .filter(snippets::expires.gt(Utc::now()))
            .select(Snippet::as_select())
            .first(&mut conn)
            .await?;

        Ok(snippet)
    }

    #[tracing::instrument(name = "insert_snippet", skip(self, title, content))]
    async fn insert(&self, title: &str, content: &str, expires_in_days: i32) -> ModelResult<i32> {
        let created = Utc::now();
        let new_snippet = NewSnippet {
            title,
            content,
            created,
            expires: created + Duration::days(i64::from(expires_in_days)),
        };

        let mut conn = connection(&self.pool).await?;

        let id = diesel::insert_into(snippets::table)
            .values(&new_snippet)
            .returning(snippets::id)
            .get_result(&mut conn)
            .await?;

        tracing::debug!(snippet_id = id, "Snippet inserted");

        Ok(id)
    }
}
