use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};

use crate::db::PgPool;
use crate::errors::AppError;
use crate::models::session::{PgSessionStore, SessionStore};
use crate::models::snippet::{SnippetModel, SnippetStore};
use crate::models::user::{UserModel, UserStore};
use crate::security::session::{AUTHENTICATED_USER_KEY, FLASH_KEY, Session};
use crate::templates::{TemplateCache, TemplateData};

/// Application context built once at startup and cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub snippets: Arc<dyn SnippetStore>,
    pub users: Arc<dyn UserStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub templates: Arc<TemplateCache>,
    pub static_dir: PathBuf,
    pub secure_cookies: bool,
}

impl AppState {
    pub fn with_pool(
        pool: PgPool,
        templates: TemplateCache,
        static_dir: PathBuf,
        secure_cookies: bool,
    ) -> Self {
        Self {
            snippets: Arc::new(SnippetModel::new(pool.clone())),
            users: Arc::new(UserModel::new(pool.clone())),
            sessions: Arc::new(PgSessionStore::new(pool)),
            templates: Arc::new(templates),
            static_dir,
            secure_cookies,
        }
    }

    /// Starts the data for a page render, consuming any pending flash message.
    pub fn template_data(&self, session: &Session) -> TemplateData {
        TemplateData::new(
            session.pop_string(FLASH_KEY),
            session.contains(AUTHENTICATED_USER_KEY),
        )
    }

    pub fn render(
        &self,
        status: StatusCode,
        page: &str,
        data: &TemplateData,
    ) -> Result<Response, AppError> {
        let body = self.templates.render(page, data)?;
        Ok((status, Html(body)).into_response())
    }
}
