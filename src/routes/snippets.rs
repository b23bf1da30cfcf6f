use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::ModelError;
use crate::security::form::ValidatedForm;
use crate::security::session::{FLASH_KEY, Session};
use crate::state::AppState;
use crate::validator::{Validator, max_chars, not_blank, permitted_value};

pub const PERMITTED_EXPIRY_DAYS: [i32; 3] = [1, 7, 365];
const DEFAULT_EXPIRY_DAYS: i32 = 365;
const TITLE_MAX_CHARS: usize = 100;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(home))
        .route("/snippet/view/:id", get(snippet_view))
        .route(
            "/snippet/create",
            get(snippet_create).post(snippet_create_post),
        )
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SnippetCreateForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub expires: i32,
    #[serde(skip_deserializing)]
    pub validator: Validator,
}

impl Default for SnippetCreateForm {
    fn default() -> Self {
        Self {
            title: String::new(),
            content: String::new(),
            expires: DEFAULT_EXPIRY_DAYS,
            validator: Validator::new(),
        }
    }
}

impl SnippetCreateForm {
    /// Runs every check so the re-rendered form shows all problems at once.
    pub fn validate(&mut self) -> bool {
        let v = &mut self.validator;
        v.check_field(not_blank(&self.title), "title", "This field cannot be blank");
        v.check_field(
            max_chars(&self.title, TITLE_MAX_CHARS),
            "title",
            "This field cannot be more than 100 characters long",
        );
        v.check_field(not_blank(&self.content), "content", "This field cannot be blank");
        v.check_field(
            permitted_value(self.expires, &PERMITTED_EXPIRY_DAYS),
            "expires",
            "This field must equal 1, 7 or 365",
        );
        v.valid()
    }
}

pub async fn home(State(app): State<AppState>, session: Session) -> Result<Response, AppError> {
    let snippets = app.snippets.latest().await?;

    let mut data = app.template_data(&session);
    data.snippets = snippets;

    app.render(StatusCode::OK, "home.tmpl", &data)
}

pub async fn snippet_view(
    State(app): State<AppState>,
    session: Session,
    Path(raw_id): Path<String>,
) -> Result<Response, AppError> {
    let id = match raw_id.parse::<i32>() {
        Ok(id) if id >= 1 => id,
        _ => return Err(AppError::NotFound),
    };

    let snippet = match app.snippets.get(id).await {
        Ok(snippet) => snippet,
        Err(ModelError::NoRecord) => return Err(AppError::NotFound),
        Err(other) => return Err(other.into()),
    };

    let mut data = app.template_data(&session);
    data.snippet = Some(snippet);

    app.render(StatusCode::OK, "view.tmpl", &data)
}

pub async fn snippet_create(
    State(app): State<AppState>,
    session: Session,
) -> Result<Response, AppError> {
    let data = app
        .template_data(&session)
        .with_form(&SnippetCreateForm::default());

    app.render(StatusCode::OK, "create.tmpl", &data)
}

#[tracing::instrument(name = "create_snippet", skip_all)]
pub async fn snippet_create_post(
    State(app): State<AppState>,
    session: Session,
    ValidatedForm(mut form): ValidatedForm<SnippetCreateForm>,
) -> Result<Response, AppError> {
    if !form.validate() {
        tracing::debug!(
            fields = ?form.validator.field_errors().keys().collect::<Vec<_>>(),
            "Snippet form failed validation"
        );
        let data = app.template_data(&session).with_form(&form);
        return app.render(StatusCode::UNPROCESSABLE_ENTITY, "create.tmpl", &data);
    }

    let id = app
        .snippets
        .insert(&form.title, &form.content, form.expires)
        .await?;

    session.put(FLASH_KEY, "Snippet successfully created!");

    Ok(Redirect::to(&format!("/snippet/view/{id}")).into_response())
}
