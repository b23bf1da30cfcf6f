use std::any::Any;
use std::backtrace::Backtrace;
use std::error::Error as StdError;

use axum::{
    http::{
        HeaderValue, StatusCode,
        header::{CONNECTION, CONTENT_TYPE, InvalidHeaderValue},
    },
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::models::ModelError;
use crate::templates::TemplateError;

/// Errors a handler can bail out with.
///
/// Domain outcomes a handler can recover from (`NoRecord`, `DuplicateEmail`,
/// `InvalidCredentials`) are matched in the handlers themselves; whatever
/// reaches this type is rendered as a bare status page.
#[derive(Debug, Error)]
pub enum AppError {
    // Client errors
    #[error("resource not found")]
    NotFound,

    #[error("invalid form submission: {0}")]
    InvalidForm(String),

    #[error("unsupported media type: expected application/x-www-form-urlencoded")]
    UnsupportedMediaType,

    // Server errors
    #[error("model error")]
    Model(#[from] ModelError),

    #[error("template error")]
    Template(#[from] TemplateError),

    #[error("session handle missing from request extensions")]
    MissingSession,

    #[error("session cookie could not be encoded")]
    SessionCookie(#[from] InvalidHeaderValue),

    #[error("handler panicked: {0}")]
    Panic(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::InvalidForm(_) => StatusCode::BAD_REQUEST,
            AppError::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,

            // A lookup that escaped the handler unmatched is still a 404.
            AppError::Model(ModelError::NoRecord) => StatusCode::NOT_FOUND,
            AppError::Model(_)
            | AppError::Template(_)
            | AppError::MissingSession
            | AppError::SessionCookie(_)
            | AppError::Panic(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Callers only ever see the canonical reason phrase.
    fn user_message(&self) -> &'static str {
        self.status_code()
            .canonical_reason()
            .unwrap_or("Internal Server Error")
    }

    fn log_error(&self) {
        match self.status_code() {
            code if code.is_client_error() => {
                tracing::debug!(error = %self, status_code = %code, "Client error");
            }
            code if code.is_server_error() => {
                tracing::error!(
                    error = %self,
                    status_code = %code,
                    source = %error_chain(self),
                    backtrace = %Backtrace::capture(),
                    "Server error"
                );
            }
            _ => {}
        }
    }
}

fn error_chain(error: &dyn StdError) -> String {
    let mut chain = Vec::new();
    let mut source = error.source();
    while let Some(err) = source {
        chain.push(err.to_string());
        source = err.source();
    }
    chain.join(": ")
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.log_error();

        let mut response = (self.status_code(), self.user_message()).into_response();
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );

        if matches!(self, AppError::Panic(_)) {
            response
                .headers_mut()
                .insert(CONNECTION, HeaderValue::from_static("close"));
        }

        response
    }
}

/// Converts a caught handler panic into a generic 500.
pub fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(message) = err.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = err.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    };

    AppError::Panic(message).into_response()
}
