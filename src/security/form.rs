use async_trait::async_trait;
use axum::{
    body::to_bytes,
    extract::{FromRequest, Request},
    http::{HeaderMap, header::CONTENT_TYPE},
};
use serde::de::DeserializeOwned;

use crate::errors::AppError;

pub const MAX_BODY_SIZE_BYTES: usize = 64 * 1024; // 64 KiB upper bound for request bodies

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// URL-encoded form body, deserialized with the offending field named in
/// the error.
#[derive(Debug)]
pub struct ValidatedForm<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedForm<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, _state: &S) -> Result<Self, Self::Rejection> {
        validate_content_type(req.headers())?;

        let body_bytes = to_bytes(req.into_body(), MAX_BODY_SIZE_BYTES)
            .await
            .map_err(|err| AppError::InvalidForm(format!("failed to read request body: {err}")))?;

        parse_form(&body_bytes).map(ValidatedForm)
    }
}

pub(crate) fn parse_form<T: DeserializeOwned>(body: &[u8]) -> Result<T, AppError> {
    let deserializer = serde_urlencoded::Deserializer::new(form_urlencoded::parse(body));

    serde_path_to_error::deserialize(deserializer).map_err(|err| {
        let path = err.path().to_string();
        let error = err.into_inner();
        if path.is_empty() || path == "." {
            AppError::InvalidForm(error.to_string())
        } else {
            AppError::InvalidForm(format!("{path}: {error}"))
        }
    })
}

fn validate_content_type(headers: &HeaderMap) -> Result<(), AppError> {
    if let Some(value) = headers.get(CONTENT_TYPE)
        && let Ok(value) = value.to_str()
        && let Some(essence) = value.split(';').next()
        && essence.trim().eq_ignore_ascii_case(FORM_CONTENT_TYPE)
    {
        return Ok(());
    }

    Err(AppError::UnsupportedMediaType)
}
