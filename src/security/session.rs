use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{
        HeaderValue,
        header::{SET_COOKIE, VARY},
        request::Parts,
    },
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{Duration, Utc};
use rand_core::{OsRng, RngCore};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::AppError;
use crate::models::session::SessionData;
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "session";
pub const SESSION_LIFETIME_HOURS: i64 = 12;

pub const FLASH_KEY: &str = "flash";
pub const AUTHENTICATED_USER_KEY: &str = "authenticatedUserID";

const TOKEN_BYTES: usize = 32;

/// Per-request view of the session, shared between the middleware and the
/// handler through request extensions.
#[derive(Clone, Debug)]
pub struct Session {
    inner: Arc<Mutex<SessionInner>>,
}

#[derive(Debug, Default)]
struct SessionInner {
    token: Option<String>,
    data: SessionData,
    modified: bool,
    stale_token: Option<String>,
}

/// Snapshot of a modified session waiting to be written back.
#[derive(Debug)]
pub(crate) struct PendingCommit {
    pub token: String,
    pub data: SessionData,
    pub stale_token: Option<String>,
}

impl Session {
    fn from_inner(inner: SessionInner) -> Self {
        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    pub fn fresh() -> Self {
        Self::from_inner(SessionInner::default())
    }

    pub fn existing(token: String, data: SessionData) -> Self {
        Self::from_inner(SessionInner {
            token: Some(token),
            data,
            ..SessionInner::default()
        })
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn put(&self, key: &str, value: impl Into<Value>) {
        let mut inner = self.lock();
        inner.data.insert(key.to_string(), value.into());
        inner.modified = true;
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let inner = self.lock();
        let value = inner.data.get(key)?.clone();
        serde_json::from_value(value).ok()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().data.contains_key(key)
    }

    /// Removes and returns a string value; the session only counts as
    /// modified when something was actually removed.
    pub fn pop_string(&self, key: &str) -> Option<String> {
        let mut inner = self.lock();
        let value = inner.data.remove(key)?;
        inner.modified = true;
        match value {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn remove(&self, key: &str) {
        let mut inner = self.lock();
        if inner.data.remove(key).is_some() {
            inner.modified = true;
        }
    }

    /// Issues a new token on commit and drops the row stored under the old
    /// one, keeping the data.
    pub fn renew_token(&self) {
        let mut inner = self.lock();
        let previous = inner.token.take();
        if inner.stale_token.is_none() {
            inner.stale_token = previous;
        }
        inner.modified = true;
    }

    pub(crate) fn pending_commit(&self) -> Option<PendingCommit> {
        let mut inner = self.lock();
        if !inner.modified {
            return None;
        }

        let token = inner.token.get_or_insert_with(generate_token).clone();
        Some(PendingCommit {
            token,
            data: inner.data.clone(),
            stale_token: inner.stale_token.clone(),
        })
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[async_trait]
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or(AppError::MissingSession)
    }
}

/// Loads the session named by the request cookie, runs the handler, then
/// writes the session back if the handler changed it.
pub async fn load_and_save(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let jar = CookieJar::from_headers(request.headers());
    let token = jar
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string());

    let session = match token {
        Some(token) => match state.sessions.find(&token).await? {
            Some(data) => Session::existing(token, data),
            None => {
                tracing::debug!("Session cookie did not match a live session");
                state.sessions.delete(&token).await?;
                Session::fresh()
            }
        },
        None => Session::fresh(),
    };

    request.extensions_mut().insert(session.clone());

    let mut response = next.run(request).await;

    if let Some(pending) = session.pending_commit() {
        let expiry = Utc::now() + Duration::hours(SESSION_LIFETIME_HOURS);
        state
            .sessions
            .commit(&pending.token, &pending.data, expiry)
            .await?;

        if let Some(stale) = &pending.stale_token {
            state.sessions.delete(stale).await?;
            tracing::debug!("Session token rotated");
        }

        let cookie = Cookie::build((SESSION_COOKIE, pending.token))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(state.secure_cookies)
            .build();

        response
            .headers_mut()
            .append(SET_COOKIE, HeaderValue::from_str(&cookie.to_string())?);
    }

    response
        .headers_mut()
        .append(VARY, HeaderValue::from_static("Cookie"));

    Ok(response)
}
