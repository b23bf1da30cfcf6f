//! In-memory stores and request helpers for driving the router in tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, Response, header},
};
use chrono::{DateTime, Duration, Utc};
use http_body_util::BodyExt;
use tower::ServiceExt;

use crate::models::session::{SessionData, SessionStore};
use crate::models::snippet::{LATEST_LIMIT, Snippet, SnippetStore};
use crate::models::user::UserStore;
use crate::models::{ModelError, ModelResult};
use crate::routes::{build_router, page_routes};
use crate::security::session::{AUTHENTICATED_USER_KEY, SESSION_COOKIE};
use crate::state::AppState;
use crate::templates::{TemplateCache, ui_html_dir};

fn injected_failure() -> ModelError {
    ModelError::Pool("injected failure".to_string())
}

#[derive(Default)]
pub struct MemorySnippets {
    rows: Mutex<Vec<Snippet>>,
    get_calls: AtomicUsize,
    fail_next: AtomicBool,
}

impl MemorySnippets {
    pub fn seed(&self, title: &str, content: &str) -> i32 {
        let mut rows = self.rows.lock().unwrap();
        let id = rows.len() as i32 + 1;
        let created = Utc::now();
        rows.push(Snippet {
            id,
            title: title.to_string(),
            content: content.to_string(),
            created,
            expires: created + Duration::days(7),
        });
        id
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    fn check_failure(&self) -> ModelResult<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            Err(injected_failure())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SnippetStore for MemorySnippets {
    async fn latest(&self) -> ModelResult<Vec<Snippet>> {
        self.check_failure()?;
        let now = Utc::now();
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .rev()
            .filter(|snippet| snippet.expires > now)
            .take(LATEST_LIMIT as usize)
            .cloned()
            .collect())
    }

    async fn get(&self, id: i32) -> ModelResult<Snippet> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        let now = Utc::now();
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|snippet| snippet.id == id && snippet.expires > now)
            .cloned()
            .ok_or(ModelError::NoRecord)
    }

    async fn insert(&self, title: &str, content: &str, expires_in_days: i32) -> ModelResult<i32> {
        self.check_failure()?;
        let mut rows = self.rows.lock().unwrap();
        let id = rows.len() as i32 + 1;
        let created = Utc::now();
        rows.push(Snippet {
            id,
            title: title.to_string(),
            content: content.to_string(),
            created,
            expires: created + Duration::days(i64::from(expires_in_days)),
        });
        Ok(id)
    }
}

struct StoredUser {
    id: i32,
    email: String,
    password: String,
}

#[derive(Default)]
pub struct MemoryUsers {
    rows: Mutex<Vec<StoredUser>>,
    authenticate_calls: AtomicUsize,
    fail_next: AtomicBool,
}

impl MemoryUsers {
    pub fn seed(&self, _name: &str, email: &str, password: &str) -> i32 {
        let mut rows = self.rows.lock().unwrap();
        let id = rows.len() as i32 + 1;
        rows.push(StoredUser {
            id,
            email: email.to_string(),
            password: password.to_string(),
        });
        id
    }

    pub fn exists(&self, email: &str) -> bool {
        self.rows.lock().unwrap().iter().any(|user| user.email == email)
    }

    pub fn authenticate_calls(&self) -> usize {
        self.authenticate_calls.load(Ordering::SeqCst)
    }

    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl UserStore for MemoryUsers {
    async fn insert(&self, name: &str, email: &str, password: &str) -> ModelResult<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(injected_failure());
        }
        if self.exists(email) {
            return Err(ModelError::DuplicateEmail);
        }
        self.seed(name, email, password);
        Ok(())
    }

    async fn authenticate(&self, email: &str, password: &str) -> ModelResult<i32> {
        self.authenticate_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(injected_failure());
        }
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|user| user.email == email && user.password == password)
            .map(|user| user.id)
            .ok_or(ModelError::InvalidCredentials)
    }
}

#[derive(Default)]
pub struct MemorySessions {
    rows: Mutex<HashMap<String, (SessionData, DateTime<Utc>)>>,
}

impl MemorySessions {
    fn token(cookie: &str) -> &str {
        cookie
            .strip_prefix(SESSION_COOKIE)
            .and_then(|rest| rest.strip_prefix('='))
            .unwrap_or(cookie)
    }

    pub fn seed_expired(&self, token: &str) {
        self.rows.lock().unwrap().insert(
            token.to_string(),
            (SessionData::new(), Utc::now() - Duration::hours(1)),
        );
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn contains_cookie(&self, cookie: &str) -> bool {
        self.rows.lock().unwrap().contains_key(Self::token(cookie))
    }

    pub fn user_id(&self, cookie: &str) -> Option<i32> {
        let rows = self.rows.lock().unwrap();
        let (data, _) = rows.get(Self::token(cookie))?;
        data.get(AUTHENTICATED_USER_KEY)?
            .as_i64()
            .map(|id| id as i32)
    }
}

#[async_trait]
impl SessionStore for MemorySessions {
    async fn find(&self, token: &str) -> ModelResult<Option<SessionData>> {
        let now = Utc::now();
        Ok(self
            .rows
            .lock()
            .unwrap()
            .get(token)
            .filter(|(_, expiry)| *expiry > now)
            .map(|(data, _)| data.clone()))
    }

    async fn commit(
        &self,
        token: &str,
        data: &SessionData,
        expiry: DateTime<Utc>,
    ) -> ModelResult<()> {
        let now = Utc::now();
        let mut rows = self.rows.lock().unwrap();
        rows.insert(token.to_string(), (data.clone(), expiry));
        rows.retain(|_, (_, expiry)| *expiry > now);
        Ok(())
    }

    async fn delete(&self, token: &str) -> ModelResult<()> {
        self.rows.lock().unwrap().remove(token);
        Ok(())
    }
}

pub struct TestApp {
    pub snippets: Arc<MemorySnippets>,
    pub users: Arc<MemoryUsers>,
    pub sessions: Arc<MemorySessions>,
    router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_routes(Router::new())
    }

    /// Mounts extra page routes behind the full middleware stack.
    pub fn with_routes(extra: Router<AppState>) -> Self {
        let snippets = Arc::new(MemorySnippets::default());
        let users = Arc::new(MemoryUsers::default());
        let sessions = Arc::new(MemorySessions::default());

        let state = AppState {
            snippets: snippets.clone(),
            users: users.clone(),
            sessions: sessions.clone(),
            templates: Arc::new(TemplateCache::load(&ui_html_dir()).unwrap()),
            static_dir: Path::new(env!("CARGO_MANIFEST_DIR")).join("ui").join("static"),
            secure_cookies: false,
        };

        Self {
            snippets,
            users,
            sessions,
            router: build_router(page_routes().merge(extra), state),
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// The `session=<token>` pair from the response's `Set-Cookie`, if any.
    pub fn session_cookie(response: &Response<Body>) -> Option<String> {
        response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(|value| value.split(';').next())
            .find(|pair| pair.starts_with(&format!("{SESSION_COOKIE}=")))
            .map(str::to_string)
    }
}

pub fn get_request(path: &str) -> Request<Body> {
    Request::builder().uri(path).body(Body::empty()).unwrap()
}

pub fn get_request_with_cookie(path: &str, cookie: &str) -> Request<Body> {
    Request::builder()
        .uri(path)
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap()
}

pub fn form_request(path: &str, body: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}
