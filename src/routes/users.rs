use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::logging::{SanitizedEmail, SecurityEvent};
use crate::models::ModelError;
use crate::security::form::ValidatedForm;
use crate::security::session::{AUTHENTICATED_USER_KEY, FLASH_KEY, Session};
use crate::state::AppState;
use crate::validator::{EMAIL_RX, Validator, matches, max_chars, min_chars, not_blank};

const PASSWORD_MIN_CHARS: usize = 8;
const NAME_MAX_CHARS: usize = 255;
const EMAIL_MAX_CHARS: usize = 255;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/user/signup", get(user_signup).post(user_signup_post))
        .route("/user/login", get(user_login).post(user_login_post))
        .route("/user/logout", post(user_logout_post))
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct UserSignupForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    #[serde(skip_deserializing)]
    pub validator: Validator,
}

impl UserSignupForm {
    pub fn validate(&mut self) -> bool {
        let v = &mut self.validator;
        v.check_field(not_blank(&self.name), "name", "This field cannot be blank");
        v.check_field(
            max_chars(&self.name, NAME_MAX_CHARS),
            "name",
            "This field cannot be more than 255 characters long",
        );
        v.check_field(not_blank(&self.email), "email", "This field cannot be blank");
        v.check_field(
            max_chars(&self.email, EMAIL_MAX_CHARS),
            "email",
            "This field cannot be more than 255 characters long",
        );
        v.check_field(
            matches(&self.email, &EMAIL_RX),
            "email",
            "This field must be a valid email address",
        );
        v.check_field(not_blank(&self.password), "password", "This field cannot be blank");
        v.check_field(
            min_chars(&self.password, PASSWORD_MIN_CHARS),
            "password",
            "This field must be at least 8 characters long",
        );
        v.valid()
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct UserLoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    #[serde(skip_deserializing)]
    pub validator: Validator,
}

impl UserLoginForm {
    pub fn validate(&mut self) -> bool {
        let v = &mut self.validator;
        v.check_field(not_blank(&self.email), "email", "This field cannot be blank");
        v.check_field(
            matches(&self.email, &EMAIL_RX),
            "email",
            "This field must be a valid email address",
        );
        v.check_field(not_blank(&self.password), "password", "This field cannot be blank");
        v.valid()
    }
}

pub async fn user_signup(
    State(app): State<AppState>,
    session: Session,
) -> Result<Response, AppError> {
    let data = app
        .template_data(&session)
        .with_form(&UserSignupForm::default());
    app.render(StatusCode::OK, "signup.tmpl", &data)
}

#[tracing::instrument(name = "signup_user", skip_all, fields(email))]
pub async fn user_signup_post(
    State(app): State<AppState>,
    session: Session,
    ValidatedForm(mut form): ValidatedForm<UserSignupForm>,
) -> Result<Response, AppError> {
    tracing::Span::current().record(
        "email",
        tracing::field::display(SanitizedEmail::new(&form.email)),
    );

    if !form.validate() {
        let data = app.template_data(&session).with_form(&form);
        return app.render(StatusCode::UNPROCESSABLE_ENTITY, "signup.tmpl", &data);
    }

    match app.users.insert(&form.name, &form.email, &form.password).await {
        Ok(()) => {}
        Err(ModelError::DuplicateEmail) => {
            crate::log_security_event!(
                SecurityEvent::SignupFailure,
                email = %SanitizedEmail::new(&form.email),
                reason = "duplicate_email",
                "User signup rejected"
            );
            form.validator
                .add_field_error("email", "email already in use");
            let data = app.template_data(&session).with_form(&form);
            return app.render(StatusCode::UNPROCESSABLE_ENTITY, "signup.tmpl", &data);
        }
        Err(other) => return Err(other.into()),
    }

    crate::log_security_event!(
        SecurityEvent::SignupSuccess,
        email = %SanitizedEmail::new(&form.email),
        "User signed up"
    );

    session.put(FLASH_KEY, "Your signup was successful. Please log in.");

    Ok(Redirect::to("/").into_response())
}

pub async fn user_login(
    State(app): State<AppState>,
    session: Session,
) -> Result<Response, AppError> {
    let data = app
        .template_data(&session)
        .with_form(&UserLoginForm::default());
    app.render(StatusCode::OK, "login.tmpl", &data)
}

#[tracing::instrument(name = "login_user", skip_all, fields(email, user_id))]
pub async fn user_login_post(
    State(app): State<AppState>,
    session: Session,
    ValidatedForm(mut form): ValidatedForm<UserLoginForm>,
) -> Result<Response, AppError> {
    tracing::Span::current().record(
        "email",
        tracing::field::display(SanitizedEmail::new(&form.email)),
    );

    if !form.validate() {
        let data = app.template_data(&session).with_form(&form);
        return app.render(StatusCode::UNPROCESSABLE_ENTITY, "login.tmpl", &data);
    }

    let user_id = match app.users.authenticate(&form.email, &form.password).await {
        Ok(id) => id,
        Err(ModelError::InvalidCredentials) => {
            crate::log_security_event!(
                SecurityEvent::LoginFailure,
                email = %SanitizedEmail::new(&form.email),
                "Login failed"
            );
            form.validator
                .add_non_field_error("Email or password is incorrect");
            let data = app.template_data(&session).with_form(&form);
            return app.render(StatusCode::UNPROCESSABLE_ENTITY, "login.tmpl", &data);
        }
        Err(other) => return Err(other.into()),
    };

    tracing::Span::current().record("user_id", user_id);

    session.renew_token();
    session.put(AUTHENTICATED_USER_KEY, user_id);
    session.put(FLASH_KEY, "You've been logged in successfully!");

    crate::log_security_event!(
        SecurityEvent::LoginSuccess,
        user_id = user_id,
        email = %SanitizedEmail::new(&form.email),
        "User logged in"
    );

    Ok(Redirect::to("/").into_response())
}

pub async fn user_logout_post(session: Session) -> Response {
    let user_id = session.get::<i32>(AUTHENTICATED_USER_KEY);

    session.renew_token();
    session.remove(AUTHENTICATED_USER_KEY);
    session.put(FLASH_KEY, "You've been logged out successfully!");

    crate::log_security_event!(SecurityEvent::Logout, user_id = ?user_id, "User logged out");

    Redirect::to("/user/login").into_response()
}
