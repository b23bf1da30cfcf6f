use std::sync::LazyLock;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_async::RunQueryDsl;
use rand_core::OsRng;

use crate::db::{PgPool, connection};
use crate::schema::users;

use super::{ModelError, ModelResult};

/// Verified against when the email is unknown, keeping both failure paths
/// on the same hashing cost.
static DUMMY_HASH: LazyLock<String> = LazyLock::new(|| {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(b"snippetbox-dummy-password", &salt)
        .map(|hash| hash.to_string())
        .unwrap_or_default()
});

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
struct NewUser<'a> {
    name: &'a str,
    email: &'a str,
    hashed_password: &'a str,
    created: chrono::DateTime<Utc>,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with [`ModelError::DuplicateEmail`] when the email is taken.
    async fn insert(&self, name: &str, email: &str, password: &str) -> ModelResult<()>;

    /// Returns the user id, or [`ModelError::InvalidCredentials`] whether the
    /// email is unknown or the password is wrong.
    async fn authenticate(&self, email: &str, password: &str) -> ModelResult<i32>;
}

pub struct UserModel {
    pool: PgPool,
}

impl UserModel {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for UserModel {
    #[tracing::instrument(name = "insert_user", skip_all)]
    async fn insert(&self, name: &str, email: &str, password: &str) -> ModelResult<()> {
        let hashed_password = hash_password(password.to_owned()).await?;

        let new_user = NewUser {
            name,
            email,
            hashed_password: &hashed_password,
            created: Utc::now(),
        };

        let mut conn = connection(&self.pool).await?;

        diesel::insert_into(users::table)
            .values(&new_user)
            .execute(&mut conn)
            .await
            .map_err(map_insert_error)?;

        Ok(())
    }

    #[tracing::instrument(name = "authenticate_user", skip_all)]
    async fn authenticate(&self, email: &str, password: &str) -> ModelResult<i32> {
        let mut conn = connection(&self.pool).await?;

        let row: Option<(i32, String)> = users::table
            .filter(users::email.eq(email))
            .select((users::id, users::hashed_password))
            .first(&mut conn)
            .await
            .optional()?;

        let Some((id, hashed_password)) = row else {
            verify_against_dummy(password.to_owned()).await?;
            return Err(ModelError::InvalidCredentials);
        };

        if verify_password(password.to_owned(), hashed_password).await? {
            Ok(id)
        } else {
            Err(ModelError::InvalidCredentials)
        }
    }
}

fn map_insert_error(error: DieselError) -> ModelError {
    match error {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, ref info)
            if info
                .constraint_name()
                .is_some_and(|name| name.contains("email")) =>
        {
            ModelError::DuplicateEmail
        }
        other => ModelError::from(other),
    }
}

async fn hash_password(password: String) -> ModelResult<String> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| ModelError::PasswordHashing(err.to_string()))
    })
    .await
    .map_err(|err| ModelError::PasswordHashing(err.to_string()))?
}

/// An unparsable stored hash counts as a mismatch.
async fn verify_password(password: String, hashed_password: String) -> ModelResult<bool> {
    tokio::task::spawn_blocking(move || {
        let Ok(parsed) = PasswordHash::new(&hashed_password) else {
            tracing::error!("Stored password hash could not be parsed");
            return false;
        };

        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    })
    .await
    .map_err(|err| ModelError::PasswordHashing(err.to_string()))
}

async fn verify_against_dummy(password: String) -> ModelResult<()> {
    tokio::task::spawn_blocking(move || {
        if let Ok(parsed) = PasswordHash::new(&DUMMY_HASH) {
            let _ = Argon2::default().verify_password(password.as_bytes(), &parsed);
        }
    })
    .await
    .map_err(|err| ModelError::PasswordHashing(err.to_string()))
}
