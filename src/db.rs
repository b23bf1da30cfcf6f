use std::time::Duration;

use diesel_async::AsyncPgConnection;
use diesel_async::pooled_connection::bb8::{Pool, PooledConnection, RunError};
use diesel_async::pooled_connection::{AsyncDieselConnectionManager, PoolError};

use crate::models::ModelError;

pub type PgPool = Pool<AsyncPgConnection>;

const MAX_POOL_SIZE: u32 = 16;
const MIN_IDLE: u32 = 2;
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens the pool and eagerly connects `MIN_IDLE` connections so an
/// unreachable store fails startup instead of the first request.
#[tracing::instrument(name = "database_pool_setup", skip(dsn))]
pub async fn establish_pool(dsn: &str) -> Result<PgPool, PoolError> {
    tracing::debug!("Initializing database connection pool");

    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(dsn);

    let pool = Pool::builder()
        .max_size(MAX_POOL_SIZE)
        .min_idle(Some(MIN_IDLE))
        .connection_timeout(CONNECTION_TIMEOUT)
        .idle_timeout(Some(Duration::from_secs(600)))
        .max_lifetime(Some(Duration::from_secs(3600)))
        .build(manager)
        .await?;

    tracing::info!(
        max_size = MAX_POOL_SIZE,
        min_idle = MIN_IDLE,
        connection_timeout_secs = CONNECTION_TIMEOUT.as_secs(),
        "Database connection pool established"
    );

    Ok(pool)
}

pub async fn connection(pool: &PgPool) -> Result<PooledConnection<'_, AsyncPgConnection>, ModelError> {
    pool.get()
        .await
        .map_err(|err: RunError| ModelError::Pool(err.to_string()))
}
