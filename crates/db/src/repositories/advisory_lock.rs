//! Session-level Postgres advisory locks.
//!
//! The evaluator takes one lock per `(pass kind, tenant)` so overlapping
//! passes for the same tenant are skipped rather than run twice, across any
//! number of worker processes. The lock lives on a dedicated pooled
//! connection; if the guard is dropped without [`AdvisoryLock::release`] the
//! connection is closed instead of returned, which releases the lock.

use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};

/// A held advisory lock.
pub struct AdvisoryLock {
    conn: PoolConnection<Postgres>,
    key: String,
    released: bool,
}

impl AdvisoryLock {
    /// Try to take the lock for `key` without waiting.
    ///
    /// Returns `None` if another session holds it.
    pub async fn try_acquire(pool: &PgPool, key: &str) -> Result<Option<Self>, sqlx::Error> {
        let mut conn = pool.acquire().await?;
        let acquired: bool =
            sqlx::query_scalar("SELECT pg_try_advisory_lock(hashtextextended($1, 0))")
                .bind(key)
                .fetch_one(&mut *conn)
                .await?;
        if !acquired {
            return Ok(None);
        }
        Ok(Some(Self {
            conn,
            key: key.to_string(),
            released: false,
        }))
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Release the lock and return the connection to the pool.
    pub async fn release(mut self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT pg_advisory_unlock(hashtextextended($1, 0))")
            .bind(&self.key)
            .execute(&mut *self.conn)
            .await?;
        self.released = true;
        Ok(())
    }
}

impl Drop for AdvisoryLock {
    fn drop(&mut self) {
        if !self.released {
            tracing::warn!(key = %self.key, "Advisory lock dropped while held, closing connection");
            self.conn.close_on_drop();
        }
    }
}
