use anyhow::Context;
use chrono::{Datelike, NaiveDate};
use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

// Advisory locks belong to the Postgres session, so the guard keeps the connection that took
// the lock until it is released.
const BATCH_CLASS: i32 = 0x434C_5242; // "CLRB"
const CLIENT_REPORT_CLASS: i32 = 0x434C_5243; // "CLRC"

/// What a report lock protects for one report date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockScope {
    /// The nightly batch over all active clients.
    DailyBatch,
    /// One client's report, shared by the worker and the API.
    ClientReport(Uuid),
}

impl LockScope {
    /// `(class, object)` pair for the two-key form of `pg_try_advisory_lock`.
    fn keys(self, report_date: NaiveDate) -> (i32, i32) {
        let day = report_date.num_days_from_ce();
        match self {
            Self::DailyBatch => (BATCH_CLASS, day),
            Self::ClientReport(client_id) => {
                let (hi, lo) = client_id.as_u64_pair();
                let folded = hi ^ lo;
                let client = (folded as u32 ^ (folded >> 32) as u32) as i32;
                (CLIENT_REPORT_CLASS, client ^ day)
            }
        }
    }
}

/// Held advisory lock. Dropping it without `release` closes the session, which frees the lock.
pub struct ReportLock {
    conn: Option<PoolConnection<Postgres>>,
    scope: LockScope,
    report_date: NaiveDate,
}

/// `None` when someone else holds the lock.
pub async fn try_acquire(
    pool: &PgPool,
    scope: LockScope,
    report_date: NaiveDate,
) -> anyhow::Result<Option<ReportLock>> {
    let (class, object) = scope.keys(report_date);
    let mut conn = pool
        .acquire()
        .await
        .context("failed to get a connection for the advisory lock")?;
    let acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1, $2)")
        .persistent(false)
        .bind(class)
        .bind(object)
        .fetch_one(&mut *conn)
        .await
        .with_context(|| format!("failed to acquire advisory lock ({scope:?}, {report_date})"))?;

    Ok(acquired.0.then(|| ReportLock {
        conn: Some(conn),
        scope,
        report_date,
    }))
}

impl ReportLock {
    pub async fn release(mut self) -> anyhow::Result<()> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };
        let (class, object) = self.scope.keys(self.report_date);
        let released: (bool,) = sqlx::query_as("SELECT pg_advisory_unlock($1, $2)")
            .persistent(false)
            .bind(class)
            .bind(object)
            .fetch_one(&mut *conn)
            .await
            .with_context(|| {
                format!(
                    "failed to release advisory lock ({:?}, {})",
                    self.scope, self.report_date
                )
            })?;
        anyhow::ensure!(
            released.0,
            "advisory lock ({:?}, {}) was not held by this session",
            self.scope,
            self.report_date
        );
        Ok(())
    }
}

impl Drop for ReportLock {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            tracing::warn!(scope = ?self.scope, report_date = %self.report_date, "report lock dropped without release; closing its session");
            drop(conn.detach());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_keys_differ_per_date() {
        let a = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let b = a.succ_opt().unwrap();
        assert_ne!(LockScope::DailyBatch.keys(a), LockScope::DailyBatch.keys(b));
        assert_eq!(LockScope::DailyBatch.keys(a), LockScope::DailyBatch.keys(a));
    }

    #[test]
    fn client_keys_are_scoped_apart_from_the_batch() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let a = Uuid::parse_str("00000000-0000-0000-0000-000000000001").unwrap();
        let b = Uuid::parse_str("7f3c2a1e-9b4d-4c6e-8a2f-1d0e5b6c7a89").unwrap();

        let batch = LockScope::DailyBatch.keys(date);
        let client_a = LockScope::ClientReport(a).keys(date);
        let client_b = LockScope::ClientReport(b).keys(date);

        assert_ne!(batch.0, client_a.0);
        assert_ne!(client_a, client_b);
        assert_ne!(client_a, LockScope::ClientReport(a).keys(date.succ_opt().unwrap()));
        assert_eq!(client_a, LockScope::ClientReport(a).keys(date));
    }
}
