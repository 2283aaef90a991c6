//! Sending account and daily usage repository
//!
//! The daily usage counter is the only shared mutable hot spot in the
//! system. Every change goes through a single conditional statement so
//! concurrent schedulers can never push `used` past `cap`.

use chrono::NaiveDate;
use inviteq_common::types::{AccountId, SendingAccountId};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{AccountDailyUsage, CreateSendingAccount, SendingAccount};

/// Sending account repository
#[derive(Clone)]
pub struct SendingAccountRepository {
    pool: PgPool,
}

impl SendingAccountRepository {
    /// Create a new sending account repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Register a sending account
    pub async fn create(
        &self,
        input: CreateSendingAccount,
    ) -> Result<SendingAccount, sqlx::Error> {
        let id = Uuid::new_v4();

        sqlx::query_as::<_, SendingAccount>(
            r#"
            INSERT INTO sending_accounts (id, account_id, label, provider_ref, daily_limit)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(input.account_id)
        .bind(&input.label)
        .bind(&input.provider_ref)
        .bind(input.daily_limit)
        .fetch_one(&self.pool)
        .await
    }

    /// Get a sending account by ID
    pub async fn get(&self, id: SendingAccountId) -> Result<Option<SendingAccount>, sqlx::Error> {
        sqlx::query_as::<_, SendingAccount>("SELECT * FROM sending_accounts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// List sending accounts for an owning account
    pub async fn list_by_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<SendingAccount>, sqlx::Error> {
        sqlx::query_as::<_, SendingAccount>(
            "SELECT * FROM sending_accounts WHERE account_id = $1 ORDER BY created_at ASC",
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Change the daily limit. The new value applies to future days and to
    /// today's remaining headroom; slots already reserved today stay
    /// reserved even if the limit drops below the current usage.
    pub async fn set_daily_limit(
        &self,
        id: SendingAccountId,
        daily_limit: i32,
    ) -> Result<Option<SendingAccount>, sqlx::Error> {
        let account = sqlx::query_as::<_, SendingAccount>(
            r#"
            UPDATE sending_accounts
            SET daily_limit = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(daily_limit)
        .fetch_optional(&self.pool)
        .await?;

        if account.is_some() {
            // Raise today's cap if the limit went up; never shrink below
            // what is already used.
            sqlx::query(
                r#"
                UPDATE account_daily_usage
                SET cap = GREATEST($2, used), updated_at = NOW()
                WHERE account_id = $1 AND day >= CURRENT_DATE
                "#,
            )
            .bind(id)
            .bind(daily_limit)
            .execute(&self.pool)
            .await?;
        }

        Ok(account)
    }

    /// Atomically reserve one send slot for `day`.
    ///
    /// Inserts the day's counter row on first touch (seeded with the
    /// account's current daily limit as the cap) and increments `used`
    /// only while it is below `cap`. Returns false when the day is full
    /// or the account does not exist.
    pub async fn reserve_slot(
        &self,
        id: SendingAccountId,
        day: NaiveDate,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO account_daily_usage (account_id, day, used, cap)
            SELECT id, $2, 1, daily_limit
            FROM sending_accounts
            WHERE id = $1 AND daily_limit >= 1
            ON CONFLICT (account_id, day) DO UPDATE
            SET used = account_daily_usage.used + 1, updated_at = NOW()
            WHERE account_daily_usage.used < account_daily_usage.cap
            "#,
        )
        .bind(id)
        .bind(day)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Give back a reserved slot, floored at zero
    pub async fn release_slot(
        &self,
        id: SendingAccountId,
        day: NaiveDate,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE account_daily_usage
            SET used = GREATEST(used - 1, 0), updated_at = NOW()
            WHERE account_id = $1 AND day = $2
            "#,
        )
        .bind(id)
        .bind(day)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Usage counters for an account over a range of days
    pub async fn usage(
        &self,
        id: SendingAccountId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<AccountDailyUsage>, sqlx::Error> {
        sqlx::query_as::<_, AccountDailyUsage>(
            r#"
            SELECT * FROM account_daily_usage
            WHERE account_id = $1 AND day BETWEEN $2 AND $3
            ORDER BY day ASC
            "#,
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
    }

    /// Drop usage rows older than the retention horizon
    pub async fn prune_usage(&self, keep_days: i64) -> Result<u64, sqlx::Error> {
        // date arithmetic only has an integer operator, not bigint
        let result = sqlx::query(
            "DELETE FROM account_daily_usage WHERE day < CURRENT_DATE - $1::int",
        )
        .bind(keep_days.clamp(0, i32::MAX as i64) as i32)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
