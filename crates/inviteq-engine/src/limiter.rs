//! Account Rate Tracker - per-account daily send budgets
//!
//! A thin layer over the `account_daily_usage` counter table. The
//! counter is the source of truth; this type only shapes the reserve /
//! release calls into tokens so a reservation is always released for
//! the same (account, day) it was made for.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use inviteq_common::types::SendingAccountId;
use inviteq_storage::db::DatabasePool;
use inviteq_storage::repository::SendingAccountRepository;
use tracing::debug;

/// Proof that one send slot was reserved on an account for a day.
/// Dropping the token without releasing it burns the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservationToken {
    pub account_id: SendingAccountId,
    pub day: NaiveDate,
}

/// Tracks daily invite budgets per sending account
#[derive(Clone)]
pub struct AccountRateTracker {
    accounts: SendingAccountRepository,
}

impl AccountRateTracker {
    /// Create a new rate tracker
    pub fn new(db_pool: &DatabasePool) -> Self {
        Self {
            accounts: SendingAccountRepository::new(db_pool.pool().clone()),
        }
    }

    /// Try to reserve one send slot on `account_id` for the day of
    /// `slot`. Returns `None` when that day's budget is exhausted.
    pub async fn reserve(
        &self,
        account_id: SendingAccountId,
        slot: DateTime<Utc>,
    ) -> Result<Option<ReservationToken>> {
        let day = slot.date_naive();

        if self.accounts.reserve_slot(account_id, day).await? {
            Ok(Some(ReservationToken { account_id, day }))
        } else {
            debug!("Daily budget exhausted for account {} on {}", account_id, day);
            Ok(None)
        }
    }

    /// Release a reservation that will not be used (withdrawal, failure
    /// before sending, lost schedule race)
    pub async fn release(&self, token: ReservationToken) -> Result<()> {
        self.accounts.release_slot(token.account_id, token.day).await?;
        Ok(())
    }

    /// Release a slot identified by account and the day it was reserved
    /// for
    pub async fn release_on(
        &self,
        account_id: SendingAccountId,
        day: NaiveDate,
    ) -> Result<()> {
        self.release(ReservationToken { account_id, day }).await
    }

    /// Drop counter rows older than the retention horizon
    pub async fn prune(&self, keep_days: i64) -> Result<u64> {
        let pruned = self.accounts.prune_usage(keep_days).await?;
        if pruned > 0 {
            debug!("Pruned {} old daily usage rows", pruned);
        }
        Ok(pruned)
    }
}
