//! Invite queue repository
//!
//! All status movement happens through conditional UPDATEs keyed on the
//! current status. Dispatch claiming uses a lease: claiming a due invite
//! pushes its `scheduled_for` into the future, so a worker that dies
//! mid-send simply lets the invite fall due again.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use inviteq_common::types::{CampaignId, InviteId, LeadId, SendingAccountId};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::models::{Invite, InviteStatus};

/// A claimed, due invite joined with everything the dispatcher needs to
/// send it without further lookups.
#[derive(Debug, Clone, FromRow)]
pub struct DueInvite {
    pub id: InviteId,
    pub campaign_id: CampaignId,
    pub lead_id: LeadId,
    pub sending_account_id: SendingAccountId,
    pub retry_count: i32,
    /// Day the daily-limit reservation was made for. `scheduled_for`
    /// moves under claim leases and retry backoff; this stays put, so
    /// a release always hits the counter the reserve hit.
    pub reserved_day: NaiveDate,
    pub campaign_status: String,
    pub invite_message: Option<String>,
    pub provider_ref: String,
    pub profile_ref: String,
    pub full_name: String,
}

/// Per-status counts for a campaign's queue
#[derive(Debug, Clone, Default, FromRow, serde::Serialize)]
pub struct InviteStatusCounts {
    pub total: i64,
    pub pending: i64,
    pub scheduled: i64,
    pub sent: i64,
    pub accepted: i64,
    pub expired: i64,
    pub withdrawn: i64,
    pub failed: i64,
}

/// A lead-level row of the campaign report
#[derive(Debug, Clone, FromRow, serde::Serialize)]
pub struct CampaignReportRow {
    pub lead_id: LeadId,
    pub full_name: String,
    pub profile_ref: String,
    pub company: Option<String>,
    pub pipeline_status: String,
    pub responsible_user: Option<String>,
    pub invite_status: Option<String>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub retry_count: Option<i32>,
    pub last_error: Option<String>,
}

/// Sortable columns of the campaign report. Sorting goes through this
/// enum so user input never reaches the ORDER BY clause directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportSortKey {
    #[default]
    CreatedAt,
    FullName,
    Company,
    InviteStatus,
    PipelineStatus,
    SentAt,
}

impl ReportSortKey {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created_at" => Some(ReportSortKey::CreatedAt),
            "full_name" => Some(ReportSortKey::FullName),
            "company" => Some(ReportSortKey::Company),
            "invite_status" => Some(ReportSortKey::InviteStatus),
            "pipeline_status" => Some(ReportSortKey::PipelineStatus),
            "sent_at" => Some(ReportSortKey::SentAt),
            _ => None,
        }
    }

    fn as_sql(self, order: SortOrder) -> String {
        let dir = order.as_sql();
        match self {
            ReportSortKey::CreatedAt => format!("l.created_at {}", dir),
            ReportSortKey::FullName => format!("l.full_name {}", dir),
            ReportSortKey::Company => {
                format!("l.company {} NULLS LAST, l.full_name ASC", dir)
            }
            ReportSortKey::InviteStatus => {
                format!("i.status {} NULLS LAST, l.created_at ASC", dir)
            }
            ReportSortKey::PipelineStatus => {
                format!("l.pipeline_status {}, l.created_at ASC", dir)
            }
            ReportSortKey::SentAt => format!("i.sent_at {} NULLS LAST", dir),
        }
    }
}

/// Report sort direction, same whitelist treatment as the key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "asc" => Some(SortOrder::Asc),
            "desc" => Some(SortOrder::Desc),
            _ => None,
        }
    }

    fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Invite repository
#[derive(Clone)]
pub struct InviteRepository {
    pool: PgPool,
}

impl InviteRepository {
    /// Create a new invite repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get an invite by ID
    pub async fn get(&self, id: InviteId) -> Result<Option<Invite>, sqlx::Error> {
        sqlx::query_as::<_, Invite>("SELECT * FROM invites WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Create one pending invite per campaign lead that has none yet.
    /// Safe to call repeatedly; the unique (campaign_id, lead_id) pair
    /// makes it idempotent. Returns how many were created.
    pub async fn enqueue_campaign_leads(
        &self,
        campaign_id: CampaignId,
        sending_account_id: SendingAccountId,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO invites (id, campaign_id, lead_id, sending_account_id)
            SELECT gen_random_uuid(), l.campaign_id, l.id, $2
            FROM leads l
            WHERE l.campaign_id = $1
              AND l.pipeline_status = 'leads'
            ON CONFLICT (campaign_id, lead_id) DO NOTHING
            "#,
        )
        .bind(campaign_id)
        .bind(sending_account_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Oldest pending invites for a campaign, FIFO by creation time
    pub async fn list_pending(
        &self,
        campaign_id: CampaignId,
        limit: i64,
    ) -> Result<Vec<Invite>, sqlx::Error> {
        sqlx::query_as::<_, Invite>(
            r#"
            SELECT * FROM invites
            WHERE campaign_id = $1 AND status = 'pending'
            ORDER BY created_at ASC
            LIMIT $2
            "#,
        )
        .bind(campaign_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    /// The latest scheduled slot on a sending account, across campaigns.
    /// New slots are spaced after this one.
    pub async fn last_slot_for_account(
        &self,
        sending_account_id: SendingAccountId,
    ) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
        let row: (Option<DateTime<Utc>>,) = sqlx::query_as(
            r#"
            SELECT MAX(scheduled_for) FROM invites
            WHERE sending_account_id = $1 AND status = 'scheduled'
            "#,
        )
        .bind(sending_account_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }

    /// pending -> scheduled with a concrete slot, recording the day the
    /// slot's reservation was made for. Returns false if the invite left
    /// `pending` in the meantime.
    pub async fn schedule(
        &self,
        id: InviteId,
        scheduled_for: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE invites
            SET status = 'scheduled', scheduled_for = $2, reserved_day = $3,
                updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(scheduled_for)
        .bind(scheduled_for.date_naive())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Claim a batch of due invites for dispatch.
    ///
    /// Rows are locked with SKIP LOCKED so concurrent dispatchers divide
    /// the work, and each claimed invite's `scheduled_for` is pushed
    /// `lease` into the future inside the same statement. The invite
    /// stays `scheduled`; only a successful send (or terminal outcome)
    /// moves it on. Campaigns not active anymore still come back here so
    /// the caller can release them instead of sending.
    pub async fn claim_due(
        &self,
        limit: i64,
        lease: Duration,
    ) -> Result<Vec<DueInvite>, sqlx::Error> {
        sqlx::query_as::<_, DueInvite>(
            r#"
            WITH due AS (
                SELECT i.id
                FROM invites i
                WHERE i.status = 'scheduled'
                  AND i.scheduled_for <= NOW()
                ORDER BY i.scheduled_for ASC
                LIMIT $1
                FOR UPDATE OF i SKIP LOCKED
            ),
            claimed AS (
                UPDATE invites i
                SET scheduled_for = NOW() + make_interval(secs => $2),
                    updated_at = NOW()
                FROM due
                WHERE i.id = due.id
                RETURNING i.id, i.campaign_id, i.lead_id, i.sending_account_id,
                          i.retry_count, i.reserved_day
            )
            SELECT cl.id, cl.campaign_id, cl.lead_id, cl.sending_account_id,
                   cl.retry_count, cl.reserved_day,
                   c.status AS campaign_status, c.invite_message,
                   sa.provider_ref, l.profile_ref, l.full_name
            FROM claimed cl
            JOIN campaigns c ON c.id = cl.campaign_id
            JOIN sending_accounts sa ON sa.id = cl.sending_account_id
            JOIN leads l ON l.id = cl.lead_id
            "#,
        )
        .bind(limit)
        .bind(lease.num_seconds() as f64)
        .fetch_all(&self.pool)
        .await
    }

    /// scheduled -> sent
    pub async fn mark_sent(&self, id: InviteId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE invites
            SET status = 'sent', sent_at = NOW(), scheduled_for = NULL,
                last_error = NULL, updated_at = NOW()
            WHERE id = $1 AND status = 'scheduled'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Keep a transiently failed invite in `scheduled` with a pushed-back
    /// slot and a bumped retry counter
    pub async fn reschedule_retry(
        &self,
        id: InviteId,
        next_attempt: DateTime<Utc>,
        error: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE invites
            SET scheduled_for = $2, retry_count = retry_count + 1,
                last_error = $3, updated_at = NOW()
            WHERE id = $1 AND status = 'scheduled'
            "#,
        )
        .bind(id)
        .bind(next_attempt)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// scheduled -> failed, recording the final error
    pub async fn mark_failed(&self, id: InviteId, error: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE invites
            SET status = 'failed', scheduled_for = NULL, reserved_day = NULL,
                last_error = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'scheduled'
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// sent -> accepted for the invite of (campaign, lead). Returns the
    /// invite if the transition happened; `None` means there was no sent
    /// invite to accept (already accepted, expired, or never sent).
    pub async fn mark_accepted(
        &self,
        campaign_id: CampaignId,
        lead_id: LeadId,
        accepted_at: DateTime<Utc>,
    ) -> Result<Option<Invite>, sqlx::Error> {
        sqlx::query_as::<_, Invite>(
            r#"
            UPDATE invites
            SET status = 'accepted', accepted_at = $3, updated_at = NOW()
            WHERE campaign_id = $1 AND lead_id = $2 AND status = 'sent'
            RETURNING *
            "#,
        )
        .bind(campaign_id)
        .bind(lead_id)
        .bind(accepted_at)
        .fetch_optional(&self.pool)
        .await
    }

    /// Expire sent invites older than the cutoff. Returns the affected
    /// rows so the caller can move the leads and re-check campaigns.
    pub async fn expire_sent_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ExpiredInvite>, sqlx::Error> {
        sqlx::query_as::<_, ExpiredInvite>(
            r#"
            UPDATE invites
            SET status = 'expired', updated_at = NOW()
            WHERE status = 'sent' AND sent_at <= $1
            RETURNING id, lead_id, campaign_id
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
    }

    /// Withdraw a single scheduled invite. Used by the dispatcher when
    /// it claims an invite whose campaign turned out to be canceled.
    pub async fn withdraw_one(&self, id: InviteId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE invites
            SET status = 'withdrawn', scheduled_for = NULL, reserved_day = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status = 'scheduled'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Withdraw every live invite of a campaign in one statement.
    ///
    /// The self-join captures each row's status and reserved day before
    /// the update so the caller can release daily-limit reservations for
    /// the invites that were still `scheduled`.
    pub async fn withdraw_campaign(
        &self,
        campaign_id: CampaignId,
    ) -> Result<Vec<WithdrawnInvite>, sqlx::Error> {
        sqlx::query_as::<_, WithdrawnInvite>(
            r#"
            UPDATE invites i
            SET status = 'withdrawn', scheduled_for = NULL, reserved_day = NULL,
                updated_at = NOW()
            FROM invites o
            WHERE o.id = i.id
              AND i.campaign_id = $1
              AND i.status IN ('pending', 'scheduled', 'sent')
            RETURNING i.id, i.lead_id, i.sending_account_id,
                      o.status AS prior_status, o.reserved_day AS prior_day
            "#,
        )
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Clear slots of a paused campaign's scheduled invites, putting them
    /// back to `pending` so a later resume re-plans them from "now".
    /// Returns the released (account, reserved day) pairs.
    pub async fn unschedule_campaign(
        &self,
        campaign_id: CampaignId,
    ) -> Result<Vec<(SendingAccountId, NaiveDate)>, sqlx::Error> {
        let rows: Vec<(Uuid, Option<NaiveDate>)> = sqlx::query_as(
            r#"
            UPDATE invites i
            SET status = 'pending', scheduled_for = NULL, reserved_day = NULL,
                updated_at = NOW()
            FROM invites o
            WHERE o.id = i.id
              AND i.campaign_id = $1
              AND i.status = 'scheduled'
            RETURNING i.sending_account_id, o.reserved_day
            "#,
        )
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(account, day)| day.map(|d| (account, d)))
            .collect())
    }

    /// Per-status queue counts for a campaign, in one scan
    pub async fn status_counts(
        &self,
        campaign_id: CampaignId,
    ) -> Result<InviteStatusCounts, sqlx::Error> {
        sqlx::query_as::<_, InviteStatusCounts>(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                COUNT(*) FILTER (WHERE status = 'scheduled') AS scheduled,
                COUNT(*) FILTER (WHERE status = 'sent') AS sent,
                COUNT(*) FILTER (WHERE status = 'accepted') AS accepted,
                COUNT(*) FILTER (WHERE status = 'expired') AS expired,
                COUNT(*) FILTER (WHERE status = 'withdrawn') AS withdrawn,
                COUNT(*) FILTER (WHERE status = 'failed') AS failed
            FROM invites
            WHERE campaign_id = $1
            "#,
        )
        .bind(campaign_id)
        .fetch_one(&self.pool)
        .await
    }

    /// The next upcoming slots for a campaign, earliest first
    pub async fn next_scheduled(
        &self,
        campaign_id: CampaignId,
        limit: i64,
    ) -> Result<Vec<DateTime<Utc>>, sqlx::Error> {
        let rows: Vec<(DateTime<Utc>,)> = sqlx::query_as(
            r#"
            SELECT scheduled_for FROM invites
            WHERE campaign_id = $1 AND status = 'scheduled'
              AND scheduled_for IS NOT NULL
            ORDER BY scheduled_for ASC
            LIMIT $2
            "#,
        )
        .bind(campaign_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(t,)| t).collect())
    }

    /// Lead-level report rows for a campaign, optionally filtered by
    /// invite status
    pub async fn report_rows(
        &self,
        campaign_id: CampaignId,
        status: Option<InviteStatus>,
        sort: ReportSortKey,
        order: SortOrder,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CampaignReportRow>, sqlx::Error> {
        let query = format!(
            r#"
            SELECT l.id AS lead_id, l.full_name, l.profile_ref, l.company,
                   l.pipeline_status, l.responsible_user,
                   i.status AS invite_status, i.scheduled_for, i.sent_at,
                   i.accepted_at, i.retry_count, i.last_error
            FROM leads l
            LEFT JOIN invites i ON i.lead_id = l.id AND i.campaign_id = l.campaign_id
            WHERE l.campaign_id = $1
              AND ($2::text IS NULL OR i.status = $2)
            ORDER BY {}
            LIMIT $3 OFFSET $4
            "#,
            sort.as_sql(order)
        );

        sqlx::query_as::<_, CampaignReportRow>(&query)
            .bind(campaign_id)
            .bind(status.map(|s| s.to_string()))
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
    }

    /// Total rows the report would return for the same filter
    pub async fn report_count(
        &self,
        campaign_id: CampaignId,
        status: Option<InviteStatus>,
    ) -> Result<i64, sqlx::Error> {
        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM leads l
            LEFT JOIN invites i ON i.lead_id = l.id AND i.campaign_id = l.campaign_id
            WHERE l.campaign_id = $1
              AND ($2::text IS NULL OR i.status = $2)
            "#,
        )
        .bind(campaign_id)
        .bind(status.map(|s| s.to_string()))
        .fetch_one(&self.pool)
        .await?;

        Ok(count.0)
    }
}

/// An invite expired by the sweep
#[derive(Debug, Clone, FromRow)]
pub struct ExpiredInvite {
    pub id: InviteId,
    pub lead_id: LeadId,
    pub campaign_id: CampaignId,
}

/// One invite caught by a campaign withdrawal, with its pre-withdrawal
/// status and reserved day
#[derive(Debug, Clone, FromRow)]
pub struct WithdrawnInvite {
    pub id: InviteId,
    pub lead_id: LeadId,
    pub sending_account_id: SendingAccountId,
    pub prior_status: String,
    pub prior_day: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_report_sort_key_parse() {
        assert_eq!(ReportSortKey::parse("created_at"), Some(ReportSortKey::CreatedAt));
        assert_eq!(ReportSortKey::parse("full_name"), Some(ReportSortKey::FullName));
        assert_eq!(ReportSortKey::parse("sent_at"), Some(ReportSortKey::SentAt));
        assert_eq!(ReportSortKey::parse("invite_status"), Some(ReportSortKey::InviteStatus));
        assert_eq!(ReportSortKey::parse("company"), Some(ReportSortKey::Company));
        assert_eq!(
            ReportSortKey::parse("pipeline_status"),
            Some(ReportSortKey::PipelineStatus)
        );
        // Anything else never reaches the ORDER BY clause.
        assert_eq!(ReportSortKey::parse("id; DROP TABLE leads"), None);
        assert_eq!(ReportSortKey::parse(""), None);
    }

    #[test]
    fn test_sort_order_parse() {
        assert_eq!(SortOrder::parse("asc"), Some(SortOrder::Asc));
        assert_eq!(SortOrder::parse("desc"), Some(SortOrder::Desc));
        assert_eq!(SortOrder::parse("DESC; --"), None);
    }

    #[test]
    fn test_sort_key_sql_carries_direction() {
        assert_eq!(
            ReportSortKey::CreatedAt.as_sql(SortOrder::Desc),
            "l.created_at DESC"
        );
        assert_eq!(
            ReportSortKey::SentAt.as_sql(SortOrder::Asc),
            "i.sent_at ASC NULLS LAST"
        );
    }
}
