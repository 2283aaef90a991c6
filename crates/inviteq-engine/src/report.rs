//! Report Aggregator - queue status, campaign reports, account usage

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use inviteq_common::types::{CampaignId, Paginated, SendingAccountId};
use inviteq_storage::db::DatabasePool;
use inviteq_storage::models::InviteStatus;
use inviteq_storage::repository::{
    CampaignReportRow, InviteRepository, InviteStatusCounts, LeadRepository, ReportSortKey,
    SendingAccountRepository, SortOrder,
};
use serde::Serialize;

/// How many upcoming slots the queue-status preview shows
const NEXT_SCHEDULED_PREVIEW: i64 = 10;

/// Snapshot of a campaign's invite queue
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    pub counts: InviteStatusCounts,
    pub next_scheduled: Vec<DateTime<Utc>>,
}

/// One day of usage on a sending account
#[derive(Debug, Clone, Serialize)]
pub struct UsageDay {
    pub day: chrono::NaiveDate,
    pub used: i32,
    pub cap: i32,
    pub remaining: i32,
    /// Share of the day's cap already used, 0.0..=1.0
    pub pct: f64,
}

/// Usage summary for a sending account: today's headline numbers plus
/// the trailing per-day bars
#[derive(Debug, Clone, Serialize)]
pub struct AccountUsage {
    pub daily_limit: i32,
    pub sent_today: i32,
    pub remaining: i32,
    /// When today's budget rolls over (next UTC midnight)
    pub resets_at: DateTime<Utc>,
    pub days: Vec<UsageDay>,
}

/// Count of leads in one pipeline stage
#[derive(Debug, Clone, Serialize)]
pub struct PipelineCount {
    pub pipeline_status: String,
    pub count: i64,
}

/// Campaign report: paginated lead rows plus a pipeline histogram
#[derive(Debug, Clone, Serialize)]
pub struct CampaignReport {
    #[serde(flatten)]
    pub rows: Paginated<CampaignReportRow>,
    pub pipeline: Vec<PipelineCount>,
}

/// Report parameters, parsed and validated by the API layer
#[derive(Debug, Clone, Default)]
pub struct ReportQuery {
    pub status: Option<InviteStatus>,
    pub sort: ReportSortKey,
    pub order: SortOrder,
    pub page: i64,
    pub limit: i64,
}

/// Report Aggregator
#[derive(Clone)]
pub struct ReportAggregator {
    invite_repo: InviteRepository,
    lead_repo: LeadRepository,
    account_repo: SendingAccountRepository,
}

impl ReportAggregator {
    /// Create a new report aggregator
    pub fn new(db_pool: &DatabasePool) -> Self {
        let pool = db_pool.pool().clone();
        Self {
            invite_repo: InviteRepository::new(pool.clone()),
            lead_repo: LeadRepository::new(pool.clone()),
            account_repo: SendingAccountRepository::new(pool),
        }
    }

    /// Per-status counts plus a preview of the next upcoming slots
    pub async fn queue_status(&self, campaign_id: CampaignId) -> Result<QueueStatus> {
        let counts = self.invite_repo.status_counts(campaign_id).await?;
        let next_scheduled = self
            .invite_repo
            .next_scheduled(campaign_id, NEXT_SCHEDULED_PREVIEW)
            .await?;

        Ok(QueueStatus {
            counts,
            next_scheduled,
        })
    }

    /// Paginated lead-level campaign report with a pipeline histogram
    pub async fn campaign_report(
        &self,
        campaign_id: CampaignId,
        query: ReportQuery,
    ) -> Result<CampaignReport> {
        let page = query.page.max(1);
        let limit = query.limit.clamp(1, 200);
        let offset = (page - 1) * limit;

        let rows = self
            .invite_repo
            .report_rows(campaign_id, query.status, query.sort, query.order, limit, offset)
            .await?;
        let total = self
            .invite_repo
            .report_count(campaign_id, query.status)
            .await?;
        let pipeline = self
            .lead_repo
            .pipeline_counts(campaign_id)
            .await?
            .into_iter()
            .map(|(pipeline_status, count)| PipelineCount {
                pipeline_status,
                count,
            })
            .collect();

        Ok(CampaignReport {
            rows: Paginated {
                data: rows,
                page,
                limit,
                total,
            },
            pipeline,
        })
    }

    /// Usage for a sending account over the trailing `days`, today
    /// included. Returns None for an unknown account.
    pub async fn account_usage(
        &self,
        account_id: SendingAccountId,
        days: i64,
    ) -> Result<Option<AccountUsage>> {
        let account = match self.account_repo.get(account_id).await? {
            Some(account) => account,
            None => return Ok(None),
        };

        let today = Utc::now().date_naive();
        let from = today - Duration::days(days.max(1) - 1);

        let rows = self.account_repo.usage(account_id, from, today).await?;

        // No usage row yet today means nothing was reserved today.
        let sent_today = rows
            .iter()
            .find(|row| row.day == today)
            .map(|row| row.used)
            .unwrap_or(0);

        let days = rows
            .into_iter()
            .map(|row| UsageDay {
                day: row.day,
                used: row.used,
                cap: row.cap,
                remaining: (row.cap - row.used).max(0),
                pct: if row.cap > 0 {
                    (row.used as f64 / row.cap as f64).min(1.0)
                } else {
                    1.0
                },
            })
            .collect();

        let resets_at = (today + Duration::days(1))
            .and_hms_opt(0, 0, 0)
            .unwrap_or_default()
            .and_utc();

        Ok(Some(AccountUsage {
            daily_limit: account.daily_limit,
            sent_today,
            remaining: (account.daily_limit - sent_today).max(0),
            resets_at,
            days,
        }))
    }
}
