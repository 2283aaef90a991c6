//! Campaign repository

use inviteq_common::types::{AccountId, CampaignId};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Campaign, CampaignStatus, CreateCampaign};

/// Campaign repository
#[derive(Clone)]
pub struct CampaignRepository {
    pool: PgPool,
}

impl CampaignRepository {
    /// Create a new campaign repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new campaign in `draft`
    pub async fn create(&self, input: CreateCampaign) -> Result<Campaign, sqlx::Error> {
        let id = Uuid::new_v4();

        sqlx::query_as::<_, Campaign>(
            r#"
            INSERT INTO campaigns (id, account_id, sending_account_id, name, invite_message)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(input.account_id)
        .bind(input.sending_account_id)
        .bind(&input.name)
        .bind(&input.invite_message)
        .fetch_one(&self.pool)
        .await
    }

    /// Get a campaign by ID
    pub async fn get(&self, id: CampaignId) -> Result<Option<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Get a campaign by ID and owning account
    pub async fn get_by_account(
        &self,
        account_id: AccountId,
        id: CampaignId,
    ) -> Result<Option<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>(
            "SELECT * FROM campaigns WHERE id = $1 AND account_id = $2",
        )
        .bind(id)
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// List campaigns for an account
    pub async fn list_by_account(
        &self,
        account_id: AccountId,
        status: Option<CampaignStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Campaign>, sqlx::Error> {
        if let Some(status) = status {
            sqlx::query_as::<_, Campaign>(
                r#"
                SELECT * FROM campaigns
                WHERE account_id = $1 AND status = $2
                ORDER BY created_at DESC
                LIMIT $3 OFFSET $4
                "#,
            )
            .bind(account_id)
            .bind(status.to_string())
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, Campaign>(
                r#"
                SELECT * FROM campaigns
                WHERE account_id = $1
                ORDER BY created_at DESC
                LIMIT $2 OFFSET $3
                "#,
            )
            .bind(account_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
        }
    }

    /// Count campaigns for an account
    pub async fn count_by_account(
        &self,
        account_id: AccountId,
        status: Option<CampaignStatus>,
    ) -> Result<i64, sqlx::Error> {
        let count: (i64,) = if let Some(status) = status {
            sqlx::query_as(
                "SELECT COUNT(*) FROM campaigns WHERE account_id = $1 AND status = $2",
            )
            .bind(account_id)
            .bind(status.to_string())
            .fetch_one(&self.pool)
            .await?
        } else {
            sqlx::query_as("SELECT COUNT(*) FROM campaigns WHERE account_id = $1")
                .bind(account_id)
                .fetch_one(&self.pool)
                .await?
        };
        Ok(count.0)
    }

    /// Move a campaign from one status to another, compare-and-set on the
    /// current status. Returns the updated row, or `None` if the campaign
    /// was not in `from` anymore (lost race or repeated request).
    pub async fn transition(
        &self,
        id: CampaignId,
        from: CampaignStatus,
        to: CampaignStatus,
    ) -> Result<Option<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>(
            r#"
            UPDATE campaigns
            SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(from.to_string())
        .bind(to.to_string())
        .fetch_optional(&self.pool)
        .await
    }

    /// Campaigns whose invites the scheduler should be planning
    pub async fn list_active(&self) -> Result<Vec<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>(
            "SELECT * FROM campaigns WHERE status = 'active' ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await
    }

    /// Mark an active campaign completed if no non-terminal invites remain.
    /// Returns true when the transition happened in this call.
    pub async fn complete_if_drained(&self, id: CampaignId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE campaigns
            SET status = 'completed', updated_at = NOW()
            WHERE id = $1
              AND status = 'active'
              AND NOT EXISTS (
                  SELECT 1 FROM invites
                  WHERE campaign_id = $1
                    AND status IN ('pending', 'scheduled', 'sent')
              )
              AND EXISTS (SELECT 1 FROM invites WHERE campaign_id = $1)
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
