//! Lead repository
//!
//! Pipeline stage writes from the engine are conditional on the lead
//! still sitting in an engine-owned stage, so a lead a rep has already
//! moved into qualification is never pulled back.

use inviteq_common::types::{CampaignId, LeadId};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{CreateLead, Lead, PipelineStatus};

/// Lead repository
#[derive(Clone)]
pub struct LeadRepository {
    pool: PgPool,
}

impl LeadRepository {
    /// Create a new lead repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Add leads to a campaign, skipping profile refs the campaign
    /// already has. Returns the inserted rows.
    pub async fn add_to_campaign(
        &self,
        campaign_id: CampaignId,
        inputs: Vec<CreateLead>,
    ) -> Result<Vec<Lead>, sqlx::Error> {
        let mut inserted = Vec::with_capacity(inputs.len());

        for input in inputs {
            let lead = sqlx::query_as::<_, Lead>(
                r#"
                INSERT INTO leads (
                    id, campaign_id, full_name, profile_ref, headline, company,
                    responsible_user
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (campaign_id, profile_ref) DO NOTHING
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(campaign_id)
            .bind(&input.full_name)
            .bind(&input.profile_ref)
            .bind(&input.headline)
            .bind(&input.company)
            .bind(&input.responsible_user)
            .fetch_optional(&self.pool)
            .await?;

            if let Some(lead) = lead {
                inserted.push(lead);
            }
        }

        Ok(inserted)
    }

    /// Get a lead by ID
    pub async fn get(&self, id: LeadId) -> Result<Option<Lead>, sqlx::Error> {
        sqlx::query_as::<_, Lead>("SELECT * FROM leads WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// List leads of a campaign
    pub async fn list_by_campaign(
        &self,
        campaign_id: CampaignId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Lead>, sqlx::Error> {
        sqlx::query_as::<_, Lead>(
            r#"
            SELECT * FROM leads
            WHERE campaign_id = $1
            ORDER BY created_at ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(campaign_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    /// Histogram of pipeline stages across a campaign's leads
    pub async fn pipeline_counts(
        &self,
        campaign_id: CampaignId,
    ) -> Result<Vec<(String, i64)>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT pipeline_status, COUNT(*)
            FROM leads
            WHERE campaign_id = $1
            GROUP BY pipeline_status
            ORDER BY pipeline_status
            "#,
        )
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Move a campaign's untouched leads to `invite_queued` in bulk,
    /// at launch time. Returns how many moved.
    pub async fn mark_campaign_queued(
        &self,
        campaign_id: CampaignId,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE leads
            SET pipeline_status = 'invite_queued', updated_at = NOW()
            WHERE campaign_id = $1 AND pipeline_status = 'leads'
            "#,
        )
        .bind(campaign_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Set a lead's pipeline stage from the engine. The write only lands
    /// while the lead is still in an engine-owned stage; returns whether
    /// the row changed.
    pub async fn set_pipeline_from_engine(
        &self,
        id: LeadId,
        to: PipelineStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE leads
            SET pipeline_status = $2, updated_at = NOW()
            WHERE id = $1
              AND pipeline_status = ANY($3)
              AND pipeline_status <> $2
            "#,
        )
        .bind(id)
        .bind(to.to_string())
        .bind(PipelineStatus::engine_owned_values())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Move a lead to `accepted`. Unlike the other engine writes this is
    /// allowed from any engine-owned stage and wins over `invite_expired`
    /// (a late acceptance is still an acceptance).
    pub async fn mark_accepted(&self, id: LeadId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE leads
            SET pipeline_status = 'accepted', updated_at = NOW()
            WHERE id = $1 AND pipeline_status = ANY($2)
            "#,
        )
        .bind(id)
        .bind(PipelineStatus::engine_owned_values())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
