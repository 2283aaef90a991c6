//! Lifecycle Manager - acceptance events and invite expiry
//!
//! Acceptance and expiry race by nature: a recipient can accept just as
//! the sweep decides their invite is stale. Both paths go through a
//! compare-and-set on `sent`, so exactly one of them wins and the loser
//! becomes a no-op.

use anyhow::Result;
use chrono::{Duration, Utc};
use inviteq_common::config::EngineConfig;
use inviteq_common::types::AcceptanceEvent;
use inviteq_storage::db::DatabasePool;
use inviteq_storage::models::PipelineStatus;
use inviteq_storage::repository::{CampaignRepository, InviteRepository, LeadRepository};
use std::collections::HashSet;
use tokio::time::{interval, Duration as TokioDuration};
use tracing::{debug, error, info, warn};

use crate::limiter::AccountRateTracker;

/// Lifecycle Manager
#[derive(Clone)]
pub struct LifecycleManager {
    campaign_repo: CampaignRepository,
    invite_repo: InviteRepository,
    lead_repo: LeadRepository,
    rate_tracker: AccountRateTracker,
    expiry_after: Duration,
    sweep_interval_secs: u64,
    usage_retention_days: i64,
}

impl LifecycleManager {
    /// Create a new lifecycle manager
    pub fn new(db_pool: &DatabasePool, config: &EngineConfig) -> Self {
        let pool = db_pool.pool().clone();
        Self {
            campaign_repo: CampaignRepository::new(pool.clone()),
            invite_repo: InviteRepository::new(pool.clone()),
            lead_repo: LeadRepository::new(pool),
            rate_tracker: AccountRateTracker::new(db_pool),
            expiry_after: Duration::days(config.expiry_days),
            sweep_interval_secs: config.expiry_sweep_interval_secs,
            usage_retention_days: config.usage_retention_days,
        }
    }

    /// Run the periodic sweep loop
    pub async fn run(&self) {
        let mut ticker = interval(TokioDuration::from_secs(self.sweep_interval_secs));

        info!(
            "Lifecycle manager started (expiry: {}d, sweep interval: {}s)",
            self.expiry_after.num_days(),
            self.sweep_interval_secs
        );

        loop {
            ticker.tick().await;

            if let Err(e) = self.sweep_expired().await {
                error!("Error in expiry sweep: {}", e);
            }

            if let Err(e) = self.rate_tracker.prune(self.usage_retention_days).await {
                warn!("Error pruning usage counters: {}", e);
            }
        }
    }

    /// Apply an acceptance event. Returns true if this call moved the
    /// invite; a repeated or stale event returns false and changes
    /// nothing.
    pub async fn record_acceptance(&self, event: &AcceptanceEvent) -> Result<bool> {
        let invite = self
            .invite_repo
            .mark_accepted(event.campaign_id, event.lead_id, event.accepted_at)
            .await?;

        let invite = match invite {
            Some(invite) => invite,
            None => {
                debug!(
                    "No sent invite for campaign {} lead {}, ignoring acceptance",
                    event.campaign_id, event.lead_id
                );
                return Ok(false);
            }
        };

        info!(
            "Invite {} accepted (campaign {}, lead {})",
            invite.id, event.campaign_id, event.lead_id
        );

        // A late acceptance after the lead was marked invite_expired
        // still moves it forward; the invite CAS above cannot have
        // succeeded twice.
        if !self.lead_repo.mark_accepted(event.lead_id).await? {
            debug!(
                "Lead {} already left the invite pipeline, leaving its stage",
                event.lead_id
            );
        }

        self.campaign_repo
            .complete_if_drained(event.campaign_id)
            .await?;

        Ok(true)
    }

    /// Expire sent invites older than the expiry horizon. Returns how
    /// many expired.
    pub async fn sweep_expired(&self) -> Result<u64> {
        let cutoff = Utc::now() - self.expiry_after;
        let expired = self.invite_repo.expire_sent_before(cutoff).await?;

        if expired.is_empty() {
            return Ok(0);
        }

        info!("Expired {} invites older than {}", expired.len(), cutoff);

        let mut campaigns = HashSet::new();

        for invite in &expired {
            if let Err(e) = self
                .lead_repo
                .set_pipeline_from_engine(invite.lead_id, PipelineStatus::InviteExpired)
                .await
            {
                warn!(
                    "Failed to move lead {} to invite_expired: {}",
                    invite.lead_id, e
                );
            }
            campaigns.insert(invite.campaign_id);
        }

        for campaign_id in campaigns {
            if let Err(e) = self.campaign_repo.complete_if_drained(campaign_id).await {
                warn!("Failed completion check for campaign {}: {}", campaign_id, e);
            }
        }

        Ok(expired.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use inviteq_storage::models::InviteStatus;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_acceptance_applies_only_from_sent() {
        // The mark_accepted CAS is keyed on `sent`. A second acceptance
        // event finds the invite in `accepted`, which refuses the edge,
        // so replayed webhooks change nothing.
        let all = [
            InviteStatus::Pending,
            InviteStatus::Scheduled,
            InviteStatus::Sent,
            InviteStatus::Accepted,
            InviteStatus::Expired,
            InviteStatus::Withdrawn,
            InviteStatus::Failed,
        ];

        for status in all {
            assert_eq!(
                status.permits(InviteStatus::Accepted),
                status == InviteStatus::Sent,
                "acceptance from {} must be a no-op unless sent",
                status
            );
        }
    }
}
