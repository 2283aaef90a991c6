//! Campaign Controller - drives the campaign state machine
//!
//! Control operations are idempotent: repeating a launch, pause,
//! resume, or cancel that already took effect succeeds without doing
//! anything. Only genuinely impossible moves (resuming a canceled
//! campaign) are errors.

use chrono::NaiveDate;
use inviteq_common::types::{CampaignId, SendingAccountId};
use inviteq_storage::db::DatabasePool;
use inviteq_storage::models::{Campaign, CampaignStatus, CreateCampaign, CreateLead, Lead};
use inviteq_storage::repository::{
    CampaignRepository, InviteRepository, LeadRepository, SendingAccountRepository,
    WithdrawnInvite,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::limiter::AccountRateTracker;

/// Campaign control errors
#[derive(Debug, Error)]
pub enum CampaignError {
    #[error("Campaign not found")]
    NotFound,

    #[error("Sending account not found")]
    SendingAccountNotFound,

    #[error("Campaign is {actual}, cannot {action}")]
    InvalidState { actual: String, action: &'static str },

    #[error("Campaign has no leads")]
    NoLeads,

    #[error("Invalid campaign: {0}")]
    Invalid(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Campaign Controller
#[derive(Clone)]
pub struct CampaignController {
    campaign_repo: CampaignRepository,
    invite_repo: InviteRepository,
    lead_repo: LeadRepository,
    account_repo: SendingAccountRepository,
    rate_tracker: AccountRateTracker,
    respace_on_resume: bool,
}

impl CampaignController {
    /// Create a new campaign controller
    pub fn new(db_pool: &DatabasePool, respace_on_resume: bool) -> Self {
        let pool = db_pool.pool().clone();
        Self {
            campaign_repo: CampaignRepository::new(pool.clone()),
            invite_repo: InviteRepository::new(pool.clone()),
            lead_repo: LeadRepository::new(pool.clone()),
            account_repo: SendingAccountRepository::new(pool),
            rate_tracker: AccountRateTracker::new(db_pool),
            respace_on_resume,
        }
    }

    /// Create a campaign in `draft`
    pub async fn create(&self, input: CreateCampaign) -> Result<Campaign, CampaignError> {
        if input.name.trim().is_empty() {
            return Err(CampaignError::Invalid("Name must not be empty".to_string()));
        }

        let account = self
            .account_repo
            .get(input.sending_account_id)
            .await?
            .ok_or(CampaignError::SendingAccountNotFound)?;

        if account.account_id != input.account_id {
            return Err(CampaignError::SendingAccountNotFound);
        }

        let campaign = self.campaign_repo.create(input).await?;
        info!("Campaign {} created", campaign.id);
        Ok(campaign)
    }

    /// Add leads to a draft campaign. The lead list is fixed once the
    /// campaign launches.
    pub async fn add_leads(
        &self,
        campaign_id: CampaignId,
        inputs: Vec<CreateLead>,
    ) -> Result<Vec<Lead>, CampaignError> {
        let campaign = self.get(campaign_id).await?;
        ensure_leads_mutable(&campaign)?;

        let leads = self.lead_repo.add_to_campaign(campaign_id, inputs).await?;
        Ok(leads)
    }

    /// Launch a draft campaign: flip it active and queue an invite for
    /// every lead. Launching an already-active campaign is a no-op.
    pub async fn launch(&self, campaign_id: CampaignId) -> Result<Campaign, CampaignError> {
        let campaign = self.get(campaign_id).await?;

        match campaign.status.as_str() {
            "draft" => {}
            "active" => return Ok(campaign),
            _ => {
                return Err(CampaignError::InvalidState {
                    actual: campaign.status,
                    action: "launch",
                })
            }
        }

        let lead_count = self
            .invite_repo
            .report_count(campaign_id, None)
            .await?;
        if lead_count == 0 {
            return Err(CampaignError::NoLeads);
        }

        let campaign = self
            .campaign_repo
            .transition(campaign_id, CampaignStatus::Draft, CampaignStatus::Active)
            .await?
            // Lost a race; fetch whatever it became and retry the match.
            .ok_or(CampaignError::InvalidState {
                actual: "draft".to_string(),
                action: "launch",
            })?;

        self.enqueue_new_leads(&campaign).await?;

        info!("Campaign {} launched", campaign.id);
        Ok(campaign)
    }

    /// Pause an active campaign. Scheduled invites keep their slots;
    /// the dispatcher defers them while the campaign is paused.
    pub async fn pause(&self, campaign_id: CampaignId) -> Result<Campaign, CampaignError> {
        let campaign = self.get(campaign_id).await?;

        match campaign.status.as_str() {
            "active" => {}
            "paused" => return Ok(campaign),
            _ => {
                return Err(CampaignError::InvalidState {
                    actual: campaign.status,
                    action: "pause",
                })
            }
        }

        let campaign = self
            .campaign_repo
            .transition(campaign_id, CampaignStatus::Active, CampaignStatus::Paused)
            .await?
            .ok_or(CampaignError::InvalidState {
                actual: "active".to_string(),
                action: "pause",
            })?;

        info!("Campaign {} paused", campaign.id);
        Ok(campaign)
    }

    /// Resume a paused campaign
    pub async fn resume(&self, campaign_id: CampaignId) -> Result<Campaign, CampaignError> {
        let campaign = self.get(campaign_id).await?;

        match campaign.status.as_str() {
            "paused" => {}
            "active" => return Ok(campaign),
            _ => {
                return Err(CampaignError::InvalidState {
                    actual: campaign.status,
                    action: "resume",
                })
            }
        }

        let campaign = self
            .campaign_repo
            .transition(campaign_id, CampaignStatus::Paused, CampaignStatus::Active)
            .await?
            .ok_or(CampaignError::InvalidState {
                actual: "paused".to_string(),
                action: "resume",
            })?;

        if self.respace_on_resume {
            // Throw the stale slots away; the scheduler re-plans the
            // invites from now on its next pass.
            let released = self.invite_repo.unschedule_campaign(campaign_id).await?;
            for (account_id, day) in &released {
                if let Err(e) = self.rate_tracker.release_on(*account_id, *day).await {
                    warn!("Failed to release {} slot on resume: {}", day, e);
                }
            }
            debug!(
                "Campaign {} resumed, {} slots released for re-planning",
                campaign.id,
                released.len()
            );
        }

        // The campaign may have drained while paused; nothing after
        // resume would re-run the completion check otherwise.
        if self.campaign_repo.complete_if_drained(campaign_id).await? {
            info!("Campaign {} completed on resume", campaign_id);
            return self.get(campaign_id).await;
        }

        info!("Campaign {} resumed", campaign.id);
        Ok(campaign)
    }

    /// Cancel a campaign and withdraw every invite that has not reached
    /// a terminal state. Canceling twice is a no-op.
    pub async fn cancel(&self, campaign_id: CampaignId) -> Result<Campaign, CampaignError> {
        let campaign = self.get(campaign_id).await?;

        let from = match campaign.status.as_str() {
            "draft" => CampaignStatus::Draft,
            "active" => CampaignStatus::Active,
            "paused" => CampaignStatus::Paused,
            "canceled" => return Ok(campaign),
            _ => {
                return Err(CampaignError::InvalidState {
                    actual: campaign.status,
                    action: "cancel",
                })
            }
        };

        let campaign = self
            .campaign_repo
            .transition(campaign_id, from, CampaignStatus::Canceled)
            .await?
            .ok_or(CampaignError::InvalidState {
                actual: from.to_string(),
                action: "cancel",
            })?;

        let withdrawn = self.invite_repo.withdraw_campaign(campaign_id).await?;

        for (account_id, day) in reservations_to_release(&withdrawn) {
            if let Err(e) = self.rate_tracker.release_on(account_id, day).await {
                warn!(
                    "Failed to release {} slot for canceled campaign {}: {}",
                    day, campaign_id, e
                );
            }
        }

        info!(
            "Campaign {} canceled, {} invites withdrawn",
            campaign.id,
            withdrawn.len()
        );
        Ok(campaign)
    }

    async fn get(&self, campaign_id: CampaignId) -> Result<Campaign, CampaignError> {
        self.campaign_repo
            .get(campaign_id)
            .await?
            .ok_or(CampaignError::NotFound)
    }

    /// Create pending invites for leads that have none and mark them
    /// queued in the pipeline
    async fn enqueue_new_leads(&self, campaign: &Campaign) -> Result<(), CampaignError> {
        let queued = self
            .invite_repo
            .enqueue_campaign_leads(campaign.id, campaign.sending_account_id)
            .await?;
        self.lead_repo.mark_campaign_queued(campaign.id).await?;

        if queued > 0 {
            debug!("Queued {} invites for campaign {}", queued, campaign.id);
        }
        Ok(())
    }
}

/// Leads can only change while the campaign is still a draft
fn ensure_leads_mutable(campaign: &Campaign) -> Result<(), CampaignError> {
    if campaign.status.as_str() == "draft" {
        Ok(())
    } else {
        Err(CampaignError::InvalidState {
            actual: campaign.status.clone(),
            action: "add leads",
        })
    }
}

/// Reservations to give back after a withdrawal: exactly the invites
/// that were still `scheduled`, keyed to the day they reserved. Pending
/// invites never held one and sent invites consumed theirs for real.
fn reservations_to_release(
    withdrawn: &[WithdrawnInvite],
) -> Vec<(SendingAccountId, NaiveDate)> {
    withdrawn
        .iter()
        .filter(|invite| invite.prior_status == "scheduled")
        .filter_map(|invite| {
            invite
                .prior_day
                .map(|day| (invite.sending_account_id, day))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn campaign_with_status(status: &str) -> Campaign {
        Campaign {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            sending_account_id: Uuid::new_v4(),
            name: "Q3 outreach".to_string(),
            status: status.to_string(),
            invite_message: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn withdrawn(
        account: SendingAccountId,
        prior_status: &str,
        prior_day: Option<NaiveDate>,
    ) -> WithdrawnInvite {
        WithdrawnInvite {
            id: Uuid::new_v4(),
            lead_id: Uuid::new_v4(),
            sending_account_id: account,
            prior_status: prior_status.to_string(),
            prior_day,
        }
    }

    #[test]
    fn test_leads_mutable_only_in_draft() {
        assert!(ensure_leads_mutable(&campaign_with_status("draft")).is_ok());

        for status in ["active", "paused", "canceled", "completed"] {
            let err = ensure_leads_mutable(&campaign_with_status(status));
            assert!(
                matches!(err, Err(CampaignError::InvalidState { .. })),
                "leads must be locked for {} campaigns",
                status
            );
        }
    }

    #[test]
    fn test_cancel_releases_only_scheduled_reservations() {
        let account = Uuid::new_v4();
        let day = NaiveDate::from_ymd_opt(2025, 6, 10).unwrap();

        let withdrawn = vec![
            withdrawn(account, "pending", None),
            withdrawn(account, "scheduled", Some(day)),
            withdrawn(account, "sent", Some(day)),
        ];

        assert_eq!(reservations_to_release(&withdrawn), vec![(account, day)]);
    }

    #[test]
    fn test_release_skips_scheduled_without_reserved_day() {
        let account = Uuid::new_v4();
        let rows = vec![withdrawn(account, "scheduled", None)];
        assert!(reservations_to_release(&rows).is_empty());
    }
}
