//! Dispatcher - claims due invites and sends them
//!
//! Claiming works by lease: selecting a due invite pushes its
//! `scheduled_for` forward in the same statement, so a dispatcher that
//! crashes mid-send never strands the invite. Only a recorded outcome
//! moves it out of `scheduled`.

use anyhow::Result;
use chrono::{Duration, Utc};
use inviteq_common::config::EngineConfig;
use inviteq_storage::db::DatabasePool;
use inviteq_storage::models::PipelineStatus;
use inviteq_storage::repository::{
    CampaignRepository, DueInvite, InviteRepository, LeadRepository,
};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::{interval, Duration as TokioDuration};
use tracing::{debug, error, info, warn};

use crate::limiter::AccountRateTracker;
use crate::send::{truncate_note, InviteRequest, SendIntegration, SendOutcome};

/// Exponential backoff for transient send failures, capped
fn retry_delay(retry_count: i32, base_secs: i64, cap_secs: i64) -> Duration {
    let exp = retry_count.clamp(0, 30) as u32;
    let secs = base_secs.saturating_mul(1i64 << exp.min(62)).min(cap_secs);
    Duration::seconds(secs)
}

/// `max_retries` counts retries beyond the first attempt: an invite with
/// that many on the clock fails on its next transient error instead of
/// rescheduling.
fn retries_exhausted(retry_count: i32, max_retries: i32) -> bool {
    retry_count >= max_retries
}

/// Dispatcher
pub struct Dispatcher {
    campaign_repo: CampaignRepository,
    invite_repo: InviteRepository,
    lead_repo: LeadRepository,
    rate_tracker: AccountRateTracker,
    integration: Arc<dyn SendIntegration>,
    batch_size: i64,
    concurrency_limit: usize,
    poll_interval_secs: u64,
    claim_lease: Duration,
    retry_base_secs: i64,
    backoff_cap_secs: i64,
    max_retries: i32,
}

impl Dispatcher {
    /// Create a new dispatcher
    pub fn new(
        db_pool: &DatabasePool,
        config: &EngineConfig,
        integration: Arc<dyn SendIntegration>,
    ) -> Self {
        let pool = db_pool.pool().clone();
        Self {
            campaign_repo: CampaignRepository::new(pool.clone()),
            invite_repo: InviteRepository::new(pool.clone()),
            lead_repo: LeadRepository::new(pool),
            rate_tracker: AccountRateTracker::new(db_pool),
            integration,
            batch_size: config.batch_size,
            concurrency_limit: config.concurrency_limit,
            poll_interval_secs: config.poll_interval_secs,
            claim_lease: Duration::seconds(config.claim_lease_secs),
            retry_base_secs: config.retry_base_secs,
            backoff_cap_secs: config.backoff_cap_secs,
            max_retries: config.max_retries,
        }
    }

    /// Run the dispatch loop
    pub async fn run(&self) {
        let mut ticker = interval(TokioDuration::from_secs(self.poll_interval_secs));
        let semaphore = Arc::new(Semaphore::new(self.concurrency_limit));

        info!(
            "Dispatcher started (concurrency: {}, batch: {}, interval: {}s)",
            self.concurrency_limit, self.batch_size, self.poll_interval_secs
        );

        loop {
            ticker.tick().await;

            if let Err(e) = self.dispatch_due(&semaphore).await {
                error!("Error dispatching due invites: {}", e);
            }
        }
    }

    /// Claim and send one batch of due invites
    async fn dispatch_due(&self, semaphore: &Arc<Semaphore>) -> Result<()> {
        let due = self
            .invite_repo
            .claim_due(self.batch_size, self.claim_lease)
            .await?;

        if due.is_empty() {
            return Ok(());
        }

        debug!("Claimed {} due invites", due.len());

        let mut handles = Vec::new();

        for invite in due {
            match invite.campaign_status.as_str() {
                "active" => {}
                "paused" => {
                    // Slots survive a pause; the claim lease already
                    // deferred this one until after the next poll.
                    debug!(
                        "Campaign {} is paused, deferring invite {}",
                        invite.campaign_id, invite.id
                    );
                    continue;
                }
                _ => {
                    // Canceled campaigns normally have no live invites;
                    // hitting one means a cancel crashed mid-withdrawal.
                    // Finish the job here.
                    self.withdraw_stray(&invite).await;
                    continue;
                }
            }

            let permit = semaphore.clone().acquire_owned().await?;
            let worker = self.worker();

            let handle = tokio::spawn(async move {
                worker.send_one(invite).await;
                drop(permit);
            });

            handles.push(handle);
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!("Send task error: {}", e);
            }
        }

        Ok(())
    }

    async fn withdraw_stray(&self, invite: &DueInvite) {
        warn!(
            "Campaign {} is {}, withdrawing stray invite {}",
            invite.campaign_id, invite.campaign_status, invite.id
        );

        match self.invite_repo.withdraw_one(invite.id).await {
            Ok(true) => {
                if let Err(e) = self
                    .rate_tracker
                    .release_on(invite.sending_account_id, invite.reserved_day)
                    .await
                {
                    warn!(
                        "Failed to release slot for withdrawn invite {}: {}",
                        invite.id, e
                    );
                }
            }
            Ok(false) => {}
            Err(e) => error!("Failed to withdraw invite {}: {}", invite.id, e),
        }
    }

    fn worker(&self) -> SendWorker {
        SendWorker {
            campaign_repo: self.campaign_repo.clone(),
            invite_repo: self.invite_repo.clone(),
            lead_repo: self.lead_repo.clone(),
            rate_tracker: self.rate_tracker.clone(),
            integration: self.integration.clone(),
            retry_base_secs: self.retry_base_secs,
            backoff_cap_secs: self.backoff_cap_secs,
            max_retries: self.max_retries,
        }
    }
}

/// Per-task slice of the dispatcher, cheap to clone into spawned sends
struct SendWorker {
    campaign_repo: CampaignRepository,
    invite_repo: InviteRepository,
    lead_repo: LeadRepository,
    rate_tracker: AccountRateTracker,
    integration: Arc<dyn SendIntegration>,
    retry_base_secs: i64,
    backoff_cap_secs: i64,
    max_retries: i32,
}

impl SendWorker {
    async fn send_one(&self, invite: DueInvite) {
        // The claim carried the campaign status, but a pause or cancel
        // may have landed while this task waited on the semaphore.
        // Re-check right before the irreversible part.
        match self.campaign_repo.get(invite.campaign_id).await {
            Ok(Some(campaign)) if campaign.is_active() => {}
            Ok(_) => {
                debug!(
                    "Campaign {} no longer active, deferring invite {}",
                    invite.campaign_id, invite.id
                );
                return;
            }
            Err(e) => {
                error!(
                    "Failed to re-check campaign {} before send: {}",
                    invite.campaign_id, e
                );
                return;
            }
        }

        let request = InviteRequest {
            provider_ref: invite.provider_ref.clone(),
            profile_ref: invite.profile_ref.clone(),
            message: invite.invite_message.as_deref().map(truncate_note),
        };

        let outcome = self.integration.send_invite(&request).await;
        self.handle_outcome(&invite, outcome).await;
    }

    async fn handle_outcome(&self, invite: &DueInvite, outcome: SendOutcome) {
        match outcome {
            SendOutcome::Sent => {
                info!(
                    "Invite {} sent ({} -> {})",
                    invite.id, invite.sending_account_id, invite.profile_ref
                );

                match self.invite_repo.mark_sent(invite.id).await {
                    Ok(true) => {}
                    Ok(false) => {
                        // The invite left `scheduled` mid-flight (a
                        // cancel withdrew it); whoever moved it owns the
                        // follow-up, so no pipeline write from here.
                        debug!(
                            "Invite {} no longer scheduled, skipping sent bookkeeping",
                            invite.id
                        );
                        return;
                    }
                    Err(e) => {
                        error!("Failed to mark invite {} sent: {}", invite.id, e);
                        return;
                    }
                }

                if let Err(e) = self
                    .lead_repo
                    .set_pipeline_from_engine(invite.lead_id, PipelineStatus::InviteSent)
                    .await
                {
                    warn!("Failed to move lead {} to invite_sent: {}", invite.lead_id, e);
                }
            }

            SendOutcome::TransientFailure { error } => {
                warn!("Invite {} transient failure: {}", invite.id, error);

                if retries_exhausted(invite.retry_count, self.max_retries) {
                    self.fail(invite, &format!("Retries exhausted: {}", error))
                        .await;
                    return;
                }

                let delay =
                    retry_delay(invite.retry_count, self.retry_base_secs, self.backoff_cap_secs);
                let next_attempt = Utc::now() + delay;

                if let Err(e) = self
                    .invite_repo
                    .reschedule_retry(invite.id, next_attempt, &error)
                    .await
                {
                    error!("Failed to reschedule invite {}: {}", invite.id, e);
                }
            }

            SendOutcome::PermanentFailure { error } => {
                error!("Invite {} permanent failure: {}", invite.id, error);
                self.fail(invite, &error).await;
            }
        }
    }

    /// Terminal failure: record it, give the unused slot back, and see
    /// whether that drained the campaign
    async fn fail(&self, invite: &DueInvite, error: &str) {
        match self.invite_repo.mark_failed(invite.id, error).await {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                error!("Failed to mark invite {} failed: {}", invite.id, e);
                return;
            }
        }

        if let Err(e) = self
            .rate_tracker
            .release_on(invite.sending_account_id, invite.reserved_day)
            .await
        {
            warn!(
                "Failed to release slot for failed invite {}: {}",
                invite.id, e
            );
        }

        if let Err(e) = self.campaign_repo.complete_if_drained(invite.campaign_id).await {
            warn!(
                "Failed completion check for campaign {}: {}",
                invite.campaign_id, e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_retry_delay_doubles() {
        assert_eq!(retry_delay(0, 60, 3600), Duration::seconds(60));
        assert_eq!(retry_delay(1, 60, 3600), Duration::seconds(120));
        assert_eq!(retry_delay(2, 60, 3600), Duration::seconds(240));
        assert_eq!(retry_delay(3, 60, 3600), Duration::seconds(480));
    }

    #[test]
    fn test_retry_delay_is_capped() {
        assert_eq!(retry_delay(6, 60, 3600), Duration::seconds(3600));
        assert_eq!(retry_delay(100, 60, 3600), Duration::seconds(3600));
    }

    #[test]
    fn test_retry_delay_handles_negative_count() {
        assert_eq!(retry_delay(-3, 60, 3600), Duration::seconds(60));
    }

    #[test]
    fn test_retries_exhausted_boundary() {
        // max_retries = 5 allows five reschedules; the sixth transient
        // failure is terminal.
        assert!(!retries_exhausted(0, 5));
        assert!(!retries_exhausted(4, 5));
        assert!(retries_exhausted(5, 5));
        assert!(retries_exhausted(6, 5));
    }

    #[test]
    fn test_sent_does_not_apply_to_withdrawn_invites() {
        use inviteq_storage::models::InviteStatus;

        // The mark_sent CAS is keyed on `scheduled`. An invite a cancel
        // withdrew mid-flight refuses the edge, and the worker skips the
        // lead pipeline write on that miss.
        assert!(!InviteStatus::Withdrawn.permits(InviteStatus::Sent));
        assert!(InviteStatus::Scheduled.permits(InviteStatus::Sent));
    }
}
