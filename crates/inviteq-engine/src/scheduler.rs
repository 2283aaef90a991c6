//! Invite Scheduler - turns pending invites into concrete send slots
//!
//! Each pass walks active campaigns oldest-pending-first and assigns
//! slots inside the daily send window, spaced by the minimum interval
//! plus random jitter. A slot is only written after its day's budget
//! was reserved on the sending account, so two scheduler processes can
//! run at once without overbooking a day.

use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use inviteq_common::config::EngineConfig;
use inviteq_storage::db::DatabasePool;
use inviteq_storage::models::Campaign;
use inviteq_storage::repository::{CampaignRepository, InviteRepository};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::{interval, Duration as TokioDuration};
use tracing::{debug, error, info, warn};

use crate::limiter::AccountRateTracker;

/// Pure slot arithmetic: send-window clamping, spacing, and jitter.
/// Holds no state and touches no clock, so it is directly testable.
#[derive(Debug, Clone)]
pub struct SlotPlanner {
    start_hour: u32,
    end_hour: u32,
    min_interval: Duration,
    jitter_secs: i64,
}

impl SlotPlanner {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            start_hour: config.send_start_hour,
            end_hour: config.send_end_hour,
            min_interval: Duration::seconds(config.min_interval_secs),
            jitter_secs: config.jitter_secs,
        }
    }

    fn window_start(&self, day: NaiveDate) -> DateTime<Utc> {
        // Hours come from validated config, and_hms_opt cannot fail here
        day.and_hms_opt(self.start_hour, 0, 0)
            .unwrap_or_default()
            .and_utc()
    }

    fn window_end(&self, day: NaiveDate) -> DateTime<Utc> {
        // An end hour of 24 means the window runs to midnight;
        // and_hms_opt rejects hour 24, so express it as the next day.
        if self.end_hour >= 24 {
            (day + Duration::days(1))
                .and_hms_opt(0, 0, 0)
                .unwrap_or_default()
                .and_utc()
        } else {
            day.and_hms_opt(self.end_hour, 0, 0)
                .unwrap_or_default()
                .and_utc()
        }
    }

    /// Pull a time into the nearest send window at or after it
    pub fn clamp(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        let day = t.date_naive();
        if t < self.window_start(day) {
            self.window_start(day)
        } else if t >= self.window_end(day) {
            self.window_start(day + Duration::days(1))
        } else {
            t
        }
    }

    /// The start of the next day's window after `t`
    pub fn next_day(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        self.window_start(t.date_naive() + Duration::days(1))
    }

    /// Place a slot at or after `cursor`: clamp into the window, then
    /// add jitter. The result always lies inside a send window.
    pub fn place<R: Rng>(&self, rng: &mut R, cursor: DateTime<Utc>) -> DateTime<Utc> {
        let base = self.clamp(cursor);
        let jitter = if self.jitter_secs > 0 {
            rng.gen_range(0..=self.jitter_secs)
        } else {
            0
        };
        // Jitter can spill past the window end; re-clamping rolls the
        // slot to the next day's opening.
        self.clamp(base + Duration::seconds(jitter))
    }

    /// The earliest cursor for the slot after `slot`
    pub fn advance(&self, slot: DateTime<Utc>) -> DateTime<Utc> {
        slot + self.min_interval
    }
}

/// Invite Scheduler
pub struct InviteScheduler {
    campaign_repo: CampaignRepository,
    invite_repo: InviteRepository,
    rate_tracker: AccountRateTracker,
    planner: SlotPlanner,
    batch_size: i64,
    max_horizon: Duration,
    schedule_interval_secs: u64,
}

impl InviteScheduler {
    /// Create a new scheduler
    pub fn new(db_pool: &DatabasePool, config: &EngineConfig) -> Self {
        let pool = db_pool.pool().clone();
        Self {
            campaign_repo: CampaignRepository::new(pool.clone()),
            invite_repo: InviteRepository::new(pool),
            rate_tracker: AccountRateTracker::new(db_pool),
            planner: SlotPlanner::new(config),
            batch_size: config.batch_size,
            max_horizon: Duration::days(config.max_horizon_days),
            schedule_interval_secs: config.schedule_interval_secs,
        }
    }

    /// Run the scheduling loop
    pub async fn run(&self) {
        let mut ticker = interval(TokioDuration::from_secs(self.schedule_interval_secs));

        info!(
            "Invite scheduler started (batch: {}, interval: {}s)",
            self.batch_size, self.schedule_interval_secs
        );

        loop {
            ticker.tick().await;

            if let Err(e) = self.schedule_pass().await {
                error!("Error in scheduling pass: {}", e);
            }
        }
    }

    /// One scheduling pass over all active campaigns
    pub async fn schedule_pass(&self) -> Result<u64> {
        let campaigns = self.campaign_repo.list_active().await?;
        let mut scheduled = 0u64;

        for campaign in campaigns {
            match self.schedule_campaign(&campaign).await {
                Ok(n) => scheduled += n,
                Err(e) => {
                    error!("Error scheduling campaign {}: {}", campaign.id, e);
                }
            }
        }

        if scheduled > 0 {
            info!("Scheduled {} invites", scheduled);
        }

        Ok(scheduled)
    }

    /// Assign slots to a campaign's oldest pending invites
    async fn schedule_campaign(&self, campaign: &Campaign) -> Result<u64> {
        let pending = self
            .invite_repo
            .list_pending(campaign.id, self.batch_size)
            .await?;

        if pending.is_empty() {
            return Ok(0);
        }

        let now = Utc::now();
        let horizon = now + self.max_horizon;

        // Start after the account's latest existing slot so campaigns
        // sharing one sending account interleave instead of colliding.
        let mut cursor = match self
            .invite_repo
            .last_slot_for_account(campaign.sending_account_id)
            .await?
        {
            Some(last) => self.planner.advance(last).max(now),
            None => now,
        };

        // StdRng is Send, so this future can cross tokio::spawn even
        // with the rng alive across the awaits below.
        let mut rng = StdRng::from_entropy();
        let mut scheduled = 0u64;

        'invites: for invite in pending {
            loop {
                let slot = self.planner.place(&mut rng, cursor);

                if slot > horizon {
                    debug!(
                        "Campaign {} hit the scheduling horizon, leaving the rest pending",
                        campaign.id
                    );
                    break 'invites;
                }

                let token = match self
                    .rate_tracker
                    .reserve(campaign.sending_account_id, slot)
                    .await?
                {
                    Some(token) => token,
                    None => {
                        // Day is full, try the next one.
                        cursor = self.planner.next_day(slot);
                        continue;
                    }
                };

                if self.invite_repo.schedule(invite.id, slot).await? {
                    cursor = self.planner.advance(slot);
                    scheduled += 1;
                } else {
                    // The invite left `pending` under us (withdrawn or
                    // scheduled elsewhere); give the slot back.
                    warn!("Invite {} no longer pending, releasing slot", invite.id);
                    self.rate_tracker.release(token).await?;
                }

                continue 'invites;
            }
        }

        Ok(scheduled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn planner(min_interval: i64, jitter: i64) -> SlotPlanner {
        SlotPlanner {
            start_hour: 9,
            end_hour: 18,
            min_interval: Duration::seconds(min_interval),
            jitter_secs: jitter,
        }
    }

    fn at(day: u32, hour: u32, min: u32) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(2025, 6, day)
            .unwrap()
            .and_hms_opt(hour, min, 0)
            .unwrap()
            .and_utc()
    }

    #[test]
    fn test_clamp_before_window_opens() {
        let p = planner(180, 0);
        assert_eq!(p.clamp(at(10, 6, 30)), at(10, 9, 0));
    }

    #[test]
    fn test_clamp_inside_window_is_identity() {
        let p = planner(180, 0);
        assert_eq!(p.clamp(at(10, 13, 45)), at(10, 13, 45));
    }

    #[test]
    fn test_clamp_after_window_rolls_to_next_day() {
        let p = planner(180, 0);
        assert_eq!(p.clamp(at(10, 18, 0)), at(11, 9, 0));
        assert_eq!(p.clamp(at(10, 22, 15)), at(11, 9, 0));
    }

    #[test]
    fn test_place_always_lands_in_window() {
        let p = planner(180, 120);
        let mut rng = StdRng::seed_from_u64(7);

        let mut cursor = at(10, 0, 0);
        for _ in 0..500 {
            let slot = p.place(&mut rng, cursor);
            let day = slot.date_naive();
            assert!(slot >= day.and_hms_opt(9, 0, 0).unwrap().and_utc());
            assert!(slot < day.and_hms_opt(18, 0, 0).unwrap().and_utc());
            cursor = p.advance(slot);
        }
    }

    #[test]
    fn test_slots_keep_minimum_spacing() {
        let p = planner(300, 60);
        let mut rng = StdRng::seed_from_u64(42);

        let mut cursor = at(10, 9, 0);
        let mut prev: Option<DateTime<Utc>> = None;
        for _ in 0..100 {
            let slot = p.place(&mut rng, cursor);
            if let Some(prev) = prev {
                assert!(
                    slot - prev >= Duration::seconds(300),
                    "slots {} and {} too close",
                    prev,
                    slot
                );
            }
            prev = Some(slot);
            cursor = p.advance(slot);
        }
    }

    #[test]
    fn test_place_is_deterministic_with_seed() {
        let p = planner(180, 120);
        let mut a = StdRng::seed_from_u64(99);
        let mut b = StdRng::seed_from_u64(99);
        for _ in 0..20 {
            assert_eq!(p.place(&mut a, at(10, 10, 0)), p.place(&mut b, at(10, 10, 0)));
        }
    }

    #[test]
    fn test_zero_jitter_places_at_cursor() {
        let p = planner(180, 0);
        assert_eq!(p.place(&mut rand::thread_rng(), at(10, 11, 0)), at(10, 11, 0));
    }

    #[test]
    fn test_next_day_opens_at_window_start() {
        let p = planner(180, 0);
        assert_eq!(p.next_day(at(10, 13, 0)), at(11, 9, 0));
    }

    #[test]
    fn test_window_ending_at_midnight() {
        let p = SlotPlanner {
            start_hour: 9,
            end_hour: 24,
            min_interval: Duration::seconds(180),
            jitter_secs: 0,
        };
        // Late-evening times stay in the window instead of rolling over.
        assert_eq!(p.clamp(at(10, 23, 30)), at(10, 23, 30));
        assert_eq!(p.clamp(at(10, 10, 0)), at(10, 10, 0));
        assert_eq!(p.window_end(at(10, 0, 0).date_naive()), at(11, 0, 0));
    }

    #[test]
    fn test_scheduler_futures_are_send() {
        // Compile-time check: the scheduling futures must be spawnable
        // on the multi-threaded runtime.
        fn assert_send<T: Send>(_: T) {}
        #[allow(dead_code)]
        fn check(scheduler: &'static InviteScheduler) {
            assert_send(scheduler.run());
            assert_send(scheduler.schedule_pass());
        }
    }
}
