//! Database models and status state machines

use chrono::{DateTime, NaiveDate, Utc};
use inviteq_common::types::{AccountId, CampaignId, InviteId, LeadId, SendingAccountId};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Campaign status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Active,
    Paused,
    Canceled,
    Completed,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Draft => "draft",
            CampaignStatus::Active => "active",
            CampaignStatus::Paused => "paused",
            CampaignStatus::Canceled => "canceled",
            CampaignStatus::Completed => "completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CampaignStatus::Canceled | CampaignStatus::Completed)
    }

    /// Whether the campaign state machine admits the edge `self -> next`
    pub fn permits(&self, next: CampaignStatus) -> bool {
        use CampaignStatus::*;
        matches!(
            (self, next),
            (Draft, Active)
                | (Active, Paused)
                | (Paused, Active)
                | (Draft, Canceled)
                | (Active, Canceled)
                | (Paused, Canceled)
                | (Active, Completed)
        )
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CampaignStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(CampaignStatus::Draft),
            "active" => Ok(CampaignStatus::Active),
            "paused" => Ok(CampaignStatus::Paused),
            "canceled" => Ok(CampaignStatus::Canceled),
            "completed" => Ok(CampaignStatus::Completed),
            other => Err(format!("unknown campaign status: {}", other)),
        }
    }
}

/// Invite status
///
/// Terminal states are `accepted`, `expired`, `withdrawn`, and `failed`.
/// Every persisted transition uses a compare-and-set on the current
/// status, so an edge rejected here can never be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InviteStatus {
    Pending,
    Scheduled,
    Sent,
    Accepted,
    Expired,
    Withdrawn,
    Failed,
}

impl InviteStatus {
    pub const ALL: [InviteStatus; 7] = [
        InviteStatus::Pending,
        InviteStatus::Scheduled,
        InviteStatus::Sent,
        InviteStatus::Accepted,
        InviteStatus::Expired,
        InviteStatus::Withdrawn,
        InviteStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InviteStatus::Pending => "pending",
            InviteStatus::Scheduled => "scheduled",
            InviteStatus::Sent => "sent",
            InviteStatus::Accepted => "accepted",
            InviteStatus::Expired => "expired",
            InviteStatus::Withdrawn => "withdrawn",
            InviteStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InviteStatus::Accepted
                | InviteStatus::Expired
                | InviteStatus::Withdrawn
                | InviteStatus::Failed
        )
    }

    /// Whether the invite state machine admits the edge `self -> next`
    pub fn permits(&self, next: InviteStatus) -> bool {
        use InviteStatus::*;
        matches!(
            (self, next),
            (Pending, Scheduled)
                | (Pending, Withdrawn)
                | (Scheduled, Sent)
                | (Scheduled, Failed)
                | (Scheduled, Withdrawn)
                | (Sent, Accepted)
                | (Sent, Expired)
                | (Sent, Withdrawn)
        )
    }
}

impl std::fmt::Display for InviteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for InviteStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(InviteStatus::Pending),
            "scheduled" => Ok(InviteStatus::Scheduled),
            "sent" => Ok(InviteStatus::Sent),
            "accepted" => Ok(InviteStatus::Accepted),
            "expired" => Ok(InviteStatus::Expired),
            "withdrawn" => Ok(InviteStatus::Withdrawn),
            "failed" => Ok(InviteStatus::Failed),
            other => Err(format!("unknown invite status: {}", other)),
        }
    }
}

/// Coarse CRM pipeline stage of a lead
///
/// The engine drives only the invite sub-range; stages past `accepted`
/// belong to downstream qualification and are never regressed by the
/// engine (pipeline writes are conditional on the lead still being in
/// the engine-owned range).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Leads,
    InviteQueued,
    InviteSent,
    InviteExpired,
    Accepted,
    Qualifying,
    Qualified,
    Scheduled,
    Won,
    Lost,
    Discarded,
}

impl PipelineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStatus::Leads => "leads",
            PipelineStatus::InviteQueued => "invite_queued",
            PipelineStatus::InviteSent => "invite_sent",
            PipelineStatus::InviteExpired => "invite_expired",
            PipelineStatus::Accepted => "accepted",
            PipelineStatus::Qualifying => "qualifying",
            PipelineStatus::Qualified => "qualified",
            PipelineStatus::Scheduled => "scheduled",
            PipelineStatus::Won => "won",
            PipelineStatus::Lost => "lost",
            PipelineStatus::Discarded => "discarded",
        }
    }

    /// Stages the invite engine is allowed to write over
    pub fn engine_owned(&self) -> bool {
        matches!(
            self,
            PipelineStatus::Leads
                | PipelineStatus::InviteQueued
                | PipelineStatus::InviteSent
                | PipelineStatus::InviteExpired
        )
    }

    /// The engine-owned stages plus the initial `leads` stage, as SQL values
    pub fn engine_owned_values() -> Vec<String> {
        vec![
            "leads".to_string(),
            "invite_queued".to_string(),
            "invite_sent".to_string(),
            "invite_expired".to_string(),
        ]
    }
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PipelineStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "leads" => Ok(PipelineStatus::Leads),
            "invite_queued" => Ok(PipelineStatus::InviteQueued),
            "invite_sent" => Ok(PipelineStatus::InviteSent),
            "invite_expired" => Ok(PipelineStatus::InviteExpired),
            "accepted" => Ok(PipelineStatus::Accepted),
            "qualifying" => Ok(PipelineStatus::Qualifying),
            "qualified" => Ok(PipelineStatus::Qualified),
            "scheduled" => Ok(PipelineStatus::Scheduled),
            "won" => Ok(PipelineStatus::Won),
            "lost" => Ok(PipelineStatus::Lost),
            "discarded" => Ok(PipelineStatus::Discarded),
            other => Err(format!("unknown pipeline status: {}", other)),
        }
    }
}

/// Campaign model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub account_id: AccountId,
    pub sending_account_id: SendingAccountId,
    pub name: String,
    pub status: String,
    pub invite_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}

/// Sending account model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SendingAccount {
    pub id: SendingAccountId,
    pub account_id: AccountId,
    pub label: String,
    pub provider_ref: String,
    pub daily_limit: i32,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One day's usage counter for a sending account
///
/// `used` is only ever changed via an atomic conditional increment or a
/// floored decrement; it is never read, compared, and written back.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AccountDailyUsage {
    pub account_id: SendingAccountId,
    pub day: NaiveDate,
    pub used: i32,
    pub cap: i32,
    pub updated_at: DateTime<Utc>,
}

/// Lead model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub campaign_id: CampaignId,
    pub full_name: String,
    pub profile_ref: String,
    pub headline: Option<String>,
    pub company: Option<String>,
    pub pipeline_status: String,
    pub responsible_user: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Invite model (one per campaign x lead)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Invite {
    pub id: InviteId,
    pub campaign_id: CampaignId,
    pub lead_id: LeadId,
    pub sending_account_id: SendingAccountId,
    pub status: String,
    pub scheduled_for: Option<DateTime<Utc>>,
    /// Day the invite's daily-limit reservation was made for; unlike
    /// `scheduled_for` this never moves once set
    pub reserved_day: Option<NaiveDate>,
    pub sent_at: Option<DateTime<Utc>>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub retry_count: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create campaign input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCampaign {
    pub account_id: AccountId,
    pub sending_account_id: SendingAccountId,
    pub name: String,
    pub invite_message: Option<String>,
}

/// Create sending account input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSendingAccount {
    pub account_id: AccountId,
    pub label: String,
    pub provider_ref: String,
    pub daily_limit: i32,
}

/// Create lead input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateLead {
    pub full_name: String,
    pub profile_ref: String,
    pub headline: Option<String>,
    pub company: Option<String>,
    pub responsible_user: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_invite_status_roundtrip() {
        for status in InviteStatus::ALL {
            assert_eq!(status.as_str().parse::<InviteStatus>(), Ok(status));
        }
        assert!("bogus".parse::<InviteStatus>().is_err());
    }

    #[test]
    fn test_invite_transition_table() {
        use InviteStatus::*;

        // Permitted edges, exactly as specified.
        let permitted = [
            (Pending, Scheduled),
            (Pending, Withdrawn),
            (Scheduled, Sent),
            (Scheduled, Failed),
            (Scheduled, Withdrawn),
            (Sent, Accepted),
            (Sent, Expired),
            (Sent, Withdrawn),
        ];

        for from in InviteStatus::ALL {
            for to in InviteStatus::ALL {
                let expected = permitted.contains(&(from, to));
                assert_eq!(
                    from.permits(to),
                    expected,
                    "edge {} -> {} mismatch",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_no_edge_leaves_terminal_state() {
        for from in InviteStatus::ALL.into_iter().filter(|s| s.is_terminal()) {
            for to in InviteStatus::ALL {
                assert!(!from.permits(to), "terminal {} must not move to {}", from, to);
            }
        }
    }

    #[test]
    fn test_no_edge_skips_scheduled() {
        // pending can only move to scheduled or withdrawn, never straight to sent
        assert!(!InviteStatus::Pending.permits(InviteStatus::Sent));
        assert!(!InviteStatus::Pending.permits(InviteStatus::Accepted));
        assert!(!InviteStatus::Pending.permits(InviteStatus::Failed));
    }

    #[test]
    fn test_campaign_transition_table() {
        use CampaignStatus::*;
        assert!(Draft.permits(Active));
        assert!(Active.permits(Paused));
        assert!(Paused.permits(Active));
        assert!(Draft.permits(Canceled));
        assert!(Active.permits(Canceled));
        assert!(Paused.permits(Canceled));
        assert!(Active.permits(Completed));

        assert!(!Canceled.permits(Active));
        assert!(!Completed.permits(Active));
        assert!(!Draft.permits(Paused));
        assert!(!Paused.permits(Completed));
    }

    #[test]
    fn test_pipeline_engine_ownership() {
        assert!(PipelineStatus::Leads.engine_owned());
        assert!(PipelineStatus::InviteQueued.engine_owned());
        assert!(PipelineStatus::InviteSent.engine_owned());
        assert!(PipelineStatus::InviteExpired.engine_owned());

        // Past-acceptance stages belong to downstream qualification.
        assert!(!PipelineStatus::Accepted.engine_owned());
        assert!(!PipelineStatus::Qualifying.engine_owned());
        assert!(!PipelineStatus::Won.engine_owned());
    }
}
