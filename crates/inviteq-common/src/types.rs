//! Common types for InviteQ

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for workspace accounts (tenants)
pub type AccountId = Uuid;

/// Unique identifier for campaigns
pub type CampaignId = Uuid;

/// Unique identifier for leads
pub type LeadId = Uuid;

/// Unique identifier for invites
pub type InviteId = Uuid;

/// Unique identifier for sending accounts
pub type SendingAccountId = Uuid;

/// Timestamp wrapper
pub type Timestamp = DateTime<Utc>;

/// Acceptance event delivered by the external connection listener
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptanceEvent {
    pub campaign_id: CampaignId,
    pub lead_id: LeadId,
    pub accepted_at: DateTime<Utc>,
}

/// Paginated response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub page: i64,
    pub limit: i64,
    pub total: i64,
}

impl<T> Paginated<T> {
    pub fn pages(&self) -> i64 {
        if self.limit <= 0 {
            return 0;
        }
        (self.total + self.limit - 1) / self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paginated_pages() {
        let p = Paginated::<u8> {
            data: vec![],
            page: 1,
            limit: 50,
            total: 101,
        };
        assert_eq!(p.pages(), 3);

        let empty = Paginated::<u8> {
            data: vec![],
            page: 1,
            limit: 50,
            total: 0,
        };
        assert_eq!(empty.pages(), 0);
    }
}
