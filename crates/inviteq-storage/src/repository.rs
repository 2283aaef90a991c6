//! Repository layer for data access

pub mod accounts;
pub mod campaigns;
pub mod invites;
pub mod leads;

pub use accounts::SendingAccountRepository;
pub use campaigns::CampaignRepository;
pub use invites::{
    CampaignReportRow, DueInvite, ExpiredInvite, InviteRepository, InviteStatusCounts,
    ReportSortKey, SortOrder, WithdrawnInvite,
};
pub use leads::LeadRepository;
