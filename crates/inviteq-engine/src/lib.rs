//! InviteQ Engine - Campaign scheduling, dispatch, and lifecycle
//!
//! The engine is a set of cooperating loops over the invite queue:
//!
//! - [`scheduler::InviteScheduler`] turns pending invites into concrete
//!   send slots, paced per sending account
//! - [`dispatcher::Dispatcher`] claims due invites and pushes them
//!   through the send integration
//! - [`lifecycle::LifecycleManager`] applies acceptance events and
//!   expires stale invites
//! - [`controller::CampaignController`] drives the campaign state
//!   machine from API calls
//! - [`report::ReportAggregator`] answers queue-status and report reads
//!
//! Every loop is safe to run in multiple processes at once; all
//! coordination happens through conditional writes in the database.

pub mod controller;
pub mod dispatcher;
pub mod lifecycle;
pub mod limiter;
pub mod report;
pub mod scheduler;
pub mod send;

pub use controller::{CampaignController, CampaignError};
pub use dispatcher::Dispatcher;
pub use lifecycle::LifecycleManager;
pub use limiter::{AccountRateTracker, ReservationToken};
pub use report::ReportAggregator;
pub use scheduler::InviteScheduler;
pub use send::{InviteRequest, SendIntegration, SendOutcome};
