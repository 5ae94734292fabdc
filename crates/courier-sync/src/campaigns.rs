//! Campaign resource keys, models and invalidation rules.
//!
//! One place defining how the campaign endpoints map onto cache keys and
//! which keys each mutation renders stale: creating or deleting a campaign
//! stales the list; updating, pausing or launching one stales the list plus
//! that campaign's detail and status keys.

use crate::error::SyncError;
use crate::mutation::{InvalidationRule, InvalidationTarget, RuleFn, StaticTargets};
use crate::store::QueryKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Resource name for the campaign list and per-campaign detail keys.
pub const CAMPAIGN_RESOURCE: &str = "campaign";
/// Resource name for per-campaign status keys.
pub const CAMPAIGN_STATUS_RESOURCE: &str = "campaign-status";
/// Resource name for per-campaign preview keys.
pub const CAMPAIGN_PREVIEW_RESOURCE: &str = "campaign-preview";
/// Resource name for the performance analytics key.
pub const ANALYTICS_RESOURCE: &str = "analytics-performance";

/// Key for the campaign list.
pub fn campaigns_key() -> QueryKey {
    QueryKey::resource(CAMPAIGN_RESOURCE)
}

/// Key for one campaign's detail.
pub fn campaign_key(id: i64) -> QueryKey {
    QueryKey::item(CAMPAIGN_RESOURCE, id)
}

/// Key for one campaign's real-time status report.
pub fn campaign_status_key(id: i64) -> QueryKey {
    QueryKey::item(CAMPAIGN_STATUS_RESOURCE, id)
}

/// Key for one campaign's message preview (manual-trigger-only query).
pub fn campaign_preview_key(id: i64) -> QueryKey {
    QueryKey::item(CAMPAIGN_PREVIEW_RESOURCE, id)
}

/// Key for performance analytics over a lookback window in days.
pub fn analytics_key(days: u32) -> QueryKey {
    QueryKey::item(ANALYTICS_RESOURCE, days)
}

/// Lifecycle state of a campaign's send run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignState {
    Draft,
    Scheduled,
    Sending,
    Paused,
    Completed,
    Failed,
}

impl CampaignState {
    /// Whether server-side processing has finished for this campaign.
    ///
    /// Callers polling a status key stop the poll once a terminal state is
    /// observed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CampaignState::Completed | CampaignState::Failed)
    }
}

/// A campaign as returned by the list and detail endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: i64,
    pub name: String,
    pub message_template: String,
    pub state: CampaignState,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Real-time send statistics for one campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignStatusReport {
    pub campaign_id: i64,
    pub state: CampaignState,
    pub total_messages: u64,
    pub sent: u64,
    pub delivered: u64,
    pub failed: u64,
    pub pending: u64,
}

impl CampaignStatusReport {
    /// Whether polling for this campaign can stop.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// One personalized message sample from the preview endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignPreview {
    pub campaign_id: i64,
    pub recipient: String,
    pub rendered_message: String,
}

/// Invalidation after creating a campaign: the list is stale; the new
/// campaign has no cached detail yet.
pub fn after_create() -> impl InvalidationRule {
    StaticTargets(vec![InvalidationTarget::Key(campaigns_key())])
}

/// Invalidation after creating a campaign when the detail key for the new id
/// should be staled too; the id is extracted from the mutation result.
pub fn after_create_with_id() -> impl InvalidationRule {
    RuleFn(|result: &Value| {
        let id = result
            .get("id")
            .and_then(Value::as_i64)
            .ok_or_else(|| SyncError::Invalidation {
                message: "create result carries no campaign id".into(),
            })?;
        Ok(vec![
            InvalidationTarget::Key(campaigns_key()),
            InvalidationTarget::Key(campaign_key(id)),
        ])
    })
}

/// Invalidation after deleting a campaign: everything cached for the
/// resource might reference it.
pub fn after_delete() -> impl InvalidationRule {
    StaticTargets(vec![
        InvalidationTarget::Resource(CAMPAIGN_RESOURCE.into()),
        InvalidationTarget::Resource(CAMPAIGN_STATUS_RESOURCE.into()),
    ])
}

/// Invalidation after updating, pausing or launching a campaign: the list
/// plus that campaign's detail and status keys.
pub fn after_change(id: i64) -> impl InvalidationRule {
    StaticTargets(vec![
        InvalidationTarget::Key(campaigns_key()),
        InvalidationTarget::Key(campaign_key(id)),
        InvalidationTarget::Key(campaign_status_key(id)),
    ])
}
