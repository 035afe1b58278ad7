// Dashboard data aggregator
//
// Fetches receipts, environmental impact and spending analytics concurrently
// and commits them as one snapshot. All three requests are started together
// and all three are awaited before anything is decided; only when every one
// succeeded is the snapshot replaced. A failure anywhere keeps the previous
// snapshot whole, so the dashboard never shows fresh receipts next to stale
// analytics. A 401 on any of the three counts as a failure too: the gateway
// answers it with an empty result, which must not be committed.

use chrono::{DateTime, Utc};
use std::time::Instant;

use crate::api::{ApiClient, ApiError};
use crate::models::{EnvironmentalImpact, Receipt, SpendingAnalytics};

/// Everything the dashboard shows, replaced as a unit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardSnapshot {
    pub receipts: Vec<Receipt>,
    pub impact: Option<EnvironmentalImpact>,
    pub analytics: Option<SpendingAnalytics>,
}

impl DashboardSnapshot {
    pub fn is_empty(&self) -> bool {
        self.receipts.is_empty() && self.impact.is_none() && self.analytics.is_none()
    }
}

/// What a refresh did to the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// All three fetches succeeded and the snapshot was replaced
    Applied,
    /// At least one fetch failed; the previous snapshot is untouched
    Retained,
    /// No active session, nothing was fetched
    Skipped,
}

/// Cached dashboard data for the current session
#[derive(Debug, Default)]
pub struct Dashboard {
    snapshot: DashboardSnapshot,
    refreshed_at: Option<DateTime<Utc>>,
}

impl Dashboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> &DashboardSnapshot {
        &self.snapshot
    }

    pub fn receipts(&self) -> &[Receipt] {
        &self.snapshot.receipts
    }

    pub fn impact(&self) -> Option<&EnvironmentalImpact> {
        self.snapshot.impact.as_ref()
    }

    pub fn analytics(&self) -> Option<&SpendingAnalytics> {
        self.snapshot.analytics.as_ref()
    }

    /// When the snapshot was last committed
    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }

    /// Fan out the three fetches, wait for all, commit only on full success.
    ///
    /// Failures are logged, not returned: stale-but-present data beats an
    /// empty dashboard.
    pub async fn refresh(&mut self, api: &ApiClient) -> RefreshOutcome {
        let start = Instant::now();
        let teardown = api.gateway().subscribe_teardown();

        // join!, not try_join!: a rejection must not cancel a sibling that may
        // still be delivering a 401 the gateway has to see
        let (receipts, impact, analytics) = futures::join!(
            api.get_receipts(),
            api.get_environmental_impact(),
            api.get_spending_analytics()
        );

        if teardown.has_changed().unwrap_or(false) {
            tracing::warn!("Session ended during dashboard refresh, keeping previous data");
            return RefreshOutcome::Retained;
        }

        match combine(receipts, impact, analytics) {
            Ok(snapshot) => {
                tracing::info!(
                    "Dashboard refreshed: {} receipts in {:?}",
                    snapshot.receipts.len(),
                    start.elapsed()
                );
                self.snapshot = snapshot;
                self.refreshed_at = Some(Utc::now());
                RefreshOutcome::Applied
            }
            Err(e) => {
                tracing::warn!("Dashboard refresh failed, keeping previous data: {}", e);
                RefreshOutcome::Retained
            }
        }
    }

    /// Drop all cached data (logout / teardown)
    pub fn clear(&mut self) {
        self.snapshot = DashboardSnapshot::default();
        self.refreshed_at = None;
    }
}

fn combine(
    receipts: Result<Vec<Receipt>, ApiError>,
    impact: Result<Option<EnvironmentalImpact>, ApiError>,
    analytics: Result<Option<SpendingAnalytics>, ApiError>,
) -> Result<DashboardSnapshot, ApiError> {
    Ok(DashboardSnapshot {
        receipts: receipts?,
        impact: impact?,
        analytics: analytics?,
    })
}
