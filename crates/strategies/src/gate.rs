use crate::calendar::milestone_instant;
use crate::zone_history::{RefreshOutcome, ZoneHistoryStore};
use api_client::PriceFeed;
use chrono::{DateTime, NaiveTime, Utc};
use configuration::{FibonacciParams, ZoneHistoryParams};
use core_types::ZoneCode;
use std::collections::BTreeSet;

/// Decides whether a zone-gated session may open a new position.
///
/// The gating zone is the zone at the previous trading day's close. It is only
/// recomputed by [`ZoneGate::refresh`], so entry decisions between refreshes
/// never touch the network.
#[derive(Debug, Clone)]
pub struct ZoneGate {
    history: ZoneHistoryStore,
    inhibit: BTreeSet<ZoneCode>,
    current_zone: Option<ZoneCode>,
    milestone: NaiveTime,
}

impl ZoneGate {
    pub fn new(history: ZoneHistoryStore, fibonacci: &FibonacciParams, params: &ZoneHistoryParams) -> Self {
        Self {
            history,
            inhibit: fibonacci.inhibit_zones.iter().copied().collect(),
            current_zone: fibonacci.initial_zone,
            milestone: NaiveTime::from_hms_opt(params.milestone_hour, params.milestone_minute, 0)
                .unwrap_or(NaiveTime::MIN),
        }
    }

    pub fn history(&self) -> &ZoneHistoryStore {
        &self.history
    }

    pub fn current_zone(&self) -> Option<ZoneCode> {
        self.current_zone
    }

    pub fn is_inhibited(&self, zone: ZoneCode) -> bool {
        self.inhibit.contains(&zone)
    }

    /// An unknown zone never blocks an entry.
    pub fn allows_entry(&self) -> bool {
        self.current_zone.is_none_or(|zone| !self.is_inhibited(zone))
    }

    /// Refreshes the history and re-reads the zone at the last milestone.
    ///
    /// While the history is empty the previous gating zone is kept.
    pub async fn refresh(&mut self, feed: &dyn PriceFeed, now: DateTime<Utc>) -> Option<ZoneCode> {
        let outcome = self.history.refresh(feed, now).await;
        if self.history.is_empty() {
            tracing::warn!(?outcome, zone = ?self.current_zone, "Zone history is empty, gating zone unchanged");
            return self.current_zone;
        }

        let local_now = now.with_timezone(&self.history.timezone());
        let milestone = milestone_instant(local_now, self.milestone);
        let zone = self.history.zone_near(milestone);
        if zone != self.current_zone {
            tracing::info!(
                previous = ?self.current_zone,
                current = ?zone,
                %milestone,
                "Gating zone changed"
            );
        } else if matches!(outcome, RefreshOutcome::Merged { .. }) {
            tracing::debug!(zone = ?zone, %milestone, "Gating zone confirmed");
        }
        self.current_zone = zone;
        zone
    }
}
