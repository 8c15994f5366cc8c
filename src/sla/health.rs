//! SLA health classification.
//!
//! Pure function of (ticket snapshot, deadlines, settings, now): no clock
//! reads, no store lookups, so the same inputs always classify the same
//! way. Health is recomputed on every read; nothing caches it.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::SlaSettings;
use crate::itsm::repository::TicketSnapshot;
use crate::sla::deadlines::SlaDeadlines;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlaHealth {
    OnTrack,
    AtRisk,
    Breached,
    NotApplicable,
}

impl SlaHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnTrack => "on_track",
            Self::AtRisk => "at_risk",
            Self::Breached => "breached",
            Self::NotApplicable => "not_applicable",
        }
    }
}

/// Derived view over a ticket and its resolved policy. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlaTracking {
    pub health: SlaHealth,
    pub is_breached_response: bool,
    pub is_breached_resolution: bool,
    pub response_due_at: Option<DateTime<Utc>>,
    pub resolution_due_at: Option<DateTime<Utc>>,
    pub escalation_due_at: Option<DateTime<Utc>>,
}

impl SlaTracking {
    /// Tracking for a ticket with no applicable policy. Not an error state:
    /// an unconfigured (client type, priority) pair simply has no SLA.
    pub fn not_applicable() -> Self {
        Self {
            health: SlaHealth::NotApplicable,
            is_breached_response: false,
            is_breached_resolution: false,
            response_due_at: None,
            resolution_due_at: None,
            escalation_due_at: None,
        }
    }
}

/// True when `now` sits inside the warning band before `due`. The band is
/// either a fixed number of minutes or a fraction of the deadline's full
/// window measured from `anchor` (ticket creation).
fn within_warning(
    anchor: DateTime<Utc>,
    due: DateTime<Utc>,
    now: DateTime<Utc>,
    settings: &SlaSettings,
) -> bool {
    if now > due {
        return false;
    }
    let lead = match settings.warning_window_minutes {
        Some(minutes) => Duration::minutes(minutes),
        None => {
            let window = due - anchor;
            if window <= Duration::zero() {
                return true;
            }
            Duration::seconds((window.num_seconds() as f64 * settings.warning_fraction) as i64)
        }
    };
    now >= due - lead
}

/// Classify the ticket's SLA state against its deadlines.
///
/// `is_terminal` is decided by the caller from the kind's status table; a
/// closed-out ticket is judged on where its timestamps landed and can only
/// be on-track or breached, never at-risk. Open tickets feed both the
/// response clock (until first assignment) and the resolution clock into
/// the at-risk window.
pub fn classify(
    snapshot: &TicketSnapshot,
    is_terminal: bool,
    deadlines: &SlaDeadlines,
    settings: &SlaSettings,
    now: DateTime<Utc>,
) -> SlaTracking {
    let base = |health, response, resolution| SlaTracking {
        health,
        is_breached_response: response,
        is_breached_resolution: resolution,
        response_due_at: Some(deadlines.response_due_at),
        resolution_due_at: Some(deadlines.resolution_due_at),
        escalation_due_at: Some(deadlines.escalation_due_at),
    };

    if is_terminal {
        let done_at = snapshot.terminal_at.unwrap_or(now);
        let is_breached_resolution = done_at > deadlines.resolution_due_at;
        let is_breached_response =
            snapshot.assigned_at.unwrap_or(done_at) > deadlines.response_due_at;
        let health = if is_breached_response || is_breached_resolution {
            SlaHealth::Breached
        } else {
            SlaHealth::OnTrack
        };
        return base(health, is_breached_response, is_breached_resolution);
    }

    let is_breached_response = match snapshot.assigned_at {
        None => now > deadlines.response_due_at,
        Some(assigned_at) => assigned_at > deadlines.response_due_at,
    };
    let is_breached_resolution = now > deadlines.resolution_due_at;

    let health = if is_breached_response || is_breached_resolution {
        SlaHealth::Breached
    } else {
        let response_pending = snapshot.assigned_at.is_none();
        let near_response = response_pending
            && within_warning(snapshot.created_at, deadlines.response_due_at, now, settings);
        let near_resolution =
            within_warning(snapshot.created_at, deadlines.resolution_due_at, now, settings);
        if near_response || near_resolution {
            SlaHealth::AtRisk
        } else {
            SlaHealth::OnTrack
        }
    };
    base(health, is_breached_response, is_breached_resolution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::itsm::testing::{make_policy, make_snapshot};
    use crate::itsm::types::{ClientType, Priority, TicketKind};
    use crate::sla::deadlines::compute_deadlines;

    #[test]
    fn fixed_warning_window_overrides_fraction() {
        let settings = SlaSettings {
            warning_fraction: 0.2,
            warning_window_minutes: Some(30),
        };
        let policy = make_policy(ClientType::Direct, Priority::Low, 48, 96, 48);
        let mut snapshot = make_snapshot(TicketKind::Incident, "open");
        // Pretend first response already happened so only the resolution
        // clock feeds the warning band.
        snapshot.assigned_to = Some(uuid::Uuid::new_v4());
        snapshot.assigned_at = Some(snapshot.created_at);
        let deadlines = compute_deadlines(&policy, snapshot.created_at, snapshot.assigned_at);

        let calm = deadlines.resolution_due_at - Duration::minutes(31);
        assert_eq!(
            classify(&snapshot, false, &deadlines, &settings, calm).health,
            SlaHealth::OnTrack
        );
        let tense = deadlines.resolution_due_at - Duration::minutes(29);
        assert_eq!(
            classify(&snapshot, false, &deadlines, &settings, tense).health,
            SlaHealth::AtRisk
        );
    }

    #[test]
    fn inverted_policy_windows_do_not_panic() {
        // Admin-configured response window longer than the resolution
        // window is legal input and must classify, not crash.
        let policy = make_policy(ClientType::ViaEsn, Priority::Medium, 8, 2, 4);
        let snapshot = make_snapshot(TicketKind::ServiceRequest, "open");
        let deadlines = compute_deadlines(&policy, snapshot.created_at, None);
        let now = snapshot.created_at + Duration::hours(3);
        let tracking = classify(&snapshot, false, &deadlines, &SlaSettings::default(), now);
        assert!(tracking.is_breached_resolution);
        assert!(!tracking.is_breached_response);
        assert_eq!(tracking.health, SlaHealth::Breached);
    }
}
