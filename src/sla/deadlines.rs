//! Deadline math.
//!
//! All offsets are wall-clock hours; there is no business-hours calendar.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::sla::SlaPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlaDeadlines {
    pub response_due_at: DateTime<Utc>,
    pub resolution_due_at: DateTime<Utc>,
    pub escalation_due_at: DateTime<Utc>,
}

/// Response and resolution clocks run from creation. The escalation clock
/// re-anchors to the assignment instant once somebody owns the ticket:
/// escalation is about stalled ownership, not raw age.
pub fn compute_deadlines(
    policy: &SlaPolicy,
    created_at: DateTime<Utc>,
    assigned_at: Option<DateTime<Utc>>,
) -> SlaDeadlines {
    let escalation_anchor = assigned_at.unwrap_or(created_at);
    SlaDeadlines {
        response_due_at: created_at + Duration::hours(i64::from(policy.response_time_hours)),
        resolution_due_at: created_at + Duration::hours(i64::from(policy.resolution_time_hours)),
        escalation_due_at: escalation_anchor
            + Duration::hours(i64::from(policy.escalation_time_hours)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::itsm::testing::make_policy;
    use crate::itsm::types::{ClientType, Priority};

    #[test]
    fn escalation_re_anchors_on_assignment() {
        let policy = make_policy(ClientType::Direct, Priority::High, 1, 8, 2);
        let created = Utc::now();
        let unassigned = compute_deadlines(&policy, created, None);
        assert_eq!(unassigned.escalation_due_at, created + Duration::hours(2));

        let assigned = created + Duration::minutes(45);
        let after = compute_deadlines(&policy, created, Some(assigned));
        assert_eq!(after.escalation_due_at, assigned + Duration::hours(2));
        // Response and resolution clocks never move.
        assert_eq!(after.response_due_at, unassigned.response_due_at);
        assert_eq!(after.resolution_due_at, unassigned.resolution_due_at);
    }
}
