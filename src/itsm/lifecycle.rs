//! Ticket status lifecycle.
//!
//! One table-driven engine covers incidents, change requests, and service
//! requests; the status enums in [`crate::itsm::types`] supply the edges.
//! Illegal transitions are rejected with `InvalidTransition`, never clamped
//! to the current status.

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::itsm::error::ItsmError;
use crate::itsm::repository::{TicketPatch, TicketRepository, TicketSnapshot};
use crate::itsm::types::{
    ChangeStatus, IncidentStatus, ServiceRequestStatus, TicketKind, TicketState,
};

/// What a validated status change will do once persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionPlan {
    /// Canonical status string to write.
    pub target: String,
    pub enters_terminal: bool,
    /// Write the kind's terminal timestamp. False when the stamp already
    /// exists: re-entering a terminal state never rewrites it.
    pub stamp_terminal: bool,
    /// Incidents entering `closed` with no `closed_at` yet.
    pub stamp_closed: bool,
}

fn plan_with<S: TicketState>(
    snapshot: &TicketSnapshot,
    target_str: &str,
) -> Result<TransitionPlan, ItsmError> {
    let current = S::parse(&snapshot.status).ok_or_else(|| {
        ItsmError::Validation(format!(
            "{} {} carries unknown status '{}'",
            snapshot.kind.as_str(),
            snapshot.id,
            snapshot.status
        ))
    })?;
    let target = S::parse(target_str).ok_or_else(|| {
        ItsmError::Validation(format!(
            "'{}' is not a {} status",
            target_str,
            snapshot.kind.as_str()
        ))
    })?;

    if !current.next_states().contains(&target) {
        return Err(ItsmError::InvalidTransition {
            from: current.as_str().to_string(),
            to: target.as_str().to_string(),
        });
    }

    let enters_terminal = target.is_terminal();
    Ok(TransitionPlan {
        target: target.as_str().to_string(),
        enters_terminal,
        stamp_terminal: enters_terminal && snapshot.terminal_at.is_none(),
        stamp_closed: false,
    })
}

/// Validate `target` against the snapshot's transition table and decide
/// which timestamps the transition will write. Pure; persistence happens in
/// [`transition_ticket`].
pub fn plan_transition(
    snapshot: &TicketSnapshot,
    target: &str,
) -> Result<TransitionPlan, ItsmError> {
    let mut plan = match snapshot.kind {
        TicketKind::Incident => plan_with::<IncidentStatus>(snapshot, target)?,
        TicketKind::ChangeRequest => plan_with::<ChangeStatus>(snapshot, target)?,
        TicketKind::ServiceRequest => plan_with::<ServiceRequestStatus>(snapshot, target)?,
    };
    if snapshot.kind == TicketKind::Incident
        && plan.target == "closed"
        && snapshot.closed_at.is_none()
    {
        plan.stamp_closed = true;
    }
    Ok(plan)
}

/// True when `status` is terminal for `kind`. Unknown status strings are a
/// validation error, not a guess.
pub fn status_is_terminal(kind: TicketKind, status: &str) -> Result<bool, ItsmError> {
    let unknown = || {
        ItsmError::Validation(format!("'{status}' is not a {} status", kind.as_str()))
    };
    match kind {
        TicketKind::Incident => IncidentStatus::parse(status)
            .map(|s| s.is_terminal())
            .ok_or_else(unknown),
        TicketKind::ChangeRequest => ChangeStatus::parse(status)
            .map(|s| s.is_terminal())
            .ok_or_else(unknown),
        TicketKind::ServiceRequest => ServiceRequestStatus::parse(status)
            .map(|s| s.is_terminal())
            .ok_or_else(unknown),
    }
}

/// Load, validate, stamp, persist. `NotFound` and `Conflict` from the
/// repository pass through unchanged.
pub fn transition_ticket(
    repo: &dyn TicketRepository,
    kind: TicketKind,
    id: Uuid,
    target: &str,
    now: DateTime<Utc>,
) -> Result<TicketSnapshot, ItsmError> {
    let snapshot = repo.get(kind, id)?;
    let plan = plan_transition(&snapshot, target)?;

    let mut patch = TicketPatch::new(kind, id);
    patch.status = Some(plan.target.clone());
    if plan.stamp_terminal {
        patch.terminal_at = Some(now);
    }
    if plan.stamp_closed {
        patch.closed_at = Some(now);
    }
    let updated = repo.update(&patch, snapshot.updated_at)?;
    info!(
        kind = kind.as_str(),
        ticket = %id,
        from = %snapshot.status,
        to = %plan.target,
        "ticket status changed"
    );
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::itsm::testing::make_snapshot;

    #[test]
    fn rejects_skipping_approval() {
        let snapshot = make_snapshot(TicketKind::ChangeRequest, "draft");
        let err = plan_transition(&snapshot, "implemented").unwrap_err();
        assert!(matches!(err, ItsmError::InvalidTransition { .. }));
    }

    #[test]
    fn terminal_reentry_keeps_stamp() {
        let snapshot = make_snapshot(TicketKind::ServiceRequest, "resolved");
        let plan = plan_transition(&snapshot, "resolved").unwrap();
        assert!(plan.enters_terminal);
        assert!(!plan.stamp_terminal);
    }

    #[test]
    fn incident_close_after_resolve_stamps_closed_only() {
        let snapshot = make_snapshot(TicketKind::Incident, "resolved");
        let plan = plan_transition(&snapshot, "closed").unwrap();
        assert!(!plan.stamp_terminal);
        assert!(plan.stamp_closed);
    }

    #[test]
    fn unknown_target_is_validation_not_transition() {
        let snapshot = make_snapshot(TicketKind::Incident, "open");
        let err = plan_transition(&snapshot, "pending_approval").unwrap_err();
        assert!(matches!(err, ItsmError::Validation(_)));
    }
}
