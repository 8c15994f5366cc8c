//! Ticket assignment.
//!
//! Assignment and status are orthogonal: nothing here touches the status
//! column, and the lifecycle engine never touches the assignee. The only
//! coupling is read-only — `assigned_at` feeds the SLA response clock.

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::itsm::error::ItsmError;
use crate::itsm::lifecycle::status_is_terminal;
use crate::itsm::repository::{TicketPatch, TicketRepository, TicketSnapshot};
use crate::itsm::types::TicketKind;

fn ensure_open(snapshot: &TicketSnapshot) -> Result<(), ItsmError> {
    if status_is_terminal(snapshot.kind, &snapshot.status)? {
        return Err(ItsmError::Validation(format!(
            "{} {} is {}; assignment is immutable on closed-out tickets",
            snapshot.kind.as_str(),
            snapshot.id,
            snapshot.status
        )));
    }
    Ok(())
}

/// Assign the ticket to `user_id`, stamping `assigned_at`. Reassigning to
/// the current assignee is a no-op and keeps the original stamp.
pub fn assign_ticket(
    repo: &dyn TicketRepository,
    kind: TicketKind,
    id: Uuid,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<TicketSnapshot, ItsmError> {
    let snapshot = repo.get(kind, id)?;
    ensure_open(&snapshot)?;
    if snapshot.assigned_to == Some(user_id) {
        return Ok(snapshot);
    }

    let mut patch = TicketPatch::new(kind, id);
    patch.assigned_to = Some(Some(user_id));
    patch.assigned_at = Some(Some(now));
    let updated = repo.update(&patch, snapshot.updated_at)?;
    info!(kind = kind.as_str(), ticket = %id, assignee = %user_id, "ticket assigned");
    Ok(updated)
}

/// Clear both assignment fields. Only legal while the ticket is still open;
/// unassigning an unassigned ticket is a no-op.
pub fn unassign_ticket(
    repo: &dyn TicketRepository,
    kind: TicketKind,
    id: Uuid,
) -> Result<TicketSnapshot, ItsmError> {
    let snapshot = repo.get(kind, id)?;
    ensure_open(&snapshot)?;
    if snapshot.assigned_to.is_none() {
        return Ok(snapshot);
    }

    let mut patch = TicketPatch::new(kind, id);
    patch.assigned_to = Some(None);
    patch.assigned_at = Some(None);
    let updated = repo.update(&patch, snapshot.updated_at)?;
    info!(kind = kind.as_str(), ticket = %id, "ticket unassigned");
    Ok(updated)
}
