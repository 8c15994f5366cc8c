//! Lifecycle and assignment behaviour over the in-memory repository:
//! transition tables, terminal stamping, assignment rules, and the
//! optimistic-concurrency guard.

use std::collections::BTreeMap;

use chrono::{Duration, Utc};
use uuid::Uuid;

use deskserver::itsm::assignment::{assign_ticket, unassign_ticket};
use deskserver::itsm::error::ItsmError;
use deskserver::itsm::lifecycle::{plan_transition, transition_ticket};
use deskserver::itsm::repository::{NewTicket, TicketPatch, TicketRepository};
use deskserver::itsm::testing::{make_snapshot, InMemoryTicketRepository};
use deskserver::itsm::types::{Priority, TicketKind};

fn new_ticket(kind: TicketKind) -> NewTicket {
    NewTicket {
        kind,
        team_id: Uuid::new_v4(),
        title: "printer on fire".to_string(),
        description: Some("third floor".to_string()),
        priority: Priority::High,
        metadata: BTreeMap::new(),
    }
}

/// Sweep every (status, target) pair against the explicit edge list: a pair
/// either plans cleanly or comes back `InvalidTransition` — an illegal pair
/// is never waved through as a no-op.
fn sweep(kind: TicketKind, statuses: &[&str], legal: &[(&str, &str)]) {
    for from in statuses {
        let snapshot = make_snapshot(kind, from);
        for to in statuses {
            let result = plan_transition(&snapshot, to);
            if legal.contains(&(from, to)) {
                let plan = result.unwrap_or_else(|e| {
                    panic!("{} {from} -> {to} should be legal: {e}", kind.as_str())
                });
                assert_eq!(plan.target, *to);
            } else {
                match result {
                    Err(ItsmError::InvalidTransition { .. }) => {}
                    other => panic!(
                        "{} {from} -> {to} should be rejected, got {other:?}",
                        kind.as_str()
                    ),
                }
            }
        }
    }
}

#[test]
fn incident_transition_table_is_exhaustive() {
    sweep(
        TicketKind::Incident,
        &["open", "in_progress", "resolved", "closed"],
        &[
            ("open", "in_progress"),
            ("open", "resolved"),
            ("open", "closed"),
            ("in_progress", "resolved"),
            ("in_progress", "closed"),
            ("resolved", "resolved"),
            ("resolved", "closed"),
            ("closed", "closed"),
        ],
    );
}

#[test]
fn change_request_transition_table_is_exhaustive() {
    sweep(
        TicketKind::ChangeRequest,
        &[
            "draft",
            "pending_approval",
            "approved",
            "rejected",
            "implemented",
            "failed",
        ],
        &[
            ("draft", "pending_approval"),
            ("pending_approval", "approved"),
            ("pending_approval", "rejected"),
            ("approved", "implemented"),
            ("approved", "failed"),
            ("rejected", "rejected"),
            ("implemented", "implemented"),
            ("failed", "failed"),
        ],
    );
}

#[test]
fn service_request_transition_table_is_exhaustive() {
    sweep(
        TicketKind::ServiceRequest,
        &["open", "in_progress", "resolved", "closed", "cancelled"],
        &[
            ("open", "in_progress"),
            ("open", "resolved"),
            ("open", "closed"),
            ("open", "cancelled"),
            ("in_progress", "resolved"),
            ("in_progress", "closed"),
            ("in_progress", "cancelled"),
            ("resolved", "resolved"),
            ("closed", "closed"),
            ("cancelled", "cancelled"),
        ],
    );
}

#[test]
fn draft_change_cannot_skip_to_implemented() {
    let repo = InMemoryTicketRepository::new();
    let created = repo.create(new_ticket(TicketKind::ChangeRequest)).unwrap();
    assert_eq!(created.status, "draft");

    let err = transition_ticket(
        &repo,
        TicketKind::ChangeRequest,
        created.id,
        "implemented",
        Utc::now(),
    )
    .unwrap_err();
    assert!(matches!(err, ItsmError::InvalidTransition { .. }));

    let submitted = transition_ticket(
        &repo,
        TicketKind::ChangeRequest,
        created.id,
        "pending_approval",
        Utc::now(),
    )
    .unwrap();
    assert_eq!(submitted.status, "pending_approval");
    assert!(submitted.terminal_at.is_none());
}

#[test]
fn terminal_stamp_is_written_once() {
    let repo = InMemoryTicketRepository::new();
    let created = repo.create(new_ticket(TicketKind::Incident)).unwrap();
    let t0 = created.created_at;

    let resolved = transition_ticket(
        &repo,
        TicketKind::Incident,
        created.id,
        "resolved",
        t0 + Duration::hours(2),
    )
    .unwrap();
    assert_eq!(resolved.terminal_at, Some(t0 + Duration::hours(2)));
    assert_eq!(resolved.closed_at, None);

    // Closing later keeps the resolution stamp and adds the closure stamp.
    let closed = transition_ticket(
        &repo,
        TicketKind::Incident,
        created.id,
        "closed",
        t0 + Duration::hours(5),
    )
    .unwrap();
    assert_eq!(closed.terminal_at, Some(t0 + Duration::hours(2)));
    assert_eq!(closed.closed_at, Some(t0 + Duration::hours(5)));
}

#[test]
fn incident_closed_without_resolution_still_gets_a_terminal_stamp() {
    let repo = InMemoryTicketRepository::new();
    let created = repo.create(new_ticket(TicketKind::Incident)).unwrap();
    let at = created.created_at + Duration::minutes(10);

    let closed = transition_ticket(&repo, TicketKind::Incident, created.id, "closed", at).unwrap();
    assert_eq!(closed.status, "closed");
    assert_eq!(closed.terminal_at, Some(at));
    assert_eq!(closed.closed_at, Some(at));
}

#[test]
fn no_way_back_out_of_terminal_states() {
    let repo = InMemoryTicketRepository::new();
    let created = repo.create(new_ticket(TicketKind::ServiceRequest)).unwrap();
    transition_ticket(
        &repo,
        TicketKind::ServiceRequest,
        created.id,
        "cancelled",
        Utc::now(),
    )
    .unwrap();

    for target in ["open", "in_progress", "resolved"] {
        let err = transition_ticket(
            &repo,
            TicketKind::ServiceRequest,
            created.id,
            target,
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, ItsmError::InvalidTransition { .. }));
    }
}

#[test]
fn assignment_sets_and_clears_both_fields_together() {
    let repo = InMemoryTicketRepository::new();
    let created = repo.create(new_ticket(TicketKind::Incident)).unwrap();
    assert_eq!(created.assigned_to, None);
    assert_eq!(created.assigned_at, None);

    let user = Uuid::new_v4();
    let now = Utc::now();
    let assigned = assign_ticket(&repo, TicketKind::Incident, created.id, user, now).unwrap();
    assert_eq!(assigned.assigned_to, Some(user));
    assert_eq!(assigned.assigned_at, Some(now));

    let cleared = unassign_ticket(&repo, TicketKind::Incident, created.id).unwrap();
    assert_eq!(cleared.assigned_to, None);
    assert_eq!(cleared.assigned_at, None);
}

#[test]
fn reassigning_the_same_user_is_a_no_op() {
    let repo = InMemoryTicketRepository::new();
    let created = repo.create(new_ticket(TicketKind::ServiceRequest)).unwrap();
    let user = Uuid::new_v4();
    let first = Utc::now();

    let assigned =
        assign_ticket(&repo, TicketKind::ServiceRequest, created.id, user, first).unwrap();
    let again = assign_ticket(
        &repo,
        TicketKind::ServiceRequest,
        created.id,
        user,
        first + Duration::hours(1),
    )
    .unwrap();
    assert_eq!(again.assigned_at, Some(first));
    assert_eq!(again.updated_at, assigned.updated_at);

    // A different user does take over, with a fresh stamp.
    let other = Uuid::new_v4();
    let handover = first + Duration::hours(2);
    let reassigned =
        assign_ticket(&repo, TicketKind::ServiceRequest, created.id, other, handover).unwrap();
    assert_eq!(reassigned.assigned_to, Some(other));
    assert_eq!(reassigned.assigned_at, Some(handover));
}

#[test]
fn assignment_is_frozen_on_terminal_tickets() {
    let repo = InMemoryTicketRepository::new();
    let created = repo.create(new_ticket(TicketKind::Incident)).unwrap();
    let user = Uuid::new_v4();
    assign_ticket(&repo, TicketKind::Incident, created.id, user, Utc::now()).unwrap();
    transition_ticket(&repo, TicketKind::Incident, created.id, "resolved", Utc::now()).unwrap();

    let err = unassign_ticket(&repo, TicketKind::Incident, created.id).unwrap_err();
    assert!(matches!(err, ItsmError::Validation(_)));

    let err = assign_ticket(
        &repo,
        TicketKind::Incident,
        created.id,
        Uuid::new_v4(),
        Utc::now(),
    )
    .unwrap_err();
    assert!(matches!(err, ItsmError::Validation(_)));

    // The original assignment survives untouched.
    let snapshot = repo.get(TicketKind::Incident, created.id).unwrap();
    assert_eq!(snapshot.assigned_to, Some(user));
}

#[test]
fn stale_writers_get_a_conflict() {
    let repo = InMemoryTicketRepository::new();
    let created = repo.create(new_ticket(TicketKind::ChangeRequest)).unwrap();

    let mut patch = TicketPatch::new(TicketKind::ChangeRequest, created.id);
    patch.title = Some("rename the change".to_string());
    let stale = created.updated_at - Duration::seconds(1);
    let err = repo.update(&patch, stale).unwrap_err();
    assert!(matches!(err, ItsmError::Conflict(_)));

    // With the timestamp the caller actually read, the same patch lands.
    let updated = repo.update(&patch, created.updated_at).unwrap();
    assert_eq!(updated.title, "rename the change");
}

#[test]
fn unknown_tickets_surface_not_found() {
    let repo = InMemoryTicketRepository::new();
    let err = repo.get(TicketKind::Incident, Uuid::new_v4()).unwrap_err();
    assert!(matches!(err, ItsmError::NotFound(_)));

    let err =
        transition_ticket(&repo, TicketKind::Incident, Uuid::new_v4(), "resolved", Utc::now())
            .unwrap_err();
    assert!(matches!(err, ItsmError::NotFound(_)));
}

#[test]
fn each_kind_starts_in_its_own_initial_status() {
    let repo = InMemoryTicketRepository::new();
    assert_eq!(
        repo.create(new_ticket(TicketKind::Incident)).unwrap().status,
        "open"
    );
    assert_eq!(
        repo.create(new_ticket(TicketKind::ChangeRequest))
            .unwrap()
            .status,
        "draft"
    );
    assert_eq!(
        repo.create(new_ticket(TicketKind::ServiceRequest))
            .unwrap()
            .status,
        "open"
    );
}
