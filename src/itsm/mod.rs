//! ITSM module: incidents, change requests, and service requests.
//!
//! One set of handlers serves all three collections; the `:kind` path
//! segment picks the table. Status changes go through the lifecycle engine,
//! assignment through the assignment manager, and the SLA badge endpoint
//! recomputes tracking on every read.

pub mod assignment;
pub mod error;
pub mod lifecycle;
pub mod repository;
pub mod testing;
pub mod types;

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{get, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::directory::{DieselTeamDirectory, TeamDirectory};
use crate::itsm::error::ItsmError;
use crate::itsm::repository::{
    DieselTicketRepository, NewTicket, TicketFilter, TicketPatch, TicketRepository, TicketSnapshot,
};
use crate::itsm::types::{Priority, TicketKind};
use crate::shared::state::AppState;
use crate::sla::{track_ticket, DieselPolicyStore, SlaHealth, SlaTracking};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTicketRequest {
    pub team_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub metadata: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateTicketRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub metadata: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangeStatusRequest {
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssignTicketRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct TicketResponse {
    pub id: Uuid,
    pub kind: TicketKind,
    pub team_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: String,
    pub assigned_to: Option<Uuid>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub terminal_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    pub metadata: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<TicketSnapshot> for TicketResponse {
    fn from(s: TicketSnapshot) -> Self {
        Self {
            id: s.id,
            kind: s.kind,
            team_id: s.team_id,
            title: s.title,
            description: s.description,
            status: s.status,
            priority: s.priority,
            assigned_to: s.assigned_to,
            assigned_at: s.assigned_at,
            terminal_at: s.terminal_at,
            closed_at: s.closed_at,
            metadata: s.metadata,
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SlaTrackingResponse {
    pub ticket_id: Uuid,
    pub kind: TicketKind,
    pub policy_id: Option<Uuid>,
    pub policy_name: Option<String>,
    #[serde(flatten)]
    pub tracking: SlaTracking,
}

#[derive(Debug, Serialize)]
pub struct AttentionTicket {
    pub ticket: TicketResponse,
    #[serde(flatten)]
    pub tracking: SlaTracking,
}

fn parse_kind(segment: &str) -> Result<TicketKind, ItsmError> {
    TicketKind::from_path(segment)
        .ok_or_else(|| ItsmError::Validation(format!("unknown ticket collection '{segment}'")))
}

fn parse_priority(value: Option<&str>) -> Result<Priority, ItsmError> {
    match value {
        None => Ok(Priority::Medium),
        Some(raw) => Priority::parse(raw)
            .ok_or_else(|| ItsmError::Validation(format!("unknown priority '{raw}'"))),
    }
}

pub async fn create_ticket(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    Json(req): Json<CreateTicketRequest>,
) -> Result<Json<TicketResponse>, ItsmError> {
    let kind = parse_kind(&kind)?;
    let priority = parse_priority(req.priority.as_deref())?;
    if req.title.trim().is_empty() {
        return Err(ItsmError::Validation("title must not be empty".to_string()));
    }
    // Reject tickets pointing at teams the directory does not know.
    DieselTeamDirectory::new(state.conn.clone()).client_type_of(req.team_id)?;

    let repo = DieselTicketRepository::new(state.conn.clone());
    let snapshot = repo.create(NewTicket {
        kind,
        team_id: req.team_id,
        title: req.title,
        description: req.description,
        priority,
        metadata: req.metadata.unwrap_or_default(),
    })?;
    Ok(Json(snapshot.into()))
}

pub async fn list_tickets(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    Query(filter): Query<TicketFilter>,
) -> Result<Json<Vec<TicketResponse>>, ItsmError> {
    let kind = parse_kind(&kind)?;
    let repo = DieselTicketRepository::new(state.conn.clone());
    let snapshots = repo.list(kind, &filter)?;
    Ok(Json(snapshots.into_iter().map(Into::into).collect()))
}

pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    Path((kind, id)): Path<(String, Uuid)>,
) -> Result<Json<TicketResponse>, ItsmError> {
    let kind = parse_kind(&kind)?;
    let repo = DieselTicketRepository::new(state.conn.clone());
    Ok(Json(repo.get(kind, id)?.into()))
}

pub async fn update_ticket(
    State(state): State<Arc<AppState>>,
    Path((kind, id)): Path<(String, Uuid)>,
    Json(req): Json<UpdateTicketRequest>,
) -> Result<Json<TicketResponse>, ItsmError> {
    let kind = parse_kind(&kind)?;
    let repo = DieselTicketRepository::new(state.conn.clone());
    let snapshot = repo.get(kind, id)?;

    let mut patch = TicketPatch::new(kind, id);
    patch.title = req.title;
    patch.description = req.description;
    patch.metadata = req.metadata;
    if let Some(raw) = req.priority.as_deref() {
        patch.priority = Some(
            Priority::parse(raw)
                .ok_or_else(|| ItsmError::Validation(format!("unknown priority '{raw}'")))?,
        );
    }
    if let Some(title) = &patch.title {
        if title.trim().is_empty() {
            return Err(ItsmError::Validation("title must not be empty".to_string()));
        }
    }

    let updated = repo.update(&patch, snapshot.updated_at)?;
    Ok(Json(updated.into()))
}

pub async fn change_status(
    State(state): State<Arc<AppState>>,
    Path((kind, id)): Path<(String, Uuid)>,
    Json(req): Json<ChangeStatusRequest>,
) -> Result<Json<TicketResponse>, ItsmError> {
    let kind = parse_kind(&kind)?;
    let repo = DieselTicketRepository::new(state.conn.clone());
    let updated = lifecycle::transition_ticket(&repo, kind, id, &req.status, Utc::now())?;
    Ok(Json(updated.into()))
}

pub async fn assign_ticket(
    State(state): State<Arc<AppState>>,
    Path((kind, id)): Path<(String, Uuid)>,
    Json(req): Json<AssignTicketRequest>,
) -> Result<Json<TicketResponse>, ItsmError> {
    let kind = parse_kind(&kind)?;
    let repo = DieselTicketRepository::new(state.conn.clone());
    let updated = assignment::assign_ticket(&repo, kind, id, req.user_id, Utc::now())?;
    Ok(Json(updated.into()))
}

pub async fn unassign_ticket(
    State(state): State<Arc<AppState>>,
    Path((kind, id)): Path<(String, Uuid)>,
) -> Result<Json<TicketResponse>, ItsmError> {
    let kind = parse_kind(&kind)?;
    let repo = DieselTicketRepository::new(state.conn.clone());
    let updated = assignment::unassign_ticket(&repo, kind, id)?;
    Ok(Json(updated.into()))
}

pub async fn get_ticket_sla(
    State(state): State<Arc<AppState>>,
    Path((kind, id)): Path<(String, Uuid)>,
) -> Result<Json<SlaTrackingResponse>, ItsmError> {
    let kind = parse_kind(&kind)?;
    let repo = DieselTicketRepository::new(state.conn.clone());
    let snapshot = repo.get(kind, id)?;

    let directory = DieselTeamDirectory::new(state.conn.clone());
    let policies = DieselPolicyStore::new(state.conn.clone());
    let (policy, tracking) = track_ticket(
        &snapshot,
        &directory,
        &policies,
        &state.config.sla,
        Utc::now(),
    )?;

    Ok(Json(SlaTrackingResponse {
        ticket_id: snapshot.id,
        kind,
        policy_id: policy.as_ref().map(|p| p.id),
        policy_name: policy.map(|p| p.name),
        tracking,
    }))
}

/// Tickets whose computed health is at-risk or breached. Tickets that fail
/// to track (missing team, malformed stored fields) are skipped with a
/// warning instead of failing the whole listing.
pub async fn list_attention_tickets(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    Query(filter): Query<TicketFilter>,
) -> Result<Json<Vec<AttentionTicket>>, ItsmError> {
    let kind = parse_kind(&kind)?;
    let repo = DieselTicketRepository::new(state.conn.clone());
    let directory = DieselTeamDirectory::new(state.conn.clone());
    let policies = DieselPolicyStore::new(state.conn.clone());
    let now = Utc::now();

    let mut items = Vec::new();
    for snapshot in repo.list(kind, &filter)? {
        match track_ticket(&snapshot, &directory, &policies, &state.config.sla, now) {
            Ok((_, tracking)) => {
                if matches!(tracking.health, SlaHealth::AtRisk | SlaHealth::Breached) {
                    items.push(AttentionTicket {
                        ticket: snapshot.into(),
                        tracking,
                    });
                }
            }
            Err(e) => {
                warn!(kind = kind.as_str(), ticket = %snapshot.id, error = %e, "skipping untrackable ticket");
            }
        }
    }
    Ok(Json(items))
}

pub fn configure_itsm_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/itsm/:kind", get(list_tickets).post(create_ticket))
        .route("/api/itsm/:kind/attention", get(list_attention_tickets))
        .route("/api/itsm/:kind/:id", get(get_ticket).put(update_ticket))
        .route("/api/itsm/:kind/:id/status", put(change_status))
        .route("/api/itsm/:kind/:id/assign", put(assign_ticket))
        .route("/api/itsm/:kind/:id/unassign", put(unassign_ticket))
        .route("/api/itsm/:kind/:id/sla", get(get_ticket_sla))
}
