//! SLA policies and tracking.
//!
//! Policies are keyed by (client relationship type, priority) and carry the
//! response / resolution / escalation targets in wall-clock hours. Tracking
//! is derived on demand: resolve the policy, compute deadlines, classify —
//! nothing is stored back.

pub mod deadlines;
pub mod health;
pub mod resolver;

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{get, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::config::SlaSettings;
use crate::directory::TeamDirectory;
use crate::itsm::error::ItsmError;
use crate::itsm::lifecycle::status_is_terminal;
use crate::itsm::repository::TicketSnapshot;
use crate::itsm::types::{ClientType, Priority};
use crate::shared::schema::sla_policies;
use crate::shared::state::AppState;

pub use deadlines::{compute_deadlines, SlaDeadlines};
pub use health::{classify, SlaHealth, SlaTracking};
pub use resolver::{resolve_policy, DieselPolicyStore, PolicyStore};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = sla_policies)]
pub struct SlaPolicy {
    pub id: Uuid,
    pub name: String,
    pub client_type: String,
    pub priority: String,
    pub response_time_hours: i32,
    pub resolution_time_hours: i32,
    pub escalation_time_hours: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Full read path for one ticket: owning team -> client type, (client type,
/// priority) -> policy, policy -> deadlines -> tracking. A missing policy
/// renders as `not_applicable`; a missing team is a real `NotFound`.
pub fn track_ticket(
    snapshot: &TicketSnapshot,
    directory: &dyn TeamDirectory,
    policies: &dyn PolicyStore,
    settings: &SlaSettings,
    now: DateTime<Utc>,
) -> Result<(Option<SlaPolicy>, SlaTracking), ItsmError> {
    let priority = Priority::parse(&snapshot.priority).ok_or_else(|| {
        ItsmError::Validation(format!(
            "{} {} carries unknown priority '{}'",
            snapshot.kind.as_str(),
            snapshot.id,
            snapshot.priority
        ))
    })?;
    let is_terminal = status_is_terminal(snapshot.kind, &snapshot.status)?;
    let client_type = directory.client_type_of(snapshot.team_id)?;

    let active = policies.list_active()?;
    match resolve_policy(&active, client_type, priority) {
        Some(policy) => {
            let due = compute_deadlines(&policy, snapshot.created_at, snapshot.assigned_at);
            let tracking = classify(snapshot, is_terminal, &due, settings, now);
            Ok((Some(policy), tracking))
        }
        None => Ok((None, SlaTracking::not_applicable())),
    }
}

#[derive(Debug, Deserialize)]
pub struct CreatePolicyRequest {
    pub name: String,
    pub client_type: String,
    pub priority: String,
    pub response_time_hours: i32,
    pub resolution_time_hours: i32,
    pub escalation_time_hours: i32,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePolicyRequest {
    pub name: Option<String>,
    pub response_time_hours: Option<i32>,
    pub resolution_time_hours: Option<i32>,
    pub escalation_time_hours: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct PolicyListQuery {
    pub include_inactive: Option<bool>,
}

fn validate_hours(field: &str, value: i32) -> Result<(), ItsmError> {
    if value <= 0 {
        return Err(ItsmError::Validation(format!(
            "{field} must be a positive number of hours"
        )));
    }
    Ok(())
}

pub async fn list_policies(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PolicyListQuery>,
) -> Result<Json<Vec<SlaPolicy>>, ItsmError> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| ItsmError::Database(format!("connection pool error: {e}")))?;

    let mut q = sla_policies::table.into_boxed();
    if !query.include_inactive.unwrap_or(false) {
        q = q.filter(sla_policies::is_active.eq(true));
    }
    let policies = q
        .order((sla_policies::client_type.asc(), sla_policies::priority.asc()))
        .load::<SlaPolicy>(&mut conn)
        .map_err(|e| ItsmError::Database(format!("query error: {e}")))?;

    Ok(Json(policies))
}

pub async fn create_policy(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreatePolicyRequest>,
) -> Result<Json<SlaPolicy>, ItsmError> {
    let client_type = ClientType::parse(&req.client_type)
        .ok_or_else(|| ItsmError::Validation(format!("unknown client type '{}'", req.client_type)))?;
    let priority = Priority::parse(&req.priority)
        .ok_or_else(|| ItsmError::Validation(format!("unknown priority '{}'", req.priority)))?;
    validate_hours("response_time_hours", req.response_time_hours)?;
    validate_hours("resolution_time_hours", req.resolution_time_hours)?;
    validate_hours("escalation_time_hours", req.escalation_time_hours)?;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| ItsmError::Database(format!("connection pool error: {e}")))?;

    let now = Utc::now();
    let policy = SlaPolicy {
        id: Uuid::new_v4(),
        name: req.name,
        client_type: client_type.as_str().to_string(),
        priority: priority.as_str().to_string(),
        response_time_hours: req.response_time_hours,
        resolution_time_hours: req.resolution_time_hours,
        escalation_time_hours: req.escalation_time_hours,
        is_active: true,
        created_at: now,
        updated_at: now,
    };

    diesel::insert_into(sla_policies::table)
        .values(&policy)
        .execute(&mut conn)
        .map_err(|e| ItsmError::Database(format!("insert error: {e}")))?;

    info!(
        policy = %policy.id,
        client_type = %policy.client_type,
        priority = %policy.priority,
        "SLA policy created"
    );
    Ok(Json(policy))
}

pub async fn update_policy(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdatePolicyRequest>,
) -> Result<Json<SlaPolicy>, ItsmError> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| ItsmError::Database(format!("connection pool error: {e}")))?;

    let mut policy = sla_policies::table
        .filter(sla_policies::id.eq(id))
        .first::<SlaPolicy>(&mut conn)
        .optional()
        .map_err(|e| ItsmError::Database(format!("query error: {e}")))?
        .ok_or_else(|| ItsmError::NotFound(format!("SLA policy {id} not found")))?;

    if let Some(name) = req.name {
        policy.name = name;
    }
    if let Some(hours) = req.response_time_hours {
        validate_hours("response_time_hours", hours)?;
        policy.response_time_hours = hours;
    }
    if let Some(hours) = req.resolution_time_hours {
        validate_hours("resolution_time_hours", hours)?;
        policy.resolution_time_hours = hours;
    }
    if let Some(hours) = req.escalation_time_hours {
        validate_hours("escalation_time_hours", hours)?;
        policy.escalation_time_hours = hours;
    }
    if let Some(is_active) = req.is_active {
        policy.is_active = is_active;
    }
    policy.updated_at = Utc::now();

    diesel::update(sla_policies::table.filter(sla_policies::id.eq(id)))
        .set(&policy)
        .execute(&mut conn)
        .map_err(|e| ItsmError::Database(format!("update error: {e}")))?;

    Ok(Json(policy))
}

/// Soft disable. Policies referenced by historical tracking are never
/// removed, so there is no delete route.
pub async fn deactivate_policy(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SlaPolicy>, ItsmError> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| ItsmError::Database(format!("connection pool error: {e}")))?;

    let affected = diesel::update(sla_policies::table.filter(sla_policies::id.eq(id)))
        .set((
            sla_policies::is_active.eq(false),
            sla_policies::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)
        .map_err(|e| ItsmError::Database(format!("update error: {e}")))?;
    if affected == 0 {
        return Err(ItsmError::NotFound(format!("SLA policy {id} not found")));
    }

    let policy = sla_policies::table
        .filter(sla_policies::id.eq(id))
        .first::<SlaPolicy>(&mut conn)
        .map_err(|e| ItsmError::Database(format!("query error: {e}")))?;

    info!(policy = %id, "SLA policy deactivated");
    Ok(Json(policy))
}

pub fn configure_sla_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/sla/policies", get(list_policies).post(create_policy))
        .route("/api/sla/policies/:id", put(update_policy))
        .route("/api/sla/policies/:id/deactivate", put(deactivate_policy))
}
