//! Team directory.
//!
//! The console owns the mapping from a team to its client relationship
//! type; the ITSM core consumes it only as an SLA resolver input. Team id
//! is always an explicit argument — no ambient session or team context.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::itsm::error::ItsmError;
use crate::itsm::types::ClientType;
use crate::shared::schema::teams;
use crate::shared::state::AppState;
use crate::shared::utils::DbPool;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = teams)]
pub struct Team {
    pub id: Uuid,
    pub org_id: Uuid,
    pub name: String,
    pub client_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub trait TeamDirectory: Send + Sync {
    fn client_type_of(&self, team_id: Uuid) -> Result<ClientType, ItsmError>;
}

pub struct DieselTeamDirectory {
    pool: DbPool,
}

impl DieselTeamDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl TeamDirectory for DieselTeamDirectory {
    fn client_type_of(&self, team_id: Uuid) -> Result<ClientType, ItsmError> {
        let mut conn = self
            .pool
            .get()
            .map_err(|e| ItsmError::Database(format!("connection pool error: {e}")))?;
        let stored: String = teams::table
            .filter(teams::id.eq(team_id))
            .select(teams::client_type)
            .first(&mut conn)
            .optional()
            .map_err(|e| ItsmError::Database(format!("query error: {e}")))?
            .ok_or_else(|| ItsmError::NotFound(format!("team {team_id} not found")))?;
        ClientType::parse(&stored).ok_or_else(|| {
            ItsmError::Validation(format!(
                "team {team_id} carries unknown client type '{stored}'"
            ))
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTeamRequest {
    pub org_id: Uuid,
    pub name: String,
    pub client_type: String,
}

#[derive(Debug, Deserialize)]
pub struct TeamListQuery {
    pub org_id: Option<Uuid>,
}

pub async fn list_teams(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TeamListQuery>,
) -> Result<Json<Vec<Team>>, ItsmError> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| ItsmError::Database(format!("connection pool error: {e}")))?;

    let mut q = teams::table.into_boxed();
    if let Some(org_id) = query.org_id {
        q = q.filter(teams::org_id.eq(org_id));
    }
    let rows = q
        .order(teams::name.asc())
        .load::<Team>(&mut conn)
        .map_err(|e| ItsmError::Database(format!("query error: {e}")))?;
    Ok(Json(rows))
}

pub async fn create_team(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTeamRequest>,
) -> Result<Json<Team>, ItsmError> {
    let client_type = ClientType::parse(&req.client_type)
        .ok_or_else(|| ItsmError::Validation(format!("unknown client type '{}'", req.client_type)))?;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| ItsmError::Database(format!("connection pool error: {e}")))?;

    let now = Utc::now();
    let team = Team {
        id: Uuid::new_v4(),
        org_id: req.org_id,
        name: req.name,
        client_type: client_type.as_str().to_string(),
        created_at: now,
        updated_at: now,
    };
    diesel::insert_into(teams::table)
        .values(&team)
        .execute(&mut conn)
        .map_err(|e| ItsmError::Database(format!("insert error: {e}")))?;

    info!(team = %team.id, client_type = %team.client_type, "team created");
    Ok(Json(team))
}

pub fn configure_directory_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/teams", get(list_teams).post(create_team))
}
