//! Ticket persistence.
//!
//! The lifecycle and assignment engines only ever see [`TicketSnapshot`]s
//! and talk to a [`TicketRepository`]; the Diesel implementation below maps
//! that contract onto the three ticket tables. Updates are guarded by the
//! `updated_at` value the caller read, so a concurrent writer surfaces as
//! `Conflict` instead of a silent overwrite.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Deserialize;
use uuid::Uuid;

use crate::itsm::error::ItsmError;
use crate::itsm::types::{Priority, TicketKind};
use crate::shared::schema::{change_requests, incidents, service_requests};
use crate::shared::utils::DbPool;

/// Table-independent view of one ticket. `terminal_at` is the kind's
/// terminal timestamp column (`resolved_at` / `implemented_at` /
/// `completed_at`); `closed_at` only exists for incidents.
#[derive(Debug, Clone, PartialEq)]
pub struct TicketSnapshot {
    pub kind: TicketKind,
    pub id: Uuid,
    pub team_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: String,
    pub assigned_to: Option<Uuid>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub terminal_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub metadata: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTicket {
    pub kind: TicketKind,
    pub team_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub metadata: BTreeMap<String, String>,
}

/// Partial update produced by the engines. `assigned_to`/`assigned_at` use
/// a double `Option` so that clearing a field is distinct from leaving it
/// alone. Timestamps are set-once: the engines never clear them.
#[derive(Debug, Clone)]
pub struct TicketPatch {
    pub kind: TicketKind,
    pub id: Uuid,
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub status: Option<String>,
    pub assigned_to: Option<Option<Uuid>>,
    pub assigned_at: Option<Option<DateTime<Utc>>>,
    pub terminal_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub metadata: Option<BTreeMap<String, String>>,
}

impl TicketPatch {
    pub fn new(kind: TicketKind, id: Uuid) -> Self {
        Self {
            kind,
            id,
            title: None,
            description: None,
            priority: None,
            status: None,
            assigned_to: None,
            assigned_at: None,
            terminal_at: None,
            closed_at: None,
            metadata: None,
        }
    }

    /// Fold the patch into a snapshot. `updated_at` is bumped by the
    /// repository, not here.
    pub fn apply(&self, snapshot: &mut TicketSnapshot) {
        if let Some(title) = &self.title {
            snapshot.title = title.clone();
        }
        if let Some(description) = &self.description {
            snapshot.description = Some(description.clone());
        }
        if let Some(priority) = self.priority {
            snapshot.priority = priority.as_str().to_string();
        }
        if let Some(status) = &self.status {
            snapshot.status = status.clone();
        }
        if let Some(assigned_to) = self.assigned_to {
            snapshot.assigned_to = assigned_to;
        }
        if let Some(assigned_at) = self.assigned_at {
            snapshot.assigned_at = assigned_at;
        }
        if let Some(terminal_at) = self.terminal_at {
            snapshot.terminal_at = Some(terminal_at);
        }
        if let Some(closed_at) = self.closed_at {
            snapshot.closed_at = Some(closed_at);
        }
        if let Some(metadata) = &self.metadata {
            snapshot.metadata = metadata.clone();
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TicketFilter {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub team_id: Option<Uuid>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub trait TicketRepository: Send + Sync {
    fn get(&self, kind: TicketKind, id: Uuid) -> Result<TicketSnapshot, ItsmError>;
    fn list(&self, kind: TicketKind, filter: &TicketFilter)
        -> Result<Vec<TicketSnapshot>, ItsmError>;
    fn create(&self, new: NewTicket) -> Result<TicketSnapshot, ItsmError>;
    fn update(
        &self,
        patch: &TicketPatch,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<TicketSnapshot, ItsmError>;
}

fn metadata_to_map(value: &serde_json::Value) -> BTreeMap<String, String> {
    match value.as_object() {
        Some(map) => map
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect(),
        None => BTreeMap::new(),
    }
}

fn map_to_metadata(map: &BTreeMap<String, String>) -> serde_json::Value {
    serde_json::Value::Object(
        map.iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect(),
    )
}

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = incidents)]
#[diesel(treat_none_as_null = true)]
struct IncidentRow {
    id: Uuid,
    team_id: Uuid,
    title: String,
    description: Option<String>,
    status: String,
    priority: String,
    assigned_to: Option<Uuid>,
    assigned_at: Option<DateTime<Utc>>,
    resolved_at: Option<DateTime<Utc>>,
    closed_at: Option<DateTime<Utc>>,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl IncidentRow {
    fn into_snapshot(self) -> TicketSnapshot {
        TicketSnapshot {
            kind: TicketKind::Incident,
            id: self.id,
            team_id: self.team_id,
            title: self.title,
            description: self.description,
            status: self.status,
            priority: self.priority,
            assigned_to: self.assigned_to,
            assigned_at: self.assigned_at,
            terminal_at: self.resolved_at,
            closed_at: self.closed_at,
            metadata: metadata_to_map(&self.metadata),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    fn from_snapshot(s: &TicketSnapshot) -> Self {
        Self {
            id: s.id,
            team_id: s.team_id,
            title: s.title.clone(),
            description: s.description.clone(),
            status: s.status.clone(),
            priority: s.priority.clone(),
            assigned_to: s.assigned_to,
            assigned_at: s.assigned_at,
            resolved_at: s.terminal_at,
            closed_at: s.closed_at,
            metadata: map_to_metadata(&s.metadata),
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = change_requests)]
#[diesel(treat_none_as_null = true)]
struct ChangeRequestRow {
    id: Uuid,
    team_id: Uuid,
    title: String,
    description: Option<String>,
    status: String,
    priority: String,
    assigned_to: Option<Uuid>,
    assigned_at: Option<DateTime<Utc>>,
    implemented_at: Option<DateTime<Utc>>,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ChangeRequestRow {
    fn into_snapshot(self) -> TicketSnapshot {
        TicketSnapshot {
            kind: TicketKind::ChangeRequest,
            id: self.id,
            team_id: self.team_id,
            title: self.title,
            description: self.description,
            status: self.status,
            priority: self.priority,
            assigned_to: self.assigned_to,
            assigned_at: self.assigned_at,
            terminal_at: self.implemented_at,
            closed_at: None,
            metadata: metadata_to_map(&self.metadata),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    fn from_snapshot(s: &TicketSnapshot) -> Self {
        Self {
            id: s.id,
            team_id: s.team_id,
            title: s.title.clone(),
            description: s.description.clone(),
            status: s.status.clone(),
            priority: s.priority.clone(),
            assigned_to: s.assigned_to,
            assigned_at: s.assigned_at,
            implemented_at: s.terminal_at,
            metadata: map_to_metadata(&s.metadata),
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = service_requests)]
#[diesel(treat_none_as_null = true)]
struct ServiceRequestRow {
    id: Uuid,
    team_id: Uuid,
    title: String,
    description: Option<String>,
    status: String,
    priority: String,
    assigned_to: Option<Uuid>,
    assigned_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ServiceRequestRow {
    fn into_snapshot(self) -> TicketSnapshot {
        TicketSnapshot {
            kind: TicketKind::ServiceRequest,
            id: self.id,
            team_id: self.team_id,
            title: self.title,
            description: self.description,
            status: self.status,
            priority: self.priority,
            assigned_to: self.assigned_to,
            assigned_at: self.assigned_at,
            terminal_at: self.completed_at,
            closed_at: None,
            metadata: metadata_to_map(&self.metadata),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    fn from_snapshot(s: &TicketSnapshot) -> Self {
        Self {
            id: s.id,
            team_id: s.team_id,
            title: s.title.clone(),
            description: s.description.clone(),
            status: s.status.clone(),
            priority: s.priority.clone(),
            assigned_to: s.assigned_to,
            assigned_at: s.assigned_at,
            completed_at: s.terminal_at,
            metadata: map_to_metadata(&s.metadata),
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

pub struct DieselTicketRepository {
    pool: DbPool,
}

impl DieselTicketRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(
        &self,
    ) -> Result<diesel::r2d2::PooledConnection<diesel::r2d2::ConnectionManager<PgConnection>>, ItsmError>
    {
        self.pool
            .get()
            .map_err(|e| ItsmError::Database(format!("connection pool error: {e}")))
    }

    fn fresh_snapshot(new: NewTicket, now: DateTime<Utc>) -> TicketSnapshot {
        TicketSnapshot {
            kind: new.kind,
            id: Uuid::new_v4(),
            team_id: new.team_id,
            title: new.title,
            description: new.description,
            status: new.kind.initial_status().to_string(),
            priority: new.priority.as_str().to_string(),
            assigned_to: None,
            assigned_at: None,
            terminal_at: None,
            closed_at: None,
            metadata: new.metadata,
            created_at: now,
            updated_at: now,
        }
    }
}

macro_rules! guarded_update {
    ($conn:expr, $table:ident, $row:expr, $id:expr, $expected:expr) => {{
        diesel::update(
            $table::table
                .filter($table::id.eq($id))
                .filter($table::updated_at.eq($expected)),
        )
        .set(&$row)
        .execute($conn)
        .map_err(|e| ItsmError::Database(format!("update error: {e}")))?
    }};
}

impl TicketRepository for DieselTicketRepository {
    fn get(&self, kind: TicketKind, id: Uuid) -> Result<TicketSnapshot, ItsmError> {
        let mut conn = self.conn()?;
        let not_found = || ItsmError::NotFound(format!("{} {id} not found", kind.as_str()));
        let snapshot = match kind {
            TicketKind::Incident => incidents::table
                .filter(incidents::id.eq(id))
                .first::<IncidentRow>(&mut conn)
                .optional()
                .map_err(|e| ItsmError::Database(format!("query error: {e}")))?
                .ok_or_else(not_found)?
                .into_snapshot(),
            TicketKind::ChangeRequest => change_requests::table
                .filter(change_requests::id.eq(id))
                .first::<ChangeRequestRow>(&mut conn)
                .optional()
                .map_err(|e| ItsmError::Database(format!("query error: {e}")))?
                .ok_or_else(not_found)?
                .into_snapshot(),
            TicketKind::ServiceRequest => service_requests::table
                .filter(service_requests::id.eq(id))
                .first::<ServiceRequestRow>(&mut conn)
                .optional()
                .map_err(|e| ItsmError::Database(format!("query error: {e}")))?
                .ok_or_else(not_found)?
                .into_snapshot(),
        };
        Ok(snapshot)
    }

    fn list(
        &self,
        kind: TicketKind,
        filter: &TicketFilter,
    ) -> Result<Vec<TicketSnapshot>, ItsmError> {
        let mut conn = self.conn()?;
        let limit = filter.limit.unwrap_or(50);
        let offset = filter.offset.unwrap_or(0);

        let snapshots = match kind {
            TicketKind::Incident => {
                let mut q = incidents::table.into_boxed();
                if let Some(status) = &filter.status {
                    q = q.filter(incidents::status.eq(status.clone()));
                }
                if let Some(priority) = &filter.priority {
                    q = q.filter(incidents::priority.eq(priority.clone()));
                }
                if let Some(assigned_to) = filter.assigned_to {
                    q = q.filter(incidents::assigned_to.eq(assigned_to));
                }
                if let Some(team_id) = filter.team_id {
                    q = q.filter(incidents::team_id.eq(team_id));
                }
                if let Some(search) = &filter.search {
                    let pattern = format!("%{search}%");
                    q = q.filter(
                        incidents::title
                            .ilike(pattern.clone())
                            .or(incidents::description.ilike(pattern)),
                    );
                }
                q.order(incidents::created_at.desc())
                    .limit(limit)
                    .offset(offset)
                    .load::<IncidentRow>(&mut conn)
                    .map_err(|e| ItsmError::Database(format!("query error: {e}")))?
                    .into_iter()
                    .map(IncidentRow::into_snapshot)
                    .collect()
            }
            TicketKind::ChangeRequest => {
                let mut q = change_requests::table.into_boxed();
                if let Some(status) = &filter.status {
                    q = q.filter(change_requests::status.eq(status.clone()));
                }
                if let Some(priority) = &filter.priority {
                    q = q.filter(change_requests::priority.eq(priority.clone()));
                }
                if let Some(assigned_to) = filter.assigned_to {
                    q = q.filter(change_requests::assigned_to.eq(assigned_to));
                }
                if let Some(team_id) = filter.team_id {
                    q = q.filter(change_requests::team_id.eq(team_id));
                }
                if let Some(search) = &filter.search {
                    let pattern = format!("%{search}%");
                    q = q.filter(
                        change_requests::title
                            .ilike(pattern.clone())
                            .or(change_requests::description.ilike(pattern)),
                    );
                }
                q.order(change_requests::created_at.desc())
                    .limit(limit)
                    .offset(offset)
                    .load::<ChangeRequestRow>(&mut conn)
                    .map_err(|e| ItsmError::Database(format!("query error: {e}")))?
                    .into_iter()
                    .map(ChangeRequestRow::into_snapshot)
                    .collect()
            }
            TicketKind::ServiceRequest => {
                let mut q = service_requests::table.into_boxed();
                if let Some(status) = &filter.status {
                    q = q.filter(service_requests::status.eq(status.clone()));
                }
                if let Some(priority) = &filter.priority {
                    q = q.filter(service_requests::priority.eq(priority.clone()));
                }
                if let Some(assigned_to) = filter.assigned_to {
                    q = q.filter(service_requests::assigned_to.eq(assigned_to));
                }
                if let Some(team_id) = filter.team_id {
                    q = q.filter(service_requests::team_id.eq(team_id));
                }
                if let Some(search) = &filter.search {
                    let pattern = format!("%{search}%");
                    q = q.filter(
                        service_requests::title
                            .ilike(pattern.clone())
                            .or(service_requests::description.ilike(pattern)),
                    );
                }
                q.order(service_requests::created_at.desc())
                    .limit(limit)
                    .offset(offset)
                    .load::<ServiceRequestRow>(&mut conn)
                    .map_err(|e| ItsmError::Database(format!("query error: {e}")))?
                    .into_iter()
                    .map(ServiceRequestRow::into_snapshot)
                    .collect()
            }
        };
        Ok(snapshots)
    }

    fn create(&self, new: NewTicket) -> Result<TicketSnapshot, ItsmError> {
        let mut conn = self.conn()?;
        let snapshot = Self::fresh_snapshot(new, Utc::now());
        let insert_err = |e: diesel::result::Error| ItsmError::Database(format!("insert error: {e}"));
        match snapshot.kind {
            TicketKind::Incident => {
                diesel::insert_into(incidents::table)
                    .values(&IncidentRow::from_snapshot(&snapshot))
                    .execute(&mut conn)
                    .map_err(insert_err)?;
            }
            TicketKind::ChangeRequest => {
                diesel::insert_into(change_requests::table)
                    .values(&ChangeRequestRow::from_snapshot(&snapshot))
                    .execute(&mut conn)
                    .map_err(insert_err)?;
            }
            TicketKind::ServiceRequest => {
                diesel::insert_into(service_requests::table)
                    .values(&ServiceRequestRow::from_snapshot(&snapshot))
                    .execute(&mut conn)
                    .map_err(insert_err)?;
            }
        }
        Ok(snapshot)
    }

    fn update(
        &self,
        patch: &TicketPatch,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<TicketSnapshot, ItsmError> {
        let mut snapshot = self.get(patch.kind, patch.id)?;
        if snapshot.updated_at != expected_updated_at {
            return Err(ItsmError::Conflict(format!(
                "{} {} was modified concurrently",
                patch.kind.as_str(),
                patch.id
            )));
        }
        patch.apply(&mut snapshot);
        snapshot.updated_at = Utc::now();

        let mut conn = self.conn()?;
        let affected = match patch.kind {
            TicketKind::Incident => {
                let row = IncidentRow::from_snapshot(&snapshot);
                guarded_update!(&mut conn, incidents, row, patch.id, expected_updated_at)
            }
            TicketKind::ChangeRequest => {
                let row = ChangeRequestRow::from_snapshot(&snapshot);
                guarded_update!(&mut conn, change_requests, row, patch.id, expected_updated_at)
            }
            TicketKind::ServiceRequest => {
                let row = ServiceRequestRow::from_snapshot(&snapshot);
                guarded_update!(&mut conn, service_requests, row, patch.id, expected_updated_at)
            }
        };
        if affected == 0 {
            return Err(ItsmError::Conflict(format!(
                "{} {} was modified concurrently",
                patch.kind.as_str(),
                patch.id
            )));
        }
        Ok(snapshot)
    }
}
