//! In-memory implementations of the persistence seams.
//!
//! Backs the unit and integration tests so the engines can be exercised
//! without PostgreSQL. Conflict and not-found semantics match the Diesel
//! implementations.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::directory::TeamDirectory;
use crate::itsm::error::ItsmError;
use crate::itsm::repository::{
    NewTicket, TicketFilter, TicketPatch, TicketRepository, TicketSnapshot,
};
use crate::itsm::types::{ClientType, Priority, TicketKind};
use crate::sla::resolver::PolicyStore;
use crate::sla::SlaPolicy;

#[derive(Default)]
pub struct InMemoryTicketRepository {
    tickets: RwLock<HashMap<(TicketKind, Uuid), TicketSnapshot>>,
}

impl InMemoryTicketRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully formed snapshot, bypassing `create` defaults. Lets a
    /// test pin `created_at` and friends to known instants.
    pub fn seed(&self, snapshot: TicketSnapshot) {
        self.tickets
            .write()
            .expect("ticket store poisoned")
            .insert((snapshot.kind, snapshot.id), snapshot);
    }
}

impl TicketRepository for InMemoryTicketRepository {
    fn get(&self, kind: TicketKind, id: Uuid) -> Result<TicketSnapshot, ItsmError> {
        self.tickets
            .read()
            .expect("ticket store poisoned")
            .get(&(kind, id))
            .cloned()
            .ok_or_else(|| ItsmError::NotFound(format!("{} {id} not found", kind.as_str())))
    }

    fn list(
        &self,
        kind: TicketKind,
        filter: &TicketFilter,
    ) -> Result<Vec<TicketSnapshot>, ItsmError> {
        let tickets = self.tickets.read().expect("ticket store poisoned");
        let mut matches: Vec<TicketSnapshot> = tickets
            .values()
            .filter(|t| t.kind == kind)
            .filter(|t| filter.status.as_ref().map_or(true, |s| &t.status == s))
            .filter(|t| filter.priority.as_ref().map_or(true, |p| &t.priority == p))
            .filter(|t| filter.assigned_to.map_or(true, |u| t.assigned_to == Some(u)))
            .filter(|t| filter.team_id.map_or(true, |id| t.team_id == id))
            .filter(|t| {
                filter.search.as_ref().map_or(true, |needle| {
                    let needle = needle.to_lowercase();
                    t.title.to_lowercase().contains(&needle)
                        || t.description
                            .as_deref()
                            .is_some_and(|d| d.to_lowercase().contains(&needle))
                })
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let offset = filter.offset.unwrap_or(0).max(0) as usize;
        let limit = filter.limit.unwrap_or(50).max(0) as usize;
        Ok(matches.into_iter().skip(offset).take(limit).collect())
    }

    fn create(&self, new: NewTicket) -> Result<TicketSnapshot, ItsmError> {
        let now = Utc::now();
        let snapshot = TicketSnapshot {
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
        };
        self.seed(snapshot.clone());
        Ok(snapshot)
    }

    fn update(
        &self,
        patch: &TicketPatch,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<TicketSnapshot, ItsmError> {
        let mut tickets = self.tickets.write().expect("ticket store poisoned");
        let snapshot = tickets
            .get_mut(&(patch.kind, patch.id))
            .ok_or_else(|| {
                ItsmError::NotFound(format!("{} {} not found", patch.kind.as_str(), patch.id))
            })?;
        if snapshot.updated_at != expected_updated_at {
            return Err(ItsmError::Conflict(format!(
                "{} {} was modified concurrently",
                patch.kind.as_str(),
                patch.id
            )));
        }
        patch.apply(snapshot);
        snapshot.updated_at = Utc::now();
        Ok(snapshot.clone())
    }
}

#[derive(Default)]
pub struct InMemoryPolicyStore {
    policies: RwLock<Vec<SlaPolicy>>,
}

impl InMemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, policy: SlaPolicy) {
        self.policies
            .write()
            .expect("policy store poisoned")
            .push(policy);
    }
}

impl PolicyStore for InMemoryPolicyStore {
    fn list_active(&self) -> Result<Vec<SlaPolicy>, ItsmError> {
        Ok(self
            .policies
            .read()
            .expect("policy store poisoned")
            .iter()
            .filter(|p| p.is_active)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryTeamDirectory {
    teams: RwLock<HashMap<Uuid, ClientType>>,
}

impl InMemoryTeamDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, team_id: Uuid, client_type: ClientType) {
        self.teams
            .write()
            .expect("team directory poisoned")
            .insert(team_id, client_type);
    }
}

impl TeamDirectory for InMemoryTeamDirectory {
    fn client_type_of(&self, team_id: Uuid) -> Result<ClientType, ItsmError> {
        self.teams
            .read()
            .expect("team directory poisoned")
            .get(&team_id)
            .copied()
            .ok_or_else(|| ItsmError::NotFound(format!("team {team_id} not found")))
    }
}

/// Snapshot fixture with sane fields for the given status. Terminal
/// statuses come with their terminal stamp already set, matching the
/// invariant the lifecycle engine maintains.
pub fn make_snapshot(kind: TicketKind, status: &str) -> TicketSnapshot {
    let now = Utc::now();
    let terminal = crate::itsm::lifecycle::status_is_terminal(kind, status).unwrap_or(false);
    TicketSnapshot {
        kind,
        id: Uuid::new_v4(),
        team_id: Uuid::new_v4(),
        title: "fixture".to_string(),
        description: None,
        status: status.to_string(),
        priority: Priority::Medium.as_str().to_string(),
        assigned_to: None,
        assigned_at: None,
        terminal_at: terminal.then_some(now),
        closed_at: (kind == TicketKind::Incident && status == "closed").then_some(now),
        metadata: BTreeMap::new(),
        created_at: now,
        updated_at: now,
    }
}

/// Active policy fixture keyed by (client type, priority).
pub fn make_policy(
    client_type: ClientType,
    priority: Priority,
    response_time_hours: i32,
    resolution_time_hours: i32,
    escalation_time_hours: i32,
) -> SlaPolicy {
    let now = Utc::now();
    SlaPolicy {
        id: Uuid::new_v4(),
        name: format!("{} {}", client_type.as_str(), priority.as_str()),
        client_type: client_type.as_str().to_string(),
        priority: priority.as_str().to_string(),
        response_time_hours,
        resolution_time_hours,
        escalation_time_hours,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}
