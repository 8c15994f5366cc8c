//! SLA policy resolution.

use diesel::prelude::*;

use crate::itsm::error::ItsmError;
use crate::itsm::types::{ClientType, Priority};
use crate::shared::schema::sla_policies;
use crate::shared::utils::DbPool;
use crate::sla::SlaPolicy;

pub trait PolicyStore: Send + Sync {
    fn list_active(&self) -> Result<Vec<SlaPolicy>, ItsmError>;
}

pub struct DieselPolicyStore {
    pool: DbPool,
}

impl DieselPolicyStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl PolicyStore for DieselPolicyStore {
    fn list_active(&self) -> Result<Vec<SlaPolicy>, ItsmError> {
        let mut conn = self
            .pool
            .get()
            .map_err(|e| ItsmError::Database(format!("connection pool error: {e}")))?;
        sla_policies::table
            .filter(sla_policies::is_active.eq(true))
            .order(sla_policies::updated_at.desc())
            .load::<SlaPolicy>(&mut conn)
            .map_err(|e| ItsmError::Database(format!("query error: {e}")))
    }
}

/// Pick the policy for (client type, priority): exact match on both fields,
/// no fallback across priorities. When an administrator has left more than
/// one active row for the pair, the most recently updated one wins (ids
/// break exact `updated_at` ties) — never an arbitrary row. No match means
/// the pair simply has no SLA.
pub fn resolve_policy(
    policies: &[SlaPolicy],
    client_type: ClientType,
    priority: Priority,
) -> Option<SlaPolicy> {
    policies
        .iter()
        .filter(|p| p.is_active)
        .filter(|p| p.client_type == client_type.as_str() && p.priority == priority.as_str())
        .max_by_key(|p| (p.updated_at, p.id))
        .cloned()
}
