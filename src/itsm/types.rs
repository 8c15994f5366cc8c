//! Types for the ITSM module
//!
//! Statuses and priorities are stored as varchar in the database and parsed
//! into these enums at the boundary; anything the parser rejects never
//! reaches the lifecycle or SLA engines.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Whether the MSP serves the owning client directly or through an
/// intermediary ESN. Decides which SLA policy applies to a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientType {
    Direct,
    ViaEsn,
}

impl ClientType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "direct" => Some(Self::Direct),
            "via_esn" => Some(Self::ViaEsn),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::ViaEsn => "via_esn",
        }
    }
}

/// The three ticket tables share one lifecycle and SLA engine; the kind
/// picks the table and the status vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketKind {
    Incident,
    ChangeRequest,
    ServiceRequest,
}

impl TicketKind {
    /// URL segment used by the REST surface.
    pub fn from_path(segment: &str) -> Option<Self> {
        match segment {
            "incidents" => Some(Self::Incident),
            "changes" => Some(Self::ChangeRequest),
            "service-requests" => Some(Self::ServiceRequest),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Incident => "incident",
            Self::ChangeRequest => "change_request",
            Self::ServiceRequest => "service_request",
        }
    }

    /// Status a freshly created ticket of this kind starts in.
    pub fn initial_status(&self) -> &'static str {
        match self {
            Self::Incident | Self::ServiceRequest => "open",
            Self::ChangeRequest => "draft",
        }
    }
}

/// Common surface of the three status vocabularies. `next_states` is the
/// transition table: an edge exists only if the target appears in the
/// current state's list. Terminal states carry an explicit self-edge, which
/// makes re-entry legal (and a timestamp no-op); every other pair is
/// rejected rather than coerced.
pub trait TicketState: Copy + Eq + Sized + 'static {
    fn parse(s: &str) -> Option<Self>;
    fn as_str(&self) -> &'static str;
    fn next_states(&self) -> &'static [Self];
    fn is_terminal(&self) -> bool;
    fn all() -> &'static [Self];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
}

impl TicketState for IncidentStatus {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "in_progress" => Some(Self::InProgress),
            "resolved" => Some(Self::Resolved),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
        }
    }

    // Closing without a resolution is allowed (junk or duplicate tickets);
    // reopening is not.
    fn next_states(&self) -> &'static [Self] {
        match self {
            Self::Open => &[Self::InProgress, Self::Resolved, Self::Closed],
            Self::InProgress => &[Self::Resolved, Self::Closed],
            Self::Resolved => &[Self::Resolved, Self::Closed],
            Self::Closed => &[Self::Closed],
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Closed)
    }

    fn all() -> &'static [Self] {
        &[Self::Open, Self::InProgress, Self::Resolved, Self::Closed]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    Draft,
    PendingApproval,
    Approved,
    Rejected,
    Implemented,
    Failed,
}

impl TicketState for ChangeStatus {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "pending_approval" => Some(Self::PendingApproval),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "implemented" => Some(Self::Implemented),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::PendingApproval => "pending_approval",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Implemented => "implemented",
            Self::Failed => "failed",
        }
    }

    fn next_states(&self) -> &'static [Self] {
        match self {
            Self::Draft => &[Self::PendingApproval],
            Self::PendingApproval => &[Self::Approved, Self::Rejected],
            Self::Approved => &[Self::Implemented, Self::Failed],
            Self::Rejected => &[Self::Rejected],
            Self::Implemented => &[Self::Implemented],
            Self::Failed => &[Self::Failed],
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Implemented | Self::Failed)
    }

    fn all() -> &'static [Self] {
        &[
            Self::Draft,
            Self::PendingApproval,
            Self::Approved,
            Self::Rejected,
            Self::Implemented,
            Self::Failed,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceRequestStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
    Cancelled,
}

impl TicketState for ServiceRequestStatus {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "in_progress" => Some(Self::InProgress),
            "resolved" => Some(Self::Resolved),
            "closed" => Some(Self::Closed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
            Self::Cancelled => "cancelled",
        }
    }

    fn next_states(&self) -> &'static [Self] {
        match self {
            Self::Open => &[
                Self::InProgress,
                Self::Resolved,
                Self::Closed,
                Self::Cancelled,
            ],
            Self::InProgress => &[Self::Resolved, Self::Closed, Self::Cancelled],
            Self::Resolved => &[Self::Resolved],
            Self::Closed => &[Self::Closed],
            Self::Cancelled => &[Self::Cancelled],
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Closed | Self::Cancelled)
    }

    fn all() -> &'static [Self] {
        &[
            Self::Open,
            Self::InProgress,
            Self::Resolved,
            Self::Closed,
            Self::Cancelled,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips() {
        for s in IncidentStatus::all() {
            assert_eq!(IncidentStatus::parse(s.as_str()), Some(*s));
        }
        for s in ChangeStatus::all() {
            assert_eq!(ChangeStatus::parse(s.as_str()), Some(*s));
        }
        for s in ServiceRequestStatus::all() {
            assert_eq!(ServiceRequestStatus::parse(s.as_str()), Some(*s));
        }
    }

    #[test]
    fn terminal_states_only_self_loop_or_modelled_edges() {
        for s in ChangeStatus::all().iter().filter(|s| s.is_terminal()) {
            assert_eq!(s.next_states(), &[*s]);
        }
        for s in ServiceRequestStatus::all().iter().filter(|s| s.is_terminal()) {
            assert_eq!(s.next_states(), &[*s]);
        }
        // The one modelled exit from a terminal state: incident resolved -> closed.
        assert_eq!(
            IncidentStatus::Resolved.next_states(),
            &[IncidentStatus::Resolved, IncidentStatus::Closed]
        );
    }

    #[test]
    fn kind_path_segments() {
        assert_eq!(TicketKind::from_path("incidents"), Some(TicketKind::Incident));
        assert_eq!(TicketKind::from_path("changes"), Some(TicketKind::ChangeRequest));
        assert_eq!(
            TicketKind::from_path("service-requests"),
            Some(TicketKind::ServiceRequest)
        );
        assert_eq!(TicketKind::from_path("tickets"), None);
    }
}
