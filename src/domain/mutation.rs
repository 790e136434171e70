// =====================
// Local mutations waiting for the remote authority
// =====================

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::models::{DateRange, Person, PersonCode, ShiftAssignment, UnknownCode};

pub type Sequence = i64;

/// One local write, typed by what it touches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mutation {
    PersonUpsert { person: Person },
    PersonSoftDelete { code: PersonCode },
    /// Manual, imported, leave or swapped shift written over the rotation
    ShiftOverride { assignment: ShiftAssignment },
    /// Leave removed from a range; the rotation applies there again
    LeaveCleared { code: PersonCode, range: DateRange },
}

impl Mutation {
    pub fn entity_type(&self) -> EntityType {
        match self {
            Mutation::PersonUpsert { .. } | Mutation::PersonSoftDelete { .. } => EntityType::Person,
            Mutation::ShiftOverride { .. } | Mutation::LeaveCleared { .. } => EntityType::ShiftAssignment,
        }
    }

    pub fn action(&self) -> MutationAction {
        match self {
            Mutation::PersonUpsert { .. } | Mutation::ShiftOverride { .. } => MutationAction::Upsert,
            Mutation::PersonSoftDelete { .. } => MutationAction::SoftDelete,
            Mutation::LeaveCleared { .. } => MutationAction::Clear,
        }
    }

    /// The person this mutation is about.
    pub fn person_code(&self) -> &str {
        match self {
            Mutation::PersonUpsert { person } => &person.code,
            Mutation::PersonSoftDelete { code } | Mutation::LeaveCleared { code, .. } => code,
            Mutation::ShiftOverride { assignment } => &assignment.person_code,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Person,
    ShiftAssignment,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Person => "person",
            EntityType::ShiftAssignment => "shift_assignment",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationAction {
    Upsert,
    SoftDelete,
    Clear,
}

impl MutationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationAction::Upsert => "upsert",
            MutationAction::SoftDelete => "soft_delete",
            MutationAction::Clear => "clear",
        }
    }
}

/// Delivery status of a persisted mutation.
///
/// ```text
/// Pending --> InFlight --> Acknowledged (row erased)
///    ^           |
///    +-----------+  failure / cancellation
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationStatus {
    Pending,
    InFlight,
    Acknowledged,
}

impl MutationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationStatus::Pending => "pending",
            MutationStatus::InFlight => "in_flight",
            MutationStatus::Acknowledged => "acknowledged",
        }
    }
}

impl FromStr for MutationStatus {
    type Err = UnknownCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(MutationStatus::Pending),
            "in_flight" => Ok(MutationStatus::InFlight),
            "acknowledged" => Ok(MutationStatus::Acknowledged),
            _ => Err(UnknownCode {
                kind: "mutation status",
                value: s.to_string(),
            }),
        }
    }
}

/// A mutation as stored in the durable log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingMutation {
    pub id: String,
    pub sequence: Sequence,
    pub mutation: Mutation,
    pub status: MutationStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub enqueued_at: DateTime<Utc>,
}

impl PendingMutation {
    pub fn entity_type(&self) -> EntityType {
        self.mutation.entity_type()
    }

    pub fn action(&self) -> MutationAction {
        self.mutation.action()
    }

    pub fn envelope(&self) -> MutationEnvelope<'_> {
        MutationEnvelope {
            id: &self.id,
            sequence: self.sequence,
            entity_type: self.entity_type(),
            action: self.action(),
            payload: &self.mutation,
            enqueued_at: self.enqueued_at,
        }
    }
}

/// Wire record submitted to the remote authority.
#[derive(Debug, Clone, Serialize)]
pub struct MutationEnvelope<'a> {
    pub id: &'a str,
    pub sequence: Sequence,
    pub entity_type: EntityType,
    pub action: MutationAction,
    pub payload: &'a Mutation,
    pub enqueued_at: DateTime<Utc>,
}
