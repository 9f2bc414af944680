//! Queued mutation records and their status machine.

use crate::types::{Headers, HttpMethod};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Kind of write a mutation performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    /// POST.
    Create,
    /// PUT or PATCH.
    Update,
    /// DELETE.
    Delete,
}

impl OperationType {
    /// Operation implied by an HTTP method; `None` for reads.
    pub fn from_method(method: HttpMethod) -> Option<Self> {
        match method {
            HttpMethod::Get => None,
            HttpMethod::Post => Some(Self::Create),
            HttpMethod::Put | HttpMethod::Patch => Some(Self::Update),
            HttpMethod::Delete => Some(Self::Delete),
        }
    }
}

/// Business entity a mutation targets.
///
/// Chosen by the caller when the request is issued, never inferred from
/// the request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// A user account.
    User,
    /// A sales order.
    Order,
    /// A catalog product.
    Product,
    /// A product category.
    Category,
    /// A customer.
    Client,
    /// A supplier.
    Provider,
    /// A store location.
    Store,
}

impl EntityKind {
    /// All kinds, in declaration order.
    pub const ALL: [EntityKind; 7] = [
        Self::User,
        Self::Order,
        Self::Product,
        Self::Category,
        Self::Client,
        Self::Provider,
        Self::Store,
    ];

    /// Lowercase name as stored.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Order => "order",
            Self::Product => "product",
            Self::Category => "category",
            Self::Client => "client",
            Self::Provider => "provider",
            Self::Store => "store",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown entity kind: {s}"))
    }
}

/// Lifecycle of a queued mutation.
///
/// ```text
/// pending|failed --attempt--> in_flight --ok--> completed
///                             in_flight --err, attempts < max--> pending
///                             in_flight --err, attempts >= max--> failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationStatus {
    /// Waiting for a drain.
    Pending,
    /// Being sent right now.
    InFlight,
    /// Accepted by the backend. Terminal.
    Completed,
    /// Gave up after the retry limit. Terminal.
    Failed,
}

impl MutationStatus {
    /// Lowercase name as stored.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// True for `completed` and `failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether the transition table allows `self -> next`.
    pub fn can_transition_to(self, next: MutationStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending | Self::Failed, Self::InFlight)
                | (Self::InFlight, Self::Completed | Self::Pending | Self::Failed)
        )
    }
}

impl fmt::Display for MutationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MutationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_flight" => Ok(Self::InFlight),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown mutation status: {other}")),
        }
    }
}

/// The entity a write targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationTarget {
    /// Entity kind.
    pub entity_kind: EntityKind,
    /// Entity id, if the entity already exists.
    pub entity_id: Option<String>,
}

impl MutationTarget {
    /// A target without an id (e.g. a create).
    pub fn new(entity_kind: EntityKind) -> Self {
        Self {
            entity_kind,
            entity_id: None,
        }
    }

    /// A target with a known id.
    pub fn with_id(entity_kind: EntityKind, entity_id: impl Into<String>) -> Self {
        Self {
            entity_kind,
            entity_id: Some(entity_id.into()),
        }
    }
}

/// The request to replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationPayload {
    /// Logical endpoint, resolved to a service at replay time.
    pub url: String,
    /// HTTP method.
    pub method: HttpMethod,
    /// Headers, without `Authorization`.
    pub headers: Headers,
    /// JSON body.
    pub body: Option<Value>,
}

/// What a caller hands to [`crate::MutationQueue::enqueue`].
#[derive(Debug, Clone, PartialEq)]
pub struct MutationRequest {
    /// Kind of write.
    pub operation_type: OperationType,
    /// Target entity.
    pub target: MutationTarget,
    /// Request to replay.
    pub payload: MutationPayload,
}

/// A durable, ordered pending write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedMutation {
    /// Unique id assigned at enqueue time.
    pub id: String,
    /// Kind of write.
    pub operation_type: OperationType,
    /// Target entity kind.
    pub entity_kind: EntityKind,
    /// Target entity id.
    pub entity_id: Option<String>,
    /// Request to replay.
    pub payload: MutationPayload,
    /// Enqueue time, milliseconds since the Unix epoch.
    pub enqueued_at: u64,
    /// Tie-breaker for mutations enqueued in the same millisecond.
    pub sequence: u64,
    /// Failed attempts so far. Never decreases.
    pub attempt_count: u32,
    /// Current status.
    pub status: MutationStatus,
    /// Error message of the last failed attempt.
    pub last_error: Option<String>,
    /// Time of the last status change, milliseconds since the Unix epoch.
    pub updated_at: u64,
}

impl QueuedMutation {
    /// Whether a drain should attempt this mutation.
    ///
    /// `failed` entries are only eligible while under the retry limit, which
    /// in practice means after a manual requeue of a legacy record.
    pub fn is_eligible(&self, max_retries: u32) -> bool {
        match self.status {
            MutationStatus::Pending => true,
            MutationStatus::Failed => self.attempt_count < max_retries,
            MutationStatus::InFlight | MutationStatus::Completed => false,
        }
    }

    /// Ordering key: enqueue order.
    pub fn order_key(&self) -> (u64, u64) {
        (self.enqueued_at, self.sequence)
    }
}
