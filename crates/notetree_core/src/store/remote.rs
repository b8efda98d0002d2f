//! Remote note-store contract consumed by the flush engine.
//!
//! # Responsibility
//! - Define the blocking write operations the cache replays against the
//!   remote tree, plus the child-order refresh signal.
//! - Keep wire payload shapes in one place, named as the remote API names
//!   them.
//!
//! # Invariants
//! - Implementations perform one durable remote write per call or fail; the
//!   cache never retries on their behalf.

use crate::model::EntityId;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type StoreResult<T> = Result<T, StoreError>;

/// Failure reported by a remote store implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The remote endpoint could not be reached.
    Transport(String),
    /// The remote endpoint refused the request.
    Rejected { code: String, message: String },
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(details) => write!(f, "remote store unreachable: {details}"),
            Self::Rejected { code, message } => {
                write!(f, "remote store rejected request ({code}): {message}")
            }
        }
    }
}

impl Error for StoreError {}

/// Wire shape of one note write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotePayload {
    pub note_id: EntityId,
    pub title: String,
    pub content: String,
}

/// Wire shape of one attribute write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributePayload {
    pub attribute_id: EntityId,
    /// Owning note.
    pub note_id: EntityId,
    pub name: String,
    pub value: String,
}

/// Wire shape of one branch write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchPayload {
    pub branch_id: EntityId,
    pub parent_note_id: EntityId,
    pub child_note_id: EntityId,
    pub note_position: i64,
}

/// Blocking client for the remote note store.
///
/// One implementation wraps one authenticated connection; the flush engine
/// calls it strictly sequentially from a single thread.
pub trait RemoteStore {
    fn create_note(&mut self, payload: &NotePayload) -> StoreResult<()>;
    fn update_note(&mut self, payload: &NotePayload) -> StoreResult<()>;
    fn delete_note(&mut self, note_id: EntityId) -> StoreResult<()>;

    fn create_attribute(&mut self, payload: &AttributePayload) -> StoreResult<()>;
    fn update_attribute(&mut self, payload: &AttributePayload) -> StoreResult<()>;
    fn delete_attribute(&mut self, attribute_id: EntityId) -> StoreResult<()>;

    fn create_branch(&mut self, payload: &BranchPayload) -> StoreResult<()>;
    fn update_branch(&mut self, payload: &BranchPayload) -> StoreResult<()>;
    fn delete_branch(&mut self, branch_id: EntityId) -> StoreResult<()>;

    /// Notifies observers that `note_id`'s children changed order.
    fn refresh_note_ordering(&mut self, note_id: EntityId) -> StoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::{BranchPayload, StoreError};
    use uuid::Uuid;

    #[test]
    fn branch_payload_serializes_with_remote_field_names() {
        let payload = BranchPayload {
            branch_id: Uuid::nil(),
            parent_note_id: Uuid::nil(),
            child_note_id: Uuid::nil(),
            note_position: 30,
        };
        let json = serde_json::to_value(&payload).expect("payload should serialize");
        assert!(json.get("branchId").is_some());
        assert!(json.get("parentNoteId").is_some());
        assert!(json.get("childNoteId").is_some());
        assert_eq!(json["notePosition"], 30);
    }

    #[test]
    fn store_error_messages_name_the_failure() {
        let transport = StoreError::Transport("connection refused".to_string());
        assert!(transport.to_string().contains("unreachable"));

        let rejected = StoreError::Rejected {
            code: "409".to_string(),
            message: "conflict".to_string(),
        };
        assert!(rejected.to_string().contains("409"));
        assert!(rejected.to_string().contains("conflict"));
    }
}
