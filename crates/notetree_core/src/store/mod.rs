//! Remote store boundary.
//!
//! # Responsibility
//! - Define the opaque remote-store contract and its wire payloads.
//! - Isolate transport details from cache/flush orchestration.

mod remote;

pub use remote::{
    AttributePayload, BranchPayload, NotePayload, RemoteStore, StoreError, StoreResult,
};
