//! Session facade binding one entity cache to one remote store.
//!
//! # Responsibility
//! - Construct and register entities so every handle is identity-mapped
//!   from the moment its id is known.
//! - Provide the flush entry points callers use to synchronize local
//!   changes.
//!
//! # Invariants
//! - Adoption returns the already-cached handle when the id is known,
//!   never a second object for the same id.
//! - The session (and its cache) is bound to a single thread.

use crate::cache::{Cache, CacheError, CacheResult};
use crate::model::{AttributeHandle, BranchHandle, EntityRef, NoteHandle};
use crate::store::{AttributePayload, BranchPayload, NotePayload, RemoteStore};

/// One logical connection to the remote note store plus its entity cache.
pub struct Session<S: RemoteStore> {
    cache: Cache,
    store: S,
}

impl<S: RemoteStore> Session<S> {
    /// Creates a session over the provided store client.
    pub fn new(store: S) -> Self {
        Self {
            cache: Cache::new(),
            store,
        }
    }

    /// Creates a note locally and registers it; flushed as a create.
    pub fn create_note(
        &mut self,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> CacheResult<NoteHandle> {
        let note = NoteHandle::new(title, content);
        self.cache.add(note.entity())?;
        Ok(note)
    }

    /// Registers a note record fetched from the remote store.
    ///
    /// Returns the already-cached handle when the id is known.
    pub fn adopt_note(&mut self, payload: NotePayload) -> CacheResult<NoteHandle> {
        if let Some(existing) = self.cache.get(payload.note_id) {
            return NoteHandle::from_entity(existing)
                .ok_or(CacheError::IdentityConflict(payload.note_id));
        }
        let note = NoteHandle::with_id(payload.note_id, payload.title, payload.content);
        self.cache.add(note.entity())?;
        Ok(note)
    }

    /// Creates an attribute locally and registers it (and its owner).
    pub fn create_attribute(
        &mut self,
        owner: &NoteHandle,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> CacheResult<AttributeHandle> {
        self.cache.add(owner.entity())?;
        let attribute = AttributeHandle::new(owner, name, value);
        self.cache.add(attribute.entity())?;
        Ok(attribute)
    }

    /// Registers an attribute record fetched from the remote store.
    ///
    /// The owning note must already be cached.
    pub fn adopt_attribute(&mut self, payload: AttributePayload) -> CacheResult<AttributeHandle> {
        if let Some(existing) = self.cache.get(payload.attribute_id) {
            return AttributeHandle::from_entity(existing)
                .ok_or(CacheError::IdentityConflict(payload.attribute_id));
        }
        let owner = self
            .cache
            .get(payload.note_id)
            .and_then(NoteHandle::from_entity)
            .ok_or(CacheError::UnknownEntity(payload.note_id))?;
        let attribute =
            AttributeHandle::with_id(payload.attribute_id, &owner, payload.name, payload.value);
        self.cache.add(attribute.entity())?;
        Ok(attribute)
    }

    /// Creates a branch placement locally and registers it (and both
    /// endpoint notes).
    pub fn create_branch(
        &mut self,
        parent: &NoteHandle,
        child: &NoteHandle,
        note_position: i64,
    ) -> CacheResult<BranchHandle> {
        self.cache.add(parent.entity())?;
        self.cache.add(child.entity())?;
        let branch = BranchHandle::new(parent, child, note_position);
        self.cache.add(branch.entity())?;
        Ok(branch)
    }

    /// Registers a branch record fetched from the remote store.
    ///
    /// Both endpoint notes must already be cached.
    pub fn adopt_branch(&mut self, payload: BranchPayload) -> CacheResult<BranchHandle> {
        if let Some(existing) = self.cache.get(payload.branch_id) {
            return BranchHandle::from_entity(existing)
                .ok_or(CacheError::IdentityConflict(payload.branch_id));
        }
        let parent = self
            .cache
            .get(payload.parent_note_id)
            .and_then(NoteHandle::from_entity)
            .ok_or(CacheError::UnknownEntity(payload.parent_note_id))?;
        let child = self
            .cache
            .get(payload.child_note_id)
            .and_then(NoteHandle::from_entity)
            .ok_or(CacheError::UnknownEntity(payload.child_note_id))?;
        let branch =
            BranchHandle::with_id(payload.branch_id, &parent, &child, payload.note_position);
        self.cache.add(branch.entity())?;
        Ok(branch)
    }

    /// Flushes every pending local change.
    pub fn flush(&mut self) -> CacheResult<()> {
        self.cache.flush_all(&mut self.store)
    }

    /// Flushes `targets` plus their transitive dirty dependencies.
    pub fn flush_entities(&mut self, targets: &[EntityRef]) -> CacheResult<()> {
        self.cache.flush_entities(targets, &mut self.store)
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}
