//! Entity cache: identity map, dirty set, and unit-of-work flush engine.
//!
//! # Responsibility
//! - Guarantee at most one in-memory object per entity id (identity map).
//! - Track entities with pending local changes for the lifetime of one
//!   session.
//! - Replay pending changes against the remote store in dependency order
//!   (see `flush`).
//!
//! # Invariants
//! - Registration never replaces a cached entity: a second object under an
//!   occupied id is a caller bug and is rejected.
//! - The cache never removes entries from the identity map; entities stay
//!   resident for the session's lifetime.
//! - Single-threaded by design: all access happens on the session's thread.

mod flush;

pub(crate) use flush::FlushContext;

use crate::model::entity::DirtyTracker;
use crate::model::{EntityId, EntityRef};
use crate::store::StoreError;
use log::debug;
use std::cell::RefCell;
use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::rc::Rc;

pub type CacheResult<T> = Result<T, CacheError>;

/// One entity that failed its pre-flush consistency check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    /// Diagnostic label of the failing entity, e.g. `note <id>`.
    pub entity: String,
    /// Reason reported by the entity's own check.
    pub message: String,
}

impl Display for ValidationFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.entity, self.message)
    }
}

/// Errors from cache registration and flush operations.
#[derive(Debug)]
pub enum CacheError {
    /// A different object is already registered under this id.
    IdentityConflict(EntityId),
    /// A referenced entity is not present in the cache.
    UnknownEntity(EntityId),
    /// One or more entities failed their consistency check; nothing was
    /// written.
    Validation(Vec<ValidationFailure>),
    /// The dependency graph contains a cycle through this entity.
    DependencyCycle(EntityId),
    /// A remote write failed mid-flush; earlier writes remain applied.
    Store(StoreError),
}

impl Display for CacheError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IdentityConflict(id) => {
                write!(f, "another entity is already cached under id {id}")
            }
            Self::UnknownEntity(id) => write!(f, "entity is not present in the cache: {id}"),
            Self::Validation(failures) => {
                write!(f, "flush validation failed: ")?;
                for (index, failure) in failures.iter().enumerate() {
                    if index > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{failure}")?;
                }
                Ok(())
            }
            Self::DependencyCycle(id) => {
                write!(f, "dependency cycle detected at entity {id}")
            }
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CacheError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for CacheError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Identity map plus dirty set for one session's entity graph.
#[derive(Default)]
pub struct Cache {
    entity_map: HashMap<EntityId, EntityRef>,
    dirty: DirtyTracker,
}

impl Cache {
    pub fn new() -> Self {
        Self {
            entity_map: HashMap::new(),
            dirty: Rc::new(RefCell::new(BTreeSet::new())),
        }
    }

    /// Registers `entity` under its id.
    ///
    /// Re-registering the same object is a no-op. Registering a *different*
    /// object under an occupied id is a caller bug and fails with
    /// `IdentityConflict`; the cached entry is kept.
    pub fn add(&mut self, entity: &EntityRef) -> CacheResult<()> {
        let (id, label) = {
            let entity = entity.borrow();
            (entity.id(), entity.to_string())
        };
        match self.entity_map.entry(id) {
            Entry::Occupied(existing) => {
                if Rc::ptr_eq(existing.get(), entity) {
                    return Ok(());
                }
                return Err(CacheError::IdentityConflict(id));
            }
            Entry::Vacant(slot) => {
                slot.insert(entity.clone());
            }
        }
        entity.borrow_mut().attach_tracker(self.dirty.clone());
        debug!("event=entity_registered module=cache entity={label}");
        Ok(())
    }

    /// Returns the cached entity for `id`, if any.
    pub fn get(&self, id: EntityId) -> Option<EntityRef> {
        self.entity_map.get(&id).cloned()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entity_map.contains_key(&id)
    }

    /// Number of registered entities.
    pub fn len(&self) -> usize {
        self.entity_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entity_map.is_empty()
    }

    /// Number of entities with pending local changes.
    pub fn dirty_count(&self) -> usize {
        self.dirty.borrow().len()
    }

    /// Snapshot of the current dirty set, in stable id order.
    pub fn dirty_entities(&self) -> Vec<EntityRef> {
        self.dirty
            .borrow()
            .iter()
            .filter_map(|id| self.entity_map.get(id).cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{Cache, CacheError};
    use crate::model::{NoteHandle, State};
    use uuid::Uuid;

    #[test]
    fn add_is_idempotent_for_the_same_object() {
        let mut cache = Cache::new();
        let note = NoteHandle::new("Inbox", "");
        cache.add(note.entity()).expect("first add should succeed");
        cache.add(note.entity()).expect("same object should be a no-op");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn add_rejects_a_second_object_under_one_id() {
        let mut cache = Cache::new();
        let id = Uuid::new_v4();
        let first = NoteHandle::with_id(id, "First", "");
        let second = NoteHandle::with_id(id, "Second", "");

        cache.add(first.entity()).expect("first add should succeed");
        let err = cache.add(second.entity()).unwrap_err();
        assert!(matches!(err, CacheError::IdentityConflict(conflict) if conflict == id));

        let cached = cache.get(id).expect("original entry should survive");
        let cached = NoteHandle::from_entity(cached).expect("entry should stay a note");
        assert_eq!(cached.title(), "First");
    }

    #[test]
    fn registration_wires_mutations_into_the_dirty_set() {
        let mut cache = Cache::new();
        let note = NoteHandle::with_id(Uuid::new_v4(), "Journal", "");
        cache.add(note.entity()).expect("add should succeed");
        assert_eq!(cache.dirty_count(), 0);

        note.set_content("entry");
        assert_eq!(cache.dirty_count(), 1);
        assert_eq!(note.state(), State::Update);
    }

    #[test]
    fn dirty_create_is_tracked_at_registration_time() {
        let mut cache = Cache::new();
        let note = NoteHandle::new("Inbox", "");
        cache.add(note.entity()).expect("add should succeed");
        assert_eq!(cache.dirty_count(), 1);
    }

    #[test]
    fn cancelled_create_leaves_the_dirty_set() {
        let mut cache = Cache::new();
        let note = NoteHandle::new("Scratch", "");
        cache.add(note.entity()).expect("add should succeed");
        note.delete();
        assert_eq!(cache.dirty_count(), 0);
        assert_eq!(note.state(), State::Clean);
    }
}
