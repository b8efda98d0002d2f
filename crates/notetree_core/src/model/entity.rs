//! Shared entity contract for cached note-tree objects.
//!
//! # Responsibility
//! - Define the closed set of entity kinds the cache can flush.
//! - Drive the per-entity lifecycle state machine (clean/create/update/delete).
//! - Dispatch validation, dependency, and remote-write operations per kind.
//!
//! # Invariants
//! - `entity_id` is stable and never reused for another entity.
//! - An entity is dirty exactly when its state is not `Clean`.
//! - State transitions happen through mutation helpers, never by the cache.

use crate::cache::FlushContext;
use crate::store::StoreResult;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::rc::Rc;
use uuid::Uuid;

use crate::model::attribute::Attribute;
use crate::model::branch::Branch;
use crate::model::note::Note;

/// Stable identifier for every cached entity.
///
/// Kept as a type alias to make semantic intent explicit in signatures.
pub type EntityId = Uuid;

/// Shared handle to one cached entity.
///
/// User code and the cache hold non-owning clones of the same allocation;
/// pointer identity is what the identity map protects.
pub type EntityRef = Rc<RefCell<Entity>>;

/// Shared dirty-set channel between a cache and its registered entities.
pub(crate) type DirtyTracker = Rc<RefCell<BTreeSet<EntityId>>>;

/// Pending-change state of one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    /// No local changes pending.
    Clean,
    /// Entity exists locally only; next flush creates it remotely.
    Create,
    /// Entity exists remotely; local fields diverged.
    Update,
    /// Entity is scheduled for remote deletion.
    Delete,
}

impl Display for State {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Clean => write!(f, "clean"),
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// Category of one cached entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Note,
    Attribute,
    Branch,
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Note => write!(f, "note"),
            Self::Attribute => write!(f, "attribute"),
            Self::Branch => write!(f, "branch"),
        }
    }
}

/// Identity and lifecycle bookkeeping embedded in every entity kind.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    entity_id: EntityId,
    state: State,
    tracker: Option<DirtyTracker>,
}

impl Lifecycle {
    /// Starts a locally created entity that must be flushed as `Create`.
    pub(crate) fn new_create(entity_id: EntityId) -> Self {
        Self {
            entity_id,
            state: State::Create,
            tracker: None,
        }
    }

    /// Starts an entity adopted from the remote store, with no pending work.
    pub(crate) fn new_clean(entity_id: EntityId) -> Self {
        Self {
            entity_id,
            state: State::Clean,
            tracker: None,
        }
    }

    pub(crate) fn entity_id(&self) -> EntityId {
        self.entity_id
    }

    pub(crate) fn state(&self) -> State {
        self.state
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.state != State::Clean
    }

    /// Records a field mutation.
    ///
    /// `Clean` entities become `Update`; entities already pending a create,
    /// update, or delete keep their state.
    pub(crate) fn touch(&mut self) {
        if self.state == State::Clean {
            self.state = State::Update;
            self.mark_dirty();
        }
    }

    /// Schedules remote deletion.
    ///
    /// Deleting an entity that was never flushed cancels the pending create
    /// instead: there is nothing remote to remove.
    pub(crate) fn request_delete(&mut self) {
        match self.state {
            State::Create => {
                self.state = State::Clean;
                self.clear_dirty();
            }
            State::Clean | State::Update => {
                self.state = State::Delete;
                self.mark_dirty();
            }
            State::Delete => {}
        }
    }

    /// Marks the pending change as durably applied remotely.
    pub(crate) fn finish_flush(&mut self) {
        self.state = State::Clean;
        self.clear_dirty();
    }

    /// Connects this entity to the owning cache's dirty set.
    pub(crate) fn attach_tracker(&mut self, tracker: DirtyTracker) {
        self.tracker = Some(tracker);
        if self.is_dirty() {
            self.mark_dirty();
        }
    }

    fn mark_dirty(&self) {
        if let Some(tracker) = &self.tracker {
            tracker.borrow_mut().insert(self.entity_id);
        }
    }

    fn clear_dirty(&self) {
        if let Some(tracker) = &self.tracker {
            tracker.borrow_mut().remove(&self.entity_id);
        }
    }
}

/// Closed set of entity kinds synchronized by the cache.
#[derive(Debug)]
pub enum Entity {
    Note(Note),
    Attribute(Attribute),
    Branch(Branch),
}

impl Entity {
    fn lifecycle(&self) -> &Lifecycle {
        match self {
            Self::Note(note) => note.lifecycle(),
            Self::Attribute(attribute) => attribute.lifecycle(),
            Self::Branch(branch) => branch.lifecycle(),
        }
    }

    fn lifecycle_mut(&mut self) -> &mut Lifecycle {
        match self {
            Self::Note(note) => note.lifecycle_mut(),
            Self::Attribute(attribute) => attribute.lifecycle_mut(),
            Self::Branch(branch) => branch.lifecycle_mut(),
        }
    }

    pub fn id(&self) -> EntityId {
        self.lifecycle().entity_id()
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Note(_) => EntityKind::Note,
            Self::Attribute(_) => EntityKind::Attribute,
            Self::Branch(_) => EntityKind::Branch,
        }
    }

    pub fn state(&self) -> State {
        self.lifecycle().state()
    }

    pub fn is_dirty(&self) -> bool {
        self.lifecycle().is_dirty()
    }

    /// Entities that must be flushed before this one.
    ///
    /// Only dirty dependencies constrain ordering; clean ones already exist
    /// remotely and are ignored by the flush planner.
    pub fn dependencies(&self) -> Vec<EntityRef> {
        match self {
            Self::Note(_) => Vec::new(),
            Self::Attribute(attribute) => attribute.dependencies(),
            Self::Branch(branch) => branch.dependencies(),
        }
    }

    /// Side-effect-free self-consistency check run before any remote write.
    pub fn flush_check(&self) -> Result<(), String> {
        match self {
            Self::Note(note) => note.flush_check(),
            Self::Attribute(attribute) => attribute.flush_check(),
            Self::Branch(branch) => branch.flush_check(),
        }
    }

    /// Applies the pending change to the remote store.
    ///
    /// On success the entity returns to `Clean` and leaves the dirty set.
    /// On failure local state is untouched so the caller can retry.
    pub(crate) fn flush_write(&mut self, ctx: &mut FlushContext<'_>) -> StoreResult<()> {
        match self {
            Self::Note(note) => note.flush_write(ctx)?,
            Self::Attribute(attribute) => attribute.flush_write(ctx)?,
            Self::Branch(branch) => branch.flush_write(ctx)?,
        }
        match self {
            Self::Branch(branch) => branch.finish_flush(),
            _ => self.lifecycle_mut().finish_flush(),
        }
        Ok(())
    }

    pub(crate) fn attach_tracker(&mut self, tracker: DirtyTracker) {
        self.lifecycle_mut().attach_tracker(tracker);
    }
}

impl Display for Entity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind(), self.id())
    }
}

/// Wraps an entity into a shared reference.
pub(crate) fn share(entity: Entity) -> EntityRef {
    Rc::new(RefCell::new(entity))
}
