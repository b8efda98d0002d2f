//! Attribute entity and its typed handle.
//!
//! # Responsibility
//! - Represent one name/value annotation owned by a note.
//! - Enforce attribute-name syntax before any remote write.
//!
//! # Invariants
//! - An attribute always references its owning note; the owner must be
//!   flushed before the attribute.

use crate::cache::FlushContext;
use crate::model::entity::{share, Entity, EntityId, EntityRef, Lifecycle, State};
use crate::model::note::NoteHandle;
use crate::store::{AttributePayload, StoreResult};
use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

static ATTRIBUTE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_:]+$").expect("valid attribute name regex"));

/// A note annotation as held in the cache.
#[derive(Debug)]
pub struct Attribute {
    core: Lifecycle,
    name: String,
    value: String,
    owner: EntityRef,
}

impl Attribute {
    pub(crate) fn lifecycle(&self) -> &Lifecycle {
        &self.core
    }

    pub(crate) fn lifecycle_mut(&mut self) -> &mut Lifecycle {
        &mut self.core
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Stable id of the owning note.
    pub fn owner_note_id(&self) -> EntityId {
        self.owner.borrow().id()
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
        self.core.touch();
    }

    pub(crate) fn set_value(&mut self, value: String) {
        self.value = value;
        self.core.touch();
    }

    pub(crate) fn dependencies(&self) -> Vec<EntityRef> {
        vec![self.owner.clone()]
    }

    pub(crate) fn flush_check(&self) -> Result<(), String> {
        match self.core.state() {
            State::Create | State::Update => {
                if self.name.is_empty() {
                    return Err("attribute name must not be empty".to_string());
                }
                if !ATTRIBUTE_NAME_RE.is_match(&self.name) {
                    return Err(format!(
                        "attribute name `{}` contains unsupported characters",
                        self.name
                    ));
                }
                if self.core.state() == State::Create
                    && self.owner.borrow().state() == State::Delete
                {
                    return Err("owning note is marked for deletion".to_string());
                }
                Ok(())
            }
            State::Clean | State::Delete => Ok(()),
        }
    }

    pub(crate) fn flush_write(&mut self, ctx: &mut FlushContext<'_>) -> StoreResult<()> {
        let payload = AttributePayload {
            attribute_id: self.core.entity_id(),
            note_id: self.owner_note_id(),
            name: self.name.clone(),
            value: self.value.clone(),
        };
        match self.core.state() {
            State::Create => ctx.store().create_attribute(&payload),
            State::Update => ctx.store().update_attribute(&payload),
            State::Delete => ctx.store().delete_attribute(self.core.entity_id()),
            State::Clean => Ok(()),
        }
    }
}

/// Typed shared handle to one cached attribute.
#[derive(Debug, Clone)]
pub struct AttributeHandle {
    entity: EntityRef,
}

impl AttributeHandle {
    /// Creates an attribute that exists locally only.
    pub fn new(owner: &NoteHandle, name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::build(Lifecycle::new_create(Uuid::new_v4()), owner, name, value)
    }

    /// Wraps an attribute record that already exists remotely.
    pub fn with_id(
        attribute_id: EntityId,
        owner: &NoteHandle,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::build(Lifecycle::new_clean(attribute_id), owner, name, value)
    }

    fn build(
        core: Lifecycle,
        owner: &NoteHandle,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            entity: share(Entity::Attribute(Attribute {
                core,
                name: name.into(),
                value: value.into(),
                owner: owner.entity().clone(),
            })),
        }
    }

    /// Recovers a typed handle from a cached entity reference.
    pub fn from_entity(entity: EntityRef) -> Option<Self> {
        match &*entity.borrow() {
            Entity::Attribute(_) => {}
            _ => return None,
        }
        Some(Self { entity })
    }

    pub fn entity(&self) -> &EntityRef {
        &self.entity
    }

    pub fn id(&self) -> EntityId {
        self.entity.borrow().id()
    }

    pub fn state(&self) -> State {
        self.entity.borrow().state()
    }

    pub fn is_dirty(&self) -> bool {
        self.entity.borrow().is_dirty()
    }

    pub fn name(&self) -> String {
        self.with_attribute(|attribute| attribute.name().to_string())
    }

    pub fn value(&self) -> String {
        self.with_attribute(|attribute| attribute.value().to_string())
    }

    pub fn owner_note_id(&self) -> EntityId {
        self.with_attribute(|attribute| attribute.owner_note_id())
    }

    pub fn set_name(&self, name: impl Into<String>) {
        self.with_attribute_mut(|attribute| attribute.set_name(name.into()));
    }

    pub fn set_value(&self, value: impl Into<String>) {
        self.with_attribute_mut(|attribute| attribute.set_value(value.into()));
    }

    /// Schedules this attribute for remote deletion (or cancels a pending
    /// create).
    pub fn delete(&self) {
        self.with_attribute_mut(|attribute| attribute.lifecycle_mut().request_delete());
    }

    fn with_attribute<T>(&self, read: impl FnOnce(&Attribute) -> T) -> T {
        match &*self.entity.borrow() {
            Entity::Attribute(attribute) => read(attribute),
            _ => unreachable!("attribute handle wraps an attribute entity"),
        }
    }

    fn with_attribute_mut<T>(&self, write: impl FnOnce(&mut Attribute) -> T) -> T {
        match &mut *self.entity.borrow_mut() {
            Entity::Attribute(attribute) => write(attribute),
            _ => unreachable!("attribute handle wraps an attribute entity"),
        }
    }
}
