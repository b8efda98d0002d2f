//! Branch entity and its typed handle.
//!
//! # Responsibility
//! - Represent one parent/child placement of a note in the remote tree.
//! - Track position changes against the last-flushed baseline so the flush
//!   engine can signal child-order refreshes.
//!
//! # Invariants
//! - A branch always references its parent and child notes; both must be
//!   flushed before the branch.
//! - `position_changed` compares against the position at adoption or at the
//!   last successful flush, not against the previous assignment.

use crate::cache::FlushContext;
use crate::model::entity::{share, Entity, EntityId, EntityRef, Lifecycle, State};
use crate::model::note::NoteHandle;
use crate::store::{BranchPayload, StoreResult};
use std::rc::Rc;
use uuid::Uuid;

/// A parent/child note link as held in the cache.
#[derive(Debug)]
pub struct Branch {
    core: Lifecycle,
    parent: EntityRef,
    child: EntityRef,
    note_position: i64,
    baseline_position: i64,
}

impl Branch {
    pub(crate) fn lifecycle(&self) -> &Lifecycle {
        &self.core
    }

    pub(crate) fn lifecycle_mut(&mut self) -> &mut Lifecycle {
        &mut self.core
    }

    pub fn note_position(&self) -> i64 {
        self.note_position
    }

    /// Stable id of the parent note owning this placement.
    pub fn parent_note_id(&self) -> EntityId {
        self.parent.borrow().id()
    }

    /// Stable id of the note placed under the parent.
    pub fn child_note_id(&self) -> EntityId {
        self.child.borrow().id()
    }

    pub(crate) fn set_position(&mut self, note_position: i64) {
        self.note_position = note_position;
        self.core.touch();
    }

    /// True when the position diverged from the last-flushed value.
    pub(crate) fn position_changed(&self) -> bool {
        self.note_position != self.baseline_position
    }

    pub(crate) fn dependencies(&self) -> Vec<EntityRef> {
        vec![self.parent.clone(), self.child.clone()]
    }

    pub(crate) fn flush_check(&self) -> Result<(), String> {
        match self.core.state() {
            State::Create | State::Update => {
                if self.note_position < 0 {
                    return Err("note position must not be negative".to_string());
                }
                if Rc::ptr_eq(&self.parent, &self.child) {
                    return Err("branch must not place a note under itself".to_string());
                }
                if self.core.state() == State::Create {
                    if self.parent.borrow().state() == State::Delete {
                        return Err("parent note is marked for deletion".to_string());
                    }
                    if self.child.borrow().state() == State::Delete {
                        return Err("child note is marked for deletion".to_string());
                    }
                }
                Ok(())
            }
            State::Clean | State::Delete => Ok(()),
        }
    }

    pub(crate) fn flush_write(&mut self, ctx: &mut FlushContext<'_>) -> StoreResult<()> {
        let payload = BranchPayload {
            branch_id: self.core.entity_id(),
            parent_note_id: self.parent_note_id(),
            child_note_id: self.child_note_id(),
            note_position: self.note_position,
        };
        match self.core.state() {
            State::Create => ctx.store().create_branch(&payload),
            State::Update => ctx.store().update_branch(&payload),
            State::Delete => ctx.store().delete_branch(self.core.entity_id()),
            State::Clean => Ok(()),
        }
    }

    /// Resets the position baseline alongside the shared lifecycle reset.
    pub(crate) fn finish_flush(&mut self) {
        self.baseline_position = self.note_position;
        self.core.finish_flush();
    }
}

/// Typed shared handle to one cached branch.
#[derive(Debug, Clone)]
pub struct BranchHandle {
    entity: EntityRef,
}

impl BranchHandle {
    /// Creates a placement that exists locally only.
    pub fn new(parent: &NoteHandle, child: &NoteHandle, note_position: i64) -> Self {
        Self::build(
            Lifecycle::new_create(Uuid::new_v4()),
            parent,
            child,
            note_position,
        )
    }

    /// Wraps a branch record that already exists remotely.
    pub fn with_id(
        branch_id: EntityId,
        parent: &NoteHandle,
        child: &NoteHandle,
        note_position: i64,
    ) -> Self {
        Self::build(Lifecycle::new_clean(branch_id), parent, child, note_position)
    }

    fn build(core: Lifecycle, parent: &NoteHandle, child: &NoteHandle, note_position: i64) -> Self {
        Self {
            entity: share(Entity::Branch(Branch {
                core,
                parent: parent.entity().clone(),
                child: child.entity().clone(),
                note_position,
                baseline_position: note_position,
            })),
        }
    }

    /// Recovers a typed handle from a cached entity reference.
    pub fn from_entity(entity: EntityRef) -> Option<Self> {
        match &*entity.borrow() {
            Entity::Branch(_) => {}
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

    pub fn note_position(&self) -> i64 {
        self.with_branch(|branch| branch.note_position())
    }

    pub fn parent_note_id(&self) -> EntityId {
        self.with_branch(|branch| branch.parent_note_id())
    }

    pub fn child_note_id(&self) -> EntityId {
        self.with_branch(|branch| branch.child_note_id())
    }

    /// Moves the child within its parent's ordering.
    pub fn set_position(&self, note_position: i64) {
        self.with_branch_mut(|branch| branch.set_position(note_position));
    }

    /// Schedules this placement for remote deletion (or cancels a pending
    /// create).
    pub fn delete(&self) {
        self.with_branch_mut(|branch| branch.lifecycle_mut().request_delete());
    }

    fn with_branch<T>(&self, read: impl FnOnce(&Branch) -> T) -> T {
        match &*self.entity.borrow() {
            Entity::Branch(branch) => read(branch),
            _ => unreachable!("branch handle wraps a branch entity"),
        }
    }

    fn with_branch_mut<T>(&self, write: impl FnOnce(&mut Branch) -> T) -> T {
        match &mut *self.entity.borrow_mut() {
            Entity::Branch(branch) => write(branch),
            _ => unreachable!("branch handle wraps a branch entity"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::BranchHandle;
    use crate::model::entity::{Entity, State};
    use crate::model::note::NoteHandle;
    use uuid::Uuid;

    fn clean_note(title: &str) -> NoteHandle {
        NoteHandle::with_id(Uuid::new_v4(), title, "")
    }

    fn position_changed(branch: &BranchHandle) -> bool {
        match &*branch.entity().borrow() {
            Entity::Branch(inner) => inner.position_changed(),
            _ => unreachable!(),
        }
    }

    #[test]
    fn branch_depends_on_parent_and_child() {
        let parent = clean_note("Parent");
        let child = clean_note("Child");
        let branch = BranchHandle::new(&parent, &child, 0);

        let deps = branch.entity().borrow().dependencies();
        assert_eq!(deps.len(), 2);
        assert_eq!(deps[0].borrow().id(), parent.id());
        assert_eq!(deps[1].borrow().id(), child.id());
    }

    #[test]
    fn position_baseline_is_construction_value() {
        let parent = clean_note("Parent");
        let child = clean_note("Child");
        let branch = BranchHandle::with_id(Uuid::new_v4(), &parent, &child, 10);
        assert!(!position_changed(&branch));

        branch.set_position(20);
        assert_eq!(branch.state(), State::Update);
        assert!(position_changed(&branch));

        branch.set_position(10);
        assert!(
            !position_changed(&branch),
            "returning to the baseline is not a change"
        );
        assert_eq!(
            branch.state(),
            State::Update,
            "the entity stays touched even when the value is back"
        );
    }

    #[test]
    fn negative_position_fails_check() {
        let parent = clean_note("Parent");
        let child = clean_note("Child");
        let branch = BranchHandle::new(&parent, &child, -1);
        let message = branch
            .entity()
            .borrow()
            .flush_check()
            .expect_err("negative position should be rejected");
        assert!(message.contains("negative"));
    }

    #[test]
    fn self_referential_branch_fails_check() {
        let only = clean_note("Loop");
        let branch = BranchHandle::new(&only, &only, 0);
        assert!(branch.entity().borrow().flush_check().is_err());
    }

    #[test]
    fn create_under_deleted_parent_fails_check() {
        let parent = clean_note("Parent");
        let child = clean_note("Child");
        parent.delete();
        let branch = BranchHandle::new(&parent, &child, 0);
        let message = branch
            .entity()
            .borrow()
            .flush_check()
            .expect_err("placement under deleted parent should fail");
        assert!(message.contains("parent note"));
    }
}
