//! Note entity and its typed handle.

use crate::cache::FlushContext;
use crate::model::entity::{share, Entity, EntityId, EntityRef, Lifecycle, State};
use crate::store::{NotePayload, StoreResult};
use uuid::Uuid;

/// A note as held in the cache: the unit of content in the remote tree.
#[derive(Debug)]
pub struct Note {
    core: Lifecycle,
    title: String,
    content: String,
}

impl Note {
    pub(crate) fn lifecycle(&self) -> &Lifecycle {
        &self.core
    }

    pub(crate) fn lifecycle_mut(&mut self) -> &mut Lifecycle {
        &mut self.core
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub(crate) fn set_title(&mut self, title: String) {
        self.title = title;
        self.core.touch();
    }

    pub(crate) fn set_content(&mut self, content: String) {
        self.content = content;
        self.core.touch();
    }

    pub(crate) fn flush_check(&self) -> Result<(), String> {
        match self.core.state() {
            State::Create | State::Update => {
                if self.title.trim().is_empty() {
                    return Err("note title must not be blank".to_string());
                }
                Ok(())
            }
            State::Clean | State::Delete => Ok(()),
        }
    }

    pub(crate) fn flush_write(&mut self, ctx: &mut FlushContext<'_>) -> StoreResult<()> {
        let payload = NotePayload {
            note_id: self.core.entity_id(),
            title: self.title.clone(),
            content: self.content.clone(),
        };
        match self.core.state() {
            State::Create => ctx.store().create_note(&payload),
            State::Update => ctx.store().update_note(&payload),
            State::Delete => ctx.store().delete_note(self.core.entity_id()),
            State::Clean => Ok(()),
        }
    }
}

/// Typed shared handle to one cached note.
#[derive(Debug, Clone)]
pub struct NoteHandle {
    entity: EntityRef,
}

impl NoteHandle {
    /// Creates a note that exists locally only.
    ///
    /// The id is generated client-side and stays stable across the create
    /// flush; the first flush turns the note `Clean`.
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self::build(Lifecycle::new_create(Uuid::new_v4()), title, content)
    }

    /// Wraps a note record that already exists remotely.
    ///
    /// Used by load/sync paths where identity already exists externally;
    /// the note starts `Clean`.
    pub fn with_id(
        note_id: EntityId,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::build(Lifecycle::new_clean(note_id), title, content)
    }

    fn build(core: Lifecycle, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            entity: share(Entity::Note(Note {
                core,
                title: title.into(),
                content: content.into(),
            })),
        }
    }

    /// Recovers a typed handle from a cached entity reference.
    ///
    /// Returns `None` when the entity is not a note.
    pub fn from_entity(entity: EntityRef) -> Option<Self> {
        match &*entity.borrow() {
            Entity::Note(_) => {}
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

    pub fn title(&self) -> String {
        self.with_note(|note| note.title().to_string())
    }

    pub fn content(&self) -> String {
        self.with_note(|note| note.content().to_string())
    }

    pub fn set_title(&self, title: impl Into<String>) {
        self.with_note_mut(|note| note.set_title(title.into()));
    }

    pub fn set_content(&self, content: impl Into<String>) {
        self.with_note_mut(|note| note.set_content(content.into()));
    }

    /// Schedules this note for remote deletion (or cancels a pending create).
    pub fn delete(&self) {
        self.with_note_mut(|note| note.lifecycle_mut().request_delete());
    }

    fn with_note<T>(&self, read: impl FnOnce(&Note) -> T) -> T {
        match &*self.entity.borrow() {
            Entity::Note(note) => read(note),
            _ => unreachable!("note handle wraps a note entity"),
        }
    }

    fn with_note_mut<T>(&self, write: impl FnOnce(&mut Note) -> T) -> T {
        match &mut *self.entity.borrow_mut() {
            Entity::Note(note) => write(note),
            _ => unreachable!("note handle wraps a note entity"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::NoteHandle;
    use crate::model::entity::State;
    use uuid::Uuid;

    #[test]
    fn new_note_starts_as_pending_create() {
        let note = NoteHandle::new("Inbox", "");
        assert_eq!(note.state(), State::Create);
        assert!(note.is_dirty());
    }

    #[test]
    fn adopted_note_starts_clean_and_updates_on_mutation() {
        let note = NoteHandle::with_id(Uuid::new_v4(), "Journal", "day one");
        assert_eq!(note.state(), State::Clean);

        note.set_content("day two");
        assert_eq!(note.state(), State::Update);
        assert_eq!(note.content(), "day two");
    }

    #[test]
    fn blank_title_fails_flush_check() {
        let note = NoteHandle::new("   ", "body");
        let message = note
            .entity()
            .borrow()
            .flush_check()
            .expect_err("blank title should be rejected");
        assert!(message.contains("blank"));
    }

    #[test]
    fn delete_of_clean_note_is_pending_delete() {
        let note = NoteHandle::with_id(Uuid::new_v4(), "Old", "");
        note.delete();
        assert_eq!(note.state(), State::Delete);
        assert!(note.entity().borrow().flush_check().is_ok());
    }
}
