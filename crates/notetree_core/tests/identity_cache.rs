use notetree_core::{
    AttributePayload, BranchPayload, Cache, CacheError, EntityId, NoteHandle, NotePayload,
    RemoteStore, Session, State, StoreResult,
};
use std::cell::RefCell;
use std::rc::Rc;
use uuid::Uuid;

/// Store stub that only counts remote calls.
#[derive(Default)]
struct CountingStore {
    calls: Rc<RefCell<usize>>,
}

impl CountingStore {
    fn new() -> (Self, Rc<RefCell<usize>>) {
        let store = Self::default();
        let calls = store.calls.clone();
        (store, calls)
    }

    fn bump(&self) -> StoreResult<()> {
        *self.calls.borrow_mut() += 1;
        Ok(())
    }
}

impl RemoteStore for CountingStore {
    fn create_note(&mut self, _payload: &NotePayload) -> StoreResult<()> {
        self.bump()
    }
    fn update_note(&mut self, _payload: &NotePayload) -> StoreResult<()> {
        self.bump()
    }
    fn delete_note(&mut self, _note_id: EntityId) -> StoreResult<()> {
        self.bump()
    }
    fn create_attribute(&mut self, _payload: &AttributePayload) -> StoreResult<()> {
        self.bump()
    }
    fn update_attribute(&mut self, _payload: &AttributePayload) -> StoreResult<()> {
        self.bump()
    }
    fn delete_attribute(&mut self, _attribute_id: EntityId) -> StoreResult<()> {
        self.bump()
    }
    fn create_branch(&mut self, _payload: &BranchPayload) -> StoreResult<()> {
        self.bump()
    }
    fn update_branch(&mut self, _payload: &BranchPayload) -> StoreResult<()> {
        self.bump()
    }
    fn delete_branch(&mut self, _branch_id: EntityId) -> StoreResult<()> {
        self.bump()
    }
    fn refresh_note_ordering(&mut self, _note_id: EntityId) -> StoreResult<()> {
        self.bump()
    }
}

#[test]
fn identity_map_keeps_one_object_per_id() {
    let mut cache = Cache::new();
    let id = Uuid::new_v4();
    let original = NoteHandle::with_id(id, "Original", "");
    let duplicate = NoteHandle::with_id(id, "Duplicate", "");

    cache.add(original.entity()).unwrap();
    cache.add(original.entity()).unwrap();
    assert_eq!(cache.len(), 1);

    let err = cache.add(duplicate.entity()).unwrap_err();
    assert!(matches!(err, CacheError::IdentityConflict(conflict) if conflict == id));
    assert_eq!(cache.len(), 1);
}

#[test]
fn cache_never_evicts_flushed_entities() {
    let (store, _calls) = CountingStore::new();
    let mut session = Session::new(store);
    let note = session.create_note("Kept", "").unwrap();

    session.flush().unwrap();

    assert_eq!(session.cache().len(), 1);
    let cached = session.cache().get(note.id()).expect("note should stay cached");
    assert_eq!(cached.borrow().id(), note.id());
}

#[test]
fn dirty_set_follows_the_entity_lifecycle() {
    let (store, calls) = CountingStore::new();
    let mut session = Session::new(store);
    let note = session.create_note("Draft", "").unwrap();
    assert_eq!(session.cache().dirty_count(), 1);

    session.flush().unwrap();
    assert_eq!(session.cache().dirty_count(), 0);
    assert_eq!(*calls.borrow(), 1);

    note.set_content("more");
    assert_eq!(session.cache().dirty_count(), 1);
    assert_eq!(note.state(), State::Update);

    session.flush().unwrap();
    assert_eq!(session.cache().dirty_count(), 0);
    assert_eq!(*calls.borrow(), 2);
}

#[test]
fn cancelled_create_never_reaches_the_store() {
    let (store, calls) = CountingStore::new();
    let mut session = Session::new(store);
    let note = session.create_note("Scratch", "").unwrap();
    note.delete();

    assert_eq!(session.cache().dirty_count(), 0);
    session.flush().unwrap();
    assert_eq!(*calls.borrow(), 0);
    assert_eq!(session.cache().len(), 1, "the object itself stays cached");
}

#[test]
fn flushing_explicit_clean_entities_is_a_no_op() {
    let (store, calls) = CountingStore::new();
    let mut session = Session::new(store);
    let note = session
        .adopt_note(NotePayload {
            note_id: Uuid::new_v4(),
            title: "Stable".to_string(),
            content: String::new(),
        })
        .unwrap();

    session.flush_entities(&[note.entity().clone()]).unwrap();
    assert_eq!(*calls.borrow(), 0);
}
