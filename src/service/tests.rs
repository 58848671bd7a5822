use async_trait::async_trait;
use chrono::Duration;
use tokio::sync::oneshot;

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

use super::*;
use crate::{
    notify::{Inbox, Severity},
    repository::MemoryStore,
};

/// Wraps [`MemoryStore`] with failure switches and call recording.
#[derive(Default)]
struct TestStore {
    inner: MemoryStore,
    fail_inserts: AtomicBool,
    fail_updates: AtomicBool,
    fail_selects: AtomicBool,
    fail_folder_selects: AtomicBool,
    update_calls: Mutex<Vec<(String, NoteChanges)>>,
    held_insert: Mutex<Option<(oneshot::Sender<()>, oneshot::Receiver<()>)>>,
}

impl TestStore {
    fn rejected() -> StoreError {
        StoreError::Backend("simulated failure".to_string())
    }

    fn update_calls(&self) -> Vec<(String, NoteChanges)> {
        self.update_calls.lock().unwrap().clone()
    }

    /// Parks the next insert until the returned sender fires. The receiver
    /// resolves once the insert has reached the store.
    fn hold_next_insert(&self) -> (oneshot::Receiver<()>, oneshot::Sender<()>) {
        let (entered_tx, entered_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        *self.held_insert.lock().unwrap() = Some((entered_tx, release_rx));
        (entered_rx, release_tx)
    }
}

#[async_trait]
impl RemoteStore for TestStore {
    async fn select_notes(
        &self,
        owner: &UserId,
        order: Order<NoteColumn>,
    ) -> Result<Vec<Note>, StoreError> {
        if self.fail_selects.load(Ordering::SeqCst) {
            return Err(Self::rejected());
        }
        self.inner.select_notes(owner, order).await
    }

    async fn insert_note(&self, note: NewNote) -> Result<Note, StoreError> {
        let held = self.held_insert.lock().unwrap().take();
        if let Some((entered, release)) = held {
            let _ = entered.send(());
            let _ = release.await;
        }
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(Self::rejected());
        }
        self.inner.insert_note(note).await
    }

    async fn update_note(
        &self,
        owner: &UserId,
        id: &str,
        changes: NoteChanges,
    ) -> Result<Note, StoreError> {
        self.update_calls
            .lock()
            .unwrap()
            .push((id.to_string(), changes.clone()));
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(Self::rejected());
        }
        self.inner.update_note(owner, id, changes).await
    }

    async fn delete_note(&self, owner: &UserId, id: &str) -> Result<(), StoreError> {
        self.inner.delete_note(owner, id).await
    }

    async fn select_folders(
        &self,
        owner: &UserId,
        order: Order<FolderColumn>,
    ) -> Result<Vec<Folder>, StoreError> {
        if self.fail_selects.load(Ordering::SeqCst)
            || self.fail_folder_selects.load(Ordering::SeqCst)
        {
            return Err(Self::rejected());
        }
        self.inner.select_folders(owner, order).await
    }

    async fn insert_folder(&self, folder: NewFolder) -> Result<Folder, StoreError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(Self::rejected());
        }
        self.inner.insert_folder(folder).await
    }
}

struct Fixture {
    store: Arc<TestStore>,
    inbox: Arc<Inbox>,
    service: Arc<NoteService>,
}

impl Fixture {
    fn new() -> Self {
        let store = Arc::new(TestStore::default());
        let inbox = Arc::new(Inbox::new(16));
        let service = Arc::new(NoteService::new(store.clone(), inbox.clone(), "Untitled"));
        Self {
            store,
            inbox,
            service,
        }
    }

    async fn attached(user: &str) -> Self {
        let fixture = Self::new();
        fixture.service.attach(UserId::new(user)).await.unwrap();
        fixture
    }

    fn errors(&self) -> Vec<Notification> {
        self.inbox
            .drain()
            .into_iter()
            .filter(|n| n.severity == Severity::Error)
            .collect()
    }
}

#[tokio::test]
async fn test_create_grows_cache_by_one() {
    let f = Fixture::attached("alice").await;

    for i in 1..=3 {
        let note = f
            .service
            .create_note(Some(format!("note {i}")), None)
            .await
            .unwrap();

        let notes = f.service.notes().await;
        assert_eq!(notes.len(), i);
        assert!(notes.contains(&note));
        // Newest first
        assert_eq!(notes[0].id, note.id);
    }
}

#[tokio::test]
async fn test_create_uses_defaults() {
    let f = Fixture::attached("alice").await;

    let note = f.service.create_note(None, None).await.unwrap();
    assert_eq!(note.title, "Untitled");
    assert_eq!(note.content, "");

    let note = f
        .service
        .create_note(Some(String::new()), Some("<p>hi</p>".to_string()))
        .await
        .unwrap();
    assert_eq!(note.title, "Untitled");
    assert_eq!(note.content, "<p>hi</p>");
}

#[tokio::test]
async fn test_meeting_notes_scenario() {
    let f = Fixture::attached("u").await;

    let note = f
        .service
        .create_note(Some("Meeting Notes".to_string()), Some(String::new()))
        .await
        .unwrap();

    let notes = f.service.notes().await;
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].user_id, UserId::new("u"));
    assert_eq!(notes[0].title, "Meeting Notes");
    assert!(!notes[0].is_favorite);

    let toggled = f.service.toggle_favorite(&note.id).await.unwrap().unwrap();
    assert!(toggled.is_favorite);
    assert!(f.service.note(&note.id).await.unwrap().is_favorite);

    let calls = f.store.update_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, note.id);
    assert_eq!(calls[0].1.is_favorite, Some(true));
    assert_eq!(calls[0].1.title, None);
}

#[tokio::test]
async fn test_favorite_then_toggle_clears_flag() {
    let f = Fixture::attached("alice").await;
    let note = f.service.create_note(None, None).await.unwrap();

    f.service
        .update_note(&note.id, NoteChanges::favorite(true))
        .await
        .unwrap();
    f.service.toggle_favorite(&note.id).await.unwrap();

    assert!(!f.service.note(&note.id).await.unwrap().is_favorite);
}

#[tokio::test]
async fn test_toggle_unknown_note_skips_store() {
    let f = Fixture::attached("alice").await;
    f.service.create_note(None, None).await.unwrap();

    let result = f.service.toggle_favorite("missing").await.unwrap();
    assert!(result.is_none());
    assert!(f.store.update_calls().is_empty());
    assert!(f.errors().is_empty());
}

#[tokio::test]
async fn test_update_takes_server_record() {
    let f = Fixture::attached("alice").await;
    let note = f.service.create_note(None, None).await.unwrap();

    let updated = f
        .service
        .update_note(
            &note.id,
            NoteChanges {
                title: Some("Renamed".to_string()),
                tags: Some(vec!["work".to_string(), " work".to_string()]),
                ..NoteChanges::default()
            },
        )
        .await
        .unwrap();

    assert!(updated.updated_at > note.updated_at);
    assert_eq!(updated.tags, vec!["work"]);
    assert_eq!(f.service.note(&note.id).await.unwrap(), updated);
}

#[tokio::test]
async fn test_rejected_update_keeps_cached_title() {
    let f = Fixture::attached("alice").await;
    let note = f
        .service
        .create_note(Some("Original".to_string()), None)
        .await
        .unwrap();
    f.inbox.drain();

    f.store.fail_updates.store(true, Ordering::SeqCst);
    let err = f
        .service
        .update_note(
            &note.id,
            NoteChanges {
                title: Some("Changed".to_string()),
                ..NoteChanges::default()
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Remote(_)));
    assert_eq!(f.service.note(&note.id).await.unwrap().title, "Original");

    let errors = f.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].title, "Error updating note");
    assert_eq!(errors[0].description, "simulated failure");
}

#[tokio::test]
async fn test_delete_removes_from_cache() {
    let f = Fixture::attached("alice").await;
    let keep = f.service.create_note(None, None).await.unwrap();
    let gone = f.service.create_note(None, None).await.unwrap();

    f.service.delete_note(&gone.id).await.unwrap();

    let notes = f.service.notes().await;
    assert_eq!(notes, vec![keep]);
    assert!(
        f.inbox
            .drain()
            .iter()
            .any(|n| n.title == "Note deleted" && n.severity == Severity::Success)
    );
}

#[tokio::test]
async fn test_delete_unknown_note_reports_failure() {
    let f = Fixture::attached("alice").await;
    f.service.create_note(None, None).await.unwrap();
    let before = f.service.notes().await;
    f.inbox.drain();

    let err = f.service.delete_note("missing").await.unwrap_err();

    assert!(matches!(err, SyncError::Remote(StoreError::NotFound(_))));
    assert_eq!(f.service.notes().await, before);
    let errors = f.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].title, "Error deleting note");
}

#[tokio::test]
async fn test_other_owners_note_cannot_be_changed() {
    let f = Fixture::attached("alice").await;
    let bob = UserId::new("bob");
    let private = f
        .store
        .inner
        .insert_note(NewNote {
            user_id: bob.clone(),
            title: "bob's".to_string(),
            content: "private".to_string(),
        })
        .await
        .unwrap();

    let err = f
        .service
        .update_note(
            &private.id,
            NoteChanges {
                title: Some("overwritten".to_string()),
                ..NoteChanges::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Remote(StoreError::NotFound(_))));

    let err = f.service.delete_note(&private.id).await.unwrap_err();
    assert!(matches!(err, SyncError::Remote(StoreError::NotFound(_))));

    let titles: Vec<String> = f.errors().into_iter().map(|n| n.title).collect();
    assert_eq!(titles, vec!["Error updating note", "Error deleting note"]);
    assert!(f.service.notes().await.is_empty());

    let remaining = f
        .store
        .inner
        .select_notes(&bob, Order::desc(NoteColumn::UpdatedAt))
        .await
        .unwrap();
    assert_eq!(remaining, vec![private]);
}

#[tokio::test]
async fn test_failed_create_leaves_cache_unchanged() {
    let f = Fixture::attached("alice").await;
    f.store.fail_inserts.store(true, Ordering::SeqCst);

    let err = f.service.create_note(None, None).await.unwrap_err();

    assert!(matches!(err, SyncError::Remote(_)));
    assert!(f.service.notes().await.is_empty());
    assert_eq!(f.errors().len(), 1);
}

#[tokio::test]
async fn test_create_folder_appends() {
    let f = Fixture::attached("alice").await;

    f.service.create_folder("Work".to_string()).await.unwrap();
    f.service.create_folder("Archive".to_string()).await.unwrap();

    let names: Vec<String> = f
        .service
        .folders()
        .await
        .into_iter()
        .map(|folder| folder.name)
        .collect();
    assert_eq!(names, vec!["Work", "Archive"]);

    let descriptions: Vec<String> = f
        .inbox
        .drain()
        .into_iter()
        .map(|n| n.description)
        .collect();
    assert!(descriptions.contains(&"Folder \"Archive\" has been created.".to_string()));
}

#[tokio::test]
async fn test_mutations_require_identity() {
    let f = Fixture::new();

    assert!(matches!(
        f.service.create_note(None, None).await,
        Err(SyncError::NotAttached)
    ));
    assert!(matches!(
        f.service.create_folder("x".to_string()).await,
        Err(SyncError::NotAttached)
    ));
    assert!(matches!(f.service.load().await, Err(SyncError::NotAttached)));
    assert!(f.inbox.is_empty());
}

#[tokio::test]
async fn test_load_orders_notes_and_folders() {
    let f = Fixture::new();
    let alice = UserId::new("alice");
    for title in ["old", "middle", "new"] {
        f.store
            .inner
            .insert_note(NewNote {
                user_id: alice.clone(),
                title: title.to_string(),
                content: String::new(),
            })
            .await
            .unwrap();
    }
    for name in ["b", "c", "a"] {
        f.store
            .inner
            .insert_folder(NewFolder {
                user_id: alice.clone(),
                name: name.to_string(),
            })
            .await
            .unwrap();
    }

    f.service.attach(alice).await.unwrap();

    let titles: Vec<String> = f.service.notes().await.into_iter().map(|n| n.title).collect();
    assert_eq!(titles, vec!["new", "middle", "old"]);
    let names: Vec<String> = f.service.folders().await.into_iter().map(|x| x.name).collect();
    assert_eq!(names, vec!["a", "b", "c"]);
    assert!(!f.service.is_loading().await);
}

#[tokio::test]
async fn test_identity_switch_replaces_cache() {
    let f = Fixture::new();
    f.store
        .inner
        .insert_note(NewNote {
            user_id: UserId::new("bob"),
            title: "bob's".to_string(),
            content: String::new(),
        })
        .await
        .unwrap();

    f.service
        .on_identity_changed(Some(UserId::new("alice")))
        .await
        .unwrap();
    f.service.create_note(None, None).await.unwrap();
    assert_eq!(f.service.notes().await.len(), 1);

    f.service
        .on_identity_changed(Some(UserId::new("bob")))
        .await
        .unwrap();
    let notes = f.service.notes().await;
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].title, "bob's");
    assert!(notes.iter().all(|n| n.user_id == UserId::new("bob")));

    f.service.on_identity_changed(None).await.unwrap();
    assert!(f.service.notes().await.is_empty());
    assert!(f.service.folders().await.is_empty());
    assert!(f.service.current_user().await.is_none());
}

#[tokio::test]
async fn test_failed_load_after_switch_drops_previous_notes() {
    let f = Fixture::attached("alice").await;
    f.service.create_note(None, None).await.unwrap();
    f.inbox.drain();

    f.store.fail_selects.store(true, Ordering::SeqCst);
    let err = f.service.attach(UserId::new("bob")).await.unwrap_err();

    assert!(matches!(err, SyncError::Remote(_)));
    assert!(f.service.notes().await.is_empty());
    assert!(!f.service.is_loading().await);

    let titles: Vec<String> = f.errors().into_iter().map(|n| n.title).collect();
    assert_eq!(titles, vec!["Error fetching notes", "Error fetching folders"]);
}

#[tokio::test]
async fn test_failed_folder_fetch_still_loads_notes() {
    let f = Fixture::new();
    let alice = UserId::new("alice");
    f.store
        .inner
        .insert_note(NewNote {
            user_id: alice.clone(),
            title: "kept".to_string(),
            content: String::new(),
        })
        .await
        .unwrap();

    f.store.fail_folder_selects.store(true, Ordering::SeqCst);
    let err = f.service.attach(alice).await.unwrap_err();

    assert!(matches!(err, SyncError::Remote(_)));
    let titles: Vec<String> = f.service.notes().await.into_iter().map(|n| n.title).collect();
    assert_eq!(titles, vec!["kept"]);
    assert!(f.service.folders().await.is_empty());
    assert!(!f.service.is_loading().await);

    let errors: Vec<String> = f.errors().into_iter().map(|n| n.title).collect();
    assert_eq!(errors, vec!["Error fetching folders"]);
}

#[tokio::test]
async fn test_response_after_detach_is_discarded() {
    let f = Fixture::attached("alice").await;
    let (entered, release) = f.store.hold_next_insert();

    let service = f.service.clone();
    let pending =
        tokio::spawn(async move { service.create_note(Some("late".to_string()), None).await });

    entered.await.unwrap();
    f.service.detach().await;
    release.send(()).unwrap();

    let result = pending.await.unwrap();
    assert!(matches!(result, Err(SyncError::Superseded)));
    assert!(f.service.notes().await.is_empty());
    assert!(
        f.inbox
            .drain()
            .iter()
            .all(|n| n.title != "Note created")
    );
}

#[test]
fn test_older_response_does_not_overwrite_newer_copy() {
    let now = chrono::Utc::now();
    let newer = Note {
        id: "n1".to_string(),
        user_id: UserId::new("alice"),
        title: "second save".to_string(),
        content: String::new(),
        created_at: now,
        updated_at: now,
        is_favorite: false,
        tags: Vec::new(),
    };
    let older = Note {
        title: "first save".to_string(),
        updated_at: now - Duration::seconds(1),
        ..newer.clone()
    };

    let mut cache = Cache {
        notes: vec![newer.clone()],
        ..Cache::default()
    };

    cache.replace_note(&older);
    assert_eq!(cache.notes[0].title, "second save");

    let newest = Note {
        title: "third save".to_string(),
        updated_at: now + Duration::seconds(1),
        ..newer
    };
    cache.replace_note(&newest);
    assert_eq!(cache.notes[0].title, "third save");
}
