use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use std::{
    cmp::Ordering,
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use super::{FolderColumn, NoteColumn, Order, RemoteStore, StoreError};
use crate::models::{Folder, NewFolder, NewNote, Note, NoteChanges, UserId};

#[derive(Debug, Default)]
struct Tables {
    notes: HashMap<String, Note>,
    folders: HashMap<String, Folder>,
    last_stamp: Option<DateTime<Utc>>,
}

impl Tables {
    /// Strictly increasing timestamps, so ordering by `updated_at` is total.
    fn stamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let stamp = match self.last_stamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_stamp = Some(stamp);
        stamp
    }
}

/// In-process [`RemoteStore`] for local runs and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }
}

fn compare_notes(a: &Note, b: &Note, column: NoteColumn) -> Ordering {
    match column {
        NoteColumn::UpdatedAt => a.updated_at.cmp(&b.updated_at),
    }
}

fn compare_folders(a: &Folder, b: &Folder, column: FolderColumn) -> Ordering {
    match column {
        FolderColumn::Name => a.name.cmp(&b.name),
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn select_notes(
        &self,
        owner: &UserId,
        order: Order<NoteColumn>,
    ) -> Result<Vec<Note>, StoreError> {
        let tables = self.tables()?;
        let mut notes: Vec<Note> = tables
            .notes
            .values()
            .filter(|note| &note.user_id == owner)
            .cloned()
            .collect();

        notes.sort_by(|a, b| {
            let ord = compare_notes(a, b, order.column);
            if order.ascending { ord } else { ord.reverse() }
        });

        Ok(notes)
    }

    async fn insert_note(&self, note: NewNote) -> Result<Note, StoreError> {
        let mut tables = self.tables()?;
        let now = tables.stamp();
        let note = Note {
            id: Uuid::new_v4().to_string(),
            user_id: note.user_id,
            title: note.title,
            content: note.content,
            created_at: now,
            updated_at: now,
            is_favorite: false,
            tags: Vec::new(),
        };
        tables.notes.insert(note.id.clone(), note.clone());

        Ok(note)
    }

    async fn update_note(
        &self,
        owner: &UserId,
        id: &str,
        changes: NoteChanges,
    ) -> Result<Note, StoreError> {
        let mut tables = self.tables()?;
        let now = tables.stamp();
        let note = tables
            .notes
            .get_mut(id)
            .filter(|note| &note.user_id == owner)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if let Some(title) = changes.title {
            note.title = title;
        }
        if let Some(content) = changes.content {
            note.content = content;
        }
        if let Some(is_favorite) = changes.is_favorite {
            note.is_favorite = is_favorite;
        }
        if let Some(tags) = changes.tags {
            note.tags = tags;
        }
        note.updated_at = now;

        Ok(note.clone())
    }

    async fn delete_note(&self, owner: &UserId, id: &str) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        let owned = tables
            .notes
            .get(id)
            .is_some_and(|note| &note.user_id == owner);
        if !owned {
            return Err(StoreError::NotFound(id.to_string()));
        }
        tables.notes.remove(id);

        Ok(())
    }

    async fn select_folders(
        &self,
        owner: &UserId,
        order: Order<FolderColumn>,
    ) -> Result<Vec<Folder>, StoreError> {
        let tables = self.tables()?;
        let mut folders: Vec<Folder> = tables
            .folders
            .values()
            .filter(|folder| &folder.user_id == owner)
            .cloned()
            .collect();

        folders.sort_by(|a, b| {
            let ord = compare_folders(a, b, order.column);
            if order.ascending { ord } else { ord.reverse() }
        });

        Ok(folders)
    }

    async fn insert_folder(&self, folder: NewFolder) -> Result<Folder, StoreError> {
        let mut tables = self.tables()?;
        let now = tables.stamp();
        let folder = Folder {
            id: Uuid::new_v4().to_string(),
            user_id: folder.user_id,
            name: folder.name,
            created_at: now,
            updated_at: now,
        };
        tables.folders.insert(folder.id.clone(), folder.clone());

        Ok(folder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_note(user: &str, title: &str) -> NewNote {
        NewNote {
            user_id: UserId::new(user),
            title: title.to_string(),
            content: String::new(),
        }
    }

    #[tokio::test]
    async fn test_select_notes_scoped_and_ordered() {
        let store = MemoryStore::new();
        let first = store.insert_note(new_note("alice", "first")).await.unwrap();
        store.insert_note(new_note("bob", "other")).await.unwrap();
        let second = store.insert_note(new_note("alice", "second")).await.unwrap();

        let notes = store
            .select_notes(&UserId::new("alice"), Order::desc(NoteColumn::UpdatedAt))
            .await
            .unwrap();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].id, second.id);
        assert_eq!(notes[1].id, first.id);

        // Touching the older note moves it to the front
        store
            .update_note(
                &UserId::new("alice"),
                &first.id,
                NoteChanges {
                    title: Some("first, edited".to_string()),
                    ..NoteChanges::default()
                },
            )
            .await
            .unwrap();
        let notes = store
            .select_notes(&UserId::new("alice"), Order::desc(NoteColumn::UpdatedAt))
            .await
            .unwrap();
        assert_eq!(notes[0].title, "first, edited");
    }

    #[tokio::test]
    async fn test_update_sets_server_timestamp() {
        let store = MemoryStore::new();
        let note = store.insert_note(new_note("alice", "a")).await.unwrap();

        let updated = store
            .update_note(&UserId::new("alice"), &note.id, NoteChanges::favorite(true))
            .await
            .unwrap();
        assert!(updated.is_favorite);
        assert_eq!(updated.title, "a");
        assert!(updated.updated_at > note.updated_at);
        assert_eq!(updated.created_at, note.created_at);
    }

    #[tokio::test]
    async fn test_unknown_ids_are_not_found() {
        let store = MemoryStore::new();

        let alice = UserId::new("alice");

        let err = store
            .update_note(&alice, "missing", NoteChanges::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(id) if id == "missing"));

        let err = store.delete_note(&alice, "missing").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_other_owners_notes_are_not_found() {
        let store = MemoryStore::new();
        let alice = UserId::new("alice");
        let bob = UserId::new("bob");
        let note = store.insert_note(new_note("bob", "private")).await.unwrap();

        let err = store
            .update_note(&alice, &note.id, NoteChanges::favorite(true))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));

        let err = store.delete_note(&alice, &note.id).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));

        let notes = store
            .select_notes(&bob, Order::desc(NoteColumn::UpdatedAt))
            .await
            .unwrap();
        assert_eq!(notes, vec![note]);
    }

    #[tokio::test]
    async fn test_folders_ordered_by_name() {
        let store = MemoryStore::new();
        for name in ["Work", "Archive", "Personal"] {
            store
                .insert_folder(NewFolder {
                    user_id: UserId::new("alice"),
                    name: name.to_string(),
                })
                .await
                .unwrap();
        }

        let names: Vec<String> = store
            .select_folders(&UserId::new("alice"), Order::asc(FolderColumn::Name))
            .await
            .unwrap()
            .into_iter()
            .map(|folder| folder.name)
            .collect();
        assert_eq!(names, vec!["Archive", "Personal", "Work"]);
    }
}
