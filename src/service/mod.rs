//! Session-scoped cache of the attached user's notes and folders.
//!
//! [`NoteService`] mirrors the remote tables for one identity at a time. Every
//! mutation goes to the [`RemoteStore`] first and patches the cache only once
//! the store has confirmed it; a failed call leaves the cache untouched and
//! emits an error [`Notification`].
//!
//! Identity changes bump a session generation. Responses that come back after
//! the generation moved on are dropped with [`SyncError::Superseded`], so a
//! slow request from a previous session never leaks into the current cache.

#[cfg(test)]
mod tests;

use tokio::sync::RwLock;

use std::sync::Arc;

use crate::{
    models::{Folder, NewFolder, NewNote, Note, NoteChanges, UserId, normalize_tags},
    notify::{Notification, Notifier},
    repository::{FolderColumn, NoteColumn, Order, RemoteStore, StoreError},
};

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Remote(#[from] StoreError),

    #[error("no identity is attached")]
    NotAttached,

    #[error("identity changed while the request was in flight")]
    Superseded,
}

#[derive(Debug, Default)]
struct Cache {
    user: Option<UserId>,
    generation: u64,
    loading: bool,
    notes: Vec<Note>,
    folders: Vec<Folder>,
}

impl Cache {
    fn reset(&mut self, user: Option<UserId>) {
        self.loading = user.is_some();
        self.user = user;
        self.generation += 1;
        self.notes.clear();
        self.folders.clear();
    }

    /// Replaces the cached copy unless it is already newer than `note`.
    fn replace_note(&mut self, note: &Note) {
        if let Some(cached) = self.notes.iter_mut().find(|cached| cached.id == note.id) {
            if cached.updated_at > note.updated_at {
                tracing::debug!("keeping newer cached copy of note {}", note.id);
                return;
            }
            *cached = note.clone();
        }
    }
}

/// Identity and generation captured when an operation starts.
struct Session {
    user: UserId,
    generation: u64,
}

pub struct NoteService {
    store: Arc<dyn RemoteStore>,
    notifier: Arc<dyn Notifier>,
    default_title: String,
    cache: RwLock<Cache>,
}

impl NoteService {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        notifier: Arc<dyn Notifier>,
        default_title: impl Into<String>,
    ) -> Self {
        Self {
            store,
            notifier,
            default_title: default_title.into(),
            cache: RwLock::new(Cache::default()),
        }
    }

    /// Switches the cache to `user` and loads their notes and folders.
    pub async fn attach(&self, user: UserId) -> Result<(), SyncError> {
        self.cache.write().await.reset(Some(user.clone()));
        tracing::info!("attached identity {user}");

        self.load().await
    }

    pub async fn detach(&self) {
        self.cache.write().await.reset(None);
        tracing::info!("detached identity, cache cleared");
    }

    pub async fn on_identity_changed(&self, identity: Option<UserId>) -> Result<(), SyncError> {
        match identity {
            Some(user) => self.attach(user).await,
            None => {
                self.detach().await;
                Ok(())
            }
        }
    }

    /// Replaces both cached lists with the store's current contents.
    ///
    /// Notes come back most recently updated first, folders by name. The two
    /// fetches are independent; a failure of one still applies the other.
    pub async fn load(&self) -> Result<(), SyncError> {
        let session = self.session().await?;

        let (notes, folders) = tokio::join!(
            self.store
                .select_notes(&session.user, Order::desc(NoteColumn::UpdatedAt)),
            self.store
                .select_folders(&session.user, Order::asc(FolderColumn::Name)),
        );

        let (notes, folders) = {
            let mut cache = self.cache.write().await;
            if cache.generation != session.generation {
                tracing::warn!("discarding load for {}: identity changed", session.user);
                return Err(SyncError::Superseded);
            }
            cache.loading = false;

            let notes = notes.map(|notes| cache.notes = notes);
            let folders = folders.map(|folders| cache.folders = folders);
            (notes, folders)
        };

        let notes = notes.map_err(|e| self.report("Error fetching notes", e));
        let folders = folders.map_err(|e| self.report("Error fetching folders", e));
        notes.and(folders)?;

        tracing::debug!("loaded cache for {}", session.user);
        Ok(())
    }

    pub async fn create_note(
        &self,
        title: Option<String>,
        content: Option<String>,
    ) -> Result<Note, SyncError> {
        let session = self.session().await?;

        let new_note = NewNote {
            user_id: session.user.clone(),
            title: title
                .filter(|title| !title.is_empty())
                .unwrap_or_else(|| self.default_title.clone()),
            content: content.unwrap_or_default(),
        };

        let note = self
            .store
            .insert_note(new_note)
            .await
            .map_err(|e| self.report("Error creating note", e))?;

        self.patch(&session, |cache| cache.notes.insert(0, note.clone()))
            .await?;
        self.notifier.notify(Notification::success(
            "Note created",
            "Your new note has been created.",
        ));

        Ok(note)
    }

    /// Applies `changes` remotely; the cache takes the record the store returns.
    pub async fn update_note(&self, id: &str, changes: NoteChanges) -> Result<Note, SyncError> {
        let session = self.session().await?;

        let changes = NoteChanges {
            tags: changes.tags.map(normalize_tags),
            ..changes
        };

        let note = self
            .store
            .update_note(&session.user, id, changes)
            .await
            .map_err(|e| self.report("Error updating note", e))?;

        self.patch(&session, |cache| cache.replace_note(&note))
            .await?;

        Ok(note)
    }

    pub async fn delete_note(&self, id: &str) -> Result<(), SyncError> {
        let session = self.session().await?;

        self.store
            .delete_note(&session.user, id)
            .await
            .map_err(|e| self.report("Error deleting note", e))?;

        self.patch(&session, |cache| cache.notes.retain(|note| note.id != id))
            .await?;
        self.notifier.notify(Notification::success(
            "Note deleted",
            "Your note has been deleted.",
        ));

        Ok(())
    }

    /// Inverts the cached favorite flag. Returns `Ok(None)` without touching
    /// the store when the note is not cached.
    pub async fn toggle_favorite(&self, id: &str) -> Result<Option<Note>, SyncError> {
        let is_favorite = self
            .cache
            .read()
            .await
            .notes
            .iter()
            .find(|note| note.id == id)
            .map(|note| note.is_favorite);

        let Some(is_favorite) = is_favorite else {
            tracing::debug!("toggle_favorite: note {id} is not cached");
            return Ok(None);
        };

        self.update_note(id, NoteChanges::favorite(!is_favorite))
            .await
            .map(Some)
    }

    pub async fn create_folder(&self, name: String) -> Result<Folder, SyncError> {
        let session = self.session().await?;

        let folder = self
            .store
            .insert_folder(NewFolder {
                user_id: session.user.clone(),
                name,
            })
            .await
            .map_err(|e| self.report("Error creating folder", e))?;

        self.patch(&session, |cache| cache.folders.push(folder.clone()))
            .await?;
        self.notifier.notify(Notification::success(
            "Folder created",
            format!("Folder \"{}\" has been created.", folder.name),
        ));

        Ok(folder)
    }

    pub async fn notes(&self) -> Vec<Note> {
        self.cache.read().await.notes.clone()
    }

    pub async fn note(&self, id: &str) -> Option<Note> {
        self.cache
            .read()
            .await
            .notes
            .iter()
            .find(|note| note.id == id)
            .cloned()
    }

    pub async fn folders(&self) -> Vec<Folder> {
        self.cache.read().await.folders.clone()
    }

    pub async fn is_loading(&self) -> bool {
        self.cache.read().await.loading
    }

    pub async fn current_user(&self) -> Option<UserId> {
        self.cache.read().await.user.clone()
    }

    async fn session(&self) -> Result<Session, SyncError> {
        let cache = self.cache.read().await;
        cache
            .user
            .clone()
            .map(|user| Session {
                user,
                generation: cache.generation,
            })
            .ok_or(SyncError::NotAttached)
    }

    /// Applies a confirmed change, unless the session moved on meanwhile.
    async fn patch<F>(&self, session: &Session, apply: F) -> Result<(), SyncError>
    where
        F: FnOnce(&mut Cache),
    {
        let mut cache = self.cache.write().await;
        if cache.generation != session.generation {
            tracing::warn!(
                "discarding response for {}: identity changed",
                session.user
            );
            return Err(SyncError::Superseded);
        }
        apply(&mut cache);
        Ok(())
    }

    fn report(&self, action: &str, error: StoreError) -> SyncError {
        self.notifier
            .notify(Notification::error(action, error.to_string()));
        SyncError::Remote(error)
    }
}
