mod embedded;
mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;

use crate::models::{Folder, NewFolder, NewNote, Note, NoteChanges, UserId};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record {0} not found")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    #[error("{0}")]
    Backend(String),
}

/// Sortable note columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteColumn {
    UpdatedAt,
}

/// Sortable folder columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderColumn {
    Name,
}

pub trait Column: Copy {
    fn sql(self) -> &'static str;
}

impl Column for NoteColumn {
    fn sql(self) -> &'static str {
        match self {
            Self::UpdatedAt => "updated_at",
        }
    }
}

impl Column for FolderColumn {
    fn sql(self) -> &'static str {
        match self {
            Self::Name => "name",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Order<C> {
    pub column: C,
    pub ascending: bool,
}

impl<C: Column> Order<C> {
    pub const fn asc(column: C) -> Self {
        Self {
            column,
            ascending: true,
        }
    }

    pub const fn desc(column: C) -> Self {
        Self {
            column,
            ascending: false,
        }
    }

    fn sql(self) -> String {
        let direction = if self.ascending { "ASC" } else { "DESC" };
        format!("{} {direction}", self.column.sql())
    }
}

/// Table-scoped access to the remote notes and folders tables.
///
/// Every call is a single round trip and may fail; implementations never
/// retry on their own.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn select_notes(
        &self,
        owner: &UserId,
        order: Order<NoteColumn>,
    ) -> Result<Vec<Note>, StoreError>;

    async fn insert_note(&self, note: NewNote) -> Result<Note, StoreError>;

    /// Fails with [`StoreError::NotFound`] when `owner` has no note with this id.
    async fn update_note(
        &self,
        owner: &UserId,
        id: &str,
        changes: NoteChanges,
    ) -> Result<Note, StoreError>;

    /// Fails with [`StoreError::NotFound`] when `owner` has no note with this id.
    async fn delete_note(&self, owner: &UserId, id: &str) -> Result<(), StoreError>;

    async fn select_folders(
        &self,
        owner: &UserId,
        order: Order<FolderColumn>,
    ) -> Result<Vec<Folder>, StoreError>;

    async fn insert_folder(&self, folder: NewFolder) -> Result<Folder, StoreError>;
}
