use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    models::{Folder, Note, NoteChanges},
    notify::{Notification, Severity},
    view::{self, NoteSummary},
};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionRequest {
    /// Identity to sign in as
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionResponse {
    /// Signed-in identity, if any
    pub user_id: Option<String>,
    /// Whether the initial load is still running
    pub loading: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CreateNoteRequest {
    /// Note title, defaults to the configured placeholder
    pub title: Option<String>,
    /// Note content, plain text or HTML
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateNoteRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub is_favorite: Option<bool>,
    pub tags: Option<Vec<String>>,
}

impl From<UpdateNoteRequest> for NoteChanges {
    fn from(request: UpdateNoteRequest) -> Self {
        Self {
            title: request.title,
            content: request.content,
            is_favorite: request.is_favorite,
            tags: request.tags,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateFolderRequest {
    /// Folder name
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NoteResponse {
    pub id: String,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_favorite: bool,
    pub tags: Vec<String>,
}

impl From<Note> for NoteResponse {
    fn from(note: Note) -> Self {
        Self {
            id: note.id,
            title: note.title,
            content: note.content,
            created_at: note.created_at,
            updated_at: note.updated_at,
            is_favorite: note.is_favorite,
            tags: note.tags,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NoteDetailResponse {
    pub note: NoteResponse,
    /// Words in the plain-text body
    pub word_count: usize,
    /// Characters in the plain-text body
    pub char_count: usize,
    /// Estimated reading time in minutes
    pub reading_minutes: usize,
}

impl From<Note> for NoteDetailResponse {
    fn from(note: Note) -> Self {
        let word_count = view::word_count(&note.content);
        Self {
            word_count,
            char_count: view::char_count(&note.content),
            reading_minutes: view::reading_minutes(word_count),
            note: note.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NoteSummaryResponse {
    pub id: String,
    pub title: String,
    /// Plain-text excerpt of the body
    pub preview: String,
    pub updated_at: DateTime<Utc>,
    pub is_favorite: bool,
    pub tags: Vec<String>,
}

impl From<NoteSummary> for NoteSummaryResponse {
    fn from(summary: NoteSummary) -> Self {
        Self {
            id: summary.id,
            title: summary.title,
            preview: summary.preview,
            updated_at: summary.updated_at,
            is_favorite: summary.is_favorite,
            tags: summary.tags,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FolderResponse {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Folder> for FolderResponse {
    fn from(folder: Folder) -> Self {
        Self {
            id: folder.id,
            name: folder.name,
            created_at: folder.created_at,
            updated_at: folder.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TagCountResponse {
    pub tag: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NotificationResponse {
    pub title: String,
    pub description: String,
    /// `success` or `error`
    pub severity: String,
}

impl From<Notification> for NotificationResponse {
    fn from(notification: Notification) -> Self {
        let severity = match notification.severity {
            Severity::Success => "success",
            Severity::Error => "error",
        };
        Self {
            title: notification.title,
            description: notification.description,
            severity: severity.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListNotesQuery {
    /// Case-insensitive search over title and content
    pub search: Option<String>,
    /// Only favorite notes
    #[serde(default)]
    pub favorites: bool,
    /// Only notes carrying this tag
    pub tag: Option<String>,
}

impl From<ListNotesQuery> for view::NoteFilter {
    fn from(query: ListNotesQuery) -> Self {
        Self {
            query: query.search,
            favorites_only: query.favorites,
            tag: query.tag,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RecentNotesQuery {
    /// Maximum number of notes, 10 by default
    pub limit: Option<usize>,
}
