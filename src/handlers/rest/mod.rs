use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_macros::debug_handler;
use utoipa::OpenApi;

use std::sync::Arc;

use crate::{
    dto::{
        CreateFolderRequest, CreateNoteRequest, FolderResponse, ListNotesQuery,
        NoteDetailResponse, NoteResponse, NoteSummaryResponse, NotificationResponse,
        RecentNotesQuery, SessionRequest, SessionResponse, TagCountResponse, UpdateNoteRequest,
    },
    identity::IdentityProvider,
    models::UserId,
    notify::Inbox,
    repository::StoreError,
    service::{NoteService, SyncError},
    view,
};

const DEFAULT_RECENT_LIMIT: usize = 10;

pub struct AppState {
    pub service: Arc<NoteService>,
    pub identity: IdentityProvider,
    pub inbox: Arc<Inbox>,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        get_session,
        sign_in,
        sign_out,
        list_notes,
        recent_notes,
        create_note,
        get_note,
        update_note,
        delete_note,
        toggle_favorite,
        list_folders,
        create_folder,
        list_tags,
        refresh,
        drain_notifications
    ),
    components(schemas(
        SessionRequest,
        SessionResponse,
        CreateNoteRequest,
        UpdateNoteRequest,
        CreateFolderRequest,
        NoteResponse,
        NoteDetailResponse,
        NoteSummaryResponse,
        FolderResponse,
        TagCountResponse,
        NotificationResponse
    )),
    tags(
        (name = "session", description = "Identity attached to the cache"),
        (name = "notes", description = "Notes of the signed-in user"),
        (name = "folders", description = "Folders of the signed-in user")
    )
)]
pub struct ApiDoc;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/session",
            get(get_session).post(sign_in).delete(sign_out),
        )
        .route("/notes", get(list_notes).post(create_note))
        .route("/notes/recent", get(recent_notes))
        .route(
            "/notes/{id}",
            get(get_note).put(update_note).delete(delete_note),
        )
        .route("/notes/{id}/favorite", post(toggle_favorite))
        .route("/folders", get(list_folders).post(create_folder))
        .route("/tags", get(list_tags))
        .route("/refresh", post(refresh))
        .route("/notifications", get(drain_notifications))
        .with_state(state)
}

fn error_response(action: &str, e: &SyncError) -> Response {
    match e {
        SyncError::Remote(StoreError::NotFound(_)) => {
            (StatusCode::NOT_FOUND, "Note not found").into_response()
        }
        SyncError::Remote(_) => {
            tracing::error!("failed to {action}: {e}");
            (StatusCode::BAD_GATEWAY, format!("Failed to {action}: {e}")).into_response()
        }
        SyncError::NotAttached => (StatusCode::CONFLICT, "No user is signed in").into_response(),
        SyncError::Superseded => {
            (StatusCode::CONFLICT, "Session changed during the request").into_response()
        }
    }
}

/// The signed-in identity, loading until the cache has caught up with it.
async fn session_response(state: &AppState) -> SessionResponse {
    let user = state.identity.current();
    let loading = user.is_some()
        && (state.service.current_user().await != user || state.service.is_loading().await);

    SessionResponse {
        user_id: user.map(|user| user.to_string()),
        loading,
    }
}

#[utoipa::path(
    get,
    path = "/session",
    responses(
        (status = 200, description = "Current session", body = SessionResponse)
    ),
    tag = "session"
)]
#[debug_handler]
pub async fn get_session(State(state): State<Arc<AppState>>) -> Response {
    (StatusCode::OK, Json(session_response(&state).await)).into_response()
}

#[utoipa::path(
    post,
    path = "/session",
    request_body = SessionRequest,
    responses(
        (status = 202, description = "Sign-in accepted, notes are loading", body = SessionResponse),
        (status = 400, description = "Empty user id")
    ),
    tag = "session"
)]
#[debug_handler]
pub async fn sign_in(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SessionRequest>,
) -> Response {
    let user_id = payload.user_id.trim();
    if user_id.is_empty() {
        return (StatusCode::BAD_REQUEST, "user_id must not be empty").into_response();
    }

    state.identity.sign_in(UserId::new(user_id));

    let session = SessionResponse {
        user_id: Some(user_id.to_string()),
        loading: true,
    };
    (StatusCode::ACCEPTED, Json(session)).into_response()
}

#[utoipa::path(
    delete,
    path = "/session",
    responses(
        (status = 204, description = "Signed out")
    ),
    tag = "session"
)]
#[debug_handler]
pub async fn sign_out(State(state): State<Arc<AppState>>) -> Response {
    state.identity.sign_out();
    StatusCode::NO_CONTENT.into_response()
}

#[utoipa::path(
    get,
    path = "/notes",
    params(ListNotesQuery),
    responses(
        (status = 200, description = "Cached notes matching the filter", body = Vec<NoteSummaryResponse>)
    ),
    tag = "notes"
)]
#[debug_handler]
pub async fn list_notes(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListNotesQuery>,
) -> Response {
    let notes = state.service.notes().await;
    let summaries: Vec<NoteSummaryResponse> = view::filter(&notes, &query.into())
        .into_iter()
        .map(Into::into)
        .collect();

    (StatusCode::OK, Json(summaries)).into_response()
}

#[utoipa::path(
    get,
    path = "/notes/recent",
    params(RecentNotesQuery),
    responses(
        (status = 200, description = "Most recently updated notes", body = Vec<NoteSummaryResponse>)
    ),
    tag = "notes"
)]
#[debug_handler]
pub async fn recent_notes(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecentNotesQuery>,
) -> Response {
    let notes = state.service.notes().await;
    let limit = query.limit.unwrap_or(DEFAULT_RECENT_LIMIT);
    let summaries: Vec<NoteSummaryResponse> = view::recent(&notes, limit)
        .into_iter()
        .map(Into::into)
        .collect();

    (StatusCode::OK, Json(summaries)).into_response()
}

#[utoipa::path(
    post,
    path = "/notes",
    request_body = CreateNoteRequest,
    responses(
        (status = 201, description = "Note created successfully", body = NoteResponse),
        (status = 409, description = "No user is signed in"),
        (status = 502, description = "Remote store error")
    ),
    tag = "notes"
)]
#[debug_handler]
pub async fn create_note(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateNoteRequest>,
) -> Response {
    match state
        .service
        .create_note(payload.title, payload.content)
        .await
    {
        Ok(note) => (StatusCode::CREATED, Json(NoteResponse::from(note))).into_response(),
        Err(e) => error_response("create note", &e),
    }
}

#[utoipa::path(
    get,
    path = "/notes/{id}",
    params(
        ("id" = String, Path, description = "Note ID")
    ),
    responses(
        (status = 200, description = "Note found", body = NoteDetailResponse),
        (status = 404, description = "Note not found")
    ),
    tag = "notes"
)]
#[debug_handler]
pub async fn get_note(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.service.note(&id).await {
        Some(note) => (StatusCode::OK, Json(NoteDetailResponse::from(note))).into_response(),
        None => (StatusCode::NOT_FOUND, "Note not found").into_response(),
    }
}

#[utoipa::path(
    put,
    path = "/notes/{id}",
    params(
        ("id" = String, Path, description = "Note ID")
    ),
    request_body = UpdateNoteRequest,
    responses(
        (status = 200, description = "Note updated successfully", body = NoteResponse),
        (status = 404, description = "Note not found"),
        (status = 409, description = "No user is signed in"),
        (status = 502, description = "Remote store error")
    ),
    tag = "notes"
)]
#[debug_handler]
pub async fn update_note(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateNoteRequest>,
) -> Response {
    match state.service.update_note(&id, payload.into()).await {
        Ok(note) => (StatusCode::OK, Json(NoteResponse::from(note))).into_response(),
        Err(e) => error_response("update note", &e),
    }
}

#[utoipa::path(
    delete,
    path = "/notes/{id}",
    params(
        ("id" = String, Path, description = "Note ID")
    ),
    responses(
        (status = 204, description = "Note deleted successfully"),
        (status = 404, description = "Note not found"),
        (status = 409, description = "No user is signed in"),
        (status = 502, description = "Remote store error")
    ),
    tag = "notes"
)]
#[debug_handler]
pub async fn delete_note(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.service.delete_note(&id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response("delete note", &e),
    }
}

#[utoipa::path(
    post,
    path = "/notes/{id}/favorite",
    params(
        ("id" = String, Path, description = "Note ID")
    ),
    responses(
        (status = 200, description = "Favorite flag toggled", body = NoteResponse),
        (status = 404, description = "Note not cached"),
        (status = 502, description = "Remote store error")
    ),
    tag = "notes"
)]
#[debug_handler]
pub async fn toggle_favorite(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.service.toggle_favorite(&id).await {
        Ok(Some(note)) => (StatusCode::OK, Json(NoteResponse::from(note))).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "Note not found").into_response(),
        Err(e) => error_response("toggle favorite", &e),
    }
}

#[utoipa::path(
    get,
    path = "/folders",
    responses(
        (status = 200, description = "Cached folders", body = Vec<FolderResponse>)
    ),
    tag = "folders"
)]
#[debug_handler]
pub async fn list_folders(State(state): State<Arc<AppState>>) -> Response {
    let folders: Vec<FolderResponse> = state
        .service
        .folders()
        .await
        .into_iter()
        .map(Into::into)
        .collect();

    (StatusCode::OK, Json(folders)).into_response()
}

#[utoipa::path(
    post,
    path = "/folders",
    request_body = CreateFolderRequest,
    responses(
        (status = 201, description = "Folder created successfully", body = FolderResponse),
        (status = 400, description = "Empty folder name"),
        (status = 409, description = "No user is signed in"),
        (status = 502, description = "Remote store error")
    ),
    tag = "folders"
)]
#[debug_handler]
pub async fn create_folder(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateFolderRequest>,
) -> Response {
    if payload.name.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "name must not be empty").into_response();
    }

    match state.service.create_folder(payload.name).await {
        Ok(folder) => (StatusCode::CREATED, Json(FolderResponse::from(folder))).into_response(),
        Err(e) => error_response("create folder", &e),
    }
}

#[utoipa::path(
    get,
    path = "/tags",
    responses(
        (status = 200, description = "Tags with note counts", body = Vec<TagCountResponse>)
    ),
    tag = "notes"
)]
#[debug_handler]
pub async fn list_tags(State(state): State<Arc<AppState>>) -> Response {
    let notes = state.service.notes().await;
    let tags: Vec<TagCountResponse> = view::tag_counts(&notes)
        .into_iter()
        .map(|(tag, count)| TagCountResponse { tag, count })
        .collect();

    (StatusCode::OK, Json(tags)).into_response()
}

#[utoipa::path(
    post,
    path = "/refresh",
    responses(
        (status = 200, description = "Cache reloaded", body = SessionResponse),
        (status = 409, description = "No user is signed in"),
        (status = 502, description = "Remote store error")
    ),
    tag = "session"
)]
#[debug_handler]
pub async fn refresh(State(state): State<Arc<AppState>>) -> Response {
    match state.service.load().await {
        Ok(()) => (StatusCode::OK, Json(session_response(&state).await)).into_response(),
        Err(e) => error_response("refresh notes", &e),
    }
}

#[utoipa::path(
    get,
    path = "/notifications",
    responses(
        (status = 200, description = "Notifications since the last call", body = Vec<NotificationResponse>)
    ),
    tag = "session"
)]
#[debug_handler]
pub async fn drain_notifications(State(state): State<Arc<AppState>>) -> Response {
    let notifications: Vec<NotificationResponse> =
        state.inbox.drain().into_iter().map(Into::into).collect();

    (StatusCode::OK, Json(notifications)).into_response()
}
