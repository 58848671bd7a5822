use async_trait::async_trait;
use tokio_postgres::{Client, NoTls, Row};

use super::{
    FolderColumn, NoteColumn, Order, RemoteStore, StoreError, embedded::migrations,
};
use crate::models::{Folder, NewFolder, NewNote, Note, NoteChanges, UserId};

const NOTE_COLUMNS: &str = "id, user_id, title, content, is_favorite, tags, created_at, updated_at";
const FOLDER_COLUMNS: &str = "id, user_id, name, created_at, updated_at";

pub struct PgStore {
    client: Client,
}

impl PgStore {
    pub async fn new(database_dsn: &str) -> Result<Self, tokio_postgres::Error> {
        let (client, con) = tokio_postgres::connect(database_dsn, NoTls).await?;

        tokio::spawn(async move {
            if let Err(e) = con.await {
                tracing::error!("connection error: {}", e);
            }
        });

        Ok(Self { client })
    }

    pub async fn migrate(&mut self) -> Result<(), refinery::Error> {
        let migrations_report = migrations::runner().run_async(&mut self.client).await?;

        for migration in migrations_report.applied_migrations() {
            tracing::info!(
                "Migration Applied -  Name: {}, Version: {}",
                migration.name(),
                migration.version()
            );
        }

        tracing::info!("DB migrations finished!");

        Ok(())
    }
}

fn note_from_row(row: &Row) -> Note {
    Note {
        id: row.get("id"),
        user_id: UserId::new(row.get::<_, String>("user_id")),
        title: row.get("title"),
        content: row.get("content"),
        is_favorite: row.get("is_favorite"),
        tags: row.get("tags"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn folder_from_row(row: &Row) -> Folder {
    Folder {
        id: row.get("id"),
        user_id: UserId::new(row.get::<_, String>("user_id")),
        name: row.get("name"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[async_trait]
impl RemoteStore for PgStore {
    async fn select_notes(
        &self,
        owner: &UserId,
        order: Order<NoteColumn>,
    ) -> Result<Vec<Note>, StoreError> {
        let query = format!(
            "SELECT {NOTE_COLUMNS} FROM notes WHERE user_id = $1 ORDER BY {}",
            order.sql()
        );
        let rows = self.client.query(query.as_str(), &[&owner.as_str()]).await?;

        Ok(rows.iter().map(note_from_row).collect())
    }

    async fn insert_note(&self, note: NewNote) -> Result<Note, StoreError> {
        let query = format!(
            "INSERT INTO notes (user_id, title, content) VALUES ($1, $2, $3) RETURNING {NOTE_COLUMNS}"
        );
        let row = self
            .client
            .query_one(query.as_str(), &[&note.user_id.as_str(), &note.title, &note.content])
            .await?;

        Ok(note_from_row(&row))
    }

    async fn update_note(
        &self,
        owner: &UserId,
        id: &str,
        changes: NoteChanges,
    ) -> Result<Note, StoreError> {
        let query = format!(
            "UPDATE notes SET \
                title = COALESCE($3, title), \
                content = COALESCE($4, content), \
                is_favorite = COALESCE($5, is_favorite), \
                tags = COALESCE($6, tags), \
                updated_at = now() \
             WHERE id = $1 AND user_id = $2 RETURNING {NOTE_COLUMNS}"
        );
        let row = self
            .client
            .query_opt(
                query.as_str(),
                &[
                    &id,
                    &owner.as_str(),
                    &changes.title,
                    &changes.content,
                    &changes.is_favorite,
                    &changes.tags,
                ],
            )
            .await?;

        row.map(|row| note_from_row(&row))
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn delete_note(&self, owner: &UserId, id: &str) -> Result<(), StoreError> {
        let rows = self
            .client
            .execute(
                "DELETE FROM notes WHERE id = $1 AND user_id = $2",
                &[&id, &owner.as_str()],
            )
            .await?;

        if rows == 1 {
            Ok(())
        } else {
            Err(StoreError::NotFound(id.to_string()))
        }
    }

    async fn select_folders(
        &self,
        owner: &UserId,
        order: Order<FolderColumn>,
    ) -> Result<Vec<Folder>, StoreError> {
        let query = format!(
            "SELECT {FOLDER_COLUMNS} FROM folders WHERE user_id = $1 ORDER BY {}",
            order.sql()
        );
        let rows = self.client.query(query.as_str(), &[&owner.as_str()]).await?;

        Ok(rows.iter().map(folder_from_row).collect())
    }

    async fn insert_folder(&self, folder: NewFolder) -> Result<Folder, StoreError> {
        let query = format!(
            "INSERT INTO folders (user_id, name) VALUES ($1, $2) RETURNING {FOLDER_COLUMNS}"
        );
        let row = self
            .client
            .query_one(query.as_str(), &[&folder.user_id.as_str(), &folder.name])
            .await?;

        Ok(folder_from_row(&row))
    }
}
