use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::utils::logging::log_database_operation;

/// An event announcement. Posters are deactivated, not deleted, once the event is over.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Poster {
    /// Row id.
    pub id: i64,
    /// Telegram file id of the poster image.
    pub file_id: String,
    /// Text shown under the image.
    pub caption: Option<String>,
    /// Where tickets are sold.
    pub ticket_url: Option<String>,
    /// Creation time, UTC.
    pub created_at: String,
    /// Cleared by [`Poster::deactivate`].
    pub is_active: bool,
}

impl Poster {
    /// Inserts an active poster.
    pub async fn create(
        pool: &sqlx::SqlitePool,
        file_id: &str,
        caption: Option<&str>,
        ticket_url: Option<&str>,
    ) -> Result<Self, sqlx::Error> {
        log_database_operation("INSERT", "posters", None);
        let result = sqlx::query("INSERT INTO posters (file_id, caption, ticket_url) VALUES (?, ?, ?)")
            .bind(file_id)
            .bind(caption)
            .bind(ticket_url)
            .execute(pool)
            .await?;

        Self::find_by_id(pool, result.last_insert_rowid())
            .await?
            .ok_or_else(|| sqlx::Error::RowNotFound)
    }

    /// Looks a poster up by id, active or not.
    pub async fn find_by_id(
        pool: &sqlx::SqlitePool,
        poster_id: i64,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Poster>(
            "SELECT id, file_id, caption, ticket_url, created_at, is_active FROM posters WHERE id = ?"
        )
        .bind(poster_id)
        .fetch_optional(pool)
        .await
    }

    /// Active posters, newest first.
    pub async fn list_active(pool: &sqlx::SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Poster>(
            "SELECT id, file_id, caption, ticket_url, created_at, is_active FROM posters WHERE is_active = 1 ORDER BY created_at DESC, id DESC"
        )
        .fetch_all(pool)
        .await
    }

    /// Newest active poster.
    pub async fn latest_active(pool: &sqlx::SqlitePool) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Poster>(
            "SELECT id, file_id, caption, ticket_url, created_at, is_active FROM posters WHERE is_active = 1 ORDER BY created_at DESC, id DESC LIMIT 1"
        )
        .fetch_optional(pool)
        .await
    }

    /// Soft delete. Returns `false` if the poster does not exist or is already inactive.
    pub async fn deactivate(pool: &sqlx::SqlitePool, poster_id: i64) -> Result<bool, sqlx::Error> {
        log_database_operation("DEACTIVATE", "posters", Some(&format!("id={poster_id}")));
        let result = sqlx::query("UPDATE posters SET is_active = 0 WHERE id = ? AND is_active = 1")
            .bind(poster_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Administrative removal; attendance marks for the poster go with it.
    pub async fn delete(pool: &sqlx::SqlitePool, poster_id: i64) -> Result<bool, sqlx::Error> {
        log_database_operation("DELETE", "posters", Some(&format!("id={poster_id}")));
        let result = sqlx::query("DELETE FROM posters WHERE id = ?")
            .bind(poster_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
