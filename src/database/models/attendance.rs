use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::utils::logging::log_database_operation;

/// A user's mark that they attended the event behind a poster.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Attendance {
    /// Row id.
    pub id: i64,
    /// `users.tg_id` of the attendee.
    pub user_id: i64,
    /// `posters.id` of the event.
    pub poster_id: i64,
    /// When the mark was made, UTC.
    pub marked_at: String,
}

impl Attendance {
    /// Fails with a unique violation if the user already marked this poster.
    pub async fn mark(
        pool: &sqlx::SqlitePool,
        user_id: i64,
        poster_id: i64,
    ) -> Result<Self, sqlx::Error> {
        log_database_operation(
            "INSERT",
            "attendances",
            Some(&format!("user_id={user_id} poster_id={poster_id}")),
        );
        let result = sqlx::query("INSERT INTO attendances (user_id, poster_id) VALUES (?, ?)")
            .bind(user_id)
            .bind(poster_id)
            .execute(pool)
            .await?;

        sqlx::query_as::<_, Attendance>(
            "SELECT id, user_id, poster_id, marked_at FROM attendances WHERE id = ?"
        )
        .bind(result.last_insert_rowid())
        .fetch_one(pool)
        .await
    }

    /// Whether the user already marked this poster.
    pub async fn exists(
        pool: &sqlx::SqlitePool,
        user_id: i64,
        poster_id: i64,
    ) -> Result<bool, sqlx::Error> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM attendances WHERE user_id = ? AND poster_id = ?"
        )
        .bind(user_id)
        .bind(poster_id)
        .fetch_one(pool)
        .await?;

        Ok(count > 0)
    }

    /// Marks of one user, oldest first.
    pub async fn find_by_user(
        pool: &sqlx::SqlitePool,
        user_id: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Attendance>(
            "SELECT id, user_id, poster_id, marked_at FROM attendances WHERE user_id = ? ORDER BY marked_at, id"
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    /// Number of attendees of one poster.
    pub async fn count_for_poster(
        pool: &sqlx::SqlitePool,
        poster_id: i64,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM attendances WHERE poster_id = ?")
            .bind(poster_id)
            .fetch_one(pool)
            .await
    }
}
