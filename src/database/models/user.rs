use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::utils::logging::{log_database_error, log_database_operation};

const USER_COLUMNS: &str =
    "tg_id, name, gender, age, vk_id, username, registered_at, created_at, updated_at";

/// Values accepted by the `gender` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    /// `male`
    Male,
    /// `female`
    Female,
}

impl Gender {
    /// Stored representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            other => Err(format!("unknown gender '{other}'")),
        }
    }
}

/// A row of `users`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    /// Telegram user id. Never changes.
    pub tg_id: i64,
    /// Display name.
    pub name: Option<String>,
    /// 'male', 'female'
    pub gender: Option<String>,
    /// Between 14 and 100.
    pub age: Option<i64>,
    /// Numeric VK id or a screen name, as the user typed it.
    pub vk_id: Option<String>,
    /// Telegram username without `@`.
    pub username: Option<String>,
    /// First registration, UTC.
    pub registered_at: String,
    /// Row creation, UTC.
    pub created_at: String,
    /// Last change, UTC. Maintained by the store.
    pub updated_at: String,
}

/// Profile fields written by [`User::upsert`]. `None` leaves the stored value alone.
#[derive(Debug, Clone, Default)]
pub struct UserProfile {
    /// Display name.
    pub name: Option<String>,
    /// Gender.
    pub gender: Option<Gender>,
    /// Age in years.
    pub age: Option<i64>,
    /// VK id or screen name.
    pub vk_id: Option<String>,
    /// Telegram username.
    pub username: Option<String>,
}

/// Aggregate counts for the admin summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct UserStats {
    /// All users.
    pub total_users: i64,
    /// Users with a VK id.
    pub users_with_vk: i64,
    /// Users with gender `male`.
    pub male_users: i64,
    /// Users with gender `female`.
    pub female_users: i64,
    /// Users registered since midnight UTC.
    pub today_registrations: i64,
}

impl User {
    /// Typed gender, if set.
    pub fn gender(&self) -> Option<Gender> {
        self.gender.as_deref().and_then(|g| g.parse().ok())
    }

    /// Inserts the user or merges `profile` into the stored row.
    pub async fn upsert(
        pool: &sqlx::SqlitePool,
        tg_id: i64,
        profile: &UserProfile,
    ) -> Result<Self, sqlx::Error> {
        log_database_operation("UPSERT", "users", Some(&format!("tg_id={tg_id}")));

        let result = sqlx::query(
            r#"
            INSERT INTO users (tg_id, name, gender, age, vk_id, username)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (tg_id) DO UPDATE
            SET name = COALESCE(excluded.name, users.name),
                gender = COALESCE(excluded.gender, users.gender),
                age = COALESCE(excluded.age, users.age),
                vk_id = COALESCE(excluded.vk_id, users.vk_id),
                username = COALESCE(excluded.username, users.username)
            "#,
        )
        .bind(tg_id)
        .bind(&profile.name)
        .bind(profile.gender.map(|g| g.as_str()))
        .bind(profile.age)
        .bind(&profile.vk_id)
        .bind(&profile.username)
        .execute(pool)
        .await;

        if let Err(e) = result {
            log_database_error("UPSERT", "users", &e.to_string(), Some(&format!("tg_id={tg_id}")));
            return Err(e);
        }

        Self::find_by_tg_id(pool, tg_id)
            .await?
            .ok_or_else(|| sqlx::Error::RowNotFound)
    }

    /// Looks a user up by Telegram id.
    pub async fn find_by_tg_id(
        pool: &sqlx::SqlitePool,
        tg_id: i64,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE tg_id = ?"))
            .bind(tg_id)
            .fetch_optional(pool)
            .await
    }

    /// Case-insensitive lookup by Telegram username, without the leading `@`.
    pub async fn find_by_username(
        pool: &sqlx::SqlitePool,
        username: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let username = username.trim().trim_start_matches('@');
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE LOWER(username) = LOWER(?)"
        ))
        .bind(username)
        .fetch_optional(pool)
        .await
    }

    /// Returns `false` when no such user exists.
    pub async fn set_vk_id(
        pool: &sqlx::SqlitePool,
        tg_id: i64,
        vk_id: &str,
    ) -> Result<bool, sqlx::Error> {
        log_database_operation("UPDATE", "users", Some(&format!("tg_id={tg_id} vk_id")));
        let result = sqlx::query("UPDATE users SET vk_id = ? WHERE tg_id = ?")
            .bind(vk_id)
            .bind(tg_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Every Telegram id, ascending.
    pub async fn all_ids(pool: &sqlx::SqlitePool) -> Result<Vec<i64>, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT tg_id FROM users ORDER BY tg_id")
            .fetch_all(pool)
            .await
    }

    /// VK ids of every user that linked one, keyed by Telegram id.
    pub async fn vk_ids(pool: &sqlx::SqlitePool) -> Result<HashMap<i64, String>, sqlx::Error> {
        let rows = sqlx::query_as::<_, (i64, String)>(
            "SELECT tg_id, vk_id FROM users WHERE vk_id IS NOT NULL",
        )
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().collect())
    }

    /// Counts for [`UserStats`].
    pub async fn stats(pool: &sqlx::SqlitePool) -> Result<UserStats, sqlx::Error> {
        // registered_at is stored as 'YYYY-MM-DD HH:MM:SS.SSS' UTC, so a text
        // comparison against date('now') selects today's rows.
        sqlx::query_as::<_, UserStats>(
            r#"
            SELECT
                COUNT(*) AS total_users,
                COUNT(vk_id) AS users_with_vk,
                COUNT(CASE WHEN gender = 'male' THEN 1 END) AS male_users,
                COUNT(CASE WHEN gender = 'female' THEN 1 END) AS female_users,
                COUNT(CASE WHEN registered_at >= date('now') THEN 1 END) AS today_registrations
            FROM users
            "#,
        )
        .fetch_one(pool)
        .await
    }

    /// Administrative removal. Attendance marks of the user are deleted with it.
    pub async fn delete(pool: &sqlx::SqlitePool, tg_id: i64) -> Result<bool, sqlx::Error> {
        log_database_operation("DELETE", "users", Some(&format!("tg_id={tg_id}")));
        let result = sqlx::query("DELETE FROM users WHERE tg_id = ?")
            .bind(tg_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
