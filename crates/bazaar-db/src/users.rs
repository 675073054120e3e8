//! Database operations for the `users` table.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgExecutor, PgPool};

use crate::DbError;

const MAX_USERNAME_ATTEMPTS: u32 = 50;

/// A row from the `users` table. `password_hash` is never serialized.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct UserRow {
    pub id: i64,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: String,
    pub is_active: bool,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for [`create_user`]. `email` must already be lower-cased.
#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub email: &'a str,
    pub username: &'a str,
    pub password_hash: Option<&'a str>,
    pub first_name: Option<&'a str>,
    pub last_name: Option<&'a str>,
    pub role: &'a str,
}

const USER_COLUMNS: &str = "id, email, username, password_hash, first_name, last_name, role, \
                            is_active, email_verified, created_at";

fn conflict_for(constraint: &str) -> DbError {
    if constraint.contains("username") {
        DbError::Conflict("Username already exists".to_string())
    } else {
        DbError::Conflict("Email already exists".to_string())
    }
}

/// Insert a new user.
///
/// # Errors
///
/// Returns [`DbError::Conflict`] with `"Email already exists"` or
/// `"Username already exists"` on a duplicate, or [`DbError::Sqlx`] on other
/// failures.
pub async fn create_user(pool: &PgPool, user: &NewUser<'_>) -> Result<UserRow, DbError> {
    insert_user(pool, user).await
}

pub(crate) async fn insert_user<'e>(
    executor: impl PgExecutor<'e>,
    user: &NewUser<'_>,
) -> Result<UserRow, DbError> {
    let result = sqlx::query_as::<_, UserRow>(&format!(
        "INSERT INTO users (email, username, password_hash, first_name, last_name, role) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING {USER_COLUMNS}"
    ))
    .bind(user.email)
    .bind(user.username)
    .bind(user.password_hash)
    .bind(user.first_name)
    .bind(user.last_name)
    .bind(user.role)
    .fetch_one(executor)
    .await;

    result.map_err(|e| {
        let err = DbError::from(e);
        match err.unique_violation() {
            Some(constraint) => conflict_for(&constraint),
            None => err,
        }
    })
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn find_user_by_email(pool: &PgPool, email: &str) -> Result<Option<UserRow>, DbError> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
    ))
    .bind(email)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn find_user_by_username(
    pool: &PgPool,
    username: &str,
) -> Result<Option<UserRow>, DbError> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
    ))
    .bind(username)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Looks a user up by email when `login` contains `@`, else by username.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn find_user_by_login(pool: &PgPool, login: &str) -> Result<Option<UserRow>, DbError> {
    if login.contains('@') {
        find_user_by_email(pool, &login.trim().to_lowercase()).await
    } else {
        find_user_by_username(pool, login.trim()).await
    }
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if no user has this id, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_user_by_id(pool: &PgPool, id: i64) -> Result<UserRow, DbError> {
    sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)
}

/// Username derived from an email's local part: `jane.doe@x.io` → `jane.doe`.
fn username_base(email: &str) -> String {
    let local = email.split('@').next().unwrap_or_default();
    let cleaned: String = local
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    if cleaned.is_empty() {
        "user".to_string()
    } else {
        cleaned
    }
}

/// Finds or creates the user behind a verified email and marks it verified.
///
/// New users get a password-less account with a username derived from the
/// email's local part, suffixed with a counter on collision.
///
/// # Errors
///
/// Returns [`DbError::Conflict`] if no free username can be found, or
/// [`DbError::Sqlx`] on failure.
pub async fn upsert_verified_email_user(pool: &PgPool, email: &str) -> Result<UserRow, DbError> {
    if let Some(user) = find_user_by_email(pool, email).await? {
        if user.email_verified {
            return Ok(user);
        }
        let user = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET email_verified = true, updated_at = NOW() \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(user.id)
        .fetch_one(pool)
        .await?;
        return Ok(user);
    }

    let base = username_base(email);
    for n in 0..MAX_USERNAME_ATTEMPTS {
        let username = if n == 0 {
            base.clone()
        } else {
            format!("{base}{n}")
        };

        let inserted = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (email, username, role, email_verified) \
             VALUES ($1, $2, 'customer', true) \
             ON CONFLICT DO NOTHING \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(email)
        .bind(&username)
        .fetch_optional(pool)
        .await?;

        if let Some(user) = inserted {
            tracing::info!(user_id = user.id, "created user from verified email");
            return Ok(user);
        }

        // A concurrent verify may have created the email row; take it.
        if let Some(user) = find_user_by_email(pool, email).await? {
            return Ok(user);
        }
    }

    Err(DbError::Conflict("Username already exists".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_base_uses_local_part() {
        assert_eq!(username_base("jane.doe@example.com"), "jane.doe");
        assert_eq!(username_base("a+tag@example.com"), "atag");
        assert_eq!(username_base("@example.com"), "user");
    }

    #[test]
    fn conflict_message_names_the_duplicate_field() {
        let msg = |c: &str| conflict_for(c).to_string();
        assert_eq!(msg("users_username_key"), "Username already exists");
        assert_eq!(msg("users_email_key"), "Email already exists");
    }
}
