//! Email one-time codes bound to a hashed temp token.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use subtle::ConstantTimeEq;

use crate::DbError;

/// Input for [`create_email_otp`]. Only the token's hash is ever stored.
#[derive(Debug, Clone)]
pub struct NewEmailOtp<'a> {
    pub email: &'a str,
    pub code: &'a str,
    pub temp_token_hash: &'a str,
    pub ttl_mins: i64,
}

/// Outcome of a verification attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtpCheck {
    /// Code matched; the row is now consumed.
    Verified { email: String },
    Mismatch { attempts_left: i32 },
    Expired,
    /// Attempt budget already spent.
    Exhausted,
    /// Already verified once (or superseded by a newer code).
    Consumed,
    /// No row for this temp token.
    Unknown,
}

#[derive(Debug, sqlx::FromRow)]
struct OtpLockRow {
    id: i64,
    email: String,
    code: String,
    attempts: i32,
    consumed: bool,
    expired: bool,
}

/// Store a new code for `email`, retiring any unconsumed earlier ones.
///
/// Returns the expiry timestamp.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any statement fails.
pub async fn create_email_otp(
    pool: &PgPool,
    otp: &NewEmailOtp<'_>,
) -> Result<DateTime<Utc>, DbError> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        "UPDATE email_otps SET consumed_at = NOW() \
         WHERE email = $1 AND consumed_at IS NULL",
    )
    .bind(otp.email)
    .execute(&mut *tx)
    .await?;

    let expires_at: DateTime<Utc> = sqlx::query_scalar(
        "INSERT INTO email_otps (email, code, temp_token_hash, expires_at) \
         VALUES ($1, $2, $3, NOW() + make_interval(mins => $4::INT)) \
         RETURNING expires_at",
    )
    .bind(otp.email)
    .bind(otp.code)
    .bind(otp.temp_token_hash)
    .bind(i32::try_from(otp.ttl_mins).unwrap_or(i32::MAX))
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(expires_at)
}

/// Check `code` against the row for `temp_token_hash`.
///
/// The row is locked for the duration of the check, so concurrent verifies
/// of the same token see exactly one `Verified`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any statement fails.
pub async fn verify_email_otp(
    pool: &PgPool,
    temp_token_hash: &str,
    code: &str,
    max_attempts: i32,
) -> Result<OtpCheck, DbError> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query_as::<_, OtpLockRow>(
        "SELECT id, email, code, attempts, \
                consumed_at IS NOT NULL AS consumed, \
                expires_at <= NOW() AS expired \
         FROM email_otps \
         WHERE temp_token_hash = $1 \
         FOR UPDATE",
    )
    .bind(temp_token_hash)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(row) = row else {
        return Ok(OtpCheck::Unknown);
    };
    if row.consumed {
        return Ok(OtpCheck::Consumed);
    }
    if row.expired {
        return Ok(OtpCheck::Expired);
    }
    if row.attempts >= max_attempts {
        return Ok(OtpCheck::Exhausted);
    }

    let matches: bool = row.code.as_bytes().ct_eq(code.as_bytes()).into();
    if !matches {
        sqlx::query("UPDATE email_otps SET attempts = attempts + 1 WHERE id = $1")
            .bind(row.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        return Ok(OtpCheck::Mismatch {
            attempts_left: (max_attempts - row.attempts - 1).max(0),
        });
    }

    sqlx::query("UPDATE email_otps SET consumed_at = NOW() WHERE id = $1")
        .bind(row.id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(OtpCheck::Verified { email: row.email })
}

/// Delete consumed and expired rows. Returns the number removed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn purge_stale_otps(pool: &PgPool) -> Result<u64, DbError> {
    let result =
        sqlx::query("DELETE FROM email_otps WHERE consumed_at IS NOT NULL OR expires_at < NOW()")
            .execute(pool)
            .await?;
    Ok(result.rows_affected())
}
