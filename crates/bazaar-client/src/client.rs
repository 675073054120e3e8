//! HTTP client for the bazaar REST API.
//!
//! Wraps `reqwest` with the server's `{data, meta}` / `{error}` envelopes,
//! bearer-token handling through a [`TokenStore`], and bounded retries.

use std::sync::Arc;
use std::time::Duration;

use bazaar_core::{ListingConfig, RatingSummary};
use chrono::{DateTime, Utc};
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::ClientError;
use crate::retry::{retry_with_backoff, DEFAULT_BACKOFF_BASE_MS, DEFAULT_MAX_RETRIES};
use crate::source::HttpPageSource;
use crate::token_store::{StoredTokens, TokenStore};

pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct TokenPairBody {
    access_token: String,
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
struct SignInBody {
    user: serde_json::Value,
    tokens: TokenPairBody,
}

/// Returned by [`ApiClient::request_otp`]; pass `temp_token` back to
/// [`ApiClient::verify_otp`] with the emailed code.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OtpChallenge {
    pub temp_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Retry settings shared by every request a client makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
        }
    }
}

/// Client for the bazaar REST API.
///
/// Use [`ApiClient::new`] with the server's base URL (a wiremock server in
/// tests) and a token store that holds the signed-in session, if any.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
    store: Arc<dyn TokenStore>,
    retry: RetryPolicy,
}

impl ApiClient {
    /// # Errors
    ///
    /// Returns [`ClientError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed, or [`ClientError::InvalidBaseUrl`] if
    /// `base_url` does not parse.
    pub fn new(
        base_url: &str,
        timeout_secs: u64,
        store: Arc<dyn TokenStore>,
    ) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(timeout_secs))
            .user_agent("bazaar-client/0.1")
            .build()?;

        // Exactly one trailing slash so joins append instead of replacing.
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised).map_err(|e| ClientError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            client,
            base_url,
            store,
            retry: RetryPolicy::default(),
        })
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// A page source for one listing, authenticated with the stored session.
    #[must_use]
    pub fn page_source<T>(&self, config: &ListingConfig) -> HttpPageSource<T> {
        HttpPageSource::new(
            self.client.clone(),
            self.base_url.clone(),
            &config.endpoint,
            Arc::clone(&self.store),
            self.retry,
        )
    }

    /// Password sign-in; the session is written to the token store.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Status`] for rejected credentials, or any
    /// transport, decoding, or token-store error.
    pub async fn login(&self, login: &str, password: &str) -> Result<StoredTokens, ClientError> {
        let url = join(&self.base_url, "/api/v1/auth/login")?;
        let body = serde_json::json!({ "login": login, "password": password });

        let (client, url, body) = (&self.client, &url, &body);
        let signed_in: SignInBody = retry_with_backoff(
            self.retry.max_retries,
            self.retry.backoff_base_ms,
            || async move {
                let response = client.post(url.clone()).json(body).send().await?;
                decode_envelope(response, "login").await
            },
        )
        .await?;

        self.save_sign_in(signed_in)
    }

    /// Asks the server to email a one-time code to `email`.
    ///
    /// Sent once: a repeated request would supersede the code already mailed.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Status`] for an invalid email or a delivery
    /// failure, or any transport or decoding error.
    pub async fn request_otp(&self, email: &str) -> Result<OtpChallenge, ClientError> {
        let url = join(&self.base_url, "/api/v1/auth/otp/request")?;
        let response = self
            .client
            .post(url)
            .json(&serde_json::json!({ "email": email }))
            .send()
            .await?;
        let challenge: OtpChallenge = decode_envelope(response, "otp request").await?;
        tracing::info!(expires_at = %challenge.expires_at, "one-time code requested");
        Ok(challenge)
    }

    /// Completes an OTP sign-in; the session is written to the token store.
    ///
    /// Sent once: the server consumes the code on the first valid attempt.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Status`] with status 401 for a wrong, expired
    /// or used code, or any transport, decoding, or token-store error.
    pub async fn verify_otp(
        &self,
        temp_token: &str,
        code: &str,
    ) -> Result<StoredTokens, ClientError> {
        let url = join(&self.base_url, "/api/v1/auth/otp/verify")?;
        let response = self
            .client
            .post(url)
            .json(&serde_json::json!({ "temp_token": temp_token, "code": code }))
            .send()
            .await?;
        let signed_in: SignInBody = decode_envelope(response, "otp verify").await?;
        self.save_sign_in(signed_in)
    }

    fn save_sign_in(&self, signed_in: SignInBody) -> Result<StoredTokens, ClientError> {
        let tokens = StoredTokens {
            access: signed_in.tokens.access_token,
            refresh: signed_in.tokens.refresh_token,
            user: signed_in.user,
        };
        self.store.save(&tokens)?;
        tracing::info!("signed in");
        Ok(tokens)
    }

    /// Exchanges the stored refresh token for a new pair.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Status`] with status 401 when there is no
    /// stored session or the refresh token is rejected.
    pub async fn refresh(&self) -> Result<StoredTokens, ClientError> {
        let Some(current) = self.store.load()? else {
            return Err(ClientError::Status {
                status: 401,
                code: "unauthorized".to_string(),
                message: "not signed in".to_string(),
            });
        };
        let url = join(&self.base_url, "/api/v1/auth/refresh")?;
        let body = serde_json::json!({ "refresh_token": current.refresh });

        let (client, url, body) = (&self.client, &url, &body);
        let pair: TokenPairBody = retry_with_backoff(
            self.retry.max_retries,
            self.retry.backoff_base_ms,
            || async move {
                let response = client.post(url.clone()).json(body).send().await?;
                decode_envelope(response, "refresh").await
            },
        )
        .await?;

        let tokens = StoredTokens {
            access: pair.access_token,
            refresh: pair.refresh_token,
            user: current.user,
        };
        self.store.save(&tokens)?;
        Ok(tokens)
    }

    /// Rates a product as the signed-in user. Rating again replaces the
    /// earlier rating.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Status`] with status 401 when there is no
    /// stored session, 400 for a rate outside 1-5, or 404 for an unknown
    /// product.
    pub async fn rate_product(
        &self,
        slug: &str,
        rate: i16,
        comment: Option<&str>,
    ) -> Result<RatingSummary, ClientError> {
        let Some(session) = self.store.load()? else {
            return Err(ClientError::Status {
                status: 401,
                code: "unauthorized".to_string(),
                message: "not signed in".to_string(),
            });
        };
        let url = join(&self.base_url, &format!("/api/v1/products/{slug}/ratings"))?;
        let body = serde_json::json!({ "rate": rate, "comment": comment });

        let (client, url, body, access) = (&self.client, &url, &body, &session.access);
        retry_with_backoff(
            self.retry.max_retries,
            self.retry.backoff_base_ms,
            || async move {
                let response = client
                    .post(url.clone())
                    .bearer_auth(access)
                    .json(body)
                    .send()
                    .await?;
                decode_envelope(response, "rate product").await
            },
        )
        .await
    }

    /// # Errors
    ///
    /// Returns [`ClientError`] if the token store cannot be read.
    pub fn saved_session(&self) -> Result<Option<StoredTokens>, ClientError> {
        self.store.load()
    }

    /// # Errors
    ///
    /// Returns [`ClientError::TokenFile`] if the stored session cannot be removed.
    pub fn sign_out(&self) -> Result<(), ClientError> {
        self.store.clear()
    }
}

pub(crate) fn join(base: &Url, path: &str) -> Result<Url, ClientError> {
    base.join(path.trim_start_matches('/'))
        .map_err(|e| ClientError::InvalidBaseUrl {
            url: format!("{base}{path}"),
            reason: e.to_string(),
        })
}

/// Unwraps `{data}` on success, or turns `{error: {code, message}}` into
/// [`ClientError::Status`].
pub(crate) async fn decode_envelope<T: DeserializeOwned>(
    response: Response,
    context: &str,
) -> Result<T, ClientError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let (code, message) = match serde_json::from_str::<ErrorEnvelope>(&body) {
            Ok(envelope) => (envelope.error.code, envelope.error.message),
            Err(_) => (
                "http_error".to_string(),
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string(),
            ),
        };
        return Err(ClientError::Status {
            status: status.as_u16(),
            code,
            message,
        });
    }

    serde_json::from_str::<DataEnvelope<T>>(&body)
        .map(|envelope| envelope.data)
        .map_err(|source| ClientError::Deserialize {
            context: context.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token_store::MemoryTokenStore;

    fn test_client(base_url: &str) -> ApiClient {
        ApiClient::new(base_url, 5, Arc::new(MemoryTokenStore::default()))
            .expect("client construction should not fail")
    }

    #[test]
    fn join_keeps_base_path() {
        let client = test_client("https://shop.example.com/bazaar");
        let url = join(client.base_url(), "/api/v1/vendors").expect("join");
        assert_eq!(url.as_str(), "https://shop.example.com/bazaar/api/v1/vendors");
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let result = ApiClient::new("not a url", 5, Arc::new(MemoryTokenStore::default()));
        assert!(matches!(result, Err(ClientError::InvalidBaseUrl { .. })));
    }
}
