pub mod client;
pub mod error;
pub(crate) mod retry;
pub mod reveal;
pub mod session;
pub mod source;
pub mod token_store;

pub use client::{ApiClient, OtpChallenge, RetryPolicy, DEFAULT_TIMEOUT_SECS};
pub use error::ClientError;
pub use reveal::{CategorySelector, FetchTicket, ListingQuery, RevealController, RevealState};
pub use session::ListingSession;
pub use source::{HttpPageSource, PageSource};
pub use token_store::{FileTokenStore, MemoryTokenStore, StoredTokens, TokenStore};
