use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use bazaar_core::Page;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;

use crate::client::{decode_envelope, join, RetryPolicy};
use crate::error::ClientError;
use crate::retry::retry_with_backoff;
use crate::reveal::ListingQuery;
use crate::token_store::TokenStore;

/// Produces one listing window for a query.
pub trait PageSource<T>: Send + Sync {
    fn fetch(
        &self,
        query: &ListingQuery,
    ) -> impl Future<Output = Result<Page<T>, ClientError>> + Send;
}

/// [`PageSource`] backed by a listing endpoint of the REST API.
pub struct HttpPageSource<T> {
    client: Client,
    base_url: Url,
    endpoint: String,
    store: Arc<dyn TokenStore>,
    retry: RetryPolicy,
    _item: PhantomData<fn() -> T>,
}

impl<T> HttpPageSource<T> {
    pub(crate) fn new(
        client: Client,
        base_url: Url,
        endpoint: &str,
        store: Arc<dyn TokenStore>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            base_url,
            endpoint: endpoint.to_string(),
            store,
            retry,
            _item: PhantomData,
        }
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn window_url(&self, query: &ListingQuery) -> Result<Url, ClientError> {
        let mut url = join(&self.base_url, &self.endpoint)?;
        url.query_pairs_mut().extend_pairs(query.to_params());
        Ok(url)
    }
}

impl<T: DeserializeOwned> HttpPageSource<T> {
    async fn request_window(&self, url: &Url) -> Result<Page<T>, ClientError> {
        let mut request = self.client.get(url.clone());
        if let Some(tokens) = self.store.load()? {
            request = request.bearer_auth(tokens.access);
        }
        let response = request.send().await?;
        decode_envelope(response, &self.endpoint).await
    }
}

impl<T: DeserializeOwned + Send> PageSource<T> for HttpPageSource<T> {
    async fn fetch(&self, query: &ListingQuery) -> Result<Page<T>, ClientError> {
        let url = self.window_url(query)?;
        tracing::debug!(%url, "fetching listing window");
        let url = &url;
        retry_with_backoff(self.retry.max_retries, self.retry.backoff_base_ms, move || {
            self.request_window(url)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use bazaar_core::{CategoryRank, SortKey};

    use super::*;
    use crate::reveal::CategorySelector;
    use crate::token_store::MemoryTokenStore;

    #[test]
    fn window_url_appends_query_params() {
        let source: HttpPageSource<serde_json::Value> = HttpPageSource::new(
            Client::new(),
            Url::parse("http://localhost:3000/").expect("url"),
            "/api/v1/catalog/products",
            Arc::new(MemoryTokenStore::default()),
            RetryPolicy::default(),
        );
        let mut query = ListingQuery::new(10);
        query.sort = SortKey::PriceLow;
        query.category = Some(CategorySelector {
            rank: CategoryRank::Super,
            slug: "electronics".to_string(),
        });

        let url = source.window_url(&query).expect("url");
        assert_eq!(
            url.as_str(),
            "http://localhost:3000/api/v1/catalog/products?rank=super&category_slug=electronics&sort=price-low&page_size=10"
        );
    }
}
