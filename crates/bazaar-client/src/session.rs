//! Drives a [`RevealController`] against a [`PageSource`].
//!
//! At most one fetch is in flight per session. Issuing a new one aborts the
//! previous task; the controller's ticket generations already make its
//! completion stale, aborting just stops the wasted request.

use std::sync::Arc;
use std::time::Duration;

use bazaar_core::{AppError, ListingConfig, Page, SortKey};
use tokio::task::JoinHandle;

use crate::client::DEFAULT_TIMEOUT_SECS;
use crate::error::ClientError;
use crate::reveal::{CategorySelector, FetchTicket, RevealController, RevealState};
use crate::source::PageSource;

type InFlight<T> = (FetchTicket, JoinHandle<Result<Page<T>, ClientError>>);

pub struct ListingSession<T, S> {
    controller: RevealController<T>,
    source: Arc<S>,
    timeout: Duration,
    in_flight: Option<InFlight<T>>,
}

impl<T, S> ListingSession<T, S>
where
    T: Send + 'static,
    S: PageSource<T> + 'static,
{
    #[must_use]
    pub fn new(config: ListingConfig, source: S) -> Self {
        Self::from_controller(RevealController::new(config), source)
    }

    /// Wraps a controller that was already seeded with a query.
    #[must_use]
    pub fn from_controller(controller: RevealController<T>, source: S) -> Self {
        Self {
            controller,
            source: Arc::new(source),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            in_flight: None,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn controller(&self) -> &RevealController<T> {
        &self.controller
    }

    #[must_use]
    pub fn state(&self) -> RevealState {
        self.controller.state()
    }

    #[must_use]
    pub fn items(&self) -> &[T] {
        self.controller.items()
    }

    #[must_use]
    pub fn is_fetching(&self) -> bool {
        self.in_flight.is_some()
    }

    fn dispatch(&mut self, ticket: FetchTicket) {
        if let Some((previous, handle)) = self.in_flight.take() {
            tracing::debug!(generation = previous.generation, "aborting superseded fetch");
            handle.abort();
        }

        let source = Arc::clone(&self.source);
        let query = ticket.query.clone();
        let timeout = self.timeout;
        let handle = tokio::spawn(async move {
            match tokio::time::timeout(timeout, source.fetch(&query)).await {
                Ok(result) => result,
                Err(_) => Err(ClientError::Timeout),
            }
        });
        self.in_flight = Some((ticket, handle));
    }

    /// Issues the first fetch. Returns `false` if the session already started.
    pub fn start(&mut self) -> bool {
        match self.controller.start() {
            Some(ticket) => {
                self.dispatch(ticket);
                true
            }
            None => false,
        }
    }

    /// Grows the window by one step. Returns `false` unless more can load.
    pub fn load_more(&mut self) -> bool {
        match self.controller.load_more() {
            Some(ticket) => {
                self.dispatch(ticket);
                true
            }
            None => false,
        }
    }

    /// Re-issues the last failed query. Returns `false` if nothing failed.
    pub fn retry(&mut self) -> bool {
        match self.controller.retry() {
            Some(ticket) => {
                self.dispatch(ticket);
                true
            }
            None => false,
        }
    }

    /// Switches filter or sort; always issues a fresh fetch.
    pub fn change_query(&mut self, category: Option<CategorySelector>, sort: SortKey) {
        let ticket = self.controller.change_query(category, sort);
        self.dispatch(ticket);
    }

    /// Waits for the in-flight fetch and applies its result.
    ///
    /// Returns the resulting state. A no-op when nothing is in flight.
    pub async fn settle(&mut self) -> RevealState {
        let Some((ticket, handle)) = self.in_flight.take() else {
            return self.controller.state();
        };

        match handle.await {
            Ok(Ok(page)) => {
                self.controller.on_success(&ticket, page);
            }
            Ok(Err(err)) => {
                self.controller.on_failure(&ticket, err.to_app_error());
            }
            Err(join_err) if join_err.is_cancelled() => {}
            Err(join_err) => {
                tracing::error!(error = %join_err, "listing fetch task panicked");
                self.controller.on_failure(
                    &ticket,
                    AppError::Transient("listing fetch failed".to_string()),
                );
            }
        }
        self.controller.state()
    }

    /// Starts the listing and reveals up to `max_pages` windows.
    ///
    /// Stops early once the listing is exhausted, empty, or a fetch fails.
    pub async fn reveal(&mut self, max_pages: usize) -> RevealState {
        if max_pages == 0 {
            return self.controller.state();
        }
        if self.controller.state() == RevealState::Idle {
            self.start();
        }
        let mut state = self.settle().await;
        for _ in 1..max_pages {
            if self.controller.last_error().is_some() || !self.load_more() {
                break;
            }
            state = self.settle().await;
        }
        state
    }
}

impl<T, S> Drop for ListingSession<T, S> {
    fn drop(&mut self) {
        if let Some((_, handle)) = self.in_flight.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use bazaar_core::{CategoryRank, ListingKind};

    use super::*;
    use crate::reveal::ListingQuery;

    /// Serves windows over `1..=total`, optionally failing the first few calls
    /// or sleeping before answering.
    struct FakeSource {
        total: u32,
        fail_first: u32,
        delay: Option<Duration>,
        calls: AtomicU32,
    }

    impl FakeSource {
        fn new(total: u32) -> Self {
            Self {
                total,
                fail_first: 0,
                delay: None,
                calls: AtomicU32::new(0),
            }
        }
    }

    impl PageSource<u32> for FakeSource {
        async fn fetch(&self, query: &ListingQuery) -> Result<Page<u32>, ClientError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if call < self.fail_first {
                return Err(ClientError::Status {
                    status: 503,
                    code: "unavailable".to_string(),
                    message: "service temporarily unavailable".to_string(),
                });
            }
            let size = u32::try_from(query.page_size).expect("page size");
            let items: Vec<u32> = (1..=self.total.min(size)).collect();
            Ok(Page::from_window(items, query.page_size, i64::from(self.total)))
        }
    }

    fn shop(source: FakeSource) -> ListingSession<u32, FakeSource> {
        ListingSession::new(ListingConfig::preset(ListingKind::Shop), source)
    }

    #[tokio::test]
    async fn reveal_walks_until_exhausted() {
        let mut session = shop(FakeSource::new(23));
        let state = session.reveal(5).await;
        assert_eq!(state, RevealState::Exhausted);
        assert_eq!(session.items().len(), 23);
        assert_eq!(session.controller().total_matched(), 23);
        assert!(!session.is_fetching());
    }

    #[tokio::test]
    async fn reveal_stops_at_page_limit() {
        let mut session = shop(FakeSource::new(100));
        let state = session.reveal(2).await;
        assert_eq!(state, RevealState::Loaded);
        assert_eq!(session.items().len(), 20);
    }

    #[tokio::test]
    async fn failure_then_retry_recovers() {
        let mut source = FakeSource::new(5);
        source.fail_first = 1;
        let mut session = shop(source);

        assert!(session.start());
        assert_eq!(session.settle().await, RevealState::Empty);
        assert!(matches!(
            session.controller().last_error(),
            Some(AppError::Transient(_))
        ));

        assert!(session.retry());
        assert_eq!(session.settle().await, RevealState::Exhausted);
        assert_eq!(session.items(), &[1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn slow_source_times_out() {
        let mut source = FakeSource::new(5);
        source.delay = Some(Duration::from_millis(200));
        let mut session = shop(source).with_timeout(Duration::from_millis(20));

        session.start();
        assert_eq!(session.settle().await, RevealState::Empty);
        assert!(session
            .controller()
            .last_error()
            .is_some_and(AppError::is_transient));
    }

    #[tokio::test]
    async fn change_query_supersedes_in_flight_fetch() {
        let mut source = FakeSource::new(40);
        source.delay = Some(Duration::from_millis(30));
        let mut session = shop(source);

        session.start();
        session.change_query(
            Some(CategorySelector {
                rank: CategoryRank::Super,
                slug: "electronics".to_string(),
            }),
            SortKey::PriceLow,
        );
        assert_eq!(session.settle().await, RevealState::Loaded);
        assert_eq!(session.items().len(), 10);
        assert_eq!(session.controller().query().sort, SortKey::PriceLow);
        assert!(!session.is_fetching());
    }

    #[tokio::test]
    async fn settle_without_fetch_is_a_no_op() {
        let mut session = shop(FakeSource::new(3));
        assert_eq!(session.settle().await, RevealState::Idle);
    }
}
