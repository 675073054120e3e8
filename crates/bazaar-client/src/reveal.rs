//! Incremental reveal ("load more") controller for paged listings.
//!
//! Each fetch re-queries the window `[0, page_size)` with a growing
//! `page_size`; items beyond what is already visible are appended. The
//! controller is a plain state machine: it hands out [`FetchTicket`]s and
//! expects the caller to report each completion back with the same ticket.
//!
//! The window never grows past [`MAX_PAGE_SIZE`], the largest window a
//! listing endpoint serves. A listing that reaches it settles in
//! [`RevealState::Exhausted`] even when more rows match.

use bazaar_core::{AppError, CategoryRank, ListingConfig, Page, SortKey, MAX_PAGE_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealState {
    Idle,
    Loading,
    Loaded,
    Exhausted,
    Empty,
}

/// A category filter as a listing endpoint accepts it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorySelector {
    pub rank: CategoryRank,
    pub slug: String,
}

/// Everything a listing endpoint needs to produce one window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingQuery {
    pub sort: SortKey,
    pub category: Option<CategorySelector>,
    /// Dashboard status filter (`active`, `inactive`, order statuses).
    pub status: Option<String>,
    /// Product name search.
    pub search: Option<String>,
    pub page_size: i64,
}

impl ListingQuery {
    #[must_use]
    pub fn new(page_size: i64) -> Self {
        Self {
            sort: SortKey::default(),
            category: None,
            status: None,
            search: None,
            page_size,
        }
    }

    /// Query-string pairs in the order the server documents them.
    #[must_use]
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::with_capacity(6);
        if let Some(category) = &self.category {
            params.push(("rank", category.rank.as_str().to_string()));
            params.push(("category_slug", category.slug.clone()));
        }
        if let Some(status) = &self.status {
            params.push(("status", status.clone()));
        }
        if let Some(search) = &self.search {
            params.push(("q", search.clone()));
        }
        params.push(("sort", self.sort.as_str().to_string()));
        params.push(("page_size", self.page_size.to_string()));
        params
    }
}

/// Identifies one issued fetch. Completions carrying an older generation
/// than the controller's current one are stale and ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub generation: u64,
    pub query: ListingQuery,
}

#[derive(Debug)]
pub struct RevealController<T> {
    config: ListingConfig,
    state: RevealState,
    /// The last query whose window was applied, or the initial one.
    query: ListingQuery,
    /// Set by a failed fetch; `retry` re-issues it.
    failed: Option<ListingQuery>,
    items: Vec<T>,
    total_matched: i64,
    generation: u64,
    last_error: Option<AppError>,
}

impl<T> RevealController<T> {
    #[must_use]
    pub fn new(config: ListingConfig) -> Self {
        let query = ListingQuery::new(config.initial_page_size);
        Self {
            config,
            state: RevealState::Idle,
            query,
            failed: None,
            items: Vec::new(),
            total_matched: 0,
            generation: 0,
            last_error: None,
        }
    }

    /// Seeds the sort and filter used by the first [`start`](Self::start).
    #[must_use]
    pub fn with_query(mut self, category: Option<CategorySelector>, sort: SortKey) -> Self {
        self.query.category = category;
        self.query.sort = sort;
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: Option<String>) -> Self {
        self.query.status = status;
        self
    }

    /// Blank terms are dropped.
    #[must_use]
    pub fn with_search(mut self, search: Option<String>) -> Self {
        self.query.search = search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        self
    }

    #[must_use]
    pub fn state(&self) -> RevealState {
        self.state
    }

    #[must_use]
    pub fn items(&self) -> &[T] {
        &self.items
    }

    #[must_use]
    pub fn total_matched(&self) -> i64 {
        self.total_matched
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&AppError> {
        self.last_error.as_ref()
    }

    /// The committed query: a grown window only lands here once its fetch
    /// succeeds.
    #[must_use]
    pub fn query(&self) -> &ListingQuery {
        &self.query
    }

    #[must_use]
    pub fn config(&self) -> &ListingConfig {
        &self.config
    }

    #[must_use]
    pub fn can_load_more(&self) -> bool {
        self.state == RevealState::Loaded && self.query.page_size < MAX_PAGE_SIZE
    }

    fn issue(&mut self, query: ListingQuery) -> FetchTicket {
        self.generation += 1;
        self.state = RevealState::Loading;
        FetchTicket {
            generation: self.generation,
            query,
        }
    }

    /// First fetch. Refused unless the controller is idle.
    pub fn start(&mut self) -> Option<FetchTicket> {
        (self.state == RevealState::Idle).then(|| self.issue(self.query.clone()))
    }

    /// New filter or sort: clears the list and starts over at the initial
    /// page size. Any in-flight fetch becomes stale.
    pub fn change_query(
        &mut self,
        category: Option<CategorySelector>,
        sort: SortKey,
    ) -> FetchTicket {
        self.items.clear();
        self.total_matched = 0;
        self.last_error = None;
        self.failed = None;
        self.query.category = category;
        self.query.sort = sort;
        self.query.page_size = self.config.initial_page_size;
        self.issue(self.query.clone())
    }

    /// Requests the committed window grown by one step, capped at
    /// [`MAX_PAGE_SIZE`]. Only allowed from `Loaded`.
    ///
    /// After a failed step this asks for the same window again rather than
    /// skipping ahead.
    pub fn load_more(&mut self) -> Option<FetchTicket> {
        if !self.can_load_more() {
            return None;
        }
        let mut query = self.query.clone();
        query.page_size = (query.page_size + self.config.page_size_step).min(MAX_PAGE_SIZE);
        Some(self.issue(query))
    }

    /// Re-issues the query that last failed.
    pub fn retry(&mut self) -> Option<FetchTicket> {
        if self.state == RevealState::Loading {
            return None;
        }
        let query = self.failed.clone()?;
        Some(self.issue(query))
    }

    fn is_current(&self, ticket: &FetchTicket) -> bool {
        ticket.generation == self.generation && self.state == RevealState::Loading
    }

    /// Applies a completed window. Returns `false` for a stale ticket.
    pub fn on_success(&mut self, ticket: &FetchTicket, page: Page<T>) -> bool {
        if !self.is_current(ticket) {
            tracing::debug!(
                ticket = ticket.generation,
                current = self.generation,
                "ignoring stale listing response"
            );
            return false;
        }

        let visible = self.items.len();
        let returned = i64::try_from(page.items.len()).unwrap_or(i64::MAX);
        // A full window the server would not grow any further.
        let capped = ticket.query.page_size >= MAX_PAGE_SIZE
            || (returned < ticket.query.page_size && returned < page.total_matched);
        if capped && !page.exhausted {
            tracing::debug!(
                page_size = ticket.query.page_size,
                returned,
                total_matched = page.total_matched,
                "listing window reached the size limit"
            );
        }

        self.items.extend(page.items.into_iter().skip(visible));
        self.total_matched = page.total_matched;
        self.query = ticket.query.clone();
        if capped {
            self.query.page_size = returned.max(1);
        }
        self.last_error = None;
        self.failed = None;
        self.state = if self.items.is_empty() {
            RevealState::Empty
        } else if page.exhausted || capped {
            RevealState::Exhausted
        } else {
            RevealState::Loaded
        };
        true
    }

    /// Records a failed fetch. Visible items are kept. Returns `false` for a
    /// stale ticket.
    pub fn on_failure(&mut self, ticket: &FetchTicket, error: AppError) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        tracing::warn!(error = %error, page_size = ticket.query.page_size, "listing fetch failed");
        self.last_error = Some(error);
        self.failed = Some(ticket.query.clone());
        self.state = if self.items.is_empty() {
            RevealState::Empty
        } else {
            RevealState::Loaded
        };
        true
    }
}
