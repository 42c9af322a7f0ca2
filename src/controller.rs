use crate::config::FeedConfig;
use crate::debounce::Debouncer;
use crate::error::FetchError;
use crate::feed::{FeedState, FetchCommand, Message, Status};
use crate::fetcher::{FetchOutcome, RequestStamp, SingleFlightFetcher};
use crate::query::{Query, QueryState, QueryUpdate, QueryVersion};
use crate::sentinel::{Marker, ScrollSentinel, Viewport};
use crate::source::PageSource;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// One incremental feed: debounced query edits in, a growing list out.
///
/// The controller is driven from a single event loop. Call [`tick`] every
/// frame (or whenever [`next_wakeup`] passes) and [`observe_viewport`] when
/// the list scrolls; everything else reacts to those calls.
///
/// [`tick`]: FeedController::tick
/// [`next_wakeup`]: FeedController::next_wakeup
/// [`observe_viewport`]: FeedController::observe_viewport
pub struct FeedController<T> {
    config: FeedConfig,
    debouncer: Debouncer<QueryUpdate>,
    queries: QueryState,
    fetcher: SingleFlightFetcher<T>,
    sentinel: ScrollSentinel,
    state: FeedState<T>,
}

impl<T> FeedController<T> {
    /// Spawns the fetch worker and immediately requests page 1 of `initial`.
    pub fn new<S>(source: S, config: FeedConfig, initial: Query) -> Self
    where
        S: PageSource<Item = T>,
    {
        let mut controller = Self {
            debouncer: Debouncer::new(config.debounce()),
            queries: QueryState::new(initial),
            fetcher: SingleFlightFetcher::spawn(source),
            sentinel: ScrollSentinel::new(config.near_edge_margin),
            state: FeedState::new(),
            config,
        };
        let query = controller.queries.current().clone();
        let version = controller.queries.version();
        controller.dispatch(Message::QueryChanged { query, version });
        controller
    }

    pub fn edit_search(&mut self, text: impl Into<String>, now: Instant) {
        self.update_query(QueryUpdate::search(text), now);
    }

    pub fn set_filter(&mut self, facet: impl Into<String>, value: impl Into<String>, now: Instant) {
        self.update_query(QueryUpdate::filter(facet, value), now);
    }

    pub fn clear_filter(&mut self, facet: impl Into<String>, now: Instant) {
        self.update_query(QueryUpdate::clear_filter(facet), now);
    }

    /// Queues `update` behind the debounce window, merged with any edit
    /// still waiting there.
    pub fn update_query(&mut self, update: QueryUpdate, now: Instant) {
        let merged = self.take_pending_edit(update);
        self.debouncer.schedule(merged, now);
    }

    /// Applies `update` (and any pending debounced edit) right away.
    pub fn commit_query(&mut self, update: QueryUpdate) {
        let merged = self.take_pending_edit(update);
        self.apply_query(merged);
    }

    fn take_pending_edit(&mut self, update: QueryUpdate) -> QueryUpdate {
        match self.debouncer.cancel() {
            Some(pending) => pending.merge(update),
            None => update,
        }
    }

    fn apply_query(&mut self, update: QueryUpdate) {
        match self.queries.update(&update) {
            Some((query, version)) => {
                info!(%version, %query, "query changed, resetting feed");
                self.dispatch(Message::QueryChanged { query, version });
            }
            None => debug!("query unchanged"),
        }
    }

    /// Reloads page 1 of the current query under a new version.
    pub fn refresh(&mut self) {
        self.debouncer.cancel();
        let version = self.queries.bump();
        let query = self.queries.current().clone();
        info!(%version, %query, "refreshing feed");
        self.dispatch(Message::QueryChanged { query, version });
    }

    /// Re-requests the page that failed; a no-op unless the feed is in error.
    pub fn retry(&mut self) {
        self.dispatch(Message::Retry);
    }

    /// Fires a due debounced edit and applies every finished fetch.
    pub fn tick(&mut self, now: Instant) {
        if let Some(update) = self.debouncer.take_if_elapsed(now) {
            debug!("debounced query edit fired");
            self.apply_query(update);
        }
        while let Some(outcome) = self.fetcher.poll() {
            self.complete(outcome);
        }
    }

    /// Blocks up to `timeout` for one fetch to finish and applies it.
    pub fn wait_for_fetch(&mut self, timeout: Duration) -> bool {
        match self.fetcher.wait(timeout) {
            Some(outcome) => {
                self.complete(outcome);
                true
            }
            None => false,
        }
    }

    pub fn next_wakeup(&self) -> Option<Instant> {
        self.debouncer.deadline()
    }

    pub fn observe_viewport(&mut self, viewport: Viewport) {
        if self.sentinel.observe(viewport) {
            debug!(marker = ?self.sentinel.marker(), "near edge");
            self.dispatch(Message::NearEdge);
        }
    }

    /// Replaces the sentinel marker, for lists whose rows are not uniform.
    pub fn attach_marker(&mut self, marker: Marker) {
        self.sentinel.attach(marker);
    }

    pub fn sentinel_marker(&self) -> Option<Marker> {
        self.sentinel.marker()
    }

    /// Cancels pending edits and in-flight work. The controller stays
    /// readable but issues nothing further on its own, and a late result of
    /// the abandoned fetch is dropped.
    pub fn shutdown(&mut self) {
        self.debouncer.cancel();
        self.sentinel.detach();
        self.fetcher.abandon();
        self.dispatch(Message::Abandon);
    }

    fn complete(&mut self, outcome: FetchOutcome<T>) {
        let pages_before = self.state.pages_loaded();
        self.dispatch(Message::FetchCompleted(outcome));
        if self.state.pages_loaded() > pages_before && self.state.status() == Status::Ready {
            self.place_sentinel();
        }
    }

    fn place_sentinel(&mut self) {
        let index = self.state.items().len().saturating_sub(1);
        self.sentinel.attach(Marker {
            index,
            offset: index as f32 * self.config.row_extent,
        });
    }

    fn dispatch(&mut self, message: Message<T>) {
        if let Some(command) = self.state.update(message) {
            self.issue(command);
        }
    }

    fn issue(&mut self, command: FetchCommand) {
        if let Some(stale) = self.fetcher.in_flight() {
            if stale.version != command.version {
                self.fetcher.abandon();
            }
        }
        self.sentinel.detach();

        if let Err(busy) = self.fetcher.fetch(
            &command.query,
            command.version,
            command.page,
            self.config.per_page,
        ) {
            warn!(%busy, "feed and fetcher disagree about in-flight work");
            let refused = FetchOutcome {
                stamp: RequestStamp {
                    request_id: 0,
                    version: command.version,
                    page: command.page,
                },
                result: Err(FetchError::Network(busy.to_string())),
            };
            self.state.update(Message::FetchCompleted(refused));
        }
    }

    pub fn items(&self) -> &[T] {
        self.state.items()
    }

    pub fn status(&self) -> Status {
        self.state.status()
    }

    pub fn has_more(&self) -> bool {
        self.state.has_more()
    }

    pub fn last_error(&self) -> Option<&FetchError> {
        self.state.last_error()
    }

    pub fn query(&self) -> &Query {
        self.state.query()
    }

    pub fn version(&self) -> QueryVersion {
        self.state.version()
    }

    pub fn total_count(&self) -> Option<u64> {
        self.state.total_count()
    }

    pub fn pages_loaded(&self) -> u32 {
        self.state.pages_loaded()
    }

    pub fn is_loading(&self) -> bool {
        self.state.is_loading()
    }

    pub fn has_pending_edit(&self) -> bool {
        self.debouncer.is_pending()
    }

    pub fn state(&self) -> &FeedState<T> {
        &self.state
    }
}

impl<T> Drop for FeedController<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
