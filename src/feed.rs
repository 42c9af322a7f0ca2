//! Feed state machine.
//!
//! `FeedState::update` is the only place feed state changes. It consumes one
//! [`Message`] and answers with the fetch to start, if any. It performs no
//! I/O, so every ordering and staleness rule can be exercised directly.

use crate::error::FetchError;
use crate::fetcher::FetchOutcome;
use crate::page::PageAccumulator;
use crate::query::{Query, QueryVersion};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Idle,
    LoadingInitial,
    LoadingMore,
    Ready,
    /// Ready, and the last page said nothing more is available.
    Exhausted,
    Error,
}

#[derive(Debug)]
pub enum Message<T> {
    QueryChanged { query: Query, version: QueryVersion },
    NearEdge,
    FetchCompleted(FetchOutcome<T>),
    Retry,
    /// The pending fetch was given up; its outcome must not land.
    Abandon,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchCommand {
    pub query: Query,
    pub version: QueryVersion,
    pub page: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingFetch {
    version: QueryVersion,
    page: u32,
}

#[derive(Debug, Clone)]
pub struct FeedState<T> {
    query: Query,
    version: QueryVersion,
    pages: PageAccumulator<T>,
    status: Status,
    last_error: Option<FetchError>,
    pending: Option<PendingFetch>,
}

impl<T> Default for FeedState<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FeedState<T> {
    pub fn new() -> Self {
        Self {
            query: Query::default(),
            version: QueryVersion::default(),
            pages: PageAccumulator::new(),
            status: Status::Idle,
            last_error: None,
            pending: None,
        }
    }

    pub fn update(&mut self, message: Message<T>) -> Option<FetchCommand> {
        match message {
            Message::QueryChanged { query, version } => {
                if version < self.version {
                    debug!(%version, live = %self.version, "ignoring superseded query");
                    return None;
                }
                self.query = query;
                self.version = version;
                self.pages.reset();
                self.last_error = None;
                Some(self.begin(1))
            }
            Message::NearEdge => {
                if self.status != Status::Ready || !self.pages.has_more() || self.pending.is_some()
                {
                    debug!(status = ?self.status, "near-edge signal ignored");
                    return None;
                }
                Some(self.begin(self.pages.next_page()))
            }
            Message::FetchCompleted(outcome) => {
                self.complete(outcome);
                None
            }
            Message::Retry => {
                if self.status != Status::Error || self.pending.is_some() {
                    return None;
                }
                Some(self.begin(self.pages.next_page()))
            }
            Message::Abandon => {
                if let Some(abandoned) = self.pending.take() {
                    debug!(page = abandoned.page, "pending fetch abandoned");
                    self.settle_without_page();
                }
                None
            }
        }
    }

    /// Leaves the loading state without a new page or a new error.
    fn settle_without_page(&mut self) {
        self.status = if self.last_error.is_some() {
            Status::Error
        } else if self.pages.pages_loaded() == 0 {
            Status::Idle
        } else if self.pages.has_more() {
            Status::Ready
        } else {
            Status::Exhausted
        };
    }

    fn begin(&mut self, page: u32) -> FetchCommand {
        self.status = if page == 1 {
            Status::LoadingInitial
        } else {
            Status::LoadingMore
        };
        self.pending = Some(PendingFetch {
            version: self.version,
            page,
        });
        FetchCommand {
            query: self.query.clone(),
            version: self.version,
            page,
        }
    }

    fn complete(&mut self, outcome: FetchOutcome<T>) {
        let stamp = outcome.stamp;
        if stamp.version != self.version {
            debug!(
                request_id = stamp.request_id,
                stale = %stamp.version,
                live = %self.version,
                "dropping stale page"
            );
            return;
        }
        let expected = PendingFetch {
            version: stamp.version,
            page: stamp.page,
        };
        if self.pending != Some(expected) {
            debug!(request_id = stamp.request_id, page = stamp.page, "dropping unexpected page");
            return;
        }
        self.pending = None;

        if matches!(outcome.result, Err(FetchError::Cancelled)) {
            debug!(request_id = stamp.request_id, page = stamp.page, "fetch came back cancelled");
            self.settle_without_page();
            return;
        }

        let error = match outcome.result {
            Ok(page) => match self.pages.append(page) {
                Ok(added) => {
                    debug!(page = stamp.page, added, total = self.pages.len(), "page appended");
                    self.last_error = None;
                    self.status = if self.pages.has_more() {
                        Status::Ready
                    } else {
                        Status::Exhausted
                    };
                    return;
                }
                Err(err) => {
                    warn!(%err, "page rejected");
                    FetchError::Decode(err.to_string())
                }
            },
            Err(err) => err,
        };

        warn!(page = stamp.page, %error, "fetch failed");
        if stamp.page == 1 {
            self.pages.reset();
        }
        self.status = Status::Error;
        self.last_error = Some(error);
    }

    pub fn items(&self) -> &[T] {
        self.pages.items()
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn version(&self) -> QueryVersion {
        self.version
    }

    pub fn has_more(&self) -> bool {
        self.pages.has_more()
    }

    pub fn next_page(&self) -> u32 {
        self.pages.next_page()
    }

    pub fn pages_loaded(&self) -> u32 {
        self.pages.pages_loaded()
    }

    pub fn total_count(&self) -> Option<u64> {
        self.pages.total_count()
    }

    pub fn last_error(&self) -> Option<&FetchError> {
        self.last_error.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    /// Page number of the fetch the state is waiting for.
    pub fn pending_page(&self) -> Option<u32> {
        self.pending.map(|p| p.page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::RequestStamp;
    use crate::page::Page;

    fn v(n: u64) -> QueryVersion {
        let mut state = crate::query::QueryState::default();
        for _ in 0..n {
            state.bump();
        }
        state.version()
    }

    fn done(cmd: &FetchCommand, result: Result<Page<u32>, FetchError>) -> Message<u32> {
        Message::FetchCompleted(FetchOutcome {
            stamp: RequestStamp {
                request_id: 0,
                version: cmd.version,
                page: cmd.page,
            },
            result,
        })
    }

    fn page(number: u32, count: u32, has_more: bool) -> Page<u32> {
        let start = (number - 1) * 100;
        Page {
            items: (start..start + count).collect(),
            page_number: number,
            total_count: 20,
            has_more,
        }
    }

    fn started() -> (FeedState<u32>, FetchCommand) {
        let mut feed = FeedState::new();
        let cmd = feed
            .update(Message::QueryChanged {
                query: Query::default(),
                version: v(0),
            })
            .expect("initial fetch");
        (feed, cmd)
    }

    #[test]
    fn twelve_then_eight_exhausts_feed() {
        let (mut feed, first) = started();
        assert_eq!(first.page, 1);
        assert_eq!(feed.status(), Status::LoadingInitial);

        assert!(feed.update(done(&first, Ok(page(1, 12, true)))).is_none());
        assert_eq!(feed.status(), Status::Ready);

        let second = feed.update(Message::NearEdge).expect("load more");
        assert_eq!(second.page, 2);
        assert_eq!(feed.status(), Status::LoadingMore);
        feed.update(done(&second, Ok(page(2, 8, false))));

        assert_eq!(feed.items().len(), 20);
        assert_eq!(feed.items()[11], 11);
        assert_eq!(feed.items()[12], 100);
        assert!(!feed.has_more());
        assert_eq!(feed.status(), Status::Exhausted);
        assert!(feed.update(Message::NearEdge).is_none());
        assert_eq!(feed.next_page(), 3);
    }

    #[test]
    fn near_edge_while_loading_is_a_no_op() {
        let (mut feed, first) = started();
        assert!(feed.update(Message::NearEdge).is_none());

        feed.update(done(&first, Ok(page(1, 12, true))));
        let second = feed.update(Message::NearEdge).expect("load more");
        assert!(feed.update(Message::NearEdge).is_none());
        assert!(feed.update(Message::NearEdge).is_none());
        assert_eq!(feed.pending_page(), Some(second.page));
    }

    #[test]
    fn stale_result_is_never_merged() {
        let (mut feed, old) = started();
        let new = feed
            .update(Message::QueryChanged {
                query: Query::new("ab"),
                version: v(1),
            })
            .expect("refetch for new query");

        feed.update(done(&old, Ok(page(1, 12, true))));
        assert!(feed.items().is_empty());
        assert_eq!(feed.status(), Status::LoadingInitial);

        feed.update(done(&new, Ok(page(1, 3, false))));
        assert_eq!(feed.items(), &[0, 1, 2]);
        assert_eq!(feed.query().search, "ab");
    }

    #[test]
    fn stale_failure_does_not_touch_state() {
        let (mut feed, old) = started();
        feed.update(Message::QueryChanged {
            query: Query::new("x"),
            version: v(1),
        });

        feed.update(done(&old, Err(FetchError::Network("reset".to_string()))));
        assert_eq!(feed.status(), Status::LoadingInitial);
        assert!(feed.last_error().is_none());
    }

    #[test]
    fn query_change_clears_accumulated_items() {
        let (mut feed, first) = started();
        feed.update(done(&first, Ok(page(1, 12, true))));
        assert_eq!(feed.items().len(), 12);

        let cmd = feed
            .update(Message::QueryChanged {
                query: Query::default().with_filter("pillar", "stem"),
                version: v(1),
            })
            .expect("reset fetch");
        assert_eq!(cmd.page, 1);
        assert!(feed.items().is_empty());
        assert!(feed.has_more());
    }

    #[test]
    fn older_query_version_is_ignored() {
        let mut feed: FeedState<u32> = FeedState::new();
        feed.update(Message::QueryChanged {
            query: Query::new("new"),
            version: v(2),
        });
        assert!(feed
            .update(Message::QueryChanged {
                query: Query::new("old"),
                version: v(1),
            })
            .is_none());
        assert_eq!(feed.query().search, "new");
    }

    #[test]
    fn initial_failure_leaves_empty_list_and_retries_page_one() {
        let (mut feed, first) = started();
        feed.update(done(&first, Err(FetchError::Network("refused".to_string()))));

        assert_eq!(feed.status(), Status::Error);
        assert!(feed.items().is_empty());
        assert!(feed.update(Message::NearEdge).is_none());

        let retry = feed.update(Message::Retry).expect("retry");
        assert_eq!(retry, first);
        assert_eq!(feed.status(), Status::LoadingInitial);
        assert!(feed.last_error().is_some());
    }

    #[test]
    fn load_more_failure_keeps_items_and_retries_only_missing_page() {
        let (mut feed, first) = started();
        feed.update(done(&first, Ok(page(1, 12, true))));
        let second = feed.update(Message::NearEdge).expect("load more");
        feed.update(done(
            &second,
            Err(FetchError::Server {
                status: 503,
                message: "busy".to_string(),
            }),
        ));

        assert_eq!(feed.status(), Status::Error);
        assert_eq!(feed.items().len(), 12);
        let retry = feed.update(Message::Retry).expect("retry");
        assert_eq!(retry.page, 2);
        assert_eq!(feed.status(), Status::LoadingMore);

        feed.update(done(&retry, Ok(page(2, 8, false))));
        assert_eq!(feed.items().len(), 20);
        assert!(feed.last_error().is_none());
    }

    #[test]
    fn retry_outside_error_is_ignored() {
        let (mut feed, first) = started();
        assert!(feed.update(Message::Retry).is_none());
        feed.update(done(&first, Ok(page(1, 1, true))));
        assert!(feed.update(Message::Retry).is_none());
    }

    #[test]
    fn mismatched_page_number_is_reported_as_error() {
        let (mut feed, first) = started();
        feed.update(done(&first, Ok(page(2, 4, true))));

        assert_eq!(feed.status(), Status::Error);
        assert!(matches!(feed.last_error(), Some(FetchError::Decode(_))));
        assert!(feed.items().is_empty());
    }

    #[test]
    fn empty_final_page_is_an_empty_state() {
        let (mut feed, first) = started();
        feed.update(done(&first, Ok(Page::empty(1))));
        assert_eq!(feed.status(), Status::Exhausted);
        assert!(feed.items().is_empty());
        assert!(feed.update(Message::NearEdge).is_none());
    }

    #[test]
    fn abandoned_fetch_result_is_ignored() {
        let (mut feed, first) = started();
        assert!(feed.update(Message::Abandon).is_none());
        assert!(!feed.is_loading());
        assert_eq!(feed.status(), Status::Idle);

        feed.update(done(&first, Ok(page(1, 12, true))));
        assert!(feed.items().is_empty());
        assert_eq!(feed.status(), Status::Idle);
        assert!(feed.last_error().is_none());
    }

    #[test]
    fn abandoning_load_more_keeps_list_ready() {
        let (mut feed, first) = started();
        feed.update(done(&first, Ok(page(1, 12, true))));
        let second = feed.update(Message::NearEdge).expect("load more");
        feed.update(Message::Abandon);

        assert_eq!(feed.status(), Status::Ready);
        feed.update(done(&second, Err(FetchError::Cancelled)));
        assert_eq!(feed.status(), Status::Ready);
        assert_eq!(feed.items().len(), 12);
        assert!(feed.last_error().is_none());
    }

    #[test]
    fn cancelled_result_is_not_an_error() {
        let (mut feed, first) = started();
        feed.update(done(&first, Err(FetchError::Cancelled)));

        assert!(!feed.is_loading());
        assert_eq!(feed.status(), Status::Idle);
        assert!(feed.last_error().is_none());
    }
}
