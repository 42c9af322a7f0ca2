use crate::error::FetchError;
use crate::page::Page;
use crate::query::{Query, QueryVersion};
use crate::source::{CancelToken, PageRequest, PageSource};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Identity of one issued fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestStamp {
    pub request_id: u64,
    pub version: QueryVersion,
    pub page: u32,
}

#[derive(Debug)]
pub struct FetchOutcome<T> {
    pub stamp: RequestStamp,
    pub result: Result<Page<T>, FetchError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("fetch {0:?} is still in flight")]
pub struct Busy(pub RequestStamp);

struct FetchJob {
    stamp: RequestStamp,
    request: PageRequest,
    cancel: CancelToken,
}

struct InFlight {
    stamp: RequestStamp,
    cancel: CancelToken,
}

fn spawn_fetch_worker<S: PageSource>(
    mut source: S,
) -> (Sender<FetchJob>, Receiver<FetchOutcome<S::Item>>) {
    let (tx_req, rx_req) = mpsc::channel::<FetchJob>();
    let (tx_res, rx_res) = mpsc::channel::<FetchOutcome<S::Item>>();

    thread::spawn(move || {
        while let Ok(mut job) = rx_req.recv() {
            while let Ok(newer) = rx_req.try_recv() {
                job = newer;
            }

            let result = if job.cancel.is_cancelled() {
                Err(FetchError::Cancelled)
            } else {
                match source.fetch_page(&job.request, &job.cancel) {
                    Err(FetchError::NotFound) => Ok(Page::empty(job.request.page)),
                    other => other,
                }
            };

            if tx_res
                .send(FetchOutcome {
                    stamp: job.stamp,
                    result,
                })
                .is_err()
            {
                break;
            }
        }
    });

    (tx_req, rx_res)
}

/// Runs page fetches for one feed on a background worker, one at a time.
///
/// A second `fetch` while one is outstanding is rejected with [`Busy`]; the
/// owner must [`abandon`](Self::abandon) the old request first. Outcomes of
/// abandoned requests may still be delivered by [`poll`](Self::poll) and are
/// recognisable by their stamp.
pub struct SingleFlightFetcher<T> {
    tx: Sender<FetchJob>,
    rx: Receiver<FetchOutcome<T>>,
    next_request_id: u64,
    in_flight: Option<InFlight>,
}

impl<T> SingleFlightFetcher<T> {
    pub fn spawn<S: PageSource<Item = T>>(source: S) -> Self {
        let (tx, rx) = spawn_fetch_worker(source);
        Self {
            tx,
            rx,
            next_request_id: 1,
            in_flight: None,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn in_flight(&self) -> Option<RequestStamp> {
        self.in_flight.as_ref().map(|f| f.stamp)
    }

    pub fn fetch(
        &mut self,
        query: &Query,
        version: QueryVersion,
        page: u32,
        per_page: u32,
    ) -> Result<RequestStamp, Busy> {
        if let Some(current) = &self.in_flight {
            warn!(in_flight = ?current.stamp, page, "fetch rejected while busy");
            return Err(Busy(current.stamp));
        }

        let request_id = self.next_request_id;
        self.next_request_id = self.next_request_id.saturating_add(1);
        let stamp = RequestStamp {
            request_id,
            version,
            page,
        };
        let cancel = CancelToken::new();
        let job = FetchJob {
            stamp,
            request: PageRequest {
                query: query.clone(),
                page,
                per_page,
            },
            cancel: cancel.clone(),
        };

        debug!(request_id, %version, page, "fetch issued");
        self.in_flight = Some(InFlight { stamp, cancel });
        if self.tx.send(job).is_err() {
            warn!(request_id, "fetch worker is unavailable");
        }
        Ok(stamp)
    }

    /// Cancels the outstanding request, if any, and frees the slot.
    pub fn abandon(&mut self) -> Option<RequestStamp> {
        let abandoned = self.in_flight.take()?;
        abandoned.cancel.cancel();
        debug!(request_id = abandoned.stamp.request_id, "fetch abandoned");
        Some(abandoned.stamp)
    }

    pub fn poll(&mut self) -> Option<FetchOutcome<T>> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(self.settle(outcome)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => self.worker_lost(),
        }
    }

    /// Blocks up to `timeout` for the next outcome.
    pub fn wait(&mut self, timeout: Duration) -> Option<FetchOutcome<T>> {
        match self.rx.recv_timeout(timeout) {
            Ok(outcome) => Some(self.settle(outcome)),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => self.worker_lost(),
        }
    }

    fn settle(&mut self, outcome: FetchOutcome<T>) -> FetchOutcome<T> {
        if self.in_flight().map(|s| s.request_id) == Some(outcome.stamp.request_id) {
            self.in_flight = None;
        }
        outcome
    }

    fn worker_lost(&mut self) -> Option<FetchOutcome<T>> {
        let lost = self.in_flight.take()?;
        Some(FetchOutcome {
            stamp: lost.stamp,
            result: Err(FetchError::Network(
                "fetch worker is unavailable".to_string(),
            )),
        })
    }
}

impl<T> Drop for SingleFlightFetcher<T> {
    fn drop(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.cancel.cancel();
        }
    }
}
