use crate::error::FetchError;
use crate::page::Page;
use crate::query::Query;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub query: Query,
    pub page: u32,
    pub per_page: u32,
}

/// Shared flag telling a transport that nobody wants its result anymore.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// `Err(Cancelled)` once cancelled, for use with `?` inside transports.
    pub fn check(&self) -> Result<(), FetchError> {
        if self.is_cancelled() {
            Err(FetchError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Backend that serves one page of a query at a time.
///
/// Implementations run on the fetcher's worker thread and may block.
pub trait PageSource: Send + 'static {
    type Item: Send + 'static;

    fn fetch_page(
        &mut self,
        request: &PageRequest,
        cancel: &CancelToken,
    ) -> Result<Page<Self::Item>, FetchError>;
}

impl<S: PageSource + ?Sized> PageSource for Box<S> {
    type Item = S::Item;

    fn fetch_page(
        &mut self,
        request: &PageRequest,
        cancel: &CancelToken,
    ) -> Result<Page<Self::Item>, FetchError> {
        (**self).fetch_page(request, cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_visible_through_clones() {
        let token = CancelToken::new();
        let seen_by_worker = token.clone();
        assert!(seen_by_worker.check().is_ok());

        token.cancel();
        assert!(seen_by_worker.is_cancelled());
        assert_eq!(seen_by_worker.check(), Err(FetchError::Cancelled));
    }
}
