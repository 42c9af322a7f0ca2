pub mod config;
pub mod controller;
pub mod debounce;
pub mod error;
pub mod feed;
pub mod fetcher;
pub mod fixture;
pub mod http;
pub mod page;
pub mod query;
pub mod search;
pub mod sentinel;
pub mod source;

pub use controller::FeedController;
pub use error::FetchError;
pub use feed::Status;
pub use query::{Query, QueryUpdate};
