//! Conditional HTTP fetching: robots cache, ETag/Last-Modified cache, a
//! retrying HTTP client with per-source and global rate limits, and the
//! raw/bronze snapshot store.

mod backoff;
mod conditional;
mod fetcher;
mod raw_store;
mod rate_limit;
mod robots;

pub use backoff::{classify_reqwest_error, BackoffPolicy, RetryDisposition};
pub use conditional::ConditionalFetchCache;
pub use fetcher::{FetchError, FetchOutcome, FetchedResponse, Fetcher, HttpClientConfig, HttpFetcher};
pub use raw_store::RawStore;
pub use rate_limit::{TokenBucket, TokenBucketConfig};
pub use robots::RobotsCache;

pub const CRATE_NAME: &str = "crawl-fetch";
