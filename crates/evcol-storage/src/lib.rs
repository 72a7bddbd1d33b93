//! Page fetching, raw page archiving and the event store collaborator.

pub mod archive;
pub mod event_store;
pub mod fetch;
pub mod postgres;

pub use archive::{ArchivedPage, PageArchive, PageOrigin};
pub use event_store::{should_overwrite_region, EventStore, InMemoryEventStore, StoreError};
pub use fetch::{
    FetchError, FetchRequest, FetchedResponse, HttpClientConfig, HttpFetcher, PageFetcher,
    RetryPolicy, DEFAULT_USER_AGENT,
};
pub use postgres::PgEventStore;
pub use reqwest::{StatusCode, Url};

pub const CRATE_NAME: &str = "evcol-storage";
