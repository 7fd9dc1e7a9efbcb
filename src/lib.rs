//! Client-side data layer for the anime catalog.
//!
//! [`AnimeDataRepository`] puts a remote catalog endpoint and a local SQLite
//! cache behind one read/write surface: ranked remote reads with a stable
//! error taxonomy, plus insert, bulk clear, snapshot and reactive reads on the
//! cache.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod logging;
pub mod repository;
pub mod worker;

pub use cache::{CacheStore, SqliteStore, Subscription};
pub use catalog::{CachedCatalogItem, CatalogClient, CatalogItem, HttpCatalogClient};
pub use error::{classify, Classification, DomainError, DomainErrorKind, FetchError, TransportError};
pub use repository::AnimeDataRepository;
pub use worker::Worker;
