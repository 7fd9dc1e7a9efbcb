pub mod api_types;
pub mod client;
pub mod types;

pub use client::{CatalogClient, HttpCatalogClient};
pub use types::{AnimeCountry, AnimeGenre, AnimeStatus, CachedCatalogItem, CatalogItem};
