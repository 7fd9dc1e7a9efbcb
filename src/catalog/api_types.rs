//! Serde-deserializable types matching the catalog endpoint's responses.
//!
//! These are kept apart from the domain types so the wire shape (camelCase
//! names, nullable collections) does not leak into the rest of the crate.

use serde::Deserialize;

use super::types::{AnimeCountry, AnimeGenre, AnimeStatus, CatalogItem};

// ============================================================================
// List endpoint response
// ============================================================================

/// Body of the catalog list endpoint.
///
/// `data` may be missing or `null`; both mean "no items".
#[derive(Debug, Default, Deserialize)]
pub struct ApiAnimeListResponse {
  #[serde(default)]
  pub data: Option<Vec<ApiAnime>>,
}

impl ApiAnimeListResponse {
  pub fn into_items(self) -> Vec<CatalogItem> {
    self
      .data
      .unwrap_or_default()
      .into_iter()
      .map(CatalogItem::from)
      .collect()
  }
}

// ============================================================================
// Single entry
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiAnime {
  pub id: String,
  #[serde(default)]
  pub title: String,
  pub rate: f32,
  pub status: AnimeStatus,
  pub country: AnimeCountry,
  pub genre: AnimeGenre,
  #[serde(rename = "releaseYear", default)]
  pub release_year: String,
  #[serde(default)]
  pub description: String,
  #[serde(rename = "imageUrl", default)]
  pub image_url: String,
}

impl From<ApiAnime> for CatalogItem {
  fn from(api: ApiAnime) -> Self {
    Self {
      id: api.id,
      title: api.title,
      rating: api.rate,
      status: api.status,
      country: api.country,
      genre: api.genre,
      release_year: api.release_year,
      description: api.description,
      image_url: api.image_url,
    }
  }
}
