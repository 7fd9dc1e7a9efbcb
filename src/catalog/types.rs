use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Airing status of a catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnimeStatus {
  Finished,
  InProgress,
}

/// Country of production
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnimeCountry {
  JapAnime,
  ChnAnime,
  KorAnime,
  UsAnime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnimeGenre {
  Legend,
  Action,
  Fantasy,
  Romance,
  Comedy,
  SciFi,
}

/// Implements `as_str`, `Display` and `FromStr` over the wire names, which are
/// also the values stored in the cache table.
macro_rules! wire_enum {
  ($ty:ident { $($variant:ident => $name:literal),+ $(,)? }) => {
    impl $ty {
      pub fn as_str(&self) -> &'static str {
        match self {
          $(Self::$variant => $name,)+
        }
      }
    }

    impl fmt::Display for $ty {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
      }
    }

    impl FromStr for $ty {
      type Err = String;

      fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
          $($name => Ok(Self::$variant),)+
          other => Err(format!("unknown {} value: {}", stringify!($ty), other)),
        }
      }
    }
  };
}

wire_enum!(AnimeStatus {
  Finished => "FINISHED",
  InProgress => "IN_PROGRESS",
});

wire_enum!(AnimeCountry {
  JapAnime => "JAP_ANIME",
  ChnAnime => "CHN_ANIME",
  KorAnime => "KOR_ANIME",
  UsAnime => "US_ANIME",
});

wire_enum!(AnimeGenre {
  Legend => "LEGEND",
  Action => "ACTION",
  Fantasy => "FANTASY",
  Romance => "ROMANCE",
  Comedy => "COMEDY",
  SciFi => "SCI_FI",
});

/// One catalog entry, shared by the remote list and the local cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
  pub id: String,
  pub title: String,
  pub rating: f32,
  pub status: AnimeStatus,
  pub country: AnimeCountry,
  pub genre: AnimeGenre,
  pub release_year: String,
  pub description: String,
  /// May be empty
  pub image_url: String,
}

/// A catalog entry as stored in the local cache.
///
/// `key` is the store-assigned surrogate key. A key of zero or less means the
/// row has not been inserted yet and the store picks the next sequence value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedCatalogItem {
  pub key: i64,
  pub item: CatalogItem,
}

impl CachedCatalogItem {
  /// Wrap an item for insertion with a store-assigned key.
  pub fn unsaved(item: CatalogItem) -> Self {
    Self { key: 0, item }
  }

  pub fn is_assigned(&self) -> bool {
    self.key > 0
  }
}

impl From<CatalogItem> for CachedCatalogItem {
  fn from(item: CatalogItem) -> Self {
    Self::unsaved(item)
  }
}
