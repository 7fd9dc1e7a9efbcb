//! Error taxonomy for the remote catalog path.
//!
//! Transport failures that carry an HTTP status are classified once, at the
//! repository boundary, into a [`DomainError`]. Everything else (unlisted
//! codes, connectivity failures, undecodable bodies) is passed through as the
//! original [`TransportError`].

use thiserror::Error;

/// Closed set of error kinds the presentation layer handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomainErrorKind {
  BadRequest,
  Unauthorized,
  NotFound,
  Connection,
  /// Fallback for failures the classifier does not map. Never produced by
  /// [`classify`].
  Generic,
}

impl DomainErrorKind {
  /// Fixed human-readable message for this kind.
  pub fn default_message(&self) -> &'static str {
    match self {
      Self::BadRequest => "Bad Request Error",
      Self::Unauthorized => "Unauthorized Error",
      Self::NotFound => "Not Found Error",
      Self::Connection => "Connection Error",
      Self::Generic => "Generic Error",
    }
  }
}

/// Outcome of classifying a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
  Classified(DomainErrorKind),
  /// Re-raise the original failure as is
  Unclassified,
}

/// Map a transport status code to a domain error kind.
pub fn classify(status: u16) -> Classification {
  match status {
    400 => Classification::Classified(DomainErrorKind::BadRequest),
    401 => Classification::Classified(DomainErrorKind::Unauthorized),
    404 => Classification::Classified(DomainErrorKind::NotFound),
    s if s >= 500 => Classification::Classified(DomainErrorKind::Connection),
    _ => Classification::Unclassified,
  }
}

/// A classified remote failure.
///
/// `message` is always the kind's fixed message. Whatever text the server
/// sent is kept in `detail` for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct DomainError {
  pub kind: DomainErrorKind,
  pub message: String,
  pub detail: Option<String>,
}

impl DomainError {
  pub fn new(kind: DomainErrorKind) -> Self {
    Self {
      kind,
      message: kind.default_message().to_string(),
      detail: None,
    }
  }

  pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
    let detail = detail.into();
    if !detail.is_empty() {
      self.detail = Some(detail);
    }
    self
  }
}

/// Failure raised by the remote catalog client.
#[derive(Debug, Error)]
pub enum TransportError {
  /// The server answered with a non-success status
  #[error("HTTP {status}: {message}")]
  Status { status: u16, message: String },

  /// No response was received
  #[error("Request failed: {0}")]
  Request(#[source] reqwest::Error),

  /// A response was received but its body could not be decoded
  #[error("Failed to decode catalog response: {0}")]
  Decode(#[source] serde_json::Error),

  /// No endpoint to ask
  #[error("Catalog unavailable: {0}")]
  Unavailable(String),
}

impl TransportError {
  pub fn status(&self) -> Option<u16> {
    match self {
      Self::Status { status, .. } => Some(*status),
      Self::Request(e) => e.status().map(|s| s.as_u16()),
      Self::Decode(_) | Self::Unavailable(_) => None,
    }
  }
}

/// Error returned by the remote path of the repository.
#[derive(Debug, Error)]
pub enum FetchError {
  #[error(transparent)]
  Domain(#[from] DomainError),

  #[error(transparent)]
  Transport(#[from] TransportError),
}

impl FetchError {
  /// Classify a transport failure, or hand it back untouched.
  pub fn from_transport(err: TransportError) -> Self {
    let Some(status) = err.status() else {
      return Self::Transport(err);
    };

    match classify(status) {
      Classification::Classified(kind) => {
        let detail = match &err {
          TransportError::Status { message, .. } => message.clone(),
          other => other.to_string(),
        };
        Self::Domain(DomainError::new(kind).with_detail(detail))
      }
      Classification::Unclassified => Self::Transport(err),
    }
  }

  /// The kind a caller should act on; unclassified failures are `Generic`.
  pub fn kind(&self) -> DomainErrorKind {
    match self {
      Self::Domain(e) => e.kind,
      Self::Transport(_) => DomainErrorKind::Generic,
    }
  }

  pub fn as_domain(&self) -> Option<&DomainError> {
    match self {
      Self::Domain(e) => Some(e),
      Self::Transport(_) => None,
    }
  }
}
