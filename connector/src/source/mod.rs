use crate::types::{IndicatorType, RawIndicator};

pub mod threatconnect;

pub use threatconnect::ThreatConnectClient;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
  #[error("invalid API base URL {url}: {reason}")]
  Url { url: String, reason: String },

  #[error("build HTTP client: {0}")]
  Client(#[source] reqwest::Error),

  #[error("GET {url}: {source}")]
  Http {
    url: String,
    #[source]
    source: reqwest::Error,
  },

  #[error("unexpected HTTP status {status} for {url}")]
  Status { status: u16, url: String },

  #[error("read response body: {0}")]
  Body(#[from] std::io::Error),

  #[error("response exceeds max size {max_bytes} bytes")]
  TooLarge { max_bytes: usize },

  #[error("decode indicators: {0}")]
  Decode(#[from] serde_json::Error),
}

/// A remote source of threat indicators.
pub trait IndicatorSource {
  /// Returns the indicators whose type is one of `types`.
  fn fetch_indicators(&self, types: &[IndicatorType]) -> Result<Vec<RawIndicator>, FetchError>;
}

impl<S: IndicatorSource + ?Sized> IndicatorSource for Box<S> {
  fn fetch_indicators(&self, types: &[IndicatorType]) -> Result<Vec<RawIndicator>, FetchError> {
    (**self).fetch_indicators(types)
  }
}
