use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndicatorType {
  Address,
  File,
  Host,
  Other(String),
}

impl IndicatorType {
  /// The indicator types a feed cycle asks the remote source for.
  pub const FEED_TYPES: [IndicatorType; 3] = [
    IndicatorType::Address,
    IndicatorType::File,
    IndicatorType::Host,
  ];

  pub fn as_str(&self) -> &str {
    match self {
      IndicatorType::Address => "Address",
      IndicatorType::File => "File",
      IndicatorType::Host => "Host",
      IndicatorType::Other(name) => name,
    }
  }
}

impl From<&str> for IndicatorType {
  fn from(name: &str) -> Self {
    match name {
      "Address" => IndicatorType::Address,
      "File" => IndicatorType::File,
      "Host" => IndicatorType::Host,
      other => IndicatorType::Other(other.to_string()),
    }
  }
}

impl fmt::Display for IndicatorType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// One indicator as returned by the threat intelligence source, after
/// defaults have been substituted for missing fields.
#[derive(Debug, Clone, PartialEq)]
pub struct RawIndicator {
  pub id: String,
  pub kind: IndicatorType,
  pub value: String,
  /// Confidence on a 0..=5 scale. ThreatConnect reports half points.
  pub rating: f64,
  pub description: Option<String>,
  pub web_link: Option<String>,
  pub date_added: i64,
}

pub fn now_unix_s() -> i64 {
  use std::time::{SystemTime, UNIX_EPOCH};
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap_or_default()
    .as_secs() as i64
}
