use crate::config::ConfigurationError;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;
const WEEK: u64 = 7 * DAY;

/// A polling interval with whole-second resolution. Always non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PollInterval(Duration);

impl PollInterval {
  pub fn from_secs(secs: u64) -> Option<Self> {
    (secs > 0).then(|| Self(Duration::from_secs(secs)))
  }

  pub fn as_duration(&self) -> Duration {
    self.0
  }

  pub fn as_secs(&self) -> u64 {
    self.0.as_secs()
  }
}

impl fmt::Display for PollInterval {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}s", self.as_secs())
  }
}

impl FromStr for PollInterval {
  type Err = ConfigurationError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    parse_interval(s)
  }
}

/// Parses tokens like `15M` or `2h`: a base-10 count followed by one of the
/// unit codes S, M, H, D, W (case-insensitive).
pub fn parse_interval(token: &str) -> Result<PollInterval, ConfigurationError> {
  let bad = |reason: String| ConfigurationError::BadInterval {
    token: token.to_string(),
    reason,
  };

  let unit = token
    .chars()
    .last()
    .ok_or_else(|| bad("empty token".to_string()))?;
  let digits = &token[..token.len() - unit.len_utf8()];

  let unit_secs = match unit.to_ascii_uppercase() {
    'S' => 1,
    'M' => MINUTE,
    'H' => HOUR,
    'D' => DAY,
    'W' => WEEK,
    other => return Err(bad(format!("unknown unit code {other:?}"))),
  };

  let count: u64 = digits
    .parse()
    .map_err(|_| bad(format!("{digits:?} is not a non-negative integer")))?;

  let secs = count
    .checked_mul(unit_secs)
    .ok_or_else(|| bad("interval overflows".to_string()))?;

  PollInterval::from_secs(secs).ok_or_else(|| bad("interval must be greater than zero".to_string()))
}
