//! Threat feed documents in the JSON layout consumed by Carbon Black Response.
//!
//! A feed is a `feedinfo` block describing the provider plus an ordered list of
//! reports, each carrying indicators of compromise grouped by kind.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::Path;

const MAX_SCORE: i32 = 100;
const MIN_SCORE: i32 = -100;

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
  #[error("feed info field `{field}` {reason}")]
  FeedInfo { field: &'static str, reason: String },

  #[error("report `{id}`: {reason}")]
  Report { id: String, reason: String },

  #[error("read icon {path}: {source}")]
  Icon {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("encode feed JSON: {0}")]
  Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IocKind {
  Md5,
  Ipv4,
  Ipv6,
  Dns,
}

impl IocKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      IocKind::Md5 => "md5",
      IocKind::Ipv4 => "ipv4",
      IocKind::Ipv6 => "ipv6",
      IocKind::Dns => "dns",
    }
  }
}

pub type Iocs = BTreeMap<IocKind, BTreeSet<String>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedInfo {
  pub name: String,
  pub display_name: String,
  pub provider_url: String,
  pub summary: String,
  pub tech_data: String,
  pub category: String,
  pub icon: String,
}

impl FeedInfo {
  /// Replaces `icon` with the base64 of the file it names. A reference that
  /// is not an existing file is left untouched.
  pub fn load_icon(mut self) -> Result<Self, FeedError> {
    let path = Path::new(&self.icon);
    if !path.is_file() {
      return Ok(self);
    }

    let bytes = fs::read(path).map_err(|source| FeedError::Icon {
      path: self.icon.clone(),
      source,
    })?;
    self.icon = STANDARD.encode(bytes);
    Ok(self)
  }

  fn validate(&self) -> Result<(), FeedError> {
    let required = [
      ("name", &self.name),
      ("display_name", &self.display_name),
      ("provider_url", &self.provider_url),
      ("summary", &self.summary),
      ("tech_data", &self.tech_data),
      ("category", &self.category),
    ];
    for (field, value) in required {
      if value.trim().is_empty() {
        return Err(FeedError::FeedInfo {
          field,
          reason: "must not be empty".to_string(),
        });
      }
    }

    if !self.name.chars().all(|c| c.is_ascii_alphanumeric()) {
      return Err(FeedError::FeedInfo {
        field: "name",
        reason: format!("must be alphanumeric, got {:?}", self.name),
      });
    }

    Ok(())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
  pub id: String,
  pub link: String,
  pub title: String,
  pub score: i32,
  pub timestamp: i64,
  pub iocs: Iocs,
}

impl Report {
  /// Checks the report's own fields and every IOC value it carries.
  pub fn validate(&self) -> Result<(), FeedError> {
    let fail = |reason: String| FeedError::Report {
      id: self.id.clone(),
      reason,
    };

    if self.id.trim().is_empty() {
      return Err(fail("id must not be empty".to_string()));
    }
    if !(MIN_SCORE..=MAX_SCORE).contains(&self.score) {
      return Err(fail(format!(
        "score {} outside [{MIN_SCORE}, {MAX_SCORE}]",
        self.score
      )));
    }
    if self.timestamp < 0 {
      return Err(fail(format!("negative timestamp {}", self.timestamp)));
    }

    for (kind, values) in &self.iocs {
      for value in values {
        if !ioc_value_is_valid(*kind, value) {
          return Err(fail(format!("invalid {} value {value:?}", kind.as_str())));
        }
      }
    }

    Ok(())
  }
}

fn ioc_value_is_valid(kind: IocKind, value: &str) -> bool {
  match kind {
    IocKind::Md5 => value.len() == 32 && value.chars().all(|c| c.is_ascii_hexdigit()),
    IocKind::Ipv4 => value.parse::<Ipv4Addr>().is_ok(),
    IocKind::Ipv6 => value.parse::<Ipv6Addr>().is_ok(),
    IocKind::Dns => !value.trim().is_empty(),
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feed {
  pub feedinfo: FeedInfo,
  pub reports: Vec<Report>,
}

impl Feed {
  pub fn new(feedinfo: FeedInfo, reports: Vec<Report>) -> Self {
    Self { feedinfo, reports }
  }

  pub fn validate(&self) -> Result<(), FeedError> {
    self.feedinfo.validate()?;
    for report in &self.reports {
      report.validate()?;
    }
    Ok(())
  }

  /// Validates the feed and renders it as pretty-printed JSON.
  pub fn dump(&self) -> Result<String, FeedError> {
    self.validate()?;
    Ok(serde_json::to_string_pretty(self)?)
  }
}
