use crate::interval::{parse_interval, PollInterval};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

pub const SECTION: &str = "general";

#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
  #[error("load config {path}: {source}")]
  Read {
    path: String,
    #[source]
    source: config::ConfigError,
  },

  #[error("config does not have a 'general' section")]
  MissingSection,

  #[error("invalid config: {}", join_problems(.problems))]
  Invalid { problems: Vec<ConfigProblem> },

  #[error("invalid polling interval {token:?}: {reason}")]
  BadInterval { token: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigProblem {
  Missing(&'static str),
  Invalid { key: &'static str, reason: String },
}

impl fmt::Display for ConfigProblem {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ConfigProblem::Missing(key) => write!(f, "missing '{key}' key-value pair"),
      ConfigProblem::Invalid { key, reason } => write!(f, "'{key}': {reason}"),
    }
  }
}

fn join_problems(problems: &[ConfigProblem]) -> String {
  problems
    .iter()
    .map(ToString::to_string)
    .collect::<Vec<_>>()
    .join("; ")
}

#[derive(Clone)]
pub struct Config {
  pub polling_interval: PollInterval,
  pub logfile: PathBuf,
  pub outfile: PathBuf,
  pub base_url: String,
  pub secret_key: String,
  pub access_id: String,
  pub default_org: String,
  pub niceness: i32,
  pub debug: bool,
}

// Keeps the API secret out of logs and error output.
impl fmt::Debug for Config {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Config")
      .field("polling_interval", &self.polling_interval)
      .field("logfile", &self.logfile)
      .field("outfile", &self.outfile)
      .field("base_url", &self.base_url)
      .field("secret_key", &"[REDACTED]")
      .field("access_id", &self.access_id)
      .field("default_org", &self.default_org)
      .field("niceness", &self.niceness)
      .field("debug", &self.debug)
      .finish()
  }
}

/// The `[general]` section as written, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GeneralSection {
  pub polling_interval: Option<String>,
  pub logfile: Option<String>,
  pub outfile: Option<String>,
  pub base_url: Option<String>,
  pub secret_key: Option<String>,
  pub access_id: Option<String>,
  pub default_org: Option<String>,
  pub niceness: Option<String>,
  pub debug: Option<String>,
}

impl GeneralSection {
  /// Checks every key in one pass, reporting all missing and malformed
  /// values together.
  pub fn validate(self) -> Result<Config, ConfigurationError> {
    let mut problems = Vec::new();

    let polling_interval = match self.polling_interval.as_deref() {
      None => {
        problems.push(ConfigProblem::Missing("polling_interval"));
        None
      }
      Some(token) => match parse_interval(token) {
        Ok(interval) => Some(interval),
        Err(e) => {
          problems.push(ConfigProblem::Invalid {
            key: "polling_interval",
            reason: e.to_string(),
          });
          None
        }
      },
    };

    let mut required = |key: &'static str, value: Option<String>| {
      if value.is_none() {
        problems.push(ConfigProblem::Missing(key));
      }
      value
    };
    let logfile = required("logfile", self.logfile);
    let outfile = required("outfile", self.outfile);
    let base_url = required("base_url", self.base_url);
    let secret_key = required("secret_key", self.secret_key);
    let access_id = required("access_id", self.access_id);
    let default_org = required("default_org", self.default_org);

    let niceness = match self.niceness.as_deref().map(str::trim) {
      None => 0,
      Some(raw) => raw.parse::<i32>().unwrap_or_else(|_| {
        problems.push(ConfigProblem::Invalid {
          key: "niceness",
          reason: format!("{raw:?} is not an integer"),
        });
        0
      }),
    };

    let debug = self.debug.as_deref().map(truthy).unwrap_or(false);

    match (
      polling_interval,
      logfile,
      outfile,
      base_url,
      secret_key,
      access_id,
      default_org,
    ) {
      (
        Some(polling_interval),
        Some(logfile),
        Some(outfile),
        Some(base_url),
        Some(secret_key),
        Some(access_id),
        Some(default_org),
      ) if problems.is_empty() => Ok(Config {
        polling_interval,
        logfile: PathBuf::from(logfile),
        outfile: PathBuf::from(outfile),
        base_url,
        secret_key,
        access_id,
        default_org,
        niceness,
        debug,
      }),
      _ => Err(ConfigurationError::Invalid { problems }),
    }
  }
}

/// Any non-empty value counts as true, including the text "false".
pub fn truthy(raw: &str) -> bool {
  !raw.is_empty()
}

pub fn load(path: &Path) -> Result<Config, ConfigurationError> {
  let read_err = |source| ConfigurationError::Read {
    path: path.display().to_string(),
    source,
  };

  let settings = config::Config::builder()
    .add_source(config::File::from(path).format(config::FileFormat::Ini))
    .build()
    .map_err(read_err)?;

  let section = match settings.get::<GeneralSection>(SECTION) {
    Ok(section) => section,
    Err(config::ConfigError::NotFound(_)) => return Err(ConfigurationError::MissingSection),
    Err(e) => return Err(read_err(e)),
  };

  section.validate()
}
