use cbfeed::{Feed, FeedError, FeedInfo, Report};
use std::fs;
use std::path::{Path, PathBuf};

pub const FEED_NAME: &str = "threatconnect";
pub const FEED_DISPLAY_NAME: &str = "ThreatConnect";
pub const FEED_PROVIDER_URL: &str = "http://www.threatconnect.com";
pub const FEED_SUMMARY: &str =
  "Sends threat intelligence from Threatconnect platform to Carbon Black Response";
pub const FEED_TECH_DATA: &str =
  "There are no requirements to share any data with Carbon Black to use this feed.";
pub const FEED_ICON: &str = "threatconnect-logo.png";
pub const FEED_CATEGORY: &str = "Connectors";

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
  #[error("serialize feed: {0}")]
  Serialize(#[from] FeedError),

  #[error("{action} {path}: {source}")]
  Io {
    action: &'static str,
    path: String,
    #[source]
    source: std::io::Error,
  },
}

pub fn feed_info() -> FeedInfo {
  FeedInfo {
    name: FEED_NAME.to_string(),
    display_name: FEED_DISPLAY_NAME.to_string(),
    provider_url: FEED_PROVIDER_URL.to_string(),
    summary: FEED_SUMMARY.to_string(),
    tech_data: FEED_TECH_DATA.to_string(),
    category: FEED_CATEGORY.to_string(),
    icon: FEED_ICON.to_string(),
  }
}

/// Writes complete feed documents to a fixed path, replacing whatever was
/// there before.
#[derive(Debug, Clone)]
pub struct FeedPublisher {
  outfile: PathBuf,
  info: FeedInfo,
}

impl FeedPublisher {
  pub fn new(outfile: impl Into<PathBuf>) -> Self {
    Self {
      outfile: outfile.into(),
      info: feed_info(),
    }
  }

  /// Writes `reports` as the complete feed and returns how many were
  /// written. A report that fails validation is logged and left out.
  pub fn publish(&self, reports: Vec<Report>) -> Result<usize, PublishError> {
    let info = self.info.clone().load_icon()?;
    let reports = keep_valid(reports);
    let count = reports.len();
    let feed = Feed::new(info, reports);

    tracing::debug!("dumping feed");
    let rendered = feed.dump()?;

    tracing::debug!(path = %self.outfile.display(), "writing feed to disk");
    atomic_write_file(&self.outfile, rendered.as_bytes())?;

    tracing::info!(
      reports = count,
      path = %self.outfile.display(),
      "feed published"
    );
    Ok(count)
  }
}

fn keep_valid(reports: Vec<Report>) -> Vec<Report> {
  reports
    .into_iter()
    .filter(|report| match report.validate() {
      Ok(()) => true,
      Err(e) => {
        tracing::warn!(id = %report.id, error = %e, "invalid report dropped from feed");
        false
      }
    })
    .collect()
}

fn io_err(action: &'static str, path: &Path) -> impl FnOnce(std::io::Error) -> PublishError {
  let path = path.display().to_string();
  move |source| PublishError::Io {
    action,
    path,
    source,
  }
}

fn atomic_write_file(dst: &Path, bytes: &[u8]) -> Result<(), PublishError> {
  let dir = match dst.parent() {
    Some(p) if !p.as_os_str().is_empty() => p,
    _ => Path::new("."),
  };
  fs::create_dir_all(dir).map_err(io_err("create", dir))?;

  let tmp = tmp_path(dst);
  fs::write(&tmp, bytes).map_err(io_err("write", &tmp))?;
  if let Err(e) = fs::rename(&tmp, dst) {
    let _ = fs::remove_file(&tmp);
    return Err(io_err("rename into", dst)(e));
  }
  Ok(())
}

fn tmp_path(dst: &Path) -> PathBuf {
  let name = dst.file_name().and_then(|s| s.to_str()).unwrap_or("feed");
  dst.with_file_name(format!(".{name}.tmp"))
}
