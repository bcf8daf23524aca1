use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::Dispatch;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;

/// An owned logging pipeline. Dropping it flushes the log file.
pub struct LogHandle {
  dispatch: Dispatch,
  _guard: WorkerGuard,
}

impl LogHandle {
  pub fn dispatch(&self) -> &Dispatch {
    &self.dispatch
  }
}

pub fn level_for(debug: bool) -> &'static str {
  if debug {
    "debug"
  } else {
    "info"
  }
}

/// Builds a subscriber writing to `logfile` and stderr. Nothing is installed
/// globally; callers scope the returned dispatch where they need it.
pub fn init(logfile: &Path, debug: bool) -> anyhow::Result<LogHandle> {
  let (dir, file_name) = split_logfile(logfile)?;
  fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;

  let file_appender = RollingFileAppender::builder()
    .rotation(Rotation::NEVER)
    .filename_prefix(file_name)
    .build(&dir)
    .with_context(|| format!("open log file {}", logfile.display()))?;
  let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

  let filter = tracing_subscriber::EnvFilter::try_new(level_for(debug))
    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

  let file_layer = tracing_subscriber::fmt::layer()
    .with_ansi(false)
    .with_writer(file_writer)
    .with_target(true)
    .with_line_number(true);

  let stderr_layer = tracing_subscriber::fmt::layer()
    .with_ansi(false)
    .with_writer(std::io::stderr)
    .with_target(true);

  let subscriber = tracing_subscriber::registry()
    .with(filter)
    .with(file_layer)
    .with(stderr_layer);

  Ok(LogHandle {
    dispatch: Dispatch::new(subscriber),
    _guard: guard,
  })
}

fn split_logfile(logfile: &Path) -> anyhow::Result<(PathBuf, String)> {
  let file_name = logfile
    .file_name()
    .and_then(|n| n.to_str())
    .ok_or_else(|| anyhow::anyhow!("logfile has no file name: {}", logfile.display()))?
    .to_string();

  let dir = match logfile.parent() {
    Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
    _ => PathBuf::from("."),
  };

  Ok((dir, file_name))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn debug_flag_selects_level() {
    assert_eq!(level_for(true), "debug");
    assert_eq!(level_for(false), "info");
  }

  #[test]
  fn splits_bare_file_name_into_current_dir() {
    let (dir, name) = split_logfile(Path::new("connector.log")).unwrap();
    assert_eq!(dir, PathBuf::from("."));
    assert_eq!(name, "connector.log");
    assert!(split_logfile(Path::new("/")).is_err());
  }

  #[test]
  fn events_reach_the_log_file() {
    let dir = tempfile::tempdir().unwrap();
    let logfile = dir.path().join("logs").join("connector.log");

    let handle = init(&logfile, false).unwrap();
    tracing::dispatcher::with_default(handle.dispatch(), || {
      tracing::info!(cycle = 1, "feed published");
      tracing::debug!("not at info level");
    });
    drop(handle);

    let text = fs::read_to_string(&logfile).unwrap();
    assert!(text.contains("feed published"));
    assert!(text.contains("cycle=1"));
    assert!(!text.contains("not at info level"));
  }
}
