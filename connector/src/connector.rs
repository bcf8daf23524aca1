use crate::publisher::{FeedPublisher, PublishError};
use crate::scheduler::FeedCycle;
use crate::source::{FetchError, IndicatorSource};
use crate::transform;
use crate::types::IndicatorType;

#[derive(Debug, thiserror::Error)]
pub enum CycleError {
  #[error("fetch indicators: {0}")]
  Fetch(#[from] FetchError),

  #[error("publish feed: {0}")]
  Publish(#[from] PublishError),
}

/// Pulls indicators from a source and publishes them as a complete feed.
pub struct Connector<S> {
  source: S,
  publisher: FeedPublisher,
}

impl<S: IndicatorSource> Connector<S> {
  pub fn new(source: S, publisher: FeedPublisher) -> Self {
    Self { source, publisher }
  }

  /// Runs one fetch, transform and publish pass and returns the number of
  /// reports written. A failed fetch leaves the output untouched.
  pub fn generate_feed(&self) -> Result<usize, CycleError> {
    let indicators = self.source.fetch_indicators(&IndicatorType::FEED_TYPES)?;
    tracing::debug!(indicators = indicators.len(), "indicators retrieved");

    let reports = transform::to_reports(&indicators);
    Ok(self.publisher.publish(reports)?)
  }
}

impl<S: IndicatorSource> FeedCycle for Connector<S> {
  fn run_cycle(&mut self) -> anyhow::Result<()> {
    match self.generate_feed() {
      Ok(_) => Ok(()),
      Err(CycleError::Fetch(e)) => {
        tracing::warn!(error = %e, "indicator fetch failed; cycle skipped");
        Ok(())
      }
      Err(e) => Err(e.into()),
    }
  }
}
