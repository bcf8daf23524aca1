pub mod config;
pub mod connector;
pub mod interval;
pub mod logging;
pub mod publisher;
pub mod runtime;
pub mod scheduler;
pub mod source;
pub mod transform;
pub mod types;

use anyhow::Context;
use std::path::Path;
use std::sync::mpsc;

use connector::Connector;
use publisher::FeedPublisher;
use scheduler::PollScheduler;
use source::ThreatConnectClient;

/// Loads the config at `config_path` and polls ThreatConnect until the
/// process is interrupted.
pub fn run(config_path: &Path) -> anyhow::Result<()> {
  let cfg = config::load(config_path).context("load configuration")?;
  let log = logging::init(&cfg.logfile, cfg.debug).context("initialize logging")?;
  let _log_default = tracing::dispatcher::set_default(log.dispatch());

  let res = run_connector(&cfg, &log);
  if let Err(e) = &res {
    tracing::error!(error = ?e, "connector exited with error");
  }
  res
}

fn run_connector(cfg: &config::Config, log: &logging::LogHandle) -> anyhow::Result<()> {
  tracing::info!(
    base_url = %cfg.base_url,
    owner = %cfg.default_org,
    interval = %cfg.polling_interval,
    outfile = %cfg.outfile.display(),
    "starting ThreatConnect connector"
  );

  runtime::apply_niceness(cfg.niceness);

  let client = ThreatConnectClient::new(
    &cfg.base_url,
    &cfg.access_id,
    &cfg.secret_key,
    &cfg.default_org,
  )
  .context("build ThreatConnect client")?;
  let connector = Connector::new(client, FeedPublisher::new(&cfg.outfile));

  let (stop_tx, stop_rx) = mpsc::channel::<()>();
  let ctrlc_tx = stop_tx.clone();
  ctrlc::set_handler(move || {
    let _ = ctrlc_tx.send(());
  })
  .context("install signal handler")?;

  let handle = PollScheduler::new(
    cfg.polling_interval,
    connector,
    stop_rx,
    log.dispatch().clone(),
  )
  .spawn()
  .context("spawn poll scheduler thread")?;

  let state = handle
    .join()
    .map_err(|_| anyhow::anyhow!("poll scheduler thread panicked"))?;
  drop(stop_tx);

  tracing::info!(cycles = state.cycles(), "connector stopped");
  Ok(())
}
