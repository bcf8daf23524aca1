use crate::interval::PollInterval;
use std::sync::mpsc::{self, RecvTimeoutError, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
  Idle,
  Waiting,
  Running,
  Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
  Fire,
  Sleep(Duration),
}

/// One fetch, transform and publish pass.
pub trait FeedCycle {
  fn run_cycle(&mut self) -> anyhow::Result<()>;
}

impl<F> FeedCycle for F
where
  F: FnMut() -> anyhow::Result<()>,
{
  fn run_cycle(&mut self) -> anyhow::Result<()> {
    self()
  }
}

#[derive(Debug, Clone)]
pub struct SchedulerState {
  interval: PollInterval,
  last_run: Option<Instant>,
  phase: Phase,
  cycles: u64,
}

impl SchedulerState {
  pub fn new(interval: PollInterval) -> Self {
    Self {
      interval,
      last_run: None,
      phase: Phase::Idle,
      cycles: 0,
    }
  }

  pub fn phase(&self) -> Phase {
    self.phase
  }

  pub fn cycles(&self) -> u64 {
    self.cycles
  }

  /// Fires once a full interval has passed since the last cycle, or
  /// immediately if none has run. Otherwise sleeps the remainder, rounded up
  /// to whole seconds.
  pub fn next_action(&self, now: Instant) -> Tick {
    let interval = self.interval.as_duration();
    let elapsed = match self.last_run {
      Some(last) => now.saturating_duration_since(last),
      None => interval,
    };

    if elapsed >= interval {
      Tick::Fire
    } else {
      Tick::Sleep(ceil_to_secs(interval - elapsed))
    }
  }
}

fn ceil_to_secs(d: Duration) -> Duration {
  Duration::from_secs(d.as_secs() + u64::from(d.subsec_nanos() > 0))
}

/// Runs feed cycles no more often than once per interval until a stop
/// signal arrives on `stop_rx` or every sender is dropped.
pub struct PollScheduler<C> {
  state: SchedulerState,
  cycle: C,
  stop_rx: mpsc::Receiver<()>,
  dispatch: tracing::Dispatch,
  stop_seen: bool,
}

impl<C: FeedCycle> PollScheduler<C> {
  pub fn new(
    interval: PollInterval,
    cycle: C,
    stop_rx: mpsc::Receiver<()>,
    dispatch: tracing::Dispatch,
  ) -> Self {
    Self {
      state: SchedulerState::new(interval),
      cycle,
      stop_rx,
      dispatch,
      stop_seen: false,
    }
  }

  pub fn spawn(self) -> std::io::Result<JoinHandle<SchedulerState>>
  where
    C: Send + 'static,
  {
    thread::Builder::new()
      .name("feed-poller".to_string())
      .spawn(move || self.run())
  }

  pub fn run(mut self) -> SchedulerState {
    let dispatch = self.dispatch.clone();
    tracing::dispatcher::with_default(&dispatch, || self.run_loop());
    self.state
  }

  fn run_loop(&mut self) {
    self.state.phase = Phase::Waiting;
    tracing::info!(interval = %self.state.interval, "poll scheduler started");

    loop {
      if self.stop_requested() {
        tracing::info!("connector was signalled to stop; stopping");
        break;
      }

      let now = Instant::now();
      match self.state.next_action(now) {
        Tick::Fire => self.fire(now),
        Tick::Sleep(wait) => match self.stop_rx.recv_timeout(wait) {
          Ok(()) | Err(RecvTimeoutError::Disconnected) => self.stop_seen = true,
          Err(RecvTimeoutError::Timeout) => {}
        },
      }
    }

    self.state.phase = Phase::Stopped;
    tracing::info!(cycles = self.state.cycles, "poll scheduler stopped");
  }

  fn stop_requested(&mut self) -> bool {
    if !self.stop_seen {
      match self.stop_rx.try_recv() {
        Ok(()) | Err(TryRecvError::Disconnected) => self.stop_seen = true,
        Err(TryRecvError::Empty) => {}
      }
    }
    self.stop_seen
  }

  fn fire(&mut self, now: Instant) {
    self.state.phase = Phase::Running;
    self.state.last_run = Some(now);
    self.state.cycles += 1;

    let started = Instant::now();
    match self.cycle.run_cycle() {
      Ok(()) => tracing::debug!(
        cycle = self.state.cycles,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "feed cycle finished"
      ),
      Err(e) => tracing::error!(
        cycle = self.state.cycles,
        error = ?e,
        "feed cycle failed; retrying at next interval"
      ),
    }

    self.state.phase = Phase::Waiting;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
  use std::sync::Arc;

  fn secs(n: u64) -> PollInterval {
    PollInterval::from_secs(n).unwrap()
  }

  fn counting_cycle(
    count: &Arc<AtomicUsize>,
    result: fn() -> anyhow::Result<()>,
  ) -> impl FnMut() -> anyhow::Result<()> + Send + 'static {
    let count = Arc::clone(count);
    move || {
      count.fetch_add(1, Ordering::SeqCst);
      result()
    }
  }

  #[test]
  fn first_tick_fires_immediately() {
    let state = SchedulerState::new(secs(60));
    assert_eq!(state.phase(), Phase::Idle);
    assert_eq!(state.next_action(Instant::now()), Tick::Fire);
  }

  #[test]
  fn fires_when_elapsed_equals_interval() {
    let t0 = Instant::now();
    let mut state = SchedulerState::new(secs(1));
    state.last_run = Some(t0);
    assert_eq!(state.next_action(t0 + Duration::from_secs(1)), Tick::Fire);
    assert_eq!(state.next_action(t0 + Duration::from_secs(5)), Tick::Fire);
  }

  #[test]
  fn sleeps_remaining_time_rounded_up() {
    let t0 = Instant::now();
    let mut state = SchedulerState::new(secs(10));
    state.last_run = Some(t0);

    assert_eq!(
      state.next_action(t0 + Duration::from_millis(2_500)),
      Tick::Sleep(Duration::from_secs(8))
    );
    assert_eq!(
      state.next_action(t0 + Duration::from_secs(4)),
      Tick::Sleep(Duration::from_secs(6))
    );
    assert_eq!(
      state.next_action(t0 + Duration::from_millis(9_900)),
      Tick::Sleep(Duration::from_secs(1))
    );
  }

  #[test]
  fn one_second_interval_fires_three_or_four_times_in_three_and_a_half_seconds() {
    let count = Arc::new(AtomicUsize::new(0));
    let (stop_tx, stop_rx) = mpsc::channel();
    let scheduler = PollScheduler::new(
      secs(1),
      counting_cycle(&count, || Ok(())),
      stop_rx,
      tracing::Dispatch::none(),
    );

    let handle = scheduler.spawn().unwrap();
    thread::sleep(Duration::from_millis(3_500));
    stop_tx.send(()).unwrap();
    let state = handle.join().unwrap();

    let fired = count.load(Ordering::SeqCst);
    assert!((3..=4).contains(&fired), "fired {fired} cycles");
    assert_eq!(state.cycles(), fired as u64);
    assert_eq!(state.phase(), Phase::Stopped);
  }

  #[test]
  fn failing_cycles_keep_the_schedule() {
    let count = Arc::new(AtomicUsize::new(0));
    let (stop_tx, stop_rx) = mpsc::channel();
    let scheduler = PollScheduler::new(
      secs(1),
      counting_cycle(&count, || Err(anyhow::anyhow!("remote unavailable"))),
      stop_rx,
      tracing::Dispatch::none(),
    );

    let handle = scheduler.spawn().unwrap();
    thread::sleep(Duration::from_millis(2_500));
    stop_tx.send(()).unwrap();
    let state = handle.join().unwrap();

    assert!(count.load(Ordering::SeqCst) >= 2);
    assert_eq!(state.phase(), Phase::Stopped);
  }

  #[test]
  fn stop_during_cycle_lets_it_finish_and_starts_no_more() {
    let count = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicBool::new(false));
    let (stop_tx, stop_rx) = mpsc::channel();

    let cycle = {
      let count = Arc::clone(&count);
      let finished = Arc::clone(&finished);
      move || {
        count.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(1_500));
        finished.store(true, Ordering::SeqCst);
        Ok(())
      }
    };
    let handle = PollScheduler::new(secs(1), cycle, stop_rx, tracing::Dispatch::none())
      .spawn()
      .unwrap();

    thread::sleep(Duration::from_millis(300));
    stop_tx.send(()).unwrap();
    let state = handle.join().unwrap();

    assert!(finished.load(Ordering::SeqCst));
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(state.cycles(), 1);
  }

  #[test]
  fn dropped_sender_stops_the_loop() {
    let count = Arc::new(AtomicUsize::new(0));
    let (stop_tx, stop_rx) = mpsc::channel::<()>();
    drop(stop_tx);

    let state = PollScheduler::new(
      secs(1),
      counting_cycle(&count, || Ok(())),
      stop_rx,
      tracing::Dispatch::none(),
    )
    .run();

    assert_eq!(state.phase(), Phase::Stopped);
    assert_eq!(count.load(Ordering::SeqCst), 0);
  }
}
