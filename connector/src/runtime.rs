/// Adjusts the process scheduling priority by `niceness`. Zero leaves it
/// alone. Failures are logged and otherwise ignored.
pub fn apply_niceness(niceness: i32) {
  if niceness == 0 {
    return;
  }
  renice(niceness);
}

#[cfg(unix)]
fn renice(niceness: i32) {
  match rustix::process::nice(niceness) {
    Ok(now) => tracing::info!(requested = niceness, now, "process niceness adjusted"),
    Err(e) => tracing::warn!(
      requested = niceness,
      error = %e,
      "could not adjust process niceness (continuing)"
    ),
  }
}

#[cfg(not(unix))]
fn renice(niceness: i32) {
  tracing::warn!(
    requested = niceness,
    "process niceness is not supported on this platform; ignored"
  );
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn zero_niceness_is_a_no_op() {
    apply_niceness(0);
  }
}
