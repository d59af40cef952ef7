use core::fmt;

use crate::config;
use crate::retry::{Attempts, RetryTimer, YouShould};
use crate::time::{Clock, Millis, Sleep};

/// State of the network link, as driven by [`bring_up`].
///
/// The network interface itself belongs to the [`Link`] collaborator;
/// this is the driver's view of it and only changes via [`LinkState::next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkState {
  /// Nothing has been attempted, or a partial connection was torn down
  Disconnected,
  /// An attempt is in progress
  Connecting,
  /// The link is up
  Connected,
  /// Every allowed attempt failed
  Failed,
}

impl Default for LinkState {
  fn default() -> Self {
    LinkState::Disconnected
  }
}

/// Something that happened to the link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkEvent {
  /// An attempt was started
  Connect,
  /// The attempt succeeded and the link is ready
  Up,
  /// The attempt failed
  AttemptFailed {
    /// No attempts remain
    exhausted: bool,
  },
  /// Any (partial) connection state was torn down
  TornDown,
}

impl LinkState {
  /// The state that follows `self` when `event` happens.
  ///
  /// Events that make no sense in the current state leave it unchanged.
  pub fn next(self, event: LinkEvent) -> Self {
    use LinkEvent::*;
    use LinkState::*;

    match (self, event) {
      | (_, TornDown) => Disconnected,
      | (Disconnected, Connect) => Connecting,
      | (Connecting, Up) => Connected,
      | (Connecting, AttemptFailed { exhausted: true }) => Failed,
      | (state, _) => state,
    }
  }

  /// Is there (possibly partial) connection state that must be torn down?
  pub fn needs_teardown(&self) -> bool {
    !matches!(self, LinkState::Disconnected)
  }
}

/// The network interface collaborator
pub trait Link {
  /// Error yielded by the interface
  type Error: fmt::Debug;

  /// Start connecting
  fn connect(&mut self) -> Result<(), Self::Error>;

  /// Block until the interface is ready for traffic, or `timeout` elapses
  fn await_ready(&mut self, timeout: Millis) -> Result<(), Self::Error>;

  /// Tear down any (partial) connection
  fn teardown(&mut self) -> Result<(), Self::Error>;
}

/// The link could not be brought up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkFailure {
  /// Every allowed attempt failed
  Exhausted(Attempts),
  /// The clock failed to tell us the time
  Clock,
}

impl fmt::Display for LinkFailure {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      | LinkFailure::Exhausted(Attempts(n)) => {
        write!(f, "link did not come up after {} attempt(s)", n)
      },
      | LinkFailure::Clock => write!(f, "clock failed while retrying link bring-up"),
    }
  }
}

/// Bring the link up, retrying according to `config`.
///
/// Each attempt is `connect` followed by `await_ready`; the first of the two
/// to fail fails the attempt. A failed attempt with attempts remaining is torn down,
/// then the driver sleeps until [`RetryTimer`] allows the next one.
///
/// On success yields the attempt that succeeded. When attempts run out `state`
/// is left [`LinkState::Failed`] with the last attempt's partial state in place;
/// it's the caller's responsibility to tear it down.
pub fn bring_up<L, C, S>(link: &mut L,
                         state: &mut LinkState,
                         clock: &C,
                         sleep: &S,
                         config: &config::Link)
                         -> Result<Attempts, LinkFailure>
  where L: Link,
        C: Clock,
        S: Sleep
{
  let now = || clock.try_now().map_err(|_| LinkFailure::Clock);

  if config.max_attempts.0 == 0 {
    log::error!("link: no attempts allowed");
    return Err(LinkFailure::Exhausted(Attempts(0)));
  }

  let mut retry = RetryTimer::new(now()?, config.retry, config.max_attempts);

  loop {
    let attempt = retry.attempts();
    *state = state.next(LinkEvent::Connect);
    log::info!("link: attempt {} of {}", attempt.0, config.max_attempts.0);

    let result = link.connect()
                     .and_then(|()| link.await_ready(config.ready_timeout));

    let err = match result {
      | Ok(()) => {
        *state = state.next(LinkEvent::Up);
        log::info!("link: up after {} attempt(s)", attempt.0);
        return Ok(attempt);
      },
      | Err(e) => e,
    };

    retry.failed(now()?);

    if retry.exhausted() {
      log::error!("link: attempt {} failed: {:?}; giving up", attempt.0, err);
      *state = state.next(LinkEvent::AttemptFailed { exhausted: true });
      return Err(LinkFailure::Exhausted(attempt));
    }

    log::warn!("link: attempt {} failed: {:?}", attempt.0, err);
    *state = state.next(LinkEvent::AttemptFailed { exhausted: false });

    if let Err(e) = link.teardown() {
      log::warn!("link: teardown after failed attempt failed: {:?}", e);
    }
    *state = state.next(LinkEvent::TornDown);

    loop {
      match retry.what_should_i_do(now()?) {
        | Ok(YouShould::Retry) => break,
        | Ok(YouShould::Cry) => {
          *state = state.next(LinkEvent::Connect)
                        .next(LinkEvent::AttemptFailed { exhausted: true });
          return Err(LinkFailure::Exhausted(retry.attempts()));
        },
        | Err(nb::Error::WouldBlock) => {
          let wait = retry.until_ready(now()?);
          log::debug!("link: retrying in {}ms", wait.0);
          sleep.sleep(wait);
        },
        | Err(nb::Error::Other(never)) => match never {},
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use embedded_time::duration::Milliseconds;

  use super::*;
  use crate::retry::Strategy;
  use crate::test::{ClockMock, LinkMock, SleepMock};

  fn config(attempts: u16) -> config::Link {
    config::Link { max_attempts: Attempts(attempts),
                   retry: Strategy::Delay { min: Milliseconds(2000),
                                            max: Milliseconds(2000) },
                   ..Default::default() }
  }

  #[test]
  fn transitions() {
    use LinkEvent::*;
    use LinkState::*;

    assert_eq!(Disconnected.next(Connect), Connecting);
    assert_eq!(Connecting.next(Up), Connected);
    assert_eq!(Connecting.next(AttemptFailed { exhausted: false }), Connecting);
    assert_eq!(Connecting.next(AttemptFailed { exhausted: true }), Failed);
    assert_eq!(Connecting.next(TornDown), Disconnected);
    assert_eq!(Failed.next(TornDown), Disconnected);
    assert_eq!(Connected.next(Connect), Connected);
    assert_eq!(Disconnected.next(Up), Disconnected);
  }

  #[test]
  fn up_first_try() {
    let clock = ClockMock::new();
    let sleep = SleepMock::new(clock.clone());
    let mut link = LinkMock::new();
    let mut state = LinkState::default();

    let attempt = bring_up(&mut link, &mut state, &clock, &sleep, &config(3)).unwrap();

    assert_eq!(attempt, Attempts(1));
    assert_eq!(state, LinkState::Connected);
    assert_eq!(link.connects, 1);
    assert_eq!(link.teardowns, 0);
    assert!(sleep.slept().is_empty());
  }

  #[test]
  fn up_on_third_try() {
    let clock = ClockMock::new();
    let sleep = SleepMock::new(clock.clone());
    let mut link = LinkMock::new().never_ready_for(2);
    let mut state = LinkState::default();

    let attempt = bring_up(&mut link, &mut state, &clock, &sleep, &config(3)).unwrap();

    assert_eq!(attempt, Attempts(3));
    assert_eq!(state, LinkState::Connected);
    assert_eq!(link.connects, 3);
    assert_eq!(link.teardowns, 2);
    assert_eq!(sleep.slept(), vec![2000, 2000]);
  }

  #[test]
  fn connect_error_skips_await_ready() {
    let clock = ClockMock::new();
    let sleep = SleepMock::new(clock.clone());
    let mut link = LinkMock::new().refuse_for(1);
    let mut state = LinkState::default();

    bring_up(&mut link, &mut state, &clock, &sleep, &config(3)).unwrap();

    assert_eq!(link.connects, 2);
    assert_eq!(link.readies, 1);
  }

  #[test]
  fn never_more_than_max_attempts() {
    for n in 1..=5u16 {
      let clock = ClockMock::new();
      let sleep = SleepMock::new(clock.clone());
      let mut link = LinkMock::new().never_ready_for(usize::MAX);
      let mut state = LinkState::default();

      let res = bring_up(&mut link, &mut state, &clock, &sleep, &config(n));

      assert_eq!(res, Err(LinkFailure::Exhausted(Attempts(n))));
      assert_eq!(state, LinkState::Failed);
      assert_eq!(link.connects, n as usize);
      assert_eq!(link.teardowns, n as usize - 1);
      assert_eq!(sleep.slept().len(), n as usize - 1);
    }
  }

  #[test]
  fn zero_attempts_never_connects() {
    let clock = ClockMock::new();
    let sleep = SleepMock::new(clock.clone());
    let mut link = LinkMock::new();
    let mut state = LinkState::default();

    let res = bring_up(&mut link, &mut state, &clock, &sleep, &config(0));

    assert_eq!(res, Err(LinkFailure::Exhausted(Attempts(0))));
    assert_eq!(state, LinkState::Disconnected);
    assert_eq!(link.connects, 0);
  }

  #[test]
  fn delay_is_measured_from_failure() {
    let clock = ClockMock::new();
    let sleep = SleepMock::new(clock.clone());
    // each failing await_ready takes 500ms
    let mut link = LinkMock::new().never_ready_for(1)
                                  .ready_takes(clock.clone(), 500);
    let mut state = LinkState::default();

    bring_up(&mut link, &mut state, &clock, &sleep, &config(3)).unwrap();

    assert_eq!(sleep.slept(), vec![2000]);
  }
}
