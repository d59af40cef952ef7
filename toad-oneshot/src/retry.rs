use core::ops::RangeInclusive;

use embedded_time::duration::Milliseconds;
use embedded_time::Instant;
use rand::{Rng, SeedableRng};

use crate::time::{millis_between, Clock, Millis};

/// A non-blocking timer that allows a fixed-delay or exponential-backoff retry,
/// that lives alongside some operation to retry.
///
/// It does not _contain_ the work to be done (e.g. `Box<fn()>`); the caller
/// performs the attempt, reports failures with [`RetryTimer::failed`] and asks
/// [`RetryTimer::what_should_i_do`] whether another attempt is allowed.
///
/// Delays are measured from the most recent failure, so an attempt that takes
/// a long time to fail does not eat into the pause before the next one.
///
/// ```
/// use embedded_time::Clock;
/// use embedded_time::duration::Milliseconds;
/// use toad_oneshot::retry;
///
/// # main();
/// fn main() {
///   let mut called = false;
///   let mut fails_once = || -> Result<(), ()> {
///     // ...
///     # if !called {
///     #   called = true;
///     #   Err(())
///     # } else {
///     #   Ok(())
///     # }
///   };
///
///   let clock = toad_oneshot::std::Clock::new();
///   let now = || clock.try_now().unwrap();
///   let strategy = retry::Strategy::Delay { min: Milliseconds(1),
///                                           max: Milliseconds(2) };
///   let mut retry = retry::RetryTimer::new(now(), strategy, retry::Attempts(2));
///
///   while let Err(_) = fails_once() {
///     retry.failed(now());
///     match nb::block!(retry.what_should_i_do(now())) {
///       | Ok(retry::YouShould::Retry) => continue,
///       | Ok(retry::YouShould::Cry) => panic!("no more attempts! it failed more than once!!"),
///       | Err(never) => match never {},
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RetryTimer<C: Clock> {
  last_failure: Instant<C>,
  init: Millis,
  strategy: Strategy,
  attempts: Attempts,
  max_attempts: Attempts,
}

/// A number of attempts
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Attempts(pub u16);

/// Result of [`RetryTimer.what_should_i_do`].
///
/// This tells you if a retry should be attempted or not.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum YouShould {
  /// Attempts have been exhausted and the work that is
  /// being retried should be considered poisoned.
  Cry,
  /// A retry should be performed
  Retry,
}

impl<C: Clock> RetryTimer<C> {
  /// Create a new retrier.
  ///
  /// The first attempt is assumed to start at `start`, and jitter
  /// is seeded from it; see [`RetryTimer::with_seed`].
  pub fn new(start: Instant<C>, strategy: Strategy, max_attempts: Attempts) -> Self {
    let seed = Milliseconds::<u64>::try_from(start.duration_since_epoch()).map(|Milliseconds(ms)| ms)
                                                                          .unwrap_or(0);
    Self::with_seed(start, strategy, max_attempts, seed)
  }

  /// Create a new retrier whose initial delay is drawn
  /// from an rng seeded with `seed`.
  pub fn with_seed(start: Instant<C>, strategy: Strategy, max_attempts: Attempts, seed: u64) -> Self {
    Self { last_failure: start,
           strategy,
           init: if strategy.has_jitter() {
             let mut rand = rand_chacha::ChaCha8Rng::seed_from_u64(seed);
             Milliseconds(rand.gen_range(strategy.range()))
           } else {
             Milliseconds(*strategy.range().start())
           },
           max_attempts,
           attempts: Attempts(1) }
  }

  /// The delay before the second attempt
  pub fn initial_delay(&self) -> Millis {
    self.init
  }

  /// The attempt currently being made (starts at 1)
  pub fn attempts(&self) -> Attempts {
    self.attempts
  }

  /// Have all allowed attempts been made?
  pub fn exhausted(&self) -> bool {
    self.attempts >= self.max_attempts
  }

  /// When the thing we keep trying fails, invoke this to
  /// tell the retrytimer when it happened.
  pub fn failed(&mut self, now: Instant<C>) {
    self.last_failure = now;
  }

  /// After the thing we keep trying failed, ask "what do I do??"
  ///
  /// Returns `nb::Error::WouldBlock` when we have not yet
  /// waited the appropriate amount of time to retry.
  pub fn what_should_i_do(&mut self,
                          now: Instant<C>)
                          -> nb::Result<YouShould, core::convert::Infallible> {
    if self.exhausted() {
      Ok(YouShould::Cry)
    } else if self.is_ready(millis_between(self.last_failure, now), self.attempts.0) {
      self.attempts.0 += 1;
      Ok(YouShould::Retry)
    } else {
      Err(nb::Error::WouldBlock)
    }
  }

  /// How long until [`RetryTimer::what_should_i_do`] will stop yielding `WouldBlock`
  pub fn until_ready(&self, now: Instant<C>) -> Millis {
    let Milliseconds(passed) = millis_between(self.last_failure, now);
    Milliseconds(self.delay_after(self.attempts.0).saturating_sub(passed))
  }

  /// Check if the strategy says an appropriate time has passed
  /// since the last failure
  pub fn is_ready(&self, Milliseconds(time_passed): Milliseconds<u64>, attempts: u16) -> bool {
    attempts == 0 || time_passed >= self.delay_after(attempts)
  }

  fn delay_after(&self, attempts: u16) -> u64 {
    match self.strategy {
      | Strategy::Delay { .. } => self.init.0,
      | Strategy::Exponential { .. } => Strategy::delay_exp(self.init, attempts),
    }
  }
}

/// Strategy to employ when retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
  /// Generate a random delay between `min` and `max`,
  /// and wait until this delay has passed between attempts.
  ///
  /// After each failed attempt, double the delay before retrying again.
  Exponential {
    /// Minimum (inclusive) delay for second attempt
    init_min: Milliseconds<u64>,
    /// Maximum (inclusive) delay for second attempt
    init_max: Milliseconds<u64>,
  },
  /// Generate a random delay between `min` and `max`,
  /// and wait until this delay has passed between attempts.
  Delay {
    /// Minimum (inclusive) delay for attempts
    min: Milliseconds<u64>,
    /// Maximum (inclusive) delay for attempts
    max: Milliseconds<u64>,
  },
}

impl Strategy {
  /// Are min & max delays the same? if so, we should probably skip the random number generation.
  pub fn has_jitter(&self) -> bool {
    let rng = self.range();
    rng.start() != rng.end()
  }

  /// Get the min & max durations as an inclusive range.
  ///
  /// Bounds given in the wrong order are swapped.
  pub fn range(&self) -> RangeInclusive<u64> {
    let (a, b) = match self {
      | &Self::Delay { min: Milliseconds(min),
                       max: Milliseconds(max), } => (min, max),

      | &Self::Exponential { init_min: Milliseconds(min),
                             init_max: Milliseconds(max), } => (min, max),
    };

    a.min(b)..=a.max(b)
  }

  /// Given the initial delay and number of attempts that have been performed,
  /// yields the delay until the next retry should be attempted.
  const fn delay_exp(Milliseconds(init): Milliseconds<u64>, attempt: u16) -> u64 {
    // | attempt | delay    |
    // | 1       | init     |
    // | 2       | init * 2 |
    // | 3       | init * 4 |
    // | ...     | ...      |
    // | n       | init * 2^(n-1) |
    init * 2u64.pow(attempt.saturating_sub(1) as u32)
  }
}
