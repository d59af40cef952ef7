use embedded_time::rate::Fraction;

use crate::link::Link;
use crate::time::{Millis, Sleep};

mod convert;

/// UDP, TCP & DTLS sessions backed by [`::std::net`] and `openssl`
pub mod engine;

pub mod tcp;

#[doc(inline)]
pub use engine::{Context, Engine, Error, Session};

/// Implement [`embedded_time::Clock`] using [`::std::time`] primitives
#[derive(Debug, Clone, Copy)]
pub struct Clock(::std::time::Instant);

impl Default for Clock {
  fn default() -> Self {
    Self::new()
  }
}

impl Clock {
  /// Create a new clock
  pub fn new() -> Self {
    Self(::std::time::Instant::now())
  }
}

impl embedded_time::Clock for Clock {
  type T = u64;

  // microseconds
  const SCALING_FACTOR: Fraction = Fraction::new(1, 1_000_000);

  fn try_now(&self) -> Result<embedded_time::Instant<Self>, embedded_time::clock::Error> {
    let now = ::std::time::Instant::now();
    let elapsed = now.duration_since(self.0);
    Ok(embedded_time::Instant::new(elapsed.as_micros() as u64))
  }
}

/// [`Sleep`] by parking the current thread
#[derive(Debug, Clone, Copy, Default)]
pub struct Sleeper;

impl Sleep for Sleeper {
  fn sleep(&self, dur: Millis) {
    ::std::thread::sleep(::std::time::Duration::from_millis(dur.0));
  }
}

/// A [`Link`] for hosts whose operating system owns the network interface.
///
/// Every attempt succeeds immediately, and teardown does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysUp;

impl Link for AlwaysUp {
  type Error = ::core::convert::Infallible;

  fn connect(&mut self) -> Result<(), Self::Error> {
    Ok(())
  }

  fn await_ready(&mut self, _: Millis) -> Result<(), Self::Error> {
    Ok(())
  }

  fn teardown(&mut self) -> Result<(), Self::Error> {
    Ok(())
  }
}
