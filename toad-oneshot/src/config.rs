use embedded_time::duration::Milliseconds;

use crate::retry::{Attempts, Strategy};
use crate::session::Security;
use crate::time::{Millis, Timeout};

/// Configuration options related to bringing the network link up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
  /// Number of times we are allowed to try to bring the link up
  /// before giving up on the run.
  ///
  /// Defaults to 3 attempts.
  /// ```
  /// use toad_oneshot::config::Link;
  /// use toad_oneshot::retry::Attempts;
  ///
  /// assert_eq!(Link::default().max_attempts, Attempts(3));
  /// ```
  pub max_attempts: Attempts,
  /// How long to wait between attempts.
  ///
  /// The delay is measured from the moment an attempt failed.
  ///
  /// Defaults to a fixed 2 second delay:
  /// ```
  /// use embedded_time::duration::Milliseconds;
  /// use toad_oneshot::config::Link;
  /// use toad_oneshot::retry::Strategy;
  ///
  /// assert_eq!(Link::default().retry,
  ///            Strategy::Delay { min: Milliseconds(2_000),
  ///                              max: Milliseconds(2_000) });
  /// ```
  pub retry: Strategy,
  /// How long a single attempt may wait for the interface
  /// to become ready.
  ///
  /// Defaults to 10 seconds.
  /// ```
  /// use embedded_time::duration::Milliseconds;
  /// use toad_oneshot::config::Link;
  ///
  /// assert_eq!(Link::default().ready_timeout, Milliseconds(10_000u64));
  /// ```
  pub ready_timeout: Millis,
  /// How long to pause after the link comes up, before
  /// opening a session.
  ///
  /// Defaults to 1 second.
  /// ```
  /// use embedded_time::duration::Milliseconds;
  /// use toad_oneshot::config::Link;
  ///
  /// assert_eq!(Link::default().settle, Milliseconds(1_000u64));
  /// ```
  pub settle: Millis,
}

impl Default for Link {
  fn default() -> Self {
    Link { max_attempts: Attempts(3),
           retry: Strategy::Delay { min: Milliseconds(2_000),
                                    max: Milliseconds(2_000) },
           ready_timeout: Milliseconds(10_000),
           settle: Milliseconds(1_000) }
  }
}

/// Configuration options related to waiting for the response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exchange {
  /// Longest time a single call into the engine's I/O processing may block.
  ///
  /// Defaults to 500 milliseconds.
  /// ```
  /// use embedded_time::duration::Milliseconds;
  /// use toad_oneshot::config::Exchange;
  ///
  /// assert_eq!(Exchange::default().poll_slice, Milliseconds(500u64));
  /// ```
  pub poll_slice: Millis,
  /// How long to keep collecting responses to a multicast request.
  ///
  /// Multicast requests don't end at the first response; this is the
  /// stop condition. `Timeout::Never` polls forever.
  ///
  /// Defaults to 6 seconds, the unicast wait budget for the
  /// usual 5 second leisure.
  /// ```
  /// use toad_oneshot::config::Exchange;
  /// use toad_oneshot::time::Timeout;
  ///
  /// assert_eq!(Exchange::default().multicast_wait, Timeout::Millis(6_000));
  /// ```
  pub multicast_wait: Timeout,
}

impl Default for Exchange {
  fn default() -> Self {
    Exchange { poll_slice: Milliseconds(500),
               multicast_wait: Timeout::Millis(6_000) }
  }
}

/// Configuration options related to building messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Msg {
  /// Seed used to generate message ids & tokens,
  /// customizable so that tokens are less guessable.
  ///
  /// The default value is 0, although it is
  /// best practice to set this to something else
  /// (random integer, machine identifier).
  ///
  /// ```
  /// use toad_oneshot::config::Msg;
  ///
  /// assert_eq!(Msg::default().token_seed, 0);
  /// ```
  pub token_seed: u16,
}

/// Runtime config
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Config {
  /// See [`Link`]
  pub link: Link,
  /// See [`Exchange`]
  pub exchange: Exchange,
  /// See [`Msg`]
  pub msg: Msg,
  /// Security policy applied to `coaps` sessions
  ///
  /// Peers are verified by default:
  /// ```
  /// use toad_oneshot::config::Config;
  /// use toad_oneshot::session::PeerVerification;
  ///
  /// assert_eq!(Config::default().security.verification,
  ///            PeerVerification::Required);
  /// ```
  pub security: Security,
}
