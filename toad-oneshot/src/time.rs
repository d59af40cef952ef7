use embedded_time::duration::Milliseconds;
use embedded_time::Instant;

/// A duration, in milliseconds
pub type Millis = embedded_time::duration::Milliseconds<u64>;

/// Supertrait of [`embedded_time::Clock`] pinning the
/// type of "ticks" to u64
pub trait Clock: embedded_time::Clock<T = u64> {}
impl<C: embedded_time::Clock<T = u64>> Clock for C {}

/// Timeout configuration allowing for "never time out" as an option
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone, Copy)]
pub enum Timeout {
  /// Timeout after some number of milliseconds has elapsed
  Millis(u64),
  /// Never time out
  Never,
}

/// Something that can suspend the current thread of control
/// for a while.
///
/// Between link bring-up attempts the driver sleeps; it never
/// busy-waits on the clock.
pub trait Sleep {
  /// Block for (at least) `dur`
  fn sleep(&self, dur: Millis);
}

/// Milliseconds between two instants, saturating at zero if `later`
/// is not actually later than `earlier`.
pub(crate) fn millis_between<C: Clock>(earlier: Instant<C>, later: Instant<C>) -> Millis {
  later.checked_duration_since(&earlier)
       .and_then(|dur| Milliseconds::<u64>::try_from(dur).ok())
       .unwrap_or(Milliseconds(0))
}
