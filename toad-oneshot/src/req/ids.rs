use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tinyvec::ArrayVec;
use toad_msg::{Id, Token};

/// Hands out message ids & tokens for one session.
///
/// The first id is random in `0..=255`, every following id is one larger
/// (wrapping), so no id repeats until 65536 have been handed out.
///
/// Tokens are 8 bytes: the 2-byte seed from [`crate::config::Msg`]
/// followed by 6 random bytes.
///
/// ```
/// use toad_oneshot::req::ids::IdGen;
///
/// let mut ids = IdGen::new(0, 1234);
/// let a = ids.next_id();
/// let b = ids.next_id();
/// assert_eq!(b.0, a.0.wrapping_add(1));
/// assert_ne!(ids.next_token(), ids.next_token());
/// ```
#[derive(Debug, Clone)]
pub struct IdGen {
  rand: ChaCha8Rng,
  seed: u16,
  next: u16,
}

impl IdGen {
  /// Create a generator.
  ///
  /// `entropy` should differ between sessions (e.g. the time the session was opened).
  pub fn new(seed: u16, entropy: u64) -> Self {
    let mut rand = ChaCha8Rng::seed_from_u64(entropy ^ u64::from(seed) << 48);
    let next = rand.gen_range(0..=255);

    Self { rand, seed, next }
  }

  /// A message id
  pub fn next_id(&mut self) -> Id {
    let id = Id(self.next);
    self.next = self.next.wrapping_add(1);
    id
  }

  /// A random number, for anything else about the session that
  /// should differ from one session to the next
  pub fn next_u64(&mut self) -> u64 {
    self.rand.next_u64()
  }

  /// A token
  pub fn next_token(&mut self) -> Token {
    let mut random = [0u8; 6];
    self.rand.fill_bytes(&mut random);

    let mut bytes = ArrayVec::<[u8; 8]>::new();
    bytes.extend_from_slice(&self.seed.to_be_bytes());
    bytes.extend_from_slice(&random);

    Token(bytes)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn ids_dont_repeat() {
    let mut ids = IdGen::new(0, 0);
    let first = ids.next_id();
    assert!(first.0 <= 255);

    let mut seen = std::collections::BTreeSet::new();
    seen.insert(first.0);
    for _ in 0..1000 {
      assert!(seen.insert(ids.next_id().0));
    }
  }

  #[test]
  fn token_carries_seed() {
    let mut ids = IdGen::new(0xBEEF, 0);
    let token = ids.next_token();
    assert_eq!(token.0.len(), 8);
    assert_eq!(&token.0[..2], &[0xBE, 0xEF]);
  }
}
