use core::fmt;
use core::str::FromStr;

use std_alloc::string::{String, ToString};

use crate::engine::Engine;
use crate::net::Destination;
use crate::uri::Scheme;

/// Transport a session runs over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Proto {
  /// Connectionless datagrams
  Udp,
  /// A connection-oriented stream
  Tcp,
  /// Datagrams secured by a DTLS handshake
  Dtls,
}

impl Proto {
  /// The transport a URI scheme calls for
  pub fn for_scheme(scheme: Scheme) -> Self {
    match scheme {
      | Scheme::Coap => Proto::Udp,
      | Scheme::CoapTcp => Proto::Tcp,
      | Scheme::Coaps => Proto::Dtls,
    }
  }

  /// Does this transport perform a security handshake?
  pub fn is_secure(&self) -> bool {
    matches!(self, Proto::Dtls)
  }
}

impl fmt::Display for Proto {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
                  | Proto::Udp => "UDP",
                  | Proto::Tcp => "TCP",
                  | Proto::Dtls => "DTLS",
                })
  }
}

/// Parameter set of the ML-KEM (FIPS 203) lattice-based key encapsulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MlKem {
  /// ML-KEM-512
  MlKem512,
  /// ML-KEM-768
  MlKem768,
  /// ML-KEM-1024
  MlKem1024,
}

impl MlKem {
  /// NIST security category
  pub fn nist_level(&self) -> u8 {
    match self {
      | MlKem::MlKem512 => 1,
      | MlKem::MlKem768 => 3,
      | MlKem::MlKem1024 => 5,
    }
  }
}

/// Elliptic curve used in a hybrid key exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Curve {
  /// NIST P-256 (secp256r1)
  P256,
  /// NIST P-384 (secp384r1)
  P384,
  /// NIST P-521 (secp521r1)
  P521,
}

/// Key exchange to negotiate during a secured session's handshake
///
/// ```
/// use toad_oneshot::session::KeyExchange;
///
/// let kx: KeyExchange = "p384_mlkem768".parse().unwrap();
/// assert_eq!(kx, KeyExchange::RECOMMENDED);
/// assert_eq!(kx.group_name(), Some("p384_mlkem768"));
/// assert_eq!(KeyExchange::ClassicalDefault.group_name(), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyExchange {
  /// Whatever the security engine uses when not told otherwise
  ClassicalDefault,
  /// ML-KEM on its own
  PostQuantum(MlKem),
  /// A classical ECDH exchange combined with ML-KEM
  Hybrid(Curve, MlKem),
}

impl Default for KeyExchange {
  fn default() -> Self {
    KeyExchange::ClassicalDefault
  }
}

impl KeyExchange {
  /// Hybrid P-384 + ML-KEM-768, a balance of classical & post-quantum strength
  pub const RECOMMENDED: Self = KeyExchange::Hybrid(Curve::P384, MlKem::MlKem768);

  /// Every exchange that has a named group
  pub const NAMED: [Self; 6] = [KeyExchange::PostQuantum(MlKem::MlKem512),
                                KeyExchange::PostQuantum(MlKem::MlKem768),
                                KeyExchange::PostQuantum(MlKem::MlKem1024),
                                KeyExchange::Hybrid(Curve::P256, MlKem::MlKem512),
                                KeyExchange::Hybrid(Curve::P384, MlKem::MlKem768),
                                KeyExchange::Hybrid(Curve::P521, MlKem::MlKem1024)];

  /// TLS named group to offer, `None` to leave the engine's defaults alone.
  ///
  /// Hybrids only exist for matching security levels; other
  /// pairings have no name.
  pub fn group_name(&self) -> Option<&'static str> {
    use Curve::*;
    use MlKem::*;

    match self {
      | KeyExchange::ClassicalDefault => None,
      | KeyExchange::PostQuantum(MlKem512) => Some("MLKEM512"),
      | KeyExchange::PostQuantum(MlKem768) => Some("MLKEM768"),
      | KeyExchange::PostQuantum(MlKem1024) => Some("MLKEM1024"),
      | KeyExchange::Hybrid(P256, MlKem512) => Some("p256_mlkem512"),
      | KeyExchange::Hybrid(P384, MlKem768) => Some("p384_mlkem768"),
      | KeyExchange::Hybrid(P521, MlKem1024) => Some("p521_mlkem1024"),
      | KeyExchange::Hybrid(..) => None,
    }
  }

  /// Does this exchange need post-quantum support from the security engine?
  pub fn is_post_quantum(&self) -> bool {
    !matches!(self, KeyExchange::ClassicalDefault)
  }
}

impl fmt::Display for KeyExchange {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.group_name() {
      | Some(name) => f.write_str(name),
      | None if *self == KeyExchange::ClassicalDefault => f.write_str("classical"),
      | None => write!(f, "{:?}", self),
    }
  }
}

/// A string did not name a known [`KeyExchange`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownKeyExchange(pub String);

impl fmt::Display for UnknownKeyExchange {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "unknown key exchange {:?}", self.0)
  }
}

impl FromStr for KeyExchange {
  type Err = UnknownKeyExchange;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    if s.eq_ignore_ascii_case("classical") || s.eq_ignore_ascii_case("default") {
      return Ok(KeyExchange::ClassicalDefault);
    }

    KeyExchange::NAMED.iter()
                      .copied()
                      .find(|kx| kx.group_name().map(|n| n.eq_ignore_ascii_case(s)).unwrap_or(false))
                      .ok_or_else(|| UnknownKeyExchange(s.to_string()))
  }
}

/// Whether the peer's certificate chain is verified during the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerVerification {
  /// The handshake fails if the peer can't be verified
  Required,
  /// Anybody who completes the handshake is trusted.
  ///
  /// This accepts impostors; it exists for test servers with
  /// self-signed certificates and must be chosen explicitly.
  Disabled,
}

impl Default for PeerVerification {
  fn default() -> Self {
    PeerVerification::Required
  }
}

/// Security policy for secured sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Security {
  /// See [`PeerVerification`]
  pub verification: PeerVerification,
  /// Bound to the handshake before it starts
  pub key_exchange: KeyExchange,
}

/// Why a security handshake failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeFailure<E> {
  /// The security engine (or the peer) doesn't support the requested key exchange.
  ///
  /// No other key exchange is attempted; the caller may retry with a different one.
  KeyExchangeUnsupported(KeyExchange),
  /// The engine reported a failure during the handshake
  Engine(E),
}

/// A session could not be established
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError<E> {
  /// The destination could not be reached
  DestinationUnreachable(E),
  /// The security handshake failed
  HandshakeFailed(HandshakeFailure<E>),
  /// The engine doesn't speak the transport the scheme calls for
  UnsupportedScheme(Proto),
}

impl<E: fmt::Debug> fmt::Display for SessionError<E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      | SessionError::DestinationUnreachable(e) => write!(f, "destination unreachable: {:?}", e),
      | SessionError::HandshakeFailed(HandshakeFailure::KeyExchangeUnsupported(kx)) => {
        write!(f, "handshake failed: key exchange {} is not supported", kx)
      },
      | SessionError::HandshakeFailed(HandshakeFailure::Engine(e)) => {
        write!(f, "handshake failed: {:?}", e)
      },
      | SessionError::UnsupportedScheme(proto) => write!(f, "{} sessions are not supported", proto),
    }
  }
}

/// Open a session with `dst` over the transport `scheme` calls for.
///
/// `security` only applies to secured sessions. A key exchange the engine
/// can't do is rejected before the engine is asked to open anything.
pub fn establish<E: Engine>(engine: &E,
                            ctx: &mut E::Context,
                            scheme: Scheme,
                            dst: Destination,
                            security: &Security)
                            -> Result<E::Session, SessionError<E::Error>> {
  let proto = Proto::for_scheme(scheme);
  let caps = engine.capabilities();

  if !caps.supports(proto) {
    log::error!("session: engine does not support {}", proto);
    return Err(SessionError::UnsupportedScheme(proto));
  }

  let security = if proto.is_secure() {
    if security.key_exchange.is_post_quantum() && !caps.post_quantum {
      log::error!("session: key exchange {} requested but engine has no post-quantum support",
                  security.key_exchange);
      return Err(SessionError::HandshakeFailed(HandshakeFailure::KeyExchangeUnsupported(security.key_exchange)));
    }

    if security.verification == PeerVerification::Disabled {
      log::warn!("session: peer verification is DISABLED; the peer will not be authenticated");
    }

    log::info!("session: {} with {} (key exchange {})",
               proto,
               dst,
               security.key_exchange);
    Some(security)
  } else {
    log::info!("session: {} with {}", proto, dst);
    None
  };

  engine.new_session(ctx, proto, dst, security)
        .map_err(|e| {
          log::error!("session: {}", e);
          e
        })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::engine::Capabilities;
  use crate::net;
  use crate::test::EngineMock;

  fn dst() -> Destination {
    net::resolve("192.0.2.1", 5684).unwrap()
  }

  #[test]
  fn scheme_selects_proto() {
    assert_eq!(Proto::for_scheme(Scheme::Coap), Proto::Udp);
    assert_eq!(Proto::for_scheme(Scheme::CoapTcp), Proto::Tcp);
    assert_eq!(Proto::for_scheme(Scheme::Coaps), Proto::Dtls);
  }

  #[test]
  fn key_exchange_names_round_trip() {
    for kx in KeyExchange::NAMED {
      let name = kx.group_name().unwrap();
      assert_eq!(name.parse::<KeyExchange>(), Ok(kx));
    }

    assert_eq!("classical".parse::<KeyExchange>(), Ok(KeyExchange::ClassicalDefault));
    assert!("x25519_kyber".parse::<KeyExchange>().is_err());
  }

  #[test]
  fn nist_levels() {
    assert_eq!(MlKem::MlKem512.nist_level(), 1);
    assert_eq!(MlKem::MlKem768.nist_level(), 3);
    assert_eq!(MlKem::MlKem1024.nist_level(), 5);
  }

  #[test]
  fn mismatched_hybrid_has_no_group() {
    assert_eq!(KeyExchange::Hybrid(Curve::P256, MlKem::MlKem1024).group_name(),
               None);
  }

  #[test]
  fn verification_is_required_by_default() {
    assert_eq!(Security::default().verification, PeerVerification::Required);
  }

  #[test]
  fn security_only_passed_for_dtls() {
    let engine = EngineMock::new();
    let mut ctx = engine.new_context().unwrap();

    establish(&engine, &mut ctx, Scheme::Coap, dst(), &Security::default()).unwrap();
    assert_eq!(engine.state().session_security, vec![None]);

    let security = Security { key_exchange: KeyExchange::RECOMMENDED,
                              ..Default::default() };
    establish(&engine, &mut ctx, Scheme::Coaps, dst(), &security).unwrap();
    assert_eq!(engine.state().session_security, vec![None, Some(security)]);
  }

  #[test]
  fn unsupported_proto() {
    let engine = EngineMock::new().capabilities(Capabilities { tcp: false,
                                                               ..Capabilities::all() });
    let mut ctx = engine.new_context().unwrap();

    assert_eq!(establish(&engine, &mut ctx, Scheme::CoapTcp, dst(), &Security::default()).err(),
               Some(SessionError::UnsupportedScheme(Proto::Tcp)));
    assert!(engine.state().session_security.is_empty());
  }

  #[test]
  fn post_quantum_without_engine_support() {
    let engine = EngineMock::new().capabilities(Capabilities { post_quantum: false,
                                                               ..Capabilities::all() });
    let mut ctx = engine.new_context().unwrap();
    let security = Security { key_exchange: KeyExchange::RECOMMENDED,
                              ..Default::default() };

    assert_eq!(establish(&engine, &mut ctx, Scheme::Coaps, dst(), &security).err(),
               Some(SessionError::HandshakeFailed(HandshakeFailure::KeyExchangeUnsupported(KeyExchange::RECOMMENDED))));
    assert!(engine.state().session_security.is_empty());

    // classical is fine
    establish(&engine, &mut ctx, Scheme::Coaps, dst(), &Security::default()).unwrap();
  }
}
