use core::fmt;
use core::str::FromStr;

use no_std_net::{IpAddr, SocketAddr};
use std_alloc::string::{String, ToString};

/// Data that came from (or is going to) a network peer
#[derive(PartialEq, PartialOrd, Eq, Ord, Hash, Debug, Clone, Copy)]
pub struct Addrd<T>(pub T, pub SocketAddr);

impl<T> Addrd<T> {
  /// Discard the socket and get the data in this Addressed
  pub fn unwrap(self) -> T {
    self.0
  }

  /// Borrow the contents of the addressed item
  pub fn data(&self) -> &T {
    &self.0
  }

  /// Copy the socket address for the data
  pub fn addr(&self) -> SocketAddr {
    self.1
  }
}

/// Address family of a [`Destination`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
  /// IPv4
  Inet,
  /// IPv6
  Inet6,
}

/// A resolved destination: family, numeric address and port.
///
/// `len` mirrors the size of the socket address structure the
/// destination would occupy on a BSD-style socket API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Destination {
  family: AddressFamily,
  addr: SocketAddr,
}

impl Destination {
  /// Create a destination from a socket address
  pub fn new(addr: SocketAddr) -> Self {
    let family = match addr {
      | SocketAddr::V4(_) => AddressFamily::Inet,
      | SocketAddr::V6(_) => AddressFamily::Inet6,
    };

    Self { family, addr }
  }

  /// Address family
  pub fn family(&self) -> AddressFamily {
    self.family
  }

  /// Socket address
  pub fn addr(&self) -> SocketAddr {
    self.addr
  }

  /// IP address
  pub fn ip(&self) -> IpAddr {
    self.addr.ip()
  }

  /// Port
  pub fn port(&self) -> u16 {
    self.addr.port()
  }

  /// Size in bytes of the `sockaddr_in` / `sockaddr_in6` this
  /// destination corresponds to
  #[allow(clippy::len_without_is_empty)]
  pub fn len(&self) -> usize {
    match self.family {
      | AddressFamily::Inet => 16,
      | AddressFamily::Inet6 => 28,
    }
  }

  /// Is the destination a multicast group?
  pub fn is_multicast(&self) -> bool {
    crate::multicast::is_group(self.ip())
  }
}

impl fmt::Display for Destination {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.addr)
  }
}

/// Failed to turn a host into a [`Destination`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
  /// The host was not a numeric IPv4 or IPv6 address.
  ///
  /// Name lookup is not performed.
  NotNumeric(String),
}

impl fmt::Display for AddressError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      | AddressError::NotNumeric(host) => {
        write!(f, "{:?} is not a numeric IP address", host)
      },
    }
  }
}

/// Resolve a numeric host & port into a [`Destination`]
///
/// ```
/// use toad_oneshot::net::{self, AddressFamily};
///
/// let dst = net::resolve("192.0.2.1", 5683).unwrap();
/// assert_eq!(dst.family(), AddressFamily::Inet);
/// assert_eq!(dst.len(), 16);
/// assert!(net::resolve("coap.me", 5683).is_err());
/// ```
pub fn resolve(host: &str, port: u16) -> Result<Destination, AddressError> {
  IpAddr::from_str(host).map(|ip| Destination::new(SocketAddr::new(ip, port)))
                        .map_err(|_| AddressError::NotNumeric(host.to_string()))
}
