use core::fmt;
use core::str::FromStr;

use std_alloc::string::{String, ToString};

/// Longest host component (in bytes) that will be accepted.
///
/// Hosts longer than this are rejected, never truncated.
pub const HOST_CAPACITY: usize = 63;

/// Default port for `coap` and `coap+tcp`
pub const COAP_PORT: u16 = 5683;

/// Default port for `coaps`
pub const COAPS_PORT: u16 = 5684;

/// URI scheme of a request target
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Scheme {
  /// `coap://`, connectionless & insecure
  Coap,
  /// `coap+tcp://`, over a stream transport
  CoapTcp,
  /// `coaps://`, secured with DTLS
  Coaps,
}

impl Scheme {
  /// The scheme as it appears in a URI
  pub fn as_str(&self) -> &'static str {
    match self {
      | Scheme::Coap => "coap",
      | Scheme::CoapTcp => "coap+tcp",
      | Scheme::Coaps => "coaps",
    }
  }

  /// Port used when the URI doesn't name one
  pub fn default_port(&self) -> u16 {
    match self {
      | Scheme::Coap | Scheme::CoapTcp => COAP_PORT,
      | Scheme::Coaps => COAPS_PORT,
    }
  }

  /// Does this scheme require a security handshake?
  pub fn is_secure(&self) -> bool {
    matches!(self, Scheme::Coaps)
  }
}

impl FromStr for Scheme {
  type Err = ParseError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      | "coap" => Ok(Scheme::Coap),
      | "coap+tcp" => Ok(Scheme::CoapTcp),
      | "coaps" => Ok(Scheme::Coaps),
      | _ => Err(ParseError::UnknownScheme(s.to_string())),
    }
  }
}

impl fmt::Display for Scheme {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Errors encounterable parsing a [`TargetUri`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
  /// There was no `scheme://` prefix
  MissingScheme,
  /// The scheme was not one of `coap`, `coap+tcp`, `coaps`
  UnknownScheme(String),
  /// The host component was empty
  EmptyHost,
  /// The host component was longer than [`HOST_CAPACITY`]
  HostTooLong {
    /// length of the host in bytes
    len: usize,
    /// [`HOST_CAPACITY`]
    capacity: usize,
  },
  /// An IPv6 literal host was missing its closing `]`
  UnterminatedIpLiteral,
  /// The port was not an integer in `1..=65535`
  InvalidPort(String),
  /// CoAP URIs must not have a fragment (`#...`)
  Fragment,
  /// A `%` escape was not followed by two hex digits
  InvalidEscape,
}

impl fmt::Display for ParseError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      | ParseError::MissingScheme => write!(f, "missing scheme"),
      | ParseError::UnknownScheme(s) => write!(f, "unknown scheme {:?}", s),
      | ParseError::EmptyHost => write!(f, "empty host"),
      | ParseError::HostTooLong { len, capacity } => {
        write!(f, "host is {} bytes long, at most {} are allowed", len, capacity)
      },
      | ParseError::UnterminatedIpLiteral => write!(f, "unterminated IPv6 literal"),
      | ParseError::InvalidPort(p) => write!(f, "invalid port {:?}", p),
      | ParseError::Fragment => write!(f, "fragments are not allowed in CoAP URIs"),
      | ParseError::InvalidEscape => write!(f, "invalid percent-escape"),
    }
  }
}

/// A parsed request target, e.g. `coap://192.0.2.1:5683/sensors/temp?unit=c`
///
/// `path` is stored without its leading `/` and `query` without its `?`;
/// both keep their percent-escapes (they're decoded when turned into options).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetUri {
  scheme: Scheme,
  host: String,
  port: Option<u16>,
  path: String,
  query: String,
}

impl TargetUri {
  /// URI scheme
  pub fn scheme(&self) -> Scheme {
    self.scheme
  }

  /// Host, without brackets for IPv6 literals
  pub fn host(&self) -> &str {
    &self.host
  }

  /// The port explicitly named by the URI
  pub fn port(&self) -> Option<u16> {
    self.port
  }

  /// The port named by the URI, or the scheme's default
  pub fn port_or_default(&self) -> u16 {
    self.port.unwrap_or_else(|| self.scheme.default_port())
  }

  /// Path, without the leading `/`
  pub fn path(&self) -> &str {
    &self.path
  }

  /// Query, without the leading `?`
  pub fn query(&self) -> &str {
    &self.query
  }

  /// Path segments
  pub fn path_segments(&self) -> impl Iterator<Item = &str> {
    self.path.split('/').filter(|s| !s.is_empty())
  }

  /// `&`-separated query parameters
  pub fn query_params(&self) -> impl Iterator<Item = &str> {
    self.query.split('&').filter(|s| !s.is_empty())
  }
}

impl FromStr for TargetUri {
  type Err = ParseError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    parse(s)
  }
}

impl fmt::Display for TargetUri {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}://", self.scheme)?;

    if self.host.contains(':') {
      write!(f, "[{}]", self.host)?;
    } else {
      f.write_str(&self.host)?;
    }

    if let Some(port) = self.port {
      write!(f, ":{}", port)?;
    }

    if !self.path.is_empty() {
      write!(f, "/{}", self.path)?;
    }

    if !self.query.is_empty() {
      write!(f, "?{}", self.query)?;
    }

    Ok(())
  }
}

/// Parse a request target.
///
/// ```
/// use toad_oneshot::uri::{self, Scheme};
///
/// let uri = uri::parse("coaps://192.0.2.1/hello?who=world").unwrap();
/// assert_eq!(uri.scheme(), Scheme::Coaps);
/// assert_eq!(uri.host(), "192.0.2.1");
/// assert_eq!(uri.port_or_default(), 5684);
/// assert_eq!(uri.path(), "hello");
/// assert_eq!(uri.query(), "who=world");
/// ```
pub fn parse(text: &str) -> Result<TargetUri, ParseError> {
  let (scheme, rest) = text.split_once("://").ok_or(ParseError::MissingScheme)?;
  let scheme = scheme.parse::<Scheme>()?;

  if rest.contains('#') {
    return Err(ParseError::Fragment);
  }

  let authority_end = rest.find(|c: char| c == '/' || c == '?').unwrap_or(rest.len());
  let (authority, rest) = rest.split_at(authority_end);
  let (host, port) = split_authority(authority)?;

  if host.is_empty() {
    return Err(ParseError::EmptyHost);
  }

  if host.len() > HOST_CAPACITY {
    return Err(ParseError::HostTooLong { len: host.len(),
                                         capacity: HOST_CAPACITY });
  }

  let port = match port {
    | None => None,
    | Some(p) => match p.parse::<u16>() {
      | Ok(n) if n > 0 => Some(n),
      | _ => return Err(ParseError::InvalidPort(p.to_string())),
    },
  };

  let (path, query) = match rest.split_once('?') {
    | Some((path, query)) => (path, query),
    | None => (rest, ""),
  };

  // both are decoded later; check the escapes now so that a bad URI fails here
  decode(path)?;
  decode(query)?;

  Ok(TargetUri { scheme,
                 host: host.to_string(),
                 port,
                 path: path.trim_start_matches('/').to_string(),
                 query: query.to_string() })
}

fn split_authority(authority: &str) -> Result<(&str, Option<&str>), ParseError> {
  match authority.strip_prefix('[') {
    | Some(bracketed) => {
      let (host, after) = bracketed.split_once(']')
                                   .ok_or(ParseError::UnterminatedIpLiteral)?;
      match after {
        | "" => Ok((host, None)),
        | after => after.strip_prefix(':')
                        .map(|port| (host, Some(port)))
                        .ok_or_else(|| ParseError::InvalidPort(after.to_string())),
      }
    },
    | None => Ok(match authority.split_once(':') {
      | Some((host, port)) => (host, Some(port)),
      | None => (authority, None),
    }),
  }
}

/// Decode `%XX` escapes
pub(crate) fn decode(s: &str) -> Result<std_alloc::vec::Vec<u8>, ParseError> {
  let mut out = std_alloc::vec::Vec::with_capacity(s.len());
  let mut bytes = s.bytes();

  while let Some(b) = bytes.next() {
    if b == b'%' {
      let hi = bytes.next().and_then(hex).ok_or(ParseError::InvalidEscape)?;
      let lo = bytes.next().and_then(hex).ok_or(ParseError::InvalidEscape)?;
      out.push(hi << 4 | lo);
    } else {
      out.push(b);
    }
  }

  Ok(out)
}

fn hex(b: u8) -> Option<u8> {
  (b as char).to_digit(16).map(|d| d as u8)
}
