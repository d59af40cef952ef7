use core::fmt;

use std_alloc::collections::BTreeMap;
use std_alloc::string::String;
use std_alloc::vec::Vec;
use toad_msg::{Id, OptNumber, OptValue, Payload, Token, Type};

use crate::uri::{self, ParseError, TargetUri};

/// Request methods
pub mod method;

#[doc(inline)]
pub use method::Method;

/// Request builder
pub mod builder;

#[doc(inline)]
pub use builder::*;

/// Message id & token generation
pub mod ids;

/// Option numbers that may be derived from a [`TargetUri`]
pub mod opt {
  use toad_msg::OptNumber;

  /// Uri-Host
  pub const URI_HOST: OptNumber = OptNumber(3);
  /// Uri-Port
  pub const URI_PORT: OptNumber = OptNumber(7);
  /// Uri-Path
  pub const URI_PATH: OptNumber = OptNumber(11);
  /// Uri-Query
  pub const URI_QUERY: OptNumber = OptNumber(15);
}

/// Size of the fixed CoAP header
pub const HEADER_LEN: usize = 4;

/// Options derived from a [`TargetUri`], in ascending option number order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OptionSet(Vec<(OptNumber, OptValue<Vec<u8>>)>);

impl OptionSet {
  /// Derive options from a target:
  /// - `Uri-Port` if the port isn't the scheme's default
  /// - one `Uri-Path` per path segment
  /// - one `Uri-Query` per `&`-separated query parameter
  ///
  /// Percent-escapes are decoded. Hosts are numeric literals, so `Uri-Host` is never added.
  ///
  /// ```
  /// use toad_oneshot::req::{opt, OptionSet};
  ///
  /// let target = toad_oneshot::uri::parse("coap://10.0.0.1:1234/a/b%20c?x=1").unwrap();
  /// let opts = OptionSet::from_target(&target).unwrap();
  /// let numbers = opts.numbers().collect::<Vec<_>>();
  /// assert_eq!(numbers, vec![opt::URI_PORT, opt::URI_PATH, opt::URI_PATH, opt::URI_QUERY]);
  /// ```
  pub fn from_target(target: &TargetUri) -> Result<Self, ParseError> {
    let mut opts = Vec::new();

    if let Some(port) = target.port().filter(|p| *p != target.scheme().default_port()) {
      opts.push((opt::URI_PORT, OptValue(encode_uint(port as u32))));
    }

    for seg in target.path_segments() {
      opts.push((opt::URI_PATH, OptValue(uri::decode(seg)?)));
    }

    for param in target.query_params() {
      opts.push((opt::URI_QUERY, OptValue(uri::decode(param)?)));
    }

    let mut set = OptionSet(opts);
    set.sort();
    Ok(set)
  }

  /// Sort by option number, keeping the relative order of repeated options
  pub fn sort(&mut self) {
    self.0.sort_by_key(|(n, _)| *n);
  }

  /// Option numbers, in order
  pub fn numbers(&self) -> impl Iterator<Item = OptNumber> + '_ {
    self.0.iter().map(|(n, _)| *n)
  }

  /// Options, in order
  pub fn iter(&self) -> impl Iterator<Item = (OptNumber, &[u8])> {
    self.0.iter().map(|(n, v)| (*n, v.0.as_slice()))
  }

  /// Values of every instance of option `number`
  pub fn get(&self, number: OptNumber) -> impl Iterator<Item = &[u8]> {
    self.iter().filter(move |(n, _)| *n == number).map(|(_, v)| v)
  }

  /// Number of options
  pub fn len(&self) -> usize {
    self.0.len()
  }

  /// Are there no options?
  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// Size of the options once encoded (delta + length headers and values)
  pub fn encoded_len(&self) -> usize {
    fn ext(n: usize) -> usize {
      match n {
        | n if n < 13 => 0,
        | n if n < 269 => 1,
        | _ => 2,
      }
    }

    let mut prev = 0u32;
    self.0
        .iter()
        .map(|(OptNumber(n), OptValue(v))| {
          let delta = (n - prev) as usize;
          prev = *n;
          1 + ext(delta) + ext(v.len()) + v.len()
        })
        .sum()
  }
}

fn encode_uint(n: u32) -> Vec<u8> {
  n.to_be_bytes()
   .iter()
   .copied()
   .skip_while(|b| *b == 0)
   .collect()
}

/// Errors encounterable building a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
  /// The target could not be turned into options
  Uri(ParseError),
  /// The request would not fit in the session's maximum message size
  OptionsTooLarge {
    /// Size of the request with options attached
    size: usize,
    /// Largest message the session carries
    capacity: usize,
  },
}

impl fmt::Display for BuildError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      | BuildError::Uri(e) => write!(f, "{}", e),
      | BuildError::OptionsTooLarge { size, capacity } => {
        write!(f,
               "request would be {} bytes, session allows at most {}",
               size, capacity)
      },
    }
  }
}

/// [`Req::attach`] failed; the options are handed back so they can be released
#[derive(Debug, Clone, PartialEq)]
pub struct Unattached {
  /// Why they weren't attached
  pub error: BuildError,
  /// The options
  pub options: OptionSet,
}

/// A CoAP request
#[derive(Debug, Clone, PartialEq)]
pub struct Req {
  ty: Type,
  method: Method,
  id: Id,
  token: Token,
  max_size: usize,
  opts: OptionSet,
  payload: Vec<u8>,
}

impl Req {
  /// Create a request with no options or payload
  pub fn new(ty: Type, method: Method, id: Id, token: Token, max_size: usize) -> Self {
    Self { ty,
           method,
           id,
           token,
           max_size,
           opts: OptionSet::default(),
           payload: Vec::new() }
  }

  /// Message type (`Con` or `Non`)
  pub fn ty(&self) -> Type {
    self.ty
  }

  /// Method
  pub fn method(&self) -> Method {
    self.method
  }

  /// Message id
  pub fn id(&self) -> Id {
    self.id
  }

  /// Token
  pub fn token(&self) -> Token {
    self.token
  }

  /// Attached options
  pub fn options(&self) -> &OptionSet {
    &self.opts
  }

  /// Payload
  pub fn payload(&self) -> &[u8] {
    &self.payload
  }

  /// Payload, as a UTF-8 string
  pub fn payload_string(&self) -> Result<String, std_alloc::string::FromUtf8Error> {
    String::from_utf8(self.payload.clone())
  }

  /// Largest size this request may grow to
  pub fn max_size(&self) -> usize {
    self.max_size
  }

  /// Size of the request once encoded
  pub fn size(&self) -> usize {
    let payload = match self.payload.len() {
      | 0 => 0,
      | n => 1 + n,
    };

    HEADER_LEN + self.token.0.len() + self.opts.encoded_len() + payload
  }

  /// Attach options to this request, replacing any attached already.
  ///
  /// The options are moved into the request if the request still fits
  /// in [`Req::max_size`]; if not they're handed back untouched.
  pub fn attach(&mut self, mut options: OptionSet) -> Result<(), Unattached> {
    options.sort();
    let size = self.size() - self.opts.encoded_len() + options.encoded_len();

    if size > self.max_size {
      return Err(Unattached { error: BuildError::OptionsTooLarge { size,
                                                                   capacity: self.max_size },
                              options });
    }

    self.opts = options;
    Ok(())
  }

  /// Set the payload
  pub fn set_payload(&mut self, payload: impl IntoIterator<Item = u8>) {
    self.payload = payload.into_iter().collect();
  }
}

impl From<Req> for toad_msg::alloc::Message {
  fn from(req: Req) -> Self {
    let mut opts = BTreeMap::<OptNumber, Vec<OptValue<Vec<u8>>>>::new();
    for (n, v) in req.opts.0 {
      opts.entry(n).or_default().push(v);
    }

    toad_msg::alloc::Message { id: req.id,
                               ty: req.ty,
                               ver: Default::default(),
                               token: req.token,
                               code: req.method.code(),
                               opts,
                               payload: Payload(req.payload) }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn target(s: &str) -> TargetUri {
    uri::parse(s).unwrap()
  }

  #[test]
  fn options_are_sorted() {
    let opts = OptionSet::from_target(&target("coap://10.0.0.1:99/a/b/c?d&e")).unwrap();
    let nums = opts.numbers().map(|OptNumber(n)| n).collect::<Vec<_>>();
    assert_eq!(nums, vec![7, 11, 11, 11, 15, 15]);
    assert!(nums.windows(2).all(|w| w[0] <= w[1]));
  }

  #[test]
  fn sort_is_stable() {
    let mut opts = OptionSet(vec![(opt::URI_QUERY, OptValue(b"q".to_vec())),
                                  (opt::URI_PATH, OptValue(b"first".to_vec())),
                                  (opt::URI_PATH, OptValue(b"second".to_vec()))]);
    opts.sort();
    assert_eq!(opts.get(opt::URI_PATH).collect::<Vec<_>>(),
               vec![&b"first"[..], &b"second"[..]]);
    assert_eq!(opts.numbers().last(), Some(opt::URI_QUERY));
  }

  #[test]
  fn default_port_is_not_an_option() {
    let opts = OptionSet::from_target(&target("coap://10.0.0.1:5683/hello")).unwrap();
    assert_eq!(opts.numbers().collect::<Vec<_>>(), vec![opt::URI_PATH]);

    let opts = OptionSet::from_target(&target("coaps://10.0.0.1:5683/hello")).unwrap();
    assert_eq!(opts.get(opt::URI_PORT).collect::<Vec<_>>(), vec![&[0x16, 0x33][..]]);
  }

  #[test]
  fn escapes_are_decoded() {
    let opts = OptionSet::from_target(&target("coap://10.0.0.1/hello%20world")).unwrap();
    assert_eq!(opts.get(opt::URI_PATH).collect::<Vec<_>>(), vec![&b"hello world"[..]]);
  }

  #[test]
  fn encoded_len() {
    // delta 11, len 5: 1 + 5
    let opts = OptionSet::from_target(&target("coap://10.0.0.1/hello")).unwrap();
    assert_eq!(opts.encoded_len(), 6);

    // delta 0, len 20: 1 + 1 + 20
    let long = "x".repeat(20);
    let opts = OptionSet::from_target(&target(&format!("coap://10.0.0.1/hello/{}", long))).unwrap();
    assert_eq!(opts.encoded_len(), 6 + 22);

    // delta 15 from 0 needs an extra byte
    let opts = OptionSet::from_target(&target("coap://10.0.0.1?a")).unwrap();
    assert_eq!(opts.encoded_len(), 1 + 1 + 1);
  }

  #[test]
  fn attach_respects_max_size() {
    let opts = OptionSet::from_target(&target("coap://10.0.0.1/hello")).unwrap();
    let token = Token(Default::default());

    // header (4) + hello (6)
    let mut req = Req::new(Type::Con, Method::GET, Id(1), token, 10);
    req.attach(opts.clone()).unwrap();
    assert_eq!(req.options(), &opts);
    assert_eq!(req.size(), 10);

    let mut req = Req::new(Type::Con, Method::GET, Id(1), token, 9);
    let Unattached { error, options } = req.attach(opts.clone()).unwrap_err();
    assert_eq!(error,
               BuildError::OptionsTooLarge { size: 10,
                                             capacity: 9 });
    assert_eq!(options, opts);
    assert!(req.options().is_empty());
  }
}
