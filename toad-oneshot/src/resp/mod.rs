use std_alloc::string::{FromUtf8Error, String};
use std_alloc::vec::Vec;
use toad_msg::{Code, Id, OptNumber, Token, Type};

/// Response codes
pub mod code;

/// A message received while waiting for a response.
///
/// Not every message is a response; see [`Resp::is_response`].
#[derive(Debug, Clone, PartialEq)]
pub struct Resp {
  ty: Type,
  id: Id,
  token: Token,
  code: Code,
  opts: Vec<(OptNumber, Vec<u8>)>,
  payload: Vec<u8>,
}

impl Resp {
  /// Create a message
  pub fn new(ty: Type, code: Code, id: Id, token: Token) -> Self {
    Self { ty,
           id,
           token,
           code,
           opts: Vec::new(),
           payload: Vec::new() }
  }

  /// A piggybacked response: an `Ack` echoing the request's id & token
  ///
  /// ```
  /// use toad_msg::{Id, Token, Type};
  /// use toad_oneshot::resp::{code, Resp};
  ///
  /// let mut rep = Resp::ack(Id(1), Token(Default::default()), code::CONTENT);
  /// rep.set_payload("world".bytes());
  /// assert_eq!(rep.ty(), Type::Ack);
  /// assert_eq!(rep.payload_string().unwrap(), "world");
  /// ```
  pub fn ack(id: Id, token: Token, code: Code) -> Self {
    Self::new(Type::Ack, code, id, token)
  }

  /// Message type
  pub fn ty(&self) -> Type {
    self.ty
  }

  /// Message id
  pub fn id(&self) -> Id {
    self.id
  }

  /// Token
  pub fn token(&self) -> Token {
    self.token
  }

  /// Response code
  pub fn code(&self) -> Code {
    self.code
  }

  /// Options, in the order they arrived
  pub fn options(&self) -> &[(OptNumber, Vec<u8>)] {
    &self.opts
  }

  /// Payload
  pub fn payload(&self) -> &[u8] {
    &self.payload
  }

  /// Payload, as a UTF-8 string
  pub fn payload_string(&self) -> Result<String, FromUtf8Error> {
    String::from_utf8(self.payload.clone())
  }

  /// Set the payload
  pub fn set_payload(&mut self, payload: impl IntoIterator<Item = u8>) {
    self.payload = payload.into_iter().collect();
  }

  /// Does this message carry a response code (2.xx, 4.xx, 5.xx)?
  ///
  /// Empty ACKs, resets and requests don't.
  pub fn is_response(&self) -> bool {
    matches!(self.code.class, 2..=5)
  }
}

impl From<toad_msg::alloc::Message> for Resp {
  fn from(msg: toad_msg::alloc::Message) -> Self {
    let opts = msg.opts
                  .into_iter()
                  .flat_map(|(n, vals)| vals.into_iter().map(move |v| (n, v.0)))
                  .collect();

    Self { ty: msg.ty,
           id: msg.id,
           token: msg.token,
           code: msg.code,
           opts,
           payload: msg.payload.0 }
  }
}
