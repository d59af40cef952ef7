use core::fmt::Debug;

use toad_msg::{Id, Token};

use crate::net::{Addrd, Destination};
use crate::req::{OptionSet, Req};
use crate::resp::Resp;
use crate::session::{Proto, Security, SessionError};
use crate::time::Millis;

/// What an [`Engine`] is able to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Capabilities {
  /// Connectionless sessions
  pub udp: bool,
  /// Stream sessions
  pub tcp: bool,
  /// DTLS-secured sessions
  pub dtls: bool,
  /// Post-quantum & hybrid key exchanges in secured sessions
  pub post_quantum: bool,
}

impl Capabilities {
  /// An engine that can do everything
  pub const fn all() -> Self {
    Self { udp: true,
           tcp: true,
           dtls: true,
           post_quantum: true }
  }

  /// Can sessions over `proto` be opened?
  pub fn supports(&self, proto: Proto) -> bool {
    match proto {
      | Proto::Udp => self.udp,
      | Proto::Tcp => self.tcp,
      | Proto::Dtls => self.dtls,
    }
  }

  pub(crate) fn log(&self) {
    let yn = |b: bool| if b { "yes" } else { "no" };
    log::info!("engine: UDP {} | TCP {} | DTLS {} | post-quantum key exchange {}",
               yn(self.udp),
               yn(self.tcp),
               yn(self.dtls),
               yn(self.post_quantum));
  }
}

/// The CoAP protocol engine: owns contexts & sessions, puts messages
/// on the wire and pulls them off it.
///
/// Everything the driver allocates through an engine is handed back to it
/// exactly once through one of the `release_*` / `free_*` methods.
pub trait Engine {
  /// Error yielded by engine operations
  type Error: Debug;
  /// Engine-wide state that sessions live in
  type Context;
  /// One open session with one peer
  type Session;

  /// What this engine can do
  fn capabilities(&self) -> Capabilities;

  /// Allocate a context
  fn new_context(&self) -> Result<Self::Context, Self::Error>;

  /// Open a session with `dst`.
  ///
  /// `security` is `Some` exactly when `proto` is secured, and must be applied
  /// before any handshake starts.
  fn new_session(&self,
                 ctx: &mut Self::Context,
                 proto: Proto,
                 dst: Destination,
                 security: Option<&Security>)
                 -> Result<Self::Session, SessionError<Self::Error>>;

  /// Largest message (in bytes) the session can carry
  fn max_pdu_size(&self, session: &Self::Session) -> usize;

  /// The session's `DEFAULT_LEISURE`
  fn default_leisure(&self, session: &Self::Session) -> Millis;

  /// A message id not used by any outstanding message on this session
  fn new_message_id(&self, session: &mut Self::Session) -> Id;

  /// A fresh token
  fn new_token(&self, session: &mut Self::Session) -> Token;

  /// Send a request, yielding the id it was sent with
  fn send(&self, session: &mut Self::Session, req: Req) -> Result<Id, Self::Error>;

  /// Process I/O for (at most about) `slice`, invoking `on_message` for every
  /// message that arrived.
  ///
  /// Yields the time actually spent.
  fn process_io(&self,
                ctx: &mut Self::Context,
                session: &mut Self::Session,
                slice: Millis,
                on_message: &mut dyn FnMut(Addrd<Resp>))
                -> Result<Millis, Self::Error>;

  /// Release options that never made it into a request
  fn release_options(&self, options: OptionSet) {
    drop(options)
  }

  /// Release a session
  fn release_session(&self, session: Self::Session);

  /// Free a context
  fn free_context(&self, ctx: Self::Context);
}
