#![allow(dead_code)]

use ::core::cell::{Cell, Ref, RefCell};
use ::std::rc::Rc;
use embedded_time::duration::Milliseconds;
use embedded_time::rate::Fraction;
use embedded_time::Instant;
use toad_msg::{Id, Token};

use crate::engine::{Capabilities, Engine};
use crate::link::Link;
use crate::net::{Addrd, Destination};
use crate::req::ids::IdGen;
use crate::req::{OptionSet, Req};
use crate::resp::Resp;
use crate::session::{Proto, Security, SessionError};
use crate::time::{Millis, Sleep};

/// Shared log of release / teardown events, in the order they happened
pub type Events = Rc<RefCell<Vec<&'static str>>>;

/// A clock that only moves when told to; ticks are milliseconds
#[derive(Debug, Clone, Default)]
pub struct ClockMock(Rc<Cell<u64>>);

impl ClockMock {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn set(&self, to: u64) {
    self.0.set(to);
  }

  pub fn advance(&self, by: u64) {
    self.0.set(self.0.get() + by);
  }

  pub fn millis(&self) -> u64 {
    self.0.get()
  }
}

impl embedded_time::Clock for ClockMock {
  type T = u64;

  const SCALING_FACTOR: Fraction = Fraction::new(1, 1_000);

  fn try_now(&self) -> Result<Instant<Self>, embedded_time::clock::Error> {
    Ok(Instant::new(self.0.get()))
  }
}

/// Sleeping advances a [`ClockMock`] instead of blocking
#[derive(Debug)]
pub struct SleepMock {
  clock: ClockMock,
  slept: RefCell<Vec<u64>>,
}

impl SleepMock {
  pub fn new(clock: ClockMock) -> Self {
    Self { clock,
           slept: Default::default() }
  }

  pub fn slept(&self) -> Vec<u64> {
    self.slept.borrow().clone()
  }
}

impl Sleep for SleepMock {
  fn sleep(&self, Milliseconds(ms): Millis) {
    self.slept.borrow_mut().push(ms);
    self.clock.advance(ms);
  }
}

/// A network interface whose first attempts can be made to fail
#[derive(Debug, Default)]
pub struct LinkMock {
  pub connects: usize,
  pub readies: usize,
  pub teardowns: usize,
  refuse_for: usize,
  never_ready_for: usize,
  ready_takes: Option<(ClockMock, u64)>,
  events: Events,
}

impl LinkMock {
  pub fn new() -> Self {
    Self::default()
  }

  /// `connect` fails for the first `n` attempts
  pub fn refuse_for(mut self, n: usize) -> Self {
    self.refuse_for = n;
    self
  }

  /// `await_ready` fails for the first `n` attempts
  pub fn never_ready_for(mut self, n: usize) -> Self {
    self.never_ready_for = n;
    self
  }

  /// `await_ready` advances `clock` by `ms`
  pub fn ready_takes(mut self, clock: ClockMock, ms: u64) -> Self {
    self.ready_takes = Some((clock, ms));
    self
  }

  pub fn log_to(mut self, events: Events) -> Self {
    self.events = events;
    self
  }
}

impl Link for LinkMock {
  type Error = &'static str;

  fn connect(&mut self) -> Result<(), Self::Error> {
    self.connects += 1;
    if self.connects <= self.refuse_for {
      Err("connect refused")
    } else {
      Ok(())
    }
  }

  fn await_ready(&mut self, _: Millis) -> Result<(), Self::Error> {
    self.readies += 1;
    if let Some((clock, ms)) = &self.ready_takes {
      clock.advance(*ms);
    }

    if self.connects <= self.never_ready_for {
      Err("not ready")
    } else {
      Ok(())
    }
  }

  fn teardown(&mut self) -> Result<(), Self::Error> {
    self.teardowns += 1;
    self.events.borrow_mut().push("teardown");
    Ok(())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockError(pub &'static str);

#[derive(Debug)]
pub struct Context(usize);

#[derive(Debug)]
pub struct Session {
  ids: IdGen,
  dst: Destination,
}

/// What an [`EngineMock`] has been asked to do
#[derive(Debug, Default)]
pub struct EngineState {
  pub contexts_created: usize,
  pub contexts_freed: usize,
  pub sessions_opened: usize,
  pub sessions_released: usize,
  pub options_released: usize,
  pub session_security: Vec<Option<Security>>,
  pub sent: Vec<Req>,
  pub io_calls: usize,
  pub elapsed: u64,
}

/// Replies to the most recently sent request, delivered during
/// the `n`th (1-based) call to `process_io`
pub type Reply = (usize, fn(&Req) -> Resp);

/// A protocol engine that records everything and replies from a script
pub struct EngineMock {
  caps: Capabilities,
  leisure: Millis,
  max_pdu: usize,
  fail_context: bool,
  session_error: Option<SessionError<MockError>>,
  fail_send: bool,
  io_errors: usize,
  replies: Vec<Reply>,
  events: Events,
  state: RefCell<EngineState>,
}

impl Default for EngineMock {
  fn default() -> Self {
    Self { caps: Capabilities::all(),
           leisure: Milliseconds(5000),
           max_pdu: 1152,
           fail_context: false,
           session_error: None,
           fail_send: false,
           io_errors: 0,
           replies: Vec::new(),
           events: Default::default(),
           state: Default::default() }
  }
}

impl ::core::fmt::Debug for EngineMock {
  fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
    f.debug_struct("EngineMock")
     .field("caps", &self.caps)
     .field("replies", &self.replies.len())
     .field("state", &self.state)
     .finish()
  }
}

impl EngineMock {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn capabilities(mut self, caps: Capabilities) -> Self {
    self.caps = caps;
    self
  }

  pub fn leisure(mut self, ms: u64) -> Self {
    self.leisure = Milliseconds(ms);
    self
  }

  pub fn max_pdu(mut self, size: usize) -> Self {
    self.max_pdu = size;
    self
  }

  pub fn fail_context(mut self) -> Self {
    self.fail_context = true;
    self
  }

  pub fn fail_session(mut self, e: SessionError<MockError>) -> Self {
    self.session_error = Some(e);
    self
  }

  pub fn fail_send(mut self) -> Self {
    self.fail_send = true;
    self
  }

  /// The first `n` calls to `process_io` fail
  pub fn io_errors(mut self, n: usize) -> Self {
    self.io_errors = n;
    self
  }

  pub fn reply(mut self, on_call: usize, f: fn(&Req) -> Resp) -> Self {
    self.replies.push((on_call, f));
    self
  }

  pub fn log_to(mut self, events: Events) -> Self {
    self.events = events;
    self
  }

  pub fn state(&self) -> Ref<'_, EngineState> {
    self.state.borrow()
  }
}

impl Engine for EngineMock {
  type Error = MockError;
  type Context = Context;
  type Session = Session;

  fn capabilities(&self) -> Capabilities {
    self.caps
  }

  fn new_context(&self) -> Result<Context, MockError> {
    if self.fail_context {
      return Err(MockError("no memory for context"));
    }

    let mut state = self.state.borrow_mut();
    state.contexts_created += 1;
    Ok(Context(state.contexts_created))
  }

  fn new_session(&self,
                 _: &mut Context,
                 _: Proto,
                 dst: Destination,
                 security: Option<&Security>)
                 -> Result<Session, SessionError<MockError>> {
    let mut state = self.state.borrow_mut();
    state.session_security.push(security.copied());

    if let Some(e) = &self.session_error {
      return Err(e.clone());
    }

    state.sessions_opened += 1;
    Ok(Session { ids: IdGen::new(0, state.sessions_opened as u64),
                 dst })
  }

  fn max_pdu_size(&self, _: &Session) -> usize {
    self.max_pdu
  }

  fn default_leisure(&self, _: &Session) -> Millis {
    self.leisure
  }

  fn new_message_id(&self, session: &mut Session) -> Id {
    session.ids.next_id()
  }

  fn new_token(&self, session: &mut Session) -> Token {
    session.ids.next_token()
  }

  fn send(&self, _: &mut Session, req: Req) -> Result<Id, MockError> {
    if self.fail_send {
      return Err(MockError("send rejected"));
    }

    let id = req.id();
    self.state.borrow_mut().sent.push(req);
    Ok(id)
  }

  fn process_io(&self,
                _: &mut Context,
                session: &mut Session,
                slice: Millis,
                on_message: &mut dyn FnMut(Addrd<Resp>))
                -> Result<Millis, MockError> {
    let (call, last_sent) = {
      let mut state = self.state.borrow_mut();
      state.io_calls += 1;
      state.elapsed += slice.0;
      (state.io_calls, state.sent.last().cloned())
    };

    if call <= self.io_errors {
      return Err(MockError("io"));
    }

    if let Some(req) = last_sent {
      self.replies
          .iter()
          .filter(|(on, _)| *on == call)
          .for_each(|(_, f)| on_message(Addrd(f(&req), session.dst.addr())));
    }

    Ok(slice)
  }

  fn release_options(&self, options: OptionSet) {
    self.state.borrow_mut().options_released += 1;
    self.events.borrow_mut().push("release_options");
    drop(options);
  }

  fn release_session(&self, _: Session) {
    self.state.borrow_mut().sessions_released += 1;
    self.events.borrow_mut().push("release_session");
  }

  fn free_context(&self, _: Context) {
    self.state.borrow_mut().contexts_freed += 1;
    self.events.borrow_mut().push("free_context");
  }
}
