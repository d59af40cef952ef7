use core::fmt;

use embedded_time::duration::Milliseconds;
use std_alloc::vec::Vec;
use toad_msg::{Id, Token, Type};

use crate::config;
use crate::engine::Engine;
use crate::logging;
use crate::net::Addrd;
use crate::req::Req;
use crate::resp::Resp;
use crate::time::{Millis, Timeout};

/// Where an exchange is at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
  /// Nothing sent yet
  Idle,
  /// The request is out, waiting for the response
  Sent,
  /// The response arrived
  Satisfied,
  /// The wait budget ran out before a response arrived
  TimedOut,
  /// The exchange was stopped without a (single) response; either
  /// the request could not be sent or a multicast wait ended
  Aborted,
}

/// Did charging time against the budget exhaust it?
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charge {
  /// Some budget remains
  Remaining(Millis),
  /// Nothing is left
  Exhausted,
}

/// The wait budget for a session whose `DEFAULT_LEISURE` is `leisure`:
/// the whole seconds of leisure plus one, in milliseconds.
///
/// ```
/// use embedded_time::duration::Milliseconds;
/// use toad_oneshot::exchange::budget;
///
/// assert_eq!(budget(Milliseconds(5_000)), Milliseconds(6_000u64));
/// assert_eq!(budget(Milliseconds(5_999)), Milliseconds(6_000u64));
/// assert_eq!(budget(Milliseconds(0)), Milliseconds(1_000u64));
/// ```
pub fn budget(Milliseconds(leisure): Millis) -> Millis {
  Milliseconds((leisure / 1000 + 1) * 1000)
}

/// The one request in flight, and the latch that catches its response
#[derive(Debug, Clone, PartialEq)]
pub struct PendingExchange {
  id: Id,
  token: Token,
  multicast: bool,
  state: State,
  remaining: Option<Millis>,
  response: Option<Addrd<Resp>>,
  collected: Vec<Addrd<Resp>>,
}

impl PendingExchange {
  /// An exchange for a request with `id` & `token`, that may wait for `wait`
  pub fn new(id: Id, token: Token, multicast: bool, wait: Timeout) -> Self {
    Self { id,
           token,
           multicast,
           state: State::Idle,
           remaining: match wait {
             | Timeout::Millis(ms) => Some(Milliseconds(ms)),
             | Timeout::Never => None,
           },
           response: None,
           collected: Vec::new() }
  }

  /// Current state
  pub fn state(&self) -> State {
    self.state
  }

  /// Id of the outstanding request
  pub fn id(&self) -> Id {
    self.id
  }

  /// Budget left, `None` if waiting forever
  pub fn remaining(&self) -> Option<Millis> {
    self.remaining
  }

  /// The request went out with `id`
  pub fn sent(&mut self, id: Id) {
    if self.state == State::Idle {
      self.id = id;
      self.state = State::Sent;
    }
  }

  /// The request could not be sent
  pub fn send_failed(&mut self) {
    if self.state == State::Idle {
      self.state = State::Aborted;
    }
  }

  /// Does `msg` answer the outstanding request?
  ///
  /// Piggybacked responses (`Ack`) must echo the request's id and token;
  /// separate responses and stream responses are matched by token alone.
  pub fn answers(&self, msg: &Resp) -> bool {
    msg.is_response()
    && match msg.ty() {
      | Type::Ack => msg.id() == self.id && msg.token() == self.token,
      | Type::Reset => false,
      | Type::Con | Type::Non => msg.token() == self.token,
    }
  }

  /// Offer a message that arrived.
  ///
  /// Yields whether it was accepted.
  /// The first unicast response that [answers](PendingExchange::answers) the
  /// request is latched; once latched nothing else is accepted.
  /// Multicast exchanges collect every answer.
  pub fn offer(&mut self, msg: Addrd<Resp>) -> bool {
    if self.state != State::Sent {
      log::debug!("exchange: ignoring {} from {}; exchange is {:?}",
                  logging::summarize(msg.data()),
                  msg.addr(),
                  self.state);
      return false;
    }

    if !self.answers(msg.data()) {
      log::debug!("exchange: ignoring unrelated {} from {}",
                  logging::summarize(msg.data()),
                  msg.addr());
      return false;
    }

    if self.multicast {
      self.collected.push(msg);
    } else {
      self.response = Some(msg);
      self.state = State::Satisfied;
    }

    true
  }

  /// Charge time spent waiting against the budget.
  ///
  /// Meeting or exceeding the remaining budget exhausts it and times the exchange out.
  pub fn charge(&mut self, Milliseconds(elapsed): Millis) -> Charge {
    match self.remaining {
      | None => Charge::Remaining(Milliseconds(u64::MAX)),
      | Some(Milliseconds(remaining)) if elapsed >= remaining => {
        self.remaining = Some(Milliseconds(0));
        if self.state == State::Sent {
          self.state = if self.multicast {
            State::Aborted
          } else {
            State::TimedOut
          };
        }
        Charge::Exhausted
      },
      | Some(Milliseconds(remaining)) => {
        let left = Milliseconds(remaining - elapsed);
        self.remaining = Some(left);
        Charge::Remaining(left)
      },
    }
  }

  /// The latched response, if any
  pub fn response(&self) -> Option<&Addrd<Resp>> {
    self.response.as_ref()
  }

  fn into_outcome(self) -> Outcome {
    match (self.state, self.response) {
      | (State::Satisfied, Some(rep)) => Outcome::Response(rep),
      | (State::Aborted, _) if self.multicast => Outcome::Stopped(self.collected),
      | _ => Outcome::TimedOut,
    }
  }
}

/// How an exchange that got its request out ended
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
  /// The response arrived
  Response(Addrd<Resp>),
  /// No response arrived within the wait budget
  TimedOut,
  /// A multicast wait ended; every response collected along the way
  Stopped(Vec<Addrd<Resp>>),
}

/// The engine would not send the request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendFailed<E>(pub E);

impl<E: fmt::Debug> fmt::Display for SendFailed<E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "sending request failed: {:?}", self.0)
  }
}

/// Send `req` and wait for what answers it.
///
/// Unicast requests wait for [`budget`] of the session's leisure, polling the engine
/// in slices of `config.poll_slice`; the first answer ends the wait. Multicast requests
/// collect answers until `config.multicast_wait` runs out.
///
/// A failing I/O poll is logged and charged a full slice.
pub fn run<E: Engine>(engine: &E,
                      ctx: &mut E::Context,
                      session: &mut E::Session,
                      req: Req,
                      multicast: bool,
                      config: &config::Exchange)
                      -> Result<Outcome, SendFailed<E::Error>> {
  let wait = if multicast {
    config.multicast_wait
  } else {
    Timeout::Millis(budget(engine.default_leisure(session)).0)
  };

  let mut pending = PendingExchange::new(req.id(), req.token(), multicast, wait);

  log::info!("exchange: sending {}", logging::summarize_req(&req));

  match engine.send(session, req) {
    | Ok(id) => pending.sent(id),
    | Err(e) => {
      log::error!("exchange: send failed: {:?}", e);
      pending.send_failed();
      return Err(SendFailed(e));
    },
  }

  match wait {
    | Timeout::Millis(ms) => log::debug!("exchange: waiting up to {}ms", ms),
    | Timeout::Never => log::debug!("exchange: waiting until stopped"),
  }

  loop {
    let elapsed = match engine.process_io(ctx, session, config.poll_slice, &mut |msg: Addrd<Resp>| {
                          pending.offer(msg);
                        }) {
      | Ok(elapsed) => elapsed,
      | Err(e) => {
        log::warn!("exchange: I/O processing failed: {:?}", e);
        config.poll_slice
      },
    };

    log::trace!("exchange: polled for {}ms", elapsed.0);

    if pending.state() == State::Satisfied {
      if let Some(rep) = pending.response() {
        log::info!("exchange: response {} from {}",
                   logging::summarize(rep.data()),
                   rep.addr());
      }
      break;
    }

    if let Charge::Exhausted = pending.charge(elapsed) {
      if multicast {
        log::info!("exchange: multicast wait over");
      } else {
        log::warn!("exchange: timed out");
      }
      break;
    }
  }

  Ok(pending.into_outcome())
}

#[cfg(test)]
mod tests {
  use no_std_net::SocketAddr;
  use tinyvec::array_vec;

  use super::*;
  use crate::resp::code;

  fn addr() -> SocketAddr {
    "192.0.2.1:5683".parse().unwrap()
  }

  fn token() -> Token {
    Token(array_vec!([u8; 8] => 1, 2, 3, 4))
  }

  fn pending(multicast: bool) -> PendingExchange {
    let mut p = PendingExchange::new(Id(0), token(), multicast, Timeout::Millis(6000));
    p.sent(Id(10));
    p
  }

  #[test]
  fn correlates_by_id_for_acks() {
    let mut p = pending(false);
    assert!(!p.offer(Addrd(Resp::ack(Id(11), token(), code::CONTENT), addr())));
    assert_eq!(p.state(), State::Sent);
    assert!(p.offer(Addrd(Resp::ack(Id(10), token(), code::CONTENT), addr())));
    assert_eq!(p.state(), State::Satisfied);
  }

  #[test]
  fn ack_with_wrong_token_is_ignored() {
    let mut p = pending(false);
    assert!(!p.offer(Addrd(Resp::ack(Id(10), Token(Default::default()), code::CONTENT),
                           addr())));
  }

  #[test]
  fn empty_ack_is_not_a_response() {
    let mut p = pending(false);
    let empty = Resp::ack(Id(10), token(), toad_msg::Code { class: 0,
                                                            detail: 0 });
    assert!(!p.offer(Addrd(empty, addr())));
    assert_eq!(p.state(), State::Sent);
  }

  #[test]
  fn separate_response_by_token() {
    let mut p = pending(false);
    let rep = Resp::new(Type::Con, code::CONTENT, Id(999), token());
    assert!(p.offer(Addrd(rep, addr())));
    assert_eq!(p.state(), State::Satisfied);
  }

  #[test]
  fn latch_is_one_shot() {
    let mut p = pending(false);
    let mut first = Resp::ack(Id(10), token(), code::CONTENT);
    first.set_payload("first".bytes());
    let mut dup = first.clone();
    dup.set_payload("dup".bytes());

    assert!(p.offer(Addrd(first, addr())));
    assert!(!p.offer(Addrd(dup, addr())));
    assert_eq!(p.response().unwrap().data().payload(), b"first");
  }

  #[test]
  fn nothing_accepted_before_sent() {
    let mut p = PendingExchange::new(Id(10), token(), false, Timeout::Millis(6000));
    assert!(!p.offer(Addrd(Resp::ack(Id(10), token(), code::CONTENT), addr())));
  }

  #[test]
  fn charge_exhausts_when_meeting_remaining() {
    let mut p = pending(false);
    assert_eq!(p.charge(Milliseconds(5500)), Charge::Remaining(Milliseconds(500)));
    assert_eq!(p.charge(Milliseconds(500)), Charge::Exhausted);
    assert_eq!(p.state(), State::TimedOut);
  }

  #[test]
  fn charge_never() {
    let mut p = PendingExchange::new(Id(10), token(), true, Timeout::Never);
    p.sent(Id(10));
    assert_ne!(p.charge(Milliseconds(u64::MAX)), Charge::Exhausted);
    assert_eq!(p.state(), State::Sent);
  }

  #[test]
  fn multicast_collects() {
    let mut p = pending(true);
    let rep = Resp::new(Type::Non, code::CONTENT, Id(1), token());
    assert!(p.offer(Addrd(rep.clone(), addr())));
    assert!(p.offer(Addrd(rep.clone(), "192.0.2.2:5683".parse().unwrap())));
    assert_eq!(p.state(), State::Sent);
    assert_eq!(p.charge(Milliseconds(6000)), Charge::Exhausted);
    assert_eq!(p.state(), State::Aborted);

    match p.into_outcome() {
      | Outcome::Stopped(reps) => assert_eq!(reps.len(), 2),
      | other => panic!("{:?}", other),
    }
  }
}
