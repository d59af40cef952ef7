use core::fmt;

use crate::config;
use crate::engine::Engine;
use crate::link::{self, Link, LinkEvent, LinkFailure, LinkState};
use crate::req::{BuildError, OptionSet, Req, Unattached};
use crate::retry::Attempts;
use crate::time::{Clock, Sleep};

/// What [`ResourceGuard::finish`] released
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Released {
  /// Options that were never attached to a request
  pub options: bool,
  /// The session
  pub session: bool,
  /// The context
  pub context: bool,
  /// The link was torn down
  pub link: bool,
}

/// The context & session held by a [`ResourceGuard`]
pub struct Active<'g, E: Engine> {
  /// The context
  pub ctx: &'g mut E::Context,
  /// The session
  pub session: &'g mut E::Session,
  options: &'g mut Option<OptionSet>,
}

impl<'g, E: Engine> Active<'g, E> {
  /// Hand options to the guard until they're attached
  pub fn hold_options(&mut self, options: OptionSet) {
    *self.options = Some(options);
  }

  /// Move the held options into `req`.
  ///
  /// If they don't fit the guard keeps them and releases them later.
  pub fn attach_options(&mut self, req: &mut Req) -> Result<(), BuildError> {
    attach(&mut *self.options, req)
  }
}

impl<'g, E: Engine> fmt::Debug for Active<'g, E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Active")
     .field("options", &self.options.is_some())
     .finish()
  }
}

fn attach(held: &mut Option<OptionSet>, req: &mut Req) -> Result<(), BuildError> {
  let options = match held.take() {
    | Some(options) => options,
    | None => return Ok(()),
  };

  req.attach(options)
     .map_err(|Unattached { error, options }| {
       *held = Some(options);
       error
     })
}

/// Owns everything a run allocates, and gives it all back.
///
/// Resources are handed to the guard as soon as they exist. [`ResourceGuard::finish`]
/// (or dropping the guard) releases, in order:
/// 1. options that were never attached to a request
/// 2. the session
/// 3. the context
/// 4. the link, if bring-up was ever attempted
///
/// Each is released at most once, and only if it was allocated.
pub struct ResourceGuard<'a, E: Engine, L: Link> {
  engine: &'a E,
  link: &'a mut L,
  link_state: LinkState,
  options: Option<OptionSet>,
  session: Option<E::Session>,
  context: Option<E::Context>,
}

impl<'a, E: Engine, L: Link> ResourceGuard<'a, E, L> {
  /// Create a guard holding nothing
  pub fn new(engine: &'a E, link: &'a mut L) -> Self {
    Self { engine,
           link,
           link_state: LinkState::Disconnected,
           options: None,
           session: None,
           context: None }
  }

  /// The engine resources are released to
  pub fn engine(&self) -> &'a E {
    self.engine
  }

  /// State of the link
  pub fn link_state(&self) -> LinkState {
    self.link_state
  }

  /// Bring the link up; see [`link::bring_up`]
  pub fn bring_up_link<C: Clock, S: Sleep>(&mut self,
                                           clock: &C,
                                           sleep: &S,
                                           config: &config::Link)
                                           -> Result<Attempts, LinkFailure> {
    link::bring_up(self.link, &mut self.link_state, clock, sleep, config)
  }

  /// Take ownership of `ctx`, then open a session in it and take ownership of that too.
  ///
  /// If `open` fails the context is still held (and released later).
  pub fn open<X>(&mut self,
                 ctx: E::Context,
                 open: impl FnOnce(&mut E::Context) -> Result<E::Session, X>)
                 -> Result<Active<'_, E>, X> {
    let ctx = self.context.insert(ctx);
    let session = open(&mut *ctx)?;
    let session = self.session.insert(session);

    Ok(Active { ctx,
                session,
                options: &mut self.options })
  }

  /// Take ownership of options until they're attached
  pub fn hold_options(&mut self, options: OptionSet) {
    self.options = Some(options);
  }

  /// Move the held options into `req`; see [`Active::attach_options`]
  pub fn attach_options(&mut self, req: &mut Req) -> Result<(), BuildError> {
    attach(&mut self.options, req)
  }

  /// Release everything held
  pub fn finish(mut self) -> Released {
    self.release()
  }

  fn release(&mut self) -> Released {
    let mut released = Released::default();

    if let Some(options) = self.options.take() {
      log::debug!("guard: releasing {} unattached option(s)", options.len());
      self.engine.release_options(options);
      released.options = true;
    }

    if let Some(session) = self.session.take() {
      log::debug!("guard: releasing session");
      self.engine.release_session(session);
      released.session = true;
    }

    if let Some(ctx) = self.context.take() {
      log::debug!("guard: freeing context");
      self.engine.free_context(ctx);
      released.context = true;
    }

    if self.link_state.needs_teardown() {
      log::debug!("guard: tearing down link ({:?})", self.link_state);
      if let Err(e) = self.link.teardown() {
        log::warn!("guard: link teardown failed: {:?}", e);
      }
      self.link_state = self.link_state.next(LinkEvent::TornDown);
      released.link = true;
    }

    released
  }
}

impl<'a, E: Engine, L: Link> Drop for ResourceGuard<'a, E, L> {
  fn drop(&mut self) {
    self.release();
  }
}

impl<'a, E: Engine, L: Link> fmt::Debug for ResourceGuard<'a, E, L> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ResourceGuard")
     .field("link_state", &self.link_state)
     .field("options", &self.options.is_some())
     .field("session", &self.session.is_some())
     .field("context", &self.context.is_some())
     .finish()
  }
}

#[cfg(test)]
mod tests {
  use toad_msg::{Id, Token, Type};

  use super::*;
  use crate::req::Method;
  use crate::test::{ClockMock, EngineMock, Events, LinkMock, SleepMock};
  use crate::{net, uri};

  fn options() -> OptionSet {
    OptionSet::from_target(&uri::parse("coap://192.0.2.1/hello").unwrap()).unwrap()
  }

  fn session(engine: &EngineMock) -> crate::test::Session {
    let mut ctx = engine.new_context().unwrap();
    let s = engine.new_session(&mut ctx,
                               crate::session::Proto::Udp,
                               net::resolve("192.0.2.1", 5683).unwrap(),
                               None)
                  .unwrap();
    engine.free_context(ctx);
    s
  }

  #[test]
  fn releases_in_order() {
    let events = Events::default();
    let engine = EngineMock::new().log_to(events.clone());
    let mut link = LinkMock::new().log_to(events.clone());
    let clock = ClockMock::new();
    let sleep = SleepMock::new(clock.clone());

    let s = session(&engine);
    events.borrow_mut().clear();

    let mut guard = ResourceGuard::new(&engine, &mut link);
    guard.bring_up_link(&clock, &sleep, &Default::default()).unwrap();
    let ctx = engine.new_context().unwrap();
    guard.open(ctx, |_| Ok::<_, ()>(s)).unwrap();
    guard.hold_options(options());

    assert_eq!(guard.finish(),
               Released { options: true,
                          session: true,
                          context: true,
                          link: true });
    assert_eq!(*events.borrow(),
               vec!["release_options", "release_session", "free_context", "teardown"]);
  }

  #[test]
  fn releases_only_what_was_allocated() {
    let engine = EngineMock::new();
    let mut link = LinkMock::new();

    let guard = ResourceGuard::new(&engine, &mut link);
    assert_eq!(guard.finish(), Released::default());
    assert_eq!(link.teardowns, 0);
    assert_eq!(engine.state().contexts_freed, 0);
  }

  #[test]
  fn link_torn_down_even_without_session() {
    let engine = EngineMock::new();
    let mut link = LinkMock::new();
    let clock = ClockMock::new();
    let sleep = SleepMock::new(clock.clone());

    let mut guard = ResourceGuard::new(&engine, &mut link);
    guard.bring_up_link(&clock, &sleep, &Default::default()).unwrap();
    assert_eq!(guard.link_state(), LinkState::Connected);
    drop(guard);

    assert_eq!(link.teardowns, 1);
  }

  #[test]
  fn attached_options_are_not_released() {
    let engine = EngineMock::new();
    let mut link = LinkMock::new();
    let mut req = Req::new(Type::Con, Method::GET, Id(1), Token(Default::default()), 1152);

    let mut guard = ResourceGuard::new(&engine, &mut link);
    guard.hold_options(options());
    guard.attach_options(&mut req).unwrap();

    assert!(!guard.finish().options);
    assert_eq!(engine.state().options_released, 0);
    assert_eq!(req.options(), &options());
  }

  #[test]
  fn unattached_options_are_released_once() {
    let engine = EngineMock::new();
    let mut link = LinkMock::new();
    let mut req = Req::new(Type::Con, Method::GET, Id(1), Token(Default::default()), 4);

    let mut guard = ResourceGuard::new(&engine, &mut link);
    guard.hold_options(options());
    assert!(guard.attach_options(&mut req).is_err());

    assert!(guard.finish().options);
    assert_eq!(engine.state().options_released, 1);
    assert!(req.options().is_empty());
  }

  #[test]
  fn context_held_when_session_fails() {
    let engine = EngineMock::new();
    let mut link = LinkMock::new();

    let mut guard = ResourceGuard::new(&engine, &mut link);
    let ctx = engine.new_context().unwrap();
    assert!(guard.open(ctx, |_| Err("unreachable")).is_err());

    assert_eq!(guard.finish(),
               Released { context: true,
                          ..Default::default() });
    assert_eq!(engine.state().contexts_freed, 1);
    assert_eq!(engine.state().sessions_released, 0);
  }

  #[test]
  fn active_options_attach() {
    let engine = EngineMock::new();
    let mut link = LinkMock::new();
    let s = session(&engine);
    let mut req = Req::new(Type::Con, Method::GET, Id(1), Token(Default::default()), 4);

    let mut guard = ResourceGuard::new(&engine, &mut link);
    let ctx = engine.new_context().unwrap();
    let mut active = guard.open(ctx, |_| Ok::<_, ()>(s)).unwrap();
    active.hold_options(options());
    assert!(active.attach_options(&mut req).is_err());

    assert!(guard.finish().options);
  }

  #[test]
  fn drop_releases_exactly_once() {
    let engine = EngineMock::new();
    let mut link = LinkMock::new();
    let s = session(&engine);

    {
      let mut guard = ResourceGuard::new(&engine, &mut link);
      let ctx = engine.new_context().unwrap();
      guard.open(ctx, |_| Ok::<_, ()>(s)).unwrap();
      // finish consumes the guard; its drop must not release again
      guard.finish();
    }

    assert_eq!(engine.state().sessions_released, 1);
    assert_eq!(engine.state().contexts_freed, 2);
    assert_eq!(engine.state().contexts_created, 2);
  }
}
