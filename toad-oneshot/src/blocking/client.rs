use core::fmt;

use crate::config::Config;
use crate::engine::Engine;
use crate::exchange::{self, Outcome, SendFailed};
use crate::guard::ResourceGuard;
use crate::link::{Link, LinkFailure};
use crate::net::{self, AddressError};
use crate::req::{kind_for, BuildError, Built, Method, ReqBuilder};
use crate::resp::Resp;
use crate::session::{self, SessionError};
use crate::time::{Clock, Sleep};
use crate::uri::{self, ParseError};

/// The stage of a run that an error occurred in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
  /// Parsing the target URI
  Uri,
  /// Bringing the network link up
  Link,
  /// Resolving the target host
  Address,
  /// Creating the engine context
  Context,
  /// Opening the session
  Session,
  /// Building the request
  Build,
  /// Sending the request
  Send,
}

impl Stage {
  /// Construct a specific error from the stage the error occurred in
  pub fn what<E>(self, what: What<E>) -> Error<E> {
    Error { when: self, what }
  }
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      | Stage::Uri => "parsing uri",
      | Stage::Link => "bringing link up",
      | Stage::Address => "resolving address",
      | Stage::Context => "creating context",
      | Stage::Session => "establishing session",
      | Stage::Build => "building request",
      | Stage::Send => "sending request",
    };

    f.write_str(s)
  }
}

/// A contextless error; `E` is the engine's error type
#[derive(Debug, Clone, PartialEq)]
pub enum What<E> {
  /// The target URI was malformed
  Uri(ParseError),
  /// The link could not be brought up
  Link(LinkFailure),
  /// The target host could not be resolved
  Address(AddressError),
  /// The engine could not create a context
  Context(E),
  /// The session could not be opened
  Session(SessionError<E>),
  /// The request could not be built
  Build(BuildError),
  /// The request could not be sent
  Send(SendFailed<E>),
}

impl<E: fmt::Debug> fmt::Display for What<E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      | What::Uri(e) => write!(f, "{}", e),
      | What::Link(e) => write!(f, "{}", e),
      | What::Address(e) => write!(f, "{}", e),
      | What::Context(e) => write!(f, "{:?}", e),
      | What::Session(e) => write!(f, "{}", e),
      | What::Build(e) => write!(f, "{}", e),
      | What::Send(e) => write!(f, "{}", e),
    }
  }
}

/// A run failed
#[derive(Debug, Clone, PartialEq)]
pub struct Error<E> {
  /// What happened?
  pub what: What<E>,
  /// What were we doing when it happened?
  pub when: Stage,
}

impl<E: fmt::Debug> fmt::Display for Error<E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}: {}", self.when, self.what)
  }
}

#[cfg(feature = "std")]
impl<E: fmt::Debug> ::std::error::Error for Error<E> {}

/// Helper methods on Client Results
pub trait ClientResultExt<E> {
  /// If we timed out waiting for a response, consider that Ok(None).
  ///
  /// A multicast run yields the first response it collected, if any.
  fn timeout_ok(self) -> Result<Option<Resp>, Error<E>>;
}

impl<E> ClientResultExt<E> for Result<Outcome, Error<E>> {
  fn timeout_ok(self) -> Result<Option<Resp>, Error<E>> {
    self.map(|outcome| match outcome {
          | Outcome::Response(rep) => Some(rep.unwrap()),
          | Outcome::TimedOut => None,
          | Outcome::Stopped(reps) => reps.into_iter().next().map(|rep| rep.unwrap()),
        })
  }
}

/// Everything a [`Client`] needs that isn't configuration.
///
/// This is used for bring-your-own platform use cases, like embedded.
#[derive(Clone, Debug)]
pub struct ClientParts<E, L, C, S> {
  /// The CoAP protocol engine
  pub engine: E,
  /// The network interface
  pub link: L,
  /// The clock that link retries are timed with.
  ///
  /// For `std` platforms, this is [`crate::std::Clock`].
  pub clock: C,
  /// How to wait between link attempts.
  ///
  /// For `std` platforms, this is [`crate::std::Sleeper`].
  pub sleep: S,
}

/// A blocking client that drives exactly one request per [`Client::run`]
#[derive(Debug)]
pub struct Client<E, L, C, S> {
  engine: E,
  link: L,
  clock: C,
  sleep: S,
  config: Config,
}

#[cfg(feature = "std")]
impl Client<crate::std::Engine, crate::std::AlwaysUp, crate::std::Clock, crate::std::Sleeper> {
  /// Create a new Client for a platform supporting Rust's standard library.
  ///
  /// ```no_run
  /// use toad_oneshot::blocking::{Client, ClientResultExt};
  ///
  /// let mut client = Client::new_std();
  /// let rep = client.get("coap://192.0.2.1/hello").timeout_ok().unwrap();
  ///
  /// if let Some(rep) = rep {
  ///   println!("Hello, {}!", rep.payload_string().unwrap());
  /// }
  /// ```
  pub fn new_std() -> Self {
    Self::new_std_config(Config::default())
  }

  /// Create a new std client with a specific runtime config
  pub fn new_std_config(config: Config) -> Self {
    Self::new_config(config,
                     ClientParts { engine: crate::std::Engine::new().token_seed(config.msg.token_seed),
                                   link: crate::std::AlwaysUp,
                                   clock: crate::std::Clock::new(),
                                   sleep: crate::std::Sleeper })
  }
}

impl<E, L, C, S> Client<E, L, C, S>
  where E: Engine,
        L: Link,
        C: Clock,
        S: Sleep
{
  /// Create a new client
  pub fn new(parts: ClientParts<E, L, C, S>) -> Self {
    Self::new_config(Config::default(), parts)
  }

  /// Create a new client with a specific runtime config
  pub fn new_config(config: Config,
                    ClientParts { engine,
                                  link,
                                  clock,
                                  sleep, }: ClientParts<E, L, C, S>)
                    -> Self {
    Self { engine,
           link,
           clock,
           sleep,
           config }
  }

  /// The protocol engine
  pub fn engine(&self) -> &E {
    &self.engine
  }

  /// The network interface
  pub fn link(&self) -> &L {
    &self.link
  }

  /// Runtime config
  pub fn config(&self) -> &Config {
    &self.config
  }

  /// Send a GET request to `uri`; see [`Client::run`]
  pub fn get(&mut self, uri: impl AsRef<str>) -> Result<Outcome, Error<E::Error>> {
    self.run(Method::GET, uri)
  }

  /// Send one `method` request to `uri` and wait for the response.
  ///
  /// Everything the run allocates (the link, the engine context & session,
  /// options) is released before this returns, however it ends.
  ///
  /// Not getting a response is not an error; see [`Outcome::TimedOut`]
  /// and [`ClientResultExt::timeout_ok`].
  pub fn run(&mut self, method: Method, uri: impl AsRef<str>) -> Result<Outcome, Error<E::Error>> {
    let Self { engine,
               link,
               clock,
               sleep,
               config, } = self;

    let mut guard = ResourceGuard::new(&*engine, link);
    let result = drive(&mut guard, &*clock, &*sleep, config, method, uri.as_ref());

    match &result {
      | Ok(Outcome::Response(_)) => log::info!("client: done"),
      | Ok(Outcome::TimedOut) => log::warn!("client: no response"),
      | Ok(Outcome::Stopped(reps)) => log::info!("client: done, {} response(s)", reps.len()),
      | Err(e) => log::error!("client: {}", e),
    }

    let released = guard.finish();
    log::debug!("client: released {:?}", released);

    result
  }
}

fn drive<E, L, C, S>(guard: &mut ResourceGuard<'_, E, L>,
                     clock: &C,
                     sleep: &S,
                     config: &Config,
                     method: Method,
                     uri: &str)
                     -> Result<Outcome, Error<E::Error>>
  where E: Engine,
        L: Link,
        C: Clock,
        S: Sleep
{
  let fail = |when: Stage, what: What<E::Error>| when.what(what);

  let target = uri::parse(uri).map_err(|e| fail(Stage::Uri, What::Uri(e)))?;
  log::info!("client: {} {}", method, target);

  let engine = guard.engine();
  engine.capabilities().log();

  let attempt = guard.bring_up_link(clock, sleep, &config.link)
                     .map_err(|e| fail(Stage::Link, What::Link(e)))?;
  log::info!("client: link up on attempt {}", attempt.0);

  if config.link.settle.0 > 0 {
    log::debug!("client: settling for {}ms", config.link.settle.0);
    sleep.sleep(config.link.settle);
  }

  let dst = net::resolve(target.host(), target.port_or_default())
              .map_err(|e| fail(Stage::Address, What::Address(e)))?;
  log::info!("client: destination {} ({:?})", dst, dst.family());

  let ctx = engine.new_context()
                  .map_err(|e| fail(Stage::Context, What::Context(e)))?;

  let mut active = guard.open(ctx, |ctx| {
                          session::establish(engine, ctx, target.scheme(), dst, &config.security)
                        })
                        .map_err(|e| fail(Stage::Session, What::Session(e)))?;

  let max_size = engine.max_pdu_size(&*active.session);
  let id = engine.new_message_id(&mut *active.session);
  let token = engine.new_token(&mut *active.session);

  let build = |e: BuildError| fail(Stage::Build, What::Build(e));
  let Built { mut req, options } = ReqBuilder::new(method, kind_for(&dst), max_size)
                                     .build(id, token, &target)
                                     .map_err(build)?;
  active.hold_options(options);
  active.attach_options(&mut req).map_err(build)?;

  exchange::run(engine,
                &mut *active.ctx,
                &mut *active.session,
                req,
                dst.is_multicast(),
                &config.exchange).map_err(|e| fail(Stage::Send, What::Send(e)))
}
