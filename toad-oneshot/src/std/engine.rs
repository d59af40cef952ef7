use ::std::fmt;
use ::std::io::{self, Read, Write};
use ::std::net::{Shutdown, TcpStream, UdpSocket};
use ::std::time::{Duration, SystemTime, UNIX_EPOCH};

use embedded_time::duration::Milliseconds;
use embedded_time::Clock as _;
use openssl::error::ErrorStack;
use openssl::ssl::{SslConnector, SslMethod, SslOptions, SslStream, SslVerifyMode};
use toad_msg::to_bytes::MessageToBytesError;
use toad_msg::{Id, MessageParseError, Token, TryFromBytes, TryIntoBytes, Type};

use super::tcp::{self, Frame};
use super::convert;
use super::Clock;
use crate::engine::{self, Capabilities};
use crate::net::{AddressFamily, Addrd, Destination};
use crate::req::ids::IdGen;
use crate::req::Req;
use crate::resp::Resp;
use crate::retry::{Attempts, RetryTimer, Strategy, YouShould};
use crate::session::{HandshakeFailure, PeerVerification, Proto, Security, SessionError};
use crate::time::{millis_between, Millis};

/// Largest message a UDP session carries (RFC 7252 §4.6)
pub const UDP_MAX_PDU: usize = 1152;

/// Largest message a DTLS session carries; UDP's less the DTLS record overhead
pub const DTLS_MAX_PDU: usize = UDP_MAX_PDU - 29;

/// `DEFAULT_LEISURE` (RFC 7252 §8.2)
pub const DEFAULT_LEISURE: Millis = Milliseconds(5_000);

/// `MAX_RETRANSMIT` (RFC 7252 §4.8)
pub const MAX_RETRANSMIT: u16 = 4;

/// First OpenSSL release whose default provider does ML-KEM
const OPENSSL_WITH_MLKEM: i64 = 0x3050_0000;

const RECV_BUFFER: usize = 2048;

/// Errors encounterable by the std engine
#[derive(Debug)]
pub enum Error {
  /// A socket operation failed
  Io(io::Error),
  /// OpenSSL could not be configured
  Ssl(ErrorStack),
  /// The DTLS handshake failed
  Handshake(String),
  /// Serializing a message to bytes failed
  ToBytes(MessageToBytesError),
  /// Serializing a message from bytes failed
  FromBytes(MessageParseError),
  /// The clock failed to provide timing
  Clock,
}

impl fmt::Display for Error {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      | Error::Io(e) => write!(f, "io: {}", e),
      | Error::Ssl(e) => write!(f, "openssl: {}", e),
      | Error::Handshake(e) => write!(f, "handshake: {}", e),
      | Error::ToBytes(e) => write!(f, "encoding message: {:?}", e),
      | Error::FromBytes(e) => write!(f, "decoding message: {:?}", e),
      | Error::Clock => f.write_str("clock failed"),
    }
  }
}

impl ::std::error::Error for Error {}

/// A connected UDP socket, read & written like a stream so that
/// OpenSSL can run DTLS over it
#[derive(Debug)]
pub struct UdpStream(UdpSocket);

impl Read for UdpStream {
  fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
    self.0.recv(buf)
  }
}

impl Write for UdpStream {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    self.0.send(buf)
  }

  fn flush(&mut self) -> io::Result<()> {
    Ok(())
  }
}

#[derive(Debug)]
enum Transport {
  Udp(UdpSocket),
  Dtls(SslStream<UdpStream>),
  Tcp {
    stream: TcpStream,
    /// Bytes of frames that have not fully arrived
    pending: Vec<u8>,
  },
}

fn invalid_frame(e: tcp::FrameError) -> io::Error {
  io::Error::new(io::ErrorKind::InvalidData, e)
}

impl Transport {
  fn send(&mut self, peer: ::std::net::SocketAddr, bytes: &[u8]) -> io::Result<()> {
    match self {
      | Transport::Udp(sock) => sock.send_to(bytes, peer).map(|_| ()),
      | Transport::Dtls(stream) => stream.write_all(bytes),
      | Transport::Tcp { stream, .. } => stream.write_all(&tcp::encode(bytes).map_err(invalid_frame)?),
    }
  }

  /// Receive one message into `buf`, in its datagram form
  fn recv(&mut self,
          peer: ::std::net::SocketAddr,
          buf: &mut [u8])
          -> io::Result<(usize, ::std::net::SocketAddr)> {
    match self {
      | Transport::Udp(sock) => sock.recv_from(buf),
      | Transport::Dtls(stream) => stream.read(buf).map(|n| (n, peer)),
      | Transport::Tcp { stream, pending } => loop {
        let len = match tcp::frame_len(pending).map_err(invalid_frame)? {
          | Some(len) => len,
          | None => {
            let n = stream.read(buf)?;
            if n == 0 {
              return Err(io::ErrorKind::UnexpectedEof.into());
            }
            pending.extend_from_slice(&buf[..n]);
            continue;
          },
        };

        let bytes = pending.drain(..len).collect::<Vec<u8>>();
        let frame = Frame::parse(&bytes).map_err(invalid_frame)?;

        if frame.is_signal() {
          if frame.code == tcp::PING {
            log::trace!("std engine: ping from {}", peer);
            stream.write_all(&tcp::signal(tcp::PONG, frame.token))?;
          } else {
            log::debug!("std engine: ignoring signal {:#04x} from {}", frame.code, peer);
          }
          continue;
        }

        let dgram = frame.to_datagram();
        if dgram.len() > buf.len() {
          return Err(io::Error::new(io::ErrorKind::InvalidData,
                                    format!("{} byte message does not fit in {} byte buffer",
                                            dgram.len(),
                                            buf.len())));
        }

        buf[..dgram.len()].copy_from_slice(&dgram);
        return Ok((dgram.len(), peer));
      },
    }
  }

  fn set_read_timeout(&self, dur: Duration) -> io::Result<()> {
    match self {
      | Transport::Udp(sock) => sock.set_read_timeout(Some(dur)),
      | Transport::Dtls(stream) => stream.get_ref().0.set_read_timeout(Some(dur)),
      | Transport::Tcp { stream, .. } => stream.set_read_timeout(Some(dur)),
    }
  }
}

#[derive(Debug)]
struct Outstanding {
  id: Id,
  bytes: Vec<u8>,
  retry: RetryTimer<Clock>,
}

/// Receive buffer shared by the sessions of an [`Engine`]
#[derive(Debug)]
pub struct Context {
  buf: Vec<u8>,
}

/// A UDP, TCP or DTLS session with one destination
#[derive(Debug)]
pub struct Session {
  proto: Proto,
  dst: Destination,
  multicast: bool,
  transport: Transport,
  ids: IdGen,
  clock: Clock,
  outstanding: Option<Outstanding>,
}

impl Session {
  fn now(&self) -> Result<embedded_time::Instant<Clock>, Error> {
    self.clock.try_now().map_err(|_| Error::Clock)
  }

  fn peer(&self) -> ::std::net::SocketAddr {
    convert::addr_to_std(self.dst.addr())
  }

  fn transmit(&mut self, bytes: &[u8]) -> Result<(), Error> {
    let peer = self.peer();
    self.transport.send(peer, bytes).map_err(Error::Io)
  }

  /// Retransmit the outstanding confirmable request if it's due
  fn retransmit(&mut self) -> Result<(), Error> {
    let now = self.now()?;
    let peer = self.peer();

    let out = match self.outstanding.as_mut() {
      | Some(out) => out,
      | None => return Ok(()),
    };

    match out.retry.what_should_i_do(now) {
      | Ok(YouShould::Retry) => {
        log::debug!("std engine: retransmitting {:?} (attempt {})",
                    out.id,
                    out.retry.attempts().0);
        out.retry.failed(now);
        self.transport.send(peer, &out.bytes).map_err(Error::Io)
      },
      | Ok(YouShould::Cry) => {
        log::warn!("std engine: {:?} was never acknowledged", out.id);
        self.outstanding = None;
        Ok(())
      },
      | Err(nb::Error::WouldBlock) => Ok(()),
      | Err(nb::Error::Other(never)) => match never {},
    }
  }

  /// Stop retransmitting if `msg` acknowledges the outstanding request,
  /// and yield the empty ACK that `msg` asks for, if any
  fn accept(&mut self, msg: &toad_msg::alloc::Message) -> Result<Option<Vec<u8>>, Error> {
    match msg.ty {
      | Type::Ack | Type::Reset => {
        if self.outstanding.as_ref().map(|out| out.id) == Some(msg.id) {
          log::trace!("std engine: {:?} acknowledged", msg.id);
          self.outstanding = None;
        }
        Ok(None)
      },
      | Type::Con => msg.ack(msg.id)
                        .try_into_bytes::<Vec<u8>>()
                        .map(Some)
                        .map_err(Error::ToBytes),
      | Type::Non => Ok(None),
    }
  }
}

/// The protocol engine for platforms supporting Rust's standard library.
///
/// Speaks CoAP over UDP, over TCP (RFC 8323 framing, see [`super::tcp`]),
/// and over DTLS via `openssl`.
/// Confirmable requests on datagram sessions are retransmitted with exponential backoff,
/// its initial delay randomized per request, until acknowledged or `MAX_RETRANSMIT` is reached.
///
/// Unicast sessions only accept messages from their destination.
#[derive(Debug, Clone, Copy)]
pub struct Engine {
  caps: Capabilities,
  token_seed: u16,
  handshake_timeout: Millis,
  con_retry: Strategy,
}

impl Default for Engine {
  fn default() -> Self {
    Self::new()
  }
}

impl Engine {
  /// Create an engine, probing the linked OpenSSL for post-quantum support
  pub fn new() -> Self {
    let post_quantum = openssl::version::number() >= OPENSSL_WITH_MLKEM;
    log::debug!("std engine: {} (post-quantum: {})",
                openssl::version::version(),
                post_quantum);

    Self { caps: Capabilities { udp: true,
                                tcp: true,
                                dtls: true,
                                post_quantum },
           token_seed: 0,
           handshake_timeout: Milliseconds(10_000),
           con_retry: Strategy::Exponential { init_min: Milliseconds(2_000),
                                              init_max: Milliseconds(3_000) } }
  }

  /// Mix `seed` into every token; see [`crate::config::Msg`]
  pub fn token_seed(mut self, seed: u16) -> Self {
    self.token_seed = seed;
    self
  }

  /// Longest a DTLS handshake or TCP connect may take.
  ///
  /// Defaults to 10 seconds.
  pub fn handshake_timeout(mut self, timeout: Millis) -> Self {
    self.handshake_timeout = timeout;
    self
  }
}

fn handshake(sock: UdpSocket,
             dst: &Destination,
             security: Security,
             timeout: Millis)
             -> Result<SslStream<UdpStream>, SessionError<Error>> {
  let ssl = |e: ErrorStack| SessionError::HandshakeFailed(HandshakeFailure::Engine(Error::Ssl(e)));

  let mut builder = SslConnector::builder(SslMethod::dtls()).map_err(ssl)?;
  builder.set_options(SslOptions::NO_QUERY_MTU);
  builder.set_verify(match security.verification {
                       | PeerVerification::Required => SslVerifyMode::PEER,
                       | PeerVerification::Disabled => SslVerifyMode::NONE,
                     });

  if let Some(group) = security.key_exchange.group_name() {
    builder.set_groups_list(group).map_err(|e| {
                                    log::error!("std engine: openssl refused group {}: {}", group, e);
                                    SessionError::HandshakeFailed(HandshakeFailure::KeyExchangeUnsupported(security.key_exchange))
                                  })?;
    log::debug!("std engine: key exchange group {}", group);
  }

  let mut config = builder.build().configure().map_err(ssl)?;
  if security.verification == PeerVerification::Disabled {
    config.set_verify_hostname(false);
  }

  sock.set_read_timeout(Some(Duration::from_millis(timeout.0.max(1))))
      .map_err(|e| SessionError::DestinationUnreachable(Error::Io(e)))?;

  config.connect(&dst.ip().to_string(), UdpStream(sock))
        .map_err(|e| SessionError::HandshakeFailed(HandshakeFailure::Engine(Error::Handshake(e.to_string()))))
}

impl engine::Engine for Engine {
  type Error = Error;
  type Context = Context;
  type Session = Session;

  fn capabilities(&self) -> Capabilities {
    self.caps
  }

  fn new_context(&self) -> Result<Context, Error> {
    Ok(Context { buf: vec![0; RECV_BUFFER] })
  }

  fn new_session(&self,
                 _: &mut Context,
                 proto: Proto,
                 dst: Destination,
                 security: Option<&Security>)
                 -> Result<Session, SessionError<Error>> {
    let unreachable = |e: io::Error| SessionError::DestinationUnreachable(Error::Io(e));

    let local = match dst.family() {
      | AddressFamily::Inet => "0.0.0.0:0",
      | AddressFamily::Inet6 => "[::]:0",
    };
    let peer = convert::addr_to_std(dst.addr());

    let transport = match proto {
      | Proto::Udp => Transport::Udp(UdpSocket::bind(local).map_err(unreachable)?),
      | Proto::Dtls => {
        let sock = UdpSocket::bind(local).map_err(unreachable)?;
        sock.connect(peer).map_err(unreachable)?;
        let security = security.copied().unwrap_or_default();
        Transport::Dtls(handshake(sock, &dst, security, self.handshake_timeout)?)
      },
      | Proto::Tcp => {
        let timeout = Duration::from_millis(self.handshake_timeout.0.max(1));
        let mut stream = TcpStream::connect_timeout(&peer, timeout).map_err(unreachable)?;
        stream.set_nodelay(true).map_err(unreachable)?;

        // we have nothing to announce; an empty CSM opens the connection
        stream.write_all(&tcp::signal(tcp::CSM, &[]))
              .map_err(unreachable)?;
        log::debug!("std engine: connected to {}", peer);

        Transport::Tcp { stream,
                         pending: Vec::new() }
      },
    };

    let entropy = SystemTime::now().duration_since(UNIX_EPOCH)
                                   .map(|d| d.as_nanos() as u64)
                                   .unwrap_or_default();

    Ok(Session { proto,
                 dst,
                 multicast: dst.is_multicast(),
                 transport,
                 ids: IdGen::new(self.token_seed, entropy),
                 clock: Clock::new(),
                 outstanding: None })
  }

  fn max_pdu_size(&self, session: &Session) -> usize {
    match session.proto {
      | Proto::Dtls => DTLS_MAX_PDU,
      | _ => UDP_MAX_PDU,
    }
  }

  fn default_leisure(&self, _: &Session) -> Millis {
    DEFAULT_LEISURE
  }

  fn new_message_id(&self, session: &mut Session) -> Id {
    session.ids.next_id()
  }

  fn new_token(&self, session: &mut Session) -> Token {
    session.ids.next_token()
  }

  fn send(&self, session: &mut Session, req: Req) -> Result<Id, Error> {
    let id = req.id();
    let confirmable = req.ty() == Type::Con;
    let bytes = toad_msg::alloc::Message::from(req).try_into_bytes::<Vec<u8>>()
                                                   .map_err(Error::ToBytes)?;

    session.transmit(&bytes)?;

    if confirmable && session.proto != Proto::Tcp {
      let seed = session.ids.next_u64();
      let retry = RetryTimer::with_seed(session.now()?,
                                        self.con_retry,
                                        Attempts(MAX_RETRANSMIT + 1),
                                        seed);
      log::trace!("std engine: {:?} times out after {}ms",
                  id,
                  retry.initial_delay().0);
      session.outstanding = Some(Outstanding { id, bytes, retry });
    }

    Ok(id)
  }

  fn process_io(&self,
                ctx: &mut Context,
                session: &mut Session,
                slice: Millis,
                on_message: &mut dyn FnMut(Addrd<Resp>))
                -> Result<Millis, Error> {
    let start = session.now()?;
    session.retransmit()?;

    session.transport
           .set_read_timeout(Duration::from_millis(slice.0.max(1)))
           .map_err(Error::Io)?;

    let peer = session.peer();
    let received = session.transport.recv(peer, &mut ctx.buf);
    let elapsed = millis_between(start, session.now()?);

    let (n, from) = match received {
      | Ok(got) => got,
      | Err(e) if convert::is_would_block(&e) => return Ok(elapsed),
      | Err(e) => return Err(Error::Io(e)),
    };

    if !session.multicast && (from.ip(), from.port()) != (peer.ip(), peer.port()) {
      log::debug!("std engine: dropping {} byte datagram from {}; session is with {}",
                  n,
                  from,
                  peer);
      return Ok(elapsed);
    }

    let msg = match toad_msg::alloc::Message::try_from_bytes(&ctx.buf[..n]) {
      | Ok(msg) => msg,
      | Err(e) => {
        log::warn!("std engine: dropping {} byte datagram from {}: {:?}",
                   n,
                   from,
                   Error::FromBytes(e));
        return Ok(elapsed);
      },
    };

    let ack = session.accept(&msg);
    on_message(Addrd(Resp::from(msg), convert::addr_from_std(from)));

    if let Some(ack) = ack? {
      log::trace!("std engine: acknowledging response from {}", from);
      session.transport.send(from, &ack).map_err(|e| {
                                          log::warn!("std engine: acknowledging response from {} failed: {}", from, e);
                                          Error::Io(e)
                                        })?;
    }

    Ok(elapsed)
  }

  fn release_session(&self, session: Session) {
    match session.transport {
      | Transport::Dtls(mut stream) => {
        if let Err(e) = stream.shutdown() {
          log::debug!("std engine: DTLS shutdown: {}", e);
        }
      },
      | Transport::Tcp { stream, .. } => {
        if let Err(e) = stream.shutdown(Shutdown::Both) {
          log::debug!("std engine: TCP shutdown: {}", e);
        }
      },
      | Transport::Udp(_) => (),
    }
  }

  fn free_context(&self, ctx: Context) {
    drop(ctx);
  }
}
