//! CoAP over reliable byte streams (RFC 8323 §3.2).
//!
//! A frame is `[len|tkl][extended len: 0, 1, 2 or 4][code][token][options & payload]`.
//! There is no message type and no message id; requests are matched to responses by token.
//!
//! Messages are built & parsed in their datagram form by `toad-msg`;
//! [`encode`] and [`Frame::to_datagram`] translate between the two.
use core::fmt;

/// Frames announcing more than this many bytes of options & payload are refused
pub const MAX_BODY: usize = 64 * 1024;

/// `7.01 CSM` signal
pub const CSM: u8 = 0xE1;

/// `7.02 Ping` signal
pub const PING: u8 = 0xE2;

/// `7.03 Pong` signal
pub const PONG: u8 = 0xE3;

const SIGNAL_CLASS: u8 = 7;

/// Version 1, type non-confirmable
const DATAGRAM_NON: u8 = 0b0101_0000;

/// Errors encounterable framing or unframing a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
  /// The message ended before its header & token did
  Truncated,
  /// The token length nibble was more than 8
  TokenLength(u8),
  /// The frame announced `.0` bytes of options & payload, more than [`MAX_BODY`]
  TooLarge(usize),
}

impl fmt::Display for FrameError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      | FrameError::Truncated => f.write_str("message truncated"),
      | FrameError::TokenLength(n) => write!(f, "token length {} is more than 8", n),
      | FrameError::TooLarge(n) => write!(f, "frame body of {} bytes exceeds {}", n, MAX_BODY),
    }
  }
}

impl ::std::error::Error for FrameError {}

fn token_length(byte: u8) -> Result<usize, FrameError> {
  match byte & 0x0F {
    | n @ 0..=8 => Ok(n as usize),
    | n => Err(FrameError::TokenLength(n)),
  }
}

fn push_header(frame: &mut Vec<u8>, tkl: usize, len: usize) -> Result<(), FrameError> {
  let tkl = tkl as u8;
  match len {
    | 0..=12 => frame.push((len as u8) << 4 | tkl),
    | 13..=268 => {
      frame.push(13 << 4 | tkl);
      frame.push((len - 13) as u8);
    },
    | 269..=65_804 => {
      frame.push(14 << 4 | tkl);
      frame.extend_from_slice(&((len - 269) as u16).to_be_bytes());
    },
    | _ => {
      let ext = u32::try_from(len - 65_805).map_err(|_| FrameError::TooLarge(len))?;
      frame.push(15 << 4 | tkl);
      frame.extend_from_slice(&ext.to_be_bytes());
    },
  }

  Ok(())
}

/// Frame a message serialized in its datagram form
pub fn encode(datagram: &[u8]) -> Result<Vec<u8>, FrameError> {
  let first = *datagram.first().ok_or(FrameError::Truncated)?;
  let tkl = token_length(first)?;
  let token_end = 4 + tkl;
  if datagram.len() < token_end {
    return Err(FrameError::Truncated);
  }

  let code = datagram[1];
  let token = &datagram[4..token_end];
  let body = &datagram[token_end..];

  let mut frame = Vec::with_capacity(6 + tkl + body.len());
  push_header(&mut frame, tkl, body.len())?;
  frame.push(code);
  frame.extend_from_slice(token);
  frame.extend_from_slice(body);

  Ok(frame)
}

/// A frame with no options or payload, e.g. an empty [`CSM`] or a [`PONG`]
pub fn signal(code: u8, token: &[u8]) -> Vec<u8> {
  let mut frame = Vec::with_capacity(2 + token.len());
  frame.push(token.len() as u8 & 0x0F);
  frame.push(code);
  frame.extend_from_slice(token);
  frame
}

/// The length of the frame at the start of `buf`,
/// or `None` if not all of it has arrived yet
pub fn frame_len(buf: &[u8]) -> Result<Option<usize>, FrameError> {
  let first = match buf.first() {
    | Some(b) => *b,
    | None => return Ok(None),
  };

  let tkl = token_length(first)?;
  let (ext, base) = match first >> 4 {
    | 13 => (1, 13),
    | 14 => (2, 269),
    | 15 => (4, 65_805),
    | n => (0, n as usize),
  };

  if buf.len() < 1 + ext {
    return Ok(None);
  }

  let body = base
             + buf[1..1 + ext].iter()
                              .fold(0usize, |len, b| len << 8 | *b as usize);
  if body > MAX_BODY {
    return Err(FrameError::TooLarge(body));
  }

  let len = 1 + ext + 1 + tkl + body;
  Ok(Some(len).filter(|len| buf.len() >= *len))
}

/// One complete frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
  /// Message code
  pub code: u8,
  /// Token
  pub token: &'a [u8],
  /// Options & payload
  pub body: &'a [u8],
}

impl<'a> Frame<'a> {
  /// Split a complete frame, as measured by [`frame_len`]
  pub fn parse(frame: &'a [u8]) -> Result<Self, FrameError> {
    let len = frame_len(frame)?.ok_or(FrameError::Truncated)?;
    let tkl = token_length(frame[0])?;
    let ext = match frame[0] >> 4 {
      | 13 => 1,
      | 14 => 2,
      | 15 => 4,
      | _ => 0,
    };

    let code_at = 1 + ext;
    Ok(Self { code: frame[code_at],
              token: &frame[code_at + 1..code_at + 1 + tkl],
              body: &frame[code_at + 1 + tkl..len] })
  }

  /// Is this a signaling message (class 7) rather than a request or response?
  pub fn is_signal(&self) -> bool {
    self.code >> 5 == SIGNAL_CLASS
  }

  /// This frame as a non-confirmable datagram with message id 0
  pub fn to_datagram(&self) -> Vec<u8> {
    let mut dgram = Vec::with_capacity(4 + self.token.len() + self.body.len());
    dgram.push(DATAGRAM_NON | self.token.len() as u8);
    dgram.push(self.code);
    dgram.extend_from_slice(&[0, 0]);
    dgram.extend_from_slice(self.token);
    dgram.extend_from_slice(self.body);
    dgram
  }
}
