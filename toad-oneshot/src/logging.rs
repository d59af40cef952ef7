use core::fmt::Write;

use std_alloc::string::String;
use toad_msg::Token;

use crate::req::Req;
use crate::resp::code::Human;
use crate::resp::Resp;

fn token_hex(token: &Token) -> String {
  let mut buf = String::with_capacity(token.0.len() * 2);
  token.0.iter().for_each(|b| {
                  write!(buf, "{:02x}", b).ok();
                });
  buf
}

pub(crate) fn summarize(msg: &Resp) -> String {
  let mut buf = String::new();
  write!(buf,
         "{:?} {} id {} token {} with {} option(s) and {} byte payload",
         msg.ty(),
         Human(msg.code()),
         msg.id().0,
         token_hex(&msg.token()),
         msg.options().len(),
         msg.payload().len()).ok();
  buf
}

pub(crate) fn summarize_req(req: &Req) -> String {
  let mut buf = String::new();
  write!(buf,
         "{:?} {} id {} token {} options {:?} ({} bytes)",
         req.ty(),
         req.method(),
         req.id().0,
         token_hex(&req.token()),
         req.options().numbers().map(|n| n.0).collect::<std_alloc::vec::Vec<_>>(),
         req.size()).ok();
  buf
}

#[cfg(test)]
mod tests {
  use tinyvec::array_vec;
  use toad_msg::{Id, Type};

  use super::*;
  use crate::resp::code;

  #[test]
  fn summary() {
    let mut rep = Resp::ack(Id(3), Token(array_vec!([u8; 8] => 0xab, 0x01)), code::CONTENT);
    rep.set_payload("world".bytes());

    assert_eq!(summarize(&rep),
               "Ack 2.05 id 3 token ab01 with 0 option(s) and 5 byte payload");
    assert_eq!(rep.ty(), Type::Ack);
  }
}
