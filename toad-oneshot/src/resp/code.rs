use core::fmt;

pub use toad_msg::Code;

macro_rules! code {
  ($name:ident = $c:literal . $d:literal, $text:literal) => {
    #[doc = concat!("`", stringify!($c), ".", stringify!($d), "` ", $text)]
    #[allow(clippy::zero_prefixed_literal)]
    pub const $name: Code = Code { class: $c,
                                   detail: $d };
  };
}

// 2.xx
code!(CREATED = 2 . 01, "Created");
code!(DELETED = 2 . 02, "Deleted");
code!(VALID = 2 . 03, "Valid");
code!(CHANGED = 2 . 04, "Changed");
code!(CONTENT = 2 . 05, "Content");

// 4.xx
code!(BAD_REQUEST = 4 . 00, "Bad Request");
code!(UNAUTHORIZED = 4 . 01, "Unauthorized");
code!(BAD_OPTION = 4 . 02, "Bad Option");
code!(FORBIDDEN = 4 . 03, "Forbidden");
code!(NOT_FOUND = 4 . 04, "Not Found");
code!(METHOD_NOT_ALLOWED = 4 . 05, "Method Not Allowed");
code!(NOT_ACCEPTABLE = 4 . 06, "Not Acceptable");

// 5.xx
code!(INTERNAL_SERVER_ERROR = 5 . 00, "Internal Server Error");
code!(NOT_IMPLEMENTED = 5 . 01, "Not Implemented");
code!(SERVICE_UNAVAILABLE = 5 . 03, "Service Unavailable");
code!(GATEWAY_TIMEOUT = 5 . 04, "Gateway Timeout");

/// Display a code the way RFC 7252 writes them, e.g. `2.05`
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Human(pub Code);

impl fmt::Display for Human {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}.{:02}", self.0.class, self.0.detail)
  }
}

impl fmt::Debug for Human {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::Display::fmt(self, f)
  }
}
