use core::fmt;

use toad_msg::Code;

/// Request method
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Method(pub(crate) Code);

impl Method {
  /// The request code for this method
  pub fn code(&self) -> Code {
    self.0
  }

  /// GET
  pub const GET: Self = Self(Code { class: 0,
                                    detail: 1 });
  /// POST
  pub const POST: Self = Self(Code { class: 0,
                                     detail: 2 });
  /// PUT
  pub const PUT: Self = Self(Code { class: 0,
                                    detail: 3 });
  /// DELETE
  pub const DELETE: Self = Self(Code { class: 0,
                                       detail: 4 });
}

impl fmt::Debug for Method {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self.0.detail {
      | 1 => "GET",
      | 2 => "POST",
      | 3 => "PUT",
      | 4 => "DELETE",
      | _ => "?",
    };

    f.write_str(name)
  }
}

impl fmt::Display for Method {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::Debug::fmt(self, f)
  }
}
