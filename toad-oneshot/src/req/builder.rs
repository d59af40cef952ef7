use toad_msg::{Id, Token, Type};

use super::{BuildError, Method, OptionSet, Req};
use crate::net::Destination;
use crate::uri::TargetUri;

/// The message type a request to `dst` must be sent as.
///
/// Requests to multicast groups are never confirmable.
pub fn kind_for(dst: &Destination) -> Type {
  if dst.is_multicast() {
    Type::Non
  } else {
    Type::Con
  }
}

/// A request that has been built, and the options
/// that should be attached to it
#[derive(Debug, Clone, PartialEq)]
pub struct Built {
  /// The request, with no options yet
  pub req: Req,
  /// Options derived from the target, sorted
  pub options: OptionSet,
}

/// Build the one request of a run
///
/// ```
/// use toad_msg::{Id, Token, Type};
/// use toad_oneshot::req::{Method, ReqBuilder};
///
/// let target = toad_oneshot::uri::parse("coap://192.0.2.1/hello").unwrap();
/// let built = ReqBuilder::new(Method::GET, Type::Con, 1152).build(Id(1), Token(Default::default()), &target)
///                                                       .unwrap();
///
/// let mut req = built.req;
/// req.attach(built.options).unwrap();
/// assert_eq!(req.options().len(), 1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReqBuilder {
  method: Method,
  kind: Type,
  max_size: usize,
}

impl ReqBuilder {
  /// Create a builder for requests of `kind` that may be at most `max_size` bytes
  pub fn new(method: Method, kind: Type, max_size: usize) -> Self {
    Self { method,
           kind,
           max_size }
  }

  /// Creates a GET request builder
  pub fn get(kind: Type, max_size: usize) -> Self {
    Self::new(Method::GET, kind, max_size)
  }

  /// Build a request for `target` with a freshly allocated `id` & `token`.
  ///
  /// Fails if the options derived from `target` can't fit in the request.
  pub fn build(&self, id: Id, token: Token, target: &TargetUri) -> Result<Built, BuildError> {
    let req = Req::new(self.kind, self.method, id, token, self.max_size);
    let options = OptionSet::from_target(target).map_err(BuildError::Uri)?;

    let size = req.size() + options.encoded_len();
    if size > self.max_size {
      return Err(BuildError::OptionsTooLarge { size,
                                               capacity: self.max_size });
    }

    Ok(Built { req, options })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{net, uri};

  #[test]
  fn multicast_is_non() {
    assert_eq!(kind_for(&net::resolve("224.0.1.187", 5683).unwrap()), Type::Non);
    assert_eq!(kind_for(&net::resolve("ff05::fd", 5683).unwrap()), Type::Non);
    assert_eq!(kind_for(&net::resolve("192.0.2.1", 5683).unwrap()), Type::Con);
  }

  #[test]
  fn build_get() {
    let target = uri::parse("coap://192.0.2.1/hello").unwrap();
    let Built { req, options } =
      ReqBuilder::get(Type::Con, 1152).build(Id(7), Token(Default::default()), &target)
                                      .unwrap();

    assert_eq!(req.ty(), Type::Con);
    assert_eq!(req.method(), Method::GET);
    assert_eq!(req.id(), Id(7));
    assert_eq!(options.get(crate::req::opt::URI_PATH).collect::<Vec<_>>(),
               vec![&b"hello"[..]]);
  }

  #[test]
  fn too_large() {
    let target = uri::parse(&format!("coap://192.0.2.1/{}", "a".repeat(100))).unwrap();
    let err = ReqBuilder::get(Type::Con, 64).build(Id(7), Token(Default::default()), &target)
                                            .unwrap_err();
    assert_eq!(err,
               BuildError::OptionsTooLarge { size: 4 + 1 + 1 + 100,
                                             capacity: 64 });
  }
}
