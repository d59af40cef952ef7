//! `toad-oneshot` drives exactly one CoAP request from start to finish:
//! - resolve the target URI
//! - bring the network link up (with bounded retries)
//! - open a transport session (UDP, TCP or DTLS, optionally with a post-quantum key exchange)
//! - send one request and wait for the one response that answers it
//! - release every resource it allocated, no matter where the run stopped
//!
//! ## Collaborators
//! The CoAP protocol engine, the security engine and the network interface are not
//! implemented here; they are reached through the [`engine::Engine`] and [`link::Link`] traits.
//!
//! With the `std` feature, [`std::Engine`] provides UDP and DTLS (via `openssl`) sessions
//! and [`std::AlwaysUp`] stands in for a network interface that the OS already manages.
//!
//! ```no_run
//! use toad_oneshot::blocking::{Client, ClientResultExt};
//!
//! let mut client = Client::new_std();
//! match client.get("coap://192.0.2.1/hello").timeout_ok() {
//!   | Ok(Some(rep)) => println!("{}", rep.payload_string().unwrap_or_default()),
//!   | Ok(None) => println!("no response"),
//!   | Err(e) => println!("{}", e),
//! }
//! ```
//!
//! ## Lifecycle
//! ```text
//! uri::parse -> link::bring_up -> net::resolve -> session::establish
//!            -> req::ReqBuilder -> exchange::run -> guard::ResourceGuard (always)
//! ```

// x-release-please-version
#![doc(html_root_url = "https://docs.rs/toad-oneshot/0.1.0")]
// x-release-please-end
#![cfg_attr(any(docsrs, feature = "docs"), feature(doc_cfg))]
// -
// style
#![allow(clippy::unused_unit)]
// -
// deny
#![deny(missing_docs)]
#![deny(missing_debug_implementations)]
#![cfg_attr(not(test), deny(unsafe_code))]
// -
// warnings
#![warn(missing_copy_implementations)]
#![cfg_attr(not(test), warn(unreachable_pub))]
// -
// features
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc as std_alloc;

#[cfg(test)]
pub(crate) mod test;

pub(crate) mod logging;

/// Blocking single-request client
pub mod blocking;

/// customizable retrying of fallible operations
pub mod retry;

/// target URI parsing
pub mod uri;

/// network link bring-up
pub mod link;

/// network abstractions & destination address resolution
pub mod net;

/// transport & security session establishment
pub mod session;

/// the protocol engine that sessions, requests and I/O are delegated to
pub mod engine;

/// requests
pub mod req;

/// responses
pub mod resp;

/// sending a request and correlating its response
pub mod exchange;

/// releasing everything a run allocated
pub mod guard;

/// time abstractions
pub mod time;

/// configuring runtime behavior
pub mod config;

/// `std`-only toad-oneshot stuff
#[cfg(feature = "std")]
#[cfg_attr(docsrs, doc(cfg(feature = "std")))]
pub mod std;

/// Helper constants and functions for recognizing multicast destinations
pub mod multicast {
  use no_std_net::IpAddr;

  /// Is this address a multicast group?
  ///
  /// Requests to multicast groups are always sent Non-confirmable.
  pub fn is_group(ip: IpAddr) -> bool {
    ip.is_multicast()
  }
}
