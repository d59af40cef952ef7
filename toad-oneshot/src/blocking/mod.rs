/// The single-request client
pub mod client;

#[doc(inline)]
pub use client::{Client, ClientParts, ClientResultExt};
