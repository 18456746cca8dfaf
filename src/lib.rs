//! A remote shell client speaking SSH protocol 1, with protocol 2 support
//! up to the key exchange.
//!
//! [`session::SshIo`] is the transport-agnostic protocol engine, and
//! [`client::Client`] drives it over a tokio stream.

mod consts;
mod error;
mod util;

pub mod cipher;
pub mod client;
pub mod config;
pub mod crypto;
pub mod ident;
pub mod packet;
pub mod session;

pub use crate::{
    client::Client,
    config::{ClientConfig, SessionConfig},
    error::{Error, ErrorKind},
    session::{Host, Output, SshIo, State},
};
