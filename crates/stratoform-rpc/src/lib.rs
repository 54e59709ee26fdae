//! Stratoform plugin RPC
//!
//! The host starts the plugin, reads one [`Handshake`] line from its
//! standard output and then talks newline-delimited JSON over a single
//! loopback TCP connection. See [`server`] for the method table.

pub mod error;
pub mod handshake;
pub mod server;
pub mod wire;

pub use error::{Result, RpcError};
pub use handshake::{Handshake, check_cookie};
pub use server::{Server, bind};
pub use wire::{ErrorBody, Request, Response};
