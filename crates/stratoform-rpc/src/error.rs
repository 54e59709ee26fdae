//! RPC error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("{0}")]
    Handshake(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),
}

pub type Result<T> = std::result::Result<T, RpcError>;
