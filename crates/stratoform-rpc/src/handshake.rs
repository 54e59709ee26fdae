//! Plugin handshake
//!
//! The host proves it launched the process on purpose by setting the magic
//! cookie; the plugin answers with one line on standard output:
//!
//! ```text
//! 1|5|tcp|127.0.0.1:41337|jsonl|plan_destroy,get_schema_optional
//! ```

use crate::error::{Result, RpcError};
use std::fmt;
use std::net::SocketAddr;

pub const MAGIC_COOKIE_KEY: &str = "STRATOFORM_PLUGIN_MAGIC_COOKIE";
pub const MAGIC_COOKIE_VALUE: &str =
    "d602bf8f470bc67ca7faa0386276bbdd4330efaf76d1a219cb4d6991ca9872b2";

pub const CORE_PROTOCOL_VERSION: u32 = 1;
pub const APP_PROTOCOL_VERSION: u32 = 5;
pub const WIRE_PROTOCOL: &str = "jsonl";
pub const CAPABILITIES: &[&str] = &["plan_destroy", "get_schema_optional"];

/// Fails unless the host set the magic cookie.
pub fn check_cookie() -> Result<()> {
    match std::env::var(MAGIC_COOKIE_KEY) {
        Ok(value) if value == MAGIC_COOKIE_VALUE => Ok(()),
        _ => Err(RpcError::Handshake(
            "This binary is a plugin. These are not meant to be executed directly.\n\
             Please execute the program that consumes these plugins, which will\n\
             load any plugins automatically"
                .to_string(),
        )),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub addr: SocketAddr,
}

impl Handshake {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }
}

impl fmt::Display for Handshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|tcp|{}|{}|{}",
            CORE_PROTOCOL_VERSION,
            APP_PROTOCOL_VERSION,
            self.addr,
            WIRE_PROTOCOL,
            CAPABILITIES.join(",")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_handshake_line() {
        let addr: SocketAddr = "127.0.0.1:41337".parse().unwrap();
        assert_eq!(
            Handshake::new(addr).to_string(),
            "1|5|tcp|127.0.0.1:41337|jsonl|plan_destroy,get_schema_optional"
        );
    }

    #[test]
    #[serial]
    fn test_cookie_must_match() {
        temp_env::with_var(MAGIC_COOKIE_KEY, Some(MAGIC_COOKIE_VALUE), || {
            assert!(check_cookie().is_ok());
        });
        temp_env::with_var(MAGIC_COOKIE_KEY, Some("nope"), || {
            let err = check_cookie().unwrap_err();
            assert!(err.to_string().contains("plugin"));
        });
        temp_env::with_var(MAGIC_COOKIE_KEY, None::<&str>, || {
            assert!(check_cookie().is_err());
        });
    }
}
