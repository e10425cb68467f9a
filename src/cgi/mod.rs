//! External-process execution gateway (CGI/1.1 subset).
//!
//! One child process per request: request metadata goes into the child's
//! environment, the body into its stdin, and everything the script prints
//! on stdout comes back as a [`ProcessResult`].
//!
//! Execution is synchronous. While a script runs, the calling thread (the
//! reactor) serves nothing else, so a hung script stalls the server. The
//! [`Gateway`] trait is the seam for moving this onto a worker later.

pub mod gateway;
pub mod output;

use std::fmt;
use std::io;
use std::process::ExitStatus;

pub use gateway::{Gateway, InterpreterTable, ProcessGateway, cgi_environment};
pub use output::ProcessResult;

#[derive(Debug)]
pub enum GatewayError {
    /// No interpreter is configured for the script's extension
    UnsupportedExtension(String),
    /// Pipe creation or fork/exec failed
    Spawn(io::Error),
    /// Reading the script's stdout failed
    Read(io::Error),
    /// Waiting for the child failed
    Wait(io::Error),
    /// The script exited unsuccessfully without printing anything
    Exit(ExitStatus),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::UnsupportedExtension(script) => {
                write!(f, "no interpreter configured for {script}")
            }
            GatewayError::Spawn(e) => write!(f, "failed to spawn script: {e}"),
            GatewayError::Read(e) => write!(f, "failed to read script output: {e}"),
            GatewayError::Wait(e) => write!(f, "failed to wait for script: {e}"),
            GatewayError::Exit(status) => write!(f, "script failed with {status}"),
        }
    }
}

impl std::error::Error for GatewayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GatewayError::Spawn(e) | GatewayError::Read(e) | GatewayError::Wait(e) => Some(e),
            _ => None,
        }
    }
}

/// Splits a request path into the script part and `PATH_INFO`.
///
/// The split happens at the first `/` after the last `.`, so
/// `/cgi-bin/app.py/users/7` gives `("/cgi-bin/app.py", "/users/7")`.
/// Paths with no dot, or nothing after the extension, have empty path info.
pub fn split_path_info(path: &str) -> (&str, &str) {
    let Some(dot) = path.rfind('.') else {
        return (path, "");
    };
    match path[dot..].find('/') {
        Some(slash) => path.split_at(dot + slash),
        None => (path, ""),
    }
}
