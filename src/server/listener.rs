use std::net::TcpListener;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::ServerConfig;

/// Binds a non-blocking listening socket for one virtual server.
///
/// Failing to bind is a startup error; the caller aborts before serving.
pub fn bind(server: &ServerConfig) -> Result<TcpListener> {
    let addr = server.addr();
    let listener =
        TcpListener::bind(&addr).with_context(|| format!("failed to bind {addr}"))?;
    listener
        .set_nonblocking(true)
        .with_context(|| format!("failed to make {addr} non-blocking"))?;

    let local = listener.local_addr().context("failed to read bound address")?;
    info!(
        addr = %local,
        server_name = server.server_name.as_deref().unwrap_or("-"),
        "listening"
    );
    Ok(listener)
}
