//! Listening socket setup.

use std::net::{SocketAddr, TcpListener};

use socket2::{Domain, Protocol, Socket, Type};

#[derive(thiserror::Error, Debug)]
pub enum ServerBindError {
    #[error("could not create socket: {0}")]
    SocketCreation(std::io::Error),
    #[error("could not set reuse address: {0}")]
    SetReuseAddress(std::io::Error),
    #[error("could not bind to {address}: {source}")]
    Bind {
        address: SocketAddr,
        source: std::io::Error,
    },
    #[error("could not listen on {address}: {source}")]
    Listen {
        address: SocketAddr,
        source: std::io::Error,
    },
}

/// Creates a blocking listener on `address` with SO_REUSEADDR and the
/// given backlog.
pub fn server_bind(address: SocketAddr, backlog: i32) -> Result<TcpListener, ServerBindError> {
    let domain = if address.is_ipv6() {
        Domain::IPV6
    } else {
        Domain::IPV4
    };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))
        .map_err(ServerBindError::SocketCreation)?;
    socket
        .set_reuse_address(true)
        .map_err(ServerBindError::SetReuseAddress)?;
    socket
        .bind(&address.into())
        .map_err(|source| ServerBindError::Bind { address, source })?;
    socket
        .listen(backlog)
        .map_err(|source| ServerBindError::Listen { address, source })?;
    Ok(socket.into())
}
