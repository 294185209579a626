use socket2::{Domain, Socket, Type};
use std::net::{AddrParseError, SocketAddr};

const BACKLOG: i32 = 1024;

/// Non-blocking listener with SO_REUSEPORT, so a restarted process can bind
/// while the old one drains its connections.
pub fn listen_reuse_socket(addr: &SocketAddr) -> Result<Socket, std::io::Error> {
    let socket = Socket::new(Domain::for_address(*addr), Type::STREAM, None)?;
    socket.set_nonblocking(true)?;
    socket.set_reuse_port(true)?;
    socket.set_reuse_address(true)?;
    socket.bind(&(*addr).into())?;
    socket.listen(BACKLOG)?;
    Ok(socket)
}

/// Accepts `:port` as shorthand for all IPv4 interfaces.
pub fn parse_address(mut addr: String) -> Result<SocketAddr, AddrParseError> {
    if addr.starts_with(':') {
        addr.insert_str(0, "0.0.0.0");
    }

    addr.parse()
}
