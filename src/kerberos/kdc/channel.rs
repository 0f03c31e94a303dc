use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

pub const KERBEROS_PORT: u16 = 88;

/// Trait implemented by transports which deliver Kerberos messages.
pub trait KrbChannel: Sync {
    /// Sends a message and retrieves the response.
    fn send_recv(&self, raw: &[u8]) -> io::Result<Vec<u8>>;
    fn address(&self) -> SocketAddr;
}

/// Kerberos over TCP. Every exchange opens its own connection, so one
/// channel can be shared by concurrent attempts.
#[derive(Debug, Clone)]
pub struct TcpChannel {
    address: SocketAddr,
    timeout: Duration,
}

impl TcpChannel {
    /// Resolves `host` (`name`, `ip` or `ip:port`), defaulting to port 88.
    pub fn new(host: &str, timeout: Duration) -> io::Result<Self> {
        let address = resolve(host)?;
        Ok(Self { address, timeout })
    }
}

fn resolve(host: &str) -> io::Result<SocketAddr> {
    if let Ok(address) = host.parse::<SocketAddr>() {
        return Ok(address);
    }
    let mut candidates = match host.rsplit_once(':') {
        Some((name, port)) if port.parse::<u16>().is_ok() && !name.contains(':') => {
            host.to_socket_addrs()?
        }
        _ => (host.trim_matches(|c| c == '[' || c == ']'), KERBEROS_PORT).to_socket_addrs()?,
    };
    candidates.next().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("unable to resolve {}", host),
        )
    })
}

impl KrbChannel for TcpChannel {
    fn send_recv(&self, raw: &[u8]) -> io::Result<Vec<u8>> {
        let mut stream = TcpStream::connect_timeout(&self.address, self.timeout)?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;

        let mut framed = Vec::with_capacity(raw.len() + 4);
        framed.write_u32::<BigEndian>(raw.len() as u32)?;
        framed.extend_from_slice(raw);
        stream.write_all(&framed)?;

        let len = stream.read_u32::<BigEndian>()? as usize;
        let mut response = vec![0u8; len];
        stream.read_exact(&mut response)?;
        Ok(response)
    }

    fn address(&self) -> SocketAddr {
        self.address
    }
}
