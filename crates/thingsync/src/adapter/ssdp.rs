//! Passive SSDP listener.
//!
//! Only NOTIFY advertisements are of interest. Everything else on the group
//! (M-SEARCH requests, search responses, garbage) is dropped without comment.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tracing::debug;
use tracing::info;
use tracing::warn;

pub const SSDP_MCAST_V4: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);
pub const SSDP_PORT: u16 = 1900;

/// Header carrying the device description URL. Matched case-sensitively.
pub const LOCATION_HEADER: &str = "LOCATION";

const MULTICAST_TTL: u32 = 128;
const RECV_BUFFER_SIZE: usize = 8192;

/// A decoded NOTIFY datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notify {
    /// Everything after `NOTIFY ` on the request line (normally `* HTTP/1.1`)
    pub target: String,
    /// Header lines in arrival order
    pub headers: Vec<(String, String)>,
}

impl Notify {
    /// All `LOCATION` header values, in arrival order.
    pub fn locations(&self) -> impl Iterator<Item = &str> {
        self.headers
            .iter()
            .filter(|(name, _)| name == LOCATION_HEADER)
            .map(|(_, value)| value.as_str())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// A raw datagram as received from the socket.
#[derive(Debug, Clone)]
pub struct Datagram {
    pub from: SocketAddr,
    pub payload: Vec<u8>,
}

/// Decode a datagram into a NOTIFY message.
///
/// Returns `None` for anything that isn't a NOTIFY with at least one header
/// line. Header lines are split at the first `": "`; lines without one are
/// skipped.
pub fn parse_notify(payload: &[u8]) -> Option<Notify> {
    let text = std::str::from_utf8(payload).ok()?;
    let mut lines = text.lines();

    let request_line = lines.next()?;
    let target = request_line.strip_prefix("NOTIFY ")?;

    let rest: Vec<&str> = lines.collect();
    if rest.is_empty() {
        return None;
    }

    let headers = rest
        .into_iter()
        .filter_map(|line| line.split_once(": "))
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect();

    Some(Notify {
        target: target.to_string(),
        headers,
    })
}

/// Create the receive socket for the SSDP group.
///
/// Binds `0.0.0.0:port` with SO_REUSEADDR so that other SSDP stacks on the
/// host keep working, enables broadcast, and joins `group` on `interface`.
pub fn bind_multicast(group: Ipv4Addr, port: u16, interface: Ipv4Addr) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_broadcast(true)?;
    let bind_addr: SocketAddr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port).into();
    socket.bind(&bind_addr.into())?;
    socket.set_multicast_ttl_v4(MULTICAST_TTL)?;
    socket.join_multicast_v4(&group, &interface)?;
    socket.set_nonblocking(true)?;
    let std_udp: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_udp)
}

/// Why a listening window ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenEnd {
    Elapsed,
    Cancelled,
    SocketError,
}

/// Receive datagrams for `duration`, handing every NOTIFY to `on_notify`.
///
/// The socket is dropped (closed) before this returns, whichever way the
/// window ends.
pub async fn listen<F>(
    socket: UdpSocket,
    duration: Duration,
    mut cancel: oneshot::Receiver<()>,
    mut on_notify: F,
) -> ListenEnd
where
    F: FnMut(Datagram, Notify),
{
    let deadline = tokio::time::sleep(duration);
    tokio::pin!(deadline);
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];

    let end = loop {
        tokio::select! {
            _ = &mut deadline => break ListenEnd::Elapsed,
            _ = &mut cancel => break ListenEnd::Cancelled,
            received = socket.recv_from(&mut buf) => {
                let (len, from) = match received {
                    Ok(r) => r,
                    Err(e) => {
                        warn!("SSDP receive failed: {}", e);
                        break ListenEnd::SocketError;
                    }
                };
                let datagram = Datagram { from, payload: buf[..len].to_vec() };
                match parse_notify(&datagram.payload) {
                    Some(notify) => on_notify(datagram, notify),
                    None => debug!("Ignoring non-NOTIFY datagram from {}", from),
                }
            }
        }
    };

    drop(socket);
    info!("closing UDP multicast socket ({:?})", end);
    end
}
