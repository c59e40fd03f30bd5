use std::io;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};

/// Address used to pick the outbound interface. Nothing is ever sent to it.
const PROBE_ADDR: &str = "8.8.8.8:80";

/// Best-effort address other devices on the local network can reach us at.
///
/// Connecting a UDP socket performs route selection only; no datagram is
/// sent. When the lookup fails (no route, no network) the loopback address
/// is reported instead. Not authoritative: multi-homed machines get
/// whichever interface routes to the probe address.
pub fn lan_ip() -> IpAddr {
    lan_ip_via(PROBE_ADDR)
}

fn lan_ip_via(probe: &str) -> IpAddr {
    outbound_addr(probe).unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

fn outbound_addr(probe: &str) -> io::Result<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    socket.connect(probe)?;
    Ok(socket.local_addr()?.ip())
}
