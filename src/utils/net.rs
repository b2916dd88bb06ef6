use std::net::{IpAddr, Ipv4Addr, UdpSocket};

/// Best guess at the address other machines on the LAN can reach us on.
///
/// Connecting a UDP socket sends nothing; it only makes the OS pick the
/// outgoing interface. Falls back to loopback when there is no route.
pub fn local_ip() -> IpAddr {
    let probe = || -> std::io::Result<IpAddr> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect((Ipv4Addr::new(10, 254, 254, 254), 1))?;
        Ok(socket.local_addr()?.ip())
    };

    match probe() {
        Ok(ip) if !ip.is_unspecified() => ip,
        _ => IpAddr::V4(Ipv4Addr::LOCALHOST),
    }
}
