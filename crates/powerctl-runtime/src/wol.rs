use std::net::{IpAddr, SocketAddr};

use anyhow::{Context, Result};
use tokio::net::UdpSocket;

use powerctl_core::mac::MacAddress;

/// Standard Wake-on-LAN discard port.
pub const WOL_PORT: u16 = 9;

/// Build the 102-byte magic packet: 6 x 0xFF, then the MAC 16 times.
pub fn magic_packet(mac: MacAddress) -> [u8; 102] {
    let mut packet = [0xFFu8; 102];
    let octets = mac.octets();
    for chunk in packet[6..].chunks_exact_mut(6) {
        chunk.copy_from_slice(&octets);
    }
    packet
}

/// Resolve a broadcast target. Bare IPs get the standard WoL port.
pub fn broadcast_addr(target: &str) -> Result<SocketAddr> {
    if let Ok(addr) = target.parse::<SocketAddr>() {
        return Ok(addr);
    }
    let ip: IpAddr = target
        .parse()
        .with_context(|| format!("Invalid wake broadcast target: {}", target))?;
    Ok(SocketAddr::new(ip, WOL_PORT))
}

/// Send one magic packet. Fire-and-forget: delivery is not confirmed.
pub async fn send_magic_packet(mac: MacAddress, target: &str) -> Result<()> {
    let addr = broadcast_addr(target)?;
    let bind: SocketAddr = if addr.is_ipv4() {
        "0.0.0.0:0".parse()?
    } else {
        "[::]:0".parse()?
    };

    let socket = UdpSocket::bind(bind)
        .await
        .with_context(|| "Failed to bind UDP socket for wake packet")?;
    socket
        .set_broadcast(true)
        .with_context(|| "Failed to enable broadcast on wake socket")?;
    socket
        .send_to(&magic_packet(mac), addr)
        .await
        .with_context(|| format!("Failed to send wake packet to {}", addr))?;
    Ok(())
}
