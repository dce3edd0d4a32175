//! In-place checksum repair for packets sourced from devices without checksum offload.
//!
//! Capture/injection drivers hand over packets whose IPv4 header checksum and TCP/UDP
//! checksum were never computed. These functions rewrite the checksum fields so the
//! packet is acceptable to the stack. Both are pure byte-level transformations; whether
//! they run at all is a per-device policy decided by the endpoint.

use crate::checksum::{internet_checksum, transport_checksum_ipv4, transport_checksum_ipv6};
use crate::ipv4::{Ipv4Packet, IPPROTO_TCP, IPPROTO_UDP};
use crate::ipv6::Ipv6Packet;
use crate::{ensure_len, IpVersion, PacketError};

const TCP_CHECKSUM_OFFSET: usize = 16;
const TCP_MIN_HEADER_LEN: usize = 20;
const UDP_CHECKSUM_OFFSET: usize = 6;
const UDP_HEADER_LEN: usize = 8;

/// Recompute the IPv4 header checksum in place.
///
/// IPv6 has no header checksum; for v6 packets only [`recompute_transport_checksum`]
/// applies.
pub fn recompute_ipv4_checksum(packet: &mut [u8]) -> Result<(), PacketError> {
    let header_len = Ipv4Packet::parse(packet)?.header_len();
    packet[10..12].fill(0);
    let csum = internet_checksum(&packet[..header_len]);
    packet[10..12].copy_from_slice(&csum.to_be_bytes());
    Ok(())
}

/// Recompute the embedded TCP/UDP checksum in place using the pseudo-header for
/// `version`.
///
/// Transport protocols other than TCP and UDP pass through untouched. For UDP a
/// computed checksum of 0x0000 is stored as 0xffff so the zero "checksum disabled"
/// sentinel is never emitted; TCP has no such sentinel and a computed 0x0000 is stored
/// as-is.
pub fn recompute_transport_checksum(
    packet: &mut [u8],
    version: IpVersion,
) -> Result<(), PacketError> {
    match version {
        IpVersion::V4 => {
            let ip = Ipv4Packet::parse(packet)?;
            let (header_len, total_len) = (ip.header_len(), ip.total_len());
            let (protocol, src, dst) = (ip.protocol(), ip.src(), ip.dst());
            let segment = &mut packet[header_len..total_len];
            match protocol {
                IPPROTO_TCP => {
                    ensure_len(segment, TCP_MIN_HEADER_LEN)?;
                    write_checksum(segment, TCP_CHECKSUM_OFFSET, |s| {
                        transport_checksum_ipv4(src, dst, IPPROTO_TCP, s)
                    });
                }
                IPPROTO_UDP => {
                    ensure_len(segment, UDP_HEADER_LEN)?;
                    write_checksum(segment, UDP_CHECKSUM_OFFSET, |s| {
                        match transport_checksum_ipv4(src, dst, IPPROTO_UDP, s) {
                            0 => 0xffff,
                            csum => csum,
                        }
                    });
                }
                _ => {}
            }
        }
        IpVersion::V6 => {
            let ip = Ipv6Packet::parse(packet)?;
            let (next_header, src, dst) = (ip.next_header(), ip.src(), ip.dst());
            let payload_len = ip.payload_len();
            let segment = &mut packet[Ipv6Packet::HEADER_LEN..Ipv6Packet::HEADER_LEN + payload_len];
            match next_header {
                IPPROTO_TCP => {
                    ensure_len(segment, TCP_MIN_HEADER_LEN)?;
                    write_checksum(segment, TCP_CHECKSUM_OFFSET, |s| {
                        transport_checksum_ipv6(src, dst, IPPROTO_TCP, s)
                    });
                }
                IPPROTO_UDP => {
                    ensure_len(segment, UDP_HEADER_LEN)?;
                    write_checksum(segment, UDP_CHECKSUM_OFFSET, |s| {
                        match transport_checksum_ipv6(src, dst, IPPROTO_UDP, s) {
                            0 => 0xffff,
                            csum => csum,
                        }
                    });
                }
                _ => {}
            }
        }
    }
    Ok(())
}

fn write_checksum(segment: &mut [u8], offset: usize, compute: impl FnOnce(&[u8]) -> u16) {
    segment[offset..offset + 2].fill(0);
    let csum = compute(segment);
    segment[offset..offset + 2].copy_from_slice(&csum.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::net::{Ipv4Addr, Ipv6Addr};

    fn build_ipv4(protocol: u8, segment: &[u8]) -> Vec<u8> {
        let total_len = (20 + segment.len()) as u16;
        let mut packet = vec![0u8; 20];
        packet[0] = 0x45;
        packet[2..4].copy_from_slice(&total_len.to_be_bytes());
        packet[8] = 64;
        packet[9] = protocol;
        packet[12..16].copy_from_slice(&[192, 168, 0, 2]);
        packet[16..20].copy_from_slice(&[192, 168, 0, 1]);
        packet.extend_from_slice(segment);
        packet
    }

    fn build_ipv6(next_header: u8, segment: &[u8]) -> Vec<u8> {
        let mut packet = vec![0u8; 40];
        packet[0] = 0x60;
        packet[4..6].copy_from_slice(&(segment.len() as u16).to_be_bytes());
        packet[6] = next_header;
        packet[7] = 64;
        packet[8..24].copy_from_slice(&Ipv6Addr::new(0xfd00, 0, 0, 0, 0, 0, 0, 1).octets());
        packet[24..40].copy_from_slice(&Ipv6Addr::new(0xfd00, 0, 0, 0, 0, 0, 0, 2).octets());
        packet.extend_from_slice(segment);
        packet
    }

    fn build_udp_segment(payload: &[u8]) -> Vec<u8> {
        let mut segment = vec![0u8; 8];
        segment[0..2].copy_from_slice(&12345u16.to_be_bytes());
        segment[2..4].copy_from_slice(&53u16.to_be_bytes());
        segment[4..6].copy_from_slice(&((8 + payload.len()) as u16).to_be_bytes());
        segment.extend_from_slice(payload);
        segment
    }

    fn build_tcp_segment(payload: &[u8]) -> Vec<u8> {
        let mut segment = vec![0u8; 20];
        segment[0..2].copy_from_slice(&40000u16.to_be_bytes());
        segment[2..4].copy_from_slice(&80u16.to_be_bytes());
        segment[4..8].copy_from_slice(&1u32.to_be_bytes());
        segment[12] = 0x50;
        segment[13] = 0x18; // PSH|ACK
        segment[14..16].copy_from_slice(&4096u16.to_be_bytes());
        segment.extend_from_slice(payload);
        segment
    }

    #[test]
    fn repairs_ipv4_udp_with_zeroed_checksums() {
        // 20-byte IPv4 header + 8-byte UDP header + 4-byte payload, both checksums zero.
        let mut packet = build_ipv4(IPPROTO_UDP, &build_udp_segment(b"ping"));
        recompute_ipv4_checksum(&mut packet).unwrap();
        recompute_transport_checksum(&mut packet, IpVersion::V4).unwrap();

        let ip = Ipv4Packet::parse(&packet).unwrap();
        assert!(ip.header_checksum_valid());
        assert_ne!(ip.header_checksum(), 0);
        assert_eq!(
            transport_checksum_ipv4(ip.src(), ip.dst(), IPPROTO_UDP, ip.payload()),
            0
        );
    }

    #[test]
    fn repairs_ipv4_tcp() {
        let mut packet = build_ipv4(IPPROTO_TCP, &build_tcp_segment(b"GET / HTTP/1.0\r\n\r\n"));
        recompute_ipv4_checksum(&mut packet).unwrap();
        recompute_transport_checksum(&mut packet, IpVersion::V4).unwrap();

        let ip = Ipv4Packet::parse(&packet).unwrap();
        assert!(ip.header_checksum_valid());
        assert_eq!(
            transport_checksum_ipv4(ip.src(), ip.dst(), IPPROTO_TCP, ip.payload()),
            0
        );
    }

    #[test]
    fn repairs_ipv6_transport_only() {
        let mut packet = build_ipv6(IPPROTO_TCP, &build_tcp_segment(b"hello"));
        recompute_transport_checksum(&mut packet, IpVersion::V6).unwrap();

        let ip = Ipv6Packet::parse(&packet).unwrap();
        assert_eq!(
            transport_checksum_ipv6(ip.src(), ip.dst(), IPPROTO_TCP, ip.payload()),
            0
        );
    }

    #[test]
    fn repairs_ipv6_udp() {
        let mut packet = build_ipv6(IPPROTO_UDP, &build_udp_segment(b"aaaa"));
        recompute_transport_checksum(&mut packet, IpVersion::V6).unwrap();

        let ip = Ipv6Packet::parse(&packet).unwrap();
        assert_eq!(
            transport_checksum_ipv6(ip.src(), ip.dst(), IPPROTO_UDP, ip.payload()),
            0
        );
    }

    #[test]
    fn unknown_transport_passes_through_untouched() {
        let icmp = [8u8, 0, 0, 0, 0, 1, 0, 1];
        let mut packet = build_ipv4(1, &icmp);
        let before = packet.clone();
        recompute_transport_checksum(&mut packet, IpVersion::V4).unwrap();
        assert_eq!(packet, before);
    }

    #[test]
    fn udp_zero_checksum_is_stored_as_ffff() {
        // Pick a 2-byte payload that makes the computed checksum exactly 0x0000.
        let src = Ipv4Addr::new(192, 168, 0, 2);
        let dst = Ipv4Addr::new(192, 168, 0, 1);
        let base = build_udp_segment(&[0, 0]);
        let word = transport_checksum_ipv4(src, dst, IPPROTO_UDP, &base);
        let mut segment = build_udp_segment(&word.to_be_bytes());
        assert_eq!(
            transport_checksum_ipv4(src, dst, IPPROTO_UDP, &segment),
            0
        );

        segment[6..8].fill(0);
        let mut packet = build_ipv4(IPPROTO_UDP, &segment);
        recompute_transport_checksum(&mut packet, IpVersion::V4).unwrap();
        let ip = Ipv4Packet::parse(&packet).unwrap();
        assert_eq!(&ip.payload()[6..8], &[0xff, 0xff]);
    }

    #[test]
    fn truncated_transport_is_an_error() {
        let mut packet = build_ipv4(IPPROTO_TCP, &[0u8; 12]);
        assert!(matches!(
            recompute_transport_checksum(&mut packet, IpVersion::V4),
            Err(PacketError::Truncated)
        ));
    }
}
