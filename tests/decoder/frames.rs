//! Frame construction helpers shared by the decoder tests

use heptap::config::{Config, DecoderConfig, Mode};
use heptap::correlation::SdpCorrelator;
use heptap::decoder::Decoder;
use heptap::protocol::ethernet::FrameBuilder;
use heptap::protocol::ip_proto;
use heptap::protocol::ipv4::Ipv4Builder;
use heptap::protocol::ipv6::Ipv6Builder;
use heptap::protocol::tcp::{TcpBuilder, TcpFlags};
use heptap::protocol::types::VlanTag;
use heptap::protocol::udp::UdpBuilder;
use heptap::queue::{self, RecordReceiver};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

pub const CLIENT: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
pub const SERVER: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);

pub const OPTIONS: &[u8] =
    b"OPTIONS sip:bob@example.com SIP/2.0\r\nCall-ID: opt-1@host\r\nCSeq: 1 OPTIONS\r\n\r\n";
pub const INVITE: &[u8] =
    b"INVITE sip:bob@example.com SIP/2.0\r\nCall-ID: inv-1@host\r\nCSeq: 1 INVITE\r\n\r\n";

pub fn decoder(config: DecoderConfig) -> (Decoder, RecordReceiver) {
    let config = Config {
        decoder: config,
        ..Default::default()
    };
    let (tx, rx) = queue::channel(256);
    let decoder = Decoder::new(&config, tx, Arc::new(SdpCorrelator::default()));
    (decoder, rx)
}

pub fn mode(mode: Mode) -> DecoderConfig {
    DecoderConfig {
        mode,
        ..Default::default()
    }
}

pub fn eth(ethertype: u16, payload: &[u8]) -> Vec<u8> {
    FrameBuilder::new()
        .dst_mac([0x00, 0x11, 0x22, 0x33, 0x44, 0x55])
        .src_mac([0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb])
        .ethertype(ethertype)
        .payload(payload)
        .build()
}

pub fn eth_vlan(vid: u16, ethertype: u16, payload: &[u8]) -> Vec<u8> {
    FrameBuilder::new()
        .dst_mac([0x00, 0x11, 0x22, 0x33, 0x44, 0x55])
        .src_mac([0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb])
        .vlan_tag(VlanTag::new(vid))
        .ethertype(ethertype)
        .payload(payload)
        .build()
}

pub fn udp(sport: u16, dport: u16, payload: &[u8]) -> Vec<u8> {
    UdpBuilder::new()
        .src_port(sport)
        .dst_port(dport)
        .payload(payload)
        .build()
}

pub fn ipv4(src: Ipv4Addr, dst: Ipv4Addr, protocol: u8, payload: &[u8]) -> Vec<u8> {
    Ipv4Builder::new()
        .src_addr(src)
        .dst_addr(dst)
        .protocol(protocol)
        .payload(payload)
        .build()
}

pub fn ipv4_fragment(id: u16, offset_units: u16, more: bool, data: &[u8]) -> Vec<u8> {
    Ipv4Builder::new()
        .src_addr(CLIENT)
        .dst_addr(SERVER)
        .protocol(ip_proto::UDP)
        .identification(id)
        .dont_fragment(false)
        .more_fragments(more)
        .fragment_offset(offset_units)
        .payload(data)
        .build()
}

pub fn ipv6(src: Ipv6Addr, dst: Ipv6Addr, next_header: u8, payload: &[u8]) -> Vec<u8> {
    Ipv6Builder::new()
        .src_addr(src)
        .dst_addr(dst)
        .next_header(next_header)
        .payload(payload)
        .build()
}

/// Ethernet / IPv4 / UDP between the default endpoints
pub fn sip_udp(sport: u16, dport: u16, payload: &[u8]) -> Vec<u8> {
    eth(0x0800, &ipv4(CLIENT, SERVER, ip_proto::UDP, &udp(sport, dport, payload)))
}

pub fn tcp_segment(seq: u32, flags: TcpFlags, payload: &[u8]) -> Vec<u8> {
    let tcp = TcpBuilder::new()
        .src_port(40000)
        .dst_port(5060)
        .seq(seq)
        .flags(flags)
        .payload(payload)
        .build();
    eth(0x0800, &ipv4(CLIENT, SERVER, ip_proto::TCP, &tcp))
}

pub fn psh_ack() -> TcpFlags {
    TcpFlags {
        psh: true,
        ack: true,
        ..Default::default()
    }
}

/// SCTP common header with the given chunk bytes behind it
pub fn sctp(sport: u16, dport: u16, chunks: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(12 + chunks.len());
    packet.extend_from_slice(&sport.to_be_bytes());
    packet.extend_from_slice(&dport.to_be_bytes());
    packet.extend_from_slice(&0x0102_0304u32.to_be_bytes());
    packet.extend_from_slice(&0u32.to_be_bytes());
    packet.extend_from_slice(chunks);
    packet
}

/// IPv4 packet wrapped in a plain GRE header
pub fn gre(protocol: u16, inner: &[u8]) -> Vec<u8> {
    let mut gre = vec![0x00, 0x00];
    gre.extend_from_slice(&protocol.to_be_bytes());
    gre.extend_from_slice(inner);
    ipv4(
        Ipv4Addr::new(192, 168, 0, 1),
        Ipv4Addr::new(192, 168, 0, 2),
        ip_proto::GRE,
        &gre,
    )
}

/// Legacy little-endian pcap file with microsecond timestamps
pub fn pcap_file(network: u32, records: &[(u32, u32, &[u8])]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&0xa1b2_c3d4u32.to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&4u16.to_le_bytes());
    out.extend_from_slice(&0i32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&65535u32.to_le_bytes());
    out.extend_from_slice(&network.to_le_bytes());
    for (secs, usecs, data) in records {
        out.extend_from_slice(&secs.to_le_bytes());
        out.extend_from_slice(&usecs.to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(data);
    }
    out
}
