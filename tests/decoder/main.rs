//! Decoder tests driven through the public API
//!
//! Run with: cargo test --test decoder

mod frames;

use frames::*;
use heptap::capture::{self, FrameSource, PcapReplay};
use heptap::config::{DecoderConfig, LinkType, Mode};
use heptap::protocol::dns::{DnsBuilder, DnsType};
use heptap::protocol::ip_proto;
use heptap::protocol::ipv6::fragment_header;
use heptap::protocol::sctp::chunk;
use heptap::record::{version, ProtoType};
use std::io::Cursor;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::{Duration, UNIX_EPOCH};

fn addr(s: &str) -> IpAddr {
    s.parse().unwrap()
}

#[test]
fn test_plain_sip_over_udp() {
    let (decoder, rx) = decoder(DecoderConfig::default());
    let ts = UNIX_EPOCH + Duration::new(1_700_000_000, 250_000_000);
    decoder.process(&sip_udp(5060, 5062, INVITE), ts);

    let record = rx.try_recv().unwrap();
    assert_eq!(record.version, version::IPV4);
    assert_eq!(record.protocol, ip_proto::UDP);
    assert_eq!(record.src_ip, IpAddr::V4(CLIENT));
    assert_eq!(record.dst_ip, IpAddr::V4(SERVER));
    assert_eq!((record.src_port, record.dst_port), (5060, 5062));
    assert_eq!(record.proto_type, ProtoType::Sip);
    assert_eq!(record.payload, INVITE);
    assert_eq!((record.tsec, record.tmsec), (1_700_000_000, 250_000));
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_vlan_tag_propagates() {
    let (decoder, rx) = decoder(DecoderConfig::default());
    let ip = ipv4(CLIENT, SERVER, ip_proto::UDP, &udp(5060, 5060, OPTIONS));
    decoder.process(&eth_vlan(100, 0x0800, &ip), UNIX_EPOCH);

    let record = rx.try_recv().unwrap();
    assert_eq!(record.vlan, 100);
    assert_eq!(record.proto_type, ProtoType::Sip);
}

#[test]
fn test_linux_cooked_capture() {
    let (decoder, rx) = decoder(DecoderConfig {
        link_type: LinkType::LinuxSll,
        ..Default::default()
    });
    let mut frame = vec![0x00, 0x00, 0x00, 0x01, 0x00, 0x06];
    frame.extend_from_slice(&[0x02, 0, 0, 0, 0, 0x01, 0, 0]);
    frame.extend_from_slice(&0x0800u16.to_be_bytes());
    frame.extend_from_slice(&ipv4(CLIENT, SERVER, ip_proto::UDP, &udp(5060, 5060, INVITE)));
    decoder.process(&frame, UNIX_EPOCH);

    assert_eq!(rx.try_recv().unwrap().proto_type, ProtoType::Sip);
}

#[test]
fn test_vxlan_inner_frame() {
    let (decoder, rx) = decoder(DecoderConfig::default());
    let inner = eth_vlan(
        7,
        0x0800,
        &ipv4(CLIENT, SERVER, ip_proto::UDP, &udp(5060, 5060, INVITE)),
    );
    let mut vxlan = vec![0x08, 0, 0, 0, 0, 0, 0x2a, 0];
    vxlan.extend_from_slice(&inner);
    let outer = ipv4(
        Ipv4Addr::new(172, 16, 0, 1),
        Ipv4Addr::new(172, 16, 0, 2),
        ip_proto::UDP,
        &udp(49152, 4789, &vxlan),
    );
    decoder.process(&eth(0x0800, &outer), UNIX_EPOCH);

    let record = rx.try_recv().unwrap();
    assert_eq!(record.src_ip, IpAddr::V4(CLIENT));
    assert_eq!(record.vlan, 7);
    assert_eq!(record.payload, INVITE);
    assert_eq!(decoder.stats().ipv4.get(), 1);
}

#[test]
fn test_erspan_v2_with_subheader() {
    let (decoder, rx) = decoder(DecoderConfig {
        erspan: true,
        ..Default::default()
    });
    let mut erspan = vec![0u8; 20];
    erspan[0] = 0x20;
    erspan[11] = 0x01;
    erspan.extend_from_slice(&sip_udp(5060, 5060, INVITE));
    decoder.process(&eth(0x0800, &gre(0x22EB, &erspan)), UNIX_EPOCH);

    let record = rx.try_recv().unwrap();
    assert_eq!(record.src_ip, IpAddr::V4(CLIENT));
    assert_eq!(record.proto_type, ProtoType::Sip);
}

#[test]
fn test_gre_without_erspan_flag() {
    let (decoder, rx) = decoder(DecoderConfig::default());
    let inner = ipv4(CLIENT, SERVER, ip_proto::UDP, &udp(5060, 5060, INVITE));
    decoder.process(&eth(0x0800, &gre(0x0800, &inner)), UNIX_EPOCH);

    assert_eq!(rx.try_recv().unwrap().src_ip, IpAddr::V4(CLIENT));
}

#[test]
fn test_ipv4_fragments_reassembled() {
    let (decoder, rx) = decoder(DecoderConfig::default());
    let datagram = udp(5060, 5060, INVITE);
    let (head, tail) = datagram.split_at(24);

    // Tail first: order of arrival does not matter
    decoder.process(&eth(0x0800, &ipv4_fragment(77, 3, false, tail)), UNIX_EPOCH);
    assert!(rx.try_recv().is_err());
    assert_eq!(decoder.pending_fragments(), 1);

    decoder.process(&eth(0x0800, &ipv4_fragment(77, 0, true, head)), UNIX_EPOCH);
    let record = rx.try_recv().unwrap();
    assert_eq!(record.payload, INVITE);
    assert_eq!(record.src_ip, IpAddr::V4(CLIENT));
    assert_eq!((record.src_port, record.dst_port), (5060, 5060));
    assert_eq!(decoder.pending_fragments(), 0);
    assert_eq!(decoder.stats().fragments.get(), 1);
}

#[test]
fn test_ipv4_overlapping_fragment_drops_set() {
    let (decoder, rx) = decoder(DecoderConfig::default());
    let datagram = udp(5060, 5060, INVITE);

    decoder.process(&eth(0x0800, &ipv4_fragment(5, 0, true, &datagram[..24])), UNIX_EPOCH);
    // Same offset, different bytes
    let rewritten = vec![0xee; 24];
    decoder.process(&eth(0x0800, &ipv4_fragment(5, 0, true, &rewritten)), UNIX_EPOCH);

    assert_eq!(decoder.pending_fragments(), 0);
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_ipv6_sip() {
    let (decoder, rx) = decoder(DecoderConfig::default());
    let src: Ipv6Addr = "2001:db8::1".parse().unwrap();
    let dst: Ipv6Addr = "2001:db8::2".parse().unwrap();
    let ip = ipv6(src, dst, ip_proto::UDP, &udp(5060, 5060, INVITE));
    decoder.process(&eth(0x86DD, &ip), UNIX_EPOCH);

    let record = rx.try_recv().unwrap();
    assert_eq!(record.version, version::IPV6);
    assert_eq!(record.src_ip, IpAddr::V6(src));
    assert_eq!(record.protocol, ip_proto::UDP);
    assert_eq!(decoder.stats().ipv6.get(), 1);
}

#[test]
fn test_ipv6_fragments_reassembled() {
    let (decoder, rx) = decoder(DecoderConfig::default());
    let src: Ipv6Addr = "2001:db8::1".parse().unwrap();
    let dst: Ipv6Addr = "2001:db8::2".parse().unwrap();
    let datagram = udp(5060, 5060, OPTIONS);
    let (head, tail) = datagram.split_at(32);

    let fragment = |offset_units: u16, more: bool, data: &[u8]| {
        let mut payload = fragment_header(ip_proto::UDP, offset_units, more, 0xabcd).to_vec();
        payload.extend_from_slice(data);
        eth(0x86DD, &ipv6(src, dst, ip_proto::FRAGMENT, &payload))
    };

    decoder.process(&fragment(0, true, head), UNIX_EPOCH);
    assert!(rx.try_recv().is_err());
    decoder.process(&fragment(4, false, tail), UNIX_EPOCH);

    let record = rx.try_recv().unwrap();
    assert_eq!(record.version, version::IPV6);
    assert_eq!(record.protocol, ip_proto::UDP);
    assert_eq!(record.payload, OPTIONS);
}

#[test]
fn test_tiny_udp_payload_ignored() {
    let (decoder, rx) = decoder(DecoderConfig::default());
    decoder.process(&sip_udp(5060, 5060, b"CSeq: 1 A\r\n"), UNIX_EPOCH);
    assert!(rx.try_recv().is_err());
    assert_eq!(decoder.stats().udp.get(), 0);
}

#[test]
fn test_non_sip_payload_counted_unknown() {
    let (decoder, rx) = decoder(DecoderConfig::default());
    decoder.process(&sip_udp(5060, 5060, b"just some opaque application data"), UNIX_EPOCH);
    assert!(rx.try_recv().is_err());
    assert_eq!(decoder.stats().unknown.get(), 1);
}

#[test]
fn test_duplicate_frames_dropped() {
    let (decoder, rx) = decoder(DecoderConfig {
        dedup: true,
        ..Default::default()
    });
    let frame = sip_udp(5060, 5060, INVITE);
    decoder.process(&frame, UNIX_EPOCH);
    decoder.process(&frame, UNIX_EPOCH);
    // Different payload, different fingerprint
    decoder.process(&sip_udp(5060, 5060, OPTIONS), UNIX_EPOCH);

    assert_eq!(rx.try_iter().count(), 2);
    assert_eq!(decoder.stats().duplicates.get(), 1);
}

#[test]
fn test_duplicate_window_follows_capture_time() {
    let (decoder, rx) = decoder(DecoderConfig {
        dedup: true,
        ..Default::default()
    });
    let frame = sip_udp(5060, 5060, INVITE);
    decoder.process(&frame, UNIX_EPOCH);
    decoder.process(&frame, UNIX_EPOCH + Duration::from_millis(399));
    // A retransmission past the window is kept
    decoder.process(&frame, UNIX_EPOCH + Duration::from_millis(800));
    decoder.process(&frame, UNIX_EPOCH + Duration::from_secs(10));

    assert_eq!(rx.try_iter().count(), 3);
    assert_eq!(decoder.stats().duplicates.get(), 1);
}

#[test]
fn test_discarded_method() {
    let (decoder, rx) = decoder(DecoderConfig {
        discard_methods: "options, register".into(),
        ..Default::default()
    });
    decoder.process(&sip_udp(5060, 5060, OPTIONS), UNIX_EPOCH);
    decoder.process(&sip_udp(5060, 5060, INVITE), UNIX_EPOCH);

    let records: Vec<_> = rx.try_iter().collect();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].payload, INVITE);
}

#[test]
fn test_discarded_source_address() {
    let (decoder, rx) = decoder(DecoderConfig {
        discard_src_ips: "10.0.0.1, not-an-address".into(),
        ..Default::default()
    });
    decoder.process(&sip_udp(5060, 5060, INVITE), UNIX_EPOCH);
    assert!(rx.try_recv().is_err());

    let other = ipv4(
        Ipv4Addr::new(10, 0, 0, 3),
        SERVER,
        ip_proto::UDP,
        &udp(5060, 5060, INVITE),
    );
    decoder.process(&eth(0x0800, &other), UNIX_EPOCH);
    assert_eq!(rx.try_recv().unwrap().src_ip, addr("10.0.0.3"));
}

#[test]
fn test_leading_noise_before_sip0_marker_stripped() {
    let (decoder, rx) = decoder(DecoderConfig::default());
    let mut payload = b"vendor-prefix-bytes:Sip0".to_vec();
    payload.extend_from_slice(INVITE);
    decoder.process(&sip_udp(5060, 5060, &payload), UNIX_EPOCH);

    assert_eq!(rx.try_recv().unwrap().payload, INVITE);
}

const SDP_INVITE: &[u8] = b"INVITE sip:bob@b SIP/2.0\r\nCall-ID: 8a7b@host\r\nCSeq: 1 INVITE\r\nContent-Type: application/sdp\r\n\r\nv=0\r\nc=IN IP4 10.0.0.9\r\nm=audio 40000 RTP/AVP 0 8\r\n";

fn rtcp_frame(sport: u16, dport: u16) -> Vec<u8> {
    let mut report = vec![0x81, 200, 0x00, 0x06];
    report.extend_from_slice(&[0u8; 24]);
    let ip = ipv4(
        Ipv4Addr::new(10, 0, 0, 5),
        Ipv4Addr::new(10, 0, 0, 9),
        ip_proto::UDP,
        &udp(sport, dport, &report),
    );
    eth(0x0800, &ip)
}

#[test]
fn test_rtcp_correlated_to_call() {
    let (decoder, rx) = decoder(mode(Mode::SipRtp));
    decoder.process(&sip_udp(5060, 5060, SDP_INVITE), UNIX_EPOCH);
    assert_eq!(rx.try_recv().unwrap().proto_type, ProtoType::Sip);

    decoder.process(&rtcp_frame(30001, 40001), UNIX_EPOCH);
    let record = rx.try_recv().unwrap();
    assert_eq!(record.proto_type, ProtoType::Rtcp);
    assert_eq!(record.cid, b"8a7b@host");
    assert_eq!(record.payload.len(), 28);
    assert_eq!(decoder.stats().rtcp.get(), 1);
}

#[test]
fn test_rtcp_without_call() {
    let (decoder, rx) = decoder(mode(Mode::SipRtp));
    decoder.process(&rtcp_frame(30001, 40001), UNIX_EPOCH);

    assert!(rx.try_recv().is_err());
    assert_eq!(decoder.stats().rtcp_fail.get(), 1);
}

#[test]
fn test_rtcp_ignored_in_sip_mode() {
    let (decoder, rx) = decoder(DecoderConfig::default());
    decoder.process(&sip_udp(5060, 5060, SDP_INVITE), UNIX_EPOCH);
    rx.try_recv().unwrap();

    decoder.process(&rtcp_frame(30001, 40001), UNIX_EPOCH);
    assert!(rx.try_recv().is_err());
    assert_eq!(decoder.stats().rtcp.get(), 0);
}

#[test]
fn test_rtp_on_even_ports_dropped() {
    let (decoder, rx) = decoder(mode(Mode::SipRtp));
    let mut rtp = vec![0x80, 0x00, 0x12, 0x34, 0, 0, 0x01, 0x00, 0xde, 0xad, 0xbe, 0xef];
    rtp.extend_from_slice(&[0x55; 160]);
    decoder.process(&sip_udp(30000, 40000, &rtp), UNIX_EPOCH);

    assert!(rx.try_recv().is_err());
    assert_eq!(decoder.stats().unknown.get(), 0);
}

#[test]
fn test_sctp_data_chunk() {
    let (decoder, rx) = decoder(DecoderConfig::default());
    let mut chunks = vec![0u8; 16];
    chunks[8] = chunk::DATA;
    chunks.extend_from_slice(INVITE);
    let ip = ipv4(CLIENT, SERVER, ip_proto::SCTP, &sctp(5060, 5060, &chunks));
    decoder.process(&eth(0x0800, &ip), UNIX_EPOCH);

    let record = rx.try_recv().unwrap();
    assert_eq!(record.protocol, ip_proto::SCTP);
    assert_eq!(record.payload, INVITE);
    assert_eq!(decoder.stats().sctp.get(), 1);
}

#[test]
fn test_sctp_idata_chunk() {
    let (decoder, rx) = decoder(DecoderConfig::default());
    let mut chunks = vec![0u8; 20];
    chunks[8] = chunk::I_DATA;
    chunks.extend_from_slice(OPTIONS);
    let ip = ipv4(CLIENT, SERVER, ip_proto::SCTP, &sctp(5060, 5060, &chunks));
    decoder.process(&eth(0x0800, &ip), UNIX_EPOCH);

    assert_eq!(rx.try_recv().unwrap().payload, OPTIONS);
}

#[test]
fn test_sctp_other_chunk_yields_nothing() {
    let (decoder, rx) = decoder(DecoderConfig::default());
    let mut chunks = vec![0u8; 16];
    chunks[8] = 3;
    chunks.extend_from_slice(INVITE);
    let ip = ipv4(CLIENT, SERVER, ip_proto::SCTP, &sctp(5060, 5060, &chunks));
    decoder.process(&eth(0x0800, &ip), UNIX_EPOCH);

    assert!(rx.try_recv().is_err());
}

fn dns_response() -> Vec<u8> {
    DnsBuilder::new()
        .id(0x1234)
        .response()
        .add_question("sip.example.com", DnsType::A)
        .add_answer("sip.example.com", DnsType::A, 300, &[192, 0, 2, 10])
        .build()
}

#[test]
fn test_dns_summary_in_sipdns_mode() {
    let (decoder, rx) = decoder(mode(Mode::SipDns));
    decoder.process(&sip_udp(53, 40000, &dns_response()), UNIX_EPOCH);

    let record = rx.try_recv().unwrap();
    assert_eq!(record.proto_type, ProtoType::Dns);
    assert_eq!(record.src_port, 53);
    let summary: serde_json::Value = serde_json::from_slice(&record.payload).unwrap();
    assert_eq!(summary["id"], 0x1234);
    assert!(String::from_utf8_lossy(&record.payload).contains("sip.example.com"));
    assert_eq!(decoder.stats().dns.get(), 1);
}

#[test]
fn test_dns_ignored_in_sip_mode() {
    let (decoder, rx) = decoder(DecoderConfig::default());
    decoder.process(&sip_udp(53, 40000, &dns_response()), UNIX_EPOCH);
    assert!(rx.try_recv().is_err());
    assert_eq!(decoder.stats().dns.get(), 0);
}

#[test]
fn test_syslog_correlated_in_siplog_mode() {
    let (decoder, rx) = decoder(mode(Mode::SipLog));
    let line = b"<134>Jan  1 00:00:00 sbc: call ID=abc123@host state=up";
    decoder.process(&sip_udp(40000, 514, line), UNIX_EPOCH);

    let record = rx.try_recv().unwrap();
    assert_eq!(record.proto_type, ProtoType::Log);
    assert_eq!(record.cid, b"abc123@host");
    assert_eq!(record.payload, line);

    // No token, no record
    decoder.process(&sip_udp(40000, 514, b"<134>Jan  1 00:00:00 sbc: idle"), UNIX_EPOCH);
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_tcp_without_reassembly() {
    let (decoder, rx) = decoder(DecoderConfig::default());
    decoder.process(&tcp_segment(1, psh_ack(), INVITE), UNIX_EPOCH);

    let record = rx.try_recv().unwrap();
    assert_eq!(record.protocol, ip_proto::TCP);
    assert_eq!((record.src_port, record.dst_port), (40000, 5060));
}

#[test]
fn test_tcp_message_split_across_segments() {
    let (decoder, rx) = decoder(DecoderConfig {
        reassembly: true,
        ..Default::default()
    });
    let (first, second) = INVITE.split_at(30);

    decoder.process(&tcp_segment(1000, psh_ack(), first), UNIX_EPOCH);
    assert!(rx.try_recv().is_err());
    decoder.process(&tcp_segment(1030, psh_ack(), second), UNIX_EPOCH);

    let record = rx.try_recv().unwrap();
    assert_eq!(record.protocol, ip_proto::TCP);
    assert_eq!(record.version, version::IPV4);
    assert_eq!(record.payload, INVITE);
    assert_eq!((record.src_port, record.dst_port), (40000, 5060));
}

#[test]
fn test_rtcp_correlated_from_tcp_invite() {
    let (decoder, rx) = decoder(DecoderConfig {
        mode: Mode::SipRtp,
        reassembly: true,
        ..Default::default()
    });
    let invite = b"INVITE sip:bob@b SIP/2.0\r\nCall-ID: 8a7b@host\r\nCSeq: 1 INVITE\r\n\
                   Content-Type: application/sdp\r\nContent-Length: 51\r\n\r\n\
                   v=0\r\nc=IN IP4 10.0.0.9\r\nm=audio 40000 RTP/AVP 0 8\r\n";
    let (first, second) = invite.split_at(40);
    decoder.process(&tcp_segment(1, psh_ack(), first), UNIX_EPOCH);
    decoder.process(&tcp_segment(41, psh_ack(), second), UNIX_EPOCH);
    assert_eq!(rx.try_recv().unwrap().payload, invite.to_vec());

    decoder.process(&rtcp_frame(30001, 40001), UNIX_EPOCH);
    let record = rx.try_recv().unwrap();
    assert_eq!(record.proto_type, ProtoType::Rtcp);
    assert_eq!(record.cid, b"8a7b@host");
}

#[test]
fn test_tcp_gap_flushed_by_finish() {
    let (decoder, rx) = decoder(DecoderConfig {
        reassembly: true,
        ..Default::default()
    });
    let (first, second) = INVITE.split_at(20);
    decoder.process(&tcp_segment(5000, psh_ack(), first), UNIX_EPOCH);
    // A lost segment leaves ten bytes missing
    decoder.process(&tcp_segment(5030, psh_ack(), &second[10..]), UNIX_EPOCH);
    assert!(rx.try_recv().is_err());

    assert!(decoder.finish() >= 1);
    let record = rx.try_recv().unwrap();
    assert_eq!(record.proto_type, ProtoType::Sip);
}

#[test]
fn test_hep_passthrough() {
    let (decoder, rx) = decoder(DecoderConfig::default());
    let hep = b"HEP3\x00\x14\x00\x00\x00\x01\x00\x07\x02";
    decoder.process_hep(hep, UNIX_EPOCH + Duration::from_secs(5));

    let record = rx.try_recv().unwrap();
    assert!(record.is_hep());
    assert_eq!(record.payload, hep);
    assert_eq!(record.tsec, 5);
    assert_eq!(decoder.stats().hep.get(), 1);
}

#[test]
fn test_replay_pcap_through_decoder() {
    let (decoder, rx) = decoder(DecoderConfig::default());
    let invite = sip_udp(5060, 5060, INVITE);
    let options = sip_udp(5060, 5060, OPTIONS);
    let file = pcap_file(1, &[(100, 10, &invite), (101, 20, &options)]);

    let mut source = PcapReplay::new(Cursor::new(file)).unwrap();
    assert_eq!(source.link_type(), LinkType::Ethernet);
    let frames = capture::replay(&mut source, &decoder, false).unwrap();
    assert_eq!(frames, 2);

    let records: Vec<_> = rx.try_iter().collect();
    assert_eq!(records.len(), 2);
    assert_eq!((records[0].tsec, records[0].tmsec), (100, 10));
    assert_eq!(records[1].payload, OPTIONS);
    assert_eq!(
        decoder.capture_clock(),
        UNIX_EPOCH + Duration::new(101, 20_000)
    );
}

#[test]
fn test_replay_hep_capture() {
    let (decoder, rx) = decoder(DecoderConfig::default());
    let file = pcap_file(1, &[(1, 0, b"HEP3 opaque frame")]);
    let mut source = PcapReplay::new(Cursor::new(file)).unwrap();
    capture::replay(&mut source, &decoder, true).unwrap();

    assert!(rx.try_recv().unwrap().is_hep());
}
