//! Transport demultiplexing and payload classification.

use super::layers::Layer;
use super::tcp_assembly::{AssembledMessage, FlowKey};
use super::Decoder;
use crate::config::Mode;
use crate::protocol::dns::answer_summary;
use crate::protocol::find_bytes;
use crate::protocol::ip_proto;
use crate::protocol::rtp::describe_rtp;
use crate::protocol::sctp::chunk;
use crate::record::{self, ProtoType, Record};
use std::net::IpAddr;
use std::time::SystemTime;
use tracing::{debug, warn};

/// Shortest UDP payload worth classifying
pub const MIN_UDP_PAYLOAD: usize = 16;
/// Destination port of syslog lines in `siplog` mode
pub const SYSLOG_PORT: u16 = 514;

/// RTCP sender report, receiver report, extended report
const RTCP_TYPES: [u8; 3] = [200, 201, 207];

/// Network layer facts every record inherits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpContext {
    pub version: u8,
    pub protocol: u8,
    pub src: IpAddr,
    pub dst: IpAddr,
}

/// Transport fields gathered while walking the layers
#[derive(Debug, Default)]
struct Fields<'p> {
    sport: u16,
    dport: u16,
    vlan: u16,
    payload: &'p [u8],
}

impl Decoder {
    /// Classify the layers that follow one IP header. Enqueues at most one
    /// record.
    pub(super) fn demux(&self, layers: &[Layer<'_>], ctx: IpContext, ts: SystemTime) {
        if self.filter.has_src_addrs() && self.filter.discards_src(&ctx.src) {
            return;
        }

        let mut fields = Fields::default();

        for layer in layers {
            match *layer {
                Layer::Vlan(vlan) => fields.vlan = vlan.vid(),
                Layer::Udp(udp) => {
                    let payload = udp.payload();
                    if payload.len() < MIN_UDP_PAYLOAD {
                        warn!(
                            len = payload.len(),
                            src = %ctx.src,
                            dst = %ctx.dst,
                            "received too small UDP packet"
                        );
                        return;
                    }
                    fields.sport = udp.src_port();
                    fields.dport = udp.dst_port();
                    fields.payload = payload;
                    self.stats.udp.inc();

                    if self.mode == Mode::SipLog && fields.dport == SYSLOG_PORT {
                        let (proto_type, cid) = self.correlator.correlate_log(payload);
                        if let Some(cid) = cid.filter(|c| !c.is_empty()) {
                            if proto_type.is_known() {
                                self.emit(ctx, &fields, proto_type, payload.to_vec(), cid, ts);
                            }
                        }
                        return;
                    }

                    if self.mode != Mode::Sip {
                        if payload[0] >> 6 == 2 {
                            let (sport, dport) = (fields.sport, fields.dport);
                            if RTCP_TYPES.contains(&payload[1]) && sport % 2 == 1 && dport % 2 == 1
                            {
                                self.handle_rtcp(ctx, &fields, ts);
                                return;
                            }
                            if sport % 2 == 0 && dport % 2 == 0 {
                                if self.mode == Mode::SipRtp {
                                    debug!(rtp = %describe_rtp(payload), "RTP");
                                }
                                return;
                            }
                        }
                        self.correlator.extract_correlation_id(
                            ctx.src,
                            fields.sport,
                            ctx.dst,
                            fields.dport,
                            payload,
                        );
                    }
                }
                Layer::Tcp(tcp) => {
                    fields.sport = tcp.src_port();
                    fields.dport = tcp.dst_port();
                    fields.payload = tcp.payload();
                    self.stats.tcp.inc();

                    if let Some(assembler) = &self.tcp {
                        let key = FlowKey {
                            src: ctx.src,
                            sport: fields.sport,
                            dst: ctx.dst,
                            dport: fields.dport,
                        };
                        let messages = assembler.assemble(
                            key,
                            fields.vlan,
                            tcp.seq_num(),
                            tcp.flags(),
                            fields.payload,
                            ts,
                        );
                        for message in messages {
                            self.classify_assembled(message);
                        }
                        return;
                    }
                    self.correlator.extract_correlation_id(
                        ctx.src,
                        fields.sport,
                        ctx.dst,
                        fields.dport,
                        fields.payload,
                    );
                }
                Layer::Sctp(sctp) => {
                    fields.sport = sctp.src_port();
                    fields.dport = sctp.dst_port();
                    self.stats.sctp.inc();

                    let data = sctp.payload();
                    fields.payload = match data.get(8) {
                        Some(&chunk::DATA) if data.len() > 16 => &data[16..],
                        Some(&chunk::I_DATA) if data.len() > 20 => &data[20..],
                        _ => &[],
                    };
                    self.correlator.extract_correlation_id(
                        ctx.src,
                        fields.sport,
                        ctx.dst,
                        fields.dport,
                        fields.payload,
                    );
                }
                Layer::Dns(dns) if self.mode == Mode::SipDns => {
                    match answer_summary(dns.as_bytes()) {
                        Ok(summary) => {
                            self.stats.dns.inc();
                            self.emit(ctx, &fields, ProtoType::Dns, summary, Vec::new(), ts);
                        }
                        Err(err) => {
                            warn!(
                                error = %err,
                                src = %ctx.src,
                                dst = %ctx.dst,
                                "DNS decode failed"
                            );
                        }
                    }
                    return;
                }
                _ => {}
            }
        }

        self.classify_sip(ctx, &fields, ts);
    }

    fn handle_rtcp(&self, ctx: IpContext, fields: &Fields<'_>, ts: SystemTime) {
        match self.correlator.correlate_rtcp(
            ctx.src,
            fields.sport,
            ctx.dst,
            fields.dport,
            fields.payload,
        ) {
            Some((payload, cid)) => {
                self.stats.rtcp.inc();
                self.emit(ctx, fields, ProtoType::Rtcp, payload, cid, ts);
            }
            None => self.stats.rtcp_fail.inc(),
        }
    }

    /// SIP is recognized by its CSeq header. Anything in front of a `Sip0`
    /// marker ahead of it is stripped.
    fn classify_sip(&self, ctx: IpContext, fields: &Fields<'_>, ts: SystemTime) {
        let payload = fields.payload;
        let Some(pos) = find_bytes(payload, b"CSeq").or_else(|| find_bytes(payload, b"Cseq"))
        else {
            self.stats.unknown.inc();
            return;
        };

        let mut body = payload;
        if pos > 16 {
            if let Some(start) = find_bytes(&payload[..pos], b"Sip0") {
                body = &payload[start + 4..];
            }
        }

        if body.is_empty() {
            self.stats.unknown.inc();
            return;
        }
        self.emit(ctx, fields, ProtoType::Sip, body.to_vec(), Vec::new(), ts);
    }

    pub(super) fn classify_assembled(&self, message: AssembledMessage) {
        let version = if message.key.src.is_ipv4() {
            record::version::IPV4
        } else {
            record::version::IPV6
        };
        let ctx = IpContext {
            version,
            protocol: ip_proto::TCP,
            src: message.key.src,
            dst: message.key.dst,
        };
        let fields = Fields {
            sport: message.key.sport,
            dport: message.key.dport,
            vlan: message.vlan,
            payload: &message.payload,
        };
        self.correlator.extract_correlation_id(
            ctx.src,
            fields.sport,
            ctx.dst,
            fields.dport,
            fields.payload,
        );
        self.classify_sip(ctx, &fields, message.ts);
    }

    fn emit(
        &self,
        ctx: IpContext,
        fields: &Fields<'_>,
        proto_type: ProtoType,
        payload: Vec<u8>,
        cid: Vec<u8>,
        ts: SystemTime,
    ) {
        let mut record = Record::new(ctx.version, ctx.protocol, ctx.src, ctx.dst, ts);
        record.src_port = fields.sport;
        record.dst_port = fields.dport;
        record.vlan = fields.vlan;
        record.proto_type = proto_type;
        record.payload = payload;
        record.cid = cid;
        self.sender.enqueue(record);
    }
}
