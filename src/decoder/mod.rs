//! Frame decoder: unwraps tunnels and fragments, then classifies payloads
//! into records on the output queue.

mod dedup;
mod defrag;
mod filter;
mod layers;
pub mod maintenance;
mod tcp_assembly;
mod transport;

pub use dedup::DedupCache;
pub use defrag::{Datagram, DefragError, Ipv4Defragmenter, Ipv6Defragmenter, Reassembler};
pub use filter::DiscardFilter;
pub use layers::{decode_chain, Layer, LayerChain, Start};
pub use tcp_assembly::{AssembledMessage, FlowKey, TcpAssembler};
pub use transport::IpContext;

use crate::config::{Config, Mode};
use crate::correlation::Correlator;
use crate::protocol::ipv4::Ipv4Header;
use crate::protocol::ipv6::Ipv6Header;
use crate::queue::RecordSender;
use crate::record::{version, Record};
use crate::telemetry::DecoderStats;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Deepest tunnel nesting unwrapped before a frame is dropped
pub const MAX_TUNNEL_DEPTH: usize = 4;

/// Frames shorter than this are never fingerprinted
const DEDUP_OFFSET: usize = 34;

/// Decode state shared by every capture source.
pub struct Decoder {
    mode: Mode,
    erspan: bool,
    start: Start,
    dedup: Option<DedupCache>,
    filter: DiscardFilter,
    defrag4: Ipv4Defragmenter,
    defrag6: Ipv6Defragmenter,
    tcp: Option<TcpAssembler>,
    correlator: Arc<dyn Correlator>,
    sender: RecordSender,
    stats: DecoderStats,
    /// Newest capture timestamp seen, microseconds since the epoch
    clock: AtomicU64,
}

impl Decoder {
    pub fn new(config: &Config, sender: RecordSender, correlator: Arc<dyn Correlator>) -> Self {
        let decoder = &config.decoder;
        Self {
            mode: decoder.mode,
            erspan: decoder.erspan,
            start: decoder.link_type.into(),
            dedup: decoder
                .dedup
                .then(|| DedupCache::new(config.dedup.ttl(), config.dedup.capacity_bytes)),
            filter: DiscardFilter::from_config(decoder),
            defrag4: Ipv4Defragmenter::new(),
            defrag6: Ipv6Defragmenter::new(),
            tcp: decoder.reassembly.then(TcpAssembler::new),
            correlator,
            sender,
            stats: DecoderStats::new(),
            clock: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> &DecoderStats {
        &self.stats
    }

    pub fn correlator(&self) -> &Arc<dyn Correlator> {
        &self.correlator
    }

    /// Newest capture timestamp processed so far. Maintenance ages state
    /// against this clock so replayed captures behave like live ones.
    pub fn capture_clock(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_micros(self.clock.load(Ordering::Relaxed))
    }

    fn observe(&self, ts: SystemTime) {
        let micros = ts
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);
        self.clock.fetch_max(micros, Ordering::Relaxed);
    }

    /// Pass an already encapsulated HEP frame straight to the queue
    pub fn process_hep(&self, data: &[u8], ts: SystemTime) {
        self.observe(ts);
        self.stats.hep.inc();
        self.sender.enqueue(Record::hep(data, ts));
    }

    /// Decode one captured frame. Produces zero or one record.
    pub fn process(&self, frame: &[u8], ts: SystemTime) {
        self.observe(ts);

        if let Some(dedup) = &self.dedup {
            if frame.len() > DEDUP_OFFSET
                && dedup.check_and_remember(&frame[DEDUP_OFFSET..], ts)
            {
                self.stats.duplicates.inc();
                return;
            }
        }

        if self.filter.has_methods() {
            if let Some(method) = self.correlator.extract_method(frame) {
                if self.filter.discards_method(method) {
                    return;
                }
            }
        }

        self.dispatch(decode_chain(self.start, frame), ts);
    }

    fn dispatch(&self, mut chain: LayerChain<'_>, ts: SystemTime) {
        let mut i = chain
            .iter()
            .rposition(|layer| matches!(layer, Layer::Vxlan(_)))
            .unwrap_or(0);
        let mut depth = 0;
        let mut rescanned = false;

        while i < chain.len() {
            let layer = chain[i];
            match layer {
                Layer::Gre(gre) => {
                    depth += 1;
                    if depth > MAX_TUNNEL_DEPTH {
                        warn!(depth, "tunnel nesting too deep, dropping frame");
                        return;
                    }
                    let Some(inner) = self.unwrap_gre(gre.protocol(), gre.payload()) else {
                        return;
                    };
                    chain = inner;
                    // Only the first tunnel restarts the scan
                    if rescanned {
                        i += 1;
                    } else {
                        rescanned = true;
                        i = 0;
                    }
                    continue;
                }
                Layer::Ipv4(ip) => {
                    if carries_tunnel(&chain, i) {
                        i += 1;
                        continue;
                    }
                    self.stats.ipv4.inc();
                    self.handle_ipv4(&chain, i, ip, ts);
                    return;
                }
                Layer::Ipv6(ip) => {
                    if carries_tunnel(&chain, i) {
                        i += 1;
                        continue;
                    }
                    self.stats.ipv6.inc();
                    self.handle_ipv6(&chain, i, ip, ts);
                    return;
                }
                _ => i += 1,
            }
        }
    }

    /// Layers following a GRE header. ERSPAN payloads start with their own
    /// header in front of the mirrored Ethernet frame.
    fn unwrap_gre<'a>(&self, protocol: u16, payload: &'a [u8]) -> Option<LayerChain<'a>> {
        if !self.erspan {
            let start = match protocol {
                0x6558 => Start::Ethernet,
                0x0800 => Start::Ipv4,
                0x86DD => Start::Ipv6,
                other => {
                    debug!(protocol = format_args!("{other:#06x}"), "unhandled GRE payload");
                    return None;
                }
            };
            return Some(decode_chain(start, payload));
        }

        let offset = erspan_offset(payload)?;
        Some(decode_chain(Start::Ethernet, &payload[offset..]))
    }

    fn handle_ipv4(&self, chain: &LayerChain<'_>, idx: usize, ip: Ipv4Header<'_>, ts: SystemTime) {
        let ctx = IpContext {
            version: version::IPV4,
            protocol: ip.protocol(),
            src: ip.src_addr().into(),
            dst: ip.dst_addr().into(),
        };

        if !ip.needs_reassembly() {
            self.demux(&scoped(chain, idx), ctx, ts);
            return;
        }

        match self.defrag4.defrag(&ip, ts) {
            Err(err) => {
                warn!(error = %err, src = %ctx.src, dst = %ctx.dst, "IPv4 reassembly failed");
            }
            Ok(None) => self.stats.fragments.inc(),
            Ok(Some(dgram)) if dgram.total_length == ip.total_length() as usize => {
                self.demux(&scoped(chain, idx), ctx, ts);
            }
            Ok(Some(dgram)) => self.demux_reassembled(chain, idx, &dgram, ctx, ts),
        }
    }

    fn handle_ipv6(&self, chain: &LayerChain<'_>, idx: usize, ip: Ipv6Header<'_>, ts: SystemTime) {
        let (protocol, _) = ip.upper_layer();
        let mut ctx = IpContext {
            version: version::IPV6,
            protocol,
            src: ip.src_addr().into(),
            dst: ip.dst_addr().into(),
        };

        if ip.fragment().is_none() {
            self.demux(&scoped(chain, idx), ctx, ts);
            return;
        }

        match self.defrag6.defrag(&ip, ts) {
            Err(err) => {
                warn!(error = %err, src = %ctx.src, dst = %ctx.dst, "IPv6 reassembly failed");
            }
            Ok(None) => self.stats.fragments.inc(),
            Ok(Some(dgram)) => {
                ctx.protocol = dgram.protocol;
                if dgram.total_length == ip.payload_length() as usize {
                    self.demux(&scoped(chain, idx), ctx, ts);
                } else {
                    self.demux_reassembled(chain, idx, &dgram, ctx, ts);
                }
            }
        }
    }

    /// Only UDP and TCP are decoded out of a reassembled datagram.
    fn demux_reassembled(
        &self,
        chain: &LayerChain<'_>,
        idx: usize,
        dgram: &Datagram,
        ctx: IpContext,
        ts: SystemTime,
    ) {
        let Some(upper) = layers::decode_transport(dgram.protocol, &dgram.payload) else {
            warn!(
                protocol = dgram.protocol,
                src = %ctx.src,
                dst = %ctx.dst,
                "unsupported fragment layer"
            );
            return;
        };
        debug!(len = dgram.payload.len(), src = %ctx.src, "reassembled datagram");

        let mut layers: LayerChain<'_> = vlan_layers(&chain[..idx]).collect();
        layers.extend(upper);
        self.demux(&layers, ctx, ts);
    }

    /// Drop fragment sets untouched since `cutoff`. Returns how many went.
    pub fn discard_fragments_older_than(&self, cutoff: SystemTime) -> usize {
        self.defrag4.discard_older_than(cutoff) + self.defrag6.discard_older_than(cutoff)
    }

    pub fn pending_fragments(&self) -> usize {
        self.defrag4.pending() + self.defrag6.pending()
    }

    /// Expire dedup fingerprints against the capture clock
    pub fn purge_dedup(&self) {
        if let Some(dedup) = &self.dedup {
            dedup.purge_expired(self.capture_clock());
        }
    }

    /// Force out TCP data stuck behind gaps older than `gap_cutoff` and close
    /// connections idle since `idle_cutoff`.
    pub fn flush_tcp(&self, gap_cutoff: SystemTime, idle_cutoff: SystemTime) -> usize {
        let Some(assembler) = &self.tcp else {
            return 0;
        };
        let mut messages = assembler.flush_older_than(gap_cutoff);
        messages.extend(assembler.close_idle(idle_cutoff));
        let delivered = messages.len();
        for message in messages {
            self.classify_assembled(message);
        }
        delivered
    }

    /// Deliver everything the TCP assembler still holds. Called once the
    /// capture source is exhausted.
    pub fn finish(&self) -> usize {
        let end = self.capture_clock() + Duration::from_micros(1);
        self.flush_tcp(end, end)
    }
}

impl std::fmt::Debug for Decoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decoder")
            .field("mode", &self.mode)
            .field("erspan", &self.erspan)
            .field("start", &self.start)
            .field("dedup", &self.dedup.is_some())
            .field("reassembly", &self.tcp.is_some())
            .finish_non_exhaustive()
    }
}

/// An IP header immediately followed by GRE only carries the tunnel.
fn carries_tunnel(chain: &LayerChain<'_>, idx: usize) -> bool {
    matches!(chain.get(idx + 1), Some(Layer::Gre(_)))
}

fn vlan_layers<'c, 'a>(layers: &'c [Layer<'a>]) -> impl Iterator<Item = Layer<'a>> + 'c {
    layers
        .iter()
        .filter(|layer| matches!(layer, Layer::Vlan(_)))
        .copied()
}

/// VLAN tags in front of the IP header plus everything after it
fn scoped<'a>(chain: &LayerChain<'a>, idx: usize) -> LayerChain<'a> {
    let mut layers: LayerChain<'a> = vlan_layers(&chain[..idx]).collect();
    layers.extend(chain[idx + 1..].iter().copied());
    layers
}

/// Where the mirrored frame starts inside an ERSPAN payload
fn erspan_offset(payload: &[u8]) -> Option<usize> {
    let version = payload.first()? >> 4;
    match version {
        1 if payload.len() > 8 => Some(8),
        2 if payload.len() > 12 => {
            // Optional platform specific subheader
            if payload[11] & 0x01 != 0 && payload.len() > 20 {
                Some(20)
            } else {
                Some(12)
            }
        }
        _ => None,
    }
}
