//! TCP stream reassembly for SIP over TCP.
//!
//! Each direction of a connection is tracked on its own. Contiguous bytes
//! are appended to a stream buffer from which complete SIP messages (header
//! block plus `Content-Length` body) are cut.

use crate::protocol::find_bytes;
use crate::protocol::tcp::TcpFlags;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, SystemTime};
use tracing::debug;

/// Out-of-order segments buffered per connection
pub const MAX_PENDING_PER_CONN: usize = 16;
/// Out-of-order segments buffered across all connections
pub const MAX_PENDING_TOTAL: usize = 4096;
/// Stream bytes kept while waiting for a message boundary
pub const MAX_STREAM_BYTES: usize = 64 * 1024;
/// Connections without traffic for this long are closed by maintenance
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub src: IpAddr,
    pub sport: u16,
    pub dst: IpAddr,
    pub dport: u16,
}

/// One message cut out of a reassembled stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledMessage {
    pub key: FlowKey,
    pub vlan: u16,
    pub payload: Vec<u8>,
    pub ts: SystemTime,
}

#[derive(Debug)]
struct Pending {
    seq: u32,
    data: Vec<u8>,
    seen: SystemTime,
}

#[derive(Debug)]
struct Connection {
    next_seq: Option<u32>,
    /// Sorted by sequence number
    pending: Vec<Pending>,
    stream: Vec<u8>,
    last_seen: SystemTime,
    vlan: u16,
}

impl Connection {
    fn new(vlan: u16, ts: SystemTime) -> Self {
        Self {
            next_seq: None,
            pending: Vec::new(),
            stream: Vec::new(),
            last_seen: ts,
            vlan,
        }
    }
}

#[derive(Debug, Default)]
struct AssemblerState {
    conns: HashMap<FlowKey, Connection>,
    buffered_total: usize,
}

/// `a` comes strictly before `b` in sequence space
fn seq_before(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) < 0
}

#[derive(Debug, Default)]
pub struct TcpAssembler {
    state: Mutex<AssemblerState>,
}

impl TcpAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connections(&self) -> usize {
        self.state.lock().conns.len()
    }

    pub fn buffered_segments(&self) -> usize {
        self.state.lock().buffered_total
    }

    /// Feed one segment. Returns any messages it completed.
    pub fn assemble(
        &self,
        key: FlowKey,
        vlan: u16,
        seq: u32,
        flags: TcpFlags,
        payload: &[u8],
        ts: SystemTime,
    ) -> Vec<AssembledMessage> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let conn = state
            .conns
            .entry(key)
            .or_insert_with(|| Connection::new(vlan, ts));
        conn.last_seen = ts;
        conn.vlan = vlan;

        let data_seq = if flags.syn {
            let start = seq.wrapping_add(1);
            conn.next_seq = Some(start);
            start
        } else {
            seq
        };
        // Picked up mid-stream: trust the first segment seen
        let next = *conn.next_seq.get_or_insert(data_seq);

        if !payload.is_empty() {
            accept(
                conn,
                &mut state.buffered_total,
                next,
                data_seq,
                payload,
                ts,
            );
        }

        let mut out = Vec::new();
        split_messages(key, conn, ts, &mut out);

        if flags.is_closing() {
            if let Some(mut conn) = state.conns.remove(&key) {
                state.buffered_total -= conn.pending.len();
                skip_gaps(&mut conn);
                split_messages(key, &mut conn, ts, &mut out);
                finish(key, conn, ts, &mut out);
            }
        }
        out
    }

    /// Deliver buffered segments older than `cutoff`, skipping the gaps in
    /// front of them.
    pub fn flush_older_than(&self, cutoff: SystemTime) -> Vec<AssembledMessage> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let mut out = Vec::new();

        for (key, conn) in state.conns.iter_mut() {
            let stale = conn.pending.first().is_some_and(|p| p.seen < cutoff);
            if !stale {
                continue;
            }
            debug!(
                src = %key.src,
                sport = key.sport,
                skipped = conn.pending.len(),
                "flushing TCP gap"
            );
            state.buffered_total -= conn.pending.len();
            skip_gaps(conn);
            let ts = conn.last_seen;
            split_messages(*key, conn, ts, &mut out);
        }
        out
    }

    /// Close connections idle since before `cutoff`, delivering what they hold.
    pub fn close_idle(&self, cutoff: SystemTime) -> Vec<AssembledMessage> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let idle: Vec<FlowKey> = state
            .conns
            .iter()
            .filter(|(_, conn)| conn.last_seen < cutoff)
            .map(|(key, _)| *key)
            .collect();

        let mut out = Vec::new();
        for key in idle {
            if let Some(mut conn) = state.conns.remove(&key) {
                state.buffered_total -= conn.pending.len();
                skip_gaps(&mut conn);
                let ts = conn.last_seen;
                split_messages(key, &mut conn, ts, &mut out);
                finish(key, conn, ts, &mut out);
            }
        }
        out
    }
}

fn accept(
    conn: &mut Connection,
    buffered_total: &mut usize,
    next: u32,
    data_seq: u32,
    payload: &[u8],
    ts: SystemTime,
) {
    let end = data_seq.wrapping_add(payload.len() as u32);
    if !seq_before(next, end) {
        // Entirely retransmitted
        return;
    }

    if !seq_before(next, data_seq) {
        let skip = next.wrapping_sub(data_seq) as usize;
        conn.stream.extend_from_slice(&payload[skip..]);
        conn.next_seq = Some(end);
        *buffered_total -= drain_pending(conn);
        return;
    }

    let pos = conn
        .pending
        .iter()
        .position(|p| seq_before(data_seq, p.seq))
        .unwrap_or(conn.pending.len());
    conn.pending.insert(
        pos,
        Pending {
            seq: data_seq,
            data: payload.to_vec(),
            seen: ts,
        },
    );
    *buffered_total += 1;

    if conn.pending.len() > MAX_PENDING_PER_CONN || *buffered_total > MAX_PENDING_TOTAL {
        debug!(pending = conn.pending.len(), "TCP buffer budget exceeded, skipping gap");
        *buffered_total -= conn.pending.len();
        skip_gaps(conn);
    }
}

/// Move now-contiguous pending segments into the stream. Returns how many
/// segments left the buffer.
fn drain_pending(conn: &mut Connection) -> usize {
    let mut removed = 0;
    while let (Some(next), Some(first)) = (conn.next_seq, conn.pending.first()) {
        if seq_before(next, first.seq) {
            break;
        }
        let seg = conn.pending.remove(0);
        removed += 1;
        let end = seg.seq.wrapping_add(seg.data.len() as u32);
        if seq_before(next, end) {
            let skip = next.wrapping_sub(seg.seq) as usize;
            conn.stream.extend_from_slice(&seg.data[skip..]);
            conn.next_seq = Some(end);
        }
    }
    removed
}

/// Deliver every pending segment in order regardless of holes. The caller
/// has already taken them out of the global count.
fn skip_gaps(conn: &mut Connection) {
    while let Some(first) = conn.pending.first() {
        let next = conn.next_seq.unwrap_or(first.seq);
        if seq_before(next, first.seq) {
            conn.next_seq = Some(first.seq);
        }
        drain_pending(conn);
    }
}

fn content_length(headers: &[u8]) -> usize {
    headers
        .split(|b| *b == b'\n')
        .find_map(|line| {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            let colon = line.iter().position(|b| *b == b':')?;
            let name = line[..colon].trim_ascii();
            if !name.eq_ignore_ascii_case(b"Content-Length") && !name.eq_ignore_ascii_case(b"l") {
                return None;
            }
            std::str::from_utf8(line[colon + 1..].trim_ascii())
                .ok()?
                .parse()
                .ok()
        })
        .unwrap_or(0)
}

fn split_messages(
    key: FlowKey,
    conn: &mut Connection,
    ts: SystemTime,
    out: &mut Vec<AssembledMessage>,
) {
    loop {
        // CRLF keepalives between messages
        let lead = conn
            .stream
            .iter()
            .take_while(|b| **b == b'\r' || **b == b'\n')
            .count();
        conn.stream.drain(..lead);

        let Some(head_end) = find_bytes(&conn.stream, b"\r\n\r\n") else {
            break;
        };
        // The body has to fit the stream buffer
        let body = content_length(&conn.stream[..head_end]);
        if body > MAX_STREAM_BYTES {
            debug!(
                src = %key.src,
                sport = key.sport,
                content_length = body,
                "dropping TCP stream with oversized body"
            );
            conn.stream.clear();
            break;
        }
        let total = head_end + 4 + body;
        if conn.stream.len() < total {
            break;
        }

        let payload: Vec<u8> = conn.stream.drain(..total).collect();
        out.push(AssembledMessage {
            key,
            vlan: conn.vlan,
            payload,
            ts,
        });
    }

    if conn.stream.len() > MAX_STREAM_BYTES {
        debug!(
            src = %key.src,
            sport = key.sport,
            bytes = conn.stream.len(),
            "discarding unframed TCP stream data"
        );
        conn.stream.clear();
    }
}

/// Hand over whatever is left of a closing connection
fn finish(key: FlowKey, conn: Connection, ts: SystemTime, out: &mut Vec<AssembledMessage>) {
    if !conn.stream.is_empty() {
        out.push(AssembledMessage {
            key,
            vlan: conn.vlan,
            payload: conn.stream,
            ts,
        });
    }
}
