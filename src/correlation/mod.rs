//! Payload correlation: ties RTCP and syslog traffic back to SIP calls.

mod sdp;

pub use sdp::SdpCorrelator;

use crate::protocol::find_bytes;
use crate::record::ProtoType;
use std::net::IpAddr;

/// Shortest token accepted as a log correlation ID
const MIN_LOG_ID_LEN: usize = 2;
/// Longest token accepted as a log correlation ID
const MAX_LOG_ID_LEN: usize = 80;

/// Hooks the decoder calls while classifying payloads.
pub trait Correlator: Send + Sync {
    /// SIP method named by the CSeq header of a raw frame
    fn extract_method<'a>(&self, frame: &'a [u8]) -> Option<&'a [u8]> {
        extract_cseq_method(frame)
    }

    /// Match an RTCP packet to a call. Returns the record payload and the
    /// correlation ID.
    fn correlate_rtcp(
        &self,
        src: IpAddr,
        sport: u16,
        dst: IpAddr,
        dport: u16,
        payload: &[u8],
    ) -> Option<(Vec<u8>, Vec<u8>)>;

    /// Pull a call identifier out of a syslog line
    fn correlate_log(&self, payload: &[u8]) -> (ProtoType, Option<Vec<u8>>) {
        match log_correlation_id(payload) {
            Some(id) => (ProtoType::Log, Some(id.to_vec())),
            None => (ProtoType::Unknown, None),
        }
    }

    /// Learn correlation state from a signaling payload
    fn extract_correlation_id(
        &self,
        src: IpAddr,
        sport: u16,
        dst: IpAddr,
        dport: u16,
        payload: &[u8],
    );

    /// Drop learned state that has outlived its TTL
    fn purge_expired(&self) {}
}

/// Method token after the CSeq sequence number, e.g. `INVITE` in
/// `CSeq: 1 INVITE`.
pub fn extract_cseq_method(frame: &[u8]) -> Option<&[u8]> {
    let pos = find_bytes(frame, b"CSeq:")?;
    let mut rest = &frame[pos + 5..];

    rest = trim_start(rest, |b| b == b' ' || b == b'\t');
    let digits = rest.iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    rest = trim_start(&rest[digits..], |b| b == b' ' || b == b'\t');

    let len = rest
        .iter()
        .take_while(|b| b.is_ascii_alphanumeric() || **b == b'_' || **b == b'-')
        .count();
    (len > 0).then(|| &rest[..len])
}

fn trim_start(data: &[u8], pred: impl Fn(u8) -> bool) -> &[u8] {
    let skip = data.iter().take_while(|b| pred(**b)).count();
    &data[skip..]
}

/// Correlation token of a syslog line: `ID=<token>` or `: [<token>` ending
/// at ` port ` or `]: `.
pub fn log_correlation_id(payload: &[u8]) -> Option<&[u8]> {
    if let Some(pos) = find_bytes(payload, b"ID=").filter(|p| *p > 0) {
        let rest = &payload[pos + 3..];
        let end = rest.iter().position(|b| b.is_ascii_whitespace()).unwrap_or(rest.len());
        let id = &rest[..end];
        return (!id.is_empty() && id.len() < MAX_LOG_ID_LEN).then_some(id);
    }

    let pos = find_bytes(payload, b": [").filter(|p| *p > 0)?;
    let rest = &payload[pos + 3..];
    let end = find_bytes(rest, b" port ").or_else(|| find_bytes(rest, b"]: "))?;
    let id = &rest[..end];
    (id.len() >= MIN_LOG_ID_LEN && id.len() < MAX_LOG_ID_LEN).then_some(id)
}
