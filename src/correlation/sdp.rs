//! RTCP correlation learned from SDP offers and answers.

use super::Correlator;
use crate::protocol::find_bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};
use tracing::debug;

pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);
pub const DEFAULT_MAX_ENTRIES: usize = 100_000;

#[derive(Debug)]
struct Binding {
    call_id: Vec<u8>,
    learned: Instant,
}

/// Maps RTCP endpoints announced in SDP to the Call-ID of their dialog.
#[derive(Debug)]
pub struct SdpCorrelator {
    bindings: Mutex<HashMap<(IpAddr, u16), Binding>>,
    ttl: Duration,
    max_entries: usize,
}

impl SdpCorrelator {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            bindings: Mutex::new(HashMap::new()),
            ttl,
            max_entries,
        }
    }

    pub fn len(&self) -> usize {
        self.bindings.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.lock().is_empty()
    }

    fn lookup(&self, addr: IpAddr, port: u16, now: Instant) -> Option<Vec<u8>> {
        let bindings = self.bindings.lock();
        let binding = bindings.get(&(addr, port))?;
        (now.duration_since(binding.learned) < self.ttl).then(|| binding.call_id.clone())
    }

    fn learn(&self, addr: IpAddr, rtcp_port: u16, call_id: &[u8], now: Instant) {
        let mut bindings = self.bindings.lock();
        if bindings.len() >= self.max_entries && !bindings.contains_key(&(addr, rtcp_port)) {
            let ttl = self.ttl;
            bindings.retain(|_, b| now.duration_since(b.learned) < ttl);
            if bindings.len() >= self.max_entries {
                debug!(%addr, rtcp_port, "correlation table full, binding not stored");
                return;
            }
        }
        bindings.insert(
            (addr, rtcp_port),
            Binding {
                call_id: call_id.to_vec(),
                learned: now,
            },
        );
    }

    fn purge_at(&self, now: Instant) {
        let ttl = self.ttl;
        self.bindings
            .lock()
            .retain(|_, b| now.duration_since(b.learned) < ttl);
    }
}

impl Default for SdpCorrelator {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_MAX_ENTRIES)
    }
}

impl Correlator for SdpCorrelator {
    fn correlate_rtcp(
        &self,
        src: IpAddr,
        sport: u16,
        dst: IpAddr,
        dport: u16,
        payload: &[u8],
    ) -> Option<(Vec<u8>, Vec<u8>)> {
        let now = Instant::now();
        let call_id = self
            .lookup(src, sport, now)
            .or_else(|| self.lookup(dst, dport, now))?;
        Some((payload.to_vec(), call_id))
    }

    fn extract_correlation_id(
        &self,
        src: IpAddr,
        _sport: u16,
        _dst: IpAddr,
        _dport: u16,
        payload: &[u8],
    ) {
        let Some(media) = parse_sdp_media(payload) else {
            return;
        };
        let addr = media.addr.unwrap_or(src);
        let now = Instant::now();
        debug!(%addr, rtcp_port = media.rtcp_port, "learned RTCP endpoint");
        self.learn(addr, media.rtcp_port, media.call_id, now);
    }

    fn purge_expired(&self) {
        self.purge_at(Instant::now());
    }
}

/// Media endpoint announced by a SIP message body
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct SdpMedia<'a> {
    pub call_id: &'a [u8],
    pub addr: Option<IpAddr>,
    pub rtcp_port: u16,
}

fn lines(data: &[u8]) -> impl Iterator<Item = &[u8]> {
    data.split(|b| *b == b'\n')
        .map(|l| l.strip_suffix(b"\r").unwrap_or(l))
}

fn header_value<'a>(headers: &'a [u8], names: &[&[u8]]) -> Option<&'a [u8]> {
    lines(headers).find_map(|line| {
        let colon = line.iter().position(|b| *b == b':')?;
        let name = line[..colon].trim_ascii();
        names
            .iter()
            .any(|n| name.eq_ignore_ascii_case(n))
            .then(|| line[colon + 1..].trim_ascii())
    })
}

/// Call-ID and RTCP endpoint of a SIP message carrying SDP. The RTCP port is
/// `a=rtcp:` when present, otherwise the audio port plus one.
pub(crate) fn parse_sdp_media(payload: &[u8]) -> Option<SdpMedia<'_>> {
    let split = find_bytes(payload, b"\r\n\r\n")?;
    let (headers, body) = (&payload[..split], &payload[split + 4..]);

    let call_id = header_value(headers, &[b"Call-ID", b"i"]).filter(|v| !v.is_empty())?;

    let mut addr = None;
    let mut audio_port = None;
    let mut rtcp_port = None;

    for line in lines(body) {
        if let Some(conn) = line.strip_prefix(b"c=IN ") {
            // c=IN IP4 10.0.0.1
            let text = std::str::from_utf8(conn).ok()?;
            addr = text
                .split_whitespace()
                .nth(1)
                .and_then(|a| a.parse::<IpAddr>().ok())
                .or(addr);
        } else if let Some(media) = line.strip_prefix(b"m=audio ") {
            let text = std::str::from_utf8(media).ok()?;
            audio_port = text
                .split_whitespace()
                .next()
                .and_then(|p| p.split('/').next())
                .and_then(|p| p.parse::<u16>().ok());
        } else if let Some(rtcp) = line.strip_prefix(b"a=rtcp:") {
            let text = std::str::from_utf8(rtcp).ok()?;
            rtcp_port = text
                .split_whitespace()
                .next()
                .and_then(|p| p.parse::<u16>().ok());
        }
    }

    let rtcp_port = rtcp_port.or_else(|| audio_port?.checked_add(1))?;
    Some(SdpMedia {
        call_id,
        addr,
        rtcp_port,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn invite(body: &str) -> Vec<u8> {
        format!(
            "INVITE sip:bob@b SIP/2.0\r\nCall-ID: 8a7b@host\r\nCSeq: 1 INVITE\r\nContent-Type: application/sdp\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        )
        .into_bytes()
    }

    fn ip(a: u8, b: u8, c: u8, d: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(a, b, c, d))
    }

    #[test]
    fn test_parse_sdp_media() {
        let msg = invite("v=0\r\nc=IN IP4 10.0.0.9\r\nm=audio 40000 RTP/AVP 0 8\r\n");
        let media = parse_sdp_media(&msg).unwrap();
        assert_eq!(media.call_id, b"8a7b@host");
        assert_eq!(media.addr, Some(ip(10, 0, 0, 9)));
        assert_eq!(media.rtcp_port, 40001);
    }

    #[test]
    fn test_parse_sdp_explicit_rtcp_and_compact_call_id() {
        let msg = b"SIP/2.0 200 OK\r\ni: short-form\r\n\r\nc=IN IP6 2001:db8::7\r\nm=audio 5000 RTP/AVP 0\r\na=rtcp:6001\r\n";
        let media = parse_sdp_media(msg).unwrap();
        assert_eq!(media.call_id, b"short-form");
        assert_eq!(media.addr, Some("2001:db8::7".parse().unwrap()));
        assert_eq!(media.rtcp_port, 6001);
    }

    #[test]
    fn test_parse_sdp_without_media() {
        assert!(parse_sdp_media(b"OPTIONS sip:a SIP/2.0\r\nCall-ID: x\r\n\r\n").is_none());
        assert!(parse_sdp_media(b"no header terminator").is_none());
    }

    #[test]
    fn test_correlate_rtcp_after_learning() {
        let correlator = SdpCorrelator::default();
        let msg = invite("c=IN IP4 10.0.0.9\r\nm=audio 40000 RTP/AVP 0\r\n");
        correlator.extract_correlation_id(ip(10, 0, 0, 1), 5060, ip(10, 0, 0, 2), 5060, &msg);
        assert_eq!(correlator.len(), 1);

        let rtcp = [0x81, 200, 0, 6];
        let (payload, cid) = correlator
            .correlate_rtcp(ip(10, 0, 0, 5), 30001, ip(10, 0, 0, 9), 40001, &rtcp)
            .unwrap();
        assert_eq!(payload, rtcp);
        assert_eq!(cid, b"8a7b@host");

        assert!(correlator
            .correlate_rtcp(ip(10, 0, 0, 5), 30001, ip(10, 0, 0, 9), 40003, &rtcp)
            .is_none());
    }

    #[test]
    fn test_missing_connection_line_uses_source() {
        let correlator = SdpCorrelator::default();
        let msg = invite("m=audio 7000 RTP/AVP 0\r\n");
        correlator.extract_correlation_id(ip(192, 168, 0, 4), 5060, ip(10, 0, 0, 2), 5060, &msg);
        assert!(correlator
            .correlate_rtcp(ip(192, 168, 0, 4), 7001, ip(10, 0, 0, 2), 9, &[0x80])
            .is_some());
    }

    #[test]
    fn test_bindings_expire() {
        let correlator = SdpCorrelator::new(Duration::from_millis(10), 8);
        let msg = invite("c=IN IP4 10.0.0.9\r\nm=audio 40000 RTP/AVP 0\r\n");
        correlator.extract_correlation_id(ip(10, 0, 0, 1), 5060, ip(10, 0, 0, 2), 5060, &msg);

        correlator.purge_at(Instant::now() + Duration::from_millis(20));
        assert!(correlator.is_empty());
    }

    #[test]
    fn test_table_capacity() {
        let correlator = SdpCorrelator::new(DEFAULT_TTL, 1);
        let now = Instant::now();
        correlator.learn(ip(10, 0, 0, 1), 1001, b"a", now);
        correlator.learn(ip(10, 0, 0, 2), 1001, b"b", now);
        assert_eq!(correlator.len(), 1);
        // Rebinding an existing endpoint is always allowed
        correlator.learn(ip(10, 0, 0, 1), 1001, b"c", now);
        assert_eq!(correlator.lookup(ip(10, 0, 0, 1), 1001, now), Some(b"c".to_vec()));
    }
}
