//! Decoder statistics.
//!
//! Counters are monotonic for the process lifetime; the periodic reporter
//! reads them without resetting.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counter for thread-safe increment operations.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, val: u64) {
        self.0.fetch_add(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-category packet counts shared by every decode path.
#[derive(Debug, Default)]
pub struct DecoderStats {
    /// Fragments held pending reassembly
    pub fragments: Counter,
    /// Frames suppressed by the dedup cache
    pub duplicates: Counter,
    pub dns: Counter,
    pub ipv4: Counter,
    pub ipv6: Counter,
    /// RTCP packets matched to a call
    pub rtcp: Counter,
    /// RTCP packets with no known correlation
    pub rtcp_fail: Counter,
    pub tcp: Counter,
    pub sctp: Counter,
    pub udp: Counter,
    /// HEP frames passed through undecoded
    pub hep: Counter,
    /// Payloads that classified as nothing
    pub unknown: Counter,
}

impl DecoderStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exports all counters as key-value pairs, in report order.
    pub fn export(&self) -> Vec<(&'static str, u64)> {
        vec![
            ("ipv4", self.ipv4.get()),
            ("ipv6", self.ipv6.get()),
            ("udp", self.udp.get()),
            ("tcp", self.tcp.get()),
            ("sctp", self.sctp.get()),
            ("rtcp", self.rtcp.get()),
            ("rtcp_fail", self.rtcp_fail.get()),
            ("dns", self.dns.get()),
            ("hep", self.hep.get()),
            ("duplicates", self.duplicates.get()),
            ("fragments", self.fragments.get()),
            ("unknown", self.unknown.get()),
        ]
    }

    /// Single-line rendering used by the stats reporter.
    pub fn report_line(&self) -> String {
        let mut line = String::new();
        for (i, (name, value)) in self.export().into_iter().enumerate() {
            if i > 0 {
                line.push_str(", ");
            }
            let _ = write!(line, "{}={}", name, value);
        }
        line
    }
}
