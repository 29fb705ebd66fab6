//! Configuration types

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::IpAddr;
use std::time::Duration;

/// Capture configuration (heptap.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub decoder: DecoderConfig,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Which payload families besides SIP are extracted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Sip,
    SipLog,
    SipDns,
    SipRtp,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    #[default]
    Ethernet,
    LinuxSll,
}

impl LinkType {
    /// Map a pcap LINKTYPE_* value
    pub fn from_pcap(linktype: i32) -> Option<Self> {
        match linktype {
            1 => Some(LinkType::Ethernet),
            113 => Some(LinkType::LinuxSll),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Drop frames seen within the dedup TTL
    pub dedup: bool,
    /// Reassemble TCP streams before classification
    pub reassembly: bool,
    /// GRE payloads carry ERSPAN headers
    pub erspan: bool,
    pub mode: Mode,
    /// Comma-separated SIP methods to drop, matched on the CSeq method
    pub discard_methods: String,
    /// Comma-separated source addresses to drop
    pub discard_src_ips: String,
    pub link_type: LinkType,
    pub queue_capacity: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            dedup: false,
            reassembly: false,
            erspan: false,
            mode: Mode::Sip,
            discard_methods: String::new(),
            discard_src_ips: String::new(),
            link_type: LinkType::Ethernet,
            queue_capacity: 20_000,
        }
    }
}

impl DecoderConfig {
    /// Uppercased, trimmed method names; empty entries are skipped.
    pub fn discard_method_set(&self) -> HashSet<String> {
        split_list(&self.discard_methods)
            .map(|m| m.to_ascii_uppercase())
            .collect()
    }

    /// Parsed discard addresses. Entries that fail to parse are returned
    /// separately so validation can report them.
    pub fn discard_src_addrs(&self) -> (HashSet<IpAddr>, Vec<String>) {
        let mut addrs = HashSet::new();
        let mut invalid = Vec::new();
        for entry in split_list(&self.discard_src_ips) {
            match entry.parse::<IpAddr>() {
                Ok(addr) => {
                    addrs.insert(addr);
                }
                Err(_) => invalid.push(entry.to_string()),
            }
        }
        (addrs, invalid)
    }
}

fn split_list(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    pub fragment_gc_interval_secs: u64,
    pub fragment_timeout_secs: u64,
    pub tcp_flush_interval_secs: u64,
    pub stats_interval_secs: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            fragment_gc_interval_secs: 60,
            fragment_timeout_secs: 60,
            tcp_flush_interval_secs: 1,
            stats_interval_secs: 60,
        }
    }
}

impl MaintenanceConfig {
    pub fn fragment_gc_interval(&self) -> Duration {
        Duration::from_secs(self.fragment_gc_interval_secs)
    }

    pub fn fragment_timeout(&self) -> Duration {
        Duration::from_secs(self.fragment_timeout_secs)
    }

    pub fn tcp_flush_interval(&self) -> Duration {
        Duration::from_secs(self.tcp_flush_interval_secs)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DedupConfig {
    pub ttl_ms: u64,
    pub capacity_bytes: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 400,
            capacity_bytes: 20 * 1024 * 1024,
        }
    }
}

impl DedupConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

/// Logging section, consumed by `telemetry::init_logging`
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// error, warn, info, debug, trace
    pub level: String,
    /// pretty, compact, json
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
