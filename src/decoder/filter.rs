//! Discard filters applied before and after decoding.

use crate::config::DecoderConfig;
use std::collections::HashSet;
use std::net::IpAddr;
use tracing::warn;

#[derive(Debug, Default, Clone)]
pub struct DiscardFilter {
    /// Uppercased SIP methods
    methods: HashSet<Vec<u8>>,
    src_addrs: HashSet<IpAddr>,
}

impl DiscardFilter {
    pub fn new(methods: impl IntoIterator<Item = String>, src_addrs: HashSet<IpAddr>) -> Self {
        Self {
            methods: methods
                .into_iter()
                .map(|m| m.trim().to_ascii_uppercase().into_bytes())
                .filter(|m| !m.is_empty())
                .collect(),
            src_addrs,
        }
    }

    /// Unparsable addresses are reported by config validation and skipped here.
    pub fn from_config(config: &DecoderConfig) -> Self {
        let (src_addrs, invalid) = config.discard_src_addrs();
        for entry in &invalid {
            warn!(entry = %entry, "ignoring unparsable discard source address");
        }
        Self::new(config.discard_method_set(), src_addrs)
    }

    pub fn has_methods(&self) -> bool {
        !self.methods.is_empty()
    }

    pub fn has_src_addrs(&self) -> bool {
        !self.src_addrs.is_empty()
    }

    /// Exact, case-sensitive match against the configured (uppercased) methods
    pub fn discards_method(&self, method: &[u8]) -> bool {
        self.methods.contains(method)
    }

    pub fn discards_src(&self, addr: &IpAddr) -> bool {
        self.src_addrs.contains(addr)
    }
}
