//! Ethernet II header parsing and construction

use super::types::{be16, EtherType, VlanTag};
use crate::{Error, Result};

/// Ethernet header size (no FCS, no tags)
pub const HEADER_SIZE: usize = 14;

/// Parsed Ethernet header (zero-copy reference)
#[derive(Debug, Clone, Copy)]
pub struct EthernetHeader<'a> {
    buffer: &'a [u8],
}

impl<'a> EthernetHeader<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < HEADER_SIZE {
            return Err(Error::Parse("frame too short".into()));
        }
        Ok(Self { buffer })
    }

    pub fn dst_mac(&self) -> [u8; 6] {
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&self.buffer[0..6]);
        mac
    }

    pub fn src_mac(&self) -> [u8; 6] {
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&self.buffer[6..12]);
        mac
    }

    /// EtherType of the next header. A VLAN TPID when the frame is tagged.
    pub fn ethertype(&self) -> u16 {
        be16(self.buffer, 12)
    }

    pub fn payload(&self) -> &'a [u8] {
        &self.buffer[HEADER_SIZE..]
    }
}

/// Builder for constructing Ethernet frames
pub struct FrameBuilder {
    buffer: Vec<u8>,
}

impl FrameBuilder {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(1522),
        }
    }

    pub fn dst_mac(mut self, mac: [u8; 6]) -> Self {
        self.buffer.extend_from_slice(&mac);
        self
    }

    pub fn src_mac(mut self, mac: [u8; 6]) -> Self {
        self.buffer.extend_from_slice(&mac);
        self
    }

    pub fn vlan_tag(mut self, tag: VlanTag) -> Self {
        self.buffer
            .extend_from_slice(&(EtherType::Vlan as u16).to_be_bytes());
        self.buffer.extend_from_slice(&tag.to_bytes());
        self
    }

    pub fn ethertype(mut self, ethertype: u16) -> Self {
        self.buffer.extend_from_slice(&ethertype.to_be_bytes());
        self
    }

    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.buffer.extend_from_slice(payload);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.buffer
    }
}

impl Default for FrameBuilder {
    fn default() -> Self {
        Self::new()
    }
}
