//! IEEE 802.1Q VLAN tag

use super::types::{be16, VlanTag};
use crate::{Error, Result};

/// Tag control information + encapsulated EtherType
pub const HEADER_SIZE: usize = 4;

/// Parsed 802.1Q header. The TPID belongs to the enclosing layer.
#[derive(Debug, Clone, Copy)]
pub struct VlanHeader<'a> {
    buffer: &'a [u8],
}

impl<'a> VlanHeader<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < HEADER_SIZE {
            return Err(Error::Parse("VLAN tag too short".into()));
        }
        Ok(Self { buffer })
    }

    pub fn tag(&self) -> VlanTag {
        VlanTag::from_bytes([self.buffer[0], self.buffer[1]])
    }

    pub fn vid(&self) -> u16 {
        self.tag().vid
    }

    pub fn ethertype(&self) -> u16 {
        be16(self.buffer, 2)
    }

    pub fn payload(&self) -> &'a [u8] {
        &self.buffer[HEADER_SIZE..]
    }
}
