//! VXLAN - RFC 7348

use super::types::be32;
use crate::{Error, Result};

pub const HEADER_SIZE: usize = 8;

/// IANA-assigned VXLAN UDP port
pub const UDP_PORT: u16 = 4789;

const I_FLAG: u8 = 0x08;

/// Parsed VXLAN header. The payload is an inner Ethernet frame.
#[derive(Debug, Clone, Copy)]
pub struct VxlanHeader<'a> {
    buffer: &'a [u8],
}

impl<'a> VxlanHeader<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < HEADER_SIZE {
            return Err(Error::Parse("VXLAN header too short".into()));
        }
        Ok(Self { buffer })
    }

    pub fn vni_valid(&self) -> bool {
        self.buffer[0] & I_FLAG != 0
    }

    /// VXLAN network identifier (24 bits)
    pub fn vni(&self) -> u32 {
        be32(self.buffer, 4) >> 8
    }

    pub fn payload(&self) -> &'a [u8] {
        &self.buffer[HEADER_SIZE..]
    }
}
