//! SCTP common header - RFC 4960

use super::types::{be16, be32};
use crate::{Error, Result};

/// Common header: ports, verification tag, checksum
pub const HEADER_SIZE: usize = 12;

pub mod chunk {
    pub const DATA: u8 = 0;
    pub const I_DATA: u8 = 64;
}

/// Parsed SCTP header. The payload holds the chunk list.
#[derive(Debug, Clone, Copy)]
pub struct SctpHeader<'a> {
    buffer: &'a [u8],
}

impl<'a> SctpHeader<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < HEADER_SIZE {
            return Err(Error::Parse("SCTP header too short".into()));
        }
        Ok(Self { buffer })
    }

    pub fn src_port(&self) -> u16 {
        be16(self.buffer, 0)
    }

    pub fn dst_port(&self) -> u16 {
        be16(self.buffer, 2)
    }

    pub fn verification_tag(&self) -> u32 {
        be32(self.buffer, 4)
    }

    pub fn checksum(&self) -> u32 {
        be32(self.buffer, 8)
    }

    pub fn payload(&self) -> &'a [u8] {
        &self.buffer[HEADER_SIZE..]
    }
}
