//! GRE - RFC 2784 / RFC 2890

use super::types::be16;
use crate::{Error, Result};

/// Fixed part of the GRE header
pub const MIN_HEADER_SIZE: usize = 4;

const C_FLAG: u8 = 0x80;
const R_FLAG: u8 = 0x40;
const K_FLAG: u8 = 0x20;
const S_FLAG: u8 = 0x10;

/// Parsed GRE header (zero-copy reference)
#[derive(Debug, Clone, Copy)]
pub struct GreHeader<'a> {
    buffer: &'a [u8],
    header_len: usize,
}

impl<'a> GreHeader<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < MIN_HEADER_SIZE {
            return Err(Error::Parse("GRE header too short".into()));
        }

        let flags = buffer[0];
        if flags & R_FLAG != 0 {
            return Err(Error::Parse("GRE source routing not supported".into()));
        }

        let mut header_len = MIN_HEADER_SIZE;
        if flags & C_FLAG != 0 {
            header_len += 4;
        }
        if flags & K_FLAG != 0 {
            header_len += 4;
        }
        if flags & S_FLAG != 0 {
            header_len += 4;
        }

        if buffer.len() < header_len {
            return Err(Error::Parse("GRE header truncated".into()));
        }

        Ok(Self { buffer, header_len })
    }

    pub fn checksum_present(&self) -> bool {
        self.buffer[0] & C_FLAG != 0
    }

    pub fn key_present(&self) -> bool {
        self.buffer[0] & K_FLAG != 0
    }

    pub fn sequence_present(&self) -> bool {
        self.buffer[0] & S_FLAG != 0
    }

    pub fn version(&self) -> u8 {
        self.buffer[1] & 0x07
    }

    /// Protocol type of the payload (an EtherType)
    pub fn protocol(&self) -> u16 {
        be16(self.buffer, 2)
    }

    pub fn header_len(&self) -> usize {
        self.header_len
    }

    pub fn payload(&self) -> &'a [u8] {
        &self.buffer[self.header_len..]
    }
}
