//! Linux "cooked" capture header (DLT_LINUX_SLL)
//!
//! Header format (16 bytes):
//! - Packet type (2 bytes)
//! - ARPHRD type (2 bytes)
//! - Link-layer address length (2 bytes)
//! - Link-layer address (8 bytes)
//! - Protocol type (2 bytes), an EtherType

use super::types::be16;
use crate::{Error, Result};

pub const HEADER_SIZE: usize = 16;

/// Parsed SLL header (zero-copy reference)
#[derive(Debug, Clone, Copy)]
pub struct SllHeader<'a> {
    buffer: &'a [u8],
}

impl<'a> SllHeader<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < HEADER_SIZE {
            return Err(Error::Parse("Linux SLL header too short".into()));
        }
        Ok(Self { buffer })
    }

    pub fn packet_type(&self) -> u16 {
        be16(self.buffer, 0)
    }

    pub fn arphrd_type(&self) -> u16 {
        be16(self.buffer, 2)
    }

    pub fn ethertype(&self) -> u16 {
        be16(self.buffer, 14)
    }

    pub fn payload(&self) -> &'a [u8] {
        &self.buffer[HEADER_SIZE..]
    }
}
