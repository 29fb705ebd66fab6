//! UDP protocol - RFC 768

use super::types::be16;
use crate::{Error, Result};

/// UDP header size (fixed)
pub const HEADER_SIZE: usize = 8;

/// Parsed UDP header (zero-copy reference)
#[derive(Debug, Clone, Copy)]
pub struct UdpHeader<'a> {
    buffer: &'a [u8],
}

impl<'a> UdpHeader<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < HEADER_SIZE {
            return Err(Error::Parse("UDP header too short".into()));
        }

        Ok(Self { buffer })
    }

    pub fn src_port(&self) -> u16 {
        be16(self.buffer, 0)
    }

    pub fn dst_port(&self) -> u16 {
        be16(self.buffer, 2)
    }

    /// Length (header + data)
    pub fn length(&self) -> u16 {
        be16(self.buffer, 4)
    }

    /// 0 means checksum not computed
    pub fn checksum(&self) -> u16 {
        be16(self.buffer, 6)
    }

    /// Data after the header, bounded by the length field when it is sane.
    pub fn payload(&self) -> &'a [u8] {
        let len = self.length() as usize;
        if len >= HEADER_SIZE && len <= self.buffer.len() {
            &self.buffer[HEADER_SIZE..len]
        } else {
            &self.buffer[HEADER_SIZE..]
        }
    }
}

/// UDP datagram builder. The checksum is left at zero.
#[derive(Debug, Clone, Default)]
pub struct UdpBuilder {
    src_port: u16,
    dst_port: u16,
    payload: Vec<u8>,
}

impl UdpBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn src_port(mut self, port: u16) -> Self {
        self.src_port = port;
        self
    }

    pub fn dst_port(mut self, port: u16) -> Self {
        self.dst_port = port;
        self
    }

    pub fn payload(mut self, data: &[u8]) -> Self {
        self.payload = data.to_vec();
        self
    }

    pub fn build(self) -> Vec<u8> {
        let length = (HEADER_SIZE + self.payload.len()) as u16;
        let mut buffer = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        buffer.extend_from_slice(&self.src_port.to_be_bytes());
        buffer.extend_from_slice(&self.dst_port.to_be_bytes());
        buffer.extend_from_slice(&length.to_be_bytes());
        buffer.extend_from_slice(&[0, 0]);
        buffer.extend_from_slice(&self.payload);
        buffer
    }
}
