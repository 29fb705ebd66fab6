//! RTP fixed header - RFC 3550

use super::types::{be16, be32};
use crate::{Error, Result};
use std::fmt;

pub const MIN_HEADER_SIZE: usize = 12;

#[derive(Debug, Clone, Copy)]
pub struct RtpHeader<'a> {
    buffer: &'a [u8],
    header_len: usize,
}

impl<'a> RtpHeader<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < MIN_HEADER_SIZE {
            return Err(Error::Parse("RTP header too short".into()));
        }
        if buffer[0] >> 6 != 2 {
            return Err(Error::Parse("not an RTP version 2 packet".into()));
        }

        let header_len = MIN_HEADER_SIZE + (buffer[0] & 0x0F) as usize * 4;
        if buffer.len() < header_len {
            return Err(Error::Parse("RTP CSRC list truncated".into()));
        }

        Ok(Self { buffer, header_len })
    }

    pub fn version(&self) -> u8 {
        self.buffer[0] >> 6
    }

    pub fn padding(&self) -> bool {
        self.buffer[0] & 0x20 != 0
    }

    pub fn extension(&self) -> bool {
        self.buffer[0] & 0x10 != 0
    }

    pub fn csrc_count(&self) -> u8 {
        self.buffer[0] & 0x0F
    }

    pub fn marker(&self) -> bool {
        self.buffer[1] & 0x80 != 0
    }

    pub fn payload_type(&self) -> u8 {
        self.buffer[1] & 0x7F
    }

    pub fn sequence(&self) -> u16 {
        be16(self.buffer, 2)
    }

    pub fn timestamp(&self) -> u32 {
        be32(self.buffer, 4)
    }

    pub fn ssrc(&self) -> u32 {
        be32(self.buffer, 8)
    }

    pub fn payload(&self) -> &'a [u8] {
        &self.buffer[self.header_len..]
    }
}

impl fmt::Display for RtpHeader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RTP v{} pt={} seq={} ts={} ssrc={:#010x} marker={} padding={} ext={} cc={} len={}",
            self.version(),
            self.payload_type(),
            self.sequence(),
            self.timestamp(),
            self.ssrc(),
            self.marker(),
            self.padding(),
            self.extension(),
            self.csrc_count(),
            self.payload().len(),
        )
    }
}

/// Human-readable rendering of an RTP packet for debug logs
pub fn describe_rtp(payload: &[u8]) -> String {
    match RtpHeader::parse(payload) {
        Ok(rtp) => rtp.to_string(),
        Err(_) => "not an RTP packet".to_string(),
    }
}
