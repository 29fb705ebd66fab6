//! IPv6 protocol - RFC 8200

use super::types::{be16, be32, ip_proto};
use crate::{Error, Result};
use std::net::Ipv6Addr;

/// IPv6 header size (fixed, unlike IPv4)
pub const HEADER_SIZE: usize = 40;

/// Fragment extension header size
pub const FRAGMENT_HEADER_SIZE: usize = 8;

/// Upper bound on extension headers walked before giving up
const MAX_EXTENSION_HEADERS: usize = 8;

/// Parsed IPv6 header (zero-copy reference)
#[derive(Debug, Clone, Copy)]
pub struct Ipv6Header<'a> {
    buffer: &'a [u8],
}

/// Contents of a Fragment extension header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentHeader {
    pub next_header: u8,
    /// Offset in 8-byte units
    pub offset: u16,
    pub more_fragments: bool,
    pub identification: u32,
    /// Offset of the fragmentable part, relative to the IPv6 payload
    pub data_start: usize,
}

impl<'a> Ipv6Header<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < HEADER_SIZE {
            return Err(Error::Parse("IPv6 header too short".into()));
        }

        let version = buffer[0] >> 4;
        if version != 6 {
            return Err(Error::Parse("not an IPv6 packet".into()));
        }

        Ok(Self { buffer })
    }

    pub fn version(&self) -> u8 {
        self.buffer[0] >> 4
    }

    /// Traffic Class (4 bits from byte 0, 4 bits from byte 1)
    pub fn traffic_class(&self) -> u8 {
        ((self.buffer[0] & 0x0F) << 4) | (self.buffer[1] >> 4)
    }

    /// Flow Label (20 bits)
    pub fn flow_label(&self) -> u32 {
        be32(self.buffer, 0) & 0x000F_FFFF
    }

    /// Payload Length (does not include header)
    pub fn payload_length(&self) -> u16 {
        be16(self.buffer, 4)
    }

    pub fn next_header(&self) -> u8 {
        self.buffer[6]
    }

    pub fn hop_limit(&self) -> u8 {
        self.buffer[7]
    }

    pub fn src_addr(&self) -> Ipv6Addr {
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&self.buffer[8..24]);
        Ipv6Addr::from(bytes)
    }

    pub fn dst_addr(&self) -> Ipv6Addr {
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&self.buffer[24..40]);
        Ipv6Addr::from(bytes)
    }

    pub fn header_len(&self) -> usize {
        HEADER_SIZE
    }

    /// Payload bounded by the payload length field. A zero length
    /// (jumbogram) keeps everything captured.
    pub fn payload(&self) -> &'a [u8] {
        let rest = &self.buffer[HEADER_SIZE..];
        match self.payload_length() as usize {
            0 => rest,
            len => &rest[..len.min(rest.len())],
        }
    }

    /// Walk hop-by-hop, routing and destination options headers and return
    /// the upper-layer protocol together with its data.
    pub fn upper_layer(&self) -> (u8, &'a [u8]) {
        let payload = self.payload();
        let mut next = self.next_header();
        let mut offset = 0;

        for _ in 0..MAX_EXTENSION_HEADERS {
            match next {
                ip_proto::HOP_BY_HOP | ip_proto::ROUTING | ip_proto::DEST_OPTS => {
                    let Some(ext) = payload.get(offset..offset + 2) else {
                        break;
                    };
                    next = ext[0];
                    offset += (ext[1] as usize + 1) * 8;
                }
                ip_proto::FRAGMENT => {
                    let Some(ext) = payload.get(offset..offset + FRAGMENT_HEADER_SIZE) else {
                        break;
                    };
                    next = ext[0];
                    offset += FRAGMENT_HEADER_SIZE;
                }
                _ => break,
            }
        }

        (next, payload.get(offset..).unwrap_or(&[]))
    }

    /// Locate the Fragment extension header, if the packet carries one.
    pub fn fragment(&self) -> Option<FragmentHeader> {
        let payload = self.payload();
        let mut next = self.next_header();
        let mut offset = 0;

        for _ in 0..MAX_EXTENSION_HEADERS {
            match next {
                ip_proto::HOP_BY_HOP | ip_proto::ROUTING | ip_proto::DEST_OPTS => {
                    let ext = payload.get(offset..offset + 2)?;
                    next = ext[0];
                    offset += (ext[1] as usize + 1) * 8;
                }
                ip_proto::FRAGMENT => {
                    let ext = payload.get(offset..offset + FRAGMENT_HEADER_SIZE)?;
                    let off_flags = be16(ext, 2);
                    return Some(FragmentHeader {
                        next_header: ext[0],
                        offset: off_flags >> 3,
                        more_fragments: off_flags & 0x1 != 0,
                        identification: be32(ext, 4),
                        data_start: offset + FRAGMENT_HEADER_SIZE,
                    });
                }
                _ => return None,
            }
        }
        None
    }
}

impl FragmentHeader {
    /// An atomic fragment (offset 0, no more fragments) is a whole packet.
    pub fn is_atomic(&self) -> bool {
        self.offset == 0 && !self.more_fragments
    }
}

/// Encode a Fragment extension header
pub fn fragment_header(next_header: u8, offset: u16, more: bool, id: u32) -> [u8; 8] {
    let off_flags = (offset << 3) | u16::from(more);
    let mut ext = [0u8; FRAGMENT_HEADER_SIZE];
    ext[0] = next_header;
    ext[2..4].copy_from_slice(&off_flags.to_be_bytes());
    ext[4..8].copy_from_slice(&id.to_be_bytes());
    ext
}

/// Builder for constructing IPv6 packets
#[derive(Debug, Clone)]
pub struct Ipv6Builder {
    traffic_class: u8,
    flow_label: u32,
    next_header: u8,
    hop_limit: u8,
    src_addr: Ipv6Addr,
    dst_addr: Ipv6Addr,
    payload: Vec<u8>,
}

impl Ipv6Builder {
    pub fn new() -> Self {
        Self {
            traffic_class: 0,
            flow_label: 0,
            next_header: ip_proto::NO_NEXT_HEADER,
            hop_limit: 64,
            src_addr: Ipv6Addr::UNSPECIFIED,
            dst_addr: Ipv6Addr::UNSPECIFIED,
            payload: Vec::new(),
        }
    }

    pub fn traffic_class(mut self, tc: u8) -> Self {
        self.traffic_class = tc;
        self
    }

    pub fn flow_label(mut self, fl: u32) -> Self {
        self.flow_label = fl & 0xFFFFF;
        self
    }

    pub fn next_header(mut self, nh: u8) -> Self {
        self.next_header = nh;
        self
    }

    pub fn hop_limit(mut self, hl: u8) -> Self {
        self.hop_limit = hl;
        self
    }

    pub fn src_addr(mut self, addr: Ipv6Addr) -> Self {
        self.src_addr = addr;
        self
    }

    pub fn dst_addr(mut self, addr: Ipv6Addr) -> Self {
        self.dst_addr = addr;
        self
    }

    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }

    pub fn build(self) -> Vec<u8> {
        let payload_length = self.payload.len() as u16;
        let mut buffer = vec![0u8; HEADER_SIZE + self.payload.len()];

        let first_word = (6u32 << 28) | ((self.traffic_class as u32) << 20) | self.flow_label;
        buffer[0..4].copy_from_slice(&first_word.to_be_bytes());
        buffer[4..6].copy_from_slice(&payload_length.to_be_bytes());
        buffer[6] = self.next_header;
        buffer[7] = self.hop_limit;
        buffer[8..24].copy_from_slice(&self.src_addr.octets());
        buffer[24..40].copy_from_slice(&self.dst_addr.octets());
        buffer[HEADER_SIZE..].copy_from_slice(&self.payload);

        buffer
    }
}

impl Default for Ipv6Builder {
    fn default() -> Self {
        Self::new()
    }
}
