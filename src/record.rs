//! Classified capture record handed to the exporter.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// IP family tags carried in the version field
pub mod version {
    pub const IPV4: u8 = 0x02;
    pub const IPV6: u8 = 0x0a;
    pub const HEP: u8 = 100;
}

/// Payload classification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ProtoType {
    #[default]
    Unknown,
    Sip,
    Rtcp,
    Dns,
    /// Syslog line correlated to a call
    Log,
    Other(u8),
}

impl ProtoType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => ProtoType::Unknown,
            1 => ProtoType::Sip,
            5 => ProtoType::Rtcp,
            53 => ProtoType::Dns,
            100 => ProtoType::Log,
            other => ProtoType::Other(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            ProtoType::Unknown => 0,
            ProtoType::Sip => 1,
            ProtoType::Rtcp => 5,
            ProtoType::Dns => 53,
            ProtoType::Log => 100,
            ProtoType::Other(v) => v,
        }
    }

    pub fn is_known(self) -> bool {
        self != ProtoType::Unknown
    }
}

/// HEP chunk identifiers a record maps onto
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ChunkType {
    Version = 1,
    Protocol = 2,
    Ipv4Src = 3,
    Ipv4Dst = 4,
    Ipv6Src = 5,
    Ipv6Dst = 6,
    SrcPort = 7,
    DstPort = 8,
    TimestampSecs = 9,
    TimestampMicros = 10,
    ProtoType = 11,
    NodeId = 12,
    NodePassword = 14,
    Payload = 15,
    CorrelationId = 17,
    Vlan = 18,
    NodeName = 19,
}

impl ChunkType {
    pub fn id(self) -> u16 {
        self as u16
    }
}

/// One classified packet. Owns copies of its payload and correlation ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub version: u8,
    pub protocol: u8,
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
    pub tsec: u32,
    pub tmsec: u32,
    pub proto_type: ProtoType,
    pub payload: Vec<u8>,
    pub cid: Vec<u8>,
    pub vlan: u16,
}

impl Record {
    pub fn new(version: u8, protocol: u8, src_ip: IpAddr, dst_ip: IpAddr, ts: SystemTime) -> Self {
        let since_epoch = ts.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
        Self {
            version,
            protocol,
            src_ip,
            dst_ip,
            src_port: 0,
            dst_port: 0,
            tsec: since_epoch.as_secs() as u32,
            tmsec: since_epoch.subsec_micros(),
            proto_type: ProtoType::Unknown,
            payload: Vec::new(),
            cid: Vec::new(),
            vlan: 0,
        }
    }

    /// Wrap an already encapsulated HEP frame
    pub fn hep(data: &[u8], ts: SystemTime) -> Self {
        let unspecified = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
        let mut record = Self::new(version::HEP, 0, unspecified, unspecified, ts);
        record.payload = data.to_vec();
        record
    }

    pub fn timestamp(&self) -> SystemTime {
        UNIX_EPOCH + Duration::new(self.tsec as u64, self.tmsec * 1000)
    }

    pub fn is_hep(&self) -> bool {
        self.version == version::HEP
    }

    /// Chunks an exporter emits for this record, in wire order.
    pub fn chunk_types(&self) -> Vec<ChunkType> {
        if self.is_hep() {
            return vec![ChunkType::Version, ChunkType::Payload];
        }

        let mut chunks = vec![ChunkType::Version, ChunkType::Protocol];
        if self.version == version::IPV6 {
            chunks.extend([ChunkType::Ipv6Src, ChunkType::Ipv6Dst]);
        } else {
            chunks.extend([ChunkType::Ipv4Src, ChunkType::Ipv4Dst]);
        }
        chunks.extend([
            ChunkType::SrcPort,
            ChunkType::DstPort,
            ChunkType::TimestampSecs,
            ChunkType::TimestampMicros,
            ChunkType::ProtoType,
            ChunkType::NodeId,
            ChunkType::Payload,
        ]);
        if !self.cid.is_empty() {
            chunks.push(ChunkType::CorrelationId);
        }
        if self.vlan != 0 {
            chunks.push(ChunkType::Vlan);
        }
        chunks
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{} proto={} type={} vlan={} len={}",
            self.src_ip,
            self.src_port,
            self.dst_ip,
            self.dst_port,
            self.protocol,
            self.proto_type.as_u8(),
            self.vlan,
            self.payload.len(),
        )?;
        if !self.cid.is_empty() {
            write!(f, " cid={}", String::from_utf8_lossy(&self.cid))?;
        }
        Ok(())
    }
}
