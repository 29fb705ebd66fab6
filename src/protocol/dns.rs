//! DNS protocol - RFC 1035
//!
//! Message parsing for the DNS capture mode. Responses are summarized as a
//! JSON document that travels as the record payload.

use super::types::{be16, be32};
use crate::{Error, Result};
use serde::Serialize;
use std::net::{Ipv4Addr, Ipv6Addr};

pub const DNS_PORT: u16 = 53;

/// DNS header size (fixed at 12 bytes)
pub const DNS_HEADER_SIZE: usize = 12;

/// Compression pointers followed before a name is rejected
const MAX_POINTER_HOPS: usize = 16;

/// DNS record types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum DnsType {
    A = 1,
    NS = 2,
    CNAME = 5,
    SOA = 6,
    PTR = 12,
    MX = 15,
    TXT = 16,
    AAAA = 28,
    SRV = 33,
}

impl DnsType {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(DnsType::A),
            2 => Some(DnsType::NS),
            5 => Some(DnsType::CNAME),
            6 => Some(DnsType::SOA),
            12 => Some(DnsType::PTR),
            15 => Some(DnsType::MX),
            16 => Some(DnsType::TXT),
            28 => Some(DnsType::AAAA),
            33 => Some(DnsType::SRV),
            _ => None,
        }
    }
}

/// Parsed DNS question
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DnsQuestion {
    pub name: String,
    #[serde(rename = "type")]
    pub qtype: u16,
    #[serde(skip)]
    pub qclass: u16,
}

/// Parsed DNS resource record
#[derive(Debug, Clone)]
pub struct DnsRecord {
    pub name: String,
    pub rtype: u16,
    pub rclass: u16,
    pub ttl: u32,
    /// Offset of RDATA within the message, needed to expand names inside it
    pub rdata_offset: usize,
    pub rdata: Vec<u8>,
}

/// Zero-copy DNS header parser
#[derive(Debug, Clone, Copy)]
pub struct DnsHeader<'a> {
    buffer: &'a [u8],
}

impl<'a> DnsHeader<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < DNS_HEADER_SIZE {
            return Err(Error::Parse("DNS header too short".into()));
        }
        Ok(Self { buffer })
    }

    /// The whole DNS message
    pub fn as_bytes(&self) -> &'a [u8] {
        self.buffer
    }

    pub fn id(&self) -> u16 {
        be16(self.buffer, 0)
    }

    fn flags(&self) -> u16 {
        be16(self.buffer, 2)
    }

    /// Query/Response flag (bit 15)
    pub fn is_response(&self) -> bool {
        self.flags() & 0x8000 != 0
    }

    /// Opcode (bits 11-14)
    pub fn opcode(&self) -> u8 {
        ((self.flags() >> 11) & 0x0F) as u8
    }

    /// Response code (bits 0-3)
    pub fn rcode(&self) -> u8 {
        (self.flags() & 0x000F) as u8
    }

    pub fn question_count(&self) -> u16 {
        be16(self.buffer, 4)
    }

    pub fn answer_count(&self) -> u16 {
        be16(self.buffer, 6)
    }

    pub fn questions(&self) -> Result<Vec<DnsQuestion>> {
        let (questions, _) = self.read_questions()?;
        Ok(questions)
    }

    pub fn answers(&self) -> Result<Vec<DnsRecord>> {
        let (_, mut offset) = self.read_questions()?;
        let buffer = self.buffer;
        let mut answers = Vec::new();

        for _ in 0..self.answer_count() {
            let (name, new_offset) = parse_domain_name(buffer, offset)?;
            offset = new_offset;

            if offset + 10 > buffer.len() {
                return Err(Error::Parse("DNS answer truncated".into()));
            }

            let rtype = be16(buffer, offset);
            let rclass = be16(buffer, offset + 2);
            let ttl = be32(buffer, offset + 4);
            let rdlength = be16(buffer, offset + 8) as usize;
            offset += 10;

            if offset + rdlength > buffer.len() {
                return Err(Error::Parse("DNS RDATA truncated".into()));
            }

            answers.push(DnsRecord {
                name,
                rtype,
                rclass,
                ttl,
                rdata_offset: offset,
                rdata: buffer[offset..offset + rdlength].to_vec(),
            });
            offset += rdlength;
        }

        Ok(answers)
    }

    fn read_questions(&self) -> Result<(Vec<DnsQuestion>, usize)> {
        let buffer = self.buffer;
        let mut questions = Vec::new();
        let mut offset = DNS_HEADER_SIZE;

        for _ in 0..self.question_count() {
            let (name, new_offset) = parse_domain_name(buffer, offset)?;
            offset = new_offset;

            if offset + 4 > buffer.len() {
                return Err(Error::Parse("DNS question truncated".into()));
            }

            questions.push(DnsQuestion {
                name,
                qtype: be16(buffer, offset),
                qclass: be16(buffer, offset + 2),
            });
            offset += 4;
        }

        Ok((questions, offset))
    }
}

/// Parse a domain name from DNS wire format
///
/// Handles both label format and compression pointers (RFC 1035 section 4.1.4)
pub fn parse_domain_name(buffer: &[u8], start: usize) -> Result<(String, usize)> {
    let mut labels: Vec<String> = Vec::new();
    let mut offset = start;
    let mut jumped = false;
    let mut final_offset = start;
    let mut jumps = 0;

    loop {
        if jumps > MAX_POINTER_HOPS {
            return Err(Error::Parse("DNS name compression loop detected".into()));
        }

        let Some(&len) = buffer.get(offset) else {
            return Err(Error::Parse("DNS name truncated".into()));
        };
        let len = len as usize;

        if len == 0 {
            if !jumped {
                final_offset = offset + 1;
            }
            break;
        } else if len & 0xC0 == 0xC0 {
            let Some(&low) = buffer.get(offset + 1) else {
                return Err(Error::Parse("DNS compression pointer truncated".into()));
            };

            if !jumped {
                final_offset = offset + 2;
            }

            offset = ((len & 0x3F) << 8) | low as usize;
            jumped = true;
            jumps += 1;
        } else {
            offset += 1;
            if offset + len > buffer.len() {
                return Err(Error::Parse("DNS label truncated".into()));
            }

            labels.push(String::from_utf8_lossy(&buffer[offset..offset + len]).into_owned());
            offset += len;

            if !jumped {
                final_offset = offset;
            }
        }
    }

    let name = if labels.is_empty() {
        ".".to_string()
    } else {
        labels.join(".")
    };

    Ok((name, final_offset))
}

/// Encode a domain name to DNS wire format
pub fn encode_domain_name(name: &str) -> Vec<u8> {
    let mut result = Vec::new();
    for label in name.trim_end_matches('.').split('.') {
        if label.is_empty() {
            continue;
        }
        result.push(label.len() as u8);
        result.extend_from_slice(label.as_bytes());
    }
    result.push(0);
    result
}

#[derive(Debug, Serialize)]
struct AnswerSummary {
    #[serde(rename = "type")]
    rtype: u16,
    name: String,
    ttl: u32,
    data: String,
}

#[derive(Debug, Serialize)]
struct MessageSummary {
    id: u16,
    response: bool,
    rcode: u8,
    questions: Vec<DnsQuestion>,
    answers: Vec<AnswerSummary>,
}

fn hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02x}")).collect()
}

fn render_rdata(message: &[u8], record: &DnsRecord) -> String {
    match (DnsType::from_u16(record.rtype), record.rdata.len()) {
        (Some(DnsType::A), 4) => {
            Ipv4Addr::new(record.rdata[0], record.rdata[1], record.rdata[2], record.rdata[3])
                .to_string()
        }
        (Some(DnsType::AAAA), 16) => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&record.rdata);
            Ipv6Addr::from(octets).to_string()
        }
        (Some(DnsType::CNAME | DnsType::PTR | DnsType::NS), _) => {
            parse_domain_name(message, record.rdata_offset)
                .map(|(name, _)| name)
                .unwrap_or_else(|_| hex(&record.rdata))
        }
        _ => hex(&record.rdata),
    }
}

/// Summarize a DNS message as JSON: header bits, questions and answers.
pub fn answer_summary(message: &[u8]) -> Result<Vec<u8>> {
    let header = DnsHeader::parse(message)?;
    let answers = header
        .answers()?
        .iter()
        .map(|r| AnswerSummary {
            rtype: r.rtype,
            name: r.name.clone(),
            ttl: r.ttl,
            data: render_rdata(message, r),
        })
        .collect();

    let summary = MessageSummary {
        id: header.id(),
        response: header.is_response(),
        rcode: header.rcode(),
        questions: header.questions()?,
        answers,
    };

    serde_json::to_vec(&summary).map_err(|e| Error::Parse(format!("DNS summary: {e}")))
}

/// DNS message builder
#[derive(Debug, Clone, Default)]
pub struct DnsBuilder {
    id: u16,
    flags: u16,
    questions: Vec<(String, u16)>,
    answers: Vec<(String, u16, u32, Vec<u8>)>,
}

impl DnsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: u16) -> Self {
        self.id = id;
        self
    }

    /// Set as response (QR=1)
    pub fn response(mut self) -> Self {
        self.flags |= 0x8000;
        self
    }

    pub fn rcode(mut self, rcode: u8) -> Self {
        self.flags = (self.flags & !0x000F) | (rcode as u16 & 0x0F);
        self
    }

    pub fn add_question(mut self, name: &str, qtype: DnsType) -> Self {
        self.questions.push((name.to_string(), qtype as u16));
        self
    }

    pub fn add_answer(mut self, name: &str, rtype: DnsType, ttl: u32, rdata: &[u8]) -> Self {
        self.answers
            .push((name.to_string(), rtype as u16, ttl, rdata.to_vec()));
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(512);
        buffer.extend_from_slice(&self.id.to_be_bytes());
        buffer.extend_from_slice(&self.flags.to_be_bytes());
        buffer.extend_from_slice(&(self.questions.len() as u16).to_be_bytes());
        buffer.extend_from_slice(&(self.answers.len() as u16).to_be_bytes());
        buffer.extend_from_slice(&[0, 0, 0, 0]);

        for (name, qtype) in &self.questions {
            buffer.extend_from_slice(&encode_domain_name(name));
            buffer.extend_from_slice(&qtype.to_be_bytes());
            buffer.extend_from_slice(&1u16.to_be_bytes());
        }

        for (name, rtype, ttl, rdata) in &self.answers {
            buffer.extend_from_slice(&encode_domain_name(name));
            buffer.extend_from_slice(&rtype.to_be_bytes());
            buffer.extend_from_slice(&1u16.to_be_bytes());
            buffer.extend_from_slice(&ttl.to_be_bytes());
            buffer.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
            buffer.extend_from_slice(rdata);
        }

        buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_response() -> Vec<u8> {
        DnsBuilder::new()
            .id(0x1234)
            .response()
            .add_question("sip.example.com", DnsType::A)
            .add_answer("sip.example.com", DnsType::A, 300, &[10, 0, 0, 5])
            .build()
    }

    #[test]
    fn test_dns_header_parse() {
        let data = make_response();
        let hdr = DnsHeader::parse(&data).unwrap();
        assert_eq!(hdr.id(), 0x1234);
        assert!(hdr.is_response());
        assert_eq!(hdr.opcode(), 0);
        assert_eq!(hdr.rcode(), 0);
        assert_eq!(hdr.question_count(), 1);
        assert_eq!(hdr.answer_count(), 1);
    }

    #[test]
    fn test_dns_header_parse_too_short() {
        assert!(DnsHeader::parse(&[0u8; 11]).is_err());
    }

    #[test]
    fn test_parse_domain_name_with_pointer() {
        // "example.com" at 0, then "www" + pointer to 0
        let mut buf = encode_domain_name("example.com");
        let start = buf.len();
        buf.extend_from_slice(&[3, b'w', b'w', b'w', 0xC0, 0x00]);
        let (name, next) = parse_domain_name(&buf, start).unwrap();
        assert_eq!(name, "www.example.com");
        assert_eq!(next, buf.len());
    }

    #[test]
    fn test_parse_domain_name_loop() {
        let buf = [0xC0, 0x00];
        assert!(parse_domain_name(&buf, 0).is_err());
    }

    #[test]
    fn test_parse_domain_name_root() {
        let (name, next) = parse_domain_name(&[0], 0).unwrap();
        assert_eq!(name, ".");
        assert_eq!(next, 1);
    }

    #[test]
    fn test_questions_and_answers() {
        let data = make_response();
        let hdr = DnsHeader::parse(&data).unwrap();

        let questions = hdr.questions().unwrap();
        assert_eq!(questions[0].name, "sip.example.com");
        assert_eq!(questions[0].qtype, 1);

        let answers = hdr.answers().unwrap();
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].ttl, 300);
        assert_eq!(answers[0].rdata, vec![10, 0, 0, 5]);
    }

    #[test]
    fn test_answer_summary_json() {
        let summary = answer_summary(&make_response()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&summary).unwrap();

        assert_eq!(value["id"], 0x1234);
        assert_eq!(value["response"], true);
        assert_eq!(value["questions"][0]["name"], "sip.example.com");
        assert_eq!(value["answers"][0]["data"], "10.0.0.5");
        assert_eq!(value["answers"][0]["ttl"], 300);
    }

    #[test]
    fn test_answer_summary_cname_and_aaaa() {
        let v6: Ipv6Addr = "2001:db8::5".parse().unwrap();
        let data = DnsBuilder::new()
            .response()
            .add_answer("a.example", DnsType::CNAME, 60, &encode_domain_name("b.example"))
            .add_answer("b.example", DnsType::AAAA, 60, &v6.octets())
            .add_answer("b.example", DnsType::TXT, 60, &[1, 0xab])
            .build();
        let summary = answer_summary(&data).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&summary).unwrap();

        assert_eq!(value["answers"][0]["data"], "b.example");
        assert_eq!(value["answers"][1]["data"], "2001:db8::5");
        assert_eq!(value["answers"][2]["data"], "01ab");
    }

    #[test]
    fn test_answer_summary_truncated() {
        let mut data = make_response();
        data.truncate(data.len() - 3);
        assert!(answer_summary(&data).is_err());
    }
}
