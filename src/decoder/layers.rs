//! Layer chain decoding.
//!
//! A chain is the ordered list of headers found in one buffer. Decoding
//! stops at the first header that fails to parse; the layers decoded so far
//! are kept.

use crate::config::LinkType;
use crate::protocol::dns::{DnsHeader, DNS_PORT};
use crate::protocol::ethernet::EthernetHeader;
use crate::protocol::gre::GreHeader;
use crate::protocol::ipv4::Ipv4Header;
use crate::protocol::ipv6::Ipv6Header;
use crate::protocol::sctp::SctpHeader;
use crate::protocol::sll::SllHeader;
use crate::protocol::tcp::TcpHeader;
use crate::protocol::udp::UdpHeader;
use crate::protocol::vlan::VlanHeader;
use crate::protocol::vxlan::{self, VxlanHeader};
use crate::protocol::{ip_proto, EtherType};
use smallvec::SmallVec;

/// Longest chain kept for one buffer
pub const MAX_LAYERS: usize = 12;

pub type LayerChain<'a> = SmallVec<[Layer<'a>; MAX_LAYERS]>;

#[derive(Debug, Clone, Copy)]
pub enum Layer<'a> {
    Sll(SllHeader<'a>),
    Ethernet(EthernetHeader<'a>),
    Vlan(VlanHeader<'a>),
    Gre(GreHeader<'a>),
    Vxlan(VxlanHeader<'a>),
    Ipv4(Ipv4Header<'a>),
    Ipv6(Ipv6Header<'a>),
    Udp(UdpHeader<'a>),
    Tcp(TcpHeader<'a>),
    Sctp(SctpHeader<'a>),
    Dns(DnsHeader<'a>),
    Payload(&'a [u8]),
}

impl Layer<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Layer::Sll(_) => "sll",
            Layer::Ethernet(_) => "ethernet",
            Layer::Vlan(_) => "vlan",
            Layer::Gre(_) => "gre",
            Layer::Vxlan(_) => "vxlan",
            Layer::Ipv4(_) => "ipv4",
            Layer::Ipv6(_) => "ipv6",
            Layer::Udp(_) => "udp",
            Layer::Tcp(_) => "tcp",
            Layer::Sctp(_) => "sctp",
            Layer::Dns(_) => "dns",
            Layer::Payload(_) => "payload",
        }
    }
}

/// First header expected in a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Start {
    Ethernet,
    Sll,
    Ipv4,
    Ipv6,
    Udp,
    Tcp,
}

impl From<LinkType> for Start {
    fn from(link: LinkType) -> Self {
        match link {
            LinkType::Ethernet => Start::Ethernet,
            LinkType::LinuxSll => Start::Sll,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Next {
    Start(Start),
    Vlan,
    Gre,
    Vxlan,
    Sctp,
    Dns,
    Payload,
}

fn after_ethertype(ethertype: u16) -> Option<Next> {
    if EtherType::is_vlan(ethertype) {
        return Some(Next::Vlan);
    }
    match EtherType::from_u16(ethertype)? {
        EtherType::Ipv4 => Some(Next::Start(Start::Ipv4)),
        EtherType::Ipv6 => Some(Next::Start(Start::Ipv6)),
        EtherType::TransparentEthernet => Some(Next::Start(Start::Ethernet)),
        _ => None,
    }
}

fn after_ip(protocol: u8) -> Next {
    match protocol {
        ip_proto::UDP => Next::Start(Start::Udp),
        ip_proto::TCP => Next::Start(Start::Tcp),
        ip_proto::SCTP => Next::Sctp,
        ip_proto::GRE => Next::Gre,
        _ => Next::Payload,
    }
}

/// Decode every header reachable from `start`.
pub fn decode_chain(start: Start, data: &[u8]) -> LayerChain<'_> {
    let mut chain = LayerChain::new();
    decode_into(&mut chain, Next::Start(start), data);
    chain
}

/// Decode a reassembled IP payload. Only UDP and TCP are recognized; other
/// protocols yield `None`.
pub fn decode_transport(protocol: u8, data: &[u8]) -> Option<LayerChain<'_>> {
    let start = match protocol {
        ip_proto::UDP => Start::Udp,
        ip_proto::TCP => Start::Tcp,
        _ => return None,
    };
    Some(decode_chain(start, data))
}

fn decode_into<'a>(chain: &mut LayerChain<'a>, first: Next, data: &'a [u8]) {
    let mut next = Some((first, data));

    while let Some((kind, buf)) = next.take() {
        if chain.len() >= MAX_LAYERS {
            break;
        }

        next = match kind {
            Next::Start(Start::Ethernet) => {
                let Ok(eth) = EthernetHeader::parse(buf) else {
                    break;
                };
                chain.push(Layer::Ethernet(eth));
                after_ethertype(eth.ethertype()).map(|n| (n, eth.payload()))
            }
            Next::Start(Start::Sll) => {
                let Ok(sll) = SllHeader::parse(buf) else {
                    break;
                };
                chain.push(Layer::Sll(sll));
                after_ethertype(sll.ethertype()).map(|n| (n, sll.payload()))
            }
            Next::Vlan => {
                let Ok(vlan) = VlanHeader::parse(buf) else {
                    break;
                };
                chain.push(Layer::Vlan(vlan));
                after_ethertype(vlan.ethertype()).map(|n| (n, vlan.payload()))
            }
            Next::Start(Start::Ipv4) => {
                let Ok(ip) = Ipv4Header::parse(buf) else {
                    break;
                };
                chain.push(Layer::Ipv4(ip));
                // Fragments carry no decodable upper layer until reassembled
                (!ip.needs_reassembly()).then(|| (after_ip(ip.protocol()), ip.payload()))
            }
            Next::Start(Start::Ipv6) => {
                let Ok(ip) = Ipv6Header::parse(buf) else {
                    break;
                };
                chain.push(Layer::Ipv6(ip));
                if ip.fragment().is_some() {
                    None
                } else {
                    let (protocol, upper) = ip.upper_layer();
                    Some((after_ip(protocol), upper))
                }
            }
            Next::Start(Start::Udp) => {
                let Ok(udp) = UdpHeader::parse(buf) else {
                    break;
                };
                chain.push(Layer::Udp(udp));
                let next = if udp.dst_port() == vxlan::UDP_PORT {
                    Next::Vxlan
                } else if udp.dst_port() == DNS_PORT || udp.src_port() == DNS_PORT {
                    Next::Dns
                } else {
                    Next::Payload
                };
                Some((next, udp.payload()))
            }
            Next::Start(Start::Tcp) => {
                let Ok(tcp) = TcpHeader::parse(buf) else {
                    break;
                };
                chain.push(Layer::Tcp(tcp));
                Some((Next::Payload, tcp.payload()))
            }
            Next::Sctp => {
                let Ok(sctp) = SctpHeader::parse(buf) else {
                    break;
                };
                chain.push(Layer::Sctp(sctp));
                None
            }
            Next::Gre => {
                let Ok(gre) = GreHeader::parse(buf) else {
                    break;
                };
                chain.push(Layer::Gre(gre));
                // The dispatcher decides how to unwrap
                None
            }
            Next::Vxlan => {
                let Ok(vxlan) = VxlanHeader::parse(buf) else {
                    break;
                };
                chain.push(Layer::Vxlan(vxlan));
                Some((Next::Start(Start::Ethernet), vxlan.payload()))
            }
            Next::Dns => match DnsHeader::parse(buf) {
                Ok(dns) => {
                    chain.push(Layer::Dns(dns));
                    None
                }
                Err(_) => Some((Next::Payload, buf)),
            },
            Next::Payload => {
                if !buf.is_empty() {
                    chain.push(Layer::Payload(buf));
                }
                None
            }
        };
    }
}
