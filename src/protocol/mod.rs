//! Zero-copy header views for the protocols found in captured traffic.
//!
//! Each view borrows the frame and hands out its payload with the frame's
//! lifetime, so a whole layer chain can be decoded without copying.

pub mod dns;
pub mod ethernet;
pub mod gre;
pub mod ipv4;
pub mod ipv6;
pub mod rtp;
pub mod sctp;
pub mod sll;
pub mod tcp;
pub mod types;
pub mod udp;
pub mod vlan;
pub mod vxlan;

pub use types::*;
