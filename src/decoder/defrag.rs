//! IP fragment reassembly.
//!
//! One engine shared by IPv4 and IPv6. Fragment sets are keyed per version
//! and hold byte ranges until the datagram is covered from offset 0 through
//! the final fragment.

use crate::protocol::ipv4::Ipv4Header;
use crate::protocol::ipv6::Ipv6Header;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::SystemTime;
use thiserror::Error;

/// Largest reassembled payload
pub const MAX_DATAGRAM_SIZE: u32 = 65535;
/// Most fragments accepted for one datagram
pub const MAX_FRAGMENTS: usize = 8192;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefragError {
    #[error("reassembled datagram exceeds {MAX_DATAGRAM_SIZE} bytes")]
    TooLarge,

    #[error("more than {MAX_FRAGMENTS} fragments for one datagram")]
    TooManyFragments,

    #[error("non-final fragment at offset {offset} has length {len}, not a multiple of 8")]
    Misaligned { offset: u32, len: usize },

    #[error("fragment at offset {offset} overlaps different data")]
    Overlap { offset: u32 },

    #[error("fragment lengths disagree on the datagram size")]
    InconsistentLength,
}

#[derive(Debug)]
struct FragmentSet {
    /// offset -> fragment bytes
    pieces: BTreeMap<u32, Vec<u8>>,
    /// End of the datagram, known once the final fragment arrives
    final_end: Option<u32>,
    count: usize,
    last_seen: SystemTime,
}

impl FragmentSet {
    fn new(ts: SystemTime) -> Self {
        Self {
            pieces: BTreeMap::new(),
            final_end: None,
            count: 0,
            last_seen: ts,
        }
    }

    fn max_end(&self) -> u32 {
        self.pieces
            .iter()
            .map(|(off, data)| off + data.len() as u32)
            .max()
            .unwrap_or(0)
    }

    /// Returns Ok(false) when the fragment repeats bytes already held.
    fn add(&mut self, offset: u32, more: bool, data: &[u8]) -> Result<bool, DefragError> {
        let end = offset + data.len() as u32;

        if more {
            if data.len() % 8 != 0 {
                return Err(DefragError::Misaligned {
                    offset,
                    len: data.len(),
                });
            }
            if self.final_end.is_some_and(|fin| end > fin) {
                return Err(DefragError::InconsistentLength);
            }
        } else {
            match self.final_end {
                Some(fin) if fin != end => return Err(DefragError::InconsistentLength),
                None if self.max_end() > end => return Err(DefragError::InconsistentLength),
                _ => self.final_end = Some(end),
            }
        }

        let mut covered = true;
        let mut pos = offset;
        for (&off, piece) in self.pieces.range(..end) {
            let piece_end = off + piece.len() as u32;
            if piece_end <= offset {
                continue;
            }
            let lo = off.max(offset);
            let hi = piece_end.min(end);
            let ours = &data[(lo - offset) as usize..(hi - offset) as usize];
            let theirs = &piece[(lo - off) as usize..(hi - off) as usize];
            if ours != theirs {
                return Err(DefragError::Overlap { offset });
            }
            if off > pos {
                covered = false;
            }
            pos = pos.max(piece_end);
        }
        if pos < end {
            covered = false;
        }
        if covered && !data.is_empty() {
            return Ok(false);
        }

        self.count += 1;
        if self.count > MAX_FRAGMENTS {
            return Err(DefragError::TooManyFragments);
        }

        match self.pieces.get(&offset) {
            Some(existing) if existing.len() >= data.len() => {}
            _ => {
                self.pieces.insert(offset, data.to_vec());
            }
        }
        Ok(true)
    }

    /// Contiguous bytes from 0 to the final end, if all present.
    fn assemble(&self) -> Option<Vec<u8>> {
        let fin = self.final_end?;
        let mut out = Vec::with_capacity(fin as usize);
        for (&off, piece) in &self.pieces {
            let covered = out.len() as u32;
            if off > covered {
                return None;
            }
            let piece_end = off + piece.len() as u32;
            if piece_end > covered {
                out.extend_from_slice(&piece[(covered - off) as usize..]);
            }
        }
        (out.len() as u32 == fin).then_some(out)
    }
}

/// Generic reassembler over fragment set keys.
#[derive(Debug)]
pub struct Reassembler<K> {
    sets: Mutex<HashMap<K, FragmentSet>>,
}

impl<K: Hash + Eq + Clone> Reassembler<K> {
    pub fn new() -> Self {
        Self {
            sets: Mutex::new(HashMap::new()),
        }
    }

    /// Add one fragment. `offset` is in bytes. Returns the reassembled payload
    /// once the last missing piece arrives.
    pub fn insert(
        &self,
        key: K,
        offset: u32,
        more: bool,
        data: &[u8],
        ts: SystemTime,
    ) -> Result<Option<Vec<u8>>, DefragError> {
        if offset + data.len() as u32 > MAX_DATAGRAM_SIZE {
            self.sets.lock().remove(&key);
            return Err(DefragError::TooLarge);
        }

        let mut sets = self.sets.lock();
        let set = sets
            .entry(key.clone())
            .or_insert_with(|| FragmentSet::new(ts));
        set.last_seen = ts;

        match set.add(offset, more, data) {
            Ok(false) => Ok(None),
            Ok(true) => match set.assemble() {
                Some(payload) => {
                    sets.remove(&key);
                    Ok(Some(payload))
                }
                None => Ok(None),
            },
            Err(err) => {
                sets.remove(&key);
                Err(err)
            }
        }
    }

    /// Drop sets not touched since `cutoff`. Returns how many were dropped.
    pub fn discard_older_than(&self, cutoff: SystemTime) -> usize {
        let mut sets = self.sets.lock();
        let before = sets.len();
        sets.retain(|_, set| set.last_seen >= cutoff);
        before - sets.len()
    }

    pub fn pending(&self) -> usize {
        self.sets.lock().len()
    }
}

impl<K: Hash + Eq + Clone> Default for Reassembler<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// A reassembled IP datagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    /// Upper layer protocol
    pub protocol: u8,
    pub payload: Vec<u8>,
    /// Datagram length as carried in the IP length field
    pub total_length: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Ipv4Key {
    src: Ipv4Addr,
    dst: Ipv4Addr,
    id: u16,
    protocol: u8,
}

#[derive(Debug, Default)]
pub struct Ipv4Defragmenter {
    inner: Reassembler<Ipv4Key>,
}

impl Ipv4Defragmenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unfragmented datagrams come back unchanged.
    pub fn defrag(
        &self,
        ip: &Ipv4Header<'_>,
        ts: SystemTime,
    ) -> Result<Option<Datagram>, DefragError> {
        if !ip.needs_reassembly() {
            return Ok(Some(Datagram {
                protocol: ip.protocol(),
                payload: ip.payload().to_vec(),
                total_length: ip.total_length() as usize,
            }));
        }

        let key = Ipv4Key {
            src: ip.src_addr(),
            dst: ip.dst_addr(),
            id: ip.identification(),
            protocol: ip.protocol(),
        };
        let offset = u32::from(ip.fragment_offset()) * 8;
        let reassembled = self
            .inner
            .insert(key, offset, ip.more_fragments(), ip.payload(), ts)?;

        Ok(reassembled.map(|payload| Datagram {
            protocol: ip.protocol(),
            total_length: ip.header_len() + payload.len(),
            payload,
        }))
    }

    pub fn discard_older_than(&self, cutoff: SystemTime) -> usize {
        self.inner.discard_older_than(cutoff)
    }

    pub fn pending(&self) -> usize {
        self.inner.pending()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Ipv6Key {
    src: Ipv6Addr,
    dst: Ipv6Addr,
    id: u32,
}

#[derive(Debug, Default)]
pub struct Ipv6Defragmenter {
    inner: Reassembler<Ipv6Key>,
}

impl Ipv6Defragmenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Datagrams without a Fragment header come back unchanged.
    pub fn defrag(
        &self,
        ip: &Ipv6Header<'_>,
        ts: SystemTime,
    ) -> Result<Option<Datagram>, DefragError> {
        let Some(frag) = ip.fragment() else {
            let (protocol, upper) = ip.upper_layer();
            return Ok(Some(Datagram {
                protocol,
                payload: upper.to_vec(),
                total_length: ip.payload_length() as usize,
            }));
        };

        let data = ip.payload().get(frag.data_start..).unwrap_or_default();
        let key = Ipv6Key {
            src: ip.src_addr(),
            dst: ip.dst_addr(),
            id: frag.identification,
        };
        let offset = u32::from(frag.offset) * 8;
        let reassembled = self
            .inner
            .insert(key, offset, frag.more_fragments, data, ts)?;

        Ok(reassembled.map(|payload| Datagram {
            protocol: frag.next_header,
            total_length: payload.len(),
            payload,
        }))
    }

    pub fn discard_older_than(&self, cutoff: SystemTime) -> usize {
        self.inner.discard_older_than(cutoff)
    }

    pub fn pending(&self) -> usize {
        self.inner.pending()
    }
}
