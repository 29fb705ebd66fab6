//! Offline capture replay from legacy pcap files

use super::{CapturedFrame, FrameSource};
use crate::config::LinkType;
use crate::{Error, Result};
use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::{LegacyPcapReader, PcapBlockOwned, PcapError};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Reader buffer; must hold the largest captured record
const BUFFER_SIZE: usize = 256 * 1024;

/// pcap file reader yielding one frame per record
pub struct PcapReplay<R: Read> {
    reader: LegacyPcapReader<R>,
    link_type: LinkType,
    nanosecond: bool,
    frames: u64,
}

impl PcapReplay<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        debug!(path = %path.display(), "opened capture file");
        Self::new(BufReader::new(file))
    }
}

impl<R: Read> PcapReplay<R> {
    /// Reads the global header. Only Ethernet and Linux cooked captures are
    /// accepted.
    pub fn new(source: R) -> Result<Self> {
        let mut reader = LegacyPcapReader::new(BUFFER_SIZE, source)
            .map_err(|e| Error::Pcap(format!("not a legacy pcap file: {e:?}")))?;

        loop {
            match reader.next() {
                Ok((offset, block)) => {
                    let header = match block {
                        PcapBlockOwned::LegacyHeader(hdr) => {
                            Some((hdr.network.0, hdr.is_nanosecond_precision()))
                        }
                        _ => None,
                    };
                    reader.consume(offset);

                    let Some((network, nanosecond)) = header else {
                        return Err(Error::Pcap("capture does not start with a header".into()));
                    };
                    let link_type = LinkType::from_pcap(network)
                        .ok_or_else(|| Error::Pcap(format!("unsupported link type {network}")))?;
                    return Ok(Self {
                        reader,
                        link_type,
                        nanosecond,
                        frames: 0,
                    });
                }
                Err(PcapError::Incomplete(_)) => {
                    reader
                        .refill()
                        .map_err(|e| Error::Pcap(format!("refill error: {e:?}")))?;
                }
                Err(e) => return Err(Error::Pcap(format!("pcap header error: {e:?}"))),
            }
        }
    }

    /// Records read so far
    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn timestamp(&self, secs: u32, frac: u32) -> SystemTime {
        let frac = if self.nanosecond {
            Duration::from_nanos(u64::from(frac))
        } else {
            Duration::from_micros(u64::from(frac))
        };
        UNIX_EPOCH + Duration::from_secs(u64::from(secs)) + frac
    }
}

impl<R: Read> FrameSource for PcapReplay<R> {
    fn link_type(&self) -> LinkType {
        self.link_type
    }

    fn next_frame(&mut self) -> Result<Option<CapturedFrame>> {
        loop {
            match self.reader.next() {
                Ok((offset, block)) => {
                    let record = match block {
                        PcapBlockOwned::Legacy(pkt) => {
                            Some((pkt.ts_sec, pkt.ts_usec, pkt.data.to_vec()))
                        }
                        PcapBlockOwned::LegacyHeader(_) => None,
                        PcapBlockOwned::NG(_) => {
                            warn!("pcapng block encountered, only legacy pcap is supported");
                            None
                        }
                    };
                    self.reader.consume(offset);

                    if let Some((secs, frac, data)) = record {
                        self.frames += 1;
                        return Ok(Some(CapturedFrame {
                            ts: self.timestamp(secs, frac),
                            data,
                        }));
                    }
                }
                Err(PcapError::Eof) => return Ok(None),
                Err(PcapError::Incomplete(_)) => {
                    self.reader
                        .refill()
                        .map_err(|e| Error::Pcap(format!("refill error: {e:?}")))?;
                }
                Err(e) => return Err(Error::Pcap(format!("pcap parse error: {e:?}"))),
            }
        }
    }
}
