//! Capture sources feeding the decoder

mod pcap;

pub use pcap::PcapReplay;

use crate::config::LinkType;
use crate::decoder::Decoder;
use crate::Result;
use std::time::SystemTime;
use tracing::debug;

/// One captured frame with its capture timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    pub ts: SystemTime,
    pub data: Vec<u8>,
}

/// Source of raw frames
///
/// Every backend reports the link type of the frames it yields so the
/// decoder knows which header comes first.
pub trait FrameSource {
    fn link_type(&self) -> LinkType;

    /// Next frame, or `None` once the source is exhausted
    fn next_frame(&mut self) -> Result<Option<CapturedFrame>>;
}

/// Feed every frame of `source` to the decoder. With `hep` set, frames are
/// already HEP encapsulated and pass through undecoded. Returns the number
/// of frames read.
pub fn replay(source: &mut impl FrameSource, decoder: &Decoder, hep: bool) -> Result<u64> {
    let mut frames = 0;
    while let Some(frame) = source.next_frame()? {
        if hep {
            decoder.process_hep(&frame.data, frame.ts);
        } else {
            decoder.process(&frame.data, frame.ts);
        }
        frames += 1;
    }
    let flushed = decoder.finish();
    debug!(frames, flushed, "capture source exhausted");
    Ok(frames)
}
